//! Terminal logging for the `flamespeed` binary.
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Solver verbosity to log level: 0 → Warn, 1 → Info, 2 → Debug, 3 and above → Trace.
pub fn level_for(loglevel: usize) -> LevelFilter {
    match loglevel {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the terminal logger. Returns false when a logger is already set.
pub fn init_logger(loglevel: usize) -> bool {
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    TermLogger::init(
        level_for(loglevel),
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(7), LevelFilter::Trace);
    }
}
