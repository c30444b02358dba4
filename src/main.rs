use FlameSpeed::cli::cli_main::run_cli;

pub fn main() {
    std::process::exit(run_cli());
}
