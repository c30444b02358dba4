//! Command line of the `flamespeed` binary:
//! `flamespeed [phi] [eField] [refine_grid] [loglevel] [--config <json>] [--output-dir <dir>]`.
//! Missing `phi` and `eField` are read from stdin.
use crate::Flame1D::flame_config::FlameConfig;
use crate::Flame1D::flame_error::FlameError;
use crate::Flame1D::flame_task::{FlameRun, FlameSpeedTask, RunParameters};
use crate::Utils::logger::init_logger;
use clap::Parser;
use log::error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flamespeed")]
#[command(about = "Freely propagating CH4/air flame with ion transport in an applied electric field", long_about = None)]
pub struct Cli {
    /// Equivalence ratio of the fuel/air mixture
    #[arg(allow_negative_numbers = true)]
    pub phi: Option<f64>,
    /// Applied electric field (V/m)
    #[arg(allow_negative_numbers = true)]
    pub e_field: Option<f64>,
    /// 1 refines the grid after every converged solve, 0 keeps the initial grid
    #[arg(default_value_t = 1)]
    pub refine_grid: u8,
    /// Solver verbosity, 0 (warnings only) to 3 (trace)
    #[arg(default_value_t = 1)]
    pub loglevel: usize,
    /// JSON file with solver settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory for the CSV and snapshot files
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

/// Reads one number after printing `label`.
fn prompt_value<R: BufRead, W: Write>(
    label: &str,
    input: &mut R,
    output: &mut W,
) -> Result<f64, FlameError> {
    write!(output, "Enter {}: ", label)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    line.trim()
        .parse::<f64>()
        .map_err(|_| FlameError::InvalidInput(format!("'{}' is not a valid {}", line.trim(), label)))
}

impl Cli {
    /// Run parameters, prompting for whatever the command line left out.
    pub fn run_parameters<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<RunParameters, FlameError> {
        let phi = match self.phi {
            Some(phi) => phi,
            None => prompt_value("phi", input, output)?,
        };
        let e_field = match self.e_field {
            Some(e) => e,
            None => prompt_value("eField", input, output)?,
        };
        let params = RunParameters {
            phi,
            e_field,
            refine_grid: self.refine_grid != 0,
            loglevel: self.loglevel,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn flame_config(&self) -> Result<FlameConfig, FlameError> {
        match &self.config {
            Some(path) => FlameConfig::from_file(path),
            None => Ok(FlameConfig::default()),
        }
    }
}

/// Runs one flame and writes its outputs. Stage failures are reported inside the returned run.
pub fn run(cli: &Cli) -> Result<FlameRun, FlameError> {
    let stdin = io::stdin();
    let params = cli.run_parameters(&mut stdin.lock(), &mut io::stdout())?;
    let task = FlameSpeedTask::new(cli.flame_config()?, params)?;
    if cli.loglevel > 0 {
        task.pretty_print_task();
    }
    let flame = task.run_default_mechanism()?;
    flame.write_outputs(&cli.output_dir)?;
    if cli.loglevel > 0 {
        flame.pretty_print();
    }
    Ok(flame)
}

/// Process exit code for an error that ended the run.
pub fn exit_code(err: &FlameError) -> i32 {
    match err {
        FlameError::InvalidInput(_) | FlameError::Io(_) | FlameError::Serde(_) => 1,
        _ => 0,
    }
}

pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    init_logger(cli.loglevel);
    match run(&cli) {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            eprintln!("program terminating.");
            exit_code(&e)
        }
    }
}
