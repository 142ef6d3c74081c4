use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::{LogFormat, LogLevel};
use crate::output::OutputFormat;

pub mod launch;
pub mod probe;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Act as a worker: publish a medium and print values from the launcher.
    Serve(ServeArgs),
    /// Spawn a worker, send it values and wait for it to say goodbye.
    Launch(LaunchArgs),
    /// Read the port a worker published for a medium.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Global flags a launched worker inherits.
#[derive(Clone, Copy, Debug)]
pub struct Globals {
    pub format: OutputFormat,
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

pub fn run(command: Command, globals: Globals) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, globals.format),
        Command::Launch(args) => launch::run(args, globals),
        Command::Probe(args) => probe::run(args, globals.format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Medium path handed over by the launcher.
    #[arg(long, value_name = "MEDIUM")]
    pub file: PathBuf,
    /// How long to wait for the goodbye frame to flush before exiting (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub flush_timeout: String,
}

#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Medium path used for the rendezvous.
    pub medium: PathBuf,
    /// JSON value to send (repeatable, sent in order).
    #[arg(long, value_name = "VALUE")]
    pub json: Vec<String>,
    /// Progress update to send as STATE:PERCENT (repeatable, sent after --json values).
    #[arg(long, value_name = "STATE:PERCENT")]
    pub progress: Vec<String>,
    /// Maximum time to wait for the worker's goodbye (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Worker program to run instead of `forkwire serve`.
    #[arg(long, value_name = "PROGRAM")]
    pub worker: Option<PathBuf>,
    /// Extra arguments for --worker (repeatable).
    #[arg(
        long = "worker-arg",
        value_name = "ARG",
        requires = "worker",
        allow_hyphen_values = true
    )]
    pub worker_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Medium path to inspect.
    pub medium: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
