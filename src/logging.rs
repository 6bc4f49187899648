//! Tracing subscriber setup.
//!
//! Output goes to stdout, stderr, or an append-mode file. The level accepts
//! tracing level names, the names used by earlier deployments (`log`,
//! `verbose`, `fatal`), or a full `EnvFilter` directive.

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogOutput {
    /// Parse the `--log` argument: 0/off, 1/stdout, 2/stderr, or a filename.
    pub fn parse(arg: &str) -> Self {
        match arg {
            "0" | "off" => LogOutput::Off,
            "1" | "stdout" => LogOutput::Stdout,
            "2" | "stderr" => LogOutput::Stderr,
            filename => LogOutput::File(PathBuf::from(filename)),
        }
    }
}

/// Translate a configured level into an `EnvFilter` directive.
///
/// `verbose` forces at least debug output.
pub fn filter_directive(level: &str, verbose: bool) -> String {
    let mapped = match level.trim().to_ascii_lowercase().as_str() {
        "verbose" | "trace" => "trace",
        "debug" => "debug",
        "log" | "info" | "" => "info",
        "warn" | "warning" => "warn",
        "error" | "fatal" => "error",
        _ => return level.trim().to_string(),
    };
    if verbose && matches!(mapped, "info" | "warn" | "error") {
        "debug".to_string()
    } else {
        mapped.to_string()
    }
}

/// Install the global tracing subscriber.
pub fn init(output: &LogOutput, directive: &str) -> Result<()> {
    let filter = || EnvFilter::try_new(directive);

    match output {
        LogOutput::Off => {}
        LogOutput::Stdout => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter()?)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogOutput::Stderr => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter()?)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogOutput::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter()?)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}
