//! Command-line configuration.

use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SNAPSHOT_PATH};
use std::path::PathBuf;
use thiserror::Error;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Where SAVE writes and startup loads the snapshot
    pub snapshot_path: PathBuf,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Run the background expiry sweeper
    pub active_expiry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            log_level: "info".to_string(),
            active_expiry: false,
        }
    }
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the process should do after reading its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(Config),
    Help,
    Version,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid port number: {0}")]
    InvalidPort(String),

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Parses command-line arguments, excluding the program name.
pub fn parse_args<I, S>(args: I) -> Result<CliAction, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut config = Config::default();
    let mut args = args.into_iter().map(Into::into);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" | "-h" => config.host = value_for(&arg, &mut args)?,
            "--port" | "-p" => {
                let raw = value_for(&arg, &mut args)?;
                config.port = raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?;
            }
            "--snapshot" | "-s" => config.snapshot_path = value_for(&arg, &mut args)?.into(),
            "--log-level" => config.log_level = value_for(&arg, &mut args)?,
            "--active-expiry" => config.active_expiry = true,
            "--help" => return Ok(CliAction::Help),
            "--version" | "-v" => return Ok(CliAction::Version),
            _ => return Err(ConfigError::UnknownArgument(arg)),
        }
    }

    Ok(CliAction::Run(config))
}

fn value_for(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, ConfigError> {
    args.next()
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}
