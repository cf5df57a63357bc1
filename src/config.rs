//! Server configuration.
//!
//! All settings come from the command line; every flag has a default so
//! `hftp` with no arguments serves `./testdata` on port 19500.

use crate::connection::{ConnectionConfig, DEFAULT_IDLE_TIMEOUT_SECS};
use crate::protocol::DEFAULT_MAX_REQUEST_SIZE;
use crate::{DEFAULT_DIRECTORY, DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line configuration for the server
#[derive(Parser, Debug, Clone)]
#[command(name = "hftp")]
#[command(version)]
#[command(about = "Serves the files of one directory over the HFTP protocol", long_about = None)]
pub struct Config {
    /// Address to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory whose files are served
    #[arg(short, long, default_value = DEFAULT_DIRECTORY)]
    pub directory: PathBuf,

    /// Seconds a client may stay idle between requests
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout: u64,

    /// Largest request line accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_SIZE)]
    pub max_request: usize,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("serving directory '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("idle timeout must be at least one second")]
    ZeroIdleTimeout,

    #[error("maximum request size must be positive")]
    ZeroMaxRequest,
}

impl Config {
    /// Parses and validates the process arguments.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings that clap cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.directory.is_dir() {
            return Err(ConfigError::NotADirectory(self.directory.clone()));
        }
        if self.idle_timeout == 0 {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        if self.max_request == 0 {
            return Err(ConfigError::ZeroMaxRequest);
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings applied to every accepted connection
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout),
            max_request_size: self.max_request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("hftp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 19500);
        assert_eq!(config.directory, PathBuf::from("testdata"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT_SECS);
        assert_eq!(config.bind_address(), "0.0.0.0:19500");
        assert_eq!(config.connection_config(), ConnectionConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--host",
            "127.0.0.1",
            "-p",
            "2121",
            "-d",
            "/srv/files",
            "--idle-timeout",
            "10",
            "--max-request",
            "1024",
        ]);
        assert_eq!(config.bind_address(), "127.0.0.1:2121");
        assert_eq!(config.directory, PathBuf::from("/srv/files"));
        assert_eq!(
            config.connection_config(),
            ConnectionConfig {
                idle_timeout: Duration::from_secs(10),
                max_request_size: 1024,
            }
        );
    }

    #[test]
    fn test_invalid_port() {
        assert!(Config::try_parse_from(["hftp", "--port", "70000"]).is_err());
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        let dir_arg = dir.path().to_str().unwrap();
        assert!(parse(&["-d", dir_arg]).validate().is_ok());

        let missing = dir.path().join("missing");
        assert!(matches!(
            parse(&["-d", missing.to_str().unwrap()]).validate(),
            Err(ConfigError::NotADirectory(_))
        ));

        assert!(matches!(
            parse(&["-d", dir_arg, "--idle-timeout", "0"]).validate(),
            Err(ConfigError::ZeroIdleTimeout)
        ));

        assert!(matches!(
            parse(&["-d", dir_arg, "--max-request", "0"]).validate(),
            Err(ConfigError::ZeroMaxRequest)
        ));
    }
}
