//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};
use clap::Parser;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "timekeeper")]
#[command(about = "Timer scheduling and action dispatch server")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// JSON file timers are loaded from at startup
    #[arg(short = 'f', long)]
    pub timers_file: Option<PathBuf>,

    /// Save the timers file after every change and on shutdown
    #[arg(long, requires = "timers_file")]
    pub autosave: bool,

    /// Start every loaded timer immediately
    #[arg(long)]
    pub start_all: bool,

    /// How long a stopping timer may take before it is aborted
    #[arg(long, default_value = "1000")]
    pub stop_grace_ms: u64,

    /// Log actions instead of performing them
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["timekeeper"]).unwrap();
        assert_eq!(config.address(), "127.0.0.1:20554");
        assert_eq!(config.stop_grace(), Duration::from_secs(1));
        assert_eq!(config.log_level(), "info");
        assert!(config.timers_file.is_none());
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "timekeeper", "-f", "timers.json", "--autosave", "--start-all", "--dry-run", "-v",
            "--stop-grace-ms", "250",
        ])
        .unwrap();
        assert_eq!(config.timers_file, Some(PathBuf::from("timers.json")));
        assert!(config.autosave && config.start_all && config.dry_run);
        assert_eq!(config.stop_grace(), Duration::from_millis(250));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_autosave_needs_a_file() {
        assert!(Config::try_parse_from(["timekeeper", "--autosave"]).is_err());
    }
}
