//! Command-line interface for discord2pushover using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Route Discord messages and reactions to Pushover notifications.
#[derive(Parser, Debug)]
#[command(name = "discord2pushover")]
#[command(version)]
#[command(about = "Route Discord messages and reactions to Pushover notifications")]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// Defaults to discord2pushover.yaml (or .yml) in the working directory.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cli_default_config_is_lookup() {
        let cli = Cli::try_parse_from(["discord2pushover"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn cli_custom_config_path() {
        let cli = Cli::try_parse_from(["discord2pushover", "-c", "/etc/d2p/rules.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/d2p/rules.yaml")));
    }

    #[test]
    fn cli_config_long_option() {
        let cli = Cli::try_parse_from(["discord2pushover", "--config", "/long/path.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/long/path.yaml")));
    }

    #[test]
    fn cli_validate_flag() {
        let cli = Cli::try_parse_from(["discord2pushover", "--validate"]).unwrap();
        assert!(cli.validate);
    }

    #[test]
    #[serial]
    fn cli_log_format_default() {
        temp_env::with_var_unset("LOG_FORMAT", || {
            let cli = Cli::try_parse_from(["discord2pushover"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Text));
        });
    }

    #[test]
    fn cli_log_format_json() {
        let cli = Cli::try_parse_from(["discord2pushover", "--log-format", "json"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn cli_log_format_invalid_rejected() {
        let result = Cli::try_parse_from(["discord2pushover", "--log-format", "invalid"]);
        assert!(result.is_err(), "Invalid log format should be rejected");
    }

    #[test]
    #[serial]
    fn cli_log_format_from_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["discord2pushover"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Json));
        });
    }

    #[test]
    #[serial]
    fn cli_log_format_flag_overrides_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["discord2pushover", "--log-format", "text"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Text));
        });
    }
}
