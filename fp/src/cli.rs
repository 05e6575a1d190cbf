//! CLI command definitions and subcommands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// farepacer - fair, adaptively paced fare-quote scheduling
#[derive(Parser)]
#[command(
    name = "fp",
    about = "Fair, adaptively paced fare-quote scheduler with result caching",
    version,
    after_help = "Logs are written to: ~/.local/share/farepacer/logs/farepacer.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Print the cache key for a query
    Key {
        /// Origin station id
        #[arg(long)]
        from: String,

        /// Destination station id
        #[arg(long)]
        to: String,

        /// Travel date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Traveler class
        #[arg(long, default_value = "second")]
        class: String,

        /// Discount card
        #[arg(long)]
        discount: Option<String>,

        /// Only fast connections
        #[arg(long)]
        fast: bool,

        /// Earliest departure (HH:MM); filters only, does not change the key
        #[arg(long)]
        earliest: Option<String>,

        /// Latest departure (HH:MM); filters only, does not change the key
        #[arg(long)]
        latest: Option<String>,

        /// Maximum transfers; filters only, does not change the key
        #[arg(long)]
        max_transfers: Option<u8>,
    },

    /// Print the effective configuration as YAML
    Config,

    /// Run concurrent searches against a synthetic throttling upstream
    Simulate {
        /// Number of concurrent sessions
        #[arg(short, long, default_value = "3")]
        sessions: usize,

        /// Days searched per session
        #[arg(short, long, default_value = "2")]
        days: usize,

        /// Calls per 30 s window the upstream accepts before throttling
        #[arg(short, long, default_value = "15")]
        throttle_after: usize,

        /// Base upstream latency in milliseconds
        #[arg(long, default_value = "300")]
        latency_ms: u64,

        /// First travel date (defaults to today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("farepacer")
        .join("logs")
        .join("farepacer.log")
}

/// Output format for report commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_config() {
        let cli = Cli::parse_from(["fp", "config"]);
        assert!(matches!(cli.command, Command::Config));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parse_key() {
        let cli = Cli::parse_from([
            "fp", "key", "--from", "8000105", "--to", "8000261", "--date", "2026-11-03", "--fast",
        ]);
        match cli.command {
            Command::Key {
                from,
                date,
                class,
                fast,
                discount,
                ..
            } => {
                assert_eq!(from, "8000105");
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 11, 3).unwrap());
                assert_eq!(class, "second");
                assert!(fast);
                assert!(discount.is_none());
            }
            _ => panic!("expected key command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate_defaults() {
        let cli = Cli::parse_from(["fp", "simulate"]);
        match cli.command {
            Command::Simulate {
                sessions,
                days,
                throttle_after,
                format,
                start,
                ..
            } => {
                assert_eq!(sessions, 3);
                assert_eq!(days, 2);
                assert_eq!(throttle_after, 15);
                assert_eq!(format, OutputFormat::Text);
                assert!(start.is_none());
            }
            _ => panic!("expected simulate command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["fp", "config", "--log-level", "debug", "-c", "x.yml"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("plain".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("farepacer/logs/farepacer.log"));
    }
}
