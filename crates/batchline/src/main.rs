//! Batchline - batch lines from stdin into a sink
//!
//! # Usage
//!
//! ```bash
//! # Batch stdin into the configured sink (default)
//! tail -F app.log | batchline --config batchline.toml
//!
//! # Receive batches sent by a forwarder sink and print them
//! batchline receive --listen 0.0.0.0:7070
//! ```

mod cmd;
mod sink_builder;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use batchline_config::{Config, LogConfig, LogFormat, LogOutput};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_PATH: &str = "batchline.toml";

/// Batchline - batch lines from stdin into a sink
#[derive(Parser, Debug)]
#[command(name = "batchline")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Batch lines from stdin into the configured sink
    Run,

    /// Accept forwarder connections and print every received item
    Receive(cmd::receive::ReceiveArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_logging(&config.log, cli.log_level.as_deref())?;

    match cli.command {
        Some(Command::Receive(args)) => cmd::receive::run(args).await,
        // No subcommand = run
        Some(Command::Run) | None => cmd::run::run(config).await,
    }
}

/// Load the config: explicit path > `batchline.toml` > defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()));
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return Config::from_file(default_path).context("failed to load configuration");
    }

    Ok(Config::default())
}

/// Resolve the filter directive: CLI flag > `RUST_LOG` > config file
fn resolve_filter(config: &LogConfig, cli_level: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }

    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()))
}

/// Initialize the tracing subscriber for logging
fn init_logging(config: &LogConfig, cli_level: Option<&str>) -> Result<()> {
    let filter = resolve_filter(config, cli_level);

    let (writer, ansi) = match &config.output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        LogOutput::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format {
        LogFormat::Console => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["batchline"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_cli_global_args() {
        let cli = Cli::try_parse_from([
            "batchline",
            "run",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.command, Some(Command::Run)));
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_cli_receive() {
        let cli = Cli::try_parse_from(["batchline", "receive", "--listen", "127.0.0.1:9000"]).unwrap();

        let Some(Command::Receive(args)) = cli.command else {
            panic!("expected receive command");
        };
        assert_eq!(args.listen, "127.0.0.1:9000");
    }

    #[test]
    fn test_cli_receive_default_listen() {
        let cli = Cli::try_parse_from(["batchline", "receive"]).unwrap();

        let Some(Command::Receive(args)) = cli.command else {
            panic!("expected receive command");
        };
        assert_eq!(args.listen, cmd::receive::DEFAULT_LISTEN);
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nbatch_size = 7").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.executor.batch_size, 7);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let err = load_config(Some(Path::new("/nonexistent/batchline.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/batchline.toml"));
    }

    #[test]
    fn test_cli_level_wins() {
        let filter = resolve_filter(&LogConfig::default(), Some("trace"));
        assert_eq!(filter.to_string(), "trace");
    }
}
