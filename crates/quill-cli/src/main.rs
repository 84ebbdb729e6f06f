use anyhow::Result;
use clap::Parser;
use quill_core::{LogConfig, LogLevel, Logger, TimeInterval};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(
    after_help = "Each line read from stdin becomes one log record.\nSIGINT/SIGTERM flush and close the active file before exiting."
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, help = "Path to a JSON configuration file")]
    config: Option<PathBuf>,

    /// Minimum level written to disk (debug, info, warn, error, critical)
    #[arg(long, help = "Minimum level written to disk")]
    level: Option<String>,

    /// Prefix for log file names
    #[arg(long, help = "Prefix for log file names")]
    prefix: Option<String>,

    /// Directory for log files
    #[arg(long, help = "Directory for log files")]
    log_dir: Option<PathBuf>,

    /// Size threshold such as 100, 64KB or 10MB
    #[arg(long, help = "Rotate once a file would exceed this size")]
    max_bytes: Option<String>,

    /// Calendar interval (minutely, hourly, daily, weekly, monthly, yearly)
    #[arg(long, help = "Rotate when this calendar unit changes")]
    interval: Option<String>,

    /// Level used for records read from stdin
    #[arg(long, default_value = "info", help = "Level for each stdin line")]
    stdin_level: String,
}

/// Create logger configuration from CLI arguments
async fn create_log_config(cli: &Cli) -> Result<LogConfig> {
    let mut config = match &cli.config {
        Some(path) => LogConfig::load(path).await?,
        None => {
            let mut config = LogConfig::default();
            config.load_env_overrides();
            config
        }
    };

    // Apply CLI overrides
    if let Some(level) = &cli.level {
        config.level = level.parse()?;
    }

    if let Some(prefix) = &cli.prefix {
        config.file_prefix = prefix.clone();
    }

    if let Some(log_dir) = &cli.log_dir {
        config.log_dir = log_dir.clone();
    }

    if let Some(max_bytes) = &cli.max_bytes {
        config.rolling.max_bytes = quill_core::config::parse_size(max_bytes)?;
    }

    if let Some(interval) = &cli.interval {
        config.rolling.time_interval = interval.parse::<TimeInterval>()?;
    }

    config.validate()?;

    info!(
        quill.event = "log_config_created",
        log_dir = %config.log_dir.display(),
        file_prefix = %config.file_prefix,
        level = %config.level,
        time_interval = %config.rolling.time_interval,
        max_bytes = config.rolling.max_bytes,
        "Log configuration created"
    );

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before parsing configuration
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let stdin_level: LogLevel = cli.stdin_level.parse()?;

    let config = create_log_config(&cli).await?;
    let logger = Logger::new(config).await.map_err(|e| {
        anyhow::anyhow!("Logger initialization failed: {}", e)
    })?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Err(e) = logger.log(stdin_level, line) {
            warn!(error = %e, "Log record rejected");
            break;
        }
    }

    logger.shutdown().await?;

    let stats = logger.stats();
    info!(
        quill.event = "run_summary",
        records_written = stats.records_written,
        bytes_written = stats.bytes_written,
        rotations = stats.rotations,
        write_errors = stats.write_errors,
        "Input closed"
    );

    Ok(())
}
