//! Basic logger usage example
//!
//! Writes a burst of records into `./example_logs` with a small size
//! threshold so rotation is visible, then shuts down cleanly.
//!
//! Run with: cargo run -p quill-core --example basic_usage

use quill_core::{LogConfig, LogLevel, Logger, TimeInterval};

#[tokio::main]
async fn main() -> quill_core::Result<()> {
    let config = LogConfig::builder()
        .level(LogLevel::Debug)
        .log_dir("./example_logs")
        .file_prefix("basic-")
        .time_interval(TimeInterval::Hourly)
        .max_bytes(4 * 1024)
        .build()?;

    let logger = Logger::new(config).await?;

    logger.debug("This is a debug message");
    logger.info("This is an info message");
    logger.warn("This is a warning message");
    logger.error("This is an error message");

    for i in 0..200 {
        quill_core::info!(logger, "request {} handled in {}ms", i, i % 17);
    }

    logger.flush().await?;
    let stats = logger.stats();
    println!(
        "wrote {} records ({} bytes) across {} rotations; active file: {:?}",
        stats.records_written,
        stats.bytes_written,
        stats.rotations,
        logger.current_file()
    );

    logger.shutdown().await?;
    Ok(())
}
