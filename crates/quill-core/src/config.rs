//! Logger configuration and management

use crate::{Error, LogLevel, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Smallest accepted size threshold
pub const MIN_MAX_BYTES: u64 = 100;

const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_FILE_PREFIX: &str = "quill-";
const DEFAULT_LOG_DIR: &str = "logs";

/// Main logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level written to disk
    pub level: LogLevel,

    /// Rotation thresholds
    pub rolling: RollingConfig,

    /// Prepended to every log file name
    pub file_prefix: String,

    /// Directory holding the log files, created on first open
    pub log_dir: PathBuf,

    /// Install SIGINT/SIGTERM handling when the logger is created
    pub handle_signals: bool,

    /// Terminate the process once a signal-triggered shutdown completes
    pub exit_on_signal: bool,
}

/// Rotation thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Calendar unit after which the active file is replaced
    pub time_interval: TimeInterval,

    /// Size in bytes after which the active file is replaced
    #[serde(deserialize_with = "deserialize_size")]
    pub max_bytes: u64,
}

/// Calendar unit for time-based rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeInterval {
    Minutely,
    #[default]
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl TimeInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInterval::Minutely => "minutely",
            TimeInterval::Hourly => "hourly",
            TimeInterval::Daily => "daily",
            TimeInterval::Weekly => "weekly",
            TimeInterval::Monthly => "monthly",
            TimeInterval::Yearly => "yearly",
        }
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "minute" | "minutely" => Ok(TimeInterval::Minutely),
            "hour" | "hourly" => Ok(TimeInterval::Hourly),
            "day" | "daily" => Ok(TimeInterval::Daily),
            "week" | "weekly" => Ok(TimeInterval::Weekly),
            "month" | "monthly" => Ok(TimeInterval::Monthly),
            "year" | "yearly" => Ok(TimeInterval::Yearly),
            _ => Err(Error::config(format!(
                "time interval must be one of minutely, hourly, daily, weekly, monthly, yearly; got {:?}",
                s
            ))),
        }
    }
}

impl Serialize for TimeInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TimeInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a byte size such as `512`, `10KB`, `5 MB` or `1gb`.
///
/// Units are binary multiples of 1024.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::config(format!("invalid size {:?}", input)))?;

    let multiplier: u64 = match unit.trim().to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        other => {
            return Err(Error::config(format!(
                "unknown size unit {:?} in {:?}",
                other, input
            )))
        }
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::config(format!("size {:?} overflows", input)))
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSize {
        Bytes(u64),
        Text(String),
    }

    match RawSize::deserialize(deserializer)? {
        RawSize::Bytes(bytes) => Ok(bytes),
        RawSize::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            time_interval: TimeInterval::default(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            rolling: RollingConfig::default(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            handle_signals: true,
            exit_on_signal: true,
        }
    }
}

impl LogConfig {
    /// Start a fluent builder from the defaults
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: LogConfig = serde_json::from_str(content).map_err(|e| Error::Config {
            message: format!("Failed to parse log config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file, or defaults when it does not exist
    pub async fn load(config_path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(config_path).await? {
            let content = tokio::fs::read_to_string(config_path).await?;
            Self::from_json_str(&content)
        } else {
            let mut config = Self::default();
            config.load_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    /// Save configuration as pretty JSON
    pub async fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(config_path, content).await?;
        Ok(())
    }

    /// Load environment variable overrides
    pub fn load_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("QUILL_LOG_LEVEL") {
            self.level = level.parse().unwrap_or(self.level);
        }

        if let Ok(dir) = std::env::var("QUILL_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }

        if let Ok(prefix) = std::env::var("QUILL_FILE_PREFIX") {
            self.file_prefix = prefix;
        }

        if let Ok(size) = std::env::var("QUILL_MAX_BYTES") {
            self.rolling.max_bytes = parse_size(&size).unwrap_or(self.rolling.max_bytes);
        }

        if let Ok(interval) = std::env::var("QUILL_TIME_INTERVAL") {
            self.rolling.time_interval = interval.parse().unwrap_or(self.rolling.time_interval);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.rolling.max_bytes < MIN_MAX_BYTES {
            return Err(Error::Config {
                message: format!(
                    "max_bytes must be at least {}, got {}",
                    MIN_MAX_BYTES, self.rolling.max_bytes
                ),
            });
        }

        if self.file_prefix.is_empty() {
            return Err(Error::config("file_prefix must not be empty"));
        }

        if self
            .file_prefix
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0')
        {
            return Err(Error::Config {
                message: format!(
                    "file_prefix must not contain path separators: {:?}",
                    self.file_prefix
                ),
            });
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(Error::config("log_dir must not be empty"));
        }

        Ok(())
    }
}

/// Fluent builder for [`LogConfig`]; every setter consumes and returns the builder
#[derive(Debug, Clone, Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn time_interval(mut self, interval: TimeInterval) -> Self {
        self.config.rolling.time_interval = interval;
        self
    }

    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.config.rolling.max_bytes = max_bytes;
        self
    }

    pub fn rolling(mut self, rolling: RollingConfig) -> Self {
        self.config.rolling = rolling;
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.config.handle_signals = enabled;
        self
    }

    pub fn exit_on_signal(mut self, enabled: bool) -> Self {
        self.config.exit_on_signal = enabled;
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<LogConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
