//! Line formatting

use crate::LogRecord;
use chrono::SecondsFormat;

/// Produces the exact text appended for one record, trailing newline included
pub trait LineFormatter: Send + Sync + 'static {
    fn format(&self, record: &LogRecord) -> String;
}

/// `[2024-05-01T12:00:00.000Z] [INFO]: src/main.rs:10 app() message`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl LineFormatter for DefaultFormatter {
    fn format(&self, record: &LogRecord) -> String {
        format!(
            "[{}] [{}]: {} {}\n",
            record.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level(),
            record.caller(),
            record.message()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_default_layout() {
        let record = LogRecord::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            LogLevel::Warn,
            "src/main.rs:10 app()",
            "disk almost full",
        );

        assert_eq!(
            DefaultFormatter.format(&record),
            "[2024-05-01T12:00:00.000Z] [WARN]: src/main.rs:10 app() disk almost full\n"
        );
    }
}
