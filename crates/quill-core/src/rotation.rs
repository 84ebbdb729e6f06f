//! Rotation decisions
//!
//! Time-based rotation follows calendar boundaries in UTC: an hourly file
//! rotates when the hour component changes, not after 3600 seconds. Month
//! and year boundaries come from the calendar, so month lengths and leap
//! years need no special handling.

use crate::config::{RollingConfig, TimeInterval};
use crate::file::ActiveFile;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Why a rotation is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTrigger {
    /// `now` is in a different calendar unit than the open time
    Time,
    /// Appending the pending record would exceed `max_bytes`
    Size,
}

impl RotationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationTrigger::Time => "time",
            RotationTrigger::Size => "size",
        }
    }
}

/// Calendar unit identity of an instant for a given interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period(i32, u32, u32, u32);

impl Period {
    pub fn of(interval: TimeInterval, at: DateTime<Utc>) -> Self {
        match interval {
            TimeInterval::Minutely => Period(at.year(), at.ordinal(), at.hour(), at.minute()),
            TimeInterval::Hourly => Period(at.year(), at.ordinal(), at.hour(), 0),
            TimeInterval::Daily => Period(at.year(), at.ordinal(), 0, 0),
            TimeInterval::Weekly => {
                let week = at.iso_week();
                Period(week.year(), week.week(), 0, 0)
            }
            TimeInterval::Monthly => Period(at.year(), at.month(), 0, 0),
            TimeInterval::Yearly => Period(at.year(), 0, 0, 0),
        }
    }
}

/// Pure rotation check against fixed thresholds
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    thresholds: RollingConfig,
}

impl RotationPolicy {
    pub fn new(thresholds: RollingConfig) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RollingConfig {
        self.thresholds
    }

    /// Decide whether the active file must be replaced before appending
    /// `pending_bytes`.
    ///
    /// The size rule only applies to a file that already holds data, so a
    /// single oversized record lands in a fresh file instead of rotating
    /// forever.
    pub fn evaluate(
        &self,
        opened_at: DateTime<Utc>,
        bytes_written: u64,
        pending_bytes: u64,
        now: DateTime<Utc>,
    ) -> Option<RotationTrigger> {
        let interval = self.thresholds.time_interval;
        if Period::of(interval, opened_at) != Period::of(interval, now) {
            return Some(RotationTrigger::Time);
        }

        if bytes_written > 0
            && bytes_written.saturating_add(pending_bytes) > self.thresholds.max_bytes
        {
            return Some(RotationTrigger::Size);
        }

        None
    }

    pub fn should_rotate(&self, file: &ActiveFile, pending_bytes: u64, now: DateTime<Utc>) -> bool {
        self.evaluate(file.opened_at(), file.bytes_written(), pending_bytes, now)
            .is_some()
    }
}
