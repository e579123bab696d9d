//! # Clocks and Calendar Dates
//!
//! The registry never calls `Utc::now()` directly. It asks a [`Clock`], so
//! that fingerprint salting can be strictly monotonic in production and fully
//! controlled in tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::ValidationError;

/// Source of the current instant.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock that never returns the same instant twice.
///
/// If the system clock has not advanced (or stepped backwards) since the last
/// reading, the previous reading plus one nanosecond is returned instead.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_nanos: AtomicI64,
}

impl SystemClock {
    /// Create a new monotonic wall clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut prev = self.last_nanos.load(Ordering::Acquire);
        loop {
            let next = if wall > prev { wall } else { prev.saturating_add(1) };
            match self.last_nanos.compare_exchange_weak(
                prev,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return DateTime::from_timestamp_nanos(next),
                Err(actual) => prev = actual,
            }
        }
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    nanos: AtomicI64,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            nanos: AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(0)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let step = by.num_nanoseconds().unwrap_or(i64::MAX);
        self.nanos.fetch_add(step, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Parse a `YYYY-MM-DD` calendar date, naming `field` in the error.
pub fn parse_calendar_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        field,
        value: trimmed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut last = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn manual_clock_holds_until_advanced() {
        let start = DateTime::from_timestamp(1_735_689_600, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::milliseconds(5));
        assert_eq!(clock.now(), start + chrono::Duration::milliseconds(5));
    }

    #[test]
    fn calendar_dates() {
        assert_eq!(
            parse_calendar_date("issueDate", " 2025-01-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert_eq!(
            parse_calendar_date("issueDate", ""),
            Err(ValidationError::MissingField { field: "issueDate" })
        );
        assert!(matches!(
            parse_calendar_date("dob", "01/02/2003"),
            Err(ValidationError::InvalidDate { field: "dob", .. })
        ));
        assert!(parse_calendar_date("dob", "2025-02-30").is_err());
    }
}
