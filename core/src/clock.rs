//! Wall clock for lifecycle timestamps.
//!
//! RULE: Nothing in core reads the system time directly.
//! `createdAt` and `promotedAt` come from an injected Clock so that
//! tests and replays are reproducible.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant. Used in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Fixed at 2024-01-15T09:30:00Z.
    pub fn default_test() -> Self {
        let at = DateTime::parse_from_rfc3339("2024-01-15T09:30:00Z")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }
}
