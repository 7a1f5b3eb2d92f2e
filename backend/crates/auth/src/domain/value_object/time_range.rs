use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::{AuthError, AuthResult};

/// Closed interval `[start, end]` over audit timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AuthResult<Self> {
        if start > end {
            return Err(AuthError::BadRequest(
                "time range start must not be after its end".into(),
            ));
        }
        Ok(Self { start, end })
    }

    /// The `duration` leading up to `now`
    pub fn last(duration: Duration, now: DateTime<Utc>) -> Self {
        Self {
            start: now - duration,
            end: now,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
