//! Absolute deadlines
//!
//! A [`Deadline`] is a fixed point on tokio's clock. It is computed once from
//! a relative timeout and then handed down unchanged, so nested stages never
//! extend the time a caller granted.

use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Stand-in for "no deadline" when a timeout is too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// An absolute point in time after which a call is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// Deadline at `instant`.
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        Self(now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE))
    }

    /// The underlying instant.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// The tighter of this deadline and an optional inherited one.
    pub fn earliest(self, other: Option<Deadline>) -> Deadline {
        match other {
            Some(other) if other < self => other,
            _ => self,
        }
    }

    /// Future completing when the deadline passes.
    pub fn sleep(&self) -> Sleep {
        tokio::time::sleep_until(self.0)
    }
}
