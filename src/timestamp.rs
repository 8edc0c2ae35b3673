//! Unix timestamp helpers for authorization and session deadlines.

use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    /// Current wall-clock time. Panics only if the system clock is set
    /// before the epoch, which is not a condition this crate recovers from.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();
        UnixTimestamp(secs)
    }

    pub fn from_secs(secs: u64) -> Self {
        UnixTimestamp(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
