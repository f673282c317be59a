//! Packet timestamps: seconds since the Unix epoch plus nanoseconds.

use std::time::{SystemTime, UNIX_EPOCH};

/// A 64-bit wire timestamp: `seconds` (i32 LE) followed by `nanoseconds` (i32 LE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i32,
    pub nanoseconds: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { seconds: 0, nanoseconds: 0 };

    /// Capture the current wall-clock time.
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: dur.as_secs() as i32,
            nanoseconds: dur.subsec_nanos() as i32,
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::ZERO
    }
}
