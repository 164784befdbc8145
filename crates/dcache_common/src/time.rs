//! Whole-second wall-clock timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
///
/// File modification times and record bookkeeping times are both stored with
/// whole-second resolution. The value `0` means "unknown"; records whose
/// primary source timestamp is unknown are never trusted as fresh.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The unknown timestamp.
    pub const UNKNOWN: Timestamp = Timestamp(0);

    /// Creates a timestamp from seconds since the Unix epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Converts a `SystemTime`, truncating to whole seconds.
    ///
    /// Times before the epoch map to negative values rather than to
    /// [`Timestamp::UNKNOWN`].
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self(d.as_secs() as i64),
            Err(e) => {
                let before = e.duration();
                let secs = before.as_secs() as i64 + i64::from(before.subsec_nanos() > 0);
                Self(-secs)
            }
        }
    }

    /// Converts back to a `SystemTime`.
    pub fn to_system_time(self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.0.unsigned_abs())
        }
    }

    /// Returns the number of seconds since the Unix epoch.
    pub fn secs(self) -> i64 {
        self.0
    }

    /// Returns `true` if this is [`Timestamp::UNKNOWN`].
    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }

    /// Returns the whole seconds elapsed from `earlier` to `self`, or zero if
    /// `earlier` is later.
    pub fn seconds_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0).max(0) as u64
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("unknown")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unknown() {
        assert!(Timestamp::default().is_unknown());
        assert_eq!(Timestamp::default(), Timestamp::UNKNOWN);
    }

    #[test]
    fn system_time_roundtrip() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let ts = Timestamp::from_system_time(t);
        assert_eq!(ts.secs(), 1_700_000_000);
        assert_eq!(ts.to_system_time(), t);
    }

    #[test]
    fn subsecond_truncated() {
        let t = UNIX_EPOCH + Duration::from_millis(5_750);
        assert_eq!(Timestamp::from_system_time(t).secs(), 5);
    }

    #[test]
    fn before_epoch_is_negative() {
        let t = UNIX_EPOCH - Duration::from_secs(10);
        let ts = Timestamp::from_system_time(t);
        assert_eq!(ts.secs(), -10);
        assert!(!ts.is_unknown());
    }

    #[test]
    fn seconds_since_saturates() {
        let a = Timestamp::from_secs(100);
        let b = Timestamp::from_secs(130);
        assert_eq!(b.seconds_since(a), 30);
        assert_eq!(a.seconds_since(b), 0);
    }

    #[test]
    fn ordering() {
        let mut v = vec![
            Timestamp::from_secs(5),
            Timestamp::from_secs(1),
            Timestamp::from_secs(3),
        ];
        v.sort();
        assert_eq!(v, vec![
            Timestamp::from_secs(1),
            Timestamp::from_secs(3),
            Timestamp::from_secs(5)
        ]);
    }

    #[test]
    fn display_unknown() {
        assert_eq!(Timestamp::UNKNOWN.to_string(), "unknown");
        assert_eq!(Timestamp::from_secs(42).to_string(), "42");
    }

    #[test]
    fn serde_transparent() {
        let json = serde_json::to_string(&Timestamp::from_secs(7)).unwrap();
        assert_eq!(json, "7");
    }
}
