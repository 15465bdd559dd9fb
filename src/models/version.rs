//! Version tokens for optimistic concurrency control

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Last-modification timestamp of a record, compared by every guarded update.
///
/// Tokens are kept at microsecond resolution so a token read back from the
/// database compares equal to the one that was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(DateTime<Utc>);

impl VersionToken {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at.trunc_subsecs(6))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Token stored by a successful update made at `now`.
    ///
    /// Never equal to `self`, even when the clock has not advanced since the
    /// previous write.
    pub fn successor(self, now: DateTime<Utc>) -> Self {
        let now = now.trunc_subsecs(6);
        if now > self.0 {
            Self(now)
        } else {
            Self(self.0 + Duration::microseconds(1))
        }
    }
}

impl From<DateTime<Utc>> for VersionToken {
    fn from(at: DateTime<Utc>) -> Self {
        Self::new(at)
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_truncates_to_microseconds() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let token = VersionToken::new(at);
        assert_eq!(token.as_datetime().timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_successor_follows_clock() {
        let token = VersionToken::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let later = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
        assert_eq!(token.successor(later).as_datetime(), later);
    }

    #[test]
    fn test_successor_is_distinct_when_clock_stalls() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let token = VersionToken::new(at);
        let next = token.successor(at);
        assert!(next > token);
        assert_eq!(next.as_datetime() - at, Duration::microseconds(1));

        // A clock running behind the stored token still moves the version forward
        let earlier = at - Duration::seconds(5);
        assert!(token.successor(earlier) > token);
    }
}
