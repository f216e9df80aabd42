//! Utilities. OBVIOUSLY.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::ops::Deref;
use std::str::FromStr;

pub(crate) mod ser;

/// A library-local representation of a time.
///
/// We want to do the Right Thing when serializing, and this is often much
/// easier with a wrapper type. Chain statements and cache records both store
/// times as unix seconds, so that's what the wire form is here too. Any place
/// that takes a `Timestamp` will receive anything convertable via `From/Into`,
/// and you can always get the underlying type via a `&timestamp` deref.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(#[serde(with = "chrono::serde::ts_seconds")] DateTime<Utc>);

impl Timestamp {
    /// Create a new Timestamp from the current date/time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from unix seconds. Out-of-range values clamp to the
    /// epoch.
    pub fn from_unix(secs: i64) -> Self {
        Self(DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Unix seconds.
    pub fn unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// How long ago (relative to `now`) this timestamp was. Times in the
    /// future count as zero.
    pub fn elapsed_at(&self, now: &Timestamp) -> std::time::Duration {
        now.0.signed_duration_since(self.0).to_std().unwrap_or_default()
    }
}

impl Deref for Timestamp {
    type Target = DateTime<Utc>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(naive: NaiveDateTime) -> Self {
        Self(naive.and_utc())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(date: DateTime<Utc>) -> Self {
        Self(date)
    }
}

impl FromStr for Timestamp {
    type Err = chrono::format::ParseError;
    fn from_str(s: &str) -> std::result::Result<Timestamp, Self::Err> {
        let datetime: DateTime<Utc> = s.parse()?;
        Ok(Timestamp(datetime))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S %Z"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timestamp_unix_roundtrip() {
        let ts = Timestamp::from_str("2015-10-21T07:28:00Z").unwrap();
        assert_eq!(ts.unix(), 1445412480);
        assert_eq!(Timestamp::from_unix(1445412480), ts);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1445412480");
        let ts2: Timestamp = serde_json::from_str("1445412480").unwrap();
        assert_eq!(ts2, ts);
    }

    #[test]
    fn timestamp_elapsed() {
        let then = Timestamp::from_str("2015-10-21T07:28:00Z").unwrap();
        let now = Timestamp::from_str("2015-10-21T07:29:30Z").unwrap();
        assert_eq!(then.elapsed_at(&now), Duration::from_secs(90));
        // the future hasn't elapsed yet
        assert_eq!(now.elapsed_at(&then), Duration::from_secs(0));
    }
}
