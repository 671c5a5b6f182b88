use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The resume point for the next incremental run: the last reference-column
/// or id value successfully synchronized.
///
/// Persisted by the CRUD layer as opaque text, so encoding must stay stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncCursor {
    None,
    Timestamp(DateTime<Utc>),
    Id(i64),
}

impl SyncCursor {
    /// Parses the opaque persisted form. Garbage parses to `None` rather
    /// than failing: a corrupted cursor means "start over", not "abort".
    pub fn parse(raw: Option<&str>) -> SyncCursor {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return SyncCursor::None;
        };

        if let Ok(id) = raw.parse::<i64>() {
            return SyncCursor::Id(id);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return SyncCursor::Timestamp(ts.with_timezone(&Utc));
        }
        if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return SyncCursor::Timestamp(Utc.from_utc_datetime(&ts));
        }
        SyncCursor::None
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            SyncCursor::Id(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncCursor::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncCursor::None => Ok(()),
            SyncCursor::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            SyncCursor::Id(id) => write!(f, "{id}"),
        }
    }
}
