mod record;
mod run;
mod task;

pub use record::{ContentRecordRow, DuplicateLinkRow};
pub use run::RunRow;
pub use task::TaskRow;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub(crate) fn millis_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

pub(crate) fn datetime_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_default()
}
