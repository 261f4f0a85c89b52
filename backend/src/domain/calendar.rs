//! Calendar helpers for day buckets and the midnight rollover.
//!
//! A day is the local midnight-to-midnight window. Windows are half-open,
//! `[midnight, next midnight)`, so consecutive days never overlap.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use shared::DateRange;

/// Instant the local `date` begins.
///
/// When midnight falls into a DST gap the first valid local time after it is
/// used; when it is ambiguous the earlier instant wins.
pub fn local_midnight(date: NaiveDate) -> DateTime<Local> {
    let naive = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => (1..=180)
            .find_map(|minutes| {
                Local
                    .from_local_datetime(&(naive + Duration::minutes(minutes)))
                    .earliest()
            })
            .unwrap_or_else(|| naive.and_utc().with_timezone(&Local)),
    }
}

/// `[start, end)` of the local day `date`, as UTC instants
pub fn day_window(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(date).with_timezone(&Utc);
    let end = date
        .succ_opt()
        .map(|next| local_midnight(next).with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start, end)
}

/// Local calendar day an instant falls on
pub fn local_date_of(instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&Local).date_naive()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Time left until `target`, zero when it already passed
pub fn duration_until(target: DateTime<Local>, now: DateTime<Local>) -> std::time::Duration {
    target
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(std::time::Duration::ZERO)
}

/// Number of days a rental spans, counting both endpoints.
///
/// Returns 0 when either endpoint is unset.
pub fn compute_span(start: Option<NaiveDate>, end: Option<NaiveDate>) -> u64 {
    match (start, end) {
        (Some(start), Some(end)) => end.signed_duration_since(start).num_days().unsigned_abs() + 1,
        _ => 0,
    }
}

pub fn span_of(range: &DateRange) -> u64 {
    compute_span(Some(range.start_date), Some(range.end_date))
}
