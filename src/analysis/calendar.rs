use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// First day of the UTC calendar month containing `instant`.
pub fn month_of(instant: DateTime<Utc>) -> NaiveDate {
    let date = instant.date_naive();
    date.with_day(1).unwrap_or(date)
}

pub fn next_month(month: NaiveDate) -> Option<NaiveDate> {
    month.checked_add_months(Months::new(1))
}

/// Midnight UTC at the start of `month`.
pub fn month_start(month: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&month.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Exclusive upper bound of `month`: the first instant of the next month.
pub fn month_end(month: NaiveDate) -> DateTime<Utc> {
    next_month(month)
        .map(month_start)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Every month from `first` to `last`, both inclusive. Empty when
/// `last < first`.
pub fn month_range(first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
    if last < first {
        return Vec::new();
    }
    std::iter::successors(Some(first), |month| {
        next_month(*month).filter(|next| *next <= last)
    })
    .collect()
}

/// Position of `month` in a contiguous range starting at `first`.
pub fn month_offset(first: NaiveDate, month: NaiveDate) -> Option<usize> {
    let delta = (month.year() - first.year()) * 12 + month.month() as i32 - first.month() as i32;
    usize::try_from(delta).ok()
}

/// Hours of the half-open interval `[start, end)` that fall inside `month`.
pub fn overlap_hours(start: DateTime<Utc>, end: DateTime<Utc>, month: NaiveDate) -> f64 {
    let clipped_start = start.max(month_start(month));
    let clipped_end = end.min(month_end(month));
    if clipped_end <= clipped_start {
        return 0.0;
    }
    (clipped_end - clipped_start).num_milliseconds() as f64 / MILLIS_PER_HOUR
}
