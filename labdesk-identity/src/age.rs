//! Calendar age from a date of birth.

use chrono::{DateTime, Datelike, NaiveDate};

/// Whole years between `birth` and `today`, counting a year only once the
/// birthday has been reached. Birth dates after `today` have no age.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and other text starting with a
/// `YYYY-MM-DD` date. Timestamps keep the date as written, not shifted to UTC.
pub fn parse_birth_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.date_naive());
    }
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}
