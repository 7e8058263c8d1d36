use chrono::{Datelike, FixedOffset, NaiveDate, Utc};

/// Whole years elapsed between `birth_date` and `today`.
///
/// Uses calendar fields only. A birth date in the future yields `None`.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut age = today.year() - birth_date.year();

    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }

    u32::try_from(age).ok()
}

/// Calendar date at the sheet's local offset.
pub fn local_today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// Parses the `YYYY-MM-DD` form used by date inputs and the backend.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}
