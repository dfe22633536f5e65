use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%d-%b-%Y", "%d %b %Y", "%b %d %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%SZ"];

/// Parse a BioSample `collection_date` and return its calendar year.
///
/// Accepts full ISO dates, INSDC partial dates (`2020`, `2020-03`, `Mar-2020`,
/// `12-Mar-2020`) and timestamps. Anything else, including `missing` or
/// `not collected`, yields `None`.
pub fn collection_year(value: &str) -> Option<i32> {
    parse_collection_date(value).map(|date| date.year())
}

pub fn parse_collection_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.len() == 4 && value.chars().all(|ch| ch.is_ascii_digit()) {
        let year = value.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }

    // year-month and month-year partial dates
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("01-{value}"), "%d-%b-%Y") {
        return Some(date);
    }
    None
}

pub fn year_in_range(year: i32, start: Option<i32>, end: Option<i32>) -> bool {
    start.is_none_or(|start| year >= start) && end.is_none_or(|end| year <= end)
}
