//! Utility functions for the prepcast crate

use crate::data::{Dataset, Record};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a calendar date in any of the accepted upload formats.
///
/// Timestamps are accepted and truncated to their date.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|datetime| datetime.date_naive())
}

/// Every date from `start` through `end` inclusive
pub fn date_span(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = Some(start);
    while let Some(date) = current.filter(|date| *date <= end) {
        dates.push(date);
        current = date.succ_opt();
    }
    dates
}

/// Monday of the ISO week containing `date`, clamped to the earliest
/// representable date
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = Days::new(u64::from(date.weekday().num_days_from_monday()));
    date.checked_sub_days(offset).unwrap_or(NaiveDate::MIN)
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Split a dataset into training and hold-out records by date.
///
/// The trailing `holdout_ratio` share of distinct dates (rounded, at most all
/// but one date) is held out so evaluation never sees dates earlier than
/// training.
pub fn train_test_split(dataset: &Dataset, holdout_ratio: f64) -> Result<(Vec<Record>, Vec<Record>)> {
    if !(0.0..1.0).contains(&holdout_ratio) {
        return Err(PipelineError::InvalidParameter(format!(
            "holdout_ratio must be in [0, 1), got {}",
            holdout_ratio
        )));
    }

    let dates = dataset.dates();
    if dates.is_empty() || holdout_ratio == 0.0 {
        return Ok((dataset.records().to_vec(), Vec::new()));
    }

    let test_size = ((dates.len() as f64 * holdout_ratio).round() as usize).min(dates.len() - 1);
    let cutoff = dates[dates.len() - test_size..].first().copied();

    let (train, test) = match cutoff {
        Some(cutoff) => dataset
            .records()
            .iter()
            .cloned()
            .partition(|record| record.date < cutoff),
        None => (dataset.records().to_vec(), Vec::new()),
    };

    Ok((train, test))
}
