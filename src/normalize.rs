//! Raw worksheet rows to typed lead records.
//!
//! Field-level parse failures never fail the load: the field becomes `None`
//! and the record is kept.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::dataset::{
    is_email_status_column, Dataset, Record, CONNECTION_STATUS, CURRENT_EMPLOYER,
    DATE_GENERATED, EXPERIENCE_YEARS, FIT_SCORE, LOCATION,
};
use crate::source::{RawRecord, RawSheet};

/// Day-first formats are tried before ISO; sheets are filled in dd/mm/yyyy.
const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Normalize a worksheet into a dataset.
///
/// A sheet without headers yields an empty dataset. Row order is kept.
pub fn normalize(sheet: RawSheet) -> Dataset {
    if sheet.headers.is_empty() {
        return Dataset::empty();
    }

    let records: Vec<Record> = sheet
        .rows
        .into_iter()
        .enumerate()
        .map(|(idx, raw)| normalize_record(raw, idx + 2))
        .collect();

    Dataset::new(sheet.headers, records)
}

/// Normalize one row. `row_number` is the 1-based sheet row, for logs.
pub fn normalize_record(mut raw: RawRecord, row_number: usize) -> Record {
    let date_generated = raw
        .remove(DATE_GENERATED)
        .and_then(|v| parse_logged(&v, parse_date, DATE_GENERATED, row_number));
    let fit_score = raw
        .remove(FIT_SCORE)
        .and_then(|v| parse_logged(&v, parse_number, FIT_SCORE, row_number));
    let experience_years = raw
        .remove(EXPERIENCE_YEARS)
        .and_then(|v| parse_logged(&v, parse_number, EXPERIENCE_YEARS, row_number));

    let connection_status = raw.remove(CONNECTION_STATUS);
    let current_employer = raw.remove(CURRENT_EMPLOYER);
    let location = raw.remove(LOCATION);

    let mut record = Record {
        date_generated,
        fit_score,
        experience_years,
        connection_status,
        current_employer,
        location,
        ..Default::default()
    };

    for (header, value) in raw {
        if is_email_status_column(&header) {
            record.email_statuses.insert(header, value);
        } else {
            record.extra.insert(header, value);
        }
    }

    record
}

fn parse_logged<T>(
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
    column: &str,
    row_number: usize,
) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() && !value.trim().is_empty() {
        log::debug!(
            "normalize: row {} column '{}' value {:?} not parseable, using null",
            row_number,
            column,
            value
        );
    }
    parsed
}

/// Parse a calendar date. Timestamps keep only their date part.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Parse a finite number. `NaN` and infinities are rejected.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn sheet(headers: &[&str], rows: Vec<RawRecord>) -> RawSheet {
        RawSheet {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_parse_date_day_first() {
        assert_eq!(
            parse_date("05/03/2025"),
            NaiveDate::from_ymd_opt(2025, 3, 5)
        );
        assert_eq!(
            parse_date(" 31/12/2024 "),
            NaiveDate::from_ymd_opt(2024, 12, 31)
        );
    }

    #[test]
    fn test_parse_date_iso_and_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5);
        assert_eq!(parse_date("2025-03-05"), expected);
        assert_eq!(parse_date("2025-03-05 14:30:00"), expected);
        assert_eq!(parse_date("2025-03-05T14:30:00Z"), expected);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date("32/01/2025"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("80"), Some(80.0));
        assert_eq!(parse_number(" 7.5 "), Some(7.5));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_non_numeric_fit_score_becomes_null() {
        let dataset = normalize(sheet(
            &[FIT_SCORE, CONNECTION_STATUS],
            vec![
                raw(&[(FIT_SCORE, "high"), (CONNECTION_STATUS, "Sent")]),
                raw(&[(FIT_SCORE, "72"), (CONNECTION_STATUS, "Sent")]),
            ],
        ));
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[0].fit_score, None);
        assert_eq!(dataset.records()[1].fit_score, Some(72.0));
    }

    #[test]
    fn test_unparseable_date_keeps_record() {
        let dataset = normalize(sheet(
            &[DATE_GENERATED, "Name"],
            vec![raw(&[(DATE_GENERATED, "soon"), ("Name", "Ada")])],
        ));
        assert_eq!(dataset.len(), 1);
        let record = &dataset.records()[0];
        assert_eq!(record.date_generated, None);
        assert_eq!(record.extra.get("Name").map(String::as_str), Some("Ada"));
    }

    #[test]
    fn test_blank_cell_distinct_from_absent_column() {
        let dataset = normalize(sheet(
            &[CONNECTION_STATUS],
            vec![raw(&[(CONNECTION_STATUS, "")])],
        ));
        let record = &dataset.records()[0];
        assert_eq!(record.connection_status.as_deref(), Some(""));
        assert_eq!(record.location, None);
    }

    #[test]
    fn test_email_columns_are_collected() {
        let dataset = normalize(sheet(
            &["Email Status 1", "Email Status 2", "Company Size"],
            vec![raw(&[
                ("Email Status 1", "Opened"),
                ("Email Status 2", ""),
                ("Company Size", "50"),
            ])],
        ));
        let record = &dataset.records()[0];
        assert_eq!(record.email_statuses.len(), 2);
        assert_eq!(record.email_statuses["Email Status 1"], "Opened");
        assert_eq!(record.extra["Company Size"], "50");
        assert_eq!(
            dataset.capabilities().email_status_columns,
            vec!["Email Status 1", "Email Status 2"]
        );
    }

    #[test]
    fn test_empty_input_yields_empty_dataset() {
        assert!(normalize(RawSheet::default()).is_empty());

        let headers_only = normalize(sheet(&[FIT_SCORE], Vec::new()));
        assert!(headers_only.is_empty());
        assert!(headers_only.capabilities().fit_score);
    }

    #[test]
    fn test_row_order_preserved() {
        let dataset = normalize(sheet(
            &[FIT_SCORE],
            vec![
                raw(&[(FIT_SCORE, "3")]),
                raw(&[(FIT_SCORE, "1")]),
                raw(&[(FIT_SCORE, "2")]),
            ],
        ));
        let scores: Vec<_> = dataset.iter().map(|r| r.fit_score).collect();
        assert_eq!(scores, vec![Some(3.0), Some(1.0), Some(2.0)]);
    }
}
