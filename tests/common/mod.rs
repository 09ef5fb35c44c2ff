use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tearsheet::DatedFrame;

/// `n` consecutive weekdays starting at `start` (moved forward if it falls on a weekend).
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    std::iter::successors(Some(start), |d| Some(*d + Duration::days(1)))
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(n)
        .collect()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn frame(dates: &[NaiveDate], columns: Vec<(&str, Vec<f64>)>) -> DatedFrame {
    DatedFrame::from_columns(dates, columns).expect("Failed to build frame")
}

/// Deterministic, mildly trending returns in roughly [-1.5%, +2%].
pub fn synthetic_returns(n: usize, phase: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let step = ((i * 7 + phase * 3) % 11) as f64;
            (step - 4.5) / 300.0
        })
        .collect()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() < tol,
        "expected {expected}, found {actual}"
    );
}
