//! The date range a run covers.

use chrono::{Days, NaiveDate};

use crate::error::EtlError;

/// `[start, end)` as used by the warehouse query. The feed itself is asked
/// for `start_date=start&end_date=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FeedWindow {
    /// The `days` days leading up to `today`, with `today` as the end.
    pub fn trailing(today: NaiveDate, days: u32) -> Result<Self, EtlError> {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or_else(|| EtlError::Config(format!("window of {days} days underflows from {today}")))?;
        Ok(Self { start, end: today })
    }

    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_three_days() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        let window = FeedWindow::trailing(today, 3).unwrap();

        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 2, 28).unwrap());
        assert_eq!(window.end, today);
        assert_eq!(window.start_param(), "2024-02-28");
        assert_eq!(window.end_param(), "2024-03-02");
    }

    #[test]
    fn test_trailing_crosses_year() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let window = FeedWindow::trailing(today, 3).unwrap();
        assert_eq!(window.start_param(), "2024-12-29");
    }
}
