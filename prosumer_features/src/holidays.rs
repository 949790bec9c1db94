use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeSet;

/// Estonian public holidays over a closed range of years.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn for_years(first: i32, last: i32) -> Self {
        let mut dates = BTreeSet::new();
        for year in first..=last {
            for (month, day) in FIXED {
                if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                    dates.insert(date);
                }
            }
            if let Some(easter) = easter_sunday(year) {
                dates.insert(easter - Duration::days(2)); // Good Friday
                dates.insert(easter);
                dates.insert(easter + Duration::days(49)); // Pentecost
            }
        }
        Self { dates }
    }

    pub fn is_holiday(&self, year: i32, month: u32, day: u32) -> bool {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|date| self.dates.contains(&date))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The calendar as a Date series, for vectorised `is_in` lookups.
    pub fn as_date_series(&self, name: &str) -> PolarsResult<Series> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let days: Vec<i32> = self
            .dates
            .iter()
            .map(|d| (*d - epoch).num_days() as i32)
            .collect();
        Series::new(name.into(), days).cast(&DataType::Date)
    }

    /// Boolean expression: is `date_column` one of the holidays.
    pub fn flag(&self, date_column: &str) -> PolarsResult<Expr> {
        Ok(col(date_column).is_in(lit(self.as_date_series(date_column)?)))
    }
}

const FIXED: [(u32, u32); 9] = [
    (1, 1),   // New Year's Day
    (2, 24),  // Independence Day
    (5, 1),   // Spring Day
    (6, 23),  // Victory Day
    (6, 24),  // Midsummer Day
    (8, 20),  // Restoration of Independence
    (12, 24), // Christmas Eve
    (12, 25), // Christmas Day
    (12, 26), // Boxing Day
];

/// Anonymous Gregorian computus.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

impl Default for HolidayCalendar {
    fn default() -> Self {
        Self::for_years(2021, 2025)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_easter_dates() {
        assert_eq!(easter_sunday(2022), NaiveDate::from_ymd_opt(2022, 4, 17));
        assert_eq!(easter_sunday(2023), NaiveDate::from_ymd_opt(2023, 4, 9));
        assert_eq!(easter_sunday(2024), NaiveDate::from_ymd_opt(2024, 3, 31));
    }

    #[test]
    fn test_fixed_and_movable_holidays() {
        let calendar = HolidayCalendar::for_years(2021, 2025);
        assert!(calendar.is_holiday(2023, 2, 24));
        assert!(calendar.is_holiday(2023, 6, 23));
        assert!(calendar.is_holiday(2023, 4, 7)); // Good Friday
        assert!(calendar.is_holiday(2023, 5, 28)); // Pentecost
        assert!(!calendar.is_holiday(2023, 4, 10));
        assert!(!calendar.is_holiday(2023, 1, 10));
        assert!(!calendar.is_holiday(2026, 1, 1));
        assert!(!calendar.is_holiday(2023, 2, 30));
        assert_eq!(calendar.len(), 5 * 12);
        assert!(!calendar.is_empty());
        assert!(HolidayCalendar::for_years(2025, 2021).is_empty());
    }

    #[test]
    fn test_flag_expression() {
        let calendar = HolidayCalendar::for_years(2023, 2023);
        let df = DataFrame::new(vec![crate::test_support::dates(
            "date",
            &["2023-12-25", "2023-12-27"],
        )])
        .unwrap();
        let out = df
            .lazy()
            .select([calendar.flag("date").unwrap().alias("is_country_holiday")])
            .collect()
            .unwrap();
        let flags = out.column("is_country_holiday").unwrap().bool().unwrap();
        assert_eq!(flags.get(0), Some(true));
        assert_eq!(flags.get(1), Some(false));
    }
}
