//! Typed frame builders shared by the unit tests.

use crate::models::{datetime_dtype, TableCatalog, DATETIME, ROW_ID, TARGET};
use crate::warehouse::SourceFrames;
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

pub(crate) type ReadingRow<'a> = (Option<f64>, i64, bool, i64, bool, &'a str, i64);
pub(crate) type TargetRow<'a> = (Option<f64>, i64, bool, i64, bool, &'a str);

pub(crate) fn datetime_value(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").unwrap()
}

pub(crate) fn date_value(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

/// `"2023-01-10 05:00"` style strings as a naive µs datetime column.
pub(crate) fn datetimes(name: &str, values: &[&str]) -> Series {
    let micros: Vec<i64> = values
        .iter()
        .map(|v| datetime_value(v).and_utc().timestamp_micros())
        .collect();
    Series::new(name.into(), micros).cast(&datetime_dtype()).unwrap()
}

pub(crate) fn dates(name: &str, values: &[&str]) -> Series {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    let days: Vec<i32> = values
        .iter()
        .map(|v| (date_value(v) - epoch).num_days() as i32)
        .collect();
    Series::new(name.into(), days).cast(&DataType::Date).unwrap()
}

pub(crate) fn empty_sources() -> SourceFrames {
    SourceFrames::empty(&TableCatalog::default()).unwrap()
}

pub(crate) fn reading_frame(rows: &[ReadingRow]) -> DataFrame {
    let stamps: Vec<&str> = rows.iter().map(|r| r.5).collect();
    DataFrame::new(vec![
        Series::new(TARGET.into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()),
        Series::new("county".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
        Series::new("is_business".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
        Series::new("product_type".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
        Series::new("is_consumption".into(), rows.iter().map(|r| r.4).collect::<Vec<_>>()),
        datetimes(DATETIME, &stamps),
        Series::new(ROW_ID.into(), rows.iter().map(|r| r.6).collect::<Vec<_>>()),
    ])
    .unwrap()
}

pub(crate) fn target_frame(rows: &[TargetRow]) -> DataFrame {
    let stamps: Vec<&str> = rows.iter().map(|r| r.5).collect();
    DataFrame::new(vec![
        Series::new(TARGET.into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()),
        Series::new("county".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
        Series::new("is_business".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
        Series::new("product_type".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
        Series::new("is_consumption".into(), rows.iter().map(|r| r.4).collect::<Vec<_>>()),
        datetimes(DATETIME, &stamps),
    ])
    .unwrap()
}

/// Rows of (product_type, county, eic_count, installed_capacity, is_business, date).
pub(crate) fn client_frame(rows: &[(i64, i64, i64, f64, bool, &str)]) -> DataFrame {
    let days: Vec<&str> = rows.iter().map(|r| r.5).collect();
    DataFrame::new(vec![
        Series::new("product_type".into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()),
        Series::new("county".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
        Series::new("eic_count".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
        Series::new("installed_capacity".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
        Series::new("is_business".into(), rows.iter().map(|r| r.4).collect::<Vec<_>>()),
        dates("date", &days),
    ])
    .unwrap()
}

/// Rows of (forecast_datetime, latitude, longitude, hours_ahead, temperature).
/// Every other weather column is null.
pub(crate) fn forecast_frame(rows: &[(&str, f32, f32, i64, f64)]) -> DataFrame {
    let stamps: Vec<&str> = rows.iter().map(|r| r.0).collect();
    TableCatalog::default()
        .forecast_weather
        .null_padded(
            rows.len(),
            vec![
                datetimes("forecast_datetime", &stamps),
                Series::new("latitude".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
                Series::new("longitude".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
                Series::new("hours_ahead".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
                Series::new("temperature".into(), rows.iter().map(|r| r.4).collect::<Vec<_>>()),
            ],
        )
        .unwrap()
}

/// Rows of (datetime, latitude, longitude, temperature).
pub(crate) fn historical_frame(rows: &[(&str, f32, f32, f64)]) -> DataFrame {
    let stamps: Vec<&str> = rows.iter().map(|r| r.0).collect();
    TableCatalog::default()
        .historical_weather
        .null_padded(
            rows.len(),
            vec![
                datetimes(DATETIME, &stamps),
                Series::new("latitude".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
                Series::new("longitude".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
                Series::new("temperature".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()),
            ],
        )
        .unwrap()
}

/// Rows of (longitude, latitude, county).
pub(crate) fn station_frame(rows: &[(f32, f32, Option<i64>)]) -> DataFrame {
    DataFrame::new(vec![
        Series::new("longitude".into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()),
        Series::new("latitude".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()),
        Series::new("county".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()),
    ])
    .unwrap()
}

/// Scenario A: one reading and the client row published two days before it.
pub(crate) fn scenario_a_sources() -> SourceFrames {
    let mut sources = empty_sources();
    sources.reading = reading_frame(&[(Some(12.5), 1, false, 1, true, "2023-01-10 05:00", 0)]);
    sources.client = client_frame(&[(1, 1, 3, 10.0, false, "2023-01-08")]);
    sources
}
