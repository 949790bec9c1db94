//! A single consumption reading and the client row published two days
//! before it, run through the warehouse, the feature pipeline and the
//! baseline model.

use anyhow::Result;
use chrono::NaiveDate;
use polars::prelude::*;
use prosumer_features::models::datetime_dtype;
use prosumer_features::{
    FeatureEngineer, ForecastModel, MeanRegressor, PipelineConfig, SourceFrames, TargetTransform,
    Warehouse, WarehouseConfig,
};

fn main() -> Result<()> {
    let config = WarehouseConfig::default();
    let mut sources = SourceFrames::empty(&config.catalog)?;

    let reading_time = NaiveDate::from_ymd_opt(2023, 1, 10)
        .and_then(|d| d.and_hms_opt(5, 0, 0))
        .map(|t| t.and_utc().timestamp_micros())
        .unwrap_or_default();
    sources.reading = DataFrame::new(vec![
        Series::new("target".into(), vec![12.5]),
        Series::new("county".into(), vec![1i64]),
        Series::new("is_business".into(), vec![false]),
        Series::new("product_type".into(), vec![1i64]),
        Series::new("is_consumption".into(), vec![true]),
        Series::new("datetime".into(), vec![reading_time]).cast(&datetime_dtype())?,
        Series::new("row_id".into(), vec![0i64]),
    ])?;

    // Client data for 2023-01-08 is published on 2023-01-10.
    let days_since_epoch = NaiveDate::from_ymd_opt(2023, 1, 8)
        .zip(NaiveDate::from_ymd_opt(1970, 1, 1))
        .map(|(d, epoch)| (d - epoch).num_days() as i32)
        .unwrap_or_default();
    sources.client = DataFrame::new(vec![
        Series::new("product_type".into(), vec![1i64]),
        Series::new("county".into(), vec![1i64]),
        Series::new("eic_count".into(), vec![3i64]),
        Series::new("installed_capacity".into(), vec![10.0]),
        Series::new("is_business".into(), vec![false]),
        Series::new("date".into(), vec![days_since_epoch]).cast(&DataType::Date)?,
    ])?;

    let warehouse = Warehouse::from_frames(sources, &config)?;
    let engineer = FeatureEngineer::new(PipelineConfig::default())?;
    let frame = engineer.generate(&warehouse, warehouse.reading())?;

    let features = &frame.features;
    println!("Scenario A");
    println!("==========");
    println!("Feature columns: {}", features.width());
    println!("eic_count: {:?}", features.column("eic_count")?.get(0)?);
    println!(
        "installed_capacity: {:?}",
        features.column("installed_capacity")?.get(0)?
    );
    println!("target_48h: {:?}", features.column("target_48h")?.get(0)?);

    let residual = prosumer_features::model::residual_target(&frame, 48)?;
    println!("Residual target: {:?}", residual[0]);

    let mut model = ForecastModel::new(
        MeanRegressor::new(),
        MeanRegressor::new(),
        TargetTransform::Residual { lag_hours: 48 },
    );
    model.fit(&frame)?;
    println!("Predictions:\n{}", model.predictions_frame(&frame)?);
    Ok(())
}
