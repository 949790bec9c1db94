use crate::error::{FeatureError, Result};
use crate::holidays::HolidayCalendar;
use crate::lag::{shift_days, LagJoin};
use crate::models::{
    PipelineConfig, TableKind, TargetFamily, COUNTY, DATETIME, ENTITY_KEYS, IS_BUSINESS,
    IS_CONSUMPTION, PRODUCT_TYPE, ROW_ID, TARGET,
};
use crate::stats::{log_or_zero, row_mean, row_std, safe_ratio};
use crate::warehouse::{Warehouse, WarehouseSnapshot};
use crate::weather::WeatherAggregator;
use log::{debug, warn};
use polars::prelude::*;
use std::f64::consts::PI;

pub const SEGMENT: &str = "segment";
pub const TARGET_MEAN: &str = "target_mean";
pub const TARGET_STD: &str = "target_std";
pub const HOLIDAY_FLAG: &str = "is_country_holiday";

/// Columns the downstream regressor should treat as categories.
pub const CATEGORICAL_COLUMNS: [&str; 5] =
    [COUNTY, IS_BUSINESS, PRODUCT_TYPE, IS_CONSUMPTION, SEGMENT];

const ROW_ORDER: &str = "__row_order";
const WORKING_COLUMNS: [&str; 4] = ["date", "hour", "dayofyear", DATETIME];
const LOGGED_COLUMNS: [&str; 3] = ["installed_capacity", TARGET_MEAN, TARGET_STD];

/// One wide row per prediction item.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub row_id: Series,
    pub features: DataFrame,
    /// Present when the items carried their true target.
    pub target: Option<Series>,
    pub categorical: Vec<String>,
}

impl FeatureFrame {
    pub fn height(&self) -> usize {
        self.features.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.features
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// `row_id`, the features and `target` (when known) as one frame.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = vec![self.row_id.clone()];
        columns.extend(self.features.get_columns().iter().cloned());
        if let Some(target) = &self.target {
            columns.push(target.clone());
        }
        Ok(DataFrame::new(columns)?)
    }
}

pub struct FeatureEngineer {
    config: PipelineConfig,
    holidays: HolidayCalendar,
}

impl FeatureEngineer {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let [first, last] = config.holiday_years;
        let holidays = HolidayCalendar::for_years(first, last);
        Ok(Self { config, holidays })
    }

    pub fn generate(&self, warehouse: &Warehouse, items: &DataFrame) -> Result<FeatureFrame> {
        self.generate_from(&warehouse.snapshot(), items)
    }

    /// Builds features for `items` (entity keys, `datetime`, `row_id`, and
    /// optionally `target`) from one consistent warehouse snapshot.
    pub fn generate_from(
        &self,
        snapshot: &WarehouseSnapshot,
        items: &DataFrame,
    ) -> Result<FeatureFrame> {
        for column in ENTITY_KEYS.iter().chain([DATETIME, ROW_ID].iter()) {
            if items.column(column).is_err() {
                return Err(FeatureError::missing(TableKind::Reading, column));
            }
        }

        let mut lf = items
            .clone()
            .lazy()
            .with_row_index(ROW_ORDER, None)
            .with_column(col(DATETIME).cast(DataType::Date).alias("date"));

        lf = self.calendar_features(lf);
        lf = self.client_features(lf, snapshot);
        lf = self.forecast_weather_features(lf, snapshot);
        lf = self.historical_weather_features(lf, snapshot);
        lf = self.target_features(lf, snapshot);
        if self.config.stages.holidays {
            lf = lf.with_column(self.holidays.flag("date")?.alias(HOLIDAY_FLAG));
            debug!("holidays: {} calendar dates", self.holidays.len());
        }
        if self.config.stages.log_features {
            lf = lf.with_columns(
                LOGGED_COLUMNS
                    .iter()
                    .map(|c| log_or_zero(c).alias(format!("log_{c}").as_str()))
                    .collect::<Vec<_>>(),
            );
            debug!("log features: {}", LOGGED_COLUMNS.len());
        }
        lf = lf.sort_by_exprs([col(ROW_ORDER)], SortMultipleOptions::default());
        if self.config.stages.weather_diffs {
            lf = self.weather_diff_features(lf);
        }

        let mut drop: Vec<&str> = WORKING_COLUMNS.to_vec();
        drop.push(ROW_ORDER);
        let df = lf.drop(drop).collect()?;
        let df = downcast_floats(df)?;

        if df.height() > 0 {
            if let Ok(capacity) = df.column("installed_capacity") {
                if capacity.null_count() == df.height() {
                    warn!(
                        "none of {} prediction rows matched a client record",
                        df.height()
                    );
                }
            }
        }

        self.materialize(df)
    }

    fn calendar_features(&self, lf: LazyFrame) -> LazyFrame {
        let ts = || col(DATETIME).dt();
        let angle = |c: &str, half_period: f64| {
            lit(PI) * col(c).cast(DataType::Float64) / lit(half_period)
        };
        debug!("calendar features");
        lf.with_columns([
            ts().ordinal_day().alias("dayofyear"),
            ts().hour().alias("hour"),
            ts().day().alias("day"),
            ts().weekday().alias("weekday"),
            ts().month().alias("month"),
            ts().year().alias("year"),
            concat_str(
                ENTITY_KEYS
                    .iter()
                    .map(|k| col(*k).cast(DataType::String))
                    .collect::<Vec<_>>(),
                "_",
                false,
            )
            .alias(SEGMENT),
        ])
        .with_columns([
            angle("dayofyear", 183.0).sin().alias("sin_dayofyear"),
            angle("dayofyear", 183.0).cos().alias("cos_dayofyear"),
            angle("hour", 12.0).sin().alias("sin_hour"),
            angle("hour", 12.0).cos().alias("cos_hour"),
        ])
    }

    /// Client rows describe the date two days before they are published.
    fn client_features(&self, lf: LazyFrame, snapshot: &WarehouseSnapshot) -> LazyFrame {
        let keys = [col(COUNTY), col(IS_BUSINESS), col(PRODUCT_TYPE), col("date")];
        let spec = &snapshot.catalog.client;
        let mut select: Vec<Expr> = vec![
            col(COUNTY),
            col(IS_BUSINESS),
            col(PRODUCT_TYPE),
            shift_days(col("date"), self.config.client_lag_days).alias("date"),
        ];
        select.extend(spec.value_columns().iter().map(|c| col(c.as_str())));
        let client = snapshot.client.clone().lazy().select(select);
        debug!(
            "client features: {} columns lagged {} days",
            spec.value_columns().len(),
            self.config.client_lag_days
        );
        lf.join(client, keys.clone(), keys, JoinArgs::new(JoinType::Left))
    }

    fn forecast_weather_features(
        &self,
        mut lf: LazyFrame,
        snapshot: &WarehouseSnapshot,
    ) -> LazyFrame {
        let aggregates = WeatherAggregator::new(&snapshot.station_map).forecast(
            &snapshot.forecast_weather,
            &snapshot.catalog.forecast_weather,
            self.config.forecast_hours_ahead,
        );
        let region = vec![COUNTY.to_string()];
        for &hours in &self.config.forecast_lags {
            let global = LagJoin::suffixed(
                &[],
                DATETIME,
                hours,
                &aggregates.columns,
                &format!("_forecast_{hours}h"),
            );
            lf = global.apply(lf, aggregates.global.clone(), DATETIME);
            let local = LagJoin::suffixed(
                &region,
                DATETIME,
                hours,
                &aggregates.columns,
                &format!("_forecast_local_{hours}h"),
            );
            lf = local.apply(lf, aggregates.regional.clone(), DATETIME);
        }
        debug!(
            "forecast weather: {} columns at lags {:?}",
            2 * aggregates.columns.len() * self.config.forecast_lags.len(),
            self.config.forecast_lags
        );
        lf
    }

    fn historical_weather_features(
        &self,
        mut lf: LazyFrame,
        snapshot: &WarehouseSnapshot,
    ) -> LazyFrame {
        let aggregates = WeatherAggregator::new(&snapshot.station_map).historical(
            &snapshot.historical_weather,
            &snapshot.catalog.historical_weather,
        );
        let region = vec![COUNTY.to_string()];
        for &hours in &self.config.historical_lags {
            let global = LagJoin::suffixed(
                &[],
                DATETIME,
                hours,
                &aggregates.columns,
                &format!("_historical_{hours}h"),
            );
            lf = global.apply(lf, aggregates.global.clone(), DATETIME);
            let local = LagJoin::suffixed(
                &region,
                DATETIME,
                hours,
                &aggregates.columns,
                &format!("_historical_local_{hours}h"),
            );
            lf = local.apply(lf, aggregates.regional.clone(), DATETIME);
        }

        // Only the part of the previous day already observed by the morning.
        let hours = self.config.historical_morning_lag;
        let morning = aggregates.global.clone().filter(
            col(DATETIME)
                .dt()
                .hour()
                .cast(DataType::Int32)
                .lt_eq(lit(self.config.historical_morning_max_hour)),
        );
        let join = LagJoin::suffixed(
            &[],
            DATETIME,
            hours,
            &aggregates.columns,
            &format!("_historical_{hours}h"),
        );
        lf = join.apply(lf, morning, DATETIME);
        debug!(
            "historical weather: lags {:?} plus morning {}h",
            self.config.historical_lags, hours
        );
        lf
    }

    fn target_features(&self, mut lf: LazyFrame, snapshot: &WarehouseSnapshot) -> LazyFrame {
        let target = snapshot.target.clone().lazy();
        let entity: Vec<String> = ENTITY_KEYS.iter().map(|k| k.to_string()).collect();
        for &hours in &self.config.target_lags {
            let join = LagJoin {
                keys: &entity,
                time_column: DATETIME,
                hours,
                columns: vec![(TARGET.to_string(), TargetFamily::Entity.lag_column(hours))],
            };
            lf = join.apply(lf, target.clone(), DATETIME);
        }

        let by_type: Vec<String> = [COUNTY, IS_BUSINESS, IS_CONSUMPTION]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let by_county_type: Vec<String> = [IS_BUSINESS, IS_CONSUMPTION]
            .iter()
            .map(|k| k.to_string())
            .collect();
        let all_type_sum = summed(target.clone(), &by_type);
        let all_county_type_sum = summed(target, &by_county_type);
        for &hours in &self.config.target_aggregate_lags {
            let join = LagJoin {
                keys: &by_type,
                time_column: DATETIME,
                hours,
                columns: vec![(TARGET.to_string(), TargetFamily::AllTypeSum.lag_column(hours))],
            };
            lf = join.apply(lf, all_type_sum.clone(), DATETIME);
            let join = LagJoin {
                keys: &by_county_type,
                time_column: DATETIME,
                hours,
                columns: vec![(
                    TARGET.to_string(),
                    TargetFamily::AllCountyTypeSum.lag_column(hours),
                )],
            };
            lf = join.apply(lf, all_county_type_sum.clone(), DATETIME);
        }

        let stat_columns: Vec<String> = self
            .config
            .target_stat_lags
            .iter()
            .map(|&h| TargetFamily::Entity.lag_column(h))
            .collect();
        lf = lf.with_columns([
            row_mean(&stat_columns).alias(TARGET_MEAN),
            row_std(&stat_columns).alias(TARGET_STD),
        ]);

        let epsilon = self.config.ratio_epsilon;
        let ratios: Vec<Expr> = self
            .config
            .ratio_pairs
            .iter()
            .map(|pair| {
                safe_ratio(
                    &pair.family.lag_column(pair.short),
                    &pair.family.lag_column(pair.long),
                    epsilon,
                )
                .alias(pair.column().as_str())
            })
            .collect();
        debug!(
            "target features: {} entity lags, {} aggregate lags, {} ratios",
            self.config.target_lags.len(),
            2 * self.config.target_aggregate_lags.len(),
            ratios.len()
        );
        lf.with_columns(ratios)
    }

    /// First differences of the 0h forecast, within each entity in input order.
    fn weather_diff_features(&self, lf: LazyFrame) -> LazyFrame {
        let entity: Vec<Expr> = ENTITY_KEYS.iter().map(|k| col(*k)).collect();
        let diffs: Vec<Expr> = self
            .config
            .weather_diff_columns
            .iter()
            .map(|c| {
                let source = format!("{c}_forecast_0h");
                (col(source.as_str()) - col(source.as_str()).shift(lit(1)))
                    .over(entity.clone())
                    .alias(format!("{c}_diff_1").as_str())
            })
            .collect();
        debug!("weather diffs: {}", diffs.len());
        lf.with_columns(diffs)
    }

    fn materialize(&self, mut df: DataFrame) -> Result<FeatureFrame> {
        let row_id = df.drop_in_place(ROW_ID)?;
        let target = match df.column(TARGET) {
            Ok(_) => Some(df.drop_in_place(TARGET)?),
            Err(_) => None,
        };
        let categorical = CATEGORICAL_COLUMNS
            .iter()
            .filter(|c| df.column(c).is_ok())
            .map(|c| c.to_string())
            .collect();
        debug!(
            "materialized {} rows x {} features",
            df.height(),
            df.width()
        );
        Ok(FeatureFrame {
            row_id,
            features: df,
            target,
            categorical,
        })
    }
}

fn summed(target: LazyFrame, keys: &[String]) -> LazyFrame {
    let mut by: Vec<Expr> = keys.iter().map(|k| col(k.as_str())).collect();
    by.push(col(DATETIME));
    target.group_by(by).agg([col(TARGET).sum()])
}

/// Float64 features become Float32. The target keeps full precision.
fn downcast_floats(df: DataFrame) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(df.width());
    for series in df.get_columns() {
        if series.dtype() == &DataType::Float64 && series.name().as_str() != TARGET {
            columns.push(series.cast(&DataType::Float32)?);
        } else {
            columns.push(series.clone());
        }
    }
    Ok(DataFrame::new(columns)?)
}
