use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FeatureError, Result};

pub const DATETIME: &str = "datetime";
pub const TARGET: &str = "target";
pub const ROW_ID: &str = "row_id";
pub const COUNTY: &str = "county";
pub const IS_BUSINESS: &str = "is_business";
pub const PRODUCT_TYPE: &str = "product_type";
pub const IS_CONSUMPTION: &str = "is_consumption";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// (county, is_business, product_type, is_consumption): one prosumer series.
pub const ENTITY_KEYS: [&str; 4] = [COUNTY, IS_BUSINESS, PRODUCT_TYPE, IS_CONSUMPTION];

/// Every timestamp in the warehouse uses this unit and carries no time zone.
pub const TIME_UNIT: TimeUnit = TimeUnit::Microseconds;

pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TIME_UNIT, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Reading,
    Client,
    GasPrice,
    ElectricityPrice,
    ForecastWeather,
    HistoricalWeather,
    StationMap,
    Target,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Reading => "reading",
            TableKind::Client => "client",
            TableKind::GasPrice => "gas_price",
            TableKind::ElectricityPrice => "electricity_price",
            TableKind::ForecastWeather => "forecast_weather",
            TableKind::HistoricalWeather => "historical_weather",
            TableKind::StationMap => "station_map",
            TableKind::Target => "target",
        }
    }

    /// Source file under the data root. The target table is derived, never read.
    pub fn file_name(&self) -> Option<&'static str> {
        match self {
            TableKind::Reading => Some("train.csv"),
            TableKind::Client => Some("client.csv"),
            TableKind::GasPrice => Some("gas_prices.csv"),
            TableKind::ElectricityPrice => Some("electricity_prices.csv"),
            TableKind::ForecastWeather => Some("forecast_weather.csv"),
            TableKind::HistoricalWeather => Some("historical_weather.csv"),
            TableKind::StationMap => Some("weather_station_to_county_mapping.csv"),
            TableKind::Target => None,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Part of the table's uniqueness key
    Key,
    Value,
}

/// Types forced at load time regardless of what CSV inference produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinnedType {
    Boolean,
    Int64,
    Float32,
    Float64,
    Date,
    Datetime,
}

impl PinnedType {
    pub fn dtype(&self) -> DataType {
        match self {
            PinnedType::Boolean => DataType::Boolean,
            PinnedType::Int64 => DataType::Int64,
            PinnedType::Float32 => DataType::Float32,
            PinnedType::Float64 => DataType::Float64,
            PinnedType::Date => DataType::Date,
            PinnedType::Datetime => datetime_dtype(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub role: ColumnRole,
    #[serde(default)]
    pub pinned: Option<PinnedType>,
}

impl ColumnSpec {
    pub fn key(name: &str, pinned: PinnedType) -> Self {
        Self {
            name: name.to_string(),
            role: ColumnRole::Key,
            pinned: Some(pinned),
        }
    }

    pub fn value(name: &str) -> Self {
        Self {
            name: name.to_string(),
            role: ColumnRole::Value,
            pinned: None,
        }
    }

    pub fn pinned_value(name: &str, pinned: PinnedType) -> Self {
        Self {
            name: name.to_string(),
            role: ColumnRole::Value,
            pinned: Some(pinned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub kind: TableKind,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Key)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn value_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Value)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Selects the catalogue columns of `lf`, casting pinned ones.
    pub fn project(&self, lf: LazyFrame) -> LazyFrame {
        let exprs: Vec<Expr> = self
            .columns
            .iter()
            .map(|c| match c.pinned {
                Some(pinned) => col(c.name.as_str()).strict_cast(pinned.dtype()),
                None => col(c.name.as_str()),
            })
            .collect();
        lf.select(exprs)
    }

    /// Builds a frame for this table from the given columns, padding every
    /// unlisted column with nulls of its pinned type (Float64 when unpinned).
    pub fn null_padded(&self, height: usize, provided: Vec<Series>) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for spec in &self.columns {
            let series = match provided.iter().find(|s| s.name().as_str() == spec.name) {
                Some(s) => s.clone(),
                None => {
                    let dtype = spec.pinned.map(|p| p.dtype()).unwrap_or(DataType::Float64);
                    Series::full_null(spec.name.as_str().into(), height, &dtype)
                }
            };
            columns.push(series);
        }
        Ok(DataFrame::new(columns)?)
    }

    pub fn reading() -> Self {
        use PinnedType::*;
        Self {
            kind: TableKind::Reading,
            columns: vec![
                ColumnSpec::pinned_value(TARGET, Float64),
                ColumnSpec::key(COUNTY, Int64),
                ColumnSpec::key(IS_BUSINESS, Boolean),
                ColumnSpec::key(PRODUCT_TYPE, Int64),
                ColumnSpec::key(IS_CONSUMPTION, Boolean),
                ColumnSpec::key(DATETIME, Datetime),
                ColumnSpec::pinned_value(ROW_ID, Int64),
            ],
        }
    }

    /// Reading without `row_id`; same uniqueness key.
    pub fn target() -> Self {
        let mut spec = Self::reading();
        spec.kind = TableKind::Target;
        spec.columns.retain(|c| c.name != ROW_ID);
        spec
    }

    pub fn client() -> Self {
        use PinnedType::*;
        Self {
            kind: TableKind::Client,
            columns: vec![
                ColumnSpec::key(PRODUCT_TYPE, Int64),
                ColumnSpec::key(COUNTY, Int64),
                ColumnSpec::pinned_value("eic_count", Int64),
                ColumnSpec::pinned_value("installed_capacity", Float64),
                ColumnSpec::key(IS_BUSINESS, Boolean),
                ColumnSpec::key("date", Date),
            ],
        }
    }

    pub fn gas_prices() -> Self {
        Self {
            kind: TableKind::GasPrice,
            columns: vec![
                ColumnSpec::key("forecast_date", PinnedType::Date),
                ColumnSpec::value("lowest_price_per_mwh"),
                ColumnSpec::value("highest_price_per_mwh"),
            ],
        }
    }

    pub fn electricity_prices() -> Self {
        Self {
            kind: TableKind::ElectricityPrice,
            columns: vec![
                ColumnSpec::key("forecast_date", PinnedType::Date),
                ColumnSpec::value("euros_per_mwh"),
            ],
        }
    }

    pub fn forecast_weather() -> Self {
        use PinnedType::*;
        let mut columns = vec![
            ColumnSpec::key(LATITUDE, Float32),
            ColumnSpec::key(LONGITUDE, Float32),
            ColumnSpec::key("hours_ahead", Int64),
        ];
        columns.extend(
            [
                "temperature",
                "dewpoint",
                "cloudcover_high",
                "cloudcover_low",
                "cloudcover_mid",
                "cloudcover_total",
                "10_metre_u_wind_component",
                "10_metre_v_wind_component",
            ]
            .into_iter()
            .map(ColumnSpec::value),
        );
        columns.push(ColumnSpec::key("forecast_datetime", Datetime));
        columns.extend(
            [
                "direct_solar_radiation",
                "surface_solar_radiation_downwards",
                "snowfall",
                "total_precipitation",
            ]
            .into_iter()
            .map(ColumnSpec::value),
        );
        Self {
            kind: TableKind::ForecastWeather,
            columns,
        }
    }

    pub fn historical_weather() -> Self {
        use PinnedType::*;
        let mut columns = vec![ColumnSpec::key(DATETIME, Datetime)];
        columns.extend(
            [
                "temperature",
                "dewpoint",
                "rain",
                "snowfall",
                "surface_pressure",
                "cloudcover_total",
                "cloudcover_low",
                "cloudcover_mid",
                "cloudcover_high",
                "windspeed_10m",
                "winddirection_10m",
                "shortwave_radiation",
                "direct_solar_radiation",
                "diffuse_radiation",
            ]
            .into_iter()
            .map(ColumnSpec::value),
        );
        columns.push(ColumnSpec::key(LATITUDE, Float32));
        columns.push(ColumnSpec::key(LONGITUDE, Float32));
        Self {
            kind: TableKind::HistoricalWeather,
            columns,
        }
    }

    pub fn station_map() -> Self {
        use PinnedType::*;
        Self {
            kind: TableKind::StationMap,
            columns: vec![
                ColumnSpec::key(LONGITUDE, Float32),
                ColumnSpec::key(LATITUDE, Float32),
                ColumnSpec::pinned_value(COUNTY, Int64),
            ],
        }
    }
}

/// Recognised columns of every table. Column lists are data, so a
/// deployment can reshape them from a config file without code changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCatalog {
    pub reading: TableSpec,
    pub target: TableSpec,
    pub client: TableSpec,
    pub gas_prices: TableSpec,
    pub electricity_prices: TableSpec,
    pub forecast_weather: TableSpec,
    pub historical_weather: TableSpec,
    pub station_map: TableSpec,
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self {
            reading: TableSpec::reading(),
            target: TableSpec::target(),
            client: TableSpec::client(),
            gas_prices: TableSpec::gas_prices(),
            electricity_prices: TableSpec::electricity_prices(),
            forecast_weather: TableSpec::forecast_weather(),
            historical_weather: TableSpec::historical_weather(),
            station_map: TableSpec::station_map(),
        }
    }
}

impl TableCatalog {
    pub fn spec(&self, kind: TableKind) -> &TableSpec {
        match kind {
            TableKind::Reading => &self.reading,
            TableKind::Target => &self.target,
            TableKind::Client => &self.client,
            TableKind::GasPrice => &self.gas_prices,
            TableKind::ElectricityPrice => &self.electricity_prices,
            TableKind::ForecastWeather => &self.forecast_weather,
            TableKind::HistoricalWeather => &self.historical_weather,
            TableKind::StationMap => &self.station_map,
        }
    }

    /// The seven tables backed by a source file.
    pub fn sources(&self) -> [&TableSpec; 7] {
        [
            &self.reading,
            &self.client,
            &self.gas_prices,
            &self.electricity_prices,
            &self.forecast_weather,
            &self.historical_weather,
            &self.station_map,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub root: PathBuf,
    /// Readings before this date are discarded at load.
    pub reading_cutoff: NaiveDate,
    pub catalog: TableCatalog,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            reading_cutoff: NaiveDate::from_ymd_opt(2022, 1, 1).expect("valid cutoff date"),
            catalog: TableCatalog::default(),
        }
    }
}

impl WarehouseConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// Which target series a lag column is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFamily {
    /// The entity's own series
    Entity,
    /// Summed over product types
    AllTypeSum,
    /// Summed over product types and counties
    AllCountyTypeSum,
}

impl TargetFamily {
    pub fn prefix(&self) -> &'static str {
        match self {
            TargetFamily::Entity => "target",
            TargetFamily::AllTypeSum => "target_all_type_sum",
            TargetFamily::AllCountyTypeSum => "target_all_county_type_sum",
        }
    }

    pub fn lag_column(&self, hours: i64) -> String {
        format!("{}_{}h", self.prefix(), hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioPair {
    pub family: TargetFamily,
    pub short: i64,
    pub long: i64,
}

impl RatioPair {
    pub const fn new(family: TargetFamily, short: i64, long: i64) -> Self {
        Self { family, short, long }
    }

    pub fn column(&self) -> String {
        format!("{}_ratio_{}_{}", self.family.prefix(), self.short, self.long)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureStages {
    pub holidays: bool,
    pub log_features: bool,
    pub weather_diffs: bool,
}

impl Default for FeatureStages {
    fn default() -> Self {
        Self {
            holidays: true,
            log_features: true,
            weather_diffs: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    Baseline,
    Holidays,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub client_lag_days: i64,
    /// Inclusive hours-ahead window selecting the day-ahead forecast.
    pub forecast_hours_ahead: [i64; 2],
    pub forecast_lags: Vec<i64>,
    pub historical_lags: Vec<i64>,
    pub historical_morning_lag: i64,
    pub historical_morning_max_hour: i32,
    pub target_lags: Vec<i64>,
    pub target_aggregate_lags: Vec<i64>,
    pub target_stat_lags: Vec<i64>,
    pub ratio_pairs: Vec<RatioPair>,
    pub ratio_epsilon: f64,
    pub weather_diff_columns: Vec<String>,
    pub holiday_years: [i32; 2],
    pub stages: FeatureStages,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use TargetFamily::*;
        Self {
            client_lag_days: 2,
            forecast_hours_ahead: [22, 45],
            forecast_lags: vec![0, 7 * 24],
            historical_lags: vec![2 * 24, 7 * 24],
            historical_morning_lag: 24,
            historical_morning_max_hour: 10,
            target_lags: (2..15).map(|d| d * 24).collect(),
            target_aggregate_lags: vec![2 * 24, 3 * 24, 7 * 24, 14 * 24],
            target_stat_lags: vec![2 * 24, 3 * 24, 4 * 24, 5 * 24],
            ratio_pairs: vec![
                RatioPair::new(Entity, 24 * 7, 24 * 14),
                RatioPair::new(Entity, 24 * 2, 24 * 9),
                RatioPair::new(Entity, 24 * 3, 24 * 10),
                RatioPair::new(Entity, 24 * 2, 24 * 3),
                RatioPair::new(AllTypeSum, 24 * 2, 24 * 3),
                RatioPair::new(AllTypeSum, 24 * 7, 24 * 14),
                RatioPair::new(AllCountyTypeSum, 24 * 2, 24 * 3),
                RatioPair::new(AllCountyTypeSum, 24 * 7, 24 * 14),
            ],
            ratio_epsilon: 1e-3,
            weather_diff_columns: vec![
                "temperature".to_string(),
                "dewpoint".to_string(),
                "10_metre_u_wind_component".to_string(),
                "10_metre_v_wind_component".to_string(),
            ],
            holiday_years: [2021, 2025],
            stages: FeatureStages::default(),
        }
    }
}

impl PipelineConfig {
    pub fn for_variant(variant: PipelineVariant) -> Self {
        let stages = match variant {
            PipelineVariant::Baseline => FeatureStages {
                holidays: false,
                log_features: false,
                weather_diffs: false,
            },
            PipelineVariant::Holidays => FeatureStages {
                holidays: true,
                log_features: false,
                weather_diffs: false,
            },
            PipelineVariant::Full => FeatureStages::default(),
        };
        Self {
            stages,
            ..Self::default()
        }
    }

    fn family_lags(&self, family: TargetFamily) -> &[i64] {
        match family {
            TargetFamily::Entity => &self.target_lags,
            TargetFamily::AllTypeSum | TargetFamily::AllCountyTypeSum => &self.target_aggregate_lags,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let [lo, hi] = self.forecast_hours_ahead;
        if lo > hi {
            return Err(FeatureError::InvalidConfig(format!(
                "forecast hours-ahead window [{lo}, {hi}] is empty"
            )));
        }
        let [first, last] = self.holiday_years;
        if first > last {
            return Err(FeatureError::InvalidConfig(format!(
                "holiday years [{first}, {last}] are reversed"
            )));
        }
        for lag in &self.target_stat_lags {
            if !self.target_lags.contains(lag) {
                return Err(FeatureError::InvalidConfig(format!(
                    "statistics lag {lag}h is not among the target lags"
                )));
            }
        }
        for pair in &self.ratio_pairs {
            let lags = self.family_lags(pair.family);
            for lag in [pair.short, pair.long] {
                if !lags.contains(&lag) {
                    return Err(FeatureError::InvalidConfig(format!(
                        "ratio {} needs {} which is never joined",
                        pair.column(),
                        pair.family.lag_column(lag)
                    )));
                }
            }
        }
        if self.historical_lags.contains(&self.historical_morning_lag) {
            return Err(FeatureError::InvalidConfig(format!(
                "morning historical lag {}h collides with a full-day historical lag",
                self.historical_morning_lag
            )));
        }
        if self.stages.weather_diffs && !self.forecast_lags.contains(&0) {
            return Err(FeatureError::InvalidConfig(
                "weather differences need the 0h forecast lag".to_string(),
            ));
        }
        if self.ratio_epsilon <= 0.0 {
            return Err(FeatureError::InvalidConfig(
                "ratio epsilon must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contents of a `--config` JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
}

impl RunConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            FeatureError::InvalidConfig(format!("{}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_run_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"warehouse": {"root": "/data/enefit"}, "pipeline": {"target_lags": [48, 72, 96, 120, 168, 216, 240, 336], "ratio_pairs": []}}"#,
        )
        .unwrap();

        let config = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(config.warehouse.root, PathBuf::from("/data/enefit"));
        assert_eq!(
            config.warehouse.reading_cutoff,
            NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
        );
        assert_eq!(config.pipeline.target_lags.len(), 8);
        assert_eq!(config.pipeline.forecast_hours_ahead, [22, 45]);
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_default_lag_lists() {
        let config = PipelineConfig::default();
        assert_eq!(config.target_lags.len(), 13);
        assert_eq!(config.target_lags.first(), Some(&48));
        assert_eq!(config.target_lags.last(), Some(&336));
        assert_eq!(config.forecast_lags, vec![0, 168]);
        assert_eq!(config.historical_lags, vec![48, 168]);
        assert_eq!(config.target_aggregate_lags, vec![48, 72, 168, 336]);
        assert_eq!(config.ratio_pairs.len(), 8);
        assert_eq!(config.forecast_hours_ahead, [22, 45]);
        assert_eq!(config.client_lag_days, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sparse_target_lags_rejected_when_ratios_need_them() {
        let config = PipelineConfig {
            target_lags: vec![48, 72, 96, 120, 168],
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FeatureError::InvalidConfig(_)));
    }

    #[test]
    fn test_reversed_holiday_years_rejected() {
        let config = PipelineConfig {
            holiday_years: [2025, 2021],
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FeatureError::InvalidConfig(_))
        ));
        let single = PipelineConfig {
            holiday_years: [2023, 2023],
            ..PipelineConfig::default()
        };
        assert!(single.validate().is_ok());
    }

    #[test]
    fn test_variants_toggle_optional_stages() {
        let baseline = PipelineConfig::for_variant(PipelineVariant::Baseline);
        assert!(!baseline.stages.holidays && !baseline.stages.log_features);
        let holidays = PipelineConfig::for_variant(PipelineVariant::Holidays);
        assert!(holidays.stages.holidays && !holidays.stages.log_features);
        assert!(PipelineConfig::for_variant(PipelineVariant::Full).validate().is_ok());
    }

    #[test]
    fn test_catalog_keys_match_uniqueness_rules() {
        let catalog = TableCatalog::default();
        assert_eq!(
            catalog.client.key_columns(),
            vec!["product_type", "county", "is_business", "date"]
        );
        assert_eq!(
            catalog.forecast_weather.key_columns(),
            vec!["latitude", "longitude", "hours_ahead", "forecast_datetime"]
        );
        assert_eq!(catalog.gas_prices.key_columns(), vec!["forecast_date"]);
        assert!(!catalog.target.column_names().contains(&ROW_ID.to_string()));
        assert!(!catalog.forecast_weather.value_columns().contains(&"hours_ahead".to_string()));
    }

    #[test]
    fn test_catalog_round_trips_through_json() {
        let catalog = TableCatalog::default();
        let json = serde_json::to_string(&catalog).unwrap();
        let back: TableCatalog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, catalog);
    }
}
