use crate::data_loader::DataLoader;
use crate::error::Result;
use crate::lag::datetime_lit;
use crate::models::{
    TableCatalog, TableKind, TableSpec, WarehouseConfig, DATETIME, LATITUDE, LONGITUDE, TARGET,
};
use crate::schema::{coerce_to, SchemaRegistry};
use log::info;
use polars::prelude::*;

/// The seven source tables as read from disk, before any warehouse rules apply.
#[derive(Debug, Clone)]
pub struct SourceFrames {
    pub reading: DataFrame,
    pub client: DataFrame,
    pub gas_prices: DataFrame,
    pub electricity_prices: DataFrame,
    pub forecast_weather: DataFrame,
    pub historical_weather: DataFrame,
    pub station_map: DataFrame,
}

impl SourceFrames {
    /// Zero-row frames shaped by the catalogue.
    pub fn empty(catalog: &TableCatalog) -> Result<Self> {
        let empty = |spec: &TableSpec| spec.null_padded(0, Vec::new());
        Ok(Self {
            reading: empty(&catalog.reading)?,
            client: empty(&catalog.client)?,
            gas_prices: empty(&catalog.gas_prices)?,
            electricity_prices: empty(&catalog.electricity_prices)?,
            forecast_weather: empty(&catalog.forecast_weather)?,
            historical_weather: empty(&catalog.historical_weather)?,
            station_map: empty(&catalog.station_map)?,
        })
    }
}

/// One delivery of new data, e.g. one simulated day.
#[derive(Debug, Clone)]
pub struct NewData {
    pub client: DataFrame,
    pub gas_prices: DataFrame,
    pub electricity_prices: DataFrame,
    pub forecast_weather: DataFrame,
    pub historical_weather: DataFrame,
    pub target: DataFrame,
}

/// Immutable view of the warehouse taken at the start of a read.
#[derive(Debug, Clone)]
pub struct WarehouseSnapshot {
    pub catalog: TableCatalog,
    pub target: DataFrame,
    pub client: DataFrame,
    pub gas_prices: DataFrame,
    pub electricity_prices: DataFrame,
    pub forecast_weather: DataFrame,
    pub historical_weather: DataFrame,
    pub station_map: DataFrame,
}

pub struct Warehouse {
    catalog: TableCatalog,
    registry: SchemaRegistry,
    reading: DataFrame,
    target: DataFrame,
    client: DataFrame,
    gas_prices: DataFrame,
    electricity_prices: DataFrame,
    forecast_weather: DataFrame,
    historical_weather: DataFrame,
    station_map: DataFrame,
}

impl Warehouse {
    /// Reads the source files under `config.root` and builds the warehouse.
    pub fn load(config: &WarehouseConfig) -> Result<Self> {
        let loader = DataLoader::new(&config.root);
        let sources = loader.load_sources(&config.catalog)?;
        Self::from_frames(sources, config)
    }

    pub fn from_frames(sources: SourceFrames, config: &WarehouseConfig) -> Result<Self> {
        let catalog = config.catalog.clone();
        let cutoff = config
            .reading_cutoff
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default();

        let reading = catalog
            .reading
            .project(sources.reading.lazy())
            .filter(col(DATETIME).gt_eq(datetime_lit(cutoff)))
            .collect()?;
        let target = latest_per_key(
            catalog.target.project(reading.clone().lazy()).collect()?,
            &catalog.target,
        )?;
        let client = latest_per_key(
            catalog.client.project(sources.client.lazy()).collect()?,
            &catalog.client,
        )?;
        let gas_prices = latest_per_key(
            catalog.gas_prices.project(sources.gas_prices.lazy()).collect()?,
            &catalog.gas_prices,
        )?;
        let electricity_prices = latest_per_key(
            catalog
                .electricity_prices
                .project(sources.electricity_prices.lazy())
                .collect()?,
            &catalog.electricity_prices,
        )?;
        let forecast_weather = latest_per_key(
            catalog
                .forecast_weather
                .project(sources.forecast_weather.lazy())
                .collect()?,
            &catalog.forecast_weather,
        )?;
        let historical_weather = latest_per_key(
            catalog
                .historical_weather
                .project(sources.historical_weather.lazy())
                .collect()?,
            &catalog.historical_weather,
        )?;
        // A station listed twice would duplicate every weather row it joins.
        let station_map = catalog
            .station_map
            .project(sources.station_map.lazy())
            .collect()?
            .unique_stable(
                Some(&[LATITUDE.to_string(), LONGITUDE.to_string()]),
                UniqueKeepStrategy::First,
                None,
            )?;

        let mut registry = SchemaRegistry::new();
        registry.register(SchemaRegistry::infer(&catalog.reading, &reading)?);
        registry.register(SchemaRegistry::infer(&catalog.target, &target)?);
        registry.register(SchemaRegistry::infer(&catalog.client, &client)?);
        registry.register(SchemaRegistry::infer(&catalog.gas_prices, &gas_prices)?);
        registry.register(SchemaRegistry::infer(
            &catalog.electricity_prices,
            &electricity_prices,
        )?);
        registry.register(SchemaRegistry::infer(
            &catalog.forecast_weather,
            &forecast_weather,
        )?);
        registry.register(SchemaRegistry::infer(
            &catalog.historical_weather,
            &historical_weather,
        )?);
        registry.register(SchemaRegistry::infer(&catalog.station_map, &station_map)?);

        info!(
            "warehouse loaded: {} readings since {}, {} targets, {} client rows, {} forecast rows, {} historical rows, {} stations",
            reading.height(),
            config.reading_cutoff,
            target.height(),
            client.height(),
            forecast_weather.height(),
            historical_weather.height(),
            station_map.height()
        );

        Ok(Self {
            catalog,
            registry,
            reading,
            target,
            client,
            gas_prices,
            electricity_prices,
            forecast_weather,
            historical_weather,
            station_map,
        })
    }

    /// Appends one delivery. Every batch is coerced before any table changes,
    /// so a rejected delivery leaves the warehouse as it was.
    pub fn update(&mut self, batch: &NewData) -> Result<()> {
        let client = self.registry.coerce(TableKind::Client, &batch.client)?;
        let gas_prices = self.registry.coerce(TableKind::GasPrice, &batch.gas_prices)?;
        let electricity_prices = self
            .registry
            .coerce(TableKind::ElectricityPrice, &batch.electricity_prices)?;
        let forecast_weather = self
            .registry
            .coerce(TableKind::ForecastWeather, &batch.forecast_weather)?;
        let historical_weather = self
            .registry
            .coerce(TableKind::HistoricalWeather, &batch.historical_weather)?;
        let target = self.registry.coerce(TableKind::Target, &batch.target)?;

        let client = append_latest(&self.client, &client, &self.catalog.client)?;
        let gas_prices = append_latest(&self.gas_prices, &gas_prices, &self.catalog.gas_prices)?;
        let electricity_prices = append_latest(
            &self.electricity_prices,
            &electricity_prices,
            &self.catalog.electricity_prices,
        )?;
        let forecast_weather = append_latest(
            &self.forecast_weather,
            &forecast_weather,
            &self.catalog.forecast_weather,
        )?;
        let historical_weather = append_latest(
            &self.historical_weather,
            &historical_weather,
            &self.catalog.historical_weather,
        )?;
        let target = append_latest(&self.target, &target, &self.catalog.target)?;

        info!(
            "warehouse updated: +{} client, +{} forecast, +{} historical, +{} target rows offered; {} targets stored",
            batch.client.height(),
            batch.forecast_weather.height(),
            batch.historical_weather.height(),
            batch.target.height(),
            target.height()
        );

        self.client = client;
        self.gas_prices = gas_prices;
        self.electricity_prices = electricity_prices;
        self.forecast_weather = forecast_weather;
        self.historical_weather = historical_weather;
        self.target = target;
        Ok(())
    }

    /// Shapes a raw prediction batch like a Reading row without its target.
    pub fn preprocess_test(&self, raw: &DataFrame) -> Result<DataFrame> {
        let mut raw = raw.clone();
        if raw.column("prediction_datetime").is_ok() {
            raw.rename("prediction_datetime", DATETIME.into())?;
        }
        let schema = self
            .registry
            .get(TableKind::Reading)
            .map(|s| s.without(TARGET))
            .ok_or_else(|| {
                crate::error::FeatureError::InvalidConfig("reading schema not registered".into())
            })?;
        coerce_to(&schema, &raw)
    }

    pub fn snapshot(&self) -> WarehouseSnapshot {
        WarehouseSnapshot {
            catalog: self.catalog.clone(),
            target: self.target.clone(),
            client: self.client.clone(),
            gas_prices: self.gas_prices.clone(),
            electricity_prices: self.electricity_prices.clone(),
            forecast_weather: self.forecast_weather.clone(),
            historical_weather: self.historical_weather.clone(),
            station_map: self.station_map.clone(),
        }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn reading(&self) -> &DataFrame {
        &self.reading
    }

    pub fn target(&self) -> &DataFrame {
        &self.target
    }

    pub fn client(&self) -> &DataFrame {
        &self.client
    }

    pub fn gas_prices(&self) -> &DataFrame {
        &self.gas_prices
    }

    pub fn electricity_prices(&self) -> &DataFrame {
        &self.electricity_prices
    }

    pub fn forecast_weather(&self) -> &DataFrame {
        &self.forecast_weather
    }

    pub fn historical_weather(&self) -> &DataFrame {
        &self.historical_weather
    }

    pub fn station_map(&self) -> &DataFrame {
        &self.station_map
    }
}

/// Keeps the last row per uniqueness key. Kept rows stay in the order of
/// their last occurrence.
fn latest_per_key(df: DataFrame, spec: &TableSpec) -> Result<DataFrame> {
    let keys = spec.key_columns();
    Ok(df.unique_stable(Some(&keys), UniqueKeepStrategy::Last, None)?)
}

fn append_latest(existing: &DataFrame, incoming: &DataFrame, spec: &TableSpec) -> Result<DataFrame> {
    let combined = existing.vstack(incoming)?;
    latest_per_key(combined, spec)
}
