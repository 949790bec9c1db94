pub mod data_loader;
pub mod error;
pub mod features;
pub mod holidays;
pub mod lag;
pub mod model;
pub mod models;
pub mod schema;
pub mod stats;
pub mod warehouse;
pub mod weather;

#[cfg(test)]
mod test_support;

pub use data_loader::DataLoader;
pub use error::{FeatureError, MismatchKind, Result};
pub use features::{FeatureEngineer, FeatureFrame};
pub use holidays::HolidayCalendar;
pub use model::{ForecastModel, MeanRegressor, Regressor, TargetTransform};
pub use models::{
    FeatureStages, PipelineConfig, PipelineVariant, RunConfig, TableCatalog, TableKind,
    WarehouseConfig,
};
pub use schema::{SchemaRegistry, TableSchema};
pub use warehouse::{NewData, SourceFrames, Warehouse, WarehouseSnapshot};
pub use weather::{WeatherAggregates, WeatherAggregator};
