use crate::error::{FeatureError, Result};
use crate::models::{TableCatalog, TableSpec};
use crate::warehouse::SourceFrames;
use log::{debug, info};
use polars::prelude::*;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Reads the seven source tables from a data root.
pub struct DataLoader {
    root: PathBuf,
}

impl DataLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Loads every source table in parallel, one task per file.
    pub fn load_sources(&self, catalog: &TableCatalog) -> Result<SourceFrames> {
        let mut frames: Vec<DataFrame> = catalog
            .sources()
            .to_vec()
            .into_par_iter()
            .map(|spec| self.load_table(spec))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "loaded {} source tables from {}",
            frames.len(),
            self.root.display()
        );

        // Same order as TableCatalog::sources.
        let station_map = frames.remove(6);
        let historical_weather = frames.remove(5);
        let forecast_weather = frames.remove(4);
        let electricity_prices = frames.remove(3);
        let gas_prices = frames.remove(2);
        let client = frames.remove(1);
        let reading = frames.remove(0);

        Ok(SourceFrames {
            reading,
            client,
            gas_prices,
            electricity_prices,
            forecast_weather,
            historical_weather,
            station_map,
        })
    }

    /// Reads one CSV with date parsing and keeps only the catalogue columns.
    pub fn load_table(&self, spec: &TableSpec) -> Result<DataFrame> {
        let file_name = spec.kind.file_name().ok_or_else(|| {
            FeatureError::InvalidConfig(format!("{} has no source file", spec.kind))
        })?;
        let path = self.root.join(file_name);
        let read = |path: &Path| -> PolarsResult<DataFrame> {
            let lf = LazyCsvReader::new(path)
                .with_has_header(true)
                .with_try_parse_dates(true)
                .finish()?;
            spec.project(lf).collect()
        };
        let df = read(&path).map_err(|source| FeatureError::Read {
            path: path.clone(),
            source,
        })?;
        debug!("{}: {} rows from {}", spec.kind, df.height(), path.display());
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{datetime_dtype, ColumnSpec, PinnedType, TableKind};
    use std::fs;
    use tempfile::TempDir;

    fn sample_value(column: &ColumnSpec) -> &'static str {
        match column.pinned {
            Some(PinnedType::Boolean) | Some(PinnedType::Int64) => "1",
            Some(PinnedType::Float32) | Some(PinnedType::Float64) => "59.5",
            Some(PinnedType::Date) => "2023-01-08",
            Some(PinnedType::Datetime) => "2023-01-10 05:00:00",
            None => "1.5",
        }
    }

    fn write_sources(dir: &Path, catalog: &TableCatalog) {
        for spec in catalog.sources() {
            let mut header = spec.column_names();
            header.push("data_block_id".to_string());
            let mut row: Vec<&str> = spec.columns.iter().map(sample_value).collect();
            row.push("0");
            let body = format!("{}\n{}\n", header.join(","), row.join(","));
            fs::write(dir.join(spec.kind.file_name().unwrap()), body).unwrap();
        }
    }

    #[test]
    fn test_load_sources_pins_types_and_drops_extra_columns() {
        let dir = TempDir::new().unwrap();
        let catalog = TableCatalog::default();
        write_sources(dir.path(), &catalog);

        let frames = DataLoader::new(dir.path()).load_sources(&catalog).unwrap();

        assert_eq!(frames.reading.height(), 1);
        assert!(frames.reading.column("data_block_id").is_err());
        assert_eq!(
            frames.reading.column("datetime").unwrap().dtype(),
            &datetime_dtype()
        );
        assert_eq!(
            frames.reading.column("is_consumption").unwrap().dtype(),
            &DataType::Boolean
        );
        assert_eq!(frames.client.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(
            frames.historical_weather.column("latitude").unwrap().dtype(),
            &DataType::Float32
        );
        assert_eq!(
            frames.station_map.column("longitude").unwrap().dtype(),
            &DataType::Float32
        );
        assert_eq!(
            frames.forecast_weather.width(),
            catalog.forecast_weather.columns.len()
        );
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let loader = DataLoader::new(dir.path());
        let err = loader.load_table(&TableSpec::gas_prices()).unwrap_err();
        match err {
            FeatureError::Read { path, .. } => {
                assert!(path.ends_with("gas_prices.csv"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_target_table_has_no_source_file() {
        let loader = DataLoader::new("data");
        let err = loader.load_table(&TableSpec::target()).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidConfig(_)));
        assert_eq!(TableKind::Target.file_name(), None);
    }
}
