use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use polars::prelude::*;
use prosumer_features::{
    FeatureEngineer, ForecastModel, MeanRegressor, NewData, RunConfig, TargetTransform, Warehouse,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const BLOCK_COLUMN: &str = "data_block_id";

/// Files of one replay directory, each carrying a `data_block_id` column.
const TEST_FILES: [&str; 7] = [
    "test.csv",
    "revealed_targets.csv",
    "client.csv",
    "gas_prices.csv",
    "electricity_prices.csv",
    "forecast_weather.csv",
    "historical_weather.csv",
];

#[derive(Debug, Serialize)]
struct PredictionRecord {
    row_id: i64,
    target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub blocks: usize,
    pub predictions: usize,
    pub mean_prediction: f64,
}

/// Replays a scoring session: every block updates the warehouse with the
/// newly revealed data and then predicts that block's rows.
pub struct ReplayProcessor {
    test_dir: PathBuf,
    output: PathBuf,
    config: RunConfig,
    lag_hours: i64,
}

struct ReplayTables {
    test: DataFrame,
    revealed_targets: DataFrame,
    client: DataFrame,
    gas_prices: DataFrame,
    electricity_prices: DataFrame,
    forecast_weather: DataFrame,
    historical_weather: DataFrame,
}

impl ReplayTables {
    fn load(dir: &Path) -> Result<Self> {
        let mut frames = Vec::with_capacity(TEST_FILES.len());
        for file in TEST_FILES {
            frames.push(read_csv(&dir.join(file))?);
        }
        let mut frames = frames.into_iter();
        let mut next = || frames.next().context("replay table missing");
        Ok(Self {
            test: next()?,
            revealed_targets: next()?,
            client: next()?,
            gas_prices: next()?,
            electricity_prices: next()?,
            forecast_weather: next()?,
            historical_weather: next()?,
        })
    }

    fn block_ids(&self) -> Result<Vec<i64>> {
        let ids = self.test.column(BLOCK_COLUMN)?.cast(&DataType::Int64)?;
        let ids: BTreeSet<i64> = ids.i64()?.into_iter().flatten().collect();
        Ok(ids.into_iter().collect())
    }

    fn new_data(&self, block: i64) -> Result<NewData> {
        Ok(NewData {
            client: select_block(&self.client, block)?,
            gas_prices: select_block(&self.gas_prices, block)?,
            electricity_prices: select_block(&self.electricity_prices, block)?,
            forecast_weather: select_block(&self.forecast_weather, block)?,
            historical_weather: select_block(&self.historical_weather, block)?,
            target: select_block(&self.revealed_targets, block)?,
        })
    }
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        bail!("replay file not found: {}", path.display());
    }
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_try_parse_dates(true)
        .finish()?
        .collect()
        .with_context(|| format!("reading {}", path.display()))?;
    if df.column(BLOCK_COLUMN).is_err() {
        bail!("{} has no {} column", path.display(), BLOCK_COLUMN);
    }
    Ok(df)
}

fn select_block(df: &DataFrame, block: i64) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .filter(col(BLOCK_COLUMN).cast(DataType::Int64).eq(lit(block)))
        .collect()?)
}

impl ReplayProcessor {
    pub fn new(test_dir: impl Into<PathBuf>, output: impl Into<PathBuf>, config: RunConfig) -> Self {
        Self {
            test_dir: test_dir.into(),
            output: output.into(),
            config,
            lag_hours: 48,
        }
    }

    pub fn process(&self) -> Result<ReplaySummary> {
        println!("\n🔁 Replaying blocks from {}", self.test_dir.display());
        println!("{}", "=".repeat(60));

        let mut warehouse = Warehouse::load(&self.config.warehouse)?;
        let engineer = FeatureEngineer::new(self.config.pipeline.clone())?;
        let tables = ReplayTables::load(&self.test_dir)?;
        let blocks = tables.block_ids()?;
        println!(
            "  📂 Warehouse: {} readings, {} targets; {} blocks to replay",
            warehouse.reading().height(),
            warehouse.target().height(),
            blocks.len()
        );

        let training = engineer.generate(&warehouse, warehouse.reading())?;
        let mut model = ForecastModel::new(
            MeanRegressor::new(),
            MeanRegressor::new(),
            TargetTransform::Residual {
                lag_hours: self.lag_hours,
            },
        );
        model.fit(&training)?;
        println!("  🧮 Model fitted on {} training rows", training.height());

        let mut writer = csv::Writer::from_path(&self.output)
            .with_context(|| format!("creating {}", self.output.display()))?;

        let pb = ProgressBar::new(blocks.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?,
        );

        let mut predictions = 0usize;
        let mut total = 0.0;
        for &block in &blocks {
            warehouse.update(&tables.new_data(block)?)?;

            let raw = select_block(&tables.test, block)?;
            let items = warehouse.preprocess_test(&raw)?;
            if items.height() == 0 {
                warn!("block {block} has no rows to predict");
                pb.inc(1);
                continue;
            }

            let frame = engineer.generate(&warehouse, &items)?;
            let values = model.predict(&frame)?;
            let row_ids = frame.row_id.cast(&DataType::Int64)?;
            for (row_id, target) in row_ids.i64()?.into_iter().zip(values) {
                let Some(row_id) = row_id else {
                    bail!("block {block} carries a null row_id");
                };
                writer.serialize(PredictionRecord { row_id, target })?;
                predictions += 1;
                total += target;
            }
            info!("block {block}: {} predictions", frame.height());
            pb.inc(1);
        }
        pb.finish_and_clear();
        writer.flush()?;

        let summary = ReplaySummary {
            blocks: blocks.len(),
            predictions,
            mean_prediction: if predictions == 0 {
                0.0
            } else {
                total / predictions as f64
            },
        };
        println!(
            "  ✅ {} predictions over {} blocks (mean {:.3}) written to {}",
            summary.predictions,
            summary.blocks,
            summary.mean_prediction,
            self.output.display()
        );
        Ok(summary)
    }
}
