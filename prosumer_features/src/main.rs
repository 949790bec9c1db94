use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use log::info;
use polars::prelude::*;
use prosumer_features::{
    FeatureEngineer, ForecastModel, MeanRegressor, PipelineConfig, PipelineVariant, RunConfig,
    TargetTransform, Warehouse,
};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "prosumer_features")]
#[command(about = "Build the training feature table for prosumer energy forecasting")]
struct Args {
    /// Directory holding train.csv, client.csv and the other source files
    #[arg(short, long)]
    data_root: Option<PathBuf>,

    /// JSON file with `warehouse` and `pipeline` sections
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which optional feature stages run
    #[arg(short, long, value_enum)]
    variant: Option<Variant>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    format: OutputFormat,

    /// Output file (required unless the format is summary)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, ValueEnum)]
enum Variant {
    Baseline,
    Holidays,
    Full,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Parquet,
    Csv,
    Json,
    Summary,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    if let Some(root) = args.data_root {
        config.warehouse.root = root;
    }
    if let Some(variant) = args.variant {
        let variant = match variant {
            Variant::Baseline => PipelineVariant::Baseline,
            Variant::Holidays => PipelineVariant::Holidays,
            Variant::Full => PipelineVariant::Full,
        };
        config.pipeline.stages = PipelineConfig::for_variant(variant).stages;
    }

    info!("Loading warehouse from {}", config.warehouse.root.display());
    let warehouse = Warehouse::load(&config.warehouse)?;
    let engineer = FeatureEngineer::new(config.pipeline.clone())?;

    info!("Generating features for {} readings", warehouse.reading().height());
    let frame = engineer.generate(&warehouse, warehouse.reading())?;

    let mut df = frame.to_frame()?;
    match args.format {
        OutputFormat::Summary => return print_summary(&frame),
        OutputFormat::Parquet => {
            ParquetWriter::new(create_output(&args.output)?).finish(&mut df)?;
        }
        OutputFormat::Csv => {
            CsvWriter::new(create_output(&args.output)?)
                .include_header(true)
                .finish(&mut df)?;
        }
        OutputFormat::Json => {
            JsonWriter::new(create_output(&args.output)?)
                .with_json_format(JsonFormat::JsonLines)
                .finish(&mut df)?;
        }
    }
    if let Some(path) = &args.output {
        info!(
            "Wrote {} rows x {} columns to {}",
            df.height(),
            df.width(),
            path.display()
        );
    }
    Ok(())
}

fn create_output(path: &Option<PathBuf>) -> Result<File> {
    match path {
        Some(path) => Ok(File::create(path)?),
        None => bail!("--output is required for file formats"),
    }
}

fn print_summary(frame: &prosumer_features::FeatureFrame) -> Result<()> {
    println!("Feature Table Summary");
    println!("=====================");
    println!("Rows: {}", frame.height());
    println!("Features: {}", frame.features.width());
    println!("Categorical: {}", frame.categorical.join(", "));

    let mut sparse: Vec<(String, f64)> = frame
        .features
        .get_columns()
        .iter()
        .map(|s| {
            let share = if s.is_empty() {
                0.0
            } else {
                s.null_count() as f64 / s.len() as f64
            };
            (s.name().to_string(), share)
        })
        .filter(|(_, share)| *share > 0.0)
        .collect();
    sparse.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!();
    println!("Most sparse columns:");
    for (name, share) in sparse.iter().take(10) {
        println!("  {}: {:.1}% null", name, share * 100.0);
    }

    if frame.target.is_some() {
        let mut model = ForecastModel::new(
            MeanRegressor::new(),
            MeanRegressor::new(),
            TargetTransform::Residual { lag_hours: 48 },
        );
        model.fit(frame)?;
        let predictions = model.predict(frame)?;
        let target = frame
            .target
            .as_ref()
            .map(|t| t.cast(&DataType::Float64))
            .transpose()?;
        if let Some(target) = target {
            let (total, count) = target
                .f64()?
                .into_iter()
                .zip(&predictions)
                .filter_map(|(t, p)| t.map(|t| (t - p).abs()))
                .fold((0.0, 0usize), |(sum, n), err| (sum + err, n + 1));
            if count > 0 {
                println!();
                println!(
                    "Baseline mean regressor ({:?}) MAE: {:.3}",
                    model.transform(),
                    total / count as f64
                );
            }
        }
    }
    Ok(())
}
