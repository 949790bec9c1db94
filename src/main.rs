use anyhow::Result;
use chrono::Local;
use polars::prelude::*;
use prosumer_features::{RunConfig, Warehouse};
use std::path::PathBuf;

mod replay_processor;

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|idx| args.get(idx + 1))
        .cloned()
}

fn load_config(args: &[String]) -> Result<RunConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => RunConfig::from_json_file(&PathBuf::from(path))?,
        None => RunConfig::default(),
    };
    if let Some(root) = flag_value(args, "--data") {
        config.warehouse.root = PathBuf::from(root);
    }
    Ok(config)
}

fn inspect_warehouse(config: &RunConfig) -> Result<()> {
    println!("\n🔍 Warehouse Inspection");
    println!("{}", "=".repeat(60));

    let warehouse = Warehouse::load(&config.warehouse)?;
    let snapshot = warehouse.snapshot();
    let tables: [(&str, &DataFrame); 8] = [
        ("reading", warehouse.reading()),
        ("target", &snapshot.target),
        ("client", &snapshot.client),
        ("gas_prices", &snapshot.gas_prices),
        ("electricity_prices", &snapshot.electricity_prices),
        ("forecast_weather", &snapshot.forecast_weather),
        ("historical_weather", &snapshot.historical_weather),
        ("station_map", &snapshot.station_map),
    ];

    let mut total_issues = 0;
    for (name, df) in tables {
        println!("\n  📁 {}: {} rows x {} columns", name, df.height(), df.width());
        for series in df.get_columns() {
            let nulls = series.null_count();
            if nulls > 0 {
                println!(
                    "    ⚠️  {}: {} nulls ({:.1}%)",
                    series.name(),
                    nulls,
                    nulls as f64 * 100.0 / df.height().max(1) as f64
                );
                total_issues += 1;
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    if total_issues == 0 {
        println!("✅ No null columns found");
    } else {
        println!("⚠️  {} columns carry nulls", total_issues);
    }
    Ok(())
}

fn print_usage() {
    println!("Enefit Prosumer Replay");
    println!("======================");
    println!("Usage:");
    println!("  enefit_replay --replay <test_dir> [--data <root>] [--output <file>] [--config <json>]");
    println!("      Replay the example test blocks and write row_id,target predictions");
    println!("  enefit_replay --inspect [--data <root>] [--config <json>]");
    println!("      Load the warehouse and report table sizes and null columns");
}

fn main() -> Result<()> {
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpus::get())
        .build_global()?;

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 2 && args[1] == "--replay" {
        let config = load_config(&args)?;
        let output = flag_value(&args, "--output").unwrap_or_else(|| "submission.csv".to_string());
        println!("🚀 Replay started at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let summary =
            replay_processor::ReplayProcessor::new(&args[2], output, config).process()?;
        println!(
            "🏁 Done: {} blocks, {} predictions",
            summary.blocks, summary.predictions
        );
    } else if args.len() > 1 && args[1] == "--inspect" {
        let config = load_config(&args)?;
        inspect_warehouse(&config)?;
    } else {
        print_usage();
    }

    Ok(())
}
