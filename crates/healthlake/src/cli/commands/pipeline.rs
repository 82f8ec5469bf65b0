use chrono::Utc;
use serde::Serialize;

use crate::cli::{print_json, OutputFormat};
use crate::error::Result;
use crate::models::Domain;
use crate::pipeline::{Pipeline, StageOptions, StageStats};
use crate::transform::QualityReport;

#[derive(Serialize)]
struct StageOutput<'a> {
    domains: &'a [StageStats],
    quality: &'a QualityReport,
}

/// Stage landed records for one domain, or all of them
pub fn stage(pipeline: &Pipeline, domain: Option<Domain>, all: bool, format: OutputFormat) -> Result<()> {
    let now = Utc::now();
    let opts = if all {
        StageOptions::full(now)
    } else {
        StageOptions::incremental(now)
    };
    let domains: Vec<Domain> = match domain {
        Some(d) => vec![d],
        None => Domain::ALL.to_vec(),
    };

    let mut results = Vec::with_capacity(domains.len());
    let mut quality = QualityReport::new();
    for domain in domains {
        let stats = pipeline.stage(domain, opts)?;
        quality.merge(&stats.quality);
        results.push(stats);
    }

    match format {
        OutputFormat::Json => print_json(&StageOutput {
            domains: &results,
            quality: &quality,
        }),
        OutputFormat::Table => {
            println!("Using storage: {}", pipeline.storage().base_path().display());
            if all {
                println!("Full stage - lookback window ignored");
            }
            for stats in &results {
                println!("  {}", stats);
            }
            println!();
            println!("Data quality: {}", quality);
            Ok(())
        }
    }
}

/// Rebuild every mart from the staged data
pub fn transform(pipeline: &Pipeline, format: OutputFormat) -> Result<()> {
    let stats = pipeline.transform(Utc::now())?;

    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Table => {
            println!("Transform complete: {}", stats);
            println!("Data quality: {}", stats.quality);
            if !stats.quality.is_clean() {
                println!("{} data-quality warning(s); run with RUST_LOG=warn for details", stats.quality.warnings());
            }
            Ok(())
        }
    }
}

/// Show what is landed, staged and built
pub fn status(pipeline: &Pipeline, format: OutputFormat) -> Result<()> {
    let status = pipeline.storage().status()?;

    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Table => {
            println!("Entity: {}", pipeline.config().entity);
            println!("Time zone: {}", pipeline.config().timezone);
            print!("{}", status);
            Ok(())
        }
    }
}
