use chrono::Utc;
use serde::Serialize;

use crate::cli::{print_json, OutputFormat};
use crate::error::{HealthlakeError, Result};
use crate::pipeline::Pipeline;

#[derive(Serialize)]
struct CutoffOutput<'a> {
    timezone: &'a str,
    days: u32,
    today: String,
    cutoff: String,
}

/// Print the window cutoff for "now" in the configured zone
pub fn cutoff(pipeline: &Pipeline, days: u32, format: OutputFormat) -> Result<()> {
    if days == 0 {
        return Err(HealthlakeError::invalid_param("--days must be greater than 0"));
    }
    let now = Utc::now();
    let cutoff = pipeline.cutoff(days, now)?;
    let today = pipeline.cutoff(0, now)?;

    match format {
        OutputFormat::Json => print_json(&CutoffOutput {
            timezone: &pipeline.config().timezone,
            days,
            today: today.to_string(),
            cutoff: cutoff.to_string(),
        }),
        OutputFormat::Table => {
            println!("Today ({}): {}", pipeline.config().timezone, today);
            println!("Cutoff ({} days, inclusive): {}", days, cutoff);
            Ok(())
        }
    }
}
