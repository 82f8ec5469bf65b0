//! Command-line handlers
//!
//! Each handler takes an opened [`Pipeline`](crate::pipeline::Pipeline),
//! runs one operation and prints the result as a table or JSON.

pub mod commands;

use serde::Serialize;

use crate::error::Result;

/// Output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Print a value as pretty JSON
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
