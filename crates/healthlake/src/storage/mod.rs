//! Storage layer for the pipeline
//!
//! A local directory tree standing in for object storage.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/healthlake/
//! ├── landing/
//! │   ├── health/*.jsonl           # Raw record envelopes from extractors
//! │   ├── workouts/*.jsonl
//! │   └── activities/*.jsonl
//! ├── staged/
//! │   ├── health/2024-12.parquet   # Monthly partitions, deduplicated
//! │   └── ...
//! └── marts/
//!     ├── daily_summary.parquet    # Full history
//!     ├── exercise_records.parquet
//!     └── recent/                  # Trailing window only
//! ```
//!
//! ## Concurrent Access
//!
//! Parquet files are written atomically (temp file + rename), so readers always
//! see consistent data. External apps can query data using DuckDB:
//!
//! ```sql
//! SELECT * FROM 'marts/daily_summary.parquet' ORDER BY date DESC LIMIT 7;
//! ```

mod landing;
mod parquet;
mod partitions;

pub use landing::LandingZone;
pub use parquet::ParquetStore;
pub use partitions::{Dataset, MartTable};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HealthlakeError, Result};
use crate::models::Domain;

/// Storage manager combining the landing zone and the Parquet store
pub struct Storage {
    pub landing: LandingZone,
    pub parquet: ParquetStore,
}

impl Storage {
    /// Open storage at a custom location
    pub fn open(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create storage directory: {}", e))
        })?;

        Ok(Self {
            landing: LandingZone::new(&base_path),
            parquet: ParquetStore::new(&base_path),
        })
    }

    /// Get the base path for external readers
    pub fn base_path(&self) -> &Path {
        self.parquet.base_path()
    }

    /// Counts of landing files, staged rows and written marts
    pub fn status(&self) -> Result<StorageStatus> {
        let mut domains = Vec::with_capacity(Domain::ALL.len());
        for domain in Domain::ALL {
            let partitions = self.parquet.staged_partitions(domain)?;
            let mut staged_rows = 0;
            for path in &partitions {
                staged_rows += self.parquet.count_rows(path)?;
            }
            domains.push(DomainStatus {
                domain,
                landing_files: self.landing.files(domain)?.len(),
                staged_partitions: partitions.len(),
                staged_rows,
            });
        }

        let mut marts = Vec::new();
        for table in MartTable::ALL {
            let path = self.parquet.mart_path(Dataset::Mart(table));
            if path.exists() {
                marts.push(MartStatus {
                    table: table.name(),
                    rows: self.parquet.count_rows(&path)?,
                });
            }
        }

        Ok(StorageStatus {
            base_path: self.base_path().to_path_buf(),
            domains,
            marts,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStatus {
    pub domain: Domain,
    pub landing_files: usize,
    pub staged_partitions: usize,
    pub staged_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MartStatus {
    pub table: &'static str,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageStatus {
    pub base_path: PathBuf,
    pub domains: Vec<DomainStatus>,
    pub marts: Vec<MartStatus>,
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Storage: {}", self.base_path.display())?;
        writeln!(f)?;
        writeln!(f, "{:<12} {:>8} {:>11} {:>12}", "Domain", "Landing", "Partitions", "Staged rows")?;
        writeln!(f, "{}", "-".repeat(46))?;
        for d in &self.domains {
            writeln!(
                f,
                "{:<12} {:>8} {:>11} {:>12}",
                d.domain.name(),
                d.landing_files,
                d.staged_partitions,
                d.staged_rows
            )?;
        }
        writeln!(f)?;
        if self.marts.is_empty() {
            return writeln!(f, "No marts built yet");
        }
        writeln!(f, "{:<18} {:>8}", "Mart", "Rows")?;
        writeln!(f, "{}", "-".repeat(27))?;
        for m in &self.marts {
            writeln!(f, "{:<18} {:>8}", m.table, m.rows)?;
        }
        Ok(())
    }
}
