//! Landing zone: newline-delimited raw record envelopes per domain
//!
//! Extractors drop one `.jsonl` file per delivery. The core only reads
//! these; `append` exists for extractors and fixtures.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{HealthlakeError, Result};
use crate::models::{Domain, RawRecord};
use crate::transform::QualityReport;

use super::partitions::Dataset;

#[derive(Debug, Clone)]
pub struct LandingZone {
    base_path: PathBuf,
}

impl LandingZone {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn domain_dir(&self, domain: Domain) -> PathBuf {
        self.base_path.join(Dataset::Landing(domain).dir_name())
    }

    /// Landing files for a domain, in name order
    pub fn files(&self, domain: Domain) -> Result<Vec<PathBuf>> {
        let dir = self.domain_dir(domain);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Read every landed record of a domain.
    ///
    /// Lines that do not parse are counted as malformed and skipped. A
    /// record without a load time inherits the file's modification time.
    pub fn read(&self, domain: Domain, report: &mut QualityReport) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        for path in self.files(domain)? {
            records.extend(Self::read_file(&path, report)?);
        }
        debug!(%domain, records = records.len(), "Read landing zone");
        Ok(records)
    }

    fn read_file(path: &Path, report: &mut QualityReport) -> Result<Vec<RawRecord>> {
        let file = File::open(path).map_err(|e| {
            HealthlakeError::storage(format!("Failed to open {}: {}", path.display(), e))
        })?;
        let modified: Option<DateTime<Utc>> = file
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        let mut records = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRecord>(&line) {
                Ok(mut record) => {
                    if record.loaded_at.is_none() {
                        record.loaded_at = modified;
                    }
                    records.push(record);
                }
                Err(e) => {
                    report.malformed += 1;
                    warn!(file = %path.display(), line = line_no + 1, error = %e, "Skipping malformed landing record");
                }
            }
        }
        Ok(records)
    }

    /// Write a new delivery file and return its path
    pub fn append(&self, domain: Domain, name: &str, records: &[RawRecord]) -> Result<PathBuf> {
        let dir = self.domain_dir(domain);
        fs::create_dir_all(&dir).map_err(|e| {
            HealthlakeError::storage(format!("Failed to create directory {:?}: {}", dir, e))
        })?;

        let path = dir.join(format!("{}.jsonl", name));
        let mut file = File::create(&path)?;
        for record in records {
            serde_json::to_writer(&mut file, record)?;
            file.write_all(b"\n")?;
        }
        Ok(path)
    }
}
