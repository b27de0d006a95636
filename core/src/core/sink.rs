use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::debug;

use crate::core::report::{ReportRow, REPORT_COLUMNS};
use crate::core::Finding;
use crate::error::ScanError;

/// Ordered, append-only log of the findings of one scan run.
///
/// A sink belongs to exactly one run. When backed by a findings table, the
/// table is truncated when the sink is created, so rows from a previous run
/// never leak into the next one.
pub struct FindingSink {
    findings: Vec<Finding>,
    table: Option<FindingTable>,
}

struct FindingTable {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl FindingSink {
    pub fn in_memory() -> Self {
        Self {
            findings: Vec::new(),
            table: None,
        }
    }

    /// Creates (or truncates) the CSV findings table at `path` and writes its header.
    pub fn with_table(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(REPORT_COLUMNS)?;
        writer.flush()?;
        debug!("Findings table reset at {}", path.display());

        Ok(Self {
            findings: Vec::new(),
            table: Some(FindingTable { path, writer }),
        })
    }

    /// Records a finding; with a table, the row is flushed before returning.
    pub fn append(&mut self, finding: Finding) -> Result<(), ScanError> {
        if let Some(table) = self.table.as_mut() {
            table.writer.serialize(ReportRow::from(&finding))?;
            table.writer.flush()?;
        }
        self.findings.push(finding);
        Ok(())
    }

    /// Hands over everything recorded so far, in append order.
    pub fn drain(&mut self) -> Vec<Finding> {
        std::mem::take(&mut self.findings)
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn table_path(&self) -> Option<&Path> {
        self.table.as_ref().map(|t| t.path.as_path())
    }
}
