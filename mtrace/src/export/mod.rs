//! Statistics export
//!
//! Writes the final [`SessionReport`] as a pretty-printed JSON document for
//! external analysis:
//!
//! ```text
//! {
//!   "cause": "limit",
//!   "elapsed_secs": 1.2,
//!   "events": 100,
//!   "dropped": 0,
//!   ...
//!   "rows": [{ "class_name": "shop::orders::OrderService", "method_name": "place_order", ... }]
//! }
//! ```

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::ExportError;
use crate::session::{SessionReport, StatisticRow};

/// Exported document. Counts first, rows last.
#[derive(Serialize)]
struct StatisticsDocument<'a> {
    #[serde(flatten)]
    report: &'a SessionReport,
    /// Rows that saw at least one invocation
    active_methods: usize,
}

pub struct StatisticsExporter<'a> {
    report: &'a SessionReport,
}

impl<'a> StatisticsExporter<'a> {
    #[must_use]
    pub fn new(report: &'a SessionReport) -> Self {
        Self { report }
    }

    /// Export to any writer (file, stdout, buffer, etc.)
    ///
    /// # Errors
    /// Returns [`ExportError::Json`] if serialization or the write fails.
    pub fn export<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let document = StatisticsDocument {
            report: self.report,
            active_methods: self.report.rows.iter().filter(|row| is_active(row)).count(),
        };
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Export to `path`, replacing any existing file.
    ///
    /// # Errors
    /// Returns [`ExportError::WriteFailed`] if the file cannot be created.
    pub fn export_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)
            .map_err(|source| ExportError::WriteFailed { path: path.to_path_buf(), source })?;
        self.export(BufWriter::new(file))
    }
}

fn is_active(row: &StatisticRow) -> bool {
    row.total > 0
}
