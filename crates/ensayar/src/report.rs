//! Plain-text run reports.
//!
//! One report file covers a whole scheduler execution, however many suites
//! it runs. Writing is best-effort throughout: a report line that cannot be
//! written is logged and dropped, because a broken report must never take
//! down the run it is describing.

use crate::result::EnsayarResult;
use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Timestamp format for report file names
const REPORT_TIMESTAMP: &str = "%d-%m-%Y_%H-%M-%S";

/// Append-only text report for one scheduler execution.
#[derive(Debug)]
pub struct ReportFile {
    path: PathBuf,
    file: File,
}

impl ReportFile {
    /// Create `<dir>/report_<timestamp>.txt`, creating `dir` if needed.
    pub fn create(dir: &Path) -> EnsayarResult<Self> {
        fs::create_dir_all(dir)?;
        let name = format!("report_{}.txt", Local::now().format(REPORT_TIMESTAMP));
        let path = dir.join(name);
        let file = File::create(&path)?;
        Ok(Self { path, file })
    }

    /// Path of the report file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line, best-effort.
    ///
    /// Failures are logged and swallowed so reporting never interrupts the
    /// run being reported on.
    pub fn write_line(&mut self, line: &str) {
        if let Err(e) = writeln!(self.file, "{line}") {
            warn!("could not write report line: {e}");
        }
        if let Err(e) = self.file.flush() {
            warn!("could not flush report file: {e}");
        }
    }

    /// Record the start of a suite: when it began and which cases will run.
    pub fn suite_started(&mut self, suite_name: &str, case_names: &[&str]) {
        let now = Local::now().format(REPORT_TIMESTAMP);
        self.write_line(&format!(
            "We started executing test suite '{suite_name}' at {now}:"
        ));
        self.write_line("Tests to perform:");
        for name in case_names {
            self.write_line(name);
        }
    }
}
