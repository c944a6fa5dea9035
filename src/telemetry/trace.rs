//! Append-only packet trace files.
//!
//! Writes are best effort: a failing file logs one warning and disables the
//! writer instead of interrupting packet processing.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

/// Default file for access-list drop traces
pub const ACCESS_LIST_TRACE_FILE: &str = "AccessListTrace.txt";

/// Default file for policy-routing traces
pub const PBR_TRACE_FILE: &str = "PBRTrace.txt";

#[derive(Debug)]
pub struct TraceWriter {
    path: PathBuf,
    file: Option<File>,
    failed: bool,
    lines: u64,
}

impl TraceWriter {
    /// The file is opened lazily on the first line.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
            failed: false,
            lines: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines successfully written
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn write_line(&mut self, line: &str) {
        if self.failed {
            return;
        }

        if self.file.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => self.file = Some(file),
                Err(e) => {
                    warn!(path = %self.path.display(), "cannot open trace file: {}", e);
                    self.failed = true;
                    return;
                }
            }
        }

        if let Some(file) = self.file.as_mut() {
            if let Err(e) = writeln!(file, "{}", line) {
                warn!(path = %self.path.display(), "trace write failed: {}", e);
                self.failed = true;
                return;
            }
            self.lines += 1;
        }
    }
}
