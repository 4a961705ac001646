//! Lock-guarded output streams
//!
//! Each logical destination (a bucket CSV, the combined CSV, a failure list,
//! the status log) owns exactly one mutex. Writers to different sinks never
//! contend, and lines within one sink never interleave mid-record.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::UserId;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open sink {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Failed to write to sink '{name}': {source}")]
    Write { name: String, source: io::Error },

    #[error("Failed to read failure list {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid identifier '{value}' on line {line} of {path}")]
    InvalidIdentifier {
        path: PathBuf,
        line: usize,
        value: String,
    },
}

type BoxedWriter = Box<dyn Write + Send>;

/// Append-only line stream guarded by its own mutex
pub struct LineSink {
    name: String,
    writer: Mutex<BoxedWriter>,
    lines_written: AtomicU64,
}

impl std::fmt::Debug for LineSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSink")
            .field("name", &self.name)
            .field("lines_written", &self.lines_written())
            .finish_non_exhaustive()
    }
}

impl LineSink {
    pub fn from_writer(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(Box::new(writer)),
            lines_written: AtomicU64::new(0),
        }
    }

    /// Creates (truncating) `path`, writing `header` first when given
    pub fn create(path: &Path, header: Option<&str>) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.display().to_string();
        let sink = Self::from_writer(name, BufWriter::new(file));
        if let Some(header) = header {
            sink.write_raw(&[header])?;
        }
        Ok(sink)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data lines written so far (headers excluded)
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    /// Writes every line and flushes, all under the sink lock
    pub fn write_lines<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut writer = self.lock();
        self.write_guarded(&mut writer, lines)?;
        self.lines_written
            .fetch_add(lines.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Like [`write_lines`](Self::write_lines), but the lines are produced
    /// while the lock is already held
    pub fn write_rendered<S, F>(&self, render: F) -> Result<(), SinkError>
    where
        S: AsRef<str>,
        F: FnOnce() -> Vec<S>,
    {
        let mut writer = self.lock();
        let lines = render();
        self.write_guarded(&mut writer, &lines)?;
        self.lines_written
            .fetch_add(lines.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        self.lock()
            .flush()
            .map_err(|source| self.write_error(source))
    }

    fn write_raw<S: AsRef<str>>(&self, lines: &[S]) -> Result<(), SinkError> {
        let mut writer = self.lock();
        self.write_guarded(&mut writer, lines)
    }

    fn write_guarded<S: AsRef<str>>(&self, writer: &mut BoxedWriter, lines: &[S]) -> Result<(), SinkError> {
        for line in lines {
            writer
                .write_all(line.as_ref().as_bytes())
                .map_err(|source| self.write_error(source))?;
            writer
                .write_all(b"\n")
                .map_err(|source| self.write_error(source))?;
        }
        writer.flush().map_err(|source| self.write_error(source))
    }

    fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        // A panicking writer leaves at worst a partial line behind.
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_error(&self, source: io::Error) -> SinkError {
        SinkError::Write {
            name: self.name.clone(),
            source,
        }
    }
}

/// Per-pass list of identifiers that could not be resolved
#[derive(Debug)]
pub struct FailureSink {
    path: Option<PathBuf>,
    sink: LineSink,
}

impl FailureSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Ok(Self {
            path: Some(path.to_path_buf()),
            sink: LineSink::create(path, None)?,
        })
    }

    pub fn from_writer(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            path: None,
            sink: LineSink::from_writer(name, writer),
        }
    }

    /// Appends one identifier per line, then flushes
    pub fn record(&self, ids: &[UserId]) -> Result<(), SinkError> {
        let lines: Vec<String> = ids.iter().map(ToString::to_string).collect();
        self.sink.write_lines(&lines)
    }

    pub fn recorded(&self) -> u64 {
        self.sink.lines_written()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn flush(&self) -> Result<(), SinkError> {
        self.sink.flush()
    }
}

/// Reads a failure list back in file order; blank lines are ignored
pub fn read_failure_list(path: &Path) -> Result<Vec<UserId>, SinkError> {
    let read_error = |source| SinkError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_error)?;
    let mut ids = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(read_error)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let id = trimmed
            .parse::<UserId>()
            .map_err(|_| SinkError::InvalidIdentifier {
                path: path.to_path_buf(),
                line: index + 1,
                value: trimmed.to_string(),
            })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Plain-text status stream with timestamped lines, mirrored to `tracing`
pub struct StatusLog {
    sink: LineSink,
}

impl std::fmt::Debug for StatusLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusLog").field("sink", &self.sink.name()).finish()
    }
}

impl StatusLog {
    /// Appends to `path` so several runs share one history
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            sink: LineSink::from_writer(path.display().to_string(), BufWriter::new(file)),
        })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: LineSink::from_writer("status", writer),
        }
    }

    pub fn log(&self, message: &str) {
        self.log_lines(&[message]);
    }

    /// Writes a group of lines atomically with respect to other log writers
    pub fn log_lines<S: AsRef<str>>(&self, messages: &[S]) {
        self.log_with(|| messages.iter().map(|m| m.as_ref().to_string()).collect());
    }

    /// Renders the lines while holding the log lock, so the rendered state
    /// and its position in the log agree
    pub fn log_with<F>(&self, render: F)
    where
        F: FnOnce() -> Vec<String>,
    {
        let result = self.sink.write_rendered(|| {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            render()
                .into_iter()
                .map(|message| {
                    info!("{}", message);
                    format!("{stamp} {message}")
                })
                .collect::<Vec<_>>()
        });
        // The status log must never take a pass down with it.
        if let Err(e) = result {
            warn!("Status log write failed: {}", e);
        }
    }
}
