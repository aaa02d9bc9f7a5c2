//! Line file sinks
//!
//! Each item is written as one line (`item` followed by `\n`). Writes go
//! through a `BufWriter` that is flushed to the OS once per batch.
//!
//! # Failure Policy
//!
//! A line that cannot be written is logged (rate limited) and skipped; the
//! batch still counts as handled. Retrying a half-written batch would
//! duplicate the lines that did make it to disk.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchline_executor::{BatchHandler, HandlerError, RateLimitedLogger};

mod hourly;

pub use hourly::{Clock, HourlyFileWriter, SystemClock, rolled_path};


/// Default `BufWriter` capacity for file sinks (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Writes each item of a batch as one line to any `Write`
pub struct LineWriter<W: Write> {
    writer: W,
    name: String,
    lines_written: u64,
    bytes_written: u64,
    write_errors: u64,
    error_logger: RateLimitedLogger,
}

/// A [`LineWriter`] appending to a file on disk
pub type LineFileWriter = LineWriter<BufWriter<File>>;

impl<W: Write> LineWriter<W> {
    /// Wrap a writer; `name` identifies it in logs
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
            lines_written: 0,
            bytes_written: 0,
            write_errors: 0,
            error_logger: RateLimitedLogger::default(),
        }
    }

    /// Write every item followed by a newline, then flush
    ///
    /// Failures are logged and counted; remaining lines are still attempted.
    pub fn write_batch<T: AsRef<str>>(&mut self, batch: &[T]) {
        for item in batch {
            let line = item.as_ref();
            match write_line(&mut self.writer, line) {
                Ok(()) => {
                    self.lines_written += 1;
                    self.bytes_written += line.len() as u64 + 1;
                }
                Err(e) => {
                    self.write_errors += 1;
                    self.error_logger.error(&format!("{}: line write failed", self.name), &e);
                }
            }
        }

        if let Err(e) = self.writer.flush() {
            self.write_errors += 1;
            self.error_logger.error(&format!("{}: flush failed", self.name), &e);
        }
    }

    /// Flush buffered lines to the underlying writer
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the final flush.
    pub fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lines successfully written
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    /// Bytes successfully written, newlines included
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Failed line writes and flushes
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Consume the sink and return the inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineWriter<BufWriter<File>> {
    /// Open `path` in create+append mode
    ///
    /// Existing content is kept; new lines are appended after it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::open_with_capacity(path, DEFAULT_BUFFER_SIZE)
    }

    /// Open `path` in create+append mode with a custom buffer size
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened.
    pub fn open_with_capacity(path: impl AsRef<Path>, buffer_size: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing::debug!(path = %path.display(), "opened line file");
        Ok(Self::new(
            BufWriter::with_capacity(buffer_size, file),
            path.display().to_string(),
        ))
    }
}

fn write_line(writer: &mut impl Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

#[async_trait]
impl<T, W> BatchHandler<T> for LineWriter<W>
where
    T: AsRef<str> + Send + Sync + 'static,
    W: Write + Send + 'static,
{
    async fn handle(&mut self, batch: &[T]) -> bool {
        self.write_batch(batch);
        true
    }

    async fn finalize(&mut self) -> Result<(), HandlerError> {
        tracing::debug!(
            sink = %self.name,
            lines_written = self.lines_written,
            write_errors = self.write_errors,
            "closing line writer"
        );
        self.close().map_err(HandlerError::from)
    }
}

impl<W: Write> fmt::Debug for LineWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineWriter")
            .field("name", &self.name)
            .field("lines_written", &self.lines_written)
            .field("write_errors", &self.write_errors)
            .finish()
    }
}

/// An open output file together with the path it was opened at
///
/// Replaced as a unit so the path can never disagree with the writer.
#[derive(Debug)]
pub(crate) struct ActiveFile {
    pub(crate) path: PathBuf,
    pub(crate) writer: LineFileWriter,
}
