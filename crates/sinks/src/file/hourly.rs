//! Hourly rolling line file
//!
//! Writes to `<stem>-YYYY-MM-DDTHH[.ext]` next to the configured base path,
//! switching files when the UTC hour changes:
//!
//! ```text
//! base: /var/log/app/events.log
//!   13:xx UTC → /var/log/app/events-2013-08-13T13.log
//!   14:xx UTC → /var/log/app/events-2013-08-13T14.log
//! ```
//!
//! The hour is evaluated once per batch, so a batch never spans two files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use batchline_executor::{BatchHandler, HandlerError, RateLimitedLogger};
use chrono::{DateTime, Utc};

use super::{ActiveFile, LineFileWriter};

#[cfg(test)]
#[path = "hourly_test.rs"]
mod hourly_test;

/// Hour suffix format (ISO-8601 date and hour)
const HOUR_FORMAT: &str = "%Y-%m-%dT%H";

/// Source of the current time for file naming
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Compute the file path for the hour containing `now`
///
/// The extension is the text after the last `.` of the file name; dots in
/// directory names are ignored.
pub fn rolled_path(base: &Path, now: DateTime<Utc>) -> PathBuf {
    let hour = now.format(HOUR_FORMAT);
    let file_name = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rolled = match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}-{hour}.{ext}"),
        None => format!("{file_name}-{hour}"),
    };
    base.with_file_name(rolled)
}

/// Line file sink that starts a new file every UTC hour
pub struct HourlyFileWriter<C: Clock = SystemClock> {
    base_path: PathBuf,
    clock: C,
    active: Option<ActiveFile>,
    open_error_logger: RateLimitedLogger,
}

impl HourlyFileWriter<SystemClock> {
    /// Create a writer rolling on the system clock
    ///
    /// No file is opened until the first batch arrives.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_clock(base_path, SystemClock)
    }
}

impl<C: Clock> HourlyFileWriter<C> {
    /// Create a writer with a custom clock
    pub fn with_clock(base_path: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            base_path: base_path.into(),
            clock,
            active: None,
            open_error_logger: RateLimitedLogger::default(),
        }
    }

    /// Base path the hourly names are derived from
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the file currently open, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Make sure the file for the current hour is open
    fn roll(&mut self) -> std::io::Result<&mut LineFileWriter> {
        let path = rolled_path(&self.base_path, self.clock.now());

        let stale = self.active.as_ref().is_some_and(|active| active.path != path);
        if stale {
            self.close_active();
        }

        let active = match self.active.take() {
            Some(active) => active,
            None => {
                let writer = LineFileWriter::open(&path)?;
                tracing::info!(path = %path.display(), "rolled to new hourly file");
                ActiveFile { path, writer }
            }
        };

        Ok(&mut self.active.insert(active).writer)
    }

    fn close_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        if let Err(e) = active.writer.close() {
            tracing::error!(
                path = %active.path.display(),
                error = %e,
                "failed to flush hourly file on close"
            );
        }
    }
}

#[async_trait]
impl<T, C> BatchHandler<T> for HourlyFileWriter<C>
where
    T: AsRef<str> + Send + Sync + 'static,
    C: Clock,
{
    async fn handle(&mut self, batch: &[T]) -> bool {
        match self.roll() {
            Ok(writer) => {
                writer.write_batch(batch);
                true
            }
            Err(e) => {
                // Nothing was written; the batch is retried as a whole
                if let Some(suppressed) = self.open_error_logger.check() {
                    tracing::error!(
                        base_path = %self.base_path.display(),
                        error = %e,
                        suppressed_count = suppressed,
                        "failed to open hourly file"
                    );
                }
                false
            }
        }
    }

    async fn finalize(&mut self) -> Result<(), HandlerError> {
        match self.active.take() {
            Some(mut active) => active.writer.close().map_err(HandlerError::from),
            None => Ok(()),
        }
    }
}

impl<C: Clock> std::fmt::Debug for HourlyFileWriter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HourlyFileWriter")
            .field("base_path", &self.base_path)
            .field("current_path", &self.current_path())
            .finish()
    }
}
