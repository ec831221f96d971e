//! Batched episode writer.
use crate::dtype::Element;
use crate::episode::Episode;
use crate::error::{ClosedError, FlushError, RecordError};
use crate::manifest::Manifest;
use once_cell::sync::Lazy;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// File name prefix of every batch file.
pub const FILE_PREFIX: &str = "trace";
/// Extension of batch payload files.
pub const PAYLOAD_EXTENSION: &str = "bin";
/// Extension of batch manifest files.
pub const MANIFEST_EXTENSION: &str = "json";
/// Extension of files that are still being written.
pub const TEMP_EXTENSION: &str = "tmp";

/// `<unix millis>.<pid>` at first use; distinguishes processes writing to the same directory.
static PROCESS_STAMP: Lazy<String> = Lazy::new(|| {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis());
    format!("{:013}.{}", millis, std::process::id())
});

/// Distinguishes writers within one process.
static NEXT_WRITER_ID: AtomicU64 = AtomicU64::new(0);

/// Identifier of this process in batch file names.
#[must_use]
pub fn process_stamp() -> &'static str {
    &PROCESS_STAMP
}

/// Collects completed episodes and writes them to disk in batches.
///
/// Each flush writes a new pair of files into the directory:
/// `trace.<process>.<writer>.ep<first episode>.bin` holding the array payload and
/// a `.json` manifest with the same stem describing it.
/// The payload is written before the manifest and each file is renamed into place
/// once complete, so a manifest is only ever visible next to a complete payload.
#[derive(Debug)]
pub struct BatchWriter<O, A> {
    directory: PathBuf,
    batch_size: Option<usize>,
    only_reward: bool,
    /// File stem shared by every batch of this writer.
    stem: String,
    pending: Vec<Episode<O, A>>,
    /// Writer-wide index of `pending[0]`.
    first_pending_index: u64,
    num_flushes: u64,
    closed: bool,
}

impl<O, A> BatchWriter<O, A> {
    /// Create a writer, creating `directory` if it does not exist.
    ///
    /// A `batch_size` of `None` keeps every episode in memory until [`close`](Self::close).
    pub fn new<P: Into<PathBuf>>(
        directory: P,
        batch_size: Option<usize>,
        only_reward: bool,
    ) -> Result<Self, RecordError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| RecordError::CreateDir {
            path: directory.clone(),
            source,
        })?;
        let writer_id = NEXT_WRITER_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            directory,
            batch_size: batch_size.map(|n| n.max(1)),
            only_reward,
            stem: writer_stem(writer_id),
            pending: Vec::new(),
            first_pending_index: 0,
            num_flushes: 0,
            closed: false,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub const fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Number of episodes waiting to be flushed.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Number of successful non-empty flushes.
    #[must_use]
    pub const fn num_flushes(&self) -> u64 {
        self.num_flushes
    }

    /// Number of episodes written to disk.
    #[must_use]
    pub const fn num_written(&self) -> u64 {
        self.first_pending_index
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<O: Element, A: Element> BatchWriter<O, A> {
    /// File stem of the next batch.
    fn batch_stem(&self) -> String {
        format!("{}.ep{:020}", self.stem, self.first_pending_index)
    }

    /// Add a completed episode, flushing if the batch is full.
    ///
    /// If the flush fails the episode stays pending and the error is returned.
    pub fn submit(&mut self, episode: Episode<O, A>) -> Result<(), RecordError> {
        if self.closed {
            return Err(ClosedError.into());
        }
        self.pending.push(episode);
        if self
            .batch_size
            .map_or(false, |batch_size| self.pending.len() >= batch_size)
        {
            self.flush()?;
        }
        Ok(())
    }

    /// Write all pending episodes as one batch.
    ///
    /// Does nothing if there are no pending episodes.
    /// On failure the pending episodes are kept so that the flush can be retried.
    pub fn flush(&mut self) -> Result<(), FlushError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let stem = self.batch_stem();
        let payload_name = format!("{}.{}", stem, PAYLOAD_EXTENSION);
        let manifest_path = self
            .directory
            .join(format!("{}.{}", stem, MANIFEST_EXTENSION));

        let manifest = Manifest::describe(
            &self.pending,
            self.first_pending_index,
            self.only_reward,
            payload_name.clone(),
        );
        let payload = manifest.encode_payload(&self.pending);
        let manifest_json = serde_json::to_vec(&manifest)?;

        write_atomic(&self.directory.join(&payload_name), &payload)?;
        write_atomic(&manifest_path, &manifest_json)?;
        sync_dir(&self.directory)?;

        debug!(
            path = %manifest_path.display(),
            episodes = self.pending.len(),
            payload_bytes = payload.len(),
            "flushed trace batch"
        );
        self.first_pending_index += self.pending.len() as u64;
        self.pending.clear();
        self.num_flushes += 1;
        Ok(())
    }

    /// Flush any pending episodes and stop accepting new ones.
    ///
    /// Closing a closed writer does nothing.
    /// If the final flush fails the writer stays open.
    pub fn close(&mut self) -> Result<(), FlushError> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        info!(
            directory = %self.directory.display(),
            episodes = self.first_pending_index,
            batches = self.num_flushes,
            "closed trace writer"
        );
        Ok(())
    }
}

impl<O, A> Drop for BatchWriter<O, A> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                directory = %self.directory.display(),
                episodes = self.pending.len(),
                "trace writer dropped with unflushed episodes; call close() to keep them"
            );
        }
    }
}

/// File stem shared by every batch of one writer.
///
/// Numbers are padded to the width of `u64` so that names sort in creation order.
fn writer_stem(writer_id: u64) -> String {
    format!("{}.{}.{:020}", FILE_PREFIX, process_stamp(), writer_id)
}

/// Write `bytes` to a temporary file next to `path` then rename it into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FlushError> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".");
    temp_name.push(TEMP_EXTENSION);
    let temp_path = PathBuf::from(temp_name);

    let io_error = |source: std::io::Error| FlushError::Io {
        path: path.to_owned(),
        source,
    };
    let mut file = File::create(&temp_path).map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    drop(file);
    fs::rename(&temp_path, path).map_err(io_error)
}

#[cfg(unix)]
fn sync_dir(directory: &Path) -> Result<(), FlushError> {
    File::open(directory)
        .and_then(|dir| dir.sync_all())
        .map_err(|source| FlushError::Io {
            path: directory.to_owned(),
            source,
        })
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
fn sync_dir(_directory: &Path) -> Result<(), FlushError> {
    Ok(())
}
