//! Trace recorder: the episode buffer and batch writer driven together.
use crate::dtype::Element;
use crate::episode::{CaptureMode, EpisodeBuffer, Info};
use crate::error::{ClosedError, FlushError, RecordError};
use crate::frames::AsFrame;
use crate::writer::{process_stamp, BatchWriter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for [`TraceRecorder`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceRecorderConfig {
    /// Directory to write traces into; created if absent.
    ///
    /// Defaults to a new directory in the system temporary directory.
    pub directory: Option<PathBuf>,
    /// Number of episodes per batch file.
    ///
    /// If `None`, all episodes are written in a single batch when the recorder is closed.
    pub batch_size: Option<usize>,
    /// Only record rewards.
    pub only_reward: bool,
    /// Record the per-step info values.
    pub record_infos: bool,
}

impl TraceRecorderConfig {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    #[must_use]
    pub fn only_reward(mut self) -> Self {
        self.only_reward = true;
        self
    }

    #[must_use]
    pub fn record_infos(mut self) -> Self {
        self.record_infos = true;
        self
    }

    /// Directory that a recorder built from this configuration writes into.
    #[must_use]
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("trace-recording.{}", process_stamp()))
        })
    }

    /// Build a recorder, creating its directory.
    pub fn build_recorder<O, A>(&self) -> Result<TraceRecorder<O, A>, RecordError> {
        let writer = BatchWriter::new(
            self.resolved_directory(),
            self.batch_size,
            self.only_reward,
        )?;
        Ok(TraceRecorder {
            buffer: EpisodeBuffer::new(CaptureMode {
                only_reward: self.only_reward,
                record_infos: self.record_infos,
            }),
            writer,
        })
    }
}

/// Records a trace of observations, actions and rewards into batched files.
///
/// For an episode of length `N` this records
/// * `N + 1` observations, including the initial observation from the reset;
/// * `N` actions; and
/// * `N` rewards.
///
/// The recorder must be [closed](TraceRecorder::close) for the last batch to be written.
/// Nothing is written when a recorder is dropped.
#[derive(Debug)]
pub struct TraceRecorder<O, A> {
    buffer: EpisodeBuffer<O, A>,
    writer: BatchWriter<O, A>,
}

impl<O, A> TraceRecorder<O, A> {
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.writer.directory()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.writer.is_closed()
    }

    #[must_use]
    pub const fn is_episode_open(&self) -> bool {
        self.buffer.is_open()
    }

    #[must_use]
    pub const fn writer(&self) -> &BatchWriter<O, A> {
        &self.writer
    }

    /// Whether the open episode has steps that have not been handed to the writer.
    #[must_use]
    pub fn has_unfinished_episode(&self) -> bool {
        self.buffer.num_steps().map_or(false, |n| n > 0)
    }
}

impl<O, A> Drop for TraceRecorder<O, A> {
    fn drop(&mut self) {
        if self.has_unfinished_episode() {
            warn!(
                directory = %self.directory().display(),
                steps = self.buffer.num_steps().unwrap_or(0),
                "trace recorder dropped with an unfinished episode; call close() to keep it"
            );
        }
    }
}

impl<O: Element, A: Element> TraceRecorder<O, A> {
    /// Record the observation that starts a new episode.
    pub fn add_reset<F>(&mut self, observation: &F) -> Result<(), RecordError>
    where
        F: AsFrame<Elem = O> + ?Sized,
    {
        self.check_open()?;
        self.buffer.add_reset(observation)
    }

    /// Record one step of the open episode.
    pub fn add_step<FA, FO>(
        &mut self,
        action: &FA,
        observation: &FO,
        reward: f64,
        info: Info,
    ) -> Result<(), RecordError>
    where
        FA: AsFrame<Elem = A> + ?Sized,
        FO: AsFrame<Elem = O> + ?Sized,
    {
        self.check_open()?;
        self.buffer.add_step(action, observation, reward, info)
    }

    /// Record one step and end the episode if `done`.
    pub fn record_step<FA, FO>(
        &mut self,
        action: &FA,
        observation: &FO,
        reward: f64,
        done: bool,
        info: Info,
    ) -> Result<(), RecordError>
    where
        FA: AsFrame<Elem = A> + ?Sized,
        FO: AsFrame<Elem = O> + ?Sized,
    {
        self.add_step(action, observation, reward, info)?;
        if done {
            self.end_episode()?;
        }
        Ok(())
    }

    /// End the open episode and queue it for writing.
    pub fn end_episode(&mut self) -> Result<(), RecordError> {
        self.check_open()?;
        let episode = self.buffer.end_episode()?;
        self.writer.submit(episode)
    }

    /// Write all completed episodes now.
    pub fn flush(&mut self) -> Result<(), FlushError> {
        self.writer.flush()
    }

    /// Write any remaining episodes and close the recorder.
    ///
    /// An open episode with at least one step is ended and written;
    /// an open episode without steps is discarded.
    /// Closing a closed recorder does nothing.
    pub fn close(&mut self) -> Result<(), RecordError> {
        if self.is_closed() {
            return Ok(());
        }
        self.end_open_episode()?;
        self.writer.close()?;
        Ok(())
    }

    /// End the open episode, if any.
    ///
    /// The episode is queued for writing if it has at least one step
    /// and discarded otherwise.
    pub fn end_open_episode(&mut self) -> Result<(), RecordError> {
        match self.buffer.num_steps() {
            Some(0) => {
                self.buffer.end_episode()?;
                Ok(())
            }
            Some(_) => self.end_episode(),
            None => Ok(()),
        }
    }

    fn check_open(&self) -> Result<(), ClosedError> {
        if self.is_closed() {
            Err(ClosedError)
        } else {
            Ok(())
        }
    }
}
