//! Error types
use crate::dtype::Dtype;
use crate::frames::{Field, FrameShape};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The reset / step / end-episode call order was violated.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("reset while an episode is in progress; end the episode first")]
    EpisodeInProgress,
    #[error("no episode in progress; call reset first")]
    NoEpisode,
}

/// The recorded episode arrays are inconsistent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    #[error(
        "episode lengths do not line up: {observations} observations, \
         {actions} actions, {rewards} rewards"
    )]
    LengthMismatch {
        observations: usize,
        actions: usize,
        rewards: usize,
    },
    #[error("{field} frame has shape {found:?} but earlier frames have shape {expected:?}")]
    FrameShape {
        field: Field,
        expected: FrameShape,
        found: FrameShape,
    },
    #[error("{infos} infos recorded for {rewards} steps")]
    InfoCount { infos: usize, rewards: usize },
    #[error("stacking {field}: {message}")]
    Stack { field: Field, message: String },
}

/// Writing a batch to disk failed. The batch is kept pending.
#[derive(Error, Debug)]
pub enum FlushError {
    #[error("error writing {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error serializing manifest")]
    Manifest(#[from] serde_json::Error),
}

/// The recorder has been closed.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("trace recorder is closed")]
pub struct ClosedError;

/// A stored batch does not match its manifest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("manifest has no payload file")]
    MissingPayload,
    #[error("payload has no manifest file")]
    MissingManifest,
    #[error("error reading file: {0}")]
    Read(String),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("unsupported manifest version {0}")]
    UnsupportedVersion(u32),
    #[error("payload is {actual} bytes but the manifest declares {declared}")]
    PayloadLength { declared: u64, actual: u64 },
    #[error("{field} slice [{offset}, {offset} + {nbytes}) exceeds payload of {payload_len} bytes")]
    OutOfBounds {
        field: Field,
        offset: u64,
        nbytes: u64,
        payload_len: u64,
    },
    #[error("{field} slice has {nbytes} bytes but shape {shape:?} of {dtype} needs {expected}")]
    SliceSize {
        field: Field,
        shape: Vec<usize>,
        dtype: Dtype,
        nbytes: u64,
        expected: u64,
    },
    #[error("{field} stored as {stored} but read as {requested}")]
    Dtype {
        field: Field,
        stored: Dtype,
        requested: Dtype,
    },
    #[error("{field} has {found} entries, expected {expected}")]
    EpisodeLength {
        field: Field,
        expected: usize,
        found: usize,
    },
    #[error("{field} missing from episode entry")]
    MissingField { field: Field },
}

/// Error from recording a trace.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    #[error(transparent)]
    Flush(#[from] FlushError),
    #[error(transparent)]
    Closed(#[from] ClosedError),
    #[error("error creating trace directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
