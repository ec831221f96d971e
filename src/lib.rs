//! Recording and playback of reinforcement learning episode traces.
//!
//! Episodes are captured step by step into an [`EpisodeBuffer`],
//! written in batches by a [`BatchWriter`] as pairs of files
//! (a JSON [`Manifest`] describing a binary payload of array data),
//! and read back by a [`TraceScanner`].
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::for_kv_map)]
#![warn(clippy::missing_const_for_fn)] // has some false positives
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod closer;
pub mod dtype;
pub mod envs;
pub mod episode;
mod error;
pub mod frames;
pub mod manifest;
pub mod recorder;
pub mod scanner;
pub mod writer;

pub use closer::{Close, CloseId, Closer};
pub use dtype::{Dtype, Element};
pub use episode::{CaptureMode, Episode, EpisodeBuffer, Info};
pub use error::{
    ClosedError, CorruptionError, FlushError, InvariantError, ProtocolError, RecordError,
};
pub use frames::{AsFrame, Field, FrameShape};
pub use manifest::Manifest;
pub use recorder::{TraceRecorder, TraceRecorderConfig};
pub use scanner::{scan, Episodes, ScanReport, Skipped, TraceScanner};
pub use writer::BatchWriter;
