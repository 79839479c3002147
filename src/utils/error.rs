//! Error types and handling
//!
//! Common error taxonomy used across the recording core. Producer-side
//! errors are reported upward as controller events, never thrown across
//! thread boundaries.

use thiserror::Error;

/// Failure to obtain a device or open an output sink.
///
/// Fatal to the capture session (or to the segment being opened), never
/// to the process. The controller does not retry opens on its own.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("device unavailable: {0}")]
    Device(String),

    #[error("invalid stream properties: {width}x{height}")]
    InvalidProperties { width: i32, height: i32 },

    #[error("no capture backend could be opened ({attempts} candidates tried)")]
    NoBackend { attempts: usize },

    #[error("failed to open output sink {path}: {reason}")]
    Sink { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while reading from a blocking producer (camera, serial line).
#[derive(Error, Debug)]
pub enum ReadError {
    /// A single read failed but the device is still usable.
    #[error("transient read failure: {0}")]
    Transient(String),

    /// The device is gone; the producer must shut down.
    #[error("stream terminated: {0}")]
    Terminal(String),
}

impl ReadError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadError::Terminal(_))
    }
}

/// Failure to append data to a video or audio sink.
///
/// Forces an immediate discard-stop of the current segment; the controller
/// then attempts an auto-restart if the capture session is still alive.
#[derive(Error, Debug)]
#[error("write failed: {0}")]
pub struct WriteError(pub String);

/// Failure to flush/close a sink or quiesce an audio stream.
#[derive(Error, Debug)]
#[error("close failed: {0}")]
pub struct CloseError(pub String);

/// A finalization leg failed.
///
/// Reported to the operator, but never aborts the other leg's disposal.
/// The `video`/`audio` fields carry a short per-leg status string with
/// enough detail to diagnose a disk-full or device-disconnect after the
/// fact.
#[derive(Error, Debug)]
pub enum FinalizeError {
    /// An intended Save finished with at least one leg unverified on disk.
    /// Files are kept regardless.
    #[error("segment {id}: saved with problems (video: {video}; audio: {audio})")]
    SaveIncomplete { id: u64, video: String, audio: String },

    /// A Discard could not delete every leg. A leg that failed to close
    /// cleanly is never deleted; its file is left in place.
    #[error("segment {id}: discard left files behind (video: {video}; audio: {audio})")]
    DiscardIncomplete { id: u64, video: String, audio: String },
}

/// A remote line that is not part of the command vocabulary. Logged, never
/// fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown remote command: {0:?}")]
pub struct CommandParseError(pub String);
