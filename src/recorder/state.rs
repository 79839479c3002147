//! Recording state management
//!
//! Defines the controller state machine and the data model for segments
//! and capture sessions.

use crate::capture::pump::SourceControl;
use crate::capture::traits::StreamProperties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Current state of the recording controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// No capture session is open
    NoSource,
    /// A session is open but no segment is recording
    SourceReady,
    /// Frames are being appended to the current segment
    Recording,
    /// Video forwarding is paused; audio keeps recording
    Paused,
    /// The current segment is being closed, verified and disposed
    Finalizing,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::NoSource
    }
}

impl ControllerState {
    /// Whether a segment currently exists (recording or paused).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// How a stopped segment's files are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Keep the files (never deleted, even if a leg failed)
    Save,
    /// Delete the files whose legs closed cleanly
    Discard,
}

/// One loop of recording, bounded by a begin and a stop.
///
/// Exactly one segment is current at any time; the controller owns it
/// exclusively and discards its identity once finalization completes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Loop number, strictly increasing for the controller's lifetime
    pub id: u64,

    /// Video output path, generated once, never reused
    pub video_path: PathBuf,

    /// Audio output path, sharing the video path's id and timestamp
    pub audio_path: PathBuf,

    /// When the segment began
    pub started_at: DateTime<Utc>,
}

/// The open video source and its negotiated properties.
///
/// Lifetime is independent of any segment: stopping a segment never stops
/// the session, while losing the session always forces the current
/// segment into finalization.
pub struct CaptureSession {
    props: StreamProperties,
    control: SourceControl,
}

impl CaptureSession {
    pub fn new(props: StreamProperties, control: SourceControl) -> Self {
        Self { props, control }
    }

    pub fn props(&self) -> StreamProperties {
        self.props
    }

    /// Quiesce the video producer: cancel, bounded wait, forced handle
    /// release on timeout. Returns `true` if the producer exited.
    pub fn shutdown(self, timeout: Duration) -> bool {
        self.control.shutdown(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_recording_and_paused_are_active() {
        assert!(ControllerState::Recording.is_active());
        assert!(ControllerState::Paused.is_active());
        assert!(!ControllerState::NoSource.is_active());
        assert!(!ControllerState::SourceReady.is_active());
        assert!(!ControllerState::Finalizing.is_active());
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&ControllerState::SourceReady).unwrap();
        assert_eq!(json, "\"sourceready\"");
        let json = serde_json::to_string(&Disposition::Discard).unwrap();
        assert_eq!(json, "\"discard\"");
    }
}
