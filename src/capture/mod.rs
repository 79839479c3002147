//! Capture boundary
//!
//! This module holds the capability contracts the core consumes (frame,
//! audio and command sources; output sinks; filesystem), the ordered
//! backend fallback, and the producer pumps that feed the controller's
//! event queue.

pub mod fallback;
pub mod pump;
pub mod traits;

// Re-export the contracts embedders implement
pub use traits::{
    AudioSink, AudioSource, AudioSpec, CommandSource, FileSystem, Frame, FrameSource, SinkFactory,
    StdFs, StreamProperties, VideoSink,
};

pub use fallback::FallbackSource;
pub use pump::{spawn_command_source, spawn_frame_source, CancelToken, SourceControl};
