//! Capture trait definitions
//!
//! Capability contracts the recording core consumes. The actual device
//! backends (camera, microphone, serial port) and the encoding sinks live
//! outside this crate; the core only depends on these interfaces.

use crate::utils::error::{CloseError, OpenError, ReadError, WriteError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Fallback frame rate used when a source reports an implausible value.
pub const DEFAULT_FPS: f64 = 30.0;

/// Upper bound on a plausible reported frame rate.
pub const MAX_FPS: f64 = 120.0;

/// Stream properties negotiated when a frame source opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamProperties {
    /// Frame width in pixels
    pub width: i32,

    /// Frame height in pixels
    pub height: i32,

    /// Frames per second as reported by the device
    pub fps: f64,
}

impl StreamProperties {
    /// Validate the reported properties.
    ///
    /// Non-positive dimensions are a fatal open error. An fps outside
    /// `(0, 120]` is recoverable: it is clamped to [`DEFAULT_FPS`] and
    /// logged.
    pub fn validated(self) -> Result<Self, OpenError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(OpenError::InvalidProperties {
                width: self.width,
                height: self.height,
            });
        }

        let fps = if self.fps > 0.0 && self.fps <= MAX_FPS {
            self.fps
        } else {
            tracing::warn!(
                reported = self.fps,
                "source reported implausible fps, defaulting to {}",
                DEFAULT_FPS
            );
            DEFAULT_FPS
        };

        Ok(Self { fps, ..self })
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSpec {
    /// Sampling frequency in Hz
    pub samplerate: u32,

    /// Number of input channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Input device identifier; `None` selects the system default
    pub device: Option<String>,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            samplerate: 44_100,
            channels: 1,
            device: None,
        }
    }
}

/// One captured video frame.
///
/// Cheap to clone: the pixel payload is shared, so the same frame can be
/// forwarded to the video sink and broadcast to a best-effort preview
/// consumer without copying.
#[derive(Clone)]
pub struct Frame {
    data: Arc<[u8]>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame").field("len", &self.data.len()).finish()
    }
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A blocking video frame producer (e.g. a webcam backend).
///
/// Runs on its own thread via [`crate::capture::pump::spawn_frame_source`];
/// it must never block on the controller.
pub trait FrameSource: Send {
    /// Open the device and negotiate stream properties.
    fn open(&mut self) -> Result<StreamProperties, OpenError>;

    /// Read the next frame. Blocks until a frame is available or the
    /// device fails. A terminal error ends the capture session.
    fn next_frame(&mut self) -> Result<Frame, ReadError>;

    /// Release the device.
    fn close(&mut self);

    /// Handle that force-releases the device to unblock a pending read.
    ///
    /// May be called at any time from any thread; forcing release before
    /// the device is open must be a no-op. Used as the shutdown safety
    /// net when the producer does not acknowledge cancellation in time.
    fn unblocker(&self) -> Arc<dyn Fn() + Send + Sync> {
        Arc::new(|| {})
    }
}

/// A callback-driven audio producer (e.g. a microphone stream).
///
/// Once started, the hardware callback appends sample blocks directly to
/// the supplied sink. The sink data path belongs to the callback; its
/// lifecycle (open/finish) belongs to the controller, which quiesces the
/// callback via [`AudioSource::stop`] before any finalization step.
pub trait AudioSource: Send {
    /// Open the input stream and begin delivering blocks to `sink`.
    fn start(&mut self, spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<(), OpenError>;

    /// Stop the stream and join the callback.
    ///
    /// On `Ok` the callback is guaranteed not to run again and the sink
    /// may be finished. On `Err` the callback could not be quiesced
    /// within a bounded time; the sink must not be touched.
    fn stop(&mut self) -> Result<(), CloseError>;
}

/// A blocking line-oriented remote command producer (e.g. a serial port).
///
/// Port and baud rate are configuration of the implementor; the core only
/// needs open/read/close.
pub trait CommandSource: Send {
    /// Open the channel.
    fn open(&mut self) -> Result<(), OpenError>;

    /// Read the next text line. Blocks until a line arrives or the
    /// channel fails.
    fn next_line(&mut self) -> Result<String, ReadError>;

    /// Release the channel.
    fn close(&mut self);

    /// See [`FrameSource::unblocker`].
    fn unblocker(&self) -> Arc<dyn Fn() + Send + Sync> {
        Arc::new(|| {})
    }
}

/// Per-segment video output. Exclusively owned by the segment writer.
///
/// Implementations may buffer; data is only guaranteed on disk after
/// `finish` returns, which is why finalization verifies files after the
/// close and never before.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriteError>;

    /// Flush buffered data and close the file. Called exactly once.
    fn finish(&mut self) -> Result<(), CloseError>;
}

/// Per-segment audio output, shared with the hardware callback.
///
/// `append` is invoked from the callback thread and must be append-only;
/// `finish` is invoked by the controller, and only after the callback has
/// been quiesced.
pub trait AudioSink: Send + Sync {
    fn append(&self, samples: &[i16]) -> Result<(), WriteError>;

    /// Flush buffered data and close the file. Called exactly once.
    fn finish(&self) -> Result<(), CloseError>;
}

/// Opens the output sinks for a new segment. Codec selection is the
/// implementor's concern.
pub trait SinkFactory: Send {
    fn open_video(
        &self,
        path: &Path,
        props: &StreamProperties,
    ) -> Result<Box<dyn VideoSink>, OpenError>;

    fn open_audio(&self, path: &Path, spec: &AudioSpec) -> Result<Arc<dyn AudioSink>, OpenError>;
}

/// Filesystem operations used by finalization (verify and dispose).
/// Abstracted so segment disposal is testable without real devices.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Size in bytes; 0 if the file cannot be inspected.
    fn size(&self, path: &Path) -> u64;

    fn remove(&self, path: &Path) -> std::io::Result<()>;

    fn ensure_dir(&self, path: &Path) -> std::io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileSystem for StdFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn size(&self, path: &Path) -> u64 {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }

    fn ensure_dir(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
