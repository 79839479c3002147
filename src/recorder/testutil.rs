//! Test doubles for the recorder tests
//!
//! Mock sinks buffer everything in memory and only hit the disk in
//! `finish`, mimicking encoders that flush on close; verification before
//! close would see nothing, exactly like the real thing.

use crate::capture::traits::{
    AudioSink, AudioSource, AudioSpec, Frame, SinkFactory, StreamProperties, VideoSink,
};
use crate::utils::error::{CloseError, OpenError, WriteError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared failure switches, flippable mid-test.
#[derive(Debug, Default)]
pub(crate) struct FailureFlags {
    pub video_open: AtomicBool,
    pub audio_open: AtomicBool,
    pub video_write: AtomicBool,
    pub video_finish: AtomicBool,
    pub audio_finish: AtomicBool,
    pub audio_start: AtomicBool,
    pub audio_stop: AtomicBool,
}

pub(crate) struct MockSinkFactory {
    flags: Arc<FailureFlags>,
}

impl MockSinkFactory {
    pub fn new(flags: Arc<FailureFlags>) -> Self {
        Self { flags }
    }
}

impl SinkFactory for MockSinkFactory {
    fn open_video(
        &self,
        path: &Path,
        _props: &StreamProperties,
    ) -> Result<Box<dyn VideoSink>, OpenError> {
        if self.flags.video_open.load(Ordering::SeqCst) {
            return Err(OpenError::Sink {
                path: path.display().to_string(),
                reason: "mock video open refused".into(),
            });
        }
        Ok(Box::new(MockVideoSink {
            path: path.to_path_buf(),
            buf: Vec::new(),
            flags: Arc::clone(&self.flags),
        }))
    }

    fn open_audio(&self, path: &Path, _spec: &AudioSpec) -> Result<Arc<dyn AudioSink>, OpenError> {
        if self.flags.audio_open.load(Ordering::SeqCst) {
            return Err(OpenError::Sink {
                path: path.display().to_string(),
                reason: "mock audio open refused".into(),
            });
        }
        Ok(Arc::new(MockAudioSink {
            path: path.to_path_buf(),
            buf: Mutex::new(Vec::new()),
            flags: Arc::clone(&self.flags),
        }))
    }
}

struct MockVideoSink {
    path: PathBuf,
    buf: Vec<u8>,
    flags: Arc<FailureFlags>,
}

impl VideoSink for MockVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
        if self.flags.video_write.load(Ordering::SeqCst) {
            return Err(WriteError("mock video write failure".into()));
        }
        self.buf.extend_from_slice(frame.data());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CloseError> {
        if self.flags.video_finish.load(Ordering::SeqCst) {
            return Err(CloseError("mock video finish failure".into()));
        }
        std::fs::write(&self.path, &self.buf).map_err(|e| CloseError(e.to_string()))
    }
}

struct MockAudioSink {
    path: PathBuf,
    buf: Mutex<Vec<u8>>,
    flags: Arc<FailureFlags>,
}

impl AudioSink for MockAudioSink {
    fn append(&self, samples: &[i16]) -> Result<(), WriteError> {
        let mut buf = self.buf.lock();
        for sample in samples {
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }

    fn finish(&self) -> Result<(), CloseError> {
        if self.flags.audio_finish.load(Ordering::SeqCst) {
            return Err(CloseError("mock audio finish failure".into()));
        }
        std::fs::write(&self.path, &*self.buf.lock()).map_err(|e| CloseError(e.to_string()))
    }
}

/// Audio source whose "hardware callback" runs synchronously at start,
/// pushing `prefill_samples` of silence into the sink.
pub(crate) struct MockAudioSource {
    flags: Arc<FailureFlags>,
    pub starts: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
    pub prefill_samples: usize,
}

impl MockAudioSource {
    pub fn new(flags: Arc<FailureFlags>) -> Self {
        Self {
            flags,
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            prefill_samples: 2048,
        }
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self, _spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<(), OpenError> {
        if self.flags.audio_start.load(Ordering::SeqCst) {
            return Err(OpenError::Device("mock audio start refused".into()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let _ = sink.append(&vec![0i16; self.prefill_samples]);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CloseError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.flags.audio_stop.load(Ordering::SeqCst) {
            return Err(CloseError("mock audio stream refused to stop".into()));
        }
        Ok(())
    }
}
