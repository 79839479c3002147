//! Segment writer
//!
//! Owns the two output sinks of a single loop and implements the
//! close-then-verify-then-dispose finalization protocol. The underlying
//! encoders may buffer data that is only flushed on close, so on-disk
//! verification happens strictly after both legs are closed; and a file
//! whose handle may still be open is never deleted.

use super::state::Disposition;
use crate::capture::traits::{
    AudioSink, AudioSource, AudioSpec, FileSystem, Frame, SinkFactory, StreamProperties, VideoSink,
};
use crate::utils::error::{FinalizeError, OpenError, WriteError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A WAV file at or below this size holds no audible data and fails
/// verification.
pub const MIN_AUDIO_BYTES: u64 = 1024;

/// One output leg of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    Video,
    Audio,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Leg::Video => write!(f, "video"),
            Leg::Audio => write!(f, "audio"),
        }
    }
}

/// Post-finalization status of one leg.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegReport {
    pub leg: Leg,
    pub path: PathBuf,

    /// The sink (or stream) closed cleanly
    pub closed: bool,

    /// The file exists on disk with a plausible size
    pub verified: bool,

    /// Failure detail when `closed` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LegReport {
    pub fn ok(&self) -> bool {
        self.closed && self.verified
    }

    fn describe(&self) -> String {
        if let Some(detail) = &self.detail {
            return detail.clone();
        }
        if !self.verified {
            return "file missing or empty after close".to_string();
        }
        "ok".to_string()
    }
}

/// Result of closing and verifying both legs, reported to the controller
/// before it decides disposal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutcome {
    pub video: LegReport,
    pub audio: LegReport,
}

impl FinalizeOutcome {
    pub fn all_ok(&self) -> bool {
        self.video.ok() && self.audio.ok()
    }
}

/// Writer for the current segment's video and audio files.
///
/// The video sink is exclusively owned here. The audio sink is shared
/// with the hardware callback, which appends data directly; this writer
/// only drives its lifecycle, and only after the controller has quiesced
/// the callback.
pub struct SegmentWriter {
    video: Box<dyn VideoSink>,
    audio: Arc<dyn AudioSink>,
    video_path: PathBuf,
    audio_path: PathBuf,
    frames_written: u64,
}

impl SegmentWriter {
    /// Open both legs for a new segment.
    ///
    /// The audio leg starts first; if the video sink then fails to open,
    /// the audio stream is stopped and its partial file removed, so a
    /// failed begin leaves nothing behind and no segment is created.
    pub fn open(
        video_path: &Path,
        audio_path: &Path,
        props: &StreamProperties,
        spec: &AudioSpec,
        sinks: &dyn SinkFactory,
        audio_source: &mut dyn AudioSource,
        fs: &dyn FileSystem,
    ) -> Result<Self, OpenError> {
        let audio = sinks.open_audio(audio_path, spec)?;

        if let Err(e) = audio_source.start(spec, Arc::clone(&audio)) {
            // A sink that did not close cleanly may still hold the file
            // open; it is only safe to remove after a clean finish.
            if audio.finish().is_ok() {
                remove_if_present(fs, audio_path);
            }
            return Err(e);
        }

        let video = match sinks.open_video(video_path, props) {
            Ok(video) => video,
            Err(e) => {
                tracing::warn!(error = %e, "video sink failed to open; unwinding audio leg");
                // Only touch the audio file once the callback is provably
                // quiet and the sink closed cleanly; a still-open handle
                // must be left alone.
                if audio_source.stop().is_ok() && audio.finish().is_ok() {
                    remove_if_present(fs, audio_path);
                }
                return Err(e);
            }
        };

        Ok(Self {
            video,
            audio,
            video_path: video_path.to_path_buf(),
            audio_path: audio_path.to_path_buf(),
            frames_written: 0,
        })
    }

    pub fn video_path(&self) -> &Path {
        &self.video_path
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame to the video leg, preserving arrival order.
    pub fn append_frame(&mut self, frame: &Frame) -> Result<(), WriteError> {
        self.video.write_frame(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close both legs and verify the files on disk.
    ///
    /// Consumes the writer, so no data can be appended once finalization
    /// has begun. `audio_quiesced` reports whether the controller managed
    /// to stop the hardware callback; if it did not, the audio sink is
    /// left untouched and its leg reported unclosed.
    pub fn finalize(mut self, audio_quiesced: bool, fs: &dyn FileSystem) -> FinalizeOutcome {
        let (audio_closed, audio_detail) = if audio_quiesced {
            match self.audio.finish() {
                Ok(()) => (true, None),
                Err(e) => (false, Some(format!("audio close failed: {e}"))),
            }
        } else {
            (
                false,
                Some("audio callback not quiesced; file left open".to_string()),
            )
        };

        let (video_closed, video_detail) = match self.video.finish() {
            Ok(()) => (true, None),
            Err(e) => (false, Some(format!("video close failed: {e}"))),
        };

        let video = LegReport {
            leg: Leg::Video,
            verified: video_closed && fs.exists(&self.video_path) && fs.size(&self.video_path) > 0,
            path: self.video_path,
            closed: video_closed,
            detail: video_detail,
        };
        let audio = LegReport {
            leg: Leg::Audio,
            verified: audio_closed
                && fs.exists(&self.audio_path)
                && fs.size(&self.audio_path) > MIN_AUDIO_BYTES,
            path: self.audio_path,
            closed: audio_closed,
            detail: audio_detail,
        };

        FinalizeOutcome { video, audio }
    }
}

/// Apply the Save/Discard decision to a finalized segment's files.
///
/// Save keeps every file that exists, even when a leg failed; Discard
/// deletes only the legs that closed cleanly, because deleting a file
/// whose handle may still be open is undefined behavior on some
/// platforms.
pub fn dispose(
    id: u64,
    outcome: &FinalizeOutcome,
    disposition: Disposition,
    fs: &dyn FileSystem,
) -> Result<(), FinalizeError> {
    match disposition {
        Disposition::Save => {
            if outcome.all_ok() {
                Ok(())
            } else {
                Err(FinalizeError::SaveIncomplete {
                    id,
                    video: outcome.video.describe(),
                    audio: outcome.audio.describe(),
                })
            }
        }
        Disposition::Discard => {
            let video = discard_leg(&outcome.video, fs);
            let audio = discard_leg(&outcome.audio, fs);
            match (video, audio) {
                (Ok(()), Ok(())) => Ok(()),
                (video, audio) => Err(FinalizeError::DiscardIncomplete {
                    id,
                    video: leg_status(video),
                    audio: leg_status(audio),
                }),
            }
        }
    }
}

fn discard_leg(report: &LegReport, fs: &dyn FileSystem) -> Result<(), String> {
    if !report.closed {
        // Possibly still locked by a live handle; leave it in place.
        return Err(format!("left in place ({})", report.describe()));
    }
    if !fs.exists(&report.path) {
        return Ok(());
    }
    fs.remove(&report.path)
        .map_err(|e| format!("delete failed: {e}"))
}

fn leg_status(result: Result<(), String>) -> String {
    match result {
        Ok(()) => "deleted".to_string(),
        Err(detail) => detail,
    }
}

fn remove_if_present(fs: &dyn FileSystem, path: &Path) {
    if fs.exists(path) {
        if let Err(e) = fs.remove(path) {
            tracing::warn!(?path, error = %e, "could not remove partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::StdFs;
    use crate::recorder::testutil::{FailureFlags, MockAudioSource, MockSinkFactory};
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn props() -> StreamProperties {
        StreamProperties {
            width: 1280,
            height: 720,
            fps: 30.0,
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        flags: Arc<FailureFlags>,
        factory: MockSinkFactory,
        audio: MockAudioSource,
        fs: StdFs,
    }

    impl Fixture {
        fn new() -> Self {
            let flags = Arc::new(FailureFlags::default());
            Self {
                dir: tempdir().unwrap(),
                factory: MockSinkFactory::new(Arc::clone(&flags)),
                audio: MockAudioSource::new(Arc::clone(&flags)),
                flags,
                fs: StdFs,
            }
        }

        fn paths(&self) -> (PathBuf, PathBuf) {
            (
                self.dir.path().join("Loop_1_120000_01012024.mp4"),
                self.dir.path().join("Loop_1_120000_01012024.wav"),
            )
        }

        fn open(&mut self) -> Result<SegmentWriter, OpenError> {
            let (video, audio) = self.paths();
            SegmentWriter::open(
                &video,
                &audio,
                &props(),
                &AudioSpec::default(),
                &self.factory,
                &mut self.audio,
                &self.fs,
            )
        }
    }

    #[test]
    fn save_with_clean_legs_keeps_verified_files() {
        let mut fx = Fixture::new();
        let mut writer = fx.open().unwrap();

        for _ in 0..5 {
            writer.append_frame(&Frame::new(vec![7u8; 256])).unwrap();
        }
        assert_eq!(writer.frames_written(), 5);

        let outcome = writer.finalize(true, &fx.fs);
        assert!(outcome.all_ok());

        dispose(1, &outcome, Disposition::Save, &fx.fs).unwrap();
        let (video, audio) = fx.paths();
        assert!(fx.fs.size(&video) > 0);
        assert!(fx.fs.size(&audio) > MIN_AUDIO_BYTES);
    }

    #[test]
    fn discard_with_clean_legs_removes_both_files() {
        let mut fx = Fixture::new();
        let mut writer = fx.open().unwrap();
        writer.append_frame(&Frame::new(vec![7u8; 256])).unwrap();

        let outcome = writer.finalize(true, &fx.fs);
        dispose(1, &outcome, Disposition::Discard, &fx.fs).unwrap();

        let (video, audio) = fx.paths();
        assert!(!fx.fs.exists(&video));
        assert!(!fx.fs.exists(&audio));
    }

    #[test]
    fn video_open_failure_unwinds_the_audio_leg() {
        let mut fx = Fixture::new();
        fx.flags.video_open.store(true, Ordering::SeqCst);

        assert!(fx.open().is_err());

        let (_, audio) = fx.paths();
        assert!(!fx.fs.exists(&audio));
        assert_eq!(fx.audio.starts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.audio.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_unwind_never_deletes_an_unclosed_audio_file() {
        let mut fx = Fixture::new();
        fx.flags.video_open.store(true, Ordering::SeqCst);
        fx.flags.audio_finish.store(true, Ordering::SeqCst);

        // Stand-in for a sink that creates its file eagerly on open and
        // then refuses to close; the unwind must leave it in place.
        let (_, audio) = fx.paths();
        std::fs::write(&audio, vec![0u8; 64]).unwrap();

        assert!(fx.open().is_err());
        assert!(fx.fs.exists(&audio));
    }

    #[test]
    fn unquiesced_audio_leg_is_never_closed_or_deleted() {
        let mut fx = Fixture::new();
        let writer = fx.open().unwrap();

        let outcome = writer.finalize(false, &fx.fs);
        assert!(!outcome.audio.closed);
        assert!(!outcome.audio.verified);

        let err = dispose(3, &outcome, Disposition::Discard, &fx.fs).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("segment 3"));
        assert!(msg.contains("left in place"));
    }

    #[test]
    fn save_never_deletes_even_when_a_leg_fails() {
        let mut fx = Fixture::new();
        let mut writer = fx.open().unwrap();
        writer.append_frame(&Frame::new(vec![7u8; 256])).unwrap();
        fx.flags.video_finish.store(true, Ordering::SeqCst);

        let outcome = writer.finalize(true, &fx.fs);
        assert!(!outcome.video.ok());
        assert!(outcome.audio.ok());

        assert!(dispose(2, &outcome, Disposition::Save, &fx.fs).is_err());
        let (_, audio) = fx.paths();
        assert!(fx.fs.exists(&audio));
    }

    #[test]
    fn discard_failure_on_one_leg_still_disposes_the_other() {
        let mut fx = Fixture::new();
        let mut writer = fx.open().unwrap();
        writer.append_frame(&Frame::new(vec![7u8; 256])).unwrap();
        fx.flags.audio_finish.store(true, Ordering::SeqCst);

        let outcome = writer.finalize(true, &fx.fs);
        let err = dispose(4, &outcome, Disposition::Discard, &fx.fs).unwrap_err();
        assert!(err.to_string().contains("audio"));

        // The clean video leg was still deleted.
        let (video, _) = fx.paths();
        assert!(!fx.fs.exists(&video));
    }

    #[test]
    fn tiny_audio_file_fails_verification() {
        let mut fx = Fixture::new();
        fx.audio.prefill_samples = 16; // 32 bytes, below the WAV floor
        let writer = fx.open().unwrap();

        let outcome = writer.finalize(true, &fx.fs);
        assert!(outcome.audio.closed);
        assert!(!outcome.audio.verified);
        assert!(dispose(5, &outcome, Disposition::Save, &fx.fs).is_err());
    }
}
