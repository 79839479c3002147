//! Recording controller
//!
//! The single logical actor of the system. Three producers (video
//! frames, remote command lines, audio stream errors) post into one
//! inbound queue; the controller drains it strictly in arrival order and
//! never runs two transitions concurrently, which is what makes
//! exactly-once segment transitions trivial to reason about. No locks
//! are needed inside the controller, only at the queue boundary and the
//! externally observable state cell.

use super::naming::LoopNamer;
use super::state::{CaptureSession, ControllerState, Disposition, Segment};
use super::writer::{dispose, SegmentWriter};
use crate::capture::pump::SourceControl;
use crate::capture::traits::{
    AudioSource, AudioSpec, FileSystem, Frame, SinkFactory, StreamProperties,
};
use crate::remote::RemoteCommand;
use crate::utils::error::OpenError;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Controller tuning and output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Directory segment files are written to. Changeable while running;
    /// takes effect from the next segment.
    pub output_dir: PathBuf,

    /// Audio capture configuration for every segment
    pub audio: AudioSpec,

    /// Inbound event queue depth
    pub queue_capacity: usize,

    /// How long a producer gets to acknowledge shutdown before its
    /// device handle is force-released
    pub producer_stop_timeout: Duration,

    /// Stop requests arriving within this window after a finalize are
    /// treated as duplicates of the stop that caused it
    pub stop_debounce: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            audio: AudioSpec::default(),
            queue_capacity: 256,
            producer_stop_timeout: Duration::from_secs(2),
            stop_debounce: Duration::from_millis(300),
        }
    }
}

/// Everything that can arrive on the controller's inbound queue.
///
/// Commands, frames and error reports all travel through here, so a
/// remote command and a frame-driven transition can never race.
#[derive(Debug)]
pub enum InboundEvent {
    /// The video producer opened its device with valid properties
    SessionOpened {
        props: StreamProperties,
        control: SourceControl,
    },
    /// The video producer could not open (or validated invalid)
    OpenFailed { error: OpenError },
    /// The video device failed terminally or disappeared
    SessionLost { reason: String },
    /// One captured frame
    Frame(Frame),
    /// The audio hardware stream reported a fatal error
    AudioFailed { reason: String },
    /// One raw line from the remote command channel
    CommandLine(String),
    /// An action taken by the local operator
    Operator(OperatorAction),
}

/// Operator-initiated actions, serialized through the same queue as
/// everything else.
#[derive(Debug, Clone)]
pub enum OperatorAction {
    Start,
    Pause,
    Resume,
    StopSave,
    StopDiscard,
    /// Close the capture session, saving any in-flight segment
    CloseSession,
    /// Reset the loop counter to 0; only honored while no segment is
    /// active, and the operator-facing confirmation happens upstream
    ResetCounter,
    /// Change the output directory for subsequent segments
    SetOutputDir(PathBuf),
}

/// Events emitted during recording. Broadcast best-effort: a slow
/// subscriber (e.g. a preview view) loses events instead of stalling
/// the controller.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SessionOpened { props: StreamProperties },
    SessionClosed,
    SegmentStarted {
        id: u64,
        video_path: PathBuf,
        audio_path: PathBuf,
    },
    SegmentFinished {
        id: u64,
        disposition: Disposition,
        clean: bool,
    },
    Paused { id: u64 },
    Resumed { id: u64 },
    CounterReset { previous: u64 },
    /// Reply to a remote PING
    Pong,
    /// Display-only copy of a captured frame
    Preview(Frame),
    Error(String),
}

/// Cheap handle for posting events into a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<InboundEvent>,
    state: Arc<RwLock<ControllerState>>,
}

impl ControllerHandle {
    /// Snapshot of the controller state.
    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Sender for producer pumps.
    pub fn sender(&self) -> mpsc::Sender<InboundEvent> {
        self.tx.clone()
    }

    /// Queue an operator action. Returns `false` if the controller has
    /// shut down.
    pub async fn post(&self, action: OperatorAction) -> bool {
        self.tx.send(InboundEvent::Operator(action)).await.is_ok()
    }

    /// Non-async variant of [`ControllerHandle::post`] for UI threads;
    /// fails instead of blocking when the queue is full.
    pub fn try_post(&self, action: OperatorAction) -> bool {
        self.tx.try_send(InboundEvent::Operator(action)).is_ok()
    }
}

/// The segmented-recording state machine.
///
/// Owns the current [`Segment`] and [`CaptureSession`] exclusively, the
/// loop counter, and the segment writer. Runs as a single sequential
/// consumer; writer open/close calls are the one place it performs
/// bounded-latency synchronous I/O.
pub struct RecordingController {
    config: ControllerConfig,
    state: Arc<RwLock<ControllerState>>,
    session: Option<CaptureSession>,
    current: Option<(Segment, SegmentWriter)>,
    namer: LoopNamer,
    sinks: Box<dyn SinkFactory>,
    audio: Box<dyn AudioSource>,
    fs: Arc<dyn FileSystem>,
    rx: mpsc::Receiver<InboundEvent>,
    events: broadcast::Sender<ControllerEvent>,
    last_finalized_at: Option<Instant>,
}

impl RecordingController {
    /// Create a controller and the handle used to feed it.
    pub fn new(
        config: ControllerConfig,
        sinks: Box<dyn SinkFactory>,
        audio: Box<dyn AudioSource>,
        fs: Arc<dyn FileSystem>,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (events, _) = broadcast::channel(100);
        let state = Arc::new(RwLock::new(ControllerState::NoSource));

        let handle = ControllerHandle {
            tx,
            state: Arc::clone(&state),
        };
        let controller = Self {
            config,
            state,
            session: None,
            current: None,
            namer: LoopNamer::new(),
            sinks,
            audio,
            fs,
            rx,
            events,
            last_finalized_at: None,
        };
        (controller, handle)
    }

    /// Subscribe to controller events.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Drain the inbound queue until every handle and producer is gone,
    /// then wind down, saving any in-flight segment.
    pub async fn run(mut self) {
        tracing::info!(output_dir = %self.config.output_dir.display(), "recording controller running");
        while let Some(event) = self.rx.recv().await {
            self.handle(event);
        }
        self.close_session("controller shutting down");
        tracing::info!("recording controller stopped");
    }

    fn state(&self) -> ControllerState {
        *self.state.read()
    }

    fn set_state(&self, state: ControllerState) {
        *self.state.write() = state;
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    fn handle(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::SessionOpened { props, control } => {
                self.on_session_opened(props, control)
            }
            InboundEvent::OpenFailed { error } => self.on_open_failed(error),
            InboundEvent::SessionLost { reason } => self.on_session_lost(&reason),
            InboundEvent::Frame(frame) => self.on_frame(frame),
            InboundEvent::AudioFailed { reason } => self.on_audio_failed(&reason),
            InboundEvent::CommandLine(line) => self.on_command_line(&line),
            InboundEvent::Operator(action) => self.on_operator(action),
        }
    }

    // ---- session lifecycle -------------------------------------------------

    fn on_session_opened(&mut self, props: StreamProperties, control: SourceControl) {
        if self.session.is_some() {
            tracing::warn!("capture session already open; quiescing duplicate producer");
            control.shutdown(self.config.producer_stop_timeout);
            return;
        }

        tracing::info!(
            width = props.width,
            height = props.height,
            fps = props.fps,
            "capture session opened"
        );
        self.session = Some(CaptureSession::new(props, control));
        self.set_state(ControllerState::SourceReady);
        self.emit(ControllerEvent::SessionOpened { props });

        // Recording begins as soon as a source is ready; this is not
        // operator-gated.
        self.begin_segment();
    }

    fn on_open_failed(&mut self, error: OpenError) {
        tracing::warn!(error = %error, "capture open failed");
        self.emit(ControllerEvent::Error(format!("capture open failed: {error}")));
    }

    fn on_session_lost(&mut self, reason: &str) {
        if self.session.is_none() {
            tracing::debug!(reason, "session-lost event with no open session");
            return;
        }
        tracing::warn!(reason, "capture session lost");
        self.emit(ControllerEvent::Error(format!(
            "capture session lost: {reason}"
        )));
        self.close_session(reason);
    }

    fn close_session(&mut self, reason: &str) {
        if self.current.is_some() {
            // Never silently drop an in-flight segment: save best-effort.
            self.finalize_current(Disposition::Save, reason);
        }
        if let Some(session) = self.session.take() {
            if !session.shutdown(self.config.producer_stop_timeout) {
                tracing::warn!("video producer did not stop in time; device handle force-released");
            }
            self.set_state(ControllerState::NoSource);
            self.emit(ControllerEvent::SessionClosed);
            tracing::info!(reason, "capture session closed");
        }
    }

    // ---- frames ------------------------------------------------------------

    fn on_frame(&mut self, frame: Frame) {
        if self.session.is_none() {
            // Frames racing a teardown; nothing to do with them.
            return;
        }

        // Display leg first: best-effort, may be skipped under load, and
        // never affects recording correctness.
        self.emit(ControllerEvent::Preview(frame.clone()));

        if self.state() != ControllerState::Recording {
            return;
        }

        let failed = match self.current.as_mut() {
            Some((segment, writer)) => match writer.append_frame(&frame) {
                Ok(()) => None,
                Err(e) => Some((segment.id, e)),
            },
            None => None,
        };

        if let Some((id, e)) = failed {
            tracing::warn!(segment = id, error = %e, "frame append failed; discarding segment");
            self.emit(ControllerEvent::Error(format!(
                "segment {id}: video write failed: {e}"
            )));
            self.finalize_current(Disposition::Discard, "video write error");
            self.begin_next_if_session_alive();
        }
    }

    // ---- audio -------------------------------------------------------------

    fn on_audio_failed(&mut self, reason: &str) {
        if self.current.is_none() {
            tracing::warn!(reason, "audio failure with no active segment");
            return;
        }
        tracing::warn!(reason, "audio stream failed; saving segment best-effort");
        self.emit(ControllerEvent::Error(format!("audio error: {reason}")));
        self.finalize_current(Disposition::Save, "audio error");
        self.begin_next_if_session_alive();
    }

    // ---- remote commands ---------------------------------------------------

    fn on_command_line(&mut self, line: &str) {
        let command = match RemoteCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring remote line");
                return;
            }
        };
        tracing::debug!(%command, "remote command received");

        // PING is a liveness probe; it works even with no session.
        if command == RemoteCommand::Ping {
            self.emit(ControllerEvent::Pong);
            return;
        }

        if self.session.is_none() {
            tracing::info!(%command, "remote command ignored: no capture session");
            return;
        }

        match command {
            RemoteCommand::Start => self.try_start("remote"),
            RemoteCommand::StopSave => self.request_stop(Disposition::Save, "remote"),
            RemoteCommand::StopDiscard => self.request_stop(Disposition::Discard, "remote"),
            RemoteCommand::Pause => self.pause("remote"),
            RemoteCommand::Resume => self.resume("remote"),
            RemoteCommand::Ping => {}
        }
    }

    // ---- operator actions --------------------------------------------------

    fn on_operator(&mut self, action: OperatorAction) {
        match action {
            OperatorAction::Start => self.try_start("operator"),
            OperatorAction::Pause => self.pause("operator"),
            OperatorAction::Resume => self.resume("operator"),
            OperatorAction::StopSave => self.request_stop(Disposition::Save, "operator"),
            OperatorAction::StopDiscard => self.request_stop(Disposition::Discard, "operator"),
            OperatorAction::CloseSession => {
                if self.session.is_some() {
                    self.close_session("operator closed the source");
                } else {
                    tracing::debug!("close-session ignored: no capture session");
                }
            }
            OperatorAction::ResetCounter => self.reset_counter(),
            OperatorAction::SetOutputDir(dir) => {
                tracing::info!(dir = %dir.display(), "output directory changed for subsequent segments");
                self.config.output_dir = dir;
            }
        }
    }

    fn try_start(&mut self, origin: &str) {
        if self.session.is_none() {
            tracing::info!(origin, "start ignored: no capture session");
            return;
        }
        match self.state() {
            ControllerState::Recording => {
                tracing::info!(origin, "start ignored: already recording");
            }
            ControllerState::Paused => self.resume(origin),
            // Normally unreachable thanks to auto-start; this is the
            // operator's retry after a failed writer open.
            ControllerState::SourceReady => self.begin_segment(),
            state => {
                tracing::info!(origin, ?state, "start ignored");
            }
        }
    }

    fn reset_counter(&mut self) {
        if self.current.is_some() {
            tracing::warn!("counter reset ignored: a segment is active");
            return;
        }
        let previous = self.namer.reset();
        tracing::info!(previous, "loop counter reset to 0");
        self.emit(ControllerEvent::CounterReset { previous });
    }

    // ---- pause/resume ------------------------------------------------------

    /// Pause stops video forwarding only. The audio callback keeps
    /// appending to the same file, so narration stays continuous across
    /// a paused shot. This asymmetry is deliberate and covered by tests.
    fn pause(&mut self, origin: &str) {
        match (self.state(), self.current.as_ref()) {
            (ControllerState::Recording, Some((segment, _))) => {
                self.set_state(ControllerState::Paused);
                tracing::info!(segment = segment.id, origin, "video forwarding paused (audio continues)");
                self.emit(ControllerEvent::Paused { id: segment.id });
            }
            _ => tracing::info!(origin, "pause ignored: not recording"),
        }
    }

    fn resume(&mut self, origin: &str) {
        match (self.state(), self.current.as_ref()) {
            (ControllerState::Paused, Some((segment, _))) => {
                self.set_state(ControllerState::Recording);
                tracing::info!(segment = segment.id, origin, "video forwarding resumed");
                self.emit(ControllerEvent::Resumed { id: segment.id });
            }
            _ => tracing::info!(origin, "resume ignored: not paused"),
        }
    }

    // ---- stop & restart ----------------------------------------------------

    /// An externally requested stop (remote command or operator action).
    ///
    /// A stop landing just after a finalize, while the auto-restarted
    /// segment is still empty, targets the segment that was already
    /// stopped; it is ignored and logged so a button press and a serial
    /// command for the same segment act exactly once. Once the new
    /// segment holds at least one frame the stop is taken at face value.
    fn request_stop(&mut self, disposition: Disposition, origin: &str) {
        if !self.state().is_active() {
            tracing::info!(origin, ?disposition, "stop ignored: no active segment");
            return;
        }
        if let Some(at) = self.last_finalized_at {
            let segment_untouched = self
                .current
                .as_ref()
                .map_or(true, |(_, writer)| writer.frames_written() == 0);
            if segment_untouched && at.elapsed() < self.config.stop_debounce {
                tracing::info!(
                    origin,
                    ?disposition,
                    "stop ignored: duplicate request for an already-finalized segment"
                );
                return;
            }
        }

        self.finalize_current(disposition, origin);
        self.begin_next_if_session_alive();
    }

    /// Close, verify and dispose the current segment. Exactly one loop
    /// id is consumed per call; the writer is taken by value so nothing
    /// can append once finalization begins.
    fn finalize_current(&mut self, disposition: Disposition, origin: &str) {
        let Some((segment, writer)) = self.current.take() else {
            return;
        };
        self.set_state(ControllerState::Finalizing);
        tracing::info!(
            segment = segment.id,
            ?disposition,
            origin,
            frames = writer.frames_written(),
            "finalizing segment"
        );

        // Quiesce the audio callback before any sink is closed; the
        // callback must never run once finalization has begun.
        let audio_quiesced = match self.audio.stop() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(segment = segment.id, error = %e, "audio stream did not quiesce");
                false
            }
        };

        let outcome = writer.finalize(audio_quiesced, &*self.fs);
        let clean = match dispose(segment.id, &outcome, disposition, &*self.fs) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(segment = segment.id, error = %e, "segment disposal incomplete");
                self.emit(ControllerEvent::Error(e.to_string()));
                false
            }
        };

        tracing::info!(
            segment = segment.id,
            ?disposition,
            clean,
            video = %outcome.video.path.display(),
            audio = %outcome.audio.path.display(),
            "segment finalized"
        );

        self.last_finalized_at = Some(Instant::now());
        self.set_state(if self.session.is_some() {
            ControllerState::SourceReady
        } else {
            ControllerState::NoSource
        });
        self.emit(ControllerEvent::SegmentFinished {
            id: segment.id,
            disposition,
            clean,
        });
    }

    /// The second half of every stop: auto-restart while the source
    /// lives. Kept separate from [`Self::finalize_current`] so each step
    /// is testable in isolation.
    fn begin_next_if_session_alive(&mut self) {
        if self.session.is_some() {
            self.begin_segment();
        }
    }

    fn begin_segment(&mut self) {
        let props = match self.session.as_ref() {
            Some(session) => session.props(),
            None => return,
        };

        if let Err(e) = self.fs.ensure_dir(&self.config.output_dir) {
            tracing::warn!(error = %e, dir = %self.config.output_dir.display(), "cannot create output directory");
            self.emit(ControllerEvent::Error(format!(
                "cannot create output directory: {e}"
            )));
            self.set_state(ControllerState::SourceReady);
            return;
        }

        let name = self.namer.next();
        let video_path = self.config.output_dir.join(name.video_file());
        let audio_path = self.config.output_dir.join(name.audio_file());

        match SegmentWriter::open(
            &video_path,
            &audio_path,
            &props,
            &self.config.audio,
            &*self.sinks,
            self.audio.as_mut(),
            &*self.fs,
        ) {
            Ok(writer) => {
                let segment = Segment {
                    id: name.id(),
                    video_path: video_path.clone(),
                    audio_path: audio_path.clone(),
                    started_at: Utc::now(),
                };
                tracing::info!(
                    segment = segment.id,
                    video = %video_path.display(),
                    audio = %audio_path.display(),
                    "segment recording"
                );
                self.current = Some((segment, writer));
                self.set_state(ControllerState::Recording);
                self.emit(ControllerEvent::SegmentStarted {
                    id: name.id(),
                    video_path,
                    audio_path,
                });
            }
            Err(e) => {
                // The claimed id produced no files; hand it back so the
                // id sequence stays gap-free.
                self.namer.rewind();
                tracing::warn!(error = %e, "segment writer failed to open");
                self.emit(ControllerEvent::Error(format!(
                    "failed to begin segment: {e}"
                )));
                self.set_state(ControllerState::SourceReady);
            }
        }
    }
}
