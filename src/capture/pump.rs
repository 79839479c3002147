//! Producer execution contexts
//!
//! Each producer (video frames, remote command lines) runs a blocking
//! read loop on its own thread and posts events into the controller's
//! single inbound queue. Producers never block on the controller and are
//! stopped cooperatively: a cancellation token is checked at every
//! blocking-read retry, and if the thread does not wind down within a
//! bounded timeout the device handle is force-released to unblock the
//! read. Threads are never terminated.

use super::traits::{CommandSource, FrameSource};
use crate::recorder::controller::InboundEvent;
use crate::utils::error::OpenError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How long a forced device release is given to take effect.
const FORCED_RELEASE_GRACE: Duration = Duration::from_millis(250);

/// Cooperative cancellation flag shared between a producer thread and
/// whoever shuts it down.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle for quiescing one producer thread.
///
/// The video source's control travels to the controller inside the
/// session-opened event; the command source's control stays with the
/// embedder, since the remote channel's lifetime is independent of any
/// capture session.
#[derive(Clone)]
pub struct SourceControl {
    cancel: CancelToken,
    done: Arc<AtomicBool>,
    unblock: Arc<dyn Fn() + Send + Sync>,
}

impl fmt::Debug for SourceControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceControl")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("done", &self.is_finished())
            .finish()
    }
}

impl SourceControl {
    fn new(cancel: CancelToken, done: Arc<AtomicBool>, unblock: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            cancel,
            done,
            unblock,
        }
    }

    /// Control whose producer has already exited. Shutdown is a no-op.
    #[cfg(test)]
    pub(crate) fn already_stopped() -> Self {
        Self::new(
            CancelToken::new(),
            Arc::new(AtomicBool::new(true)),
            Arc::new(|| {}),
        )
    }

    /// Whether the producer thread has exited and released its device.
    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Request shutdown and wait up to `timeout` for the producer to
    /// acknowledge. On timeout the device handle is force-released as a
    /// safety net and a short grace period is granted.
    ///
    /// Returns `true` if the producer exited.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.cancel.cancel();
        if self.wait_finished(timeout) {
            return true;
        }

        tracing::warn!(
            ?timeout,
            "producer did not acknowledge shutdown; force-releasing device handle"
        );
        (self.unblock)();
        self.wait_finished(FORCED_RELEASE_GRACE)
    }

    fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_finished() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        self.is_finished()
    }
}

/// Spawn the video producer.
///
/// The thread opens the source, validates its properties, posts a
/// session-opened event carrying this same control handle, then pumps
/// frames until cancelled or the device fails terminally.
pub fn spawn_frame_source(
    mut source: Box<dyn FrameSource>,
    events: mpsc::Sender<InboundEvent>,
) -> SourceControl {
    let cancel = CancelToken::new();
    let done = Arc::new(AtomicBool::new(false));
    let control = SourceControl::new(cancel.clone(), Arc::clone(&done), source.unblocker());

    let thread_control = control.clone();
    let thread_events = events.clone();
    let spawned = thread::Builder::new()
        .name("video-capture".into())
        .spawn(move || {
            run_frame_pump(source.as_mut(), &cancel, thread_control, &thread_events);
            source.close();
            done.store(true, Ordering::SeqCst);
            tracing::debug!("video capture thread exited");
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn video capture thread");
        control.done.store(true, Ordering::SeqCst);
        let _ = events.try_send(InboundEvent::OpenFailed {
            error: OpenError::Device(format!("could not spawn capture thread: {e}")),
        });
    }

    control
}

fn run_frame_pump(
    source: &mut dyn FrameSource,
    cancel: &CancelToken,
    control: SourceControl,
    events: &mpsc::Sender<InboundEvent>,
) {
    // Validation happens here so every spawned source goes through the
    // same clamp/reject path, fallback or not.
    let props = match source.open().and_then(|p| p.validated()) {
        Ok(props) => props,
        Err(error) => {
            let _ = events.blocking_send(InboundEvent::OpenFailed { error });
            return;
        }
    };

    if events
        .blocking_send(InboundEvent::SessionOpened { props, control })
        .is_err()
    {
        return;
    }

    while !cancel.is_cancelled() {
        match source.next_frame() {
            Ok(frame) => {
                if events.blocking_send(InboundEvent::Frame(frame)).is_err() {
                    // Controller is gone; nothing left to record for.
                    break;
                }
            }
            Err(e) if e.is_terminal() => {
                if !cancel.is_cancelled() {
                    let _ = events.blocking_send(InboundEvent::SessionLost {
                        reason: e.to_string(),
                    });
                }
                break;
            }
            Err(e) => {
                tracing::trace!(error = %e, "transient frame read failure");
            }
        }
    }
}

/// Spawn the remote command producer.
///
/// Raw lines go to the controller, which owns parsing so every accepted
/// or rejected command is logged with recording context. Open failures
/// and terminal read errors only end this producer; they never touch the
/// capture session. The returned control stays with the embedder.
pub fn spawn_command_source(
    mut source: Box<dyn CommandSource>,
    events: mpsc::Sender<InboundEvent>,
) -> SourceControl {
    let cancel = CancelToken::new();
    let done = Arc::new(AtomicBool::new(false));
    let control = SourceControl::new(cancel.clone(), Arc::clone(&done), source.unblocker());

    let spawned = thread::Builder::new()
        .name("remote-commands".into())
        .spawn(move || {
            run_command_pump(source.as_mut(), &cancel, &events);
            source.close();
            done.store(true, Ordering::SeqCst);
            tracing::debug!("remote command thread exited");
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn remote command thread");
        control.done.store(true, Ordering::SeqCst);
    }

    control
}

fn run_command_pump(
    source: &mut dyn CommandSource,
    cancel: &CancelToken,
    events: &mpsc::Sender<InboundEvent>,
) {
    if let Err(e) = source.open() {
        tracing::warn!(error = %e, "remote command channel failed to open");
        return;
    }

    while !cancel.is_cancelled() {
        match source.next_line() {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                if events
                    .blocking_send(InboundEvent::CommandLine(line))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) if e.is_terminal() => {
                if !cancel.is_cancelled() {
                    tracing::warn!(error = %e, "remote command channel lost");
                }
                break;
            }
            Err(e) => {
                tracing::trace!(error = %e, "transient command read failure");
            }
        }
    }
}
