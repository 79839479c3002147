//! Segmented loop recording for a live camera, microphone and remote
//! command console.
//!
//! The crate records a capture session as a chain of short "loops":
//! recording starts as soon as a source is ready, every stop both
//! finalizes the current segment (save or discard) and immediately
//! begins the next one, and a monotonically numbered pair of files
//! (`Loop_<n>_<time>_<date>.mp4` / `.wav`) is produced per loop.
//!
//! Device backends are injected behind the traits in [`capture`]; the
//! [`recorder`] module holds the controller state machine and the
//! finalization protocol; [`remote`] defines the line-oriented command
//! vocabulary spoken over the serial console.

pub mod capture;
pub mod recorder;
pub mod remote;
pub mod utils;

pub use capture::{AudioSpec, Frame, StreamProperties};
pub use recorder::{
    ControllerConfig, ControllerEvent, ControllerHandle, ControllerState, Disposition,
    OperatorAction, RecordingController,
};
pub use remote::RemoteCommand;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for binaries embedding the controller.
///
/// Respects `RUST_LOG`; defaults to debug-level logs for this crate.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "serialcam_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
