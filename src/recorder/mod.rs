//! Recording core
//!
//! Segmented loop recording: the controller state machine, the per-loop
//! file naming scheme, the segment writer with its close/verify/dispose
//! protocol, and the session/segment data model.

pub mod controller;
pub mod naming;
pub mod state;
#[cfg(test)]
pub(crate) mod testutil;
pub mod writer;

pub use controller::{
    ControllerConfig, ControllerEvent, ControllerHandle, InboundEvent, OperatorAction,
    RecordingController,
};
pub use naming::{LoopName, LoopNamer};
pub use state::{CaptureSession, ControllerState, Disposition, Segment};
pub use writer::{FinalizeOutcome, Leg, LegReport, SegmentWriter, MIN_AUDIO_BYTES};
