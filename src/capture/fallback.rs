//! Ordered backend fallback
//!
//! A frame source that tries candidate backends in priority order until
//! one opens with usable properties, tearing each failed attempt down
//! before moving on. This replaces ad-hoc nested "try backend A, then B"
//! open logic with one composable source.

use super::traits::{Frame, FrameSource, StreamProperties};
use crate::utils::error::{OpenError, ReadError};
use parking_lot::Mutex;
use std::sync::Arc;

type Unblock = Arc<dyn Fn() + Send + Sync>;

/// Tries candidates in order on `open`; afterwards delegates to the one
/// that won.
pub struct FallbackSource {
    candidates: Vec<Box<dyn FrameSource>>,
    active: Option<Box<dyn FrameSource>>,
    // Filled in once a candidate wins, so an unblocker handed out before
    // open still reaches the live device.
    unblock: Arc<Mutex<Option<Unblock>>>,
}

impl FallbackSource {
    pub fn new(candidates: Vec<Box<dyn FrameSource>>) -> Self {
        Self {
            candidates,
            active: None,
            unblock: Arc::new(Mutex::new(None)),
        }
    }
}

impl FrameSource for FallbackSource {
    fn open(&mut self) -> Result<StreamProperties, OpenError> {
        let attempts = self.candidates.len();

        for (priority, mut candidate) in self.candidates.drain(..).enumerate() {
            match candidate.open().and_then(StreamProperties::validated) {
                Ok(props) => {
                    tracing::info!(
                        priority,
                        width = props.width,
                        height = props.height,
                        fps = props.fps,
                        "capture backend opened"
                    );
                    *self.unblock.lock() = Some(candidate.unblocker());
                    self.active = Some(candidate);
                    return Ok(props);
                }
                Err(e) => {
                    tracing::debug!(priority, error = %e, "capture backend rejected");
                    candidate.close();
                }
            }
        }

        Err(OpenError::NoBackend { attempts })
    }

    fn next_frame(&mut self) -> Result<Frame, ReadError> {
        match self.active.as_mut() {
            Some(source) => source.next_frame(),
            None => Err(ReadError::Terminal("source not open".into())),
        }
    }

    fn close(&mut self) {
        if let Some(mut source) = self.active.take() {
            source.close();
        }
        *self.unblock.lock() = None;
    }

    fn unblocker(&self) -> Unblock {
        let slot = Arc::clone(&self.unblock);
        Arc::new(move || {
            if let Some(unblock) = slot.lock().clone() {
                unblock();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Candidate {
        opens: bool,
        props: StreamProperties,
        closed: Arc<AtomicBool>,
    }

    impl FrameSource for Candidate {
        fn open(&mut self) -> Result<StreamProperties, OpenError> {
            if self.opens {
                Ok(self.props)
            } else {
                Err(OpenError::Device("busy".into()))
            }
        }

        fn next_frame(&mut self) -> Result<Frame, ReadError> {
            Ok(Frame::new(vec![0u8; 16]))
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn candidate(opens: bool, props: StreamProperties) -> (Box<dyn FrameSource>, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let cand = Candidate {
            opens,
            props,
            closed: Arc::clone(&closed),
        };
        (Box::new(cand), closed)
    }

    fn good_props() -> StreamProperties {
        StreamProperties {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }

    #[test]
    fn first_viable_candidate_wins() {
        let (loser, loser_closed) = candidate(false, good_props());
        let (winner, winner_closed) = candidate(true, good_props());

        let mut source = FallbackSource::new(vec![loser, winner]);
        let props = source.open().unwrap();

        assert_eq!(props, good_props());
        assert!(loser_closed.load(Ordering::SeqCst));
        assert!(!winner_closed.load(Ordering::SeqCst));
        assert!(source.next_frame().is_ok());

        source.close();
        assert!(winner_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn invalid_properties_count_as_a_failed_attempt() {
        let bad = StreamProperties {
            width: 0,
            height: 0,
            fps: 30.0,
        };
        let (first, first_closed) = candidate(true, bad);
        let (second, _) = candidate(true, good_props());

        let mut source = FallbackSource::new(vec![first, second]);
        assert_eq!(source.open().unwrap(), good_props());
        assert!(first_closed.load(Ordering::SeqCst));
    }

    #[test]
    fn all_candidates_failing_reports_attempt_count() {
        let (a, _) = candidate(false, good_props());
        let (b, _) = candidate(false, good_props());

        let mut source = FallbackSource::new(vec![a, b]);
        match source.open() {
            Err(OpenError::NoBackend { attempts }) => assert_eq!(attempts, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
