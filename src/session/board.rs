//! The display board: session state plus the fields presentation reads.
//!
//! State and fields live behind one mutex so every transition is a single
//! critical section. Each capture gets an attempt number; writes tagged
//! with a stale attempt are dropped, which is how cancelled or superseded
//! work is kept off the board.

use super::tone::{Tone, ToneSink};
use crate::codec::EncodedImage;
use crate::llm::ParsedResult;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const EMPTY_SCORE: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Camera armed, nothing in flight.
    Idle,
    /// Frame requested from the camera.
    Capturing,
    /// Request in flight; feedback loop running.
    Awaiting,
    /// Result on the board; ready for the next trigger.
    Settled(ParsedResult),
    /// Last attempt failed; ready for the next trigger.
    Failed,
}

impl SessionState {
    /// True while an attempt owns the session.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Capturing | Self::Awaiting)
    }
}

/// What presentation renders.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub state: SessionState,
    pub score: String,
    pub label: String,
    pub rationale: String,
    /// The compressed frame being (or last) scored.
    pub image: Option<Arc<EncodedImage>>,
    pub camera_armed: bool,
    /// Number of the latest capture attempt.
    pub attempt: u64,
}

impl BoardSnapshot {
    fn initial() -> Self {
        Self {
            state: SessionState::Idle,
            score: EMPTY_SCORE.to_string(),
            label: String::new(),
            rationale: String::new(),
            image: None,
            camera_armed: true,
            attempt: 0,
        }
    }

    fn clear_fields(&mut self) {
        self.score = EMPTY_SCORE.to_string();
        self.label.clear();
        self.rationale.clear();
        self.image = None;
    }
}

struct BoardInner {
    snap: BoardSnapshot,
    /// Cancels the in-flight attempt.
    attempt_token: Option<CancellationToken>,
}

pub(crate) struct Board {
    inner: Mutex<BoardInner>,
    tx: watch::Sender<BoardSnapshot>,
}

impl Board {
    pub fn new() -> Self {
        let snap = BoardSnapshot::initial();
        let (tx, _rx) = watch::channel(snap.clone());
        Self {
            inner: Mutex::new(BoardInner {
                snap,
                attempt_token: None,
            }),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, inner: &BoardInner) {
        self.tx.send_replace(inner.snap.clone());
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock().snap.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }

    /// Idle/Settled/Failed → Capturing. Returns the new attempt number,
    /// or `None` if an attempt is already in flight.
    pub fn begin_capture(&self, token: CancellationToken) -> Option<u64> {
        let mut inner = self.lock();
        if inner.snap.state.is_busy() {
            return None;
        }
        inner.snap.attempt += 1;
        inner.snap.state = SessionState::Capturing;
        inner.snap.clear_fields();
        inner.snap.camera_armed = false;
        inner.attempt_token = Some(token);
        self.publish(&inner);
        Some(inner.snap.attempt)
    }

    /// Capturing → Awaiting.
    pub fn frame_acquired(&self, attempt: u64) -> bool {
        self.transition(attempt, |snap| {
            if snap.state != SessionState::Capturing {
                return false;
            }
            snap.state = SessionState::Awaiting;
            true
        })
    }

    /// Capturing → Idle, camera re-armed. No fields change.
    pub fn acquisition_failed(&self, attempt: u64) -> bool {
        let done = self.transition(attempt, |snap| {
            if snap.state != SessionState::Capturing {
                return false;
            }
            snap.state = SessionState::Idle;
            snap.camera_armed = true;
            true
        });
        if done {
            self.lock().attempt_token = None;
        }
        done
    }

    /// Put the compressed frame on the board while awaiting.
    pub fn show_image(&self, attempt: u64, image: Arc<EncodedImage>) -> bool {
        self.transition(attempt, |snap| {
            if snap.state != SessionState::Awaiting {
                return false;
            }
            snap.image = Some(image);
            true
        })
    }

    /// Feedback loop write. Only lands while `attempt` is still awaiting;
    /// the tick tone plays inside the same critical section so no tick can
    /// follow a settle.
    pub fn jitter(&self, attempt: u64, score: u32, tone: &dyn ToneSink) -> bool {
        let mut inner = self.lock();
        if inner.snap.attempt != attempt || inner.snap.state != SessionState::Awaiting {
            return false;
        }
        inner.snap.score = score.to_string();
        tone.play(Tone::Tick);
        self.publish(&inner);
        true
    }

    /// Awaiting → Settled.
    pub fn settle(&self, attempt: u64, result: ParsedResult, label: String) -> bool {
        self.finish(attempt, |snap| {
            snap.score = result.score.clone();
            snap.rationale = result.rationale.clone();
            snap.label = label;
            snap.state = SessionState::Settled(result);
        })
    }

    /// Awaiting → Failed with every field back to its default.
    pub fn fail(&self, attempt: u64) -> bool {
        self.finish(attempt, |snap| {
            snap.clear_fields();
            snap.state = SessionState::Failed;
        })
    }

    /// Abandon whatever is in flight and return to Idle with cleared fields.
    /// Returns the attempt that was abandoned, if any.
    pub fn release(&self) -> Option<u64> {
        let mut inner = self.lock();
        if !inner.snap.state.is_busy() {
            return None;
        }
        let released = inner.snap.attempt;
        if let Some(token) = inner.attempt_token.take() {
            token.cancel();
        }
        // New number so late writes from the released attempt are dropped.
        inner.snap.attempt += 1;
        inner.snap.state = SessionState::Idle;
        inner.snap.clear_fields();
        inner.snap.camera_armed = true;
        self.publish(&inner);
        Some(released)
    }

    fn finish(&self, attempt: u64, apply: impl FnOnce(&mut BoardSnapshot)) -> bool {
        let mut inner = self.lock();
        if inner.snap.attempt != attempt || inner.snap.state != SessionState::Awaiting {
            return false;
        }
        if let Some(token) = inner.attempt_token.take() {
            token.cancel();
        }
        apply(&mut inner.snap);
        inner.snap.camera_armed = true;
        self.publish(&inner);
        true
    }

    fn transition(&self, attempt: u64, apply: impl FnOnce(&mut BoardSnapshot) -> bool) -> bool {
        let mut inner = self.lock();
        if inner.snap.attempt != attempt {
            return false;
        }
        let changed = apply(&mut inner.snap);
        if changed {
            self.publish(&inner);
        }
        changed
    }
}
