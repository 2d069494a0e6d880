//! Session domain: the capture state machine.
//!
//! One `Session` per foreground camera screen. `trigger` starts an attempt:
//! acquire a frame → compress → base64 → build request → send → parse,
//! with the feedback loop ticking while the request is out. Presentation
//! reads the board through `snapshot` or `subscribe`.
//!
//! Session methods are meant to be called from one presentation thread.

mod board;
pub mod feedback;
pub mod tone;

pub use board::{BoardSnapshot, SessionState, EMPTY_SCORE};
pub use tone::{LogTone, SilentTone, Tone, ToneSink};

use crate::capture::Camera;
use crate::codec::{self, CodecError};
use crate::llm::{self, InferenceBackend, InferenceError, ParseError, ParsedResult, ReplyLanguage};
use crate::settings::Settings;
use board::Board;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything that can end an attempt in `Failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("codec worker stopped: {0}")]
    Worker(String),
}

/// Result of a user trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A new attempt started with this number.
    Started(u64),
    /// An attempt is already in flight; nothing happened.
    Ignored,
}

/// Per-session knobs taken from `Settings`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub language: ReplyLanguage,
    pub tick_period: Duration,
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            model: settings.model.clone(),
            language: settings.language,
            tick_period: settings.tick_period,
        }
    }
}

struct Shared {
    board: Arc<Board>,
    camera: Arc<dyn Camera>,
    backend: Arc<dyn InferenceBackend>,
    tone: Arc<dyn ToneSink>,
    config: SessionConfig,
}

pub struct Session {
    shared: Arc<Shared>,
    runtime: Handle,
    shutdown_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session in `Idle` and arm the camera preview.
    ///
    /// Attempts run on the runtime this is called from; use
    /// `with_runtime` when constructing outside of one.
    pub fn new(
        config: SessionConfig,
        camera: Arc<dyn Camera>,
        backend: Arc<dyn InferenceBackend>,
        tone: Arc<dyn ToneSink>,
    ) -> Self {
        Self::with_runtime(Handle::current(), config, camera, backend, tone)
    }

    /// Like `new`, but attempts are spawned on `runtime`, so `trigger` may
    /// be called from any thread.
    pub fn with_runtime(
        runtime: Handle,
        config: SessionConfig,
        camera: Arc<dyn Camera>,
        backend: Arc<dyn InferenceBackend>,
        tone: Arc<dyn ToneSink>,
    ) -> Self {
        camera.arm_preview();
        log::info!(
            "[SESSION] Ready — model={} language={:?} instruction={} tick={}ms",
            config.model,
            config.language,
            llm::prompts::INSTRUCTION_VERSION,
            config.tick_period.as_millis()
        );
        Self {
            shared: Arc::new(Shared {
                board: Arc::new(Board::new()),
                camera,
                backend,
                tone,
                config,
            }),
            runtime,
            shutdown_token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.shared.board.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.shared.board.subscribe()
    }

    /// User tapped the capture button.
    ///
    /// Ignored while an attempt is capturing or awaiting.
    pub fn trigger(&self) -> Trigger {
        if self.shutdown_token.is_cancelled() {
            log::warn!("[SESSION] Trigger after shutdown — ignored");
            return Trigger::Ignored;
        }

        let token = self.shutdown_token.child_token();
        let Some(attempt) = self.shared.board.begin_capture(token.clone()) else {
            log::info!("[SESSION] Trigger ignored — attempt already in flight");
            return Trigger::Ignored;
        };
        self.shared.camera.disarm_preview();
        log::info!("[SESSION] Attempt {} — capturing", attempt);

        let handle = self
            .runtime
            .spawn(run_attempt(self.shared.clone(), attempt, token));
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        *task = Some(handle);
        Trigger::Started(attempt)
    }

    /// Abandon the in-flight attempt, if any, and go back to `Idle`.
    pub fn release(&self) -> bool {
        match self.shared.board.release() {
            Some(attempt) => {
                self.shared.camera.arm_preview();
                log::info!("[SESSION] Attempt {} released", attempt);
                true
            }
            None => false,
        }
    }

    /// Cancel everything and wait for the in-flight attempt to unwind.
    /// Its result, if any arrives, is discarded.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        self.shared.board.release();
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("[SESSION] Attempt task ended abnormally: {}", e);
            }
        }
        self.shared.camera.disarm_preview();
        log::info!("[SESSION] Shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// One capture attempt, start to finish.
async fn run_attempt(shared: Arc<Shared>, attempt: u64, token: CancellationToken) {
    let started = Instant::now();

    let acquired = tokio::select! {
        biased;
        _ = token.cancelled() => {
            log::info!("[CAPTURE] Attempt {} cancelled during acquisition", attempt);
            return;
        }
        res = shared.camera.acquire_frame() => res,
    };

    let frame = match acquired {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("[CAPTURE] Attempt {} acquisition failed: {}", attempt, e);
            if shared.board.acquisition_failed(attempt) {
                shared.camera.arm_preview();
            }
            return;
        }
    };
    log::info!(
        "[CAPTURE] Attempt {} frame {}x{} {:?} in {}ms",
        attempt,
        frame.width,
        frame.height,
        frame.format,
        started.elapsed().as_millis()
    );

    if !shared.board.frame_acquired(attempt) {
        return;
    }

    let feedback_token = token.child_token();
    let feedback = feedback::spawn(
        shared.board.clone(),
        shared.tone.clone(),
        attempt,
        shared.config.tick_period,
        feedback_token.clone(),
    );

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        res = score_frame(&shared, attempt, frame) => Some(res),
    };

    // The loop must be stopped before the settling writes below.
    feedback_token.cancel();
    let ticks = feedback.await.unwrap_or_default();

    let Some(outcome) = outcome else {
        log::info!("[SESSION] Attempt {} cancelled — result discarded", attempt);
        return;
    };

    match outcome {
        Ok(result) => {
            let label = result.display_label(shared.config.language.unknown_sentinel());
            log::info!(
                "[SESSION] Attempt {} settled: {} = {} ({} ticks, {}ms)",
                attempt,
                label,
                result.score,
                ticks,
                started.elapsed().as_millis()
            );
            if shared.board.settle(attempt, result, label) {
                shared.camera.arm_preview();
            }
        }
        Err(e) => {
            log::error!("[SESSION] Attempt {} failed: {}", attempt, e);
            if shared.board.fail(attempt) {
                shared.tone.play(Tone::Failure);
                shared.camera.arm_preview();
            }
        }
    }
}

/// Codec → base64 → request → send → parse.
async fn score_frame(
    shared: &Shared,
    attempt: u64,
    frame: crate::capture::CapturedFrame,
) -> Result<ParsedResult, PipelineError> {
    let image = tokio::task::spawn_blocking(move || codec::to_compressed_image(&frame))
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))??;
    let image = Arc::new(image);
    shared.board.show_image(attempt, image.clone());

    let request = llm::build_request(&image.base64(), &shared.config.model, shared.config.language);
    let response = shared.backend.send(&request).await?;
    Ok(llm::parse(&response)?)
}
