//! End-to-end session tests with a fake camera, a scripted backend and a
//! recording tone sink. Exercises the real codec, request building and
//! parsing; only the device and the network are substituted.

use async_trait::async_trait;
use scouter_lib::capture::{CaptureError, CapturedFrame, Camera, PixelFormat, Plane};
use scouter_lib::llm::{InferenceBackend, InferenceError, InferenceRequest, InferenceResponse, ReplyLanguage};
use scouter_lib::session::{
    BoardSnapshot, Session, SessionConfig, SessionState, Tone, ToneSink, Trigger,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ── Fakes ───────────────────────────────────────────────────────────

enum Lens {
    /// Deliver a small grey YUV frame.
    Frame,
    /// Fail acquisition.
    Broken,
    /// Never deliver.
    Stuck,
    /// Deliver a frame in a sensor format the codec cannot handle.
    Unsupported,
}

struct FakeCamera {
    lens: Lens,
    armed: AtomicBool,
}

impl FakeCamera {
    fn new(lens: Lens) -> Arc<Self> {
        Arc::new(Self {
            lens,
            armed: AtomicBool::new(false),
        })
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

fn grey_frame() -> CapturedFrame {
    let (w, h) = (16usize, 8usize);
    CapturedFrame {
        width: w as u32,
        height: h as u32,
        format: PixelFormat::Yuv420,
        planes: vec![
            Plane::packed(vec![128; w * h], w),
            Plane::packed(vec![128; (w / 2) * (h / 2)], w / 2),
            Plane::packed(vec![128; (w / 2) * (h / 2)], w / 2),
        ],
        rotation_degrees: 90,
    }
}

#[async_trait]
impl Camera for FakeCamera {
    async fn acquire_frame(&self) -> Result<CapturedFrame, CaptureError> {
        match self.lens {
            Lens::Frame => Ok(grey_frame()),
            Lens::Broken => Err(CaptureError::Failed("sensor unplugged".to_string())),
            Lens::Stuck => std::future::pending().await,
            Lens::Unsupported => Ok(CapturedFrame {
                format: PixelFormat::Other(7),
                ..grey_frame()
            }),
        }
    }

    fn arm_preview(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm_preview(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

struct ScriptedBackend {
    reply: Result<String, InferenceError>,
    /// Answer with an empty `choices` array instead of `reply`.
    no_choices: bool,
    /// When set, every send waits for one permit before answering.
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<InferenceRequest>>,
}

impl ScriptedBackend {
    fn replying(content: &str) -> Arc<Self> {
        Self::build(Ok(content.to_string()), None)
    }

    fn failing(err: InferenceError) -> Arc<Self> {
        Self::build(Err(err), None)
    }

    fn gated(content: &str, gate: Arc<Notify>) -> Arc<Self> {
        Self::build(Ok(content.to_string()), Some(gate))
    }

    fn without_choices() -> Arc<Self> {
        Arc::new(Self {
            no_choices: true,
            ..Self::fields(Ok(String::new()), None)
        })
    }

    fn build(reply: Result<String, InferenceError>, gate: Option<Arc<Notify>>) -> Arc<Self> {
        Arc::new(Self::fields(reply, gate))
    }

    fn fields(reply: Result<String, InferenceError>, gate: Option<Arc<Notify>>) -> Self {
        Self {
            reply,
            no_choices: false,
            gate,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn send(&self, request: &InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.no_choices {
            let body = serde_json::json!({"id": "chatcmpl-test", "choices": []});
            return Ok(serde_json::from_value(body).unwrap());
        }
        let content = self.reply.clone()?;
        let body = serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "model": request.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }]
        });
        Ok(serde_json::from_value(body).unwrap())
    }
}

#[derive(Default)]
struct RecordingTone {
    ticks: AtomicUsize,
    failures: AtomicUsize,
}

impl ToneSink for RecordingTone {
    fn play(&self, tone: Tone) {
        match tone {
            Tone::Tick => self.ticks.fetch_add(1, Ordering::SeqCst),
            Tone::Failure => self.failures.fetch_add(1, Ordering::SeqCst),
        };
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn config(language: ReplyLanguage) -> SessionConfig {
    SessionConfig {
        model: "gpt-4o".to_string(),
        language,
        tick_period: Duration::from_millis(2),
    }
}

fn session_with(
    camera: Arc<FakeCamera>,
    backend: Arc<ScriptedBackend>,
    tone: Arc<RecordingTone>,
    language: ReplyLanguage,
) -> Session {
    Session::new(config(language), camera, backend, tone)
}

async fn wait_until(session: &Session, pred: impl FnMut(&BoardSnapshot) -> bool) -> BoardSnapshot {
    let mut rx = session.subscribe();
    let snap = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(pred))
        .await
        .expect("timed out waiting for board state")
        .expect("board sender dropped")
        .clone();
    snap
}

async fn wait_settled(session: &Session) -> BoardSnapshot {
    wait_until(session, |s| {
        matches!(s.state, SessionState::Settled(_) | SessionState::Failed)
    })
    .await
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_successful_scan_settles_with_name_and_score() {
    let camera = FakeCamera::new(Lens::Frame);
    let backend = ScriptedBackend::replying("Vegeta,Prince,Saiyan,8999,strong");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone.clone(), ReplyLanguage::English);
    assert!(camera.is_armed());

    assert_eq!(session.trigger(), Trigger::Started(1));
    let snap = wait_settled(&session).await;

    match &snap.state {
        SessionState::Settled(result) => {
            assert_eq!(result.name, "Vegeta");
            assert_eq!(result.job, "Prince");
            assert_eq!(result.species, "Saiyan");
        }
        other => panic!("expected Settled, got {:?}", other),
    }
    assert_eq!(snap.label, "Vegeta");
    assert_eq!(snap.score, "8999");
    assert_eq!(snap.rationale, "strong");
    assert!(snap.camera_armed);
    assert!(camera.is_armed());
    assert_eq!(backend.calls(), 1);
    assert_eq!(tone.failures.load(Ordering::SeqCst), 0);

    // The displayed image is the rotated JPEG that was sent.
    let image = snap.image.expect("image on board");
    assert_eq!(&image.jpeg[..2], &[0xFF, 0xD8]);
    let decoded = image::load_from_memory(&image.jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (8, 16));

    let request = backend.last_request.lock().unwrap().clone().unwrap();
    let urls: Vec<&str> = request.image_urls().collect();
    assert_eq!(urls, vec![format!("data:image/jpeg;base64,{}", image.base64())]);
}

#[tokio::test]
async fn test_transport_failure_resets_board_and_beeps_once() {
    let camera = FakeCamera::new(Lens::Frame);
    let backend = ScriptedBackend::failing(InferenceError::Transport("connection reset".to_string()));
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone.clone(), ReplyLanguage::Japanese);

    session.trigger();
    let snap = wait_settled(&session).await;

    assert_eq!(snap.state, SessionState::Failed);
    assert_eq!(snap.score, "0");
    assert_eq!(snap.label, "");
    assert_eq!(snap.rationale, "");
    assert!(snap.image.is_none());
    assert!(camera.is_armed());
    assert_eq!(tone.failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_codec_failure_routes_to_failed() {
    let camera = FakeCamera::new(Lens::Unsupported);
    let backend = ScriptedBackend::replying("unused,unused,unused,1,unused");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone.clone(), ReplyLanguage::English);

    session.trigger();
    let snap = wait_settled(&session).await;

    assert_eq!(snap.state, SessionState::Failed);
    assert_eq!(snap.score, "0");
    assert_eq!(snap.label, "");
    assert!(snap.image.is_none());
    assert!(camera.is_armed());
    assert_eq!(backend.calls(), 0);
    assert_eq!(tone.failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_choices_routes_to_failed() {
    let camera = FakeCamera::new(Lens::Frame);
    let backend = ScriptedBackend::without_choices();
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone.clone(), ReplyLanguage::English);

    session.trigger();
    let snap = wait_settled(&session).await;

    assert_eq!(snap.state, SessionState::Failed);
    assert_eq!(snap.score, "0");
    assert_eq!(snap.label, "");
    assert_eq!(snap.rationale, "");
    assert!(snap.image.is_none());
    assert!(camera.is_armed());
    assert_eq!(backend.calls(), 1);
    assert_eq!(tone.failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_trigger_while_awaiting_is_ignored() {
    let camera = FakeCamera::new(Lens::Frame);
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("Goku,Warrior,Saiyan,9001,plot", gate.clone());
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone, ReplyLanguage::English);

    session.trigger();
    wait_until(&session, |s| s.state == SessionState::Awaiting).await;
    assert!(!camera.is_armed());

    assert_eq!(session.trigger(), Trigger::Ignored);
    gate.notify_one();
    let snap = wait_settled(&session).await;

    assert_eq!(snap.score, "9001");
    assert_eq!(snap.attempt, 1);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_settle_is_the_last_write() {
    let camera = FakeCamera::new(Lens::Frame);
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("Vegeta,Prince,Saiyan,8999,strong", gate.clone());
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera, backend, tone.clone(), ReplyLanguage::English);

    session.trigger();
    // Let the feedback loop run for a while.
    let jittering = wait_until(&session, |s| {
        s.state == SessionState::Awaiting && s.score != "0"
    })
    .await;
    let jitter: u32 = jittering.score.parse().unwrap();
    assert!((10_000..=99_999).contains(&jitter));

    gate.notify_one();
    let snap = wait_settled(&session).await;
    let ticks_at_settle = tone.ticks.load(Ordering::SeqCst);
    assert!(ticks_at_settle > 0);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(snap.score, "8999");
    assert_eq!(session.snapshot().score, "8999");
    assert_eq!(tone.ticks.load(Ordering::SeqCst), ticks_at_settle);
}

#[tokio::test]
async fn test_unknown_name_shows_species_and_job() {
    let camera = FakeCamera::new(Lens::Frame);
    let backend = ScriptedBackend::replying("不明,戦士,サイヤ人,530000,気が大きい");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera, backend, tone, ReplyLanguage::Japanese);

    session.trigger();
    let snap = wait_settled(&session).await;

    assert_eq!(snap.label, "サイヤ人(戦士)");
    assert_eq!(snap.score, "530000");
}

#[tokio::test]
async fn test_short_reply_defaults_score() {
    let camera = FakeCamera::new(Lens::Frame);
    let backend = ScriptedBackend::replying("Krillin,Monk");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera, backend, tone, ReplyLanguage::English);

    session.trigger();
    let snap = wait_settled(&session).await;

    assert!(matches!(snap.state, SessionState::Settled(_)));
    assert_eq!(snap.label, "Krillin");
    assert_eq!(snap.score, "0");
    assert_eq!(snap.rationale, "");
}

#[tokio::test]
async fn test_acquisition_failure_returns_to_idle() {
    let camera = FakeCamera::new(Lens::Broken);
    let backend = ScriptedBackend::replying("unused,unused,unused,1,unused");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone.clone(), ReplyLanguage::English);

    session.trigger();
    let snap = wait_until(&session, |s| s.state == SessionState::Idle).await;

    assert_eq!(snap.score, "0");
    assert!(snap.camera_armed);
    assert!(camera.is_armed());
    assert_eq!(backend.calls(), 0);
    assert_eq!(tone.failures.load(Ordering::SeqCst), 0);

    // Ready for another go.
    assert_eq!(session.trigger(), Trigger::Started(2));
}

#[tokio::test]
async fn test_release_cancels_stuck_acquisition() {
    let camera = FakeCamera::new(Lens::Stuck);
    let backend = ScriptedBackend::replying("unused,unused,unused,1,unused");
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend.clone(), tone, ReplyLanguage::English);

    session.trigger();
    assert_eq!(session.snapshot().state, SessionState::Capturing);
    assert!(!camera.is_armed());

    assert!(session.release());
    let snap = session.snapshot();
    assert_eq!(snap.state, SessionState::Idle);
    assert!(camera.is_armed());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_release_while_awaiting_discards_late_result() {
    let camera = FakeCamera::new(Lens::Frame);
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("Frieza,Emperor,Arcosian,530000,tyrant", gate.clone());
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera, backend, tone.clone(), ReplyLanguage::English);

    session.trigger();
    wait_until(&session, |s| s.state == SessionState::Awaiting).await;
    assert!(session.release());
    gate.notify_one();

    tokio::time::sleep(Duration::from_millis(30)).await;
    let snap = session.snapshot();
    assert_eq!(snap.state, SessionState::Idle);
    assert_eq!(snap.score, "0");
    assert_eq!(snap.label, "");
    assert_eq!(tone.failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_discards_in_flight_result() {
    let camera = FakeCamera::new(Lens::Frame);
    let gate = Arc::new(Notify::new());
    let backend = ScriptedBackend::gated("Cell,Android,Bio,900000,perfect", gate.clone());
    let tone = Arc::new(RecordingTone::default());
    let session = session_with(camera.clone(), backend, tone.clone(), ReplyLanguage::English);

    session.trigger();
    wait_until(&session, |s| s.state == SessionState::Awaiting).await;

    session.shutdown().await;
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let snap = session.snapshot();
    assert!(!matches!(snap.state, SessionState::Settled(_)));
    assert_eq!(snap.score, "0");
    assert!(!camera.is_armed());
    assert_eq!(session.trigger(), Trigger::Ignored);
    assert_eq!(tone.failures.load(Ordering::SeqCst), 0);
}
