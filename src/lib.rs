//! Scouter: point a camera at something, get its battle power.
//!
//! Module layout:
//!   - capture  : `Camera` trait, captured frames, file-backed camera
//!   - codec    : YUV/JPEG → compressed JPEG, base64 transport encoding
//!   - llm      : request building, HTTP client, response parsing
//!   - session  : capture state machine, feedback loop, tones
//!   - settings : environment/keychain configuration
//!
//! The embedding UI owns a `Session`; the `scouter` binary drives one
//! headlessly through `scan_file`.

pub mod capture;
pub mod codec;
pub mod llm;
pub mod session;
pub mod settings;

use capture::FileCamera;
use llm::InferenceClient;
use session::{BoardSnapshot, LogTone, PipelineError, Session, SessionConfig, Trigger};
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;

/// Load `.env.local` → `.env` (first one found wins), then start logging.
///
/// Looks in the working directory first, then next to `Cargo.toml`.
pub fn init_logging() {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let roots = [std::env::current_dir().ok(), Some(manifest_dir.to_path_buf())];

    'env_load: for root in roots.iter().flatten() {
        for env_file in [".env.local", ".env"] {
            let path = root.join(env_file);
            if path.exists() {
                match dotenvy::from_path(&path) {
                    Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                    Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
                }
                break 'env_load;
            }
        }
    }

    let _ = env_logger::try_init();
}

/// Run one full attempt against an image file and return the settled board.
///
/// The returned snapshot is `Settled`, `Failed`, or `Idle` (file could not
/// be read). Only client construction errors are returned as `Err`.
pub async fn scan_file(
    path: impl Into<PathBuf>,
    rotation_degrees: i32,
    settings: &Settings,
) -> Result<BoardSnapshot, PipelineError> {
    let client = InferenceClient::new(settings)?;
    let session = Session::new(
        SessionConfig::from(settings),
        Arc::new(FileCamera::new(path, rotation_degrees)),
        Arc::new(client),
        Arc::new(LogTone),
    );

    let mut rx = session.subscribe();
    let attempt = match session.trigger() {
        Trigger::Started(attempt) => attempt,
        Trigger::Ignored => return Ok(session.snapshot()),
    };

    let settled = rx
        .wait_for(|snap| snap.attempt != attempt || !snap.state.is_busy())
        .await
        .map(|snap| snap.clone());
    let snapshot = match settled {
        Ok(snap) => snap,
        Err(_) => session.snapshot(),
    };

    session.shutdown().await;
    Ok(snapshot)
}
