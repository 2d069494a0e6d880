//! A camera that serves a JPEG file from disk.
//!
//! Used by the headless runner and by tests that need a real frame.

use super::{Camera, CaptureError, CapturedFrame};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct FileCamera {
    path: PathBuf,
    rotation_degrees: i32,
    armed: AtomicBool,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>, rotation_degrees: i32) -> Self {
        Self {
            path: path.into(),
            rotation_degrees,
            armed: AtomicBool::new(false),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn acquire_frame(&self) -> Result<CapturedFrame, CaptureError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            CaptureError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        let (width, height) = image::ImageReader::new(std::io::Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| CaptureError::Failed(e.to_string()))?
            .into_dimensions()
            .map_err(|e| CaptureError::Failed(e.to_string()))?;

        log::info!(
            "[CAPTURE] Loaded {} ({}x{}, {} bytes)",
            self.path.display(),
            width,
            height,
            bytes.len()
        );
        Ok(CapturedFrame::jpeg(bytes, width, height, self.rotation_degrees))
    }

    fn arm_preview(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm_preview(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}
