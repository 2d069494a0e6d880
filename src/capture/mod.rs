//! Camera domain: public API.
//!
//! The session never talks to camera hardware directly. It holds a
//! `Camera` implementation and asks it for one frame per capture.
//! External code should only use the types exported here.

mod file_camera;

pub use file_camera::FileCamera;

use async_trait::async_trait;
use thiserror::Error;

/// Pixel layout of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Already-encoded JPEG in a single plane.
    Jpeg,
    /// Planar (or semi-planar) YUV 4:2:0 in three planes: Y, U, V.
    Yuv420,
    /// Any other sensor format code. The codec rejects these.
    Other(u32),
}

/// One plane of pixel data.
///
/// `row_stride` is the byte distance between rows, `pixel_stride` the byte
/// distance between adjacent samples in a row. Interleaved chroma buffers
/// (as handed out by most mobile camera stacks) have a pixel stride of 2.
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Vec<u8>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    /// A tightly packed plane: one byte per sample, no row padding.
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self {
            data,
            row_stride: width,
            pixel_stride: 1,
        }
    }
}

/// A single frame from the camera.
///
/// Owned by the capture attempt that acquired it until it is handed to
/// the codec.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Plane>,
    /// Clockwise rotation needed to display the frame upright.
    pub rotation_degrees: i32,
}

impl CapturedFrame {
    /// Wrap an encoded JPEG as a frame.
    pub fn jpeg(bytes: Vec<u8>, width: u32, height: u32, rotation_degrees: i32) -> Self {
        let row_stride = bytes.len();
        Self {
            width,
            height,
            format: PixelFormat::Jpeg,
            planes: vec![Plane {
                data: bytes,
                row_stride,
                pixel_stride: 1,
            }],
            rotation_degrees,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera is not available: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
}

/// The camera collaborator.
///
/// `acquire_frame` is cancelled by dropping its future; implementations
/// must not publish a frame anywhere else once dropped.
#[async_trait]
pub trait Camera: Send + Sync {
    /// Take one still frame.
    async fn acquire_frame(&self) -> Result<CapturedFrame, CaptureError>;

    /// Show the live preview so the user can aim.
    fn arm_preview(&self);

    /// Freeze the preview while a frame is being scored.
    fn disarm_preview(&self);
}
