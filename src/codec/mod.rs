//! Image codec domain: camera frame → upright JPEG.
//!
//! Packed JPEG frames pass through untouched; YUV 4:2:0 frames are
//! gathered to NV21, converted to RGB and compressed at quality 100.
//! A non-zero rotation decodes, rotates and re-encodes the result.

pub mod transport;
mod yuv;

pub use yuv::{nv21_to_rgb, to_nv21};

use crate::capture::{CapturedFrame, PixelFormat};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use thiserror::Error;

/// JPEG quality used for every encode.
pub const JPEG_QUALITY: u8 = 100;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("expected 3 planes for YUV 4:2:0, got {0}")]
    PlaneCount(usize),
    #[error("{plane} plane too short: need {needed} bytes, have {actual}")]
    PlaneTooShort {
        plane: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error("unsupported rotation: {0} degrees")]
    UnsupportedRotation(i32),
    #[error("JPEG encode failed: {0}")]
    Encode(image::ImageError),
    #[error("JPEG decode failed: {0}")]
    Decode(image::ImageError),
}

/// A compressed, upright JPEG ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub jpeg: Vec<u8>,
}

impl EncodedImage {
    /// Standard padded base64 of the JPEG bytes.
    pub fn base64(&self) -> String {
        transport::encode(self)
    }
}

/// Convert a captured frame to an upright JPEG.
pub fn to_compressed_image(frame: &CapturedFrame) -> Result<EncodedImage, CodecError> {
    let start = std::time::Instant::now();

    let jpeg = match frame.format {
        PixelFormat::Jpeg => frame
            .planes
            .first()
            .map(|p| p.data.clone())
            .ok_or(CodecError::PlaneCount(0))?,
        PixelFormat::Yuv420 => {
            let nv21 = to_nv21(frame)?;
            let rgb = nv21_to_rgb(&nv21, frame.width, frame.height)?;
            encode_jpeg(&rgb)?
        }
        other => return Err(CodecError::UnsupportedFormat(other)),
    };

    let jpeg = if frame.rotation_degrees != 0 {
        rotate_jpeg(&jpeg, frame.rotation_degrees)?
    } else {
        jpeg
    };

    log::info!(
        "[CODEC] {:?} {}x{} rot={} → {} bytes in {}ms",
        frame.format,
        frame.width,
        frame.height,
        frame.rotation_degrees,
        jpeg.len(),
        start.elapsed().as_millis()
    );

    Ok(EncodedImage { jpeg })
}

fn encode_jpeg(rgb: &RgbImage) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(rgb)
        .map_err(CodecError::Encode)?;
    Ok(out)
}

/// Decode, rotate clockwise by `degrees`, re-encode.
///
/// Only quarter turns are supported; camera stacks never report anything else.
fn rotate_jpeg(jpeg: &[u8], degrees: i32) -> Result<Vec<u8>, CodecError> {
    let img = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
        .map_err(CodecError::Decode)?;

    let rotated: DynamicImage = match degrees.rem_euclid(360) {
        0 => img,
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => return Err(CodecError::UnsupportedRotation(degrees)),
    };

    encode_jpeg(&rotated.to_rgb8())
}
