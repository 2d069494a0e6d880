//! YUV 4:2:0 → NV21 → RGB conversion.
//!
//! The JPEG encoder wants RGB, but camera stacks hand out three planes
//! with arbitrary strides. We first gather the planes into NV21 (full
//! luma plane, then interleaved chroma with V before U), then convert
//! NV21 to RGB with BT.601 full-range coefficients.

use super::CodecError;
use crate::capture::{CapturedFrame, Plane};
use image::RgbImage;

/// Gather a three-plane YUV 4:2:0 frame into an NV21 byte buffer.
///
/// Layout: `width * height` luma bytes, then `ceil(w/2) * ceil(h/2)`
/// chroma pairs in V, U order. Writing U first swaps red and blue.
pub fn to_nv21(frame: &CapturedFrame) -> Result<Vec<u8>, CodecError> {
    let [y, u, v] = match frame.planes.as_slice() {
        [y, u, v] => [y, u, v],
        planes => return Err(CodecError::PlaneCount(planes.len())),
    };

    let width = frame.width as usize;
    let height = frame.height as usize;
    if width == 0 || height == 0 {
        return Err(CodecError::EmptyFrame);
    }
    let chroma_w = width.div_ceil(2);
    let chroma_h = height.div_ceil(2);

    // Header dimensions are untrusted until every plane is known to cover them.
    check_extent(y, "Y", height, width)?;
    check_extent(v, "V", chroma_h, chroma_w)?;
    check_extent(u, "U", chroma_h, chroma_w)?;
    let capacity = nv21_len(width, height).ok_or(CodecError::PlaneTooShort {
        plane: "Y",
        needed: usize::MAX,
        actual: y.data.len(),
    })?;

    let mut nv21 = Vec::with_capacity(capacity);

    for row in 0..height {
        for col in 0..width {
            nv21.push(sample(y, "Y", row, col)?);
        }
    }
    for row in 0..chroma_h {
        for col in 0..chroma_w {
            nv21.push(sample(v, "V", row, col)?);
            nv21.push(sample(u, "U", row, col)?);
        }
    }

    Ok(nv21)
}

/// Fail unless `plane` holds the sample at the last row and column.
fn check_extent(
    plane: &Plane,
    name: &'static str,
    rows: usize,
    cols: usize,
) -> Result<(), CodecError> {
    let needed = (rows - 1)
        .checked_mul(plane.row_stride)
        .zip((cols - 1).checked_mul(plane.pixel_stride))
        .and_then(|(r, c)| r.checked_add(c))
        .and_then(|last| last.checked_add(1));
    match needed {
        Some(n) if n <= plane.data.len() => Ok(()),
        needed => Err(CodecError::PlaneTooShort {
            plane: name,
            needed: needed.unwrap_or(usize::MAX),
            actual: plane.data.len(),
        }),
    }
}

/// Bytes in an NV21 buffer for the given size, `None` on overflow.
fn nv21_len(width: usize, height: usize) -> Option<usize> {
    let luma = width.checked_mul(height)?;
    let chroma = width.div_ceil(2).checked_mul(height.div_ceil(2))?.checked_mul(2)?;
    luma.checked_add(chroma)
}

fn sample(plane: &Plane, name: &'static str, row: usize, col: usize) -> Result<u8, CodecError> {
    let idx = row * plane.row_stride + col * plane.pixel_stride;
    plane
        .data
        .get(idx)
        .copied()
        .ok_or(CodecError::PlaneTooShort {
            plane: name,
            needed: idx + 1,
            actual: plane.data.len(),
        })
}

/// Convert an NV21 buffer to an RGB image.
///
/// BT.601 full range, the same matrix JFIF uses:
/// - R = Y + 1.402 * (V - 128)
/// - G = Y - 0.344 * (U - 128) - 0.714 * (V - 128)
/// - B = Y + 1.772 * (U - 128)
pub fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> Result<RgbImage, CodecError> {
    let w = width as usize;
    let h = height as usize;
    let chroma_w = w.div_ceil(2);
    match nv21_len(w, h) {
        Some(expected) if expected <= nv21.len() => {}
        expected => {
            return Err(CodecError::PlaneTooShort {
                plane: "NV21",
                needed: expected.unwrap_or(usize::MAX),
                actual: nv21.len(),
            })
        }
    }
    if w == 0 || h == 0 {
        return Err(CodecError::EmptyFrame);
    }

    let (luma, chroma) = nv21.split_at(w * h);
    let mut rgb = Vec::with_capacity(w * h * 3);

    for row in 0..h {
        for col in 0..w {
            let yv = luma[row * w + col] as f32;
            let c = ((row / 2) * chroma_w + col / 2) * 2;
            let v = chroma[c] as f32 - 128.0;
            let u = chroma[c + 1] as f32 - 128.0;

            let r = (yv + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (yv - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (yv + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(CodecError::EmptyFrame)
}
