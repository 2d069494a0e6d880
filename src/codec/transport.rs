//! Base64 transport encoding for the JSON request body.

use super::EncodedImage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Standard alphabet, padded, no line wrapping.
pub fn encode(image: &EncodedImage) -> String {
    STANDARD.encode(&image.jpeg)
}

/// `data:` URI carrying an already-encoded JPEG payload.
pub fn data_uri(base64_jpeg: &str) -> String {
    format!("data:image/jpeg;base64,{}", base64_jpeg)
}
