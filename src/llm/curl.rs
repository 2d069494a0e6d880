//! curl-style rendering of outbound requests for debug logging.
//!
//! The bearer credential is always masked. Image payloads are replaced by
//! their length unless the caller asks for the full body.

use super::types::{ContentPart, InferenceRequest};

/// Render `request` as a copy-pasteable curl command.
pub fn to_curl(endpoint: &str, request: &InferenceRequest, include_payload: bool) -> String {
    let body = if include_payload {
        serde_json::to_string(request)
    } else {
        serde_json::to_string(&elide_images(request))
    }
    .unwrap_or_else(|e| format!("<unserializable: {}>", e));

    format!(
        "curl -X POST \\\n  -H 'Authorization: Bearer ***' \\\n  -H 'Content-Type: application/json' \\\n  -d '{}' \\\n  '{}'",
        body.replace('\'', "'\\''"),
        endpoint
    )
}

fn elide_images(request: &InferenceRequest) -> InferenceRequest {
    let mut copy = request.clone();
    for part in copy.messages.iter_mut().flat_map(|m| m.content.iter_mut()) {
        if let ContentPart::ImageUrl { image_url } = part {
            let payload_len = image_url
                .url
                .split_once(',')
                .map(|(_, data)| data.len())
                .unwrap_or(image_url.url.len());
            image_url.url = format!("<image: {} base64 chars>", payload_len);
        }
    }
    copy
}
