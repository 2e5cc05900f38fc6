//! Binary-to-text encoding for audio payloads (standard base64, padded).

use base64::{Engine as _, engine::general_purpose};

pub fn encode_audio(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn decode_audio(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(encoded.trim())
}
