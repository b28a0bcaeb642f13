use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::claims::TokenClaims;

/// URL-safe alphabet that accepts both padded and unpadded segments.
const SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode the payload segment of a JWT **without verifying its signature**.
///
/// Returns `None` for a blank token, fewer than two dot-separated segments,
/// a payload that is not base64, or a payload that is not a JSON object.
/// Never panics.
pub fn decode_jwt(token: &str) -> Option<TokenClaims> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let payload = token.split('.').nth(1)?;

    // Issuers occasionally emit the standard alphabet.
    let normalized = payload.replace('+', "-").replace('/', "_");
    let bytes = match SEGMENT.decode(normalized.as_bytes()) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("could not decode JWT payload: {e}");
            return None;
        }
    };

    match serde_json::from_slice::<TokenClaims>(&bytes) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::warn!("could not parse JWT payload: {e}");
            None
        }
    }
}

/// Project API key embedded in the token (`user.apiKey` or `apiKey`).
pub fn extract_api_key(token: &str) -> Option<String> {
    decode_jwt(token)?.api_key().map(str::to_owned)
}

/// Display name embedded in the token (`user.username`, `username`, `email`).
pub fn extract_username(token: &str) -> Option<String> {
    decode_jwt(token)?.username().map(str::to_owned)
}
