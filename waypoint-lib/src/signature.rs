//! Signature payload and envelope codec
//!
//! A signature binds the originally requested URL to the instant the proxy
//! diverted the request. On the wire it travels as two headers: the
//! AES-GCM ciphertext of the JSON payload, and a small base64 JSON object
//! carrying the per-message nonce.
//!
//! The metadata object keeps both a `nonce` and an `iv` field. Earlier
//! envelope versions stored the GCM nonce under `iv`; deployed peers may
//! still emit either, so the decoder accepts both and prefers `nonce`.

use crate::crypto::AesGcm;
use crate::error::{Result, WaypointError};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plaintext signature payload.
///
/// `forwarded_url` is stored verbatim, never normalized: validation
/// compares it byte-for-byte against the forwarded-URL header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signature {
    /// Instant the proxy minted the envelope
    pub requested_time: DateTime<Utc>,
    /// Full originally requested URL
    pub forwarded_url: String,
}

/// Wire form of the metadata header, before base64 encoding.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SignatureMetadata {
    #[serde(default)]
    iv: String,
    #[serde(default)]
    nonce: String,
}

/// Serialize and encrypt `signature`, returning the values for the
/// signature and metadata headers.
pub fn build_signature_and_metadata(
    crypto: &AesGcm,
    signature: &Signature,
) -> Result<(String, String)> {
    let plaintext = serde_json::to_vec(signature)?;
    let (ciphertext, nonce) = crypto.encrypt(&plaintext)?;

    let nonce_b64 = STANDARD.encode(&nonce);
    let metadata = SignatureMetadata {
        iv: nonce_b64.clone(),
        nonce: nonce_b64,
    };

    let signature_header = URL_SAFE_NO_PAD.encode(&ciphertext);
    let metadata_header = STANDARD.encode(serde_json::to_vec(&metadata)?);
    Ok((signature_header, metadata_header))
}

/// Decode and decrypt an envelope back into a [`Signature`].
///
/// The metadata must parse before decryption is attempted; a malformed
/// metadata header never consults the key. Every stage failure collapses
/// into the same `AuthenticationFailed` error so a caller cannot probe
/// which stage rejected the envelope.
pub fn signature_from_headers(
    signature_header: &str,
    metadata_header: &str,
    crypto: &AesGcm,
) -> Result<Signature> {
    let metadata_bytes = decode_base64(metadata_header)?;
    let metadata: SignatureMetadata =
        serde_json::from_slice(&metadata_bytes).map_err(|_| WaypointError::AuthenticationFailed)?;

    let nonce_field = if !metadata.nonce.is_empty() {
        &metadata.nonce
    } else {
        &metadata.iv
    };
    let nonce = decode_base64(nonce_field)?;

    let ciphertext = decode_base64(signature_header)?;
    let plaintext = crypto.decrypt(&ciphertext, &nonce)?;
    serde_json::from_slice(&plaintext).map_err(|_| WaypointError::AuthenticationFailed)
}

/// Base64-decode accepting both the URL-safe and standard alphabets,
/// padded or not.
fn decode_base64(value: &str) -> Result<Vec<u8>> {
    for engine in [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD] {
        if let Ok(decoded) = engine.decode(value) {
            return Ok(decoded);
        }
    }
    Err(WaypointError::AuthenticationFailed)
}
