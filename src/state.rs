//! Opaque bridge-state codec
//!
//! The state blob rides the authorization redirect as a single transport-safe
//! token: canonical JSON wrapped in unpadded url-safe base64. Every hop
//! treats it as opaque. It carries no secrets, so it is encoded rather than
//! encrypted; tampering is caught by the handle echo check and the backend's
//! own anti-forgery validation, not by this codec.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Everything the backend needs to complete its leg of the flow.
///
/// Field order is part of the encoding: serialization is deterministic for a
/// given value, so equal states produce equal blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeState {
    pub session_handle: String,
    pub csrf_token: String,
    /// Deep-link prefix the backend redirects to once its leg is done.
    pub callback_uri: String,
}

/// Encodes bridge state into the opaque transport form.
///
/// # Errors
///
/// Returns [`AuthError::MalformedState`] if serialization fails; with only
/// string fields this is not expected in practice.
pub fn encode(state: &BridgeState) -> Result<String, AuthError> {
    let json = serde_json::to_vec(state).map_err(|err| AuthError::MalformedState {
        detail: format!("serialize: {err}"),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decodes an opaque blob back into bridge state.
///
/// # Errors
///
/// Returns [`AuthError::MalformedState`] for anything that is not the
/// base64url-wrapped JSON produced by [`encode`]: foreign alphabets,
/// truncation, or a JSON document missing required fields.
pub fn decode(encoded: &str) -> Result<BridgeState, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|err| AuthError::MalformedState {
            detail: format!("base64: {err}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|err| AuthError::MalformedState {
        detail: format!("json: {err}"),
    })
}
