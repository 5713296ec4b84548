//! Redirect callback parsing
//!
//! The backend finishes its leg of the flow by deep-linking back into the
//! app with either a `session` query parameter (success) or an `error` code
//! (provider declined). This module only extracts; precedence between the
//! two is the flow's decision.

use url::Url;

use crate::error::AuthError;

/// Query parameter carrying the echoed session handle.
pub const SESSION_PARAM: &str = "session";

/// Query parameter carrying a provider error code.
pub const ERROR_PARAM: &str = "error";

/// Parameters extracted from a callback URI.
///
/// Exactly one of the two fields is meaningful on a well-behaved callback.
/// Both may be present (the flow gives `error` precedence) and both may be
/// absent (the flow rejects the callback).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedirectResult {
    pub session_handle: Option<String>,
    pub error: Option<String>,
}

impl RedirectResult {
    /// True when the callback carried neither parameter.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session_handle.is_none() && self.error.is_none()
    }
}

/// Extracts the session handle and provider error from a callback URI.
///
/// Percent-encoding is undone, unrelated query parameters are ignored, and a
/// repeated parameter keeps its last value. The URI itself is never logged
/// or embedded in errors since it can carry the session handle.
///
/// # Errors
///
/// Returns [`AuthError::MalformedCallback`] when the URI cannot be parsed.
pub fn parse(uri: &str) -> Result<RedirectResult, AuthError> {
    let parsed = Url::parse(uri).map_err(|err| AuthError::MalformedCallback {
        detail: err.to_string(),
    })?;

    let mut result = RedirectResult::default();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            SESSION_PARAM => result.session_handle = Some(value.into_owned()),
            ERROR_PARAM => result.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(result)
}
