//! Error taxonomy for the sign-in bridge
//!
//! Every way a sign-in attempt can end short of success maps to exactly one
//! [`AuthError`] kind, so the UI layer can pick per-kind messaging without
//! matching on strings. All kinds are terminal: the crate never retries on
//! its own, and a failed attempt is discarded rather than resumed.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Sub-classification of a failed application-backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFault {
    /// The endpoint could not be reached at the transport level.
    Unreachable,
    /// The endpoint answered outside the JSON contract, which points at a
    /// missing route or a misdeployed backend rather than a handled failure.
    Misrouted,
    /// The backend answered with a structured application error.
    Application,
}

impl fmt::Display for BackendFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unreachable => "unreachable",
            Self::Misrouted => "misrouted",
            Self::Application => "application error",
        };
        write!(f, "{label}")
    }
}

/// Terminal failure of a sign-in attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Client configuration is absent or still carries placeholder values.
    /// Raised before any network call is made.
    #[error("sign-in is not configured: {reason}")]
    NotConfigured { reason: String },

    /// A backend session endpoint failed outside its visible contract.
    #[error("backend {fault}: {detail}")]
    BackendUnavailable { fault: BackendFault, detail: String },

    /// No matching deep-link callback arrived before the deadline.
    #[error("no sign-in callback within {}s", timeout.as_secs())]
    CallbackTimeout { timeout: Duration },

    /// The callback URI could not be parsed at all.
    #[error("malformed callback: {detail}")]
    MalformedCallback { detail: String },

    /// The opaque state blob failed to decode back into bridge state.
    #[error("malformed bridge state: {detail}")]
    MalformedState { detail: String },

    /// The identity provider declined the authorization or the one-time
    /// credential.
    #[error("identity provider rejected the sign-in: {detail}")]
    ProviderRejected { detail: String },

    /// The backend refused the session because it was initialized by a
    /// different device.
    #[error("backend rejected the session/device pairing")]
    SessionDeviceMismatch,

    /// The callback echoed a session handle other than the one issued for
    /// this attempt.
    #[error("callback session handle does not match the issued session")]
    SessionMismatch,

    /// The backend refused to mint application tokens for the provider
    /// identity token.
    #[error("application token exchange failed: {detail}")]
    BackendAuthFailed { detail: String },

    /// The caller cancelled the attempt.
    #[error("sign-in was cancelled")]
    Cancelled,
}

impl AuthError {
    /// Stable machine-readable name of the error kind, intended for
    /// metrics labels and UI message lookup.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "not_configured",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::CallbackTimeout { .. } => "callback_timeout",
            Self::MalformedCallback { .. } => "malformed_callback",
            Self::MalformedState { .. } => "malformed_state",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::SessionDeviceMismatch => "session_device_mismatch",
            Self::SessionMismatch => "session_mismatch",
            Self::BackendAuthFailed { .. } => "backend_auth_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = AuthError::ProviderRejected {
            detail: "access_denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "identity provider rejected the sign-in: access_denied"
        );
    }

    #[test]
    fn timeout_display_reports_seconds() {
        let err = AuthError::CallbackTimeout {
            timeout: Duration::from_secs(180),
        };
        assert_eq!(err.to_string(), "no sign-in callback within 180s");
    }

    #[test]
    fn backend_fault_labels() {
        assert_eq!(BackendFault::Unreachable.to_string(), "unreachable");
        assert_eq!(BackendFault::Misrouted.to_string(), "misrouted");
        assert_eq!(BackendFault::Application.to_string(), "application error");
    }

    #[test]
    fn kinds_are_distinct() {
        let errors = [
            AuthError::NotConfigured {
                reason: String::new(),
            },
            AuthError::BackendUnavailable {
                fault: BackendFault::Unreachable,
                detail: String::new(),
            },
            AuthError::CallbackTimeout {
                timeout: Duration::from_secs(1),
            },
            AuthError::MalformedCallback {
                detail: String::new(),
            },
            AuthError::MalformedState {
                detail: String::new(),
            },
            AuthError::ProviderRejected {
                detail: String::new(),
            },
            AuthError::SessionDeviceMismatch,
            AuthError::SessionMismatch,
            AuthError::BackendAuthFailed {
                detail: String::new(),
            },
            AuthError::Cancelled,
        ];
        let mut kinds: Vec<&str> = errors.iter().map(AuthError::kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }
}
