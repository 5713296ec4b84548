//! Application-backend session endpoints
//!
//! Three sequential calls back the sign-in flow: `init` mints a
//! device-scoped session, `verify` trades the echoed session handle for a
//! one-time login credential, and `token` trades the provider identity token
//! for application tokens. Failures are classified by transport, content
//! type, and error body so each stage stays distinguishable for the caller.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{AuthError, BackendFault};
use crate::settings::BackendSettings;

const INIT_PATH: &str = "/auth/mobile/init";
const VERIFY_PATH: &str = "/auth/mobile/verify";
const TOKEN_PATH: &str = "/auth/mobile/token";

/// Error code the backend uses when a session is presented by a device other
/// than the one that initialized it.
const DEVICE_MISMATCH_CODE: &str = "device_mismatch";

/// Session issued by the backend at the start of an attempt.
///
/// The handle must come back unmodified in the callback; the anti-forgery
/// token rides the state blob and is checked by the backend, not by this
/// crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub session_handle: String,
    pub csrf_token: String,
}

/// Verified session: the one-time provider credential plus the subject hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedSession {
    pub login_credential: String,
    pub email: String,
}

/// Application tokens minted at the end of the flow. Custody passes to the
/// caller; this crate persists nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTokens {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry derived from the backend's relative `expires_in`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The backend's three session operations, one per flow stage.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Initializes a device-scoped sign-in session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::BackendUnavailable`] when the endpoint is
    /// unreachable, misrouted, or rejects the request.
    async fn init_session(&self, device_id: &str, platform: &str)
        -> Result<AuthSession, AuthError>;

    /// Verifies the echoed session handle for the same device and returns
    /// the one-time login credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionDeviceMismatch`] when the backend reports
    /// the session was initialized by a different device, and
    /// [`AuthError::BackendUnavailable`] for every other failure.
    async fn verify_session(
        &self,
        session_handle: &str,
        device_id: &str,
    ) -> Result<VerifiedSession, AuthError>;

    /// Exchanges the provider identity token for application tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::BackendAuthFailed`] when the backend declines
    /// the exchange, and [`AuthError::BackendUnavailable`] when the endpoint
    /// is unreachable or misrouted.
    async fn exchange_token(&self, identity_token: &str) -> Result<ApplicationTokens, AuthError>;
}

/// Which backend call a response belongs to; drives error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackendCall {
    Init,
    Verify,
    Token,
}

impl BackendCall {
    fn path(self) -> &'static str {
        match self {
            Self::Init => INIT_PATH,
            Self::Verify => VERIFY_PATH,
            Self::Token => TOKEN_PATH,
        }
    }
}

/// Structured error body the backend uses for handled failures.
#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

impl BackendErrorBody {
    fn detail(&self) -> String {
        match &self.message {
            Some(message) => format!("{} ({message})", self.error),
            None => self.error.clone(),
        }
    }
}

/// Production [`SessionBackend`] over HTTP.
pub struct HttpSessionBackend {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpSessionBackend {
    #[must_use]
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }

    async fn post(
        &self,
        call: BackendCall,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AuthError> {
        self.http
            .post(format!("{}{}", self.base_url, call.path()))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|err| AuthError::BackendUnavailable {
                fault: BackendFault::Unreachable,
                detail: format!("{}: {err}", call.path()),
            })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        call: BackendCall,
        response: reqwest::Response,
    ) -> Result<T, AuthError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|err| AuthError::BackendUnavailable {
                fault: BackendFault::Unreachable,
                detail: format!("reading {} response: {err}", call.path()),
            })?;

        if let Some(err) = classify_failure(call, status, &content_type, &body) {
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|err| AuthError::BackendUnavailable {
            fault: BackendFault::Application,
            detail: format!("{} response outside the contract: {err}", call.path()),
        })
    }
}

/// Classifies a response before body decoding. `None` means the response is
/// a success within the contract and decoding should proceed.
fn classify_failure(
    call: BackendCall,
    status: reqwest::StatusCode,
    content_type: &str,
    body: &str,
) -> Option<AuthError> {
    // A non-JSON answer, success or failure, means the route does not exist
    // in this deployment (load balancer 404 page, proxy error page).
    if !content_type.to_ascii_lowercase().contains("json") {
        return Some(AuthError::BackendUnavailable {
            fault: BackendFault::Misrouted,
            detail: format!(
                "{} answered {status} with content type {content_type:?}",
                call.path()
            ),
        });
    }

    if status.is_success() {
        return None;
    }

    match serde_json::from_str::<BackendErrorBody>(body) {
        Ok(err) if call == BackendCall::Verify && err.error == DEVICE_MISMATCH_CODE => {
            Some(AuthError::SessionDeviceMismatch)
        }
        Ok(err) if call == BackendCall::Token => Some(AuthError::BackendAuthFailed {
            detail: err.detail(),
        }),
        Ok(err) => Some(AuthError::BackendUnavailable {
            fault: BackendFault::Application,
            detail: err.detail(),
        }),
        Err(_) => Some(AuthError::BackendUnavailable {
            fault: BackendFault::Application,
            detail: format!("{} answered {status} with an unreadable error body", call.path()),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn init_session(
        &self,
        device_id: &str,
        platform: &str,
    ) -> Result<AuthSession, AuthError> {
        let response = self
            .post(
                BackendCall::Init,
                &json!({ "device_id": device_id, "platform": platform }),
            )
            .await?;
        Self::read_json(BackendCall::Init, response).await
    }

    async fn verify_session(
        &self,
        session_handle: &str,
        device_id: &str,
    ) -> Result<VerifiedSession, AuthError> {
        let response = self
            .post(
                BackendCall::Verify,
                &json!({ "session_handle": session_handle, "device_id": device_id }),
            )
            .await?;
        Self::read_json(BackendCall::Verify, response).await
    }

    async fn exchange_token(&self, identity_token: &str) -> Result<ApplicationTokens, AuthError> {
        let response = self
            .post(
                BackendCall::Token,
                &json!({ "identity_token": identity_token }),
            )
            .await?;
        let token_response: TokenResponse = Self::read_json(BackendCall::Token, response).await?;

        Ok(ApplicationTokens {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token,
            expires_at: token_response
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_response_is_misrouted_regardless_of_status() {
        let err = classify_failure(
            BackendCall::Init,
            reqwest::StatusCode::NOT_FOUND,
            "text/html; charset=utf-8",
            "<html>404</html>",
        );
        assert!(matches!(
            err,
            Some(AuthError::BackendUnavailable {
                fault: BackendFault::Misrouted,
                ..
            })
        ));

        let ok_html = classify_failure(
            BackendCall::Init,
            reqwest::StatusCode::OK,
            "text/html",
            "<html>proxy login</html>",
        );
        assert!(matches!(
            ok_html,
            Some(AuthError::BackendUnavailable {
                fault: BackendFault::Misrouted,
                ..
            })
        ));
    }

    #[test]
    fn json_success_passes_classification() {
        let err = classify_failure(
            BackendCall::Init,
            reqwest::StatusCode::OK,
            "application/json",
            r#"{"session_handle":"s","csrf_token":"c"}"#,
        );
        assert!(err.is_none());
    }

    #[test]
    fn device_mismatch_code_maps_to_dedicated_kind_on_verify() {
        let err = classify_failure(
            BackendCall::Verify,
            reqwest::StatusCode::CONFLICT,
            "application/json",
            r#"{"error":"device_mismatch","message":"session bound to another device"}"#,
        );
        assert_eq!(err, Some(AuthError::SessionDeviceMismatch));
    }

    #[test]
    fn device_mismatch_code_elsewhere_stays_generic() {
        // The code is only meaningful on verify; init never returns it
        let err = classify_failure(
            BackendCall::Init,
            reqwest::StatusCode::CONFLICT,
            "application/json",
            r#"{"error":"device_mismatch"}"#,
        );
        assert!(matches!(
            err,
            Some(AuthError::BackendUnavailable {
                fault: BackendFault::Application,
                ..
            })
        ));
    }

    #[test]
    fn token_failures_map_to_backend_auth_failed() {
        let err = classify_failure(
            BackendCall::Token,
            reqwest::StatusCode::UNAUTHORIZED,
            "application/json",
            r#"{"error":"invalid_identity_token"}"#,
        );
        assert_eq!(
            err,
            Some(AuthError::BackendAuthFailed {
                detail: "invalid_identity_token".to_string(),
            })
        );
    }

    #[test]
    fn unreadable_json_error_body_is_application_fault() {
        let err = classify_failure(
            BackendCall::Verify,
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "application/json",
            "not json at all",
        );
        assert!(matches!(
            err,
            Some(AuthError::BackendUnavailable {
                fault: BackendFault::Application,
                ..
            })
        ));
    }

    #[test]
    fn error_body_detail_includes_message_when_present() {
        let body = BackendErrorBody {
            error: "rate_limited".to_string(),
            message: Some("try later".to_string()),
        };
        assert_eq!(body.detail(), "rate_limited (try later)");

        let bare = BackendErrorBody {
            error: "rate_limited".to_string(),
            message: None,
        };
        assert_eq!(bare.detail(), "rate_limited");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let backend = HttpSessionBackend::new(&BackendSettings {
            base_url: "https://api.till.example/".to_string(),
            request_timeout_secs: 5,
        });
        assert_eq!(backend.base_url, "https://api.till.example");
    }
}
