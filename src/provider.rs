//! Identity-provider endpoints
//!
//! The provider is touched twice per attempt: once indirectly, when the
//! browser visits the authorization URL composed here, and once directly,
//! when the one-time login credential minted by the backend is redeemed for
//! a provider identity token. Provider failures of either shape are
//! terminal; the flow never retries them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::error::AuthError;
use crate::settings::ProviderSettings;

/// Identity minted by the provider for a redeemed credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub identity_token: String,
    /// Subject email as the provider reports it; some tenants omit it.
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider operations needed by the flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Composes the authorization URL carrying the opaque state blob.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotConfigured`] when the configured
    /// authorization endpoint is not a valid URL.
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Redeems the one-time login credential for a provider identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderRejected`] for any provider-side
    /// failure, transport included; there is no transient case worth
    /// retrying a one-time credential against.
    async fn sign_in_with_credential(&self, credential: &str)
        -> Result<ProviderIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct CredentialSignInResponse {
    identity_token: String,
    #[serde(default)]
    email: Option<String>,
}

/// Production [`IdentityProvider`] over HTTP.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl HttpIdentityProvider {
    #[must_use]
    pub fn new(settings: &ProviderSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let mut url = Url::parse(&self.settings.authorization_endpoint).map_err(|err| {
            AuthError::NotConfigured {
                reason: format!("provider.authorization_endpoint: {err}"),
            }
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    async fn sign_in_with_credential(
        &self,
        credential: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        let mut url = Url::parse(&self.settings.credential_endpoint).map_err(|err| {
            AuthError::NotConfigured {
                reason: format!("provider.credential_endpoint: {err}"),
            }
        })?;
        if !self.settings.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.settings.api_key);
        }

        let response = self
            .http
            .post(url)
            .json(&json!({ "token": credential, "return_identity_token": true }))
            .send()
            .await
            .map_err(|err| AuthError::ProviderRejected {
                detail: format!("transport: {err}"),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AuthError::ProviderRejected {
                detail: format!("reading response: {err}"),
            })?;

        if !status.is_success() {
            return Err(AuthError::ProviderRejected {
                detail: rejection_detail(status, &body),
            });
        }

        let parsed: CredentialSignInResponse =
            serde_json::from_str(&body).map_err(|err| AuthError::ProviderRejected {
                detail: format!("response outside the contract: {err}"),
            })?;

        Ok(ProviderIdentity {
            identity_token: parsed.identity_token,
            email: parsed.email,
        })
    }
}

/// Pulls the provider's error code out of a rejection body. Providers answer
/// either `{"error": "CODE"}` or `{"error": {"message": "CODE"}}`; anything
/// else falls back to the HTTP status.
fn rejection_detail(status: reqwest::StatusCode, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|value| value.get("error"))
        .and_then(|error| {
            error.as_str().map(ToString::to_string).or_else(|| {
                error
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .map(ToString::to_string)
            })
        });
    code.unwrap_or_else(|| format!("status {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestFixtures;

    fn provider() -> HttpIdentityProvider {
        HttpIdentityProvider::new(&TestFixtures::settings().provider)
    }

    #[test]
    fn authorization_url_carries_the_oauth_parameters() {
        let url = provider().authorization_url("blob123").unwrap();
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.host_str(), Some("idp.till.example"));
        assert_eq!(parsed.path(), "/authorize");

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("client_id".to_string(), "till-mobile".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("scope".to_string(), "openid email".to_string())));
        assert!(pairs.contains(&("state".to_string(), "blob123".to_string())));
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "redirect_uri" && v.contains("/auth/mobile/callback")));
    }

    #[test]
    fn authorization_url_percent_encodes_values() {
        let url = provider().authorization_url("a b&c").unwrap();
        assert!(!url.contains("a b&c"));
        let parsed = Url::parse(&url).unwrap();
        let state = parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned());
        assert_eq!(state.as_deref(), Some("a b&c"));
    }

    #[test]
    fn invalid_authorization_endpoint_is_not_configured() {
        let mut settings = TestFixtures::settings().provider;
        settings.authorization_endpoint = "not a url".to_string();
        let err = HttpIdentityProvider::new(&settings)
            .authorization_url("blob")
            .unwrap_err();
        assert!(matches!(err, AuthError::NotConfigured { .. }));
    }

    #[test]
    fn rejection_detail_reads_flat_error_codes() {
        let detail = rejection_detail(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":"INVALID_CREDENTIAL"}"#,
        );
        assert_eq!(detail, "INVALID_CREDENTIAL");
    }

    #[test]
    fn rejection_detail_reads_nested_error_messages() {
        let detail = rejection_detail(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"TOKEN_EXPIRED","code":400}}"#,
        );
        assert_eq!(detail, "TOKEN_EXPIRED");
    }

    #[test]
    fn rejection_detail_falls_back_to_status() {
        let detail = rejection_detail(reqwest::StatusCode::SERVICE_UNAVAILABLE, "<html></html>");
        assert_eq!(detail, "status 503 Service Unavailable");
    }
}
