//! Test fixtures providing pre-built test objects
//!
//! This module provides commonly used test data and configurations as static fixtures,
//! eliminating the need to recreate the same test objects in multiple test files.

use crate::backend::{ApplicationTokens, AuthSession, VerifiedSession};
use crate::provider::ProviderIdentity;
use crate::settings::{
    BackendSettings, BridgeSettings, FlowSettings, LoggingSettings, ProviderSettings,
};
use crate::state::BridgeState;
use chrono::{Duration, Utc};

use super::constants::{
    TEST_ACCESS_TOKEN, TEST_CALLBACK_PREFIX, TEST_CSRF_TOKEN, TEST_EMAIL, TEST_IDENTITY_TOKEN,
    TEST_LOGIN_CREDENTIAL, TEST_PLATFORM, TEST_REFRESH_TOKEN, TEST_SESSION_HANDLE,
};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Create fully-configured settings pointing at test endpoints
    #[must_use]
    pub fn settings() -> BridgeSettings {
        BridgeSettings {
            backend: BackendSettings {
                base_url: "http://127.0.0.1:9201".to_string(),
                request_timeout_secs: 5,
            },
            provider: ProviderSettings {
                client_id: "till-mobile".to_string(),
                api_key: "test-api-key".to_string(),
                authorization_endpoint: "https://idp.till.example/authorize".to_string(),
                credential_endpoint: "https://idp.till.example/v1/signin".to_string(),
                redirect_uri: "http://127.0.0.1:9201/auth/mobile/callback".to_string(),
                scopes: vec!["openid".to_string(), "email".to_string()],
            },
            flow: FlowSettings {
                platform: TEST_PLATFORM.to_string(),
                callback_prefix: TEST_CALLBACK_PREFIX.to_string(),
                callback_timeout_secs: 5,
            },
            logging: LoggingSettings::default(),
        }
    }

    /// Create the session the mock backend hands out at init
    #[must_use]
    pub fn auth_session() -> AuthSession {
        AuthSession {
            session_handle: TEST_SESSION_HANDLE.to_string(),
            csrf_token: TEST_CSRF_TOKEN.to_string(),
        }
    }

    /// Create the verified session the mock backend hands out at verify
    #[must_use]
    pub fn verified_session() -> VerifiedSession {
        VerifiedSession {
            login_credential: TEST_LOGIN_CREDENTIAL.to_string(),
            email: TEST_EMAIL.to_string(),
        }
    }

    /// Create the identity the mock provider mints for the login credential
    #[must_use]
    pub fn provider_identity() -> ProviderIdentity {
        ProviderIdentity {
            identity_token: TEST_IDENTITY_TOKEN.to_string(),
            email: Some(TEST_EMAIL.to_string()),
        }
    }

    /// Create the application tokens the mock backend mints at exchange
    #[must_use]
    pub fn application_tokens() -> ApplicationTokens {
        ApplicationTokens {
            access_token: TEST_ACCESS_TOKEN.to_string(),
            refresh_token: Some(TEST_REFRESH_TOKEN.to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }

    /// Create a state blob payload matching the standard test session
    #[must_use]
    pub fn bridge_state() -> BridgeState {
        BridgeState {
            session_handle: TEST_SESSION_HANDLE.to_string(),
            csrf_token: TEST_CSRF_TOKEN.to_string(),
            callback_uri: TEST_CALLBACK_PREFIX.to_string(),
        }
    }

    /// Deep-link URI announcing a completed provider sign-in
    #[must_use]
    pub fn callback_uri() -> String {
        format!("{TEST_CALLBACK_PREFIX}?session={TEST_SESSION_HANDLE}")
    }

    /// Deep-link URI announcing a provider-side failure
    #[must_use]
    pub fn error_callback_uri(code: &str) -> String {
        format!("{TEST_CALLBACK_PREFIX}?error={code}")
    }
}
