//! Mock objects and fake implementations for testing
//!
//! This module provides mock implementations of the flow's collaborator
//! traits for isolated unit testing. Every mock records the calls it
//! receives so tests can assert on ordering and payloads.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{ApplicationTokens, AuthSession, SessionBackend, VerifiedSession};
use crate::bridge::BrowserLauncher;
use crate::device::{DeviceStore, StoreError};
use crate::error::AuthError;
use crate::provider::{IdentityProvider, ProviderIdentity};

use super::constants::TEST_IDENTITY_TOKEN;
use super::fixtures::TestFixtures;

/// In-memory key-value store standing in for platform keychains
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a single entry
    #[must_use]
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Number of writes the store has accepted
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current value under `key`, if any
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

impl DeviceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store whose reads and writes always fail, as a locked keychain would
pub struct FailingStore;

impl DeviceStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError(format!("read denied: {key}")))
    }

    fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError(format!("write denied: {key}")))
    }
}

/// Browser launcher that records launches instead of opening anything
#[derive(Default)]
pub struct RecordingBrowser {
    fail_open: bool,
    accept_dismiss: bool,
    opened: Mutex<Vec<String>>,
    dismissals: AtomicUsize,
}

impl RecordingBrowser {
    /// Launcher that accepts every launch and declines dismissals
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher whose `open` fails, as a headless host would
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Launcher that acknowledges the first dismissal request
    #[must_use]
    pub fn accepting_dismiss() -> Self {
        Self {
            accept_dismiss: true,
            ..Self::default()
        }
    }

    /// Every URL handed to `open`, in order
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Number of dismissal requests received so far
    #[must_use]
    pub fn dismiss_count(&self) -> usize {
        self.dismissals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for RecordingBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        if self.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no browser registered",
            ));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn dismiss(&self) -> bool {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        self.accept_dismiss
    }
}

/// Scripted [`SessionBackend`] that records every call it serves
pub struct MockBackend {
    init_result: Result<AuthSession, AuthError>,
    verify_result: Result<VerifiedSession, AuthError>,
    exchange_result: Result<ApplicationTokens, AuthError>,
    init_seen: Mutex<Vec<(String, String)>>,
    verify_seen: Mutex<Vec<(String, String)>>,
    exchange_seen: Mutex<Vec<String>>,
}

impl MockBackend {
    /// Backend that succeeds at every stage with fixture data
    #[must_use]
    pub fn happy() -> Self {
        Self {
            init_result: Ok(TestFixtures::auth_session()),
            verify_result: Ok(TestFixtures::verified_session()),
            exchange_result: Ok(TestFixtures::application_tokens()),
            init_seen: Mutex::new(Vec::new()),
            verify_seen: Mutex::new(Vec::new()),
            exchange_seen: Mutex::new(Vec::new()),
        }
    }

    /// Happy backend whose init stage fails with `error`
    #[must_use]
    pub fn with_init_error(error: AuthError) -> Self {
        let mut backend = Self::happy();
        backend.init_result = Err(error);
        backend
    }

    /// Happy backend whose verify stage fails with `error`
    #[must_use]
    pub fn with_verify_error(error: AuthError) -> Self {
        let mut backend = Self::happy();
        backend.verify_result = Err(error);
        backend
    }

    /// Happy backend whose token exchange fails with `error`
    #[must_use]
    pub fn with_exchange_error(error: AuthError) -> Self {
        let mut backend = Self::happy();
        backend.exchange_result = Err(error);
        backend
    }

    /// Recorded `(device_id, platform)` pairs from init calls
    #[must_use]
    pub fn init_calls(&self) -> Vec<(String, String)> {
        self.init_seen.lock().unwrap().clone()
    }

    /// Recorded `(session_handle, device_id)` pairs from verify calls
    #[must_use]
    pub fn verify_calls(&self) -> Vec<(String, String)> {
        self.verify_seen.lock().unwrap().clone()
    }

    /// Recorded identity tokens from exchange calls
    #[must_use]
    pub fn exchange_calls(&self) -> Vec<String> {
        self.exchange_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn init_session(
        &self,
        device_id: &str,
        platform: &str,
    ) -> Result<AuthSession, AuthError> {
        self.init_seen
            .lock()
            .unwrap()
            .push((device_id.to_string(), platform.to_string()));
        self.init_result.clone()
    }

    async fn verify_session(
        &self,
        session_handle: &str,
        device_id: &str,
    ) -> Result<VerifiedSession, AuthError> {
        self.verify_seen
            .lock()
            .unwrap()
            .push((session_handle.to_string(), device_id.to_string()));
        self.verify_result.clone()
    }

    async fn exchange_token(&self, identity_token: &str) -> Result<ApplicationTokens, AuthError> {
        self.exchange_seen
            .lock()
            .unwrap()
            .push(identity_token.to_string());
        self.exchange_result.clone()
    }
}

/// Scripted [`IdentityProvider`] that records states and credentials
pub struct MockIdentityProvider {
    sign_in_result: Result<ProviderIdentity, AuthError>,
    states: Mutex<Vec<String>>,
    credentials: Mutex<Vec<String>>,
}

impl MockIdentityProvider {
    /// Provider that mints the fixture identity for any credential
    #[must_use]
    pub fn happy() -> Self {
        Self {
            sign_in_result: Ok(TestFixtures::provider_identity()),
            states: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// Provider that omits the subject email from the minted identity
    #[must_use]
    pub fn without_email() -> Self {
        let mut provider = Self::happy();
        provider.sign_in_result = Ok(ProviderIdentity {
            identity_token: TEST_IDENTITY_TOKEN.to_string(),
            email: None,
        });
        provider
    }

    /// Provider that rejects every credential with `error`
    #[must_use]
    pub fn with_sign_in_error(error: AuthError) -> Self {
        let mut provider = Self::happy();
        provider.sign_in_result = Err(error);
        provider
    }

    /// State blobs handed to `authorization_url`, in order
    #[must_use]
    pub fn states_seen(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }

    /// Credentials handed to `sign_in_with_credential`, in order
    #[must_use]
    pub fn credentials_seen(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        self.states.lock().unwrap().push(state.to_string());
        Ok(format!("https://idp.till.example/authorize?state={state}"))
    }

    async fn sign_in_with_credential(
        &self,
        credential: &str,
    ) -> Result<ProviderIdentity, AuthError> {
        self.credentials.lock().unwrap().push(credential.to_string());
        self.sign_in_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::constants::{TEST_ACCESS_TOKEN, TEST_EMAIL, TEST_SESSION_HANDLE};

    #[test]
    fn memory_store_round_trips_and_counts_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert_eq!(store.value_of("k"), Some("v".to_string()));
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn failing_store_fails_both_directions() {
        assert!(FailingStore.get("k").is_err());
        assert!(FailingStore.set("k", "v").is_err());
    }

    #[tokio::test]
    async fn recording_browser_captures_launches_and_dismissals() {
        let browser = RecordingBrowser::accepting_dismiss();
        browser.open("https://example.com/a").unwrap();

        assert_eq!(browser.opened_urls(), vec!["https://example.com/a"]);
        assert!(browser.dismiss().await);
        assert_eq!(browser.dismiss_count(), 1);

        assert!(RecordingBrowser::failing().open("https://example.com/b").is_err());
    }

    #[tokio::test]
    async fn mock_backend_serves_fixtures_and_records_calls() {
        let backend = MockBackend::happy();

        let session = backend.init_session("device-1", "ios").await.unwrap();
        assert_eq!(session.session_handle, TEST_SESSION_HANDLE);

        let verified = backend
            .verify_session(&session.session_handle, "device-1")
            .await
            .unwrap();
        assert_eq!(verified.email, TEST_EMAIL);

        let tokens = backend.exchange_token("idt").await.unwrap();
        assert_eq!(tokens.access_token, TEST_ACCESS_TOKEN);

        assert_eq!(
            backend.init_calls(),
            vec![("device-1".to_string(), "ios".to_string())]
        );
        assert_eq!(
            backend.verify_calls(),
            vec![(TEST_SESSION_HANDLE.to_string(), "device-1".to_string())]
        );
        assert_eq!(backend.exchange_calls(), vec!["idt".to_string()]);
    }

    #[test]
    fn mock_provider_embeds_the_state_blob() {
        let provider = MockIdentityProvider::happy();
        let url = provider.authorization_url("blob123").unwrap();

        assert_eq!(url, "https://idp.till.example/authorize?state=blob123");
        assert_eq!(provider.states_seen(), vec!["blob123".to_string()]);
    }
}
