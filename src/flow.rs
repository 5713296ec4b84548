//! Sign-in orchestration
//!
//! [`SignInFlow`] owns one sign-in context: settings plus the five
//! collaborator seams (backend, provider, device store, deep-link channel,
//! browser). There is no global state; hosts that allow overlapping sign-in
//! attempts run them on separate flow instances, which gives each its own
//! session handle and listener registration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{ApplicationTokens, HttpSessionBackend, SessionBackend};
use crate::bridge::{
    BrowserLauncher, DeepLinkBridge, DeepLinkChannel, SystemBrowser,
};
use crate::callback;
use crate::device::{DeviceIdentityStore, DeviceStore};
use crate::error::AuthError;
use crate::provider::{HttpIdentityProvider, IdentityProvider};
use crate::settings::{BridgeSettings, ConfigStatus};
use crate::state::{self, BridgeState};

/// Observable position of a sign-in attempt.
///
/// Stages advance strictly forward; any failure drops the attempt into the
/// terminal [`Failed`](Self::Failed) stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Idle,
    DeviceReady,
    SessionInitialized,
    BrowserLaunched,
    AwaitingCallback,
    CallbackReceived,
    SessionVerified,
    ProviderExchanged,
    Complete,
    Failed,
}

impl FlowStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::DeviceReady => "device_ready",
            Self::SessionInitialized => "session_initialized",
            Self::BrowserLaunched => "browser_launched",
            Self::AwaitingCallback => "awaiting_callback",
            Self::CallbackReceived => "callback_received",
            Self::SessionVerified => "session_verified",
            Self::ProviderExchanged => "provider_exchanged",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a completed sign-in hands back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutcome {
    pub email: String,
    pub tokens: ApplicationTokens,
}

/// Collaborators a flow runs against.
///
/// Hosts wire mocks here in tests and platform implementations in the app.
pub struct FlowDependencies {
    pub backend: Arc<dyn SessionBackend>,
    pub provider: Arc<dyn IdentityProvider>,
    pub device_store: Arc<dyn DeviceStore>,
    pub deep_links: Arc<dyn DeepLinkChannel>,
    pub browser: Arc<dyn BrowserLauncher>,
}

impl FlowDependencies {
    /// Production wiring: HTTP clients from settings plus the system
    /// browser. The device store and deep-link channel stay host-provided
    /// since both sit on platform APIs.
    #[must_use]
    pub fn with_http(
        settings: &BridgeSettings,
        device_store: Arc<dyn DeviceStore>,
        deep_links: Arc<dyn DeepLinkChannel>,
    ) -> Self {
        Self {
            backend: Arc::new(HttpSessionBackend::new(&settings.backend)),
            provider: Arc::new(HttpIdentityProvider::new(&settings.provider)),
            device_store,
            deep_links,
            browser: Arc::new(SystemBrowser),
        }
    }
}

/// One sign-in context.
///
/// A flow instance runs one attempt at a time; progress of the current
/// attempt is observable through [`progress`](Self::progress).
pub struct SignInFlow {
    settings: BridgeSettings,
    backend: Arc<dyn SessionBackend>,
    provider: Arc<dyn IdentityProvider>,
    device: DeviceIdentityStore,
    bridge: DeepLinkBridge,
    progress: watch::Sender<FlowStage>,
}

impl SignInFlow {
    #[must_use]
    pub fn new(settings: BridgeSettings, deps: FlowDependencies) -> Self {
        let (progress, _) = watch::channel(FlowStage::Idle);
        Self {
            backend: deps.backend,
            provider: deps.provider,
            device: DeviceIdentityStore::new(deps.device_store),
            bridge: DeepLinkBridge::new(deps.deep_links, deps.browser),
            settings,
            progress,
        }
    }

    /// Configuration fail-fast check, also used by diagnostics screens.
    #[must_use]
    pub fn config_status(&self) -> ConfigStatus {
        self.settings.config_status()
    }

    /// Stage transitions of the in-flight attempt.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<FlowStage> {
        self.progress.subscribe()
    }

    /// Runs a complete sign-in attempt with a token nobody cancels.
    ///
    /// # Errors
    ///
    /// See [`sign_in_with`](Self::sign_in_with).
    pub async fn sign_in(&self) -> Result<SignInOutcome, AuthError> {
        self.sign_in_with(&CancellationToken::new()).await
    }

    /// Runs a complete sign-in attempt that the caller can cancel.
    ///
    /// Every awaited operation is raced against `cancel`; cancelling
    /// releases the deep-link listener and resolves with
    /// [`AuthError::Cancelled`].
    ///
    /// # Errors
    ///
    /// One [`AuthError`] kind per failed stage; all are terminal and none
    /// are retried internally.
    pub async fn sign_in_with(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SignInOutcome, AuthError> {
        let attempt = Uuid::new_v4();
        let result = self.run(attempt, cancel).await;
        if let Err(err) = &result {
            self.set_stage(attempt, FlowStage::Failed);
            log::error!("[{attempt}] sign-in failed: {} ({err})", err.kind());
        }
        result
    }

    async fn run(
        &self,
        attempt: Uuid,
        cancel: &CancellationToken,
    ) -> Result<SignInOutcome, AuthError> {
        self.set_stage(attempt, FlowStage::Idle);

        let status = self.settings.config_status();
        if !status.configured {
            return Err(AuthError::NotConfigured {
                reason: status
                    .reason
                    .unwrap_or_else(|| "configuration incomplete".to_string()),
            });
        }

        if let Some(uri) = self.bridge.initial_uri() {
            // Stale cold-start callbacks are never resolved, only noted.
            log::debug!("[{attempt}] cold-start deep link present ({} chars)", uri.len());
        }

        let device_id = self.device.device_id();
        self.set_stage(attempt, FlowStage::DeviceReady);

        let session = guarded(
            cancel,
            self.backend
                .init_session(&device_id, &self.settings.flow.platform),
        )
        .await?;
        self.set_stage(attempt, FlowStage::SessionInitialized);

        let bridge_state = BridgeState {
            session_handle: session.session_handle.clone(),
            csrf_token: session.csrf_token.clone(),
            callback_uri: self.settings.flow.callback_prefix.clone(),
        };
        let state_blob = state::encode(&bridge_state)?;
        let authorization_url = self.provider.authorization_url(&state_blob)?;

        self.set_stage(attempt, FlowStage::BrowserLaunched);
        self.set_stage(attempt, FlowStage::AwaitingCallback);
        let uri = self
            .bridge
            .authenticate(
                &authorization_url,
                &self.settings.flow.callback_prefix,
                self.settings.callback_timeout(),
                cancel,
            )
            .await?;
        self.set_stage(attempt, FlowStage::CallbackReceived);

        let redirect = callback::parse(&uri)?;
        if let Some(code) = redirect.error {
            // The provider declined authorization; the code wins over any
            // session parameter riding the same callback.
            return Err(AuthError::ProviderRejected { detail: code });
        }
        let Some(handle) = redirect.session_handle else {
            return Err(AuthError::MalformedCallback {
                detail: "callback carried neither session nor error".to_string(),
            });
        };
        if handle != session.session_handle {
            return Err(AuthError::SessionMismatch);
        }

        let verified = guarded(cancel, self.backend.verify_session(&handle, &device_id)).await?;
        self.set_stage(attempt, FlowStage::SessionVerified);

        let identity = guarded(
            cancel,
            self.provider
                .sign_in_with_credential(&verified.login_credential),
        )
        .await?;
        self.set_stage(attempt, FlowStage::ProviderExchanged);

        let tokens = guarded(cancel, self.backend.exchange_token(&identity.identity_token)).await?;

        self.set_stage(attempt, FlowStage::Complete);
        log::info!("[{attempt}] sign-in complete");

        Ok(SignInOutcome {
            email: identity.email.unwrap_or(verified.email),
            tokens,
        })
    }

    fn set_stage(&self, attempt: Uuid, stage: FlowStage) {
        log::debug!("[{attempt}] stage {stage}");
        self.progress.send_replace(stage);
    }
}

/// Races one awaited operation against the caller's cancellation token.
async fn guarded<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = Result<T, AuthError>>,
) -> Result<T, AuthError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AuthError::Cancelled),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_have_stable_names() {
        assert_eq!(FlowStage::Idle.as_str(), "idle");
        assert_eq!(FlowStage::AwaitingCallback.as_str(), "awaiting_callback");
        assert_eq!(FlowStage::Complete.to_string(), "complete");
    }

    #[test]
    fn only_complete_and_failed_are_terminal() {
        assert!(FlowStage::Complete.is_terminal());
        assert!(FlowStage::Failed.is_terminal());
        assert!(!FlowStage::Idle.is_terminal());
        assert!(!FlowStage::AwaitingCallback.is_terminal());
    }

    #[tokio::test]
    async fn guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = guarded(&cancel, async { Ok(42) }).await;

        assert_eq!(result, Err(AuthError::Cancelled));
    }

    #[tokio::test]
    async fn guarded_passes_results_through() {
        let cancel = CancellationToken::new();

        let ok = guarded(&cancel, async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<i32, AuthError> = guarded(&cancel, async {
            Err(AuthError::SessionMismatch)
        })
        .await;
        assert_eq!(err, Err(AuthError::SessionMismatch));
    }
}
