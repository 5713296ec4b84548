//! Browser hand-off and deep-link callback bridge
//!
//! The flow's only concurrent section lives here: a listener registered on
//! the deep-link channel before the browser launches, raced against a single
//! timeout timer and the caller's cancellation token. The listener is an
//! RAII subscription, so its registration is released exactly once on every
//! exit path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

/// Delays before each speculative browser-dismiss attempt after a callback
/// resolves. Dismissal is best effort and bounded; if no attempt is
/// acknowledged the browser is left to the user.
const DISMISS_SCHEDULE: [Duration; 4] = [
    Duration::from_millis(0),
    Duration::from_millis(150),
    Duration::from_millis(400),
    Duration::from_millis(900),
];

/// Live registration on a deep-link channel.
///
/// Receives every URI the platform delivers while registered. Dropping the
/// subscription unregisters it; the language guarantees that happens exactly
/// once.
pub struct DeepLinkSubscription {
    receiver: mpsc::UnboundedReceiver<String>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl DeepLinkSubscription {
    /// Builds a subscription from a receiver and the channel's unregister
    /// action.
    #[must_use]
    pub fn new(
        receiver: mpsc::UnboundedReceiver<String>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Next delivered URI, or `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for DeepLinkSubscription {
    fn drop(&mut self) {
        if let Some(unregister) = self.on_drop.take() {
            unregister();
        }
    }
}

/// Source of incoming deep-link URIs.
pub trait DeepLinkChannel: Send + Sync {
    /// Registers a listener. Must be called before any URI of interest can
    /// arrive; the bridge subscribes before launching the browser.
    fn subscribe(&self) -> DeepLinkSubscription;

    /// URI the app was cold-started with, if the platform recorded one.
    /// Diagnostics only; the flow never resolves from it.
    fn initial_uri(&self) -> Option<String> {
        None
    }
}

/// Process-wide deep-link fan-out.
///
/// Platform glue pushes every incoming URI into [`dispatch`]; flows
/// subscribe through the [`DeepLinkChannel`] impl. Clones share one hub.
///
/// [`dispatch`]: DeepLinkHub::dispatch
#[derive(Clone, Default)]
pub struct DeepLinkHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
    initial_uri: Mutex<Option<String>>,
}

impl DeepLinkHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an incoming URI to every registered listener.
    pub fn dispatch(&self, uri: &str) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|_, sender| sender.send(uri.to_string()).is_ok());
    }

    /// Records the URI the app was launched with.
    pub fn set_initial_uri(&self, uri: &str) {
        *self
            .inner
            .initial_uri
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(uri.to_string());
    }

    /// Number of currently registered listeners. Useful for asserting that
    /// flows release their registrations.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DeepLinkChannel for DeepLinkHub {
    fn subscribe(&self) -> DeepLinkSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, sender);

        let inner = Arc::clone(&self.inner);
        DeepLinkSubscription::new(receiver, move || {
            inner
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        })
    }

    fn initial_uri(&self) -> Option<String> {
        self.inner
            .initial_uri
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Hand-off to the system browser (or the in-app browser tab on mobile).
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Opens the URL. Fire and forget: the flow treats a launch error as
    /// non-fatal and keeps waiting on the callback.
    ///
    /// # Errors
    ///
    /// Returns an error when the host cannot even ask the OS to open the
    /// URL.
    fn open(&self, url: &str) -> std::io::Result<()>;

    /// Asks the platform to dismiss the browser surface. Returns whether
    /// the request was acknowledged.
    async fn dismiss(&self) -> bool;
}

/// [`BrowserLauncher`] backed by the OS default browser.
pub struct SystemBrowser;

#[async_trait]
impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        open::that_detached(url)
    }

    async fn dismiss(&self) -> bool {
        // Desktop browsers offer no handle to close the tab we opened.
        // Mobile shells substitute their own launcher with a real dismissal.
        false
    }
}

/// Runs the launch-and-wait section of the flow.
pub struct DeepLinkBridge {
    channel: Arc<dyn DeepLinkChannel>,
    browser: Arc<dyn BrowserLauncher>,
}

impl DeepLinkBridge {
    #[must_use]
    pub fn new(channel: Arc<dyn DeepLinkChannel>, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self { channel, browser }
    }

    /// Cold-start URI recorded by the channel, for diagnostics logging.
    #[must_use]
    pub fn initial_uri(&self) -> Option<String> {
        self.channel.initial_uri()
    }

    /// Launches the authorization URL and waits for the matching callback.
    ///
    /// The listener is registered before the browser opens so a fast
    /// redirect cannot slip past. URIs that do not start with
    /// `callback_prefix` are logged and ignored without resolving. On
    /// resolution a detached, bounded dismiss loop asks the browser to close
    /// itself.
    ///
    /// # Errors
    ///
    /// - [`AuthError::CallbackTimeout`] when no matching URI arrives in
    ///   `timeout`.
    /// - [`AuthError::Cancelled`] when `cancel` fires first, or when the
    ///   channel shuts down mid-wait (the host tearing the app down).
    pub async fn authenticate(
        &self,
        authorization_url: &str,
        callback_prefix: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let mut subscription = self.channel.subscribe();

        if let Err(err) = self.browser.open(authorization_url) {
            log::warn!("browser launch failed, waiting on the callback anyway: {err}");
        }

        let timer = tokio::time::sleep(timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                // Cancellation and the deadline take precedence over a
                // simultaneously ready callback.
                biased;
                () = cancel.cancelled() => return Err(AuthError::Cancelled),
                () = &mut timer => return Err(AuthError::CallbackTimeout { timeout }),
                received = subscription.recv() => match received {
                    Some(uri) if uri.starts_with(callback_prefix) => {
                        self.spawn_dismiss();
                        return Ok(uri);
                    }
                    Some(_) => {
                        log::debug!("ignoring deep link outside the callback namespace");
                    }
                    None => {
                        log::warn!("deep link channel closed while awaiting the callback");
                        return Err(AuthError::Cancelled);
                    }
                },
            }
        }
    }

    fn spawn_dismiss(&self) {
        let browser = Arc::clone(&self.browser);
        tokio::spawn(async move {
            for (attempt, delay) in DISMISS_SCHEDULE.iter().enumerate() {
                tokio::time::sleep(*delay).await;
                if browser.dismiss().await {
                    log::debug!("browser dismissed on attempt {}", attempt + 1);
                    return;
                }
            }
            log::debug!("browser dismiss not acknowledged, leaving it to the user");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBrowser;

    const PREFIX: &str = "tillpos://auth/callback";
    const AUTH_URL: &str = "https://idp.till.example/authorize?state=blob";

    fn bridge_over(
        hub: &DeepLinkHub,
        browser: Arc<RecordingBrowser>,
    ) -> DeepLinkBridge {
        DeepLinkBridge::new(Arc::new(hub.clone()), browser)
    }

    /// Dispatches `uri` once a listener shows up, from a background task.
    fn dispatch_when_listening(hub: &DeepLinkHub, uri: &str) -> tokio::task::JoinHandle<()> {
        let hub = hub.clone();
        let uri = uri.to_string();
        tokio::spawn(async move {
            while hub.listener_count() == 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            hub.dispatch(&uri);
        })
    }

    #[tokio::test]
    async fn matching_callback_resolves_and_releases_listener() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::new());
        let bridge = bridge_over(&hub, browser.clone());
        let dispatcher = dispatch_when_listening(&hub, "tillpos://auth/callback?session=sess-81f2");

        let uri = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(uri, "tillpos://auth/callback?session=sess-81f2");
        assert_eq!(hub.listener_count(), 0);
        assert_eq!(browser.opened_urls(), vec![AUTH_URL.to_string()]);
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn foreign_uris_are_ignored_without_resolving() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::new());
        let bridge = bridge_over(&hub, browser);

        let feeder = {
            let hub = hub.clone();
            tokio::spawn(async move {
                while hub.listener_count() == 0 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                hub.dispatch("otherapp://share?item=42");
                hub.dispatch("tillpos://catalog/open");
                hub.dispatch("tillpos://auth/callback?session=sess-81f2");
            })
        };

        let uri = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();

        assert!(uri.starts_with(PREFIX));
        assert_eq!(hub.listener_count(), 0);
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn times_out_when_no_callback_arrives() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::new());
        let bridge = bridge_over(&hub, browser);

        let err = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_millis(40), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AuthError::CallbackTimeout {
                timeout: Duration::from_millis(40)
            }
        );
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_wins_the_race() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::new());
        let bridge = bridge_over(&hub, browser);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let err = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(5), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Cancelled);
        assert_eq!(hub.listener_count(), 0);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn browser_launch_failure_is_tolerated() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::failing());
        let bridge = bridge_over(&hub, browser);
        let dispatcher = dispatch_when_listening(&hub, "tillpos://auth/callback?session=sess-81f2");

        let uri = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();

        assert!(uri.starts_with(PREFIX));
        dispatcher.await.unwrap();
    }

    #[tokio::test]
    async fn dismiss_is_attempted_after_resolution() {
        let hub = DeepLinkHub::new();
        let browser = Arc::new(RecordingBrowser::accepting_dismiss());
        let bridge = bridge_over(&hub, browser.clone());
        let dispatcher = dispatch_when_listening(&hub, "tillpos://auth/callback?session=sess-81f2");

        bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();
        dispatcher.await.unwrap();

        // The dismiss loop runs detached; give its first (immediate) attempt
        // a moment to land.
        let mut waited = Duration::ZERO;
        while browser.dismiss_count() == 0 && waited < Duration::from_secs(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        assert!(browser.dismiss_count() >= 1);
    }

    #[tokio::test]
    async fn closed_channel_surfaces_as_cancelled() {
        struct ClosedChannel;
        impl DeepLinkChannel for ClosedChannel {
            fn subscribe(&self) -> DeepLinkSubscription {
                let (_sender, receiver) = mpsc::unbounded_channel();
                DeepLinkSubscription::new(receiver, || {})
            }
        }

        let bridge = DeepLinkBridge::new(
            Arc::new(ClosedChannel),
            Arc::new(RecordingBrowser::new()),
        );

        let err = bridge
            .authenticate(AUTH_URL, PREFIX, Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, AuthError::Cancelled);
    }

    #[test]
    fn initial_uri_round_trips_through_the_hub() {
        let hub = DeepLinkHub::new();
        assert_eq!(hub.initial_uri(), None);
        hub.set_initial_uri("tillpos://auth/callback?session=stale");
        assert_eq!(
            hub.initial_uri().as_deref(),
            Some("tillpos://auth/callback?session=stale")
        );
    }

    #[test]
    fn subscription_drop_unregisters_exactly_once() {
        let hub = DeepLinkHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_eq!(hub.listener_count(), 2);

        drop(first);
        assert_eq!(hub.listener_count(), 1);
        drop(second);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn dispatch_reaches_every_listener() {
        let hub = DeepLinkHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.dispatch("tillpos://auth/callback?session=s");

        assert_eq!(
            first.recv().await.as_deref(),
            Some("tillpos://auth/callback?session=s")
        );
        assert_eq!(
            second.recv().await.as_deref(),
            Some("tillpos://auth/callback?session=s")
        );
    }
}
