#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Mobile identity-bridge sign-in for the Till commerce platform.
//!
//! Drives the full flow from device identity through browser hand-off to
//! application tokens. Hosts construct a [`SignInFlow`] from settings and
//! platform adapters, then await [`SignInFlow::sign_in`].

/// Version of the tillbridge library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backend;
pub mod bridge;
pub mod callback;
pub mod device;
pub mod error;
pub mod flow;
pub mod provider;
pub mod settings;
pub mod state;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use backend::{
    ApplicationTokens, AuthSession, HttpSessionBackend, SessionBackend, VerifiedSession,
};
pub use bridge::{
    BrowserLauncher, DeepLinkBridge, DeepLinkChannel, DeepLinkHub, DeepLinkSubscription,
    SystemBrowser,
};
pub use device::{DeviceIdentityStore, DeviceStore, StoreError};
pub use error::{AuthError, BackendFault};
pub use flow::{FlowDependencies, FlowStage, SignInFlow, SignInOutcome};
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderIdentity};
pub use settings::{BridgeSettings, ConfigStatus};
pub use state::BridgeState;
