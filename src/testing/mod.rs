//! Unified testing utilities for tillbridge
//!
//! Consolidates the fixtures and mock collaborators the unit and
//! integration suites share. Host apps get the same tools through the
//! `testing` cargo feature, so they can drive [`SignInFlow`] end to end
//! against mocks in their own suites.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (settings, sessions, callback URIs)
//! - [`mock`] - Mock implementations of the flow's collaborator traits
//!
//! ## Usage
//!
//! ```rust
//! use tillbridge::testing::{MemoryStore, MockBackend, TestFixtures};
//!
//! let settings = TestFixtures::settings();
//! assert!(settings.config_status().configured);
//!
//! let backend = MockBackend::happy();
//! let device_store = MemoryStore::new();
//! ```
//!
//! [`SignInFlow`]: crate::flow::SignInFlow

pub mod fixtures;
pub mod mock;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use mock::{
    FailingStore, MemoryStore, MockBackend, MockIdentityProvider, RecordingBrowser,
};

/// Common test constants
pub mod constants {
    /// Default test email address
    pub const TEST_EMAIL: &str = "clerk@till.example";

    /// Valid persisted device identifier (16 bytes, hex)
    pub const TEST_DEVICE_ID: &str = "00112233445566778899aabbccddeeff";

    /// Session handle issued by the mock backend
    pub const TEST_SESSION_HANDLE: &str = "sess-81f2";

    /// Anti-forgery token issued alongside the session handle
    pub const TEST_CSRF_TOKEN: &str = "csrf-9d41";

    /// Deep-link prefix the test app claims
    pub const TEST_CALLBACK_PREFIX: &str = "tillpos://auth/callback";

    /// One-time login credential minted by the mock verify endpoint
    pub const TEST_LOGIN_CREDENTIAL: &str = "otc-5510";

    /// Identity token minted by the mock provider
    pub const TEST_IDENTITY_TOKEN: &str = "idt-a0b1";

    /// Application access token minted by the mock token endpoint
    pub const TEST_ACCESS_TOKEN: &str = "app-access-7731";

    /// Application refresh token minted by the mock token endpoint
    pub const TEST_REFRESH_TOKEN: &str = "app-refresh-1188";

    /// Platform tag reported by test flows
    pub const TEST_PLATFORM: &str = "ios";
}
