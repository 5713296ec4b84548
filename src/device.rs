//! Device identity management
//!
//! Every install carries a stable random identifier that the backend folds
//! into its session and fraud heuristics. The identifier is not a security
//! boundary, so storage trouble degrades to a process-lifetime value instead
//! of blocking sign-in.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use rand::RngCore;
use thiserror::Error;

/// Bytes of entropy behind a device identifier; hex encoding doubles the
/// textual length.
pub const DEVICE_ID_BYTES: usize = 16;

/// Storage key under which the identifier is persisted.
pub const DEVICE_ID_KEY: &str = "tillbridge.device_id";

/// Failure reported by a [`DeviceStore`] implementation.
///
/// The carried message is host-specific (keychain status codes, preference
/// file errors) and is only ever logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("device store failure: {0}")]
pub struct StoreError(pub String);

/// Small key-value seam over the host's durable storage
/// (keychain, shared preferences, or a file in harnesses).
pub trait DeviceStore: Send + Sync {
    /// Reads a previously persisted value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Persists a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the underlying storage cannot be
    /// written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Resolves and caches the device identifier for one flow context.
pub struct DeviceIdentityStore {
    store: Arc<dyn DeviceStore>,
    resolved: OnceCell<String>,
}

impl DeviceIdentityStore {
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self {
            store,
            resolved: OnceCell::new(),
        }
    }

    /// Returns the device identifier, creating and persisting one on first
    /// use.
    ///
    /// Infallible by design: a failed read falls back to a fresh
    /// process-lifetime identifier, and a failed write keeps the generated
    /// value for this process. The result is cached, so repeated calls
    /// return the same value without touching storage again.
    pub fn device_id(&self) -> String {
        self.resolved.get_or_init(|| self.resolve()).clone()
    }

    fn resolve(&self) -> String {
        match self.store.get(DEVICE_ID_KEY) {
            Ok(Some(existing)) if is_valid_device_id(&existing) => existing,
            Ok(Some(corrupt)) => {
                log::warn!(
                    "stored device id failed validation (len {}), regenerating",
                    corrupt.len()
                );
                self.generate_and_persist()
            }
            Ok(None) => self.generate_and_persist(),
            Err(err) => {
                log::warn!("device store read failed, using process-local id: {err}");
                generate_device_id()
            }
        }
    }

    fn generate_and_persist(&self) -> String {
        let id = generate_device_id();
        if let Err(err) = self.store.set(DEVICE_ID_KEY, &id) {
            log::warn!("device store write failed, id will not survive restart: {err}");
        }
        id
    }
}

/// Generates a fresh device identifier: [`DEVICE_ID_BYTES`] random bytes,
/// lowercase hex.
#[must_use]
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validates a stored identifier: exact length, hex digits only.
#[must_use]
pub fn is_valid_device_id(value: &str) -> bool {
    value.len() == DEVICE_ID_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
