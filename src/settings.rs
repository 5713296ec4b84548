//! Configuration for the sign-in bridge
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. `TILLBRIDGE_*` environment variables
//! 2. Settings.toml in `TILLBRIDGE_SECRETS_DIR` (if set and present)
//! 3. Settings.toml in the current directory (if present)
//! 4. Compiled defaults
//!
//! A minimal Settings.toml:
//!
//! ```toml
//! [backend]
//! base_url = "https://api.till.example"
//!
//! [provider]
//! client_id = "till-mobile"
//! api_key = "AIza..."
//! authorization_endpoint = "https://idp.till.example/authorize"
//! credential_endpoint = "https://idp.till.example/v1/signin"
//! redirect_uri = "https://api.till.example/auth/mobile/callback"
//! ```

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Values shipped in checked-in config templates; treated as unconfigured.
const PLACEHOLDER_PREFIX: &str = "your-";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeSettings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub flow: FlowSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the application backend, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout for the session endpoints.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub client_id: String,
    /// Provider API key, sent as a query parameter on the credential
    /// sign-in endpoint.
    pub api_key: String,
    pub authorization_endpoint: String,
    pub credential_endpoint: String,
    /// Where the provider redirects after authorization. Points at the
    /// backend, which completes its leg and deep-links back into the app.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Platform tag reported to the backend at session init.
    pub platform: String,
    /// Deep-link prefix the callback must match, scheme and path included.
    pub callback_prefix: String,
    /// How long to wait for the deep-link callback before giving up.
    pub callback_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

/// Result of the configuration fail-fast check surfaced on diagnostics
/// screens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStatus {
    pub configured: bool,
    /// First missing or placeholder field, when not configured.
    pub reason: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            api_key: String::new(),
            authorization_endpoint: String::new(),
            credential_endpoint: String::new(),
            redirect_uri: String::new(),
            scopes: vec!["openid".to_string(), "email".to_string()],
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            callback_prefix: "tillpos://auth/callback".to_string(),
            callback_timeout_secs: 180,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl BridgeSettings {
    /// Load settings from configuration files and environment variables,
    /// then initialize logging.
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        settings.init_logging();
        Ok(settings)
    }

    /// Load base settings from TOML file(s) or fall back to defaults.
    fn load_base_settings() -> Result<Self> {
        let mut settings = Self::default();

        let default_config_path = std::path::PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            let toml_content = fs::read_to_string(&default_config_path)
                .with_context(|| format!("reading {}", default_config_path.display()))?;
            settings = basic_toml::from_str(&toml_content)
                .with_context(|| format!("parsing {}", default_config_path.display()))?;
        }

        if let Ok(secrets_dir) = std::env::var("TILLBRIDGE_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                let secrets_content = fs::read_to_string(&secrets_path)
                    .with_context(|| format!("reading {}", secrets_path.display()))?;
                settings = basic_toml::from_str(&secrets_content)
                    .with_context(|| format!("parsing {}", secrets_path.display()))?;
                log::debug!("settings overridden from {}", secrets_path.display());
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings.
    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_backend_env_overrides(&mut settings.backend);
        Self::apply_provider_env_overrides(&mut settings.provider);
        Self::apply_flow_env_overrides(&mut settings.flow);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_backend_env_overrides(backend: &mut BackendSettings) {
        if let Ok(base_url) = std::env::var("TILLBRIDGE_BACKEND_URL") {
            backend.base_url = base_url;
        }
        Self::apply_numeric_env_override(
            "TILLBRIDGE_REQUEST_TIMEOUT_SECS",
            &mut backend.request_timeout_secs,
        );
    }

    fn apply_provider_env_overrides(provider: &mut ProviderSettings) {
        if let Ok(client_id) = std::env::var("TILLBRIDGE_CLIENT_ID") {
            provider.client_id = client_id;
        }
        if let Ok(api_key) = std::env::var("TILLBRIDGE_API_KEY") {
            provider.api_key = api_key;
        }
        if let Ok(endpoint) = std::env::var("TILLBRIDGE_AUTHORIZATION_ENDPOINT") {
            provider.authorization_endpoint = endpoint;
        }
        if let Ok(endpoint) = std::env::var("TILLBRIDGE_CREDENTIAL_ENDPOINT") {
            provider.credential_endpoint = endpoint;
        }
        if let Ok(redirect_uri) = std::env::var("TILLBRIDGE_REDIRECT_URI") {
            provider.redirect_uri = redirect_uri;
        }
    }

    fn apply_flow_env_overrides(flow: &mut FlowSettings) {
        if let Ok(platform) = std::env::var("TILLBRIDGE_PLATFORM") {
            flow.platform = platform;
        }
        if let Ok(prefix) = std::env::var("TILLBRIDGE_CALLBACK_PREFIX") {
            flow.callback_prefix = prefix;
        }
        Self::apply_numeric_env_override(
            "TILLBRIDGE_CALLBACK_TIMEOUT_SECS",
            &mut flow.callback_timeout_secs,
        );
    }

    fn apply_logging_env_overrides(logging: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging.level = log_level;
        }
    }

    /// Helper function to apply numeric environment variable overrides
    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    /// Initialize the logger with the configured default level. Safe to call
    /// more than once; later calls are ignored.
    pub fn init_logging(&self) {
        let env = env_logger::Env::default().default_filter_or(&self.logging.level);
        if env_logger::Builder::from_env(env).try_init().is_ok() {
            log::debug!("logging initialized at default level {}", self.logging.level);
        }
    }

    /// Check whether the client carries everything a sign-in attempt needs.
    ///
    /// Empty values and `your-…` template values both count as unconfigured.
    /// The first offending field is reported so diagnostics screens can name
    /// it.
    #[must_use]
    pub fn config_status(&self) -> ConfigStatus {
        let required = [
            ("provider.client_id", &self.provider.client_id),
            ("provider.api_key", &self.provider.api_key),
            (
                "provider.authorization_endpoint",
                &self.provider.authorization_endpoint,
            ),
            (
                "provider.credential_endpoint",
                &self.provider.credential_endpoint,
            ),
            ("provider.redirect_uri", &self.provider.redirect_uri),
            ("backend.base_url", &self.backend.base_url),
        ];

        for (field, value) in required {
            if value.is_empty() {
                return ConfigStatus {
                    configured: false,
                    reason: Some(format!("{field} is not set")),
                };
            }
            if is_placeholder(value) {
                return ConfigStatus {
                    configured: false,
                    reason: Some(format!("{field} is a placeholder value")),
                };
            }
        }

        ConfigStatus {
            configured: true,
            reason: None,
        }
    }

    /// Deadline for the deep-link callback race.
    #[must_use]
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.flow.callback_timeout_secs)
    }

    /// Per-request timeout for backend session calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }
}

fn is_placeholder(value: &str) -> bool {
    value.to_ascii_lowercase().starts_with(PLACEHOLDER_PREFIX)
}
