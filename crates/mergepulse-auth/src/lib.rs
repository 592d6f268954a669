use std::collections::HashMap;
use std::sync::Mutex;

use mergepulse_core::error::PulseError;

/// Environment variable consulted before any stored token.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

const KEYRING_SERVICE: &str = "mergepulse";

/// Where bearer tokens for an API host are kept between runs.
pub trait TokenStore: Send + Sync {
    fn save_token(&self, api_host: &str, token: &str) -> Result<(), PulseError>;

    fn load_token(&self, api_host: &str) -> Result<Option<String>, PulseError>;

    /// Clearing a missing token is not an error.
    fn clear_token(&self, api_host: &str) -> Result<(), PulseError>;
}

fn credential_error(e: keyring::Error) -> PulseError {
    PulseError::Credential {
        message: e.to_string(),
    }
}

/// OS keychain store, one entry per API host.
#[derive(Default)]
pub struct KeyringTokenStore;

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self
    }

    fn entry(&self, api_host: &str) -> Result<keyring::Entry, PulseError> {
        keyring::Entry::new(KEYRING_SERVICE, api_host).map_err(credential_error)
    }
}

impl TokenStore for KeyringTokenStore {
    fn save_token(&self, api_host: &str, token: &str) -> Result<(), PulseError> {
        self.entry(api_host)?
            .set_password(token)
            .map_err(credential_error)
    }

    fn load_token(&self, api_host: &str) -> Result<Option<String>, PulseError> {
        match self.entry(api_host)?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(credential_error(e)),
        }
    }

    fn clear_token(&self, api_host: &str) -> Result<(), PulseError> {
        match self.entry(api_host)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(credential_error(e)),
        }
    }
}

/// Token store kept in process memory, for tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn save_token(&self, api_host: &str, token: &str) -> Result<(), PulseError> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(api_host.to_string(), token.to_string());
        Ok(())
    }

    fn load_token(&self, api_host: &str) -> Result<Option<String>, PulseError> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(api_host)
            .cloned())
    }

    fn clear_token(&self, api_host: &str) -> Result<(), PulseError> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(api_host);
        Ok(())
    }
}

/// Resolve the bearer token for `api_host`.
///
/// A non-empty `env_token` (normally `$GITHUB_TOKEN`) wins over the store.
pub fn resolve_token(
    store: &dyn TokenStore,
    api_host: &str,
    env_token: Option<String>,
) -> Result<String, PulseError> {
    if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
        tracing::debug!("using token from {TOKEN_ENV_VAR}");
        return Ok(token.trim().to_string());
    }
    match store.load_token(api_host)? {
        Some(token) if !token.is_empty() => {
            tracing::debug!("using stored token for {api_host}");
            Ok(token)
        }
        _ => Err(PulseError::Credential {
            message: format!(
                "no API token for {api_host}: set {TOKEN_ENV_VAR} or run `mergepulse auth set-token`"
            ),
        }),
    }
}
