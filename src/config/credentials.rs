//! Bearer credentials for the relay.
//!
//! Acquiring a token is an interactive, app-specific affair handled by a
//! [`TokenProvider`]. The [`CredentialStore`] keeps the last token, drops it
//! once expired, and only asks the provider to log in when it has nothing
//! valid.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::{ConfigError, CredentialError};

/// An access token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Bearer token.
    pub access_token: String,
    /// Expiry, in seconds since the Unix epoch.
    pub expires_at: u64,
}

impl Credentials {
    /// Create credentials expiring at `expires_at` (Unix seconds).
    pub fn new(access_token: impl Into<String>, expires_at: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Whether the token has not yet expired.
    pub fn is_valid(&self) -> bool {
        self.expires_at > now_secs()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Obtains fresh credentials, typically through an interactive login.
pub trait TokenProvider: Send + Sync {
    /// Log in and return new credentials.
    fn login(&self) -> impl Future<Output = Result<Credentials, CredentialError>> + Send;
}

#[derive(Debug)]
enum Backing {
    Memory(Mutex<Option<Credentials>>),
    #[cfg(feature = "persistence")]
    File(std::path::PathBuf),
}

/// Local storage for the access token.
#[derive(Debug)]
pub struct CredentialStore {
    backing: Backing,
}

impl CredentialStore {
    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(None)),
        }
    }

    /// A store backed by a JSON file.
    #[cfg(feature = "persistence")]
    pub fn at_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// Stored credentials, if present and not expired.
    pub fn credentials(&self) -> Option<Credentials> {
        let stored = match self.load() {
            Ok(stored) => stored?,
            Err(err) => {
                tracing::debug!(%err, "credentials not readable");
                return None;
            }
        };
        if !stored.is_valid() {
            tracing::debug!(expires_at = stored.expires_at, "credentials expired");
            return None;
        }
        Some(stored)
    }

    /// The current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.credentials().map(|c| c.access_token)
    }

    /// Replace the stored credentials.
    pub fn store(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        match &self.backing {
            Backing::Memory(slot) => {
                *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
                Ok(())
            }
            #[cfg(feature = "persistence")]
            Backing::File(path) => write_json(path, credentials).map_err(CredentialError::CouldNotStore),
        }
    }

    /// Log in through `provider` unless valid credentials are already stored.
    ///
    /// Freshly obtained credentials are stored; a failure to store them is
    /// logged and the credentials are still returned.
    pub async fn login_if_needed<P: TokenProvider>(
        &self,
        provider: &P,
    ) -> Result<Credentials, CredentialError> {
        if let Some(existing) = self.credentials() {
            tracing::debug!("using stored credentials");
            return Ok(existing);
        }
        let fresh = provider.login().await?;
        if let Err(err) = self.store(&fresh) {
            tracing::warn!(%err, "failed to store credentials after login");
        }
        Ok(fresh)
    }

    /// Drop any stored credentials.
    pub fn logout(&self) -> Result<(), CredentialError> {
        match &self.backing {
            Backing::Memory(slot) => {
                slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                Ok(())
            }
            #[cfg(feature = "persistence")]
            Backing::File(path) => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(CredentialError::LogoutFailure(e.into())),
            },
        }
    }

    fn load(&self) -> Result<Option<Credentials>, ConfigError> {
        match &self.backing {
            Backing::Memory(slot) => Ok(slot.lock().unwrap_or_else(PoisonError::into_inner).clone()),
            #[cfg(feature = "persistence")]
            Backing::File(path) => match std::fs::read_to_string(path) {
                Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(feature = "persistence")]
fn write_json(path: &std::path::Path, credentials: &Credentials) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string(credentials)?)?;
    Ok(())
}
