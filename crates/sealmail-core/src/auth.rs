//! Authentication: where connection credentials come from.
//!
//! The signed-in address and server endpoints live in the app config store.
//! The `OAuth2` token lives in the platform's credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::{Credentials, ImapConfig, ProviderSettings, SmtpConfig};
use crate::storage::{DeviceStorage, get_typed, store_typed};
use crate::{Error, Result};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "sealmail";

/// Config store item holding the signed-in address.
const EMAIL_ADDRESS_KEY: &str = "emailAddress";
const IMAP_KEY: &str = "imap";
const SMTP_KEY: &str = "smtp";
const SSL_CERT_KEY: &str = "sslCert";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Nobody is signed in.
    #[error("No account is signed in")]
    NotConfigured,

    /// No token is stored for the signed-in address.
    #[error("No OAuth token stored for {0}")]
    MissingToken(String),

    /// The stored token has expired.
    #[error("OAuth token expired")]
    TokenExpired,

    /// No server settings are stored and none are known for the domain.
    #[error("No server settings for {0}")]
    NoServerSettings(String),

    /// Stored credentials could not be read or written.
    #[error("Credential storage failed: {0}")]
    Storage(String),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Hands out fresh credentials and signs the user out.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Credentials for connecting to the mail servers.
    async fn get_credentials(&self) -> Result<Credentials>;

    /// Forget everything needed to connect.
    async fn logout(&self) -> Result<()>;
}

/// Synchronous secret storage.
pub trait SecretStore: Send + Sync {
    /// Read a secret. Missing entries are `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn get_secret(&self, key: &str) -> CredentialResult<Option<String>>;

    /// Write a secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn set_secret(&self, key: &str, secret: &str) -> CredentialResult<()>;

    /// Delete a secret. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn delete_secret(&self, key: &str) -> CredentialResult<()>;
}

/// Secret storage in the system keyring.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringStore;

impl SecretStore for KeyringStore {
    fn get_secret(&self, key: &str) -> CredentialResult<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, key)?;
        match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry {key}");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_secret(&self, key: &str, secret: &str) -> CredentialResult<()> {
        let entry = Entry::new(SERVICE_NAME, key)?;
        entry.set_password(secret)?;
        debug!("Stored keyring entry {key}");
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> CredentialResult<()> {
        let entry = Entry::new(SERVICE_NAME, key)?;
        match entry.delete_credential() {
            Ok(()) => debug!("Deleted keyring entry {key}"),
            Err(keyring::Error::NoEntry) => debug!("No keyring entry {key} to delete"),
            Err(e) => {
                warn!("Failed to delete keyring entry {key}: {e}");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// `OAuth2` access token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Access token string.
    pub access_token: String,
    /// Expiration time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// Creates a token that never expires.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Checks if the token is expired (with 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| Utc::now() + Duration::seconds(60) >= exp)
    }
}

/// What [`Auth::store_credentials`] persists for a sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    /// Signed-in address.
    pub email_address: String,
    /// Token for the address.
    pub token: OAuthToken,
    /// IMAP endpoint; provider defaults apply when `None`.
    pub imap: Option<ImapConfig>,
    /// SMTP endpoint; provider defaults apply when `None`.
    pub smtp: Option<SmtpConfig>,
    /// Pinned server certificate (PEM).
    pub ssl_cert: Option<String>,
}

/// Authenticator over the app config store and a secret store.
pub struct Auth {
    app_config_store: Arc<dyn DeviceStorage>,
    secrets: Arc<dyn SecretStore>,
}

impl Auth {
    /// Create an authenticator.
    #[must_use]
    pub fn new(app_config_store: Arc<dyn DeviceStorage>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            app_config_store,
            secrets,
        }
    }

    /// Persist a sign-in so later [`Authenticator::get_credentials`] calls succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config store or secret store fails.
    pub async fn store_credentials(&self, sign_in: &SignIn) -> Result<()> {
        let store = self.app_config_store.as_ref();
        let token = serde_json::to_string(&sign_in.token)
            .map_err(|e| CredentialError::Storage(e.to_string()))?;
        self.secrets
            .set_secret(&token_key(&sign_in.email_address), &token)?;

        store_typed(store, EMAIL_ADDRESS_KEY, &sign_in.email_address)
            .await
            .map_err(storage_error)?;
        if let Some(imap) = &sign_in.imap {
            store_typed(store, IMAP_KEY, imap).await.map_err(storage_error)?;
        }
        if let Some(smtp) = &sign_in.smtp {
            store_typed(store, SMTP_KEY, smtp).await.map_err(storage_error)?;
        }
        if let Some(cert) = &sign_in.ssl_cert {
            store_typed(store, SSL_CERT_KEY, cert).await.map_err(storage_error)?;
        }

        info!("Stored credentials for {}", sign_in.email_address);
        Ok(())
    }
}

#[async_trait]
impl Authenticator for Auth {
    async fn get_credentials(&self) -> Result<Credentials> {
        let store = self.app_config_store.as_ref();
        let email_address: String = get_typed(store, EMAIL_ADDRESS_KEY)
            .await
            .map_err(storage_error)?
            .ok_or(CredentialError::NotConfigured)?;

        let token = self
            .secrets
            .get_secret(&token_key(&email_address))?
            .ok_or_else(|| CredentialError::MissingToken(email_address.clone()))?;
        let token: OAuthToken =
            serde_json::from_str(&token).map_err(|e| CredentialError::Storage(e.to_string()))?;
        if token.is_expired() {
            return Err(CredentialError::TokenExpired.into());
        }

        let provider = ProviderSettings::detect(&email_address);
        let imap = match get_typed::<ImapConfig>(store, IMAP_KEY)
            .await
            .map_err(storage_error)?
        {
            Some(imap) => imap,
            None => provider
                .as_ref()
                .map(|p| p.imap.clone())
                .ok_or_else(|| CredentialError::NoServerSettings(email_address.clone()))?,
        };
        let smtp = match get_typed::<SmtpConfig>(store, SMTP_KEY)
            .await
            .map_err(storage_error)?
        {
            Some(smtp) => smtp,
            None => provider
                .map(|p| p.smtp)
                .ok_or_else(|| CredentialError::NoServerSettings(email_address.clone()))?,
        };
        let ssl_cert = get_typed(store, SSL_CERT_KEY)
            .await
            .map_err(storage_error)?;

        Ok(Credentials {
            email_address,
            oauth_token: token.access_token,
            ssl_cert,
            imap,
            smtp,
        })
    }

    async fn logout(&self) -> Result<()> {
        let store = self.app_config_store.as_ref();
        let email_address: Option<String> = get_typed(store, EMAIL_ADDRESS_KEY)
            .await
            .map_err(storage_error)?;

        if let Some(email_address) = &email_address {
            self.secrets.delete_secret(&token_key(email_address))?;
        }
        for key in [EMAIL_ADDRESS_KEY, IMAP_KEY, SMTP_KEY, SSL_CERT_KEY] {
            store.remove_item(key).await.map_err(storage_error)?;
        }

        info!("Signed out {}", email_address.as_deref().unwrap_or("<nobody>"));
        Ok(())
    }
}

fn token_key(email_address: &str) -> String {
    format!("oauth_token_{}", email_address.to_lowercase())
}

fn storage_error(e: Error) -> CredentialError {
    CredentialError::Storage(e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::account::Security;
    use crate::storage::SqliteStorage;

    #[derive(Default)]
    struct MemorySecrets(Mutex<HashMap<String, String>>);

    impl SecretStore for MemorySecrets {
        fn get_secret(&self, key: &str) -> CredentialResult<Option<String>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        fn set_secret(&self, key: &str, secret: &str) -> CredentialResult<()> {
            self.0.lock().unwrap().insert(key.to_string(), secret.to_string());
            Ok(())
        }

        fn delete_secret(&self, key: &str) -> CredentialResult<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    async fn auth() -> (Auth, Arc<MemorySecrets>) {
        let store: Arc<dyn DeviceStorage> = Arc::new(SqliteStorage::new(None));
        store.init("app-config").await.unwrap();
        let secrets = Arc::new(MemorySecrets::default());
        (Auth::new(store, secrets.clone()), secrets)
    }

    fn sign_in(email: &str) -> SignIn {
        SignIn {
            email_address: email.to_string(),
            token: OAuthToken::new("token"),
            imap: None,
            smtp: None,
            ssl_cert: None,
        }
    }

    #[tokio::test]
    async fn test_not_signed_in() {
        let (auth, _) = auth().await;
        let err = auth.get_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Credential(CredentialError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_provider_defaults() {
        let (auth, _) = auth().await;
        auth.store_credentials(&sign_in("asdf@gmail.com")).await.unwrap();

        let credentials = auth.get_credentials().await.unwrap();
        assert_eq!(credentials.email_address, "asdf@gmail.com");
        assert_eq!(credentials.oauth_token, "token");
        assert_eq!(credentials.imap.host, "imap.gmail.com");
        assert_eq!(credentials.smtp.host, "smtp.gmail.com");
        assert!(credentials.ssl_cert.is_none());
    }

    #[tokio::test]
    async fn test_stored_endpoints_win() {
        let (auth, _) = auth().await;
        let mut sign_in = sign_in("asdf@example.com");
        sign_in.imap = Some(ImapConfig::new("imap.example.com", Security::Tls));
        sign_in.smtp = Some(SmtpConfig::new("smtp.example.com", Security::StartTls));
        sign_in.ssl_cert = Some("cert".to_string());
        auth.store_credentials(&sign_in).await.unwrap();

        let credentials = auth.get_credentials().await.unwrap();
        assert_eq!(credentials.imap.host, "imap.example.com");
        assert_eq!(credentials.smtp.port, 587);
        assert_eq!(credentials.ssl_cert.as_deref(), Some("cert"));
    }

    #[tokio::test]
    async fn test_unknown_domain_without_endpoints() {
        let (auth, _) = auth().await;
        auth.store_credentials(&sign_in("asdf@example.com")).await.unwrap();
        let err = auth.get_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Credential(CredentialError::NoServerSettings(_))));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let (auth, _) = auth().await;
        let mut sign_in = sign_in("asdf@gmail.com");
        sign_in.token = OAuthToken::new("token").with_expires_at(Utc::now());
        auth.store_credentials(&sign_in).await.unwrap();

        let err = auth.get_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Credential(CredentialError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let (auth, secrets) = auth().await;
        auth.store_credentials(&sign_in("asdf@gmail.com")).await.unwrap();
        secrets.delete_secret("oauth_token_asdf@gmail.com").unwrap();

        let err = auth.get_credentials().await.unwrap_err();
        assert!(matches!(err, Error::Credential(CredentialError::MissingToken(_))));
    }

    #[tokio::test]
    async fn test_logout_forgets_everything() {
        let (auth, secrets) = auth().await;
        auth.store_credentials(&sign_in("asdf@gmail.com")).await.unwrap();

        auth.logout().await.unwrap();

        assert!(secrets.0.lock().unwrap().is_empty());
        assert!(matches!(
            auth.get_credentials().await.unwrap_err(),
            Error::Credential(CredentialError::NotConfigured)
        ));
        // Nobody signed in is fine too
        auth.logout().await.unwrap();
    }

    #[test]
    fn test_token_expiry_buffer() {
        assert!(!OAuthToken::new("t").is_expired());
        let soon = OAuthToken::new("t").with_expires_at(Utc::now() + Duration::seconds(30));
        assert!(soon.is_expired());
        let later = OAuthToken::new("t").with_expires_at(Utc::now() + Duration::hours(1));
        assert!(!later.is_expired());
    }
}
