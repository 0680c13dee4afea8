//! IMAP-backed email transport.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::{TlsSession, connect_tls};
use super::{EmailTransport, TransportOptions};
use crate::account::{AccountDescriptor, Credentials, SmtpConfig};
use crate::storage::{DeviceStorage, get_typed};
use crate::{Error, Result};

/// Smallest key size the transport accepts for key generation.
const MIN_ASYM_KEY_SIZE: u32 = 1024;

/// User storage item caching the folder list.
const FOLDERS_KEY: &str = "folders";

struct Connection {
    session: TlsSession,
    smtp: SmtpConfig,
}

/// Email transport for a single account.
pub struct EmailDao {
    user_storage: Arc<dyn DeviceStorage>,
    account: RwLock<Option<AccountDescriptor>>,
    folders: RwLock<Vec<String>>,
    connection: Mutex<Option<Connection>>,
}

impl EmailDao {
    /// Create a transport with no account.
    #[must_use]
    pub fn new(user_storage: Arc<dyn DeviceStorage>) -> Self {
        Self {
            user_storage,
            account: RwLock::new(None),
            folders: RwLock::new(Vec::new()),
            connection: Mutex::new(None),
        }
    }

    /// Folder names cached from the last session.
    #[must_use]
    pub fn folders(&self) -> Vec<String> {
        self.folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an authenticated session is open.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// SMTP endpoint of the open session.
    pub async fn smtp_config(&self) -> Option<SmtpConfig> {
        self.connection.lock().await.as_ref().map(|c| c.smtp.clone())
    }
}

#[async_trait]
impl EmailTransport for EmailDao {
    fn account(&self) -> Option<AccountDescriptor> {
        self.account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn init(&self, options: TransportOptions) -> Result<()> {
        let account = options.account;
        if account.asym_key_size < MIN_ASYM_KEY_SIZE {
            return Err(Error::TransportInit(format!(
                "key size {} is below {MIN_ASYM_KEY_SIZE} bits",
                account.asym_key_size
            )));
        }

        let folders: Vec<String> = get_typed(self.user_storage.as_ref(), FOLDERS_KEY)
            .await
            .map_err(|e| Error::TransportInit(e.to_string()))?
            .unwrap_or_default();
        debug!("Loaded {} cached folders", folders.len());

        *self.folders.write().unwrap_or_else(PoisonError::into_inner) = folders;
        info!("Email transport ready for {}", account.email_address);
        *self.account.write().unwrap_or_else(PoisonError::into_inner) = Some(account);
        Ok(())
    }

    fn clear_account(&self) {
        if let Some(account) = self
            .account
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            debug!("Cleared account {}", account.email_address);
        }
        self.folders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn on_connect(&self, credentials: Credentials) -> Result<()> {
        let account = self
            .account()
            .ok_or_else(|| Error::Connection("account is not initialized".to_string()))?;
        if !credentials
            .email_address
            .eq_ignore_ascii_case(&account.email_address)
        {
            return Err(Error::Connection(format!(
                "credentials are for {}, account is {}",
                credentials.email_address, account.email_address
            )));
        }

        // Connect unlocked; the lock is only held to swap sessions.
        let mut session = connect_tls(&credentials.imap, credentials.ssl_cert.as_deref()).await?;
        session
            .authenticate_xoauth2(&credentials.email_address, &credentials.oauth_token)
            .await?;
        info!("Connected to {}", credentials.imap.host);

        let previous = self.connection.lock().await.replace(Connection {
            session,
            smtp: credentials.smtp,
        });
        if let Some(previous) = previous {
            if let Err(e) = previous.session.logout().await {
                warn!("Failed to close previous session: {e}");
            }
        }
        Ok(())
    }

    async fn on_disconnect(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().await.take() else {
            debug!("Not connected, nothing to disconnect");
            return Ok(());
        };
        connection.session.logout().await?;
        info!("Disconnected");
        Ok(())
    }
}
