//! Account lifecycle: module wiring, initialization and connection state.
//!
//! [`AccountController::init`] runs its steps strictly in order and stops at
//! the first failure, returning that failure unchanged:
//!
//! 1. validate the email address
//! 2. open the user's storage
//! 3. run pending storage migrations
//! 4. fetch the user's key pair
//! 5. refresh the public key against the key server
//! 6. hand the account to the email transport
//!
//! Connection management ([`AccountController::on_connect`] and friends) only
//! acts once the transport knows its account.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::account::{AccountDescriptor, validate_email};
use crate::keychain::{RefreshOptions, UserKeyPair};
use crate::modules::{Modules, ModulesConfig};
use crate::transport::TransportOptions;
use crate::{Error, Result};

/// Name of the app config store database.
pub const APP_CONFIG_DB: &str = "app-config";

/// Steps of [`AccountController::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitStage {
    /// Checking the email address.
    Validating,
    /// Opening user storage.
    StorageInit,
    /// Running storage migrations.
    Migrating,
    /// Loading the key pair.
    KeyFetch,
    /// Checking the public key against the key server.
    KeyRefresh,
    /// Initializing the email transport.
    TransportInit,
    /// All steps done.
    Ready,
}

impl InitStage {
    /// Short name used in logs and timeout errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Validating => "validation",
            Self::StorageInit => "storage init",
            Self::Migrating => "migration",
            Self::KeyFetch => "key fetch",
            Self::KeyRefresh => "key refresh",
            Self::TransportInit => "transport init",
            Self::Ready => "ready",
        }
    }
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the controller's session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No account has been initialized.
    #[default]
    Uninitialized,
    /// `init` is running the given step.
    Initializing(InitStage),
    /// Account initialized, not connected.
    Ready,
    /// Connected to the mail servers.
    Online,
    /// `init` failed at the given step.
    Failed(InitStage),
}

/// Arguments for [`AccountController::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// The account's address; also names the user storage.
    pub email_address: String,
    /// Display name for outgoing mail.
    pub realname: Option<String>,
}

impl InitOptions {
    /// Options for `email_address` without a display name.
    #[must_use]
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            realname: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn realname(mut self, realname: impl Into<String>) -> Self {
        self.realname = Some(realname.into());
        self
    }
}

/// Drives the account lifecycle over its [`Modules`].
pub struct AccountController {
    modules: Modules,
    status: Mutex<SessionStatus>,
}

impl AccountController {
    /// Create a controller with freshly built production modules.
    #[must_use]
    pub fn new(config: ModulesConfig) -> Self {
        Self::with_modules(Modules::build(config))
    }

    /// Create a controller over the given modules.
    #[must_use]
    pub const fn with_modules(modules: Modules) -> Self {
        Self {
            modules,
            status: Mutex::new(SessionStatus::Uninitialized),
        }
    }

    /// The current modules.
    #[must_use]
    pub const fn modules(&self) -> &Modules {
        &self.modules
    }

    /// The current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace every module with a new production set.
    pub fn build_modules(&mut self, config: ModulesConfig) {
        self.modules = Modules::build(config);
        self.set_status(SessionStatus::Uninitialized);
        debug!("Modules built");
    }

    /// Build the modules and open the app config store.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the app config store cannot be opened.
    pub async fn start(&mut self, config: ModulesConfig) -> Result<()> {
        self.build_modules(config);
        let store = &self.modules.app_config_store;
        self.bounded("app config init", store.init(APP_CONFIG_DB))
            .await
            .inspect_err(|e| warn!("Failed to open app config store: {e}"))?;
        info!("Started");
        Ok(())
    }

    /// Initialize the account for `options.email_address`.
    ///
    /// Returns the fetched key pair when it holds no public key, meaning the
    /// caller must generate keys for a first-time user. Otherwise `None`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error unchanged. A malformed address
    /// fails before any collaborator is called.
    pub async fn init(&self, options: InitOptions) -> Result<Option<UserKeyPair>> {
        let InitOptions {
            email_address,
            realname,
        } = options;
        let m = &self.modules;

        self.step(InitStage::Validating, async {
            validate_email(&email_address).map_err(Error::from)
        })
        .await?;

        self.step(InitStage::StorageInit, m.user_storage.init(&email_address))
            .await?;
        self.step(InitStage::Migrating, m.update_handler.update())
            .await?;

        let keys = self
            .step(InitStage::KeyFetch, m.keychain.get_user_key_pair(&email_address))
            .await?;

        let refreshed = self
            .step(
                InitStage::KeyRefresh,
                m.keychain.refresh_key_for_user_id(RefreshOptions {
                    user_id: email_address.clone(),
                    override_permission: true,
                }),
            )
            .await?;
        if refreshed.is_none() && keys.public_key.is_some() {
            info!("Public key for {email_address} is gone from the key server");
        }

        let account = AccountDescriptor {
            realname,
            email_address,
            asym_key_size: m.config.asym_key_size,
        };
        self.step(
            InitStage::TransportInit,
            m.email_dao.init(TransportOptions { account }),
        )
        .await?;

        self.set_status(SessionStatus::Ready);
        info!("Account initialized");
        Ok(keys.public_key.is_none().then_some(keys))
    }

    /// Connect the transport if the device is online and an account is set.
    ///
    /// Does nothing, successfully, when offline or uninitialized.
    ///
    /// # Errors
    ///
    /// Returns the credential or transport error unchanged.
    pub async fn on_connect(&self) -> Result<()> {
        let m = &self.modules;
        if !m.online.is_online() {
            debug!("Offline, not connecting");
            return Ok(());
        }
        if m.email_dao.account().is_none() {
            debug!("No account, not connecting");
            return Ok(());
        }

        let credentials = self
            .bounded("credentials", m.auth.get_credentials())
            .await?;
        self.bounded("connect", m.email_dao.on_connect(credentials))
            .await?;

        self.set_status(SessionStatus::Online);
        info!("Online");
        Ok(())
    }

    /// Disconnect the transport. Failures are logged and dropped.
    pub async fn on_disconnect(&self) {
        if let Err(e) = self
            .bounded("disconnect", self.modules.email_dao.on_disconnect())
            .await
        {
            warn!("Disconnect failed: {e}");
        }

        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == SessionStatus::Online {
            *status = SessionStatus::Ready;
        }
    }

    /// Sign out, disconnect and forget the account. Failures go to the error
    /// sink. A later [`AccountController::on_connect`] does nothing until the
    /// next successful `init`.
    pub async fn logout(&self) {
        let m = &self.modules;
        if let Err(e) = self.bounded("logout", m.auth.logout()).await {
            m.on_error.report(&e);
        }
        if let Err(e) = self.bounded("disconnect", m.email_dao.on_disconnect()).await {
            m.on_error.report(&e);
        }
        m.email_dao.clear_account();

        self.set_status(SessionStatus::Uninitialized);
        info!("Logged out");
    }

    async fn step<T>(&self, stage: InitStage, call: impl Future<Output = Result<T>>) -> Result<T> {
        self.set_status(SessionStatus::Initializing(stage));
        debug!("Init step: {stage}");
        self.bounded(stage.name(), call).await.inspect_err(|e| {
            warn!("Init failed at {stage}: {e}");
            self.set_status(SessionStatus::Failed(stage));
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let Some(limit) = self.modules.config.step_timeout() else {
            return call.await;
        };
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::Timeout {
                operation,
                seconds: limit.as_secs(),
            })?
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(InitStage::KeyRefresh.to_string(), "key refresh");
        assert_eq!(InitStage::TransportInit.name(), "transport init");
    }

    #[test]
    fn test_init_options() {
        let options = InitOptions::new("alice@bob.com").realname("Alice");
        assert_eq!(options.email_address, "alice@bob.com");
        assert_eq!(options.realname.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_new_controller_is_uninitialized() {
        let controller = AccountController::new(ModulesConfig::new(crate::AppConfig::in_memory()));
        assert_eq!(controller.status(), SessionStatus::Uninitialized);
        assert!(controller.modules().email_dao.account().is_none());
    }
}
