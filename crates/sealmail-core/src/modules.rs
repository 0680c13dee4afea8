//! Collaborators the account controller drives.

use std::sync::Arc;

use crate::auth::{Auth, Authenticator, KeyringStore};
use crate::config::AppConfig;
use crate::keychain::{Keychain, KeychainDao, RestKeyServer};
use crate::online::{OnlineProbe, OnlineStatus};
use crate::outbox::Outbox;
use crate::pgp::{PgpBuilder, PgpEngine};
use crate::report::{ErrorSink, LogSink};
use crate::storage::{DeviceStorage, SqliteStorage};
use crate::transport::{EmailDao, EmailTransport};
use crate::update::{UpdateHandler, Updater};

/// Inputs for building [`Modules`].
#[derive(Clone)]
pub struct ModulesConfig {
    /// Application settings.
    pub app: AppConfig,
    /// Where errors without a caller go.
    pub on_error: Arc<dyn ErrorSink>,
    /// Network reachability.
    pub online: Arc<dyn OnlineProbe>,
}

impl ModulesConfig {
    /// Settings with a logging error sink and an always-online probe.
    #[must_use]
    pub fn new(app: AppConfig) -> Self {
        Self {
            app,
            on_error: Arc::new(LogSink),
            online: Arc::new(OnlineStatus::new(true)),
        }
    }
}

/// The controller's collaborators.
#[derive(Clone)]
pub struct Modules {
    /// Storage for settings that outlive any one account.
    pub app_config_store: Arc<dyn DeviceStorage>,
    /// Per-account storage.
    pub user_storage: Arc<dyn DeviceStorage>,
    /// Credential provider.
    pub auth: Arc<dyn Authenticator>,
    /// The user's keys.
    pub keychain: Arc<dyn Keychain>,
    /// Holder of the unlocked key pair.
    pub pgp: Arc<PgpEngine>,
    /// Message renderer.
    pub pgp_builder: Arc<PgpBuilder>,
    /// Mail server connection.
    pub email_dao: Arc<dyn EmailTransport>,
    /// Messages waiting for delivery.
    pub outbox: Arc<Outbox>,
    /// Storage migrations.
    pub update_handler: Arc<dyn UpdateHandler>,
    /// Network reachability.
    pub online: Arc<dyn OnlineProbe>,
    /// Where errors without a caller go.
    pub on_error: Arc<dyn ErrorSink>,
    /// Settings the modules were built from.
    pub config: AppConfig,
}

impl Modules {
    /// Wire the production collaborators. Opens nothing.
    #[must_use]
    pub fn build(config: ModulesConfig) -> Self {
        let ModulesConfig {
            app,
            on_error,
            online,
        } = config;

        let app_config_store: Arc<dyn DeviceStorage> =
            Arc::new(SqliteStorage::new(app.data_dir.clone()));
        let user_storage: Arc<dyn DeviceStorage> =
            Arc::new(SqliteStorage::new(app.data_dir.clone()));

        let auth = Arc::new(Auth::new(app_config_store.clone(), Arc::new(KeyringStore)));
        let keychain = Arc::new(KeychainDao::new(
            user_storage.clone(),
            Arc::new(RestKeyServer::new(app.keyserver_url.clone())),
        ));
        let pgp = Arc::new(PgpEngine::new());
        let pgp_builder = Arc::new(PgpBuilder::new(pgp.clone()));
        let email_dao: Arc<dyn EmailTransport> = Arc::new(EmailDao::new(user_storage.clone()));
        let outbox = Arc::new(Outbox::new(
            user_storage.clone(),
            pgp_builder.clone(),
            email_dao.clone(),
        ));
        let update_handler = Arc::new(Updater::new(
            app_config_store.clone(),
            user_storage.clone(),
            app.db_version,
        ));

        Self {
            app_config_store,
            user_storage,
            auth,
            keychain,
            pgp,
            pgp_builder,
            email_dao,
            outbox,
            update_handler,
            online,
            on_error,
            config: app,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_pure() {
        let modules = Modules::build(ModulesConfig::new(AppConfig::in_memory()));
        assert!(modules.email_dao.account().is_none());
        assert!(modules.online.is_online());
        assert!(!modules.pgp.has_private_key());
        assert_eq!(modules.config, AppConfig::in_memory());
    }
}
