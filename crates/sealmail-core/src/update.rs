//! Database migrations run during account initialization.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::storage::{DeviceStorage, get_typed, store_typed};
use crate::{Error, Result};

/// Key holding the user database's schema version.
pub const DB_VERSION_KEY: &str = "dbVersion";

/// Runs pending data migrations.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Bring the user database up to the current version.
    async fn update(&self) -> Result<()>;
}

/// A single migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Migration {
    /// Cached messages changed format.
    PurgeMessages,
    /// Cached folder list changed format.
    PurgeFolders,
    /// The display name moved to the app config store.
    MoveRealname,
}

impl Migration {
    /// The migration that produces `version`.
    const fn for_version(version: u32) -> Option<Self> {
        match version {
            1 => Some(Self::PurgeMessages),
            2 => Some(Self::PurgeFolders),
            3 => Some(Self::MoveRealname),
            _ => None,
        }
    }
}

/// Migrates user storage version by version.
pub struct Updater {
    app_config_store: Arc<dyn DeviceStorage>,
    user_storage: Arc<dyn DeviceStorage>,
    target_version: u32,
}

impl Updater {
    /// Create an updater migrating `user_storage` to `target_version`.
    #[must_use]
    pub fn new(
        app_config_store: Arc<dyn DeviceStorage>,
        user_storage: Arc<dyn DeviceStorage>,
        target_version: u32,
    ) -> Self {
        Self {
            app_config_store,
            user_storage,
            target_version,
        }
    }

    async fn apply(&self, migration: Migration) -> Result<()> {
        match migration {
            Migration::PurgeMessages => {
                let purged = self.user_storage.remove_prefix("email_").await?;
                debug!("Purged {purged} cached messages");
            }
            Migration::PurgeFolders => {
                self.user_storage.remove_item("folders").await?;
            }
            Migration::MoveRealname => {
                if let Some(realname) = self.user_storage.get_item("realname").await? {
                    self.app_config_store.store_item("realname", realname).await?;
                    self.user_storage.remove_item("realname").await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UpdateHandler for Updater {
    async fn update(&self) -> Result<()> {
        let current: u32 = get_typed(self.user_storage.as_ref(), DB_VERSION_KEY)
            .await?
            .unwrap_or(0);

        if current > self.target_version {
            return Err(Error::Migration {
                from: current,
                to: self.target_version,
                reason: "database was written by a newer version".to_string(),
            });
        }

        if current == self.target_version {
            debug!("User database is at v{current}");
            return Ok(());
        }

        for version in current + 1..=self.target_version {
            let migration = Migration::for_version(version).ok_or_else(|| Error::Migration {
                from: version - 1,
                to: version,
                reason: "no migration registered".to_string(),
            })?;

            self.apply(migration).await.map_err(|e| Error::Migration {
                from: version - 1,
                to: version,
                reason: e.to_string(),
            })?;
            store_typed(self.user_storage.as_ref(), DB_VERSION_KEY, &version).await?;
            info!("Migrated user database to v{version}");
        }

        Ok(())
    }
}
