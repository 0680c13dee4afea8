//! Email transport.
//!
//! Owns the account the client is operating on and its connection to the
//! mail servers.

mod dao;
pub mod session;

use async_trait::async_trait;

use crate::Result;
use crate::account::{AccountDescriptor, Credentials};

pub use dao::EmailDao;

/// Arguments for [`EmailTransport::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// The account to operate on.
    pub account: AccountDescriptor,
}

/// Connection lifecycle of the email transport.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// The initialized account, or `None` before [`EmailTransport::init`].
    fn account(&self) -> Option<AccountDescriptor>;

    /// Set up the transport for an account. No network access.
    async fn init(&self, options: TransportOptions) -> Result<()>;

    /// Forget the account set by [`EmailTransport::init`].
    fn clear_account(&self);

    /// Log in to the mail servers with fresh credentials.
    async fn on_connect(&self, credentials: Credentials) -> Result<()>;

    /// Tear down the connection, if any.
    async fn on_disconnect(&self) -> Result<()>;
}
