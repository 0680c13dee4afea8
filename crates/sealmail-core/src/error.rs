//! Error types for the core library.

use thiserror::Error;

use crate::account::ValidationError;
use crate::auth::CredentialError;
use crate::keychain::KeychainError;
use crate::storage::StorageError;

/// Errors that can occur in account lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The email address given to `init` is malformed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// User or config storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A data migration failed.
    #[error("Migration from v{from} to v{to} failed: {reason}")]
    Migration {
        /// Version the database was at.
        from: u32,
        /// Version the migration was heading to.
        to: u32,
        /// What went wrong.
        reason: String,
    },

    /// Key material could not be fetched or refreshed.
    #[error("Keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// The email transport rejected its account.
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),

    /// Credentials could not be obtained.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Connecting to (or talking to) the mail server failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A collaborator call did not complete in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// Operation that was running.
        operation: &'static str,
        /// Configured limit.
        seconds: u64,
    },

    /// Key material or message encryption envelope error.
    #[error("PGP error: {0}")]
    Pgp(String),

    /// A message could not be queued.
    #[error("Outbox error: {0}")]
    Outbox(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
