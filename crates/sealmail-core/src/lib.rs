//! # sealmail-core
//!
//! Account lifecycle layer for the sealmail encrypted email client.
//!
//! This crate provides:
//! - The [`AccountController`], which wires the collaborators and runs
//!   account initialization and the connection state machine
//! - Key/value device storage (`SQLite`) and its migrations
//! - Keychain access backed by a public key server
//! - OAuth credentials kept in the system keyring
//! - An IMAP transport that logs in with XOAUTH2
//! - PGP/MIME message rendering and an outbox

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod config;
pub mod controller;
mod error;
pub mod keychain;
pub mod modules;
pub mod online;
pub mod outbox;
pub mod pgp;
pub mod report;
pub mod storage;
pub mod transport;
pub mod update;

pub use account::{
    AccountDescriptor, Credentials, ImapConfig, ProviderSettings, Security, SmtpConfig,
    ValidationError, validate_email,
};
pub use auth::{
    Auth, Authenticator, CredentialError, KeyringStore, OAuthToken, SecretStore, SignIn,
};
pub use config::AppConfig;
pub use controller::{AccountController, InitOptions, InitStage, SessionStatus};
pub use error::{Error, Result};
pub use keychain::{Keychain, KeychainError, PrivateKey, PublicKey, RefreshOptions, UserKeyPair};
pub use modules::{Modules, ModulesConfig};
pub use online::{OnlineProbe, OnlineStatus};
pub use outbox::{Outbox, OutgoingMessage, QueuedMessage};
pub use pgp::{PgpBuilder, PgpEngine};
pub use report::{ErrorSink, LogSink};
pub use storage::{DeviceStorage, SqliteStorage, StorageError};
pub use transport::{EmailDao, EmailTransport, TransportOptions};
pub use update::{UpdateHandler, Updater};
