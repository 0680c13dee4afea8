//! Account model types.
//!
//! Provides the account descriptor, connection credentials and address
//! validation.

mod model;
mod validation;

pub use model::{
    AccountDescriptor, Credentials, ImapConfig, ProviderSettings, Security, SmtpConfig,
};
pub use validation::{ValidationError, ValidationResult, validate_email};
