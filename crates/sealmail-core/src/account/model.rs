//! Account model types.

use serde::{Deserialize, Serialize};

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl Security {
    /// Get display name for the security mode.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::None => "None (insecure)",
            Self::Tls => "SSL/TLS",
            Self::StartTls => "STARTTLS",
        }
    }
}

/// IMAP server endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 993 for TLS, 143 for STARTTLS).
    pub port: u16,
    /// Security mode.
    pub security: Security,
}

impl ImapConfig {
    /// Create an endpoint using the default port for `security`.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(security),
            security,
        }
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None | Security::StartTls => 143,
            Security::Tls => 993,
        }
    }
}

/// SMTP server endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (default: 465 for TLS, 587 for STARTTLS).
    pub port: u16,
    /// Security mode.
    pub security: Security,
}

impl SmtpConfig {
    /// Create an endpoint using the default port for `security`.
    #[must_use]
    pub fn new(host: impl Into<String>, security: Security) -> Self {
        Self {
            host: host.into(),
            port: Self::default_port(security),
            security,
        }
    }

    /// Get default port for the security mode.
    #[must_use]
    pub const fn default_port(security: Security) -> u16 {
        match security {
            Security::None => 25,
            Security::StartTls => 587,
            Security::Tls => 465,
        }
    }
}

/// Well-known server settings for an email provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    /// Provider display name.
    pub name: &'static str,
    /// IMAP endpoint.
    pub imap: ImapConfig,
    /// SMTP endpoint.
    pub smtp: SmtpConfig,
}

impl ProviderSettings {
    /// Detect provider settings from the domain of an email address.
    ///
    /// Returns `None` for domains we have no built-in settings for.
    #[must_use]
    pub fn detect(email: &str) -> Option<Self> {
        let domain = email.rsplit_once('@')?.1.to_lowercase();
        let (name, imap, smtp) = match domain.as_str() {
            "gmail.com" | "googlemail.com" => (
                "Gmail",
                ImapConfig::new("imap.gmail.com", Security::Tls),
                SmtpConfig::new("smtp.gmail.com", Security::Tls),
            ),
            "outlook.com" | "hotmail.com" | "live.com" => (
                "Outlook",
                ImapConfig::new("outlook.office365.com", Security::Tls),
                SmtpConfig::new("smtp.office365.com", Security::StartTls),
            ),
            "yahoo.com" | "ymail.com" => (
                "Yahoo",
                ImapConfig::new("imap.mail.yahoo.com", Security::Tls),
                SmtpConfig::new("smtp.mail.yahoo.com", Security::Tls),
            ),
            "icloud.com" | "me.com" | "mac.com" => (
                "iCloud",
                ImapConfig::new("imap.mail.me.com", Security::Tls),
                SmtpConfig::new("smtp.mail.me.com", Security::StartTls),
            ),
            _ => return None,
        };
        Some(Self { name, imap, smtp })
    }
}

/// The account handed to the email transport during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescriptor {
    /// Display name used in the From header.
    pub realname: Option<String>,
    /// Email address.
    pub email_address: String,
    /// Size in bits for newly generated asymmetric keys.
    pub asym_key_size: u32,
}

/// Everything the transport needs to log in to the user's mail servers.
///
/// Obtained fresh from the authenticator on every connect.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Email address the token belongs to.
    pub email_address: String,
    /// `OAuth2` access token.
    pub oauth_token: String,
    /// Pinned server certificate (PEM), if any.
    pub ssl_cert: Option<String>,
    /// IMAP endpoint.
    pub imap: ImapConfig,
    /// SMTP endpoint.
    pub smtp: SmtpConfig,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email_address", &self.email_address)
            .field("oauth_token", &"<redacted>")
            .field("ssl_cert", &self.ssl_cert.as_ref().map(|_| "<pem>"))
            .field("imap", &self.imap)
            .field("smtp", &self.smtp)
            .finish()
    }
}
