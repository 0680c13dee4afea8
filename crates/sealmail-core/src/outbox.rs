//! Outbox: messages rendered and waiting for delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pgp::{MESSAGE_ARMOR, PgpBuilder};
use crate::storage::{DeviceStorage, StorageError, store_typed};
use crate::transport::EmailTransport;
use crate::{Error, Result};

/// User storage prefix for queued messages.
const OUTBOX_PREFIX: &str = "outbox_";

/// An email message to send.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Sender, either `addr` or `Name <addr>`.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// CC addresses.
    pub cc: Vec<String>,
    /// BCC addresses.
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body or ASCII-armored ciphertext.
    pub body: String,
}

impl OutgoingMessage {
    /// Creates a new outgoing message.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn cc(mut self, recipient: impl Into<String>) -> Self {
        self.cc.push(recipient.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn bcc(mut self, recipient: impl Into<String>) -> Self {
        self.bcc.push(recipient.into());
        self
    }

    /// Whether the body is PGP ciphertext.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.body.trim_start().starts_with(MESSAGE_ARMOR)
    }

    /// The bare sender address.
    #[must_use]
    pub fn sender_address(&self) -> &str {
        match self.from.rsplit_once('<') {
            Some((_, rest)) => rest.trim_end().trim_end_matches('>').trim(),
            None => self.from.trim(),
        }
    }

    /// Rejects header values containing line breaks.
    fn check_headers(&self) -> Result<()> {
        let fields = [("From", &self.from), ("Subject", &self.subject)]
            .into_iter()
            .chain(self.to.iter().map(|v| ("To", v)))
            .chain(self.cc.iter().map(|v| ("Cc", v)))
            .chain(self.bcc.iter().map(|v| ("Bcc", v)));

        for (name, value) in fields {
            if value.contains(['\r', '\n']) {
                return Err(Error::Outbox(format!("{name} contains a line break")));
            }
        }
        Ok(())
    }

    /// Returns all recipients (to, cc, bcc).
    fn all_recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }
}

/// A rendered message waiting in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Outbox id.
    pub id: String,
    /// When it was queued.
    pub created_at: DateTime<Utc>,
    /// Envelope recipients, BCC included.
    pub recipients: Vec<String>,
    /// RFC 5322 text.
    pub raw: String,
}

/// Queue of outgoing messages for the initialized account.
pub struct Outbox {
    user_storage: Arc<dyn DeviceStorage>,
    builder: Arc<PgpBuilder>,
    email_dao: Arc<dyn EmailTransport>,
    sequence: AtomicU32,
}

impl Outbox {
    /// Create an outbox.
    #[must_use]
    pub fn new(
        user_storage: Arc<dyn DeviceStorage>,
        builder: Arc<PgpBuilder>,
        email_dao: Arc<dyn EmailTransport>,
    ) -> Self {
        Self {
            user_storage,
            builder,
            email_dao,
            sequence: AtomicU32::new(0),
        }
    }

    /// Render and queue `message`, returning its outbox id.
    ///
    /// # Errors
    ///
    /// Returns an error if no account is initialized, the sender is not the
    /// account's address, there are no recipients, or rendering fails.
    pub async fn enqueue(&self, message: OutgoingMessage) -> Result<String> {
        message.check_headers()?;

        let account = self
            .email_dao
            .account()
            .ok_or_else(|| Error::Outbox("account is not initialized".to_string()))?;
        if !message
            .sender_address()
            .eq_ignore_ascii_case(&account.email_address)
        {
            return Err(Error::Outbox(format!(
                "cannot send as {} from {}",
                message.sender_address(),
                account.email_address
            )));
        }

        let recipients = message.all_recipients();
        if recipients.is_empty() {
            return Err(Error::Outbox("No recipients specified".to_string()));
        }

        let raw = self.builder.build(&message)?;
        let created_at = Utc::now();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("{:013}-{seq:04}", created_at.timestamp_millis());

        let queued = QueuedMessage {
            id: id.clone(),
            created_at,
            recipients,
            raw,
        };
        store_typed(
            self.user_storage.as_ref(),
            &format!("{OUTBOX_PREFIX}{id}"),
            &queued,
        )
        .await?;

        info!("Queued message {id} for {} recipients", queued.recipients.len());
        Ok(id)
    }

    /// Messages waiting for delivery, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails or holds a malformed entry.
    pub async fn pending(&self) -> Result<Vec<QueuedMessage>> {
        self.user_storage
            .list_items(OUTBOX_PREFIX)
            .await?
            .into_iter()
            .map(|(_, value)| -> Result<QueuedMessage> {
                Ok(serde_json::from_value(value).map_err(StorageError::from)?)
            })
            .collect()
    }

    /// Drop a message from the outbox, e.g. after delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.user_storage
            .remove_item(&format!("{OUTBOX_PREFIX}{id}"))
            .await?;
        debug!("Removed message {id} from outbox");
        Ok(())
    }
}
