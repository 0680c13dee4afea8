//! Minimal IMAP session: greeting, XOAUTH2 login and LOGOUT.
//!
//! Mailbox operations are out of reach here; this only establishes and
//! tears down an authenticated connection.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::account::{ImapConfig, Security};
use crate::{Error, Result};

/// Session over implicit TLS.
pub type TlsSession = ImapSession<TlsStream<TcpStream>>;

/// Generates XOAUTH2 initial response (Google/Microsoft proprietary).
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// An IMAP connection past its greeting.
pub struct ImapSession<S> {
    stream: BufReader<S>,
    counter: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ImapSession<S> {
    /// Read the server greeting from a freshly opened stream.
    ///
    /// # Errors
    ///
    /// Returns a connection error unless the server greets with OK or PREAUTH.
    pub async fn greet(stream: S) -> Result<Self> {
        let mut session = Self {
            stream: BufReader::new(stream),
            counter: 0,
        };

        let greeting = session.read_line().await?;
        if greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH") {
            debug!("IMAP greeting: {greeting}");
            Ok(session)
        } else {
            Err(Error::Connection(format!("unexpected greeting: {greeting}")))
        }
    }

    /// Authenticate with `AUTHENTICATE XOAUTH2` using an initial response.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the server rejects the token or hangs up.
    pub async fn authenticate_xoauth2(&mut self, user: &str, token: &str) -> Result<()> {
        let tag = self.next_tag();
        let command = format!(
            "{tag} AUTHENTICATE XOAUTH2 {}\r\n",
            xoauth2_response(user, token)
        );
        self.send(&command).await?;

        loop {
            let line = self.read_line().await?;
            if line.starts_with('+') {
                // Error details arrive as a challenge; an empty reply ends the exchange.
                trace!("XOAUTH2 challenge: {line}");
                self.send("\r\n").await?;
                continue;
            }
            if let Some(status) = tagged_status(&line, &tag) {
                return if status.starts_with("OK") {
                    debug!("Authenticated as {user}");
                    Ok(())
                } else {
                    Err(Error::Connection(format!("authentication failed: {status}")))
                };
            }
        }
    }

    /// Send LOGOUT and close the stream.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the stream fails before the server answers.
    pub async fn logout(mut self) -> Result<()> {
        let tag = self.next_tag();
        self.send(&format!("{tag} LOGOUT\r\n")).await?;

        loop {
            match self.read_line().await {
                Ok(line) if tagged_status(&line, &tag).is_some() => break,
                Ok(_) => {}
                // Servers may hang up right after BYE.
                Err(_) => break,
            }
        }

        self.stream.get_mut().shutdown().await?;
        Ok(())
    }

    fn next_tag(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("A{:04}", self.counter)
    }

    async fn send(&mut self, data: &str) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(data.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self.stream.read_line(&mut line).await?;
        if read == 0 {
            return Err(Error::Connection("connection closed by server".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// The status part of a tagged response for `tag`, if `line` is one.
fn tagged_status<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix(tag)?.strip_prefix(' ')
}

/// Build a TLS connector trusting the web PKI plus an optional pinned certificate.
///
/// # Errors
///
/// Returns a connection error if the pinned certificate is not valid PEM or
/// contains no certificate.
pub fn create_tls_connector(pinned_cert: Option<&str>) -> Result<TlsConnector> {
    let mut root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    if let Some(pem) = pinned_cert {
        let mut pinned = 0;
        for cert in CertificateDer::pem_slice_iter(pem.as_bytes()) {
            let cert = cert.map_err(|e| Error::Connection(format!("invalid certificate: {e}")))?;
            root_store
                .add(cert)
                .map_err(|e| Error::Connection(format!("invalid certificate: {e}")))?;
            pinned += 1;
        }
        if pinned == 0 {
            return Err(Error::Connection(
                "pinned certificate holds no PEM certificate".to_string(),
            ));
        }
        debug!("Pinned {pinned} certificates");
    }

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::aws_lc_rs::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Connection(e.to_string()))?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Open an implicit-TLS connection and read the greeting.
///
/// # Errors
///
/// Returns a connection error for non-TLS security modes, network failures or
/// a bad greeting.
pub async fn connect_tls(imap: &ImapConfig, pinned_cert: Option<&str>) -> Result<TlsSession> {
    if imap.security != Security::Tls {
        return Err(Error::Connection(format!(
            "{} is not supported, only SSL/TLS",
            imap.security.display_name()
        )));
    }

    let connector = create_tls_connector(pinned_cert)?;
    let server_name = ServerName::try_from(imap.host.clone())
        .map_err(|e| Error::Connection(format!("invalid host {}: {e}", imap.host)))?;

    let tcp = TcpStream::connect((imap.host.as_str(), imap.port))
        .await
        .map_err(|e| Error::Connection(format!("{}:{}: {e}", imap.host, imap.port)))?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Connection(format!("TLS handshake with {}: {e}", imap.host)))?;

    ImapSession::greet(tls).await
}
