//! `sealmail` - encrypted email client
//!
//! Opens an account, connects it and stays online until interrupted.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sealmail_core::{
    AccountController, Auth, InitOptions, KeyringStore, ModulesConfig, OAuthToken, SignIn,
    config,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the account to open
    email_address: String,

    /// Display name for outgoing mail
    #[arg(long)]
    realname: Option<String>,

    /// Access token to store in the keyring before connecting
    #[arg(long, env = "SEALMAIL_OAUTH_TOKEN", hide_env_values = true)]
    oauth_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sealmail=debug,sealmail_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sealmail");

    let args = Args::parse();

    let first_run = !config::config_path().exists();
    let app = config::load().await.context("failed to load configuration")?;
    if first_run {
        config::save(&app).await.context("failed to write configuration")?;
    }

    let modules_config = ModulesConfig::new(app);
    let mut controller = AccountController::new(modules_config.clone());
    controller
        .start(modules_config)
        .await
        .context("failed to start")?;

    if let Some(token) = args.oauth_token {
        let auth = Auth::new(
            controller.modules().app_config_store.clone(),
            Arc::new(KeyringStore),
        );
        auth.store_credentials(&SignIn {
            email_address: args.email_address.clone(),
            token: OAuthToken::new(token),
            imap: None,
            smtp: None,
            ssl_cert: None,
        })
        .await
        .context("failed to store credentials")?;
    }

    let mut options = InitOptions::new(args.email_address);
    options.realname = args.realname;
    let keys = controller
        .init(options)
        .await
        .context("failed to initialize account")?;
    if keys.is_some() {
        warn!("No key pair on record; generate keys before sending encrypted mail");
    }

    controller.on_connect().await.context("failed to connect")?;
    info!("Status: {:?}", controller.status());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    controller.on_disconnect().await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_only() {
        let args = Args::try_parse_from(["sealmail", "alice@bob.com"]).unwrap();
        assert_eq!(args.email_address, "alice@bob.com");
        assert!(args.realname.is_none());
    }

    #[test]
    fn test_parse_realname() {
        let args =
            Args::try_parse_from(["sealmail", "--realname", "Alice", "alice@bob.com"]).unwrap();
        assert_eq!(args.email_address, "alice@bob.com");
        assert_eq!(args.realname.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_parse_token_flag() {
        let args =
            Args::try_parse_from(["sealmail", "alice@bob.com", "--oauth-token", "t0k"]).unwrap();
        assert_eq!(args.oauth_token.as_deref(), Some("t0k"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Args::try_parse_from(["sealmail"]).is_err());
        assert!(Args::try_parse_from(["sealmail", "alice@bob.com", "--realname"]).is_err());
        assert!(Args::try_parse_from(["sealmail", "alice@bob.com", "--verbose"]).is_err());
        assert!(Args::try_parse_from(["sealmail", "alice@bob.com", "bob@bob.com"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
