//! boothmark server entry point.
//!
//! Boots the MCP server on stdio transport for the configured user.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use boothmark_client::PostgrestClient;
use boothmark_core::{AppConfig, CacheStore, NotificationLevel, PrefsDb, Session, UserId};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let user_id = UserId::new(config.require_user_id()?);

    let client = Arc::new(PostgrestClient::from_app_config(&config)?);
    let prefs = PrefsDb::open(&config.prefs_path).await?;
    let session = Session::start(client.clone(), CacheStore::new(), prefs, user_id)
        .await?
        .with_sign_out(client);
    let session = Arc::new(session);

    let mut notifications = session.notifications();
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(n) => match n.level {
                    NotificationLevel::Success => tracing::info!(command = %n.command, item_id = %n.item_id, "{}", n.message),
                    NotificationLevel::Error => tracing::warn!(command = %n.command, item_id = %n.item_id, "{}", n.message),
                },
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "notification log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tracing::info!(user_id = %session.user_id(), "Starting boothmark server on stdio transport");

    let handler = handler::BoothmarkServer::new(session);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
