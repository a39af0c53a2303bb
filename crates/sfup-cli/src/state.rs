//! Shared application state.

use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderMap;
use axum::http::header::HOST;
use sfup_core::{LogNotifier, Notifier, SendmailNotifier, SqliteTicketStore, TransferEngine};
use sfup_files::BlobStore;

use crate::config::Config;

/// Ticket database file inside the data directory
pub const DATABASE_FILE: &str = "sfup.db";

/// Default for [`AppState::download_buffer_limit`]
pub const DEFAULT_DOWNLOAD_BUFFER_LIMIT: u64 = 64 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Transfer engine
    pub engine: Arc<TransferEngine>,
    /// Configured public base URL
    pub base_url: Option<Arc<str>>,
    /// Downloads up to this size are buffered, larger ones stream
    pub download_buffer_limit: u64,
}

impl AppState {
    /// Wrap an engine.
    pub fn new(engine: TransferEngine, base_url: Option<String>) -> Self {
        Self {
            engine: Arc::new(engine),
            base_url: base_url.map(|url| Arc::from(url.trim_end_matches('/'))),
            download_buffer_limit: DEFAULT_DOWNLOAD_BUFFER_LIMIT,
        }
    }

    /// Override the download buffering threshold.
    #[must_use]
    pub fn with_download_buffer_limit(mut self, limit: u64) -> Self {
        self.download_buffer_limit = limit;
        self
    }

    /// Open the ticket database and blob directory named by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let data_dir = &config.server.data_dir;
        let blobs = BlobStore::open(data_dir)
            .await
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

        let db_path = data_dir.join(DATABASE_FILE);
        let store = SqliteTicketStore::open(&db_path)
            .with_context(|| format!("Failed to open ticket database {}", db_path.display()))?;
        tracing::info!("Ticket database at {}", db_path.display());

        let engine = TransferEngine::new(
            Arc::new(store),
            blobs,
            notifier(config),
            config.engine_config(),
        );

        Ok(Self::new(engine, config.server.base_url.clone())
            .with_download_buffer_limit(config.server.download_buffer_limit))
    }

    /// Base URL for links in responses and notifications.
    ///
    /// Falls back to the request's `Host` header when none is configured.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.base_url {
            return url.to_string();
        }

        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .filter(|host| {
                host.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
            })
            .unwrap_or("localhost");
        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok())
            .filter(|proto| *proto == "https")
            .unwrap_or("http");

        format!("{scheme}://{host}")
    }
}

fn notifier(config: &Config) -> Arc<dyn Notifier> {
    match config.mail.backend.as_str() {
        "sendmail" => {
            tracing::info!(
                "Delivering instructions through {}",
                config.mail.sendmail_path.display()
            );
            Arc::new(SendmailNotifier::new(
                config.mail.sendmail_path.clone(),
                config.mail.from.clone(),
            ))
        }
        _ => {
            tracing::info!("Mail backend is log-only, upload instructions go to the log");
            Arc::new(LogNotifier)
        }
    }
}
