//! Periodic removal of expired tickets.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sfup_core::TransferEngine;
use sfup_core::ticket::unix_now;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Run one sweep.
///
/// # Errors
///
/// Returns an error if the ticket store or blob directory cannot be read.
pub async fn run_once(engine: &TransferEngine) -> anyhow::Result<usize> {
    let swept = engine
        .sweep_expired(unix_now())
        .await
        .context("Expiry sweep failed")?;

    if swept > 0 {
        tracing::info!("Swept {} expired tickets", swept);
    } else {
        tracing::debug!("Sweep found nothing to remove");
    }
    Ok(swept)
}

/// Sweep every `period` until the returned task is aborted.
///
/// The first sweep runs immediately.
pub fn spawn(engine: Arc<TransferEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // the next tick retries
            if let Err(e) = run_once(&engine).await {
                tracing::error!("{:#}", e);
            }
        }
    })
}
