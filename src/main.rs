use std::path::PathBuf;

use conduit_lib::ConduitApp;
use conduit_sdk::OrderNotification;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

const DATA_DIR_ENV: &str = "CONDUIT_DATA_DIR";

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("conduit-data"))
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let dir = data_dir();
    let app = ConduitApp::open(&dir)?;
    let level = app.with_manager(|m| Ok(m.config().log_level.clone()))?;
    conduit_lib::init_logging(&level);

    let identity = conduit_lib::commands::get_nostr_identity(&app)?;
    log::info!("conduit running as {} in {}", identity.npub, dir.display());

    let mut rx = app.subscribe();
    app.start().await?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
            notification = rx.recv() => match notification {
                Ok(OrderNotification::EventStored(event)) => log::info!(
                    "{} for order {} ({} unread)",
                    event.event_type,
                    event.order_id,
                    app.orders().await.unread_counts().map(|c| c.total()).unwrap_or(0)
                ),
                Ok(other) => log::debug!("{other:?}"),
                Err(RecvError::Lagged(n)) => log::warn!("missed {n} order notifications"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    app.stop().await;
    Ok(())
}
