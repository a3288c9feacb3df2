//! Runtime services and shared state for the everyone-bot.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{Res, Void},
    },
    interaction, reaper,
    service::{chat::ChatClient, db::DbClient},
};

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runtime service context that can be shared across the application.
///
/// This struct holds the database client, chat client, and configuration.
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct Runtime {
    /// The configuration for the application.
    pub config: Config,
    /// The database client instance.
    pub db: DbClient,
    /// The chat client instance.
    pub chat: ChatClient,
}

impl Runtime {
    /// Create a new runtime instance.
    #[instrument(skip_all)]
    pub async fn new(config: Config) -> Res<Self> {
        // Initialize the database.
        let db = DbClient::surreal(&config).await?;

        // Initialize the chat client.
        let chat = ChatClient::telegram(&config).await?;

        Ok(Self { config, db, chat })
    }

    /// Runs the event loop and the reaper until Ctrl-C.
    pub async fn start(&self) -> Void {
        let cancel = CancellationToken::new();

        // Stop everything on Ctrl-C.

        let shutdown = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down ...");
                shutdown.cancel();
            }
        });

        // Start the reaper alongside the event loop.

        let reaper = tokio::spawn(reaper::run_reaper_loop(self.db.clone(), self.chat.clone(), self.config.clone(), cancel.child_token()));

        self.run(cancel.clone()).await;

        cancel.cancel();
        reaper.await?;

        Ok(())
    }

    /// Polls for events and handles them one at a time until `cancel` fires.
    ///
    /// Events already received are handled before the loop notices cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        info!("Listening for events ...");

        loop {
            let polled = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                polled = self.chat.poll_events() => polled,
            };

            match polled {
                Ok(events) => {
                    for event in events {
                        interaction::handle_event(event, &self.db, &self.chat, &self.config).await;
                    }
                }
                Err(e) => {
                    warn!("Failed to poll events: {:#}", e);

                    tokio::select! {
                        biased;

                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }
}
