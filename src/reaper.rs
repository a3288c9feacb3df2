//! Background deletion of broadcast messages past retention.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    base::{
        config::Config,
        types::{DeleteOutcome, Res},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// Wakes every `reaper_interval` and reaps expired messages until `cancel` fires.
pub async fn run_reaper_loop(db: DbClient, chat: ChatClient, config: Config, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(config.reaper_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reaper started.");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match reap_expired(&db, &chat, Utc::now(), config.retention(), config.reaper_batch_size).await {
            Ok(count) => {
                if count > 0 {
                    info!("Reaper: deleted {} expired messages", count);
                }
            }
            Err(e) => {
                warn!("Reaper error: {:#}", e);
            }
        }
    }

    info!("Reaper stopped.");
}

/// Deletes up to `limit` messages sent at or before `now - retention`.
///
/// The ledger entry is dropped whether or not the platform delete succeeds.
#[instrument(skip(db, chat))]
pub async fn reap_expired(db: &DbClient, chat: &ChatClient, now: DateTime<Utc>, retention: Duration, limit: usize) -> Res<usize> {
    let cutoff = now - TimeDelta::from_std(retention)?;
    let expired = db.list_expired_messages(cutoff, limit).await?;

    for message in &expired {
        match chat.delete_message(message.chat_id, message.message_id).await {
            Ok(DeleteOutcome::Deleted) => debug!("Deleted message `{}` in chat `{}`.", message.message_id, message.chat_id),
            Ok(DeleteOutcome::NotFound) => debug!("Message `{}` in chat `{}` was already gone.", message.message_id, message.chat_id),
            Err(e) => warn!("Failed to delete message `{}` in chat `{}`: {:#}", message.message_id, message.chat_id, e),
        }

        db.remove_sent_message(message.chat_id, message.message_id).await?;
    }

    Ok(expired.len())
}
