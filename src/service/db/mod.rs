use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::base::types::{Res, RosterEntry, SentMessage, Void};

pub mod surreal;

// Traits.

/// Generic database client trait that clients must implement.
///
/// This trait covers the two durable stores of the bot: the roster of
/// opted-in users per chat, and the ledger of broadcast messages awaiting
/// deletion. Every operation is atomic for the single entry it touches.
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    // Roster.

    /// Adds a user to the chat roster, refreshing the display name if they are already on it.
    async fn opt_in(&self, entry: &RosterEntry) -> Void;

    /// Removes a user from the chat roster; does nothing if they are not on it.
    async fn opt_out(&self, chat_id: i64, user_id: i64) -> Void;

    /// Removes a user who left the chat or was found gone by a sweep.
    ///
    /// Idempotent, like [`GenericDbClient::opt_out`].
    async fn remove_if_matches(&self, chat_id: i64, user_id: i64) -> Void {
        self.opt_out(chat_id, user_id).await
    }

    /// Lists the chat roster, in a stable order.
    async fn list_chat_members(&self, chat_id: i64) -> Res<Vec<RosterEntry>>;

    /// Counts users opted in to at least one chat.
    async fn count_distinct_users(&self) -> Res<i64>;

    /// Counts chats with at least one opted-in user.
    async fn count_distinct_chats(&self) -> Res<i64>;

    /// Counts chats with two or more opted-in users.
    async fn count_multi_user_chats(&self) -> Res<i64>;

    // Ledger.

    /// Records a broadcast message that was just sent.
    async fn record_sent_message(&self, message: &SentMessage) -> Void;

    /// Lists up to `limit` ledger entries created at or before `cutoff`, oldest first.
    async fn list_expired_messages(&self, cutoff: DateTime<Utc>, limit: usize) -> Res<Vec<SentMessage>>;

    /// Removes a ledger entry; does nothing if it is already gone.
    async fn remove_sent_message(&self, chat_id: i64, message_id: i64) -> Void;
}

/// Database client for everyone-bot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    /// The database client instance.
    pub inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}
