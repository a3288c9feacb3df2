//! Usage summary across all chats.

use tracing::instrument;

use crate::{
    base::{
        replies,
        types::{FormatMode, Res, Void},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// Roster-wide counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub users: i64,
    pub chats: i64,
    /// Chats with more than one opted-in user.
    pub groups: i64,
}

#[instrument(skip_all)]
pub async fn collect_stats(db: &DbClient) -> Res<Stats> {
    Ok(Stats {
        users: db.count_distinct_users().await?,
        chats: db.count_distinct_chats().await?,
        groups: db.count_multi_user_chats().await?,
    })
}

/// Handles `/stats`.
pub async fn handle_stats(chat_id: i64, db: &DbClient, chat: &ChatClient) -> Void {
    let stats = collect_stats(db).await?;

    chat.send_message(chat_id, &replies::stats(stats.users, stats.chats, stats.groups), FormatMode::MarkdownV2)
        .await?;

    Ok(())
}
