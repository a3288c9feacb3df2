//! Opt-in, opt-out, and the start greeting.

use tracing::instrument;

use crate::{
    base::{
        replies,
        types::{ChatUser, FormatMode, RosterEntry, Void},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// Handles `/start`.
pub async fn handle_start(chat_id: i64, chat: &ChatClient) -> Void {
    chat.send_message(chat_id, replies::START, FormatMode::Plain).await?;
    Ok(())
}

/// Handles `/in`.
#[instrument(skip(db, chat))]
pub async fn handle_opt_in(chat_id: i64, sender: &ChatUser, db: &DbClient, chat: &ChatClient) -> Void {
    let display_name = sender.display_name();

    db.opt_in(&RosterEntry {
        chat_id,
        user_id: sender.id,
        display_name: display_name.clone(),
    })
    .await?;

    chat.send_message(chat_id, &replies::opted_in(&display_name), FormatMode::Plain).await?;

    Ok(())
}

/// Handles `/out`.
#[instrument(skip(db, chat))]
pub async fn handle_opt_out(chat_id: i64, sender: &ChatUser, db: &DbClient, chat: &ChatClient) -> Void {
    db.opt_out(chat_id, sender.id).await?;

    chat.send_message(chat_id, &replies::opted_out(&sender.display_name()), FormatMode::Plain).await?;

    Ok(())
}
