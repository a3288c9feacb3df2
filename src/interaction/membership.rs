//! Keeps the roster in line with who is actually in the chat.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::{
    base::{
        replies,
        types::{ChatUser, FormatMode, Res, RosterEntry, Void},
    },
    service::{
        chat::{ChatClient, ChatError},
        db::DbClient,
    },
};

/// What an admin sweep did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The invoker is not a chat admin; nobody was queried.
    NotAdmin,
    /// The bot may not look up members; nothing was removed.
    PermissionDenied,
    /// The sweep finished and removed this many roster entries.
    Removed(usize),
}

/// Adds a human who joined the chat to its roster.
#[instrument(skip(db))]
pub async fn handle_user_joined(chat_id: i64, user: &ChatUser, db: &DbClient) -> Void {
    if user.is_bot {
        return Ok(());
    }

    let entry = RosterEntry {
        chat_id,
        user_id: user.id,
        display_name: user.display_name(),
    };

    db.opt_in(&entry).await
}

/// Drops a user who left the chat from its roster.
#[instrument(skip(db))]
pub async fn handle_user_left(chat_id: i64, user_id: i64, db: &DbClient) -> Void {
    db.remove_if_matches(chat_id, user_id).await
}

/// Removes roster entries of users who are no longer in the chat.
///
/// Members are queried one by one, `pace` apart. Removal only happens once
/// every query has succeeded, so a permission failure leaves the roster as is.
#[instrument(skip(db, chat))]
pub async fn sweep(chat_id: i64, invoker_id: i64, db: &DbClient, chat: &ChatClient, pace: Duration) -> Res<SweepOutcome> {
    match chat.get_member_status(chat_id, invoker_id).await {
        Ok(status) if status.is_admin() => {}
        Ok(_) => return Ok(SweepOutcome::NotAdmin),
        Err(err) if ChatError::is_permission_denied(&err) => return Ok(SweepOutcome::PermissionDenied),
        Err(err) => return Err(err),
    }

    let members = db.list_chat_members(chat_id).await?;
    let mut gone = Vec::new();

    for member in &members {
        tokio::time::sleep(pace).await;

        match chat.get_member_status(chat_id, member.user_id).await {
            Ok(status) if status.is_gone() => gone.push(member.user_id),
            Ok(_) => {}
            Err(err) if ChatError::is_permission_denied(&err) => {
                warn!("Sweep aborted: {:#}", err);
                return Ok(SweepOutcome::PermissionDenied);
            }
            Err(err) => return Err(err),
        }
    }

    for user_id in &gone {
        db.remove_if_matches(chat_id, *user_id).await?;
    }

    info!("Sweep checked {} users and removed {}.", members.len(), gone.len());

    Ok(SweepOutcome::Removed(gone.len()))
}

/// Handles `/clean`.
pub async fn handle_sweep(chat_id: i64, invoker: &ChatUser, db: &DbClient, chat: &ChatClient, pace: Duration) -> Void {
    let reply = match sweep(chat_id, invoker.id, db, chat, pace).await? {
        SweepOutcome::NotAdmin => replies::SWEEP_ADMIN_ONLY.to_string(),
        SweepOutcome::PermissionDenied => replies::SWEEP_NO_RIGHTS.to_string(),
        SweepOutcome::Removed(count) => replies::sweep_done(count),
    };

    chat.send_message(chat_id, &reply, FormatMode::Plain).await?;

    Ok(())
}
