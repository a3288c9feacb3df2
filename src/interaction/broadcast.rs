//! The "mention everyone" broadcast.
//!
//! Mentions are rendered from the chat roster, split into fixed-size batches,
//! and sent one message per batch. Each sent message is recorded in the
//! ledger so the reaper can delete it once it is past retention.

use anyhow::Context;
use chrono::Utc;
use tracing::{info, instrument};

use crate::{
    base::{
        config::Config,
        replies,
        types::{FormatMode, Res, RosterEntry, SentMessage, Void},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// What a broadcast did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Nobody in the chat has opted in; nothing was sent.
    NoUsers,
    /// Every batch was sent.
    Sent { messages: usize, mentions: usize },
}

/// Escapes the characters HTML markup reserves.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}

/// Renders a mention link for a roster entry.
///
/// The display name is cut to `max_chars` characters before escaping, so
/// escape sequences never count against the limit.
pub fn render_mention(entry: &RosterEntry, max_chars: usize) -> String {
    let name: String = entry.display_name.chars().take(max_chars).collect();

    format!(r#"<a href="tg://user?id={}">{}</a>"#, entry.user_id, escape_html(&name))
}

/// Renders the roster into message bodies of at most `chunk_size` mentions each.
pub fn mention_batches(members: &[RosterEntry], chunk_size: usize, max_chars: usize) -> Vec<String> {
    members
        .chunks(chunk_size.max(1))
        .map(|chunk| chunk.iter().map(|entry| render_mention(entry, max_chars)).collect::<Vec<_>>().join(" "))
        .collect()
}

/// Mentions every opted-in member of the chat.
///
/// Batches are sent strictly in order. The first failed send (or ledger
/// write) stops the broadcast; messages already sent stay sent.
#[instrument(skip(db, chat, config))]
pub async fn broadcast(chat_id: i64, db: &DbClient, chat: &ChatClient, config: &Config) -> Res<BroadcastOutcome> {
    let members = db.list_chat_members(chat_id).await?;

    if members.is_empty() {
        return Ok(BroadcastOutcome::NoUsers);
    }

    let batches = mention_batches(&members, config.broadcast_chunk_size, config.mention_name_max_chars);
    let total = batches.len();

    for (sent, body) in batches.iter().enumerate() {
        let message_id = chat
            .send_message(chat_id, body, FormatMode::Html)
            .await
            .with_context(|| format!("Broadcast stopped after {sent} of {total} messages"))?;

        let record = SentMessage {
            chat_id,
            message_id,
            created_at: Utc::now(),
        };

        db.record_sent_message(&record)
            .await
            .with_context(|| format!("Broadcast stopped after {} of {total} messages", sent + 1))?;
    }

    info!("Mentioned {} users in {} messages.", members.len(), total);

    Ok(BroadcastOutcome::Sent {
        messages: total,
        mentions: members.len(),
    })
}

/// Handles `/all`.
pub async fn handle_broadcast(chat_id: i64, db: &DbClient, chat: &ChatClient, config: &Config) -> Void {
    if broadcast(chat_id, db, chat, config).await? == BroadcastOutcome::NoUsers {
        chat.send_message(chat_id, replies::NO_USERS, FormatMode::Plain).await?;
    }

    Ok(())
}

// Tests.
