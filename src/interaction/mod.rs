//! Event handling and user interactions for everyone-bot.
//!
//! This module routes inbound events to their handlers:
//! - Opt-in / opt-out and the start greeting
//! - The "mention everyone" broadcast
//! - Membership changes and the admin sweep
//! - Usage stats
//!
//! Handler failures are logged and turned into a reply in the chat that
//! issued the command.

pub mod broadcast;
pub mod membership;
pub mod roster;
pub mod stats;

use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    base::{
        config::Config,
        replies,
        types::{ChatUser, Command, FormatMode, InboundEvent, Void},
    },
    service::{chat::ChatClient, db::DbClient},
};

/// Handles a single inbound event to completion.
pub async fn handle_event(event: InboundEvent, db: &DbClient, chat: &ChatClient, config: &Config) {
    let chat_id = event.chat_id();
    let is_command = matches!(event, InboundEvent::Command { .. });

    // Process the event.
    let result = handle_event_internal(event, db, chat, config).instrument(info_span!("handle_event", chat_id)).await;

    // Log any errors, and let the invoker know.
    if let Err(err) = &result {
        error!("Error while handling: {:#}", err);

        if is_command && let Err(reply_err) = chat.send_message(chat_id, &replies::failure(err), FormatMode::Plain).await {
            warn!("Failed to report the error to chat `{}`: {:#}", chat_id, reply_err);
        }
    }
}

async fn handle_event_internal(event: InboundEvent, db: &DbClient, chat: &ChatClient, config: &Config) -> Void {
    match event {
        InboundEvent::Command { command, chat_id, sender } => {
            info!("User `{}` sent {:?}.", sender.id, command);

            handle_command(command, chat_id, &sender, db, chat, config).await
        }
        InboundEvent::UserJoined { chat_id, user } => {
            info!("User `{}` joined.", user.id);

            membership::handle_user_joined(chat_id, &user, db).await
        }
        InboundEvent::UserLeft { chat_id, user_id } => {
            info!("User `{}` left.", user_id);

            membership::handle_user_left(chat_id, user_id, db).await
        }
    }
}

async fn handle_command(command: Command, chat_id: i64, sender: &ChatUser, db: &DbClient, chat: &ChatClient, config: &Config) -> Void {
    match command {
        Command::Start => roster::handle_start(chat_id, chat).await,
        Command::OptIn => roster::handle_opt_in(chat_id, sender, db, chat).await,
        Command::OptOut => roster::handle_opt_out(chat_id, sender, db, chat).await,
        Command::BroadcastAll => broadcast::handle_broadcast(chat_id, db, chat, config).await,
        Command::Stats => stats::handle_stats(chat_id, db, chat).await,
        Command::Sweep => membership::handle_sweep(chat_id, sender, db, chat, config.sweep_pace()).await,
    }
}
