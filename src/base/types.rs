use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Placeholder used when a user has neither a handle nor a given name.
pub const ANONYMOUS: &str = "anonymous";

// Persisted records.

/// A user who opted in to mentions in a chat.
///
/// Keyed by `(chat_id, user_id)`; the existence of an entry means the user
/// receives mentions in that chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub chat_id: i64,
    pub user_id: i64,
    pub display_name: String,
}

/// A broadcast message awaiting deletion once it is past retention.
///
/// Keyed by `(chat_id, message_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub created_at: DateTime<Utc>,
}

// Platform types.

/// Markup mode of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    Plain,
    Html,
    MarkdownV2,
}

/// Membership status of a user in a chat, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Creator,
    Administrator,
    Member,
    Restricted,
    Left,
    Kicked,
}

impl MemberStatus {
    /// Whether the user is no longer part of the chat.
    pub fn is_gone(&self) -> bool {
        matches!(self, MemberStatus::Left | MemberStatus::Kicked)
    }

    /// Whether the user can run admin commands.
    pub fn is_admin(&self) -> bool {
        matches!(self, MemberStatus::Creator | MemberStatus::Administrator)
    }
}

/// Result of asking the platform to delete a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Profile of the user behind an event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatUser {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub is_bot: bool,
}

impl ChatUser {
    /// Preferred handle, else given name, else [`ANONYMOUS`].
    pub fn display_name(&self) -> String {
        [self.username.as_deref(), self.first_name.as_deref()]
            .into_iter()
            .flatten()
            .find(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS)
            .to_string()
    }
}

// Inbound events.

/// Chat commands understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    OptIn,
    OptOut,
    BroadcastAll,
    Stats,
    Sweep,
}

/// Slash-command names and the command each one triggers.
pub const COMMANDS: &[(&str, Command)] = &[
    ("start", Command::Start),
    ("in", Command::OptIn),
    ("out", Command::OptOut),
    ("all", Command::BroadcastAll),
    ("stats", Command::Stats),
    ("clean", Command::Sweep),
];

impl Command {
    /// Parses the leading `/command[@bot]` token of a message.
    ///
    /// Commands addressed to a different bot are ignored.
    pub fn parse(text: &str, bot_username: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?.strip_prefix('/')?;

        let name = match token.split_once('@') {
            Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
            Some(_) => return None,
            None => token,
        };

        COMMANDS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, command)| *command)
    }
}

/// Everything the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command { command: Command, chat_id: i64, sender: ChatUser },
    UserJoined { chat_id: i64, user: ChatUser },
    UserLeft { chat_id: i64, user_id: i64 },
}

impl InboundEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Command { chat_id, .. } | InboundEvent::UserJoined { chat_id, .. } | InboundEvent::UserLeft { chat_id, .. } => *chat_id,
        }
    }
}

// Tests.
