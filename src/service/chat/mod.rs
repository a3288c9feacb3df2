pub mod telegram;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{DeleteOutcome, FormatMode, InboundEvent, MemberStatus, Res};

// Errors.

/// Failures reported by the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The bot lacks the rights to perform the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The platform rejected the request.
    #[error("chat API error {code}: {description}")]
    Api { code: i64, description: String },
    /// The platform could not be reached.
    #[error("chat transport error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ChatError {
    /// Whether `err` (anywhere in its chain) is a [`ChatError::PermissionDenied`].
    pub fn is_permission_denied(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| matches!(cause.downcast_ref::<ChatError>(), Some(ChatError::PermissionDenied(_))))
    }
}

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the inbound event source and the outbound calls the
/// bot needs from a chat platform. Implementing this trait allows different
/// chat services to be used with the everyone-bot.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot's own handle.
    ///
    /// Used to tell commands addressed to this bot apart from those
    /// addressed to other bots in the same chat.
    fn bot_username(&self) -> &str;

    /// Wait for the next batch of inbound events.
    ///
    /// Returns an empty batch when the poll times out with nothing new.
    async fn poll_events(&self) -> Res<Vec<InboundEvent>>;

    /// Send a message to a chat, returning the platform message ID.
    async fn send_message(&self, chat_id: i64, text: &str, mode: FormatMode) -> Res<i64>;

    /// Delete a previously sent message.
    ///
    /// A message that no longer exists is reported as [`DeleteOutcome::NotFound`] rather than an error.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Res<DeleteOutcome>;

    /// Get the current membership status of a user in a chat.
    ///
    /// Fails with [`ChatError::PermissionDenied`] when the bot may not look up members.
    async fn get_member_status(&self, chat_id: i64, user_id: i64) -> Res<MemberStatus>;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}
