//! Telegram Bot API integration for everyone-bot.
//!
//! This module provides the Telegram implementation of `GenericChatClient`:
//! - Long-polling `getUpdates` for commands and membership changes
//! - Sending and deleting messages
//! - Looking up the membership status of chat members

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{ChatUser, Command, DeleteOutcome, FormatMode, InboundEvent, MemberStatus, Res},
};

use super::{ChatClient, ChatError, GenericChatClient};

/// Timeout for every call except `getUpdates`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Extra methods on `ChatClient` applied by the telegram implementation.

impl ChatClient {
    /// Creates a new Telegram chat client.
    pub async fn telegram(config: &Config) -> Res<Self> {
        let client = TelegramChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    new_chat_members: Vec<User>,
    #[serde(default)]
    left_chat_member: Option<User>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl From<User> for ChatUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            is_bot: user.is_bot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    #[serde(default)]
    is_member: Option<bool>,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Serialize)]
struct MessageRef {
    chat_id: i64,
    message_id: i64,
}

#[derive(Serialize)]
struct MemberRef {
    chat_id: i64,
    user_id: i64,
}

// Mapping.

fn parse_mode(mode: FormatMode) -> Option<&'static str> {
    match mode {
        FormatMode::Plain => None,
        FormatMode::Html => Some("HTML"),
        FormatMode::MarkdownV2 => Some("MarkdownV2"),
    }
}

/// Turns a failed API response into a `ChatError`.
fn classify_error(code: i64, description: String) -> ChatError {
    let lower = description.to_lowercase();
    let no_rights = ["not enough rights", "chat_admin_required", "member list is inaccessible", "have no rights"]
        .iter()
        .any(|needle| lower.contains(needle));

    if code == 403 || (code == 400 && no_rights) {
        ChatError::PermissionDenied(description)
    } else {
        ChatError::Api { code, description }
    }
}

fn member_status(member: &ChatMember) -> Res<MemberStatus> {
    let status = match member.status.as_str() {
        "creator" => MemberStatus::Creator,
        "administrator" => MemberStatus::Administrator,
        "member" => MemberStatus::Member,
        // A restricted user may already be outside the chat.
        "restricted" if member.is_member == Some(false) => MemberStatus::Left,
        "restricted" => MemberStatus::Restricted,
        "left" => MemberStatus::Left,
        "kicked" => MemberStatus::Kicked,
        other => return Err(anyhow::anyhow!("Unknown chat member status `{other}`.")),
    };

    Ok(status)
}

/// Extracts the events the bot cares about from a single update.
fn events_from_update(update: Update, bot_username: &str) -> Vec<InboundEvent> {
    let Some(message) = update.message else {
        return Vec::new();
    };

    let chat_id = message.chat.id;
    let mut events = Vec::new();

    if let (Some(text), Some(from)) = (message.text.as_deref(), message.from)
        && let Some(command) = Command::parse(text, bot_username)
    {
        events.push(InboundEvent::Command {
            command,
            chat_id,
            sender: from.into(),
        });
    }

    for user in message.new_chat_members {
        events.push(InboundEvent::UserJoined { chat_id, user: user.into() });
    }

    if let Some(user) = message.left_chat_member {
        events.push(InboundEvent::UserLeft { chat_id, user_id: user.id });
    }

    debug!("Update `{}` (message `{}`) produced {} events.", update.update_id, message.message_id, events.len());

    events
}

// Client.

/// Telegram client implementation.
struct TelegramChatClient {
    client: reqwest::Client,
    base_url: String,
    bot_username: String,
    poll_timeout: Duration,
    offset: AtomicI64,
}

impl TelegramChatClient {
    /// Create a new Telegram chat client.
    #[instrument(name = "TelegramChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let base_url = format!("{}/bot{}", config.telegram_api_url.trim_end_matches('/'), config.telegram_token);

        let mut client = Self {
            client: reqwest::Client::new(),
            base_url,
            bot_username: String::new(),
            poll_timeout: config.poll_timeout(),
            offset: AtomicI64::new(0),
        };

        // Get the bot's handle.

        let me: User = client.call("getMe", &serde_json::json!({}), REQUEST_TIMEOUT).await?;
        client.bot_username = me.username.ok_or_else(|| anyhow::anyhow!("The bot account has no username."))?;

        info!("Telegram bot username: {}", client.bot_username);

        Ok(client)
    }

    /// Calls a Bot API method and unwraps its envelope.
    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, ChatError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        // Strip the URL from transport errors, since it carries the token.
        let response: ApiResponse<R> = self
            .client
            .post(format!("{}/{}", self.base_url, method))
            .json(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ChatError::Http(e.without_url()))?
            .json()
            .await
            .map_err(|e| ChatError::Http(e.without_url()))?;

        match response {
            ApiResponse { ok: true, result: Some(result), .. } => Ok(result),
            ApiResponse { error_code, description, .. } => Err(classify_error(
                error_code.unwrap_or_default(),
                description.unwrap_or_else(|| format!("`{method}` returned no result")),
            )),
        }
    }
}

#[async_trait]
impl GenericChatClient for TelegramChatClient {
    fn bot_username(&self) -> &str {
        &self.bot_username
    }

    async fn poll_events(&self) -> Res<Vec<InboundEvent>> {
        let request = GetUpdates {
            offset: self.offset.load(Ordering::Acquire),
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };

        let updates: Vec<Update> = self.call("getUpdates", &request, self.poll_timeout + REQUEST_TIMEOUT).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::Release);
        }

        Ok(updates.into_iter().flat_map(|update| events_from_update(update, &self.bot_username)).collect())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: i64, text: &str, mode: FormatMode) -> Res<i64> {
        let request = SendMessage {
            chat_id,
            text,
            parse_mode: parse_mode(mode),
        };

        let message: Message = self
            .call("sendMessage", &request, REQUEST_TIMEOUT)
            .await
            .map_err(|e| anyhow::Error::from(e).context("Failed to send message"))?;

        Ok(message.message_id)
    }

    #[instrument(skip(self))]
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Res<DeleteOutcome> {
        let request = MessageRef { chat_id, message_id };

        match self.call::<_, bool>("deleteMessage", &request, REQUEST_TIMEOUT).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(ChatError::Api { description, .. }) if description.to_lowercase().contains("message to delete not found") => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(anyhow::Error::from(e).context("Failed to delete message")),
        }
    }

    #[instrument(skip(self))]
    async fn get_member_status(&self, chat_id: i64, user_id: i64) -> Res<MemberStatus> {
        let request = MemberRef { chat_id, user_id };

        let member: ChatMember = self
            .call("getChatMember", &request, REQUEST_TIMEOUT)
            .await
            .map_err(|e| anyhow::Error::from(e).context("Failed to get member status"))?;

        member_status(&member)
    }
}

// Tests.
