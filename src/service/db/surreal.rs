//! SurrealDB implementation for everyone-bot data storage.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::{
    Surreal,
    engine::any::{self, Any},
    opt::auth::Root,
};
use tracing::{debug, info, instrument};

use crate::base::{
    config::Config,
    types::{Res, RosterEntry, SentMessage, Void},
};

use super::{DbClient, GenericDbClient};

// Schema.

const SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS roster SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS chat_id ON roster TYPE int;
DEFINE FIELD IF NOT EXISTS user_id ON roster TYPE int;
DEFINE FIELD IF NOT EXISTS display_name ON roster TYPE string;
DEFINE INDEX IF NOT EXISTS roster_chat ON roster FIELDS chat_id;

DEFINE TABLE IF NOT EXISTS sent_message SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS chat_id ON sent_message TYPE int;
DEFINE FIELD IF NOT EXISTS message_id ON sent_message TYPE int;
DEFINE FIELD IF NOT EXISTS created_at ON sent_message TYPE int;
DEFINE INDEX IF NOT EXISTS sent_message_created ON sent_message FIELDS created_at;
"#;

// Extra methods on `DbClient` applied by the surreal implementation.

impl DbClient {
    /// Connects to the configured SurrealDB endpoint.
    pub async fn surreal(config: &Config) -> Res<Self> {
        let client = SurrealDbClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }

    /// Creates a fresh in-memory database, mostly useful for tests.
    pub async fn surreal_memory() -> Res<Self> {
        let client = SurrealDbClient::memory().await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Rows.

#[derive(Debug, Deserialize)]
struct SentMessageRow {
    chat_id: i64,
    message_id: i64,
    /// Unix milliseconds.
    created_at: i64,
}

impl TryFrom<SentMessageRow> for SentMessage {
    type Error = anyhow::Error;

    fn try_from(row: SentMessageRow) -> Res<Self> {
        let created_at = DateTime::from_timestamp_millis(row.created_at).ok_or_else(|| anyhow!("Invalid timestamp `{}` on sent message.", row.created_at))?;

        Ok(Self {
            chat_id: row.chat_id,
            message_id: row.message_id,
            created_at,
        })
    }
}

// Client.

/// SurrealDB client implementation.
#[derive(Clone)]
pub struct SurrealDbClient {
    db: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connect, sign in (if credentials are configured), and define the schema.
    #[instrument(name = "SurrealDbClient::new", skip_all, fields(endpoint = %config.db_endpoint))]
    pub async fn new(config: &Config) -> Res<Self> {
        let db = any::connect(config.db_endpoint.as_str()).await?;

        if !config.db_username.is_empty() {
            db.signin(Root {
                username: &config.db_username,
                password: &config.db_password,
            })
            .await?;
        }

        db.use_ns(config.db_namespace.as_str()).use_db(config.db_database.as_str()).await?;

        let client = Self { db };
        client.define_schema().await?;

        info!("Database initialized successfully.");

        Ok(client)
    }

    /// Fresh in-memory database.
    pub async fn memory() -> Res<Self> {
        let db = any::connect("mem://").await?;
        db.use_ns("everyone").use_db("bot").await?;

        let client = Self { db };
        client.define_schema().await?;

        Ok(client)
    }

    async fn define_schema(&self) -> Void {
        self.db.query(SCHEMA).await?.check()?;
        Ok(())
    }

    /// Runs a `SELECT count() ... GROUP ALL` query and returns the count (zero for no rows).
    async fn count(&self, query: &'static str) -> Res<i64> {
        let mut response = self.db.query(query).await?;
        let count: Option<i64> = response.take((0, "count"))?;

        Ok(count.unwrap_or(0))
    }
}

#[async_trait]
impl GenericDbClient for SurrealDbClient {
    #[instrument(skip(self))]
    async fn opt_in(&self, entry: &RosterEntry) -> Void {
        self.db
            .query("UPSERT type::thing('roster', [$chat_id, $user_id]) SET chat_id = $chat_id, user_id = $user_id, display_name = $display_name RETURN NONE;")
            .bind(("chat_id", entry.chat_id))
            .bind(("user_id", entry.user_id))
            .bind(("display_name", entry.display_name.clone()))
            .await?
            .check()?;

        debug!("User `{}` opted in to chat `{}`.", entry.user_id, entry.chat_id);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn opt_out(&self, chat_id: i64, user_id: i64) -> Void {
        self.db
            .query("DELETE type::thing('roster', [$chat_id, $user_id]) RETURN NONE;")
            .bind(("chat_id", chat_id))
            .bind(("user_id", user_id))
            .await?
            .check()?;

        debug!("User `{}` removed from chat `{}`.", user_id, chat_id);

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_chat_members(&self, chat_id: i64) -> Res<Vec<RosterEntry>> {
        let mut response = self
            .db
            .query("SELECT chat_id, user_id, display_name FROM roster WHERE chat_id = $chat_id ORDER BY user_id ASC;")
            .bind(("chat_id", chat_id))
            .await?;

        let members: Vec<RosterEntry> = response.take(0)?;

        Ok(members)
    }

    #[instrument(skip(self))]
    async fn count_distinct_users(&self) -> Res<i64> {
        self.count("SELECT count() FROM (SELECT user_id FROM roster GROUP BY user_id) GROUP ALL;").await
    }

    #[instrument(skip(self))]
    async fn count_distinct_chats(&self) -> Res<i64> {
        self.count("SELECT count() FROM (SELECT chat_id FROM roster GROUP BY chat_id) GROUP ALL;").await
    }

    #[instrument(skip(self))]
    async fn count_multi_user_chats(&self) -> Res<i64> {
        self.count("SELECT count() FROM (SELECT chat_id, count() AS members FROM roster GROUP BY chat_id) WHERE members > 1 GROUP ALL;")
            .await
    }

    #[instrument(skip(self))]
    async fn record_sent_message(&self, message: &SentMessage) -> Void {
        self.db
            .query("CREATE type::thing('sent_message', [$chat_id, $message_id]) SET chat_id = $chat_id, message_id = $message_id, created_at = $created_at RETURN NONE;")
            .bind(("chat_id", message.chat_id))
            .bind(("message_id", message.message_id))
            .bind(("created_at", message.created_at.timestamp_millis()))
            .await?
            .check()?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_expired_messages(&self, cutoff: DateTime<Utc>, limit: usize) -> Res<Vec<SentMessage>> {
        let mut response = self
            .db
            .query("SELECT chat_id, message_id, created_at FROM sent_message WHERE created_at <= $cutoff ORDER BY created_at ASC LIMIT $limit;")
            .bind(("cutoff", cutoff.timestamp_millis()))
            .bind(("limit", i64::try_from(limit)?))
            .await?;

        let rows: Vec<SentMessageRow> = response.take(0)?;

        rows.into_iter().map(SentMessage::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn remove_sent_message(&self, chat_id: i64, message_id: i64) -> Void {
        self.db
            .query("DELETE type::thing('sent_message', [$chat_id, $message_id]) RETURN NONE;")
            .bind(("chat_id", chat_id))
            .bind(("message_id", message_id))
            .await?
            .check()?;

        Ok(())
    }
}

// Tests.
