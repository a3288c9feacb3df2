#![cfg(test)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use everyone_bot::{
    base::{
        config::{Config, ConfigInner},
        replies,
        types::{ChatUser, Command, DeleteOutcome, FormatMode, InboundEvent, MemberStatus, Res, RosterEntry, SentMessage},
    },
    interaction::{
        self,
        broadcast::{self, BroadcastOutcome},
        membership::{self, SweepOutcome},
        stats,
    },
    reaper,
    runtime::Runtime,
    service::{
        chat::{ChatClient, ChatError, GenericChatClient},
        db::DbClient,
    },
};
use mockall::mock;
use tokio_util::sync::CancellationToken;

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        fn bot_username(&self) -> &str;
        async fn poll_events(&self) -> Res<Vec<InboundEvent>>;
        async fn send_message(&self, chat_id: i64, text: &str, mode: FormatMode) -> Res<i64>;
        async fn delete_message(&self, chat_id: i64, message_id: i64) -> Res<DeleteOutcome>;
        async fn get_member_status(&self, chat_id: i64, user_id: i64) -> Res<MemberStatus>;
    }
}

type Sent = Arc<Mutex<Vec<(i64, String, FormatMode)>>>;

/// Mock chat that accepts every message and remembers what was sent.
fn get_recording_chat() -> (MockChat, Sent) {
    let sent: Sent = Arc::default();
    let next_id = AtomicI64::new(1000);

    let mut mock = MockChat::new();
    mock.expect_bot_username().return_const("everyone_bot".to_string());

    let log = sent.clone();
    mock.expect_send_message().returning(move |chat_id, text, mode| {
        log.lock().unwrap().push((chat_id, text.to_string(), mode));
        Ok(next_id.fetch_add(1, Ordering::SeqCst))
    });

    (mock, sent)
}

fn test_config() -> Config {
    Config::from(ConfigInner {
        telegram_token: "123:test".to_string(),
        db_endpoint: "mem://".to_string(),
        sweep_pace_ms: 0,
        ..Default::default()
    })
}

/// Helper function to setup the test environment.
async fn setup_test_environment(chat: MockChat) -> Runtime {
    let config = test_config();

    // Initialize the database (using in-memory for tests).
    let db = DbClient::surreal_memory().await.expect("Failed to create DB client");

    let chat = ChatClient::new(Arc::new(chat));

    Runtime { config, db, chat }
}

fn user(id: i64, username: &str) -> ChatUser {
    ChatUser {
        id,
        username: Some(username.to_string()),
        first_name: None,
        is_bot: false,
    }
}

fn command(command: Command, chat_id: i64, sender: ChatUser) -> InboundEvent {
    InboundEvent::Command { command, chat_id, sender }
}

async fn seed_roster(db: &DbClient, chat_id: i64, users: &[(i64, &str)]) {
    for (user_id, name) in users {
        db.opt_in(&RosterEntry {
            chat_id,
            user_id: *user_id,
            display_name: name.to_string(),
        })
        .await
        .expect("Failed to seed roster");
    }
}

async fn ledger(db: &DbClient) -> Vec<SentMessage> {
    db.list_expired_messages(Utc::now() + TimeDelta::days(365), 100).await.expect("Failed to read ledger")
}

fn roster_ids(entries: &[RosterEntry]) -> Vec<i64> {
    entries.iter().map(|e| e.user_id).collect()
}

// Roster.

#[tokio::test]
async fn test_opt_in_is_idempotent() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    interaction::handle_event(command(Command::OptIn, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;
    interaction::handle_event(command(Command::OptIn, 42, user(1, "alice_renamed")), &runtime.db, &runtime.chat, &runtime.config).await;

    let members = runtime.db.list_chat_members(42).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].display_name, "alice_renamed");

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0], (42, replies::opted_in("alice"), FormatMode::Plain));
    assert_eq!(sent[1], (42, replies::opted_in("alice_renamed"), FormatMode::Plain));
}

#[tokio::test]
async fn test_opt_out_leaves_other_entries_alone() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    seed_roster(&runtime.db, 42, &[(1, "alice"), (2, "bob")]).await;
    seed_roster(&runtime.db, 7, &[(1, "alice")]).await;

    interaction::handle_event(command(Command::OptOut, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    // Opting out twice is fine.
    interaction::handle_event(command(Command::OptOut, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(roster_ids(&runtime.db.list_chat_members(42).await.unwrap()), vec![2]);
    assert_eq!(roster_ids(&runtime.db.list_chat_members(7).await.unwrap()), vec![1]);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].1, replies::opted_out("alice"));
}

#[tokio::test]
async fn test_start_replies_with_help() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    interaction::handle_event(command(Command::Start, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(sent.lock().unwrap().as_slice(), &[(42, replies::START.to_string(), FormatMode::Plain)]);
}

// Broadcast.

#[tokio::test]
async fn test_broadcast_splits_into_batches() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    seed_roster(&runtime.db, 42, &[(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave"), (5, "eve")]).await;

    let outcome = broadcast::broadcast(42, &runtime.db, &runtime.chat, &runtime.config).await.unwrap();
    assert_eq!(outcome, BroadcastOutcome::Sent { messages: 2, mentions: 5 });

    // Every batch lands in the ledger.
    let mut recorded: Vec<i64> = ledger(&runtime.db).await.iter().map(|m| m.message_id).collect();
    recorded.sort();
    assert_eq!(recorded, vec![1000, 1001]);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(chat_id, _, mode)| *chat_id == 42 && *mode == FormatMode::Html));
    assert_eq!(sent[0].1.matches("<a href").count(), 4);
    assert_eq!(sent[1].1, r#"<a href="tg://user?id=5">eve</a>"#);
}

#[tokio::test]
async fn test_broadcast_respects_chunk_size() {
    let (chat, sent) = get_recording_chat();
    let mut runtime = setup_test_environment(chat).await;
    runtime.config = Config::from(ConfigInner {
        broadcast_chunk_size: 3,
        ..(*runtime.config.inner).clone()
    });

    let users: Vec<(i64, String)> = (1..=7).map(|id| (id, format!("user{id}"))).collect();
    let users: Vec<(i64, &str)> = users.iter().map(|(id, name)| (*id, name.as_str())).collect();
    seed_roster(&runtime.db, 42, &users).await;

    broadcast::broadcast(42, &runtime.db, &runtime.chat, &runtime.config).await.unwrap();

    let counts: Vec<usize> = sent.lock().unwrap().iter().map(|(_, text, _)| text.matches("<a href").count()).collect();
    assert_eq!(counts, vec![3, 3, 1]);
}

#[tokio::test]
async fn test_broadcast_truncates_long_names() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    seed_roster(&runtime.db, 42, &[(1, "abcdefghij<lmn")]).await;

    broadcast::broadcast(42, &runtime.db, &runtime.chat, &runtime.config).await.unwrap();

    assert_eq!(sent.lock().unwrap()[0].1, r#"<a href="tg://user?id=1">abcdefghij</a>"#);
}

#[tokio::test]
async fn test_broadcast_on_empty_roster_sends_nothing() {
    let mut chat = MockChat::new();
    chat.expect_send_message().never();

    let runtime = setup_test_environment(chat).await;

    let outcome = broadcast::broadcast(42, &runtime.db, &runtime.chat, &runtime.config).await.unwrap();

    assert_eq!(outcome, BroadcastOutcome::NoUsers);
    assert!(ledger(&runtime.db).await.is_empty());
}

#[tokio::test]
async fn test_all_command_on_empty_roster_explains() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    interaction::handle_event(command(Command::BroadcastAll, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(sent.lock().unwrap().as_slice(), &[(42, replies::NO_USERS.to_string(), FormatMode::Plain)]);
    assert!(ledger(&runtime.db).await.is_empty());
}

#[tokio::test]
async fn test_broadcast_stops_at_first_failure() {
    let calls = AtomicUsize::new(0);

    let mut chat = MockChat::new();
    chat.expect_send_message().times(2).returning(move |_, _, _| match calls.fetch_add(1, Ordering::SeqCst) {
        0 => Ok(500),
        _ => Err(anyhow::anyhow!("Too Many Requests")),
    });

    let runtime = setup_test_environment(chat).await;
    let users: Vec<(i64, &str)> = (1..=9).map(|id| (id, "user")).collect();
    seed_roster(&runtime.db, 42, &users).await;

    let err = broadcast::broadcast(42, &runtime.db, &runtime.chat, &runtime.config).await.unwrap_err();

    assert!(err.to_string().contains("after 1 of 3"), "unexpected error: {err:#}");

    let recorded = ledger(&runtime.db).await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].message_id, 500);
}

#[tokio::test]
async fn test_failed_command_is_reported_to_chat() {
    let calls = AtomicUsize::new(0);
    let sent: Sent = Arc::default();

    let mut chat = MockChat::new();
    let log = sent.clone();
    chat.expect_send_message().returning(move |chat_id, text, mode| {
        log.lock().unwrap().push((chat_id, text.to_string(), mode));
        match calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(anyhow::anyhow!("Bad Request")),
            n => Ok(n as i64),
        }
    });

    let runtime = setup_test_environment(chat).await;
    seed_roster(&runtime.db, 42, &[(1, "alice")]).await;

    interaction::handle_event(command(Command::BroadcastAll, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].2, FormatMode::Plain);
    assert!(sent[1].1.contains("Broadcast stopped after 0 of 1 messages"));
}

// Reaper.

#[tokio::test]
async fn test_reaper_waits_for_retention() {
    let mut chat = MockChat::new();
    chat.expect_delete_message().times(1).returning(|_, _| Ok(DeleteOutcome::Deleted));

    let runtime = setup_test_environment(chat).await;
    let retention = runtime.config.retention();
    let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    runtime.db.record_sent_message(&SentMessage { chat_id: 42, message_id: 9, created_at: t0 }).await.unwrap();

    let window = TimeDelta::from_std(retention).unwrap();

    let early = reaper::reap_expired(&runtime.db, &runtime.chat, t0 + window - TimeDelta::seconds(1), retention, 1).await.unwrap();
    assert_eq!(early, 0);
    assert_eq!(ledger(&runtime.db).await.len(), 1);

    let due = reaper::reap_expired(&runtime.db, &runtime.chat, t0 + window, retention, 1).await.unwrap();
    assert_eq!(due, 1);
    assert!(ledger(&runtime.db).await.is_empty());
}

#[tokio::test]
async fn test_reaper_drops_entry_when_delete_fails() {
    let mut chat = MockChat::new();
    chat.expect_delete_message().returning(|_, message_id| match message_id {
        1 => Err(anyhow::anyhow!("Bad Request: message can't be deleted")),
        _ => Ok(DeleteOutcome::NotFound),
    });

    let runtime = setup_test_environment(chat).await;
    let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    for message_id in [1, 2] {
        runtime.db.record_sent_message(&SentMessage { chat_id: 42, message_id, created_at: t0 }).await.unwrap();
    }

    let now = t0 + TimeDelta::days(30);
    let reaped = reaper::reap_expired(&runtime.db, &runtime.chat, now, runtime.config.retention(), 10).await.unwrap();

    assert_eq!(reaped, 2);
    assert!(ledger(&runtime.db).await.is_empty());
}

#[tokio::test]
async fn test_reaper_converges_one_per_tick() {
    let mut chat = MockChat::new();
    chat.expect_delete_message().times(3).returning(|_, _| Ok(DeleteOutcome::Deleted));

    let runtime = setup_test_environment(chat).await;
    let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    for message_id in [1, 2, 3] {
        runtime.db.record_sent_message(&SentMessage { chat_id: 42, message_id, created_at: t0 }).await.unwrap();
    }

    let now = t0 + TimeDelta::days(30);

    for (tick, remaining) in [2, 1, 0, 0].into_iter().enumerate() {
        reaper::reap_expired(&runtime.db, &runtime.chat, now, runtime.config.retention(), 1).await.unwrap();
        assert_eq!(ledger(&runtime.db).await.len(), remaining, "tick {tick}");
    }
}

#[tokio::test]
async fn test_reaper_loop_stops_on_cancel() {
    let runtime = setup_test_environment(MockChat::new()).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(reaper::run_reaper_loop(runtime.db.clone(), runtime.chat.clone(), runtime.config.clone(), cancel.clone()));

    cancel.cancel();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("Reaper did not stop")
        .expect("Reaper panicked");
}

// Membership.

#[tokio::test]
async fn test_join_and_leave_update_roster() {
    let runtime = setup_test_environment(MockChat::new()).await;

    let human = ChatUser {
        id: 5,
        username: None,
        first_name: Some("Eve".to_string()),
        is_bot: false,
    };
    let nameless = ChatUser { id: 6, ..Default::default() };
    let bot = ChatUser {
        id: 7,
        username: Some("helper_bot".to_string()),
        first_name: None,
        is_bot: true,
    };

    for user in [human, nameless, bot] {
        interaction::handle_event(InboundEvent::UserJoined { chat_id: 42, user }, &runtime.db, &runtime.chat, &runtime.config).await;
    }

    let members = runtime.db.list_chat_members(42).await.unwrap();
    assert_eq!(roster_ids(&members), vec![5, 6]);
    assert_eq!(members[0].display_name, "Eve");
    assert_eq!(members[1].display_name, "anonymous");

    interaction::handle_event(InboundEvent::UserLeft { chat_id: 42, user_id: 5 }, &runtime.db, &runtime.chat, &runtime.config).await;
    interaction::handle_event(InboundEvent::UserLeft { chat_id: 42, user_id: 99 }, &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(roster_ids(&runtime.db.list_chat_members(42).await.unwrap()), vec![6]);
}

#[tokio::test]
async fn test_sweep_removes_departed_users() {
    let mut chat = MockChat::new();
    chat.expect_get_member_status().returning(|_, user_id| {
        Ok(match user_id {
            100 => MemberStatus::Administrator,
            2 => MemberStatus::Left,
            3 => MemberStatus::Kicked,
            4 => MemberStatus::Restricted,
            _ => MemberStatus::Member,
        })
    });

    let runtime = setup_test_environment(chat).await;
    seed_roster(&runtime.db, 42, &[(1, "alice"), (2, "bob"), (3, "carol"), (4, "dave")]).await;
    seed_roster(&runtime.db, 7, &[(2, "bob")]).await;

    let outcome = membership::sweep(42, 100, &runtime.db, &runtime.chat, runtime.config.sweep_pace()).await.unwrap();

    assert_eq!(outcome, SweepOutcome::Removed(2));
    assert_eq!(roster_ids(&runtime.db.list_chat_members(42).await.unwrap()), vec![1, 4]);
    assert_eq!(roster_ids(&runtime.db.list_chat_members(7).await.unwrap()), vec![2]);
}

#[tokio::test]
async fn test_sweep_aborts_on_permission_denied() {
    let queried = Arc::new(Mutex::new(Vec::new()));

    let mut chat = MockChat::new();
    let log = queried.clone();
    chat.expect_get_member_status().returning(move |_, user_id| {
        log.lock().unwrap().push(user_id);
        match user_id {
            100 => Ok(MemberStatus::Creator),
            1 => Ok(MemberStatus::Left),
            2 => Err(ChatError::PermissionDenied("Bad Request: not enough rights".into()).into()),
            _ => Ok(MemberStatus::Kicked),
        }
    });

    let runtime = setup_test_environment(chat).await;
    seed_roster(&runtime.db, 42, &[(1, "alice"), (2, "bob"), (3, "carol")]).await;

    let outcome = membership::sweep(42, 100, &runtime.db, &runtime.chat, runtime.config.sweep_pace()).await.unwrap();

    assert_eq!(outcome, SweepOutcome::PermissionDenied);
    assert_eq!(*queried.lock().unwrap(), vec![100, 1, 2]);
    assert_eq!(roster_ids(&runtime.db.list_chat_members(42).await.unwrap()), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_sweep_requires_admin() {
    let (mut chat, sent) = get_recording_chat();
    chat.expect_get_member_status().times(1).returning(|_, _| Ok(MemberStatus::Member));

    let runtime = setup_test_environment(chat).await;
    seed_roster(&runtime.db, 42, &[(1, "alice")]).await;

    interaction::handle_event(command(Command::Sweep, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(sent.lock().unwrap().as_slice(), &[(42, replies::SWEEP_ADMIN_ONLY.to_string(), FormatMode::Plain)]);
    assert_eq!(roster_ids(&runtime.db.list_chat_members(42).await.unwrap()), vec![1]);
}

#[tokio::test]
async fn test_sweep_reports_count() {
    let (mut chat, sent) = get_recording_chat();
    chat.expect_get_member_status().returning(|_, user_id| Ok(if user_id == 1 { MemberStatus::Creator } else { MemberStatus::Left }));

    let runtime = setup_test_environment(chat).await;
    seed_roster(&runtime.db, 42, &[(1, "alice"), (2, "bob"), (3, "carol")]).await;

    interaction::handle_event(command(Command::Sweep, 42, user(1, "alice")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(sent.lock().unwrap().as_slice(), &[(42, replies::sweep_done(2), FormatMode::Plain)]);
}

// Stats.

#[tokio::test]
async fn test_stats_summary() {
    let (chat, sent) = get_recording_chat();
    let runtime = setup_test_environment(chat).await;

    seed_roster(&runtime.db, 1, &[(10, "a"), (11, "b")]).await;
    seed_roster(&runtime.db, 2, &[(10, "a")]).await;
    seed_roster(&runtime.db, 3, &[(12, "c"), (13, "d"), (10, "a")]).await;

    let summary = stats::collect_stats(&runtime.db).await.unwrap();
    assert_eq!(summary, stats::Stats { users: 4, chats: 3, groups: 2 });

    interaction::handle_event(command(Command::Stats, 1, user(10, "a")), &runtime.db, &runtime.chat, &runtime.config).await;

    assert_eq!(sent.lock().unwrap().as_slice(), &[(1, replies::stats(4, 3, 2), FormatMode::MarkdownV2)]);
}

// Runtime.

#[tokio::test]
async fn test_runtime_handles_polled_events_until_cancelled() {
    let cancel = CancellationToken::new();
    let polls = AtomicUsize::new(0);

    let (mut chat, sent) = get_recording_chat();
    let stop = cancel.clone();
    chat.expect_poll_events().returning(move || match polls.fetch_add(1, Ordering::SeqCst) {
        0 => Ok(vec![
            command(Command::OptIn, 42, user(1, "alice")),
            command(Command::OptIn, 42, user(2, "bob")),
            command(Command::BroadcastAll, 42, user(1, "alice")),
        ]),
        1 => Err(anyhow::anyhow!("Bad Gateway")),
        _ => {
            stop.cancel();
            Ok(Vec::new())
        }
    });

    let runtime = setup_test_environment(chat).await;

    tokio::time::timeout(std::time::Duration::from_secs(10), runtime.run(cancel))
        .await
        .expect("Event loop did not stop");

    assert_eq!(ledger(&runtime.db).await.len(), 1);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2].1, r#"<a href="tg://user?id=1">alice</a> <a href="tg://user?id=2">bob</a>"#);
}
