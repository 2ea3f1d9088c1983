//! SQLite-backed store shared by the chat and admin processes
//!
//! Timestamps are stored as milliseconds since the epoch and session ids as
//! their hyphenated text form.

use super::{AuditSink, HistoryStore, ParticipantStore, StoreCounts, StoreError, StoreResult};
use crate::types::{
    AdminAction, MessageRecord, ParticipantId, ParticipantProfile, ParticipantRecord, Preference,
    SessionRecord,
};
use crate::utils::{current_timestamp, from_millis, to_millis};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

type ParticipantRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    bool,
    i64,
    i64,
    i64,
);

type MessageRow = (String, i64, i64, String, i64, bool);

type SessionRow = (String, i64, i64, i64, Option<i64>);

const PARTICIPANT_COLUMNS: &str = "id, username, first_name, last_name, preference, is_banned, \
     message_count, joined_at, last_active";

const MESSAGE_COLUMNS: &str = "session_id, sender_id, recipient_id, text, sent_at, delivered";

/// Store handle with connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database at `path` and apply migrations.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn connect(path: &str) -> StoreResult<Self> {
        let pool = if path == ":memory:" {
            // Unique name per call so parallel tests never share a database
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:anon-chat-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = std::fs::create_dir_all(parent) {
                        warn!(path = %parent.display(), error = %e, "Failed to create database directory");
                    }
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations checked/applied");

        // WAL lets the admin process read while the chat process writes
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Cheap round trip used by readiness checks
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_participant(&self, participant: ParticipantId) -> StoreResult<()> {
        let now = to_millis(current_timestamp());
        sqlx::query(
            r#"
            INSERT INTO participants (id, joined_at, last_active)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(participant)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn participant_from_row(row: ParticipantRow) -> StoreResult<ParticipantRecord> {
    let (
        id,
        username,
        first_name,
        last_name,
        preference,
        is_banned,
        message_count,
        joined_at,
        last_active,
    ) = row;

    let preference = preference
        .parse::<Preference>()
        .map_err(|e| StoreError::Corrupt(format!("participant {}: {}", id, e)))?;

    Ok(ParticipantRecord {
        profile: ParticipantProfile {
            id,
            username,
            first_name,
            last_name,
        },
        preference,
        is_banned,
        message_count: message_count.max(0) as u64,
        joined_at: from_millis(joined_at),
        last_active: from_millis(last_active),
    })
}

fn parse_session_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("session id '{}': {}", raw, e)))
}

fn message_from_row(row: MessageRow) -> StoreResult<MessageRecord> {
    let (session_id, from, to, text, sent_at, delivered) = row;
    Ok(MessageRecord {
        session_id: parse_session_id(&session_id)?,
        from,
        to,
        text,
        timestamp: from_millis(sent_at),
        delivered,
    })
}

fn messages_from_rows(rows: Vec<MessageRow>) -> StoreResult<Vec<MessageRecord>> {
    rows.into_iter().map(message_from_row).collect()
}

/// Escape LIKE wildcards so a keyword matches literally
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl ParticipantStore for SqliteStore {
    async fn upsert_participant(
        &self,
        profile: &ParticipantProfile,
    ) -> StoreResult<ParticipantRecord> {
        let now = to_millis(current_timestamp());
        sqlx::query(
            r#"
            INSERT INTO participants (id, username, first_name, last_name, joined_at, last_active)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name
            "#,
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_participant(profile.id).await?.ok_or_else(|| {
            StoreError::Corrupt(format!("participant {} missing after upsert", profile.id))
        })
    }

    async fn get_participant(
        &self,
        participant: ParticipantId,
    ) -> StoreResult<Option<ParticipantRecord>> {
        let query = format!("SELECT {} FROM participants WHERE id = ?", PARTICIPANT_COLUMNS);
        let row = sqlx::query_as::<_, ParticipantRow>(&query)
            .bind(participant)
            .fetch_optional(&self.pool)
            .await?;

        row.map(participant_from_row).transpose()
    }

    async fn list_participants(&self) -> StoreResult<Vec<ParticipantRecord>> {
        let query = format!(
            "SELECT {} FROM participants ORDER BY joined_at, id",
            PARTICIPANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ParticipantRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(participant_from_row).collect()
    }

    async fn get_preference(&self, participant: ParticipantId) -> StoreResult<Preference> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT preference FROM participants WHERE id = ?")
                .bind(participant)
                .fetch_optional(&self.pool)
                .await?;

        match raw {
            Some(raw) => raw
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("participant {}: {}", participant, e))),
            None => Ok(Preference::default()),
        }
    }

    async fn set_preference(
        &self,
        participant: ParticipantId,
        preference: Preference,
    ) -> StoreResult<()> {
        self.ensure_participant(participant).await?;
        sqlx::query("UPDATE participants SET preference = ? WHERE id = ?")
            .bind(preference.as_str())
            .bind(participant)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_banned(&self, participant: ParticipantId) -> StoreResult<bool> {
        let banned: Option<bool> =
            sqlx::query_scalar("SELECT is_banned FROM participants WHERE id = ?")
                .bind(participant)
                .fetch_optional(&self.pool)
                .await?;
        Ok(banned.unwrap_or(false))
    }

    async fn set_banned(&self, participant: ParticipantId, banned: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE participants SET is_banned = ? WHERE id = ?")
            .bind(banned)
            .bind(participant)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_activity(&self, participant: ParticipantId) -> StoreResult<()> {
        self.ensure_participant(participant).await?;
        sqlx::query(
            "UPDATE participants SET message_count = message_count + 1, last_active = ? WHERE id = ?",
        )
        .bind(to_millis(current_timestamp()))
        .bind(participant)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn message_history(
        &self,
        participant: ParticipantId,
    ) -> StoreResult<Vec<MessageRecord>> {
        let query = format!(
            "SELECT {} FROM messages WHERE sender_id = ? OR recipient_id = ? ORDER BY sent_at, id",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(participant)
            .bind(participant)
            .fetch_all(&self.pool)
            .await?;

        messages_from_rows(rows)
    }

    async fn recent_messages(&self, limit: usize) -> StoreResult<Vec<MessageRecord>> {
        let query = format!(
            "SELECT {} FROM messages ORDER BY sent_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let mut rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.reverse();

        messages_from_rows(rows)
    }

    async fn search_messages(&self, keyword: &str) -> StoreResult<Vec<MessageRecord>> {
        let query = format!(
            "SELECT {} FROM messages WHERE text LIKE ? ESCAPE '\\' ORDER BY sent_at, id",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&query)
            .bind(like_pattern(keyword))
            .fetch_all(&self.pool)
            .await?;

        messages_from_rows(rows)
    }

    async fn session(&self, session_id: Uuid) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, participant_a, participant_b, started_at, ended_at FROM sessions WHERE id = ?",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, participant_a, participant_b, started_at, ended_at)| {
            Ok(SessionRecord {
                session_id: parse_session_id(&id)?,
                participant_a,
                participant_b,
                started_at: from_millis(started_at),
                ended_at: ended_at.map(from_millis),
            })
        })
        .transpose()
    }

    async fn recent_admin_actions(&self, limit: usize) -> StoreResult<Vec<AdminAction>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT admin_id, action, performed_at FROM admin_actions ORDER BY performed_at DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(admin_id, action, performed_at)| AdminAction {
                admin_id,
                action,
                timestamp: from_millis(performed_at),
            })
            .collect())
    }

    async fn counts(&self) -> StoreResult<StoreCounts> {
        let (participants, banned_participants): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_banned), 0) FROM participants",
        )
        .fetch_one(&self.pool)
        .await?;

        let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        let (sessions, open_sessions): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN ended_at IS NULL THEN 1 ELSE 0 END), 0) FROM sessions",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            participants: participants as u64,
            banned_participants: banned_participants as u64,
            messages: messages as u64,
            sessions: sessions as u64,
            open_sessions: open_sessions as u64,
        })
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn record_message(&self, message: &MessageRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (session_id, sender_id, recipient_id, text, sent_at, delivered)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.session_id.to_string())
        .bind(message.from)
        .bind(message.to)
        .bind(&message.text)
        .bind(to_millis(message.timestamp))
        .bind(message.delivered)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_session(&self, session: &SessionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, participant_a, participant_b, started_at, ended_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                ended_at = COALESCE(sessions.ended_at, excluded.ended_at)
            "#,
        )
        .bind(session.session_id.to_string())
        .bind(session.participant_a)
        .bind(session.participant_b)
        .bind(to_millis(session.started_at))
        .bind(session.ended_at.map(to_millis))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_admin_action(&self, action: &AdminAction) -> StoreResult<()> {
        sqlx::query("INSERT INTO admin_actions (admin_id, action, performed_at) VALUES (?, ?, ?)")
            .bind(&action.admin_id)
            .bind(&action.action)
            .bind(to_millis(action.timestamp))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_session_id;

    async fn store() -> SqliteStore {
        SqliteStore::connect(":memory:").await.unwrap()
    }

    fn message(session_id: Uuid, from: i64, to: i64, text: &str) -> MessageRecord {
        MessageRecord {
            session_id,
            from,
            to,
            text: text.to_string(),
            timestamp: current_timestamp(),
            delivered: true,
        }
    }

    #[tokio::test]
    async fn test_participant_round_trip() {
        let store = store().await;
        let profile = ParticipantProfile {
            id: 77,
            username: Some("quiet_fox".to_string()),
            first_name: Some("Ana".to_string()),
            last_name: None,
        };

        let created = store.upsert_participant(&profile).await.unwrap();
        assert_eq!(created.profile, profile);
        assert_eq!(created.preference, Preference::Any);

        store.set_preference(77, Preference::Female).await.unwrap();
        store.touch_activity(77).await.unwrap();
        store.touch_activity(77).await.unwrap();

        let fetched = store.get_participant(77).await.unwrap().unwrap();
        assert_eq!(fetched.preference, Preference::Female);
        assert_eq!(fetched.message_count, 2);
        assert_eq!(fetched.joined_at, created.joined_at);
    }

    #[tokio::test]
    async fn test_ban_flag() {
        let store = store().await;
        assert!(!store.set_banned(5, true).await.unwrap());

        store.upsert_participant(&ParticipantProfile::new(5)).await.unwrap();
        assert!(store.set_banned(5, true).await.unwrap());
        assert!(store.is_banned(5).await.unwrap());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.participants, 1);
        assert_eq!(counts.banned_participants, 1);
    }

    #[tokio::test]
    async fn test_message_queries() {
        let store = store().await;
        let session_id = generate_session_id();
        store.record_message(&message(session_id, 1, 2, "good evening")).await.unwrap();
        store.record_message(&message(session_id, 2, 1, "100% agreed")).await.unwrap();
        store.record_message(&message(session_id, 3, 4, "Good luck")).await.unwrap();

        assert_eq!(store.message_history(1).await.unwrap().len(), 2);
        assert_eq!(store.search_messages("GOOD").await.unwrap().len(), 2);
        assert_eq!(store.search_messages("%").await.unwrap().len(), 1);

        let recent = store.recent_messages(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].session_id, session_id);
    }

    #[tokio::test]
    async fn test_session_end_written_once() {
        let store = store().await;
        let mut record = SessionRecord {
            session_id: generate_session_id(),
            participant_a: 1,
            participant_b: 2,
            started_at: current_timestamp(),
            ended_at: None,
        };
        store.record_session(&record).await.unwrap();
        assert_eq!(store.counts().await.unwrap().open_sessions, 1);

        let end = current_timestamp();
        record.ended_at = Some(end);
        store.record_session(&record).await.unwrap();

        let stored = store.session(record.session_id).await.unwrap().unwrap();
        assert_eq!(
            stored.ended_at.map(|t| t.timestamp_millis()),
            Some(end.timestamp_millis())
        );
        assert_eq!(store.counts().await.unwrap().open_sessions, 0);
    }
}
