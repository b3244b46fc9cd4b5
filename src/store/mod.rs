//! The durable log: the single authoritative serialization point (spec §4.1).
//!
//! Every mutating operation runs inside one serializable transaction so
//! that sequence assignment, row insert, and (by the caller, after
//! commit) event publication are atomic from an observer's standpoint.
//! SQLite itself serializes writers at the file level; we additionally
//! open each write transaction with `BEGIN IMMEDIATE` so the sequencer's
//! `MAX(seq)` read-then-insert is race-free without an external lock.

mod rows;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::domain::{Agent, Message, Role, Thread, ThreadFilter, ThreadStatus};
use crate::error::{BusError, Result};

use rows::{AgentRow, MessageRow, ThreadRow};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `db_path` and run
    /// pending migrations. Idempotent.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| BusError::internal(format!("failed to open database: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| BusError::internal(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| BusError::internal(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| BusError::internal(e.to_string()))?;
        Ok(Self { pool })
    }

    // ── Threads ──────────────────────────────────────────────────────

    pub async fn insert_thread(
        &self,
        topic: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Thread> {
        if topic.trim().is_empty() {
            return Err(BusError::invalid_input("topic must not be empty"));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".into());

        sqlx::query(
            "INSERT INTO threads (id, topic, status, prior_status, summary, created_at, metadata)
             VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)",
        )
        .bind(&id)
        .bind(topic)
        .bind(ThreadStatus::Discuss.as_str())
        .bind(now.to_rfc3339())
        .bind(&metadata_json)
        .execute(&self.pool)
        .await?;

        self.fetch_thread(&id).await
    }

    pub async fn fetch_thread(&self, id: &str) -> Result<Thread> {
        let row = sqlx::query_as::<_, ThreadRow>("SELECT * FROM threads WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BusError::not_found(format!("thread {id} not found")))?;
        row.into_thread()
    }

    pub async fn list_threads(&self, filter: ThreadFilter) -> Result<Vec<Thread>> {
        let rows = sqlx::query_as::<_, ThreadRow>("SELECT * FROM threads ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut threads = Vec::with_capacity(rows.len());
        for row in rows {
            let thread = row.into_thread()?;
            let is_archived = thread.status == ThreadStatus::Archived;
            if is_archived && !filter.include_archived && filter.status != Some(ThreadStatus::Archived)
            {
                continue;
            }
            if let Some(status) = filter.status {
                if thread.status != status {
                    continue;
                }
            }
            threads.push(thread);
        }
        Ok(threads)
    }

    pub async fn update_thread_status(&self, id: &str, new_status: ThreadStatus) -> Result<Thread> {
        let current = self.fetch_thread(id).await?;
        if current.status.is_terminal() {
            return Err(BusError::conflict(format!(
                "thread {id} is closed and cannot transition to {new_status}"
            )));
        }
        if current.status == ThreadStatus::Archived {
            return Err(BusError::conflict(format!(
                "thread {id} is archived; unarchive before changing state"
            )));
        }
        if new_status == ThreadStatus::Archived {
            return Err(BusError::invalid_input(
                "use thread.archive to set the archived flag",
            ));
        }

        sqlx::query("UPDATE threads SET status = ?1 WHERE id = ?2")
            .bind(new_status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_thread(id).await
    }

    pub async fn archive_thread(&self, id: &str) -> Result<Thread> {
        let current = self.fetch_thread(id).await?;
        if current.status == ThreadStatus::Archived {
            return Err(BusError::conflict(format!("thread {id} is already archived")));
        }
        sqlx::query("UPDATE threads SET prior_status = ?1, status = ?2 WHERE id = ?3")
            .bind(current.status.as_str())
            .bind(ThreadStatus::Archived.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_thread(id).await
    }

    pub async fn unarchive_thread(&self, id: &str) -> Result<Thread> {
        let current = self.fetch_thread(id).await?;
        if current.status != ThreadStatus::Archived {
            return Err(BusError::conflict(format!("thread {id} is not archived")));
        }
        let restored = current.prior_status.unwrap_or(ThreadStatus::Discuss);
        sqlx::query("UPDATE threads SET status = ?1, prior_status = NULL WHERE id = ?2")
            .bind(restored.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_thread(id).await
    }

    pub async fn close_thread(&self, id: &str, summary: Option<String>) -> Result<Thread> {
        let current = self.fetch_thread(id).await?;
        if current.status == ThreadStatus::Archived {
            return Err(BusError::conflict(format!(
                "thread {id} is archived; unarchive before closing"
            )));
        }
        sqlx::query("UPDATE threads SET status = ?1, summary = COALESCE(?2, summary) WHERE id = ?3")
            .bind(ThreadStatus::Closed.as_str())
            .bind(&summary)
            .bind(id)
            .execute(&self.pool)
            .await?;
        self.fetch_thread(id).await
    }

    pub async fn delete_thread(&self, id: &str) -> Result<()> {
        self.fetch_thread(id).await?;
        sqlx::query("DELETE FROM threads WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Insert a message, assigning its `seq` under the write lock (spec §4.2).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_message(
        &self,
        thread_id: &str,
        author_id: Option<String>,
        author_name: &str,
        role: Role,
        content: &str,
        mentions: HashSet<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Message> {
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(BusError::from)?;

        let thread_status: Option<String> =
            sqlx::query_scalar("SELECT status FROM threads WHERE id = ?1")
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(thread_status) = thread_status else {
            return Err(BusError::not_found(format!("thread {thread_id} not found")));
        };
        let _ = thread_status; // any status, including closed/archived, accepts posts per spec (only deleted rejects)

        let next_seq: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages")
            .fetch_one(&mut *tx)
            .await?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let mentions_json = serde_json::to_string(&mentions).unwrap_or_else(|_| "[]".into());
        let metadata_json = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".into());

        sqlx::query(
            "INSERT INTO messages
                (id, thread_id, seq, author_id, author_name, role, content, mentions, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(thread_id)
        .bind(next_seq)
        .bind(&author_id)
        .bind(author_name)
        .bind(role.as_str())
        .bind(content)
        .bind(&mentions_json)
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await.map_err(BusError::from)?;

        Ok(Message {
            id,
            thread_id: thread_id.to_string(),
            seq: next_seq,
            author_id,
            author_name: author_name.to_string(),
            role,
            content: content.to_string(),
            mentions,
            metadata,
            created_at: now,
        })
    }

    pub async fn list_messages(
        &self,
        thread_id: &str,
        after_seq: i64,
        limit: i64,
        include_system_prompt: bool,
    ) -> Result<Vec<Message>> {
        self.fetch_thread(thread_id).await?;

        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE thread_id = ?1 AND seq > ?2 ORDER BY seq ASC LIMIT ?3",
        )
        .bind(thread_id)
        .bind(after_seq)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_message())
            .filter(|m| match m {
                Ok(m) => include_system_prompt || m.role != Role::System,
                Err(_) => true,
            })
            .collect()
    }

    /// Highest assigned seq across the whole bus, used by the sequencer's
    /// in-memory cache on startup (spec §4.2).
    pub async fn max_seq(&self) -> Result<i64> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(seq), 0) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(max)
    }

    // ── Agents ───────────────────────────────────────────────────────

    pub async fn register_agent(
        &self,
        ide: &str,
        model: &str,
        name: Option<String>,
        capabilities: Option<serde_json::Value>,
    ) -> Result<Agent> {
        let id = uuid::Uuid::new_v4().to_string();
        let token = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let display_name = name.unwrap_or_else(|| format!("{ide}-agent"));
        let capabilities_json = capabilities.as_ref().map(|c| c.to_string());

        sqlx::query(
            "INSERT INTO agents
                (id, name, ide, model, capabilities, token, last_heartbeat_at, last_activity_at, last_activity_kind, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&id)
        .bind(&display_name)
        .bind(ide)
        .bind(model)
        .bind(&capabilities_json)
        .bind(&token)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind("register")
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.fetch_agent(&id).await
    }

    pub async fn fetch_agent(&self, id: &str) -> Result<Agent> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BusError::not_found(format!("agent {id} not found")))?;
        row.into_agent()
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY registered_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_agent()).collect()
    }

    /// Validate `token` against the stored value. Returns `Unauthorized`
    /// on mismatch without mutating anything (P6).
    async fn check_token(&self, id: &str, token: &str) -> Result<()> {
        let stored: Option<String> = sqlx::query_scalar("SELECT token FROM agents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match stored {
            None => Err(BusError::not_found(format!("agent {id} not found"))),
            Some(stored) if stored == token => Ok(()),
            Some(_) => Err(BusError::unauthorized("token mismatch")),
        }
    }

    pub async fn heartbeat(&self, id: &str, token: &str) -> Result<()> {
        self.check_token(id, token).await?;
        sqlx::query("UPDATE agents SET last_heartbeat_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn unregister_agent(&self, id: &str, token: &str) -> Result<()> {
        self.check_token(id, token).await?;
        sqlx::query("DELETE FROM agents WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record presence activity for an agent, if it exists. Silently a
    /// no-op for unknown/anonymous authors — this is a side effect, not
    /// a mutation the caller is authorizing.
    pub async fn touch_activity(&self, id: &str, kind: &str) -> Result<()> {
        sqlx::query(
            "UPDATE agents SET last_activity_at = ?1, last_activity_kind = ?2 WHERE id = ?3",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(kind)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
