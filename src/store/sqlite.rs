//! The single-writer local store: SQLite-backed, append-only analyses and
//! decisions, idempotent migrations, and the settings key/value map.
//!
//! An `Arc<SqlitePool>` wrapper; `connect()` runs embedded migrations,
//! single-statement inserts run inside implicit transactions, and every
//! fallible operation is `#[instrument]`ed.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::models::{ChildProfile, Decision, Event};
use crate::store::error::StoreError;
use crate::types::Strictness;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

#[derive(Debug, FromRow)]
struct ChildProfileRow {
    id: String,
    name: String,
    timezone: String,
    strictness: String,
    age: i64,
}

impl From<ChildProfileRow> for ChildProfile {
    fn from(row: ChildProfileRow) -> Self {
        ChildProfile {
            id: row.id,
            name: row.name,
            timezone: row.timezone,
            strictness: row.strictness.parse().unwrap_or(Strictness::Standard),
            age: row.age as i32,
        }
    }
}

/// Mirror payload for one child profile, including `created_at` (needed by
/// the replicator's upsert but not part of the domain [`ChildProfile`]).
#[derive(Debug, Clone, FromRow)]
pub struct ChildMirrorRow {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub strictness: String,
    pub age: i64,
    pub created_at: i64,
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: String,
    child_id: String,
    ts: i64,
    kind: String,
    url: Option<String>,
    title: Option<String>,
    tab_id: Option<String>,
    referrer: Option<String>,
    data_json: String,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, StoreError> {
        Ok(Event {
            id: row.id,
            child_id: row.child_id,
            ts: row.ts,
            kind: row.kind,
            url: row.url,
            title: row.title,
            tab_id: row.tab_id,
            referrer: row.referrer,
            data_json: serde_json::from_str(&row.data_json)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct DecisionRow {
    id: String,
    event_id: String,
    policy_version: String,
    action: String,
    reason: String,
    categories_json: String,
    original_action: String,
    manual_action: Option<String>,
    manual_flagged: i64,
    manual_processed: i64,
    manual_updated_at: Option<i64>,
}

impl TryFrom<DecisionRow> for Decision {
    type Error = StoreError;

    fn try_from(row: DecisionRow) -> Result<Self, StoreError> {
        Ok(Decision {
            id: row.id,
            event_id: row.event_id,
            policy_version: row.policy_version,
            action: row.action,
            reason: row.reason,
            categories: serde_json::from_str(&row.categories_json)?,
            original_action: row.original_action,
            manual_action: row.manual_action,
            manual_flagged: row.manual_flagged != 0,
            manual_processed: row.manual_processed != 0,
            manual_updated_at: row.manual_updated_at,
        })
    }
}

/// [`DecisionRow`] plus the replicator's `max(event.ts, manual_updated_at)`
/// cursor value computed by the query itself.
#[derive(Debug, FromRow)]
struct DecisionWithCursorRow {
    id: String,
    event_id: String,
    policy_version: String,
    action: String,
    reason: String,
    categories_json: String,
    original_action: String,
    manual_action: Option<String>,
    manual_flagged: i64,
    manual_processed: i64,
    manual_updated_at: Option<i64>,
    cursor_value: i64,
}

impl TryFrom<DecisionWithCursorRow> for (Decision, i64) {
    type Error = StoreError;

    fn try_from(row: DecisionWithCursorRow) -> Result<Self, StoreError> {
        let cursor_value = row.cursor_value;
        let decision = Decision {
            id: row.id,
            event_id: row.event_id,
            policy_version: row.policy_version,
            action: row.action,
            reason: row.reason,
            categories: serde_json::from_str(&row.categories_json)?,
            original_action: row.original_action,
            manual_action: row.manual_action,
            manual_flagged: row.manual_flagged != 0,
            manual_processed: row.manual_processed != 0,
            manual_updated_at: row.manual_updated_at,
        };
        Ok((decision, cursor_value))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open (creating if missing) the database at `db_path`, encrypt it with
    /// `db_key` when one is configured, and run embedded migrations.
    ///
    /// Mirrors `core/db.py: Database.connect`'s `PRAGMA key`/
    /// `cipher_memory_security`/`kdf_iter` sequence (there issued over a
    /// SQLCipher connection); here the same pragmas are issued through
    /// `SqliteConnectOptions::pragma` so the store behaves identically
    /// against an SQLCipher-linked `libsqlite3` build. With no `db_key`
    /// configured the pragmas are skipped and the file is a plain SQLite
    /// database, exactly as the original behaves when `db_key` is unset.
    #[tracing::instrument(skip_all, fields(db_path), err)]
    pub async fn connect(db_path: &str, db_key: Option<&str>) -> Result<Self, StoreError> {
        let mut options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        if let Some(key) = db_key {
            options = options
                .pragma("key", key.to_string())
                .pragma("cipher_memory_security", "ON")
                .pragma("kdf_iter", "256000");
        }

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        sqlx::migrate!("./migrations/sqlite").run(&pool).await?;

        Ok(SqliteStore { pool: Arc::new(pool) })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        Self::connect(":memory:", None).await
    }

    /// Create a child profile with default strictness/age if one doesn't
    /// already exist. Called lazily from [`Self::insert_event`].
    #[tracing::instrument(skip(self), err)]
    pub async fn ensure_child_profile(&self, child_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO child_profile (id, name, timezone, strictness, age, created_at)
             VALUES (?1, ?1, 'UTC', 'standard', 12, ?2)",
        )
        .bind(child_id)
        .bind(now_ms())
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, data_json), err)]
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_event(
        &self,
        child_id: &str,
        ts: i64,
        kind: &str,
        url: Option<&str>,
        title: Option<&str>,
        tab_id: Option<&str>,
        referrer: Option<&str>,
        data_json: &Json,
    ) -> Result<Event, StoreError> {
        self.ensure_child_profile(child_id).await?;

        let id = format!("evt_{}", Uuid::new_v4().simple());
        let data_json_str = serde_json::to_string(data_json)?;

        sqlx::query(
            "INSERT INTO event (id, child_id, ts, kind, url, title, tab_id, referrer, data_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(child_id)
        .bind(ts)
        .bind(kind)
        .bind(url)
        .bind(title)
        .bind(tab_id)
        .bind(referrer)
        .bind(&data_json_str)
        .execute(&*self.pool)
        .await?;

        Ok(Event {
            id,
            child_id: child_id.to_string(),
            ts,
            kind: kind.to_string(),
            url: url.map(String::from),
            title: title.map(String::from),
            tab_id: tab_id.map(String::from),
            referrer: referrer.map(String::from),
            data_json: data_json.clone(),
        })
    }

    /// Replace `data_json` on an existing event (the upgrade path). Does not
    /// create a new event row.
    #[tracing::instrument(skip(self, data_json), err)]
    pub async fn upgrade_event(&self, event_id: &str, data_json: &Json) -> Result<Event, StoreError> {
        let data_json_str = serde_json::to_string(data_json)?;
        let result = sqlx::query("UPDATE event SET data_json = ?1 WHERE id = ?2")
            .bind(&data_json_str)
            .bind(event_id)
            .execute(&*self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::EventNotFound(event_id.to_string()));
        }

        self.get_event(event_id).await
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_event(&self, event_id: &str) -> Result<Event, StoreError> {
        let row: Option<EventRow> = sqlx::query_as(
            "SELECT id, child_id, ts, kind, url, title, tab_id, referrer, data_json FROM event WHERE id = ?1",
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.ok_or_else(|| StoreError::EventNotFound(event_id.to_string()))?.try_into()
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_child(&self, child_id: &str) -> Result<Option<ChildProfile>, StoreError> {
        let row: Option<ChildProfileRow> = sqlx::query_as(
            "SELECT id, name, timezone, strictness, age FROM child_profile WHERE id = ?1",
        )
        .bind(child_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(ChildProfile::from))
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn list_children(&self) -> Result<Vec<ChildProfile>, StoreError> {
        let rows: Vec<ChildProfileRow> = sqlx::query_as(
            "SELECT id, name, timezone, strictness, age FROM child_profile ORDER BY created_at ASC",
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows.into_iter().map(ChildProfile::from).collect())
    }

    /// Mutate strictness and/or age on an existing child profile. Either
    /// field may be omitted to leave it unchanged; a call with both `None`
    /// is a no-op, matching `core/db.py: update_child_profile`.
    #[tracing::instrument(skip(self), err)]
    pub async fn update_child_profile(
        &self,
        child_id: &str,
        strictness: Option<Strictness>,
        age: Option<i32>,
    ) -> Result<(), StoreError> {
        match (strictness, age) {
            (None, None) => Ok(()),
            (Some(strictness), None) => {
                sqlx::query("UPDATE child_profile SET strictness = ?1 WHERE id = ?2")
                    .bind(strictness.to_string())
                    .bind(child_id)
                    .execute(&*self.pool)
                    .await?;
                Ok(())
            }
            (None, Some(age)) => {
                sqlx::query("UPDATE child_profile SET age = ?1 WHERE id = ?2")
                    .bind(age)
                    .bind(child_id)
                    .execute(&*self.pool)
                    .await?;
                Ok(())
            }
            (Some(strictness), Some(age)) => {
                sqlx::query("UPDATE child_profile SET strictness = ?1, age = ?2 WHERE id = ?3")
                    .bind(strictness.to_string())
                    .bind(age)
                    .bind(child_id)
                    .execute(&*self.pool)
                    .await?;
                Ok(())
            }
        }
    }

    /// Children with `created_at`, for the replicator's upsert — the only
    /// caller that needs that column, so it isn't carried on
    /// [`ChildProfile`] itself.
    #[tracing::instrument(skip(self), err)]
    pub async fn list_children_for_mirror(&self) -> Result<Vec<ChildMirrorRow>, StoreError> {
        let rows: Vec<ChildMirrorRow> = sqlx::query_as(
            "SELECT id, name, timezone, strictness, age, created_at FROM child_profile ORDER BY created_at ASC",
        )
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self, scores_json), err)]
    pub async fn insert_analysis(
        &self,
        event_id: &str,
        model: &str,
        version: &str,
        scores_json: &Json,
        label: Option<&str>,
        latency_ms: i64,
    ) -> Result<String, StoreError> {
        let id = format!("ana_{}", Uuid::new_v4().simple());
        let scores_json_str = serde_json::to_string(scores_json)?;
        sqlx::query(
            "INSERT INTO analysis (id, event_id, model, version, scores_json, label, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&id)
        .bind(event_id)
        .bind(model)
        .bind(version)
        .bind(&scores_json_str)
        .bind(label)
        .bind(latency_ms)
        .execute(&*self.pool)
        .await?;
        Ok(id)
    }

    /// Insert the decision the policy engine produced. `original_action` is
    /// captured from `action` here, once, and never written again.
    #[tracing::instrument(skip(self, categories), err)]
    pub async fn insert_decision(
        &self,
        event_id: &str,
        policy_version: &str,
        action: &str,
        reason: &str,
        categories: &[String],
    ) -> Result<Decision, StoreError> {
        let id = format!("dec_{}", Uuid::new_v4().simple());
        let categories_json = serde_json::to_string(categories)?;

        sqlx::query(
            "INSERT INTO decision (id, event_id, policy_version, action, reason, categories_json, original_action)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?4)",
        )
        .bind(&id)
        .bind(event_id)
        .bind(policy_version)
        .bind(action)
        .bind(reason)
        .bind(&categories_json)
        .execute(&*self.pool)
        .await?;

        Ok(Decision::new(
            id,
            event_id.to_string(),
            policy_version.to_string(),
            action.to_string(),
            reason.to_string(),
            categories.to_vec(),
        ))
    }

    #[tracing::instrument(skip(self), err)]
    async fn get_decision(&self, decision_id: &str) -> Result<Option<Decision>, StoreError> {
        let row: Option<DecisionRow> = sqlx::query_as(
            "SELECT id, event_id, policy_version, action, reason, categories_json,
                    original_action, manual_action, manual_flagged, manual_processed, manual_updated_at
             FROM decision WHERE id = ?1",
        )
        .bind(decision_id)
        .fetch_optional(&*self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Apply a guardian override. Returns `None` (no state mutated) if the
    /// decision id doesn't exist.
    #[tracing::instrument(skip(self), err)]
    pub async fn override_decision(
        &self,
        decision_id: &str,
        new_action: &str,
    ) -> Result<Option<(Decision, Event)>, StoreError> {
        let updated_at = now_ms();
        let result = sqlx::query(
            "UPDATE decision
             SET action = ?1, manual_action = ?1, manual_flagged = 1, manual_processed = 0, manual_updated_at = ?2
             WHERE id = ?3",
        )
        .bind(new_action)
        .bind(updated_at)
        .bind(decision_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let decision = self
            .get_decision(decision_id)
            .await?
            .ok_or_else(|| StoreError::DecisionNotFound(decision_id.to_string()))?;
        let event = self.get_event(&decision.event_id).await?;
        Ok(Some((decision, event)))
    }

    /// Overrides not yet folded into guardian guidance, most recently
    /// updated first.
    #[tracing::instrument(skip(self), err)]
    pub async fn fetch_unprocessed_overrides(&self, limit: i64) -> Result<Vec<(Decision, Event)>, StoreError> {
        let rows: Vec<DecisionRow> = sqlx::query_as(
            "SELECT id, event_id, policy_version, action, reason, categories_json,
                    original_action, manual_action, manual_flagged, manual_processed, manual_updated_at
             FROM decision
             WHERE manual_flagged = 1 AND manual_processed = 0
             ORDER BY manual_updated_at DESC
             LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let decision: Decision = row.try_into()?;
            let event = self.get_event(&decision.event_id).await?;
            out.push((decision, event));
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn mark_override_processed(&self, decision_ids: &[String]) -> Result<(), StoreError> {
        if decision_ids.is_empty() {
            return Ok(());
        }
        let placeholders = decision_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("UPDATE decision SET manual_processed = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in decision_ids {
            query = query.bind(id);
        }
        query.execute(&*self.pool).await?;
        Ok(())
    }

    /// Events with `ts > cursor` (or all events, if `cursor` is `None`),
    /// ascending by `ts`, for the replicator's events sync.
    #[tracing::instrument(skip(self), err)]
    pub async fn get_events_since(&self, cursor: Option<i64>, limit: i64) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = match cursor {
            Some(cursor) => {
                sqlx::query_as(
                    "SELECT id, child_id, ts, kind, url, title, tab_id, referrer, data_json
                     FROM event WHERE ts > ?1 ORDER BY ts ASC LIMIT ?2",
                )
                .bind(cursor)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, child_id, ts, kind, url, title, tab_id, referrer, data_json
                     FROM event ORDER BY ts ASC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Decisions (joined to their event) where `max(event.ts,
    /// manual_updated_at) > cursor`, ascending by that same expression, for
    /// the replicator's decisions sync. Each returned tuple carries the
    /// cursor value that row contributes.
    #[tracing::instrument(skip(self), err)]
    pub async fn get_decisions_since(
        &self,
        cursor: Option<i64>,
        limit: i64,
    ) -> Result<Vec<(Decision, Event, i64)>, StoreError> {
        let rows: Vec<DecisionWithCursorRow> = match cursor {
            Some(cursor) => {
                sqlx::query_as(
                    "SELECT d.id, d.event_id, d.policy_version, d.action, d.reason, d.categories_json,
                            d.original_action, d.manual_action, d.manual_flagged, d.manual_processed, d.manual_updated_at,
                            MAX(e.ts, COALESCE(d.manual_updated_at, 0)) AS cursor_value
                     FROM decision d JOIN event e ON e.id = d.event_id
                     WHERE MAX(e.ts, COALESCE(d.manual_updated_at, 0)) > ?1
                     ORDER BY cursor_value ASC
                     LIMIT ?2",
                )
                .bind(cursor)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT d.id, d.event_id, d.policy_version, d.action, d.reason, d.categories_json,
                            d.original_action, d.manual_action, d.manual_flagged, d.manual_processed, d.manual_updated_at,
                            MAX(e.ts, COALESCE(d.manual_updated_at, 0)) AS cursor_value
                     FROM decision d JOIN event e ON e.id = d.event_id
                     ORDER BY cursor_value ASC
                     LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let (decision, cursor_value): (Decision, i64) = row.try_into()?;
            let event = self.get_event(&decision.event_id).await?;
            out.push((decision, event, cursor_value));
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_recent_events(&self, child_id: Option<&str>, limit: i64) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<EventRow> = match child_id {
            Some(child_id) => {
                sqlx::query_as(
                    "SELECT id, child_id, ts, kind, url, title, tab_id, referrer, data_json
                     FROM event WHERE child_id = ?1 ORDER BY ts DESC LIMIT ?2",
                )
                .bind(child_id)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, child_id, ts, kind, url, title, tab_id, referrer, data_json
                     FROM event ORDER BY ts DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_recent_decisions(
        &self,
        child_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<(Decision, Event)>, StoreError> {
        let rows: Vec<DecisionRow> = match child_id {
            Some(child_id) => {
                sqlx::query_as(
                    "SELECT d.id, d.event_id, d.policy_version, d.action, d.reason, d.categories_json,
                            d.original_action, d.manual_action, d.manual_flagged, d.manual_processed, d.manual_updated_at
                     FROM decision d JOIN event e ON e.id = d.event_id
                     WHERE e.child_id = ?1 ORDER BY e.ts DESC LIMIT ?2",
                )
                .bind(child_id)
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT d.id, d.event_id, d.policy_version, d.action, d.reason, d.categories_json,
                            d.original_action, d.manual_action, d.manual_flagged, d.manual_processed, d.manual_updated_at
                     FROM decision d JOIN event e ON e.id = d.event_id
                     ORDER BY e.ts DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&*self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let decision: Decision = row.try_into()?;
            let event = self.get_event(&decision.event_id).await?;
            out.push((decision, event));
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    #[tracing::instrument(skip(self, value), err)]
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn delete_setting(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_active_child(&self) -> Result<Option<String>, StoreError> {
        self.get_setting("active_child_id").await
    }

    pub async fn set_active_child(&self, child_id: &str) -> Result<(), StoreError> {
        self.set_setting("active_child_id", child_id).await
    }
}
