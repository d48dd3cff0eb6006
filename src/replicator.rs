//! The resumable SQLite→Postgres mirror.
//!
//! Grounded in `runtime/pg_replicator.py: PostgresReplicator` — same cycle
//! shape (ensure schema, upsert children, sync events, sync decisions),
//! same settings-stored cursors (`pg_last_event_ts`, `pg_last_decision_ts`),
//! same `original_action` preservation on the decisions upsert. Schema is
//! ensured with idempotent DDL on every cycle rather than through
//! `sqlx::migrate!`, matching `_ensure_schema` being called unconditionally
//! on every `sync_once`.

use sqlx::PgPool;

use crate::error::ReplicatorError;
use crate::store::SqliteStore;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_BATCH_SIZE: i64 = 100;

const SETTING_LAST_EVENT_TS: &str = "pg_last_event_ts";
const SETTING_LAST_DECISION_TS: &str = "pg_last_decision_ts";

/// Counts from one replication cycle, for logging and `run_forever`'s
/// "only log when something moved" behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub events: usize,
    pub decisions: usize,
    pub children: usize,
}

impl SyncCounts {
    pub fn is_empty(&self) -> bool {
        self.events == 0 && self.decisions == 0 && self.children == 0
    }
}

pub struct Replicator {
    local: SqliteStore,
    pg: PgPool,
    poll_interval: std::time::Duration,
    batch_size: i64,
}

impl Replicator {
    /// Connect to the secondary Postgres database. Does not run the first
    /// sync cycle; call [`Self::sync_once`] or [`Self::run_forever`].
    pub async fn connect(local: SqliteStore, pg_dsn: &str) -> Result<Self, ReplicatorError> {
        let pg = PgPool::connect(pg_dsn).await?;
        Ok(Replicator {
            local,
            pg,
            poll_interval: std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Run forever on the configured interval until `cancel` fires.
    /// In-flight cycles always finish before exit.
    pub async fn run_forever(&self, mut cancel: tokio::sync::watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.poll_interval.as_secs(), batch_size = self.batch_size, "starting postgres replicator");
        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    match self.sync_once().await {
                        Ok(counts) if !counts.is_empty() => {
                            tracing::info!(
                                events = counts.events,
                                decisions = counts.decisions,
                                children = counts.children,
                                "replication cycle synced rows"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => tracing::error!(error = %err, "postgres replication failed"),
                    }
                }
            }
        }
        tracing::info!("postgres replicator stopped");
    }

    /// One replication cycle: schema, children, events, decisions. Exposed
    /// directly for the (out-of-scope) read API's on-demand sync.
    #[tracing::instrument(skip(self), err)]
    pub async fn sync_once(&self) -> Result<SyncCounts, ReplicatorError> {
        self.ensure_schema().await?;
        let children = self.sync_children().await?;
        let events = self.sync_events().await?;
        let decisions = self.sync_decisions().await?;
        Ok(SyncCounts { events, decisions, children })
    }

    async fn ensure_schema(&self) -> Result<(), ReplicatorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS watchit_events (
                id TEXT PRIMARY KEY,
                child_id TEXT,
                ts BIGINT,
                kind TEXT,
                url TEXT,
                title TEXT,
                tab_id TEXT,
                referrer TEXT,
                data_json JSONB
            )",
        )
        .execute(&self.pg)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS watchit_decisions (
                id TEXT PRIMARY KEY,
                event_id TEXT REFERENCES watchit_events(id) ON DELETE CASCADE,
                policy_version TEXT,
                action TEXT,
                reason TEXT,
                details_json JSONB,
                original_action TEXT,
                manual_action TEXT,
                manual_flagged BOOLEAN DEFAULT FALSE,
                manual_processed BOOLEAN DEFAULT FALSE,
                manual_updated_at BIGINT
            )",
        )
        .execute(&self.pg)
        .await?;

        for stmt in [
            "ALTER TABLE watchit_decisions ADD COLUMN IF NOT EXISTS original_action TEXT",
            "ALTER TABLE watchit_decisions ADD COLUMN IF NOT EXISTS manual_action TEXT",
            "ALTER TABLE watchit_decisions ADD COLUMN IF NOT EXISTS manual_flagged BOOLEAN DEFAULT FALSE",
            "ALTER TABLE watchit_decisions ADD COLUMN IF NOT EXISTS manual_processed BOOLEAN DEFAULT FALSE",
            "ALTER TABLE watchit_decisions ADD COLUMN IF NOT EXISTS manual_updated_at BIGINT",
        ] {
            sqlx::query(stmt).execute(&self.pg).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS watchit_children (
                id TEXT PRIMARY KEY,
                name TEXT,
                timezone TEXT,
                strictness TEXT,
                age INTEGER,
                created_at BIGINT
            )",
        )
        .execute(&self.pg)
        .await?;

        Ok(())
    }

    async fn sync_children(&self) -> Result<usize, ReplicatorError> {
        let children = self.local.list_children_for_mirror().await?;
        for child in &children {
            sqlx::query(
                "INSERT INTO watchit_children (id, name, timezone, strictness, age, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    timezone = EXCLUDED.timezone,
                    strictness = EXCLUDED.strictness,
                    age = EXCLUDED.age,
                    created_at = EXCLUDED.created_at",
            )
            .bind(&child.id)
            .bind(&child.name)
            .bind(&child.timezone)
            .bind(&child.strictness)
            .bind(child.age)
            .bind(child.created_at)
            .execute(&self.pg)
            .await?;
        }
        Ok(children.len())
    }

    async fn sync_events(&self) -> Result<usize, ReplicatorError> {
        let cursor = self.get_cursor(SETTING_LAST_EVENT_TS).await?;
        let events = self.local.get_events_since(cursor, self.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }

        for event in &events {
            sqlx::query(
                "INSERT INTO watchit_events (id, child_id, ts, kind, url, title, tab_id, referrer, data_json)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&event.id)
            .bind(&event.child_id)
            .bind(event.ts)
            .bind(&event.kind)
            .bind(&event.url)
            .bind(&event.title)
            .bind(&event.tab_id)
            .bind(&event.referrer)
            .bind(&event.data_json)
            .execute(&self.pg)
            .await?;
        }

        let latest_ts = events.iter().map(|e| e.ts).max().unwrap_or(0);
        self.set_cursor(SETTING_LAST_EVENT_TS, latest_ts).await?;
        Ok(events.len())
    }

    async fn sync_decisions(&self) -> Result<usize, ReplicatorError> {
        let cursor = self.get_cursor(SETTING_LAST_DECISION_TS).await?;
        let rows = self.local.get_decisions_since(cursor, self.batch_size).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        for (decision, _event, _cursor_value) in &rows {
            let details_json = serde_json::to_value(&decision.categories)?;
            sqlx::query(
                "INSERT INTO watchit_decisions
                    (id, event_id, policy_version, action, reason, details_json,
                     original_action, manual_action, manual_flagged, manual_processed, manual_updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (id) DO UPDATE SET
                    action = EXCLUDED.action,
                    reason = EXCLUDED.reason,
                    details_json = EXCLUDED.details_json,
                    original_action = COALESCE(watchit_decisions.original_action, EXCLUDED.original_action),
                    manual_action = EXCLUDED.manual_action,
                    manual_flagged = EXCLUDED.manual_flagged,
                    manual_processed = EXCLUDED.manual_processed,
                    manual_updated_at = EXCLUDED.manual_updated_at",
            )
            .bind(&decision.id)
            .bind(&decision.event_id)
            .bind(&decision.policy_version)
            .bind(&decision.action)
            .bind(&decision.reason)
            .bind(&details_json)
            .bind(&decision.original_action)
            .bind(&decision.manual_action)
            .bind(decision.manual_flagged)
            .bind(decision.manual_processed)
            .bind(decision.manual_updated_at)
            .execute(&self.pg)
            .await?;
        }

        let latest_cursor = rows.iter().map(|(_, _, cursor)| *cursor).max().unwrap_or(0);
        self.set_cursor(SETTING_LAST_DECISION_TS, latest_cursor).await?;
        Ok(rows.len())
    }

    async fn get_cursor(&self, key: &str) -> Result<Option<i64>, ReplicatorError> {
        Ok(self.local.get_setting(key).await?.and_then(|raw| raw.parse().ok()))
    }

    async fn set_cursor(&self, key: &str, value: i64) -> Result<(), ReplicatorError> {
        self.local.set_setting(key, &value.to_string()).await?;
        Ok(())
    }
}
