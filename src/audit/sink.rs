//! Audit persistence backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use tracing::{Instrument, info_span};

use super::AuditEvent;

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event. Appending the same id twice must not duplicate it.
    async fn append(&self, event: &AuditEvent) -> Result<()>;

    /// Newest events first.
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>>;
}

#[derive(Debug, Default)]
pub struct MemorySink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if !events.iter().any(|existing| existing.id == event.id) {
            events.push(event.clone());
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().rev().take(limit).cloned().collect())
    }
}

#[derive(Clone, Debug)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgSink {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let query = r"
            INSERT INTO audit_events (id, event_type, actor, target_id, detail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        sqlx::query(query)
            .bind(&event.id)
            .bind(event.event_type.as_str())
            .bind(&event.actor)
            .bind(&event.target_id)
            .bind(&event.detail)
            .bind(event.timestamp)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit event")?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let query = r"
            SELECT id, event_type, actor, target_id, detail, created_at
            FROM audit_events
            ORDER BY id DESC
            LIMIT $1
        ";
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        let rows = sqlx::query(query)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to read audit events")?;

        rows.iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type")?;
                Ok(AuditEvent {
                    id: row.try_get("id")?,
                    event_type: event_type.parse()?,
                    actor: row.try_get("actor")?,
                    target_id: row.try_get("target_id")?,
                    detail: row.try_get("detail")?,
                    timestamp: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
