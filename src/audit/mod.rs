//! Append-only audit trail for security-relevant events.
//!
//! `record` never blocks the caller: events go onto a bounded queue drained by
//! a background worker that persists them through an [`AuditSink`] with timeout
//! and bounded retry. If the queue is full or the sink stays unavailable, the
//! event is escalated to an [`AlertChannel`] instead of being dropped.
//!
//! Every free-text field is treated as hostile: control characters are escaped
//! and lengths are capped before the event is built.

pub mod alert;
pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};
use utoipa::ToSchema;

pub use alert::{AlertChannel, LogAlert, WebhookAlert};
pub use sink::{AuditSink, MemorySink, PgSink};

use crate::auth::{
    clock::Clock,
    error::DependencyError,
    retry::{RetryPolicy, with_retry},
};

pub const MAX_ACTOR_LEN: usize = 256;
pub const MAX_TARGET_LEN: usize = 256;
pub const MAX_DETAIL_LEN: usize = 1024;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailure,
    LoginLockout,
    LoginRateLimited,
    Logout,
    PasswordChanged,
    AdminCreated,
    AdminActivated,
    AdminDeactivated,
    AdminPromoted,
    AdminDemoted,
    UserBlocked,
    UserUnblocked,
    UserDeleted,
    BulkBlock,
    ReportResolved,
    RateLimited,
    AccessDenied,
    BootstrapAdmin,
}

impl AuditEventType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::LoginLockout => "LOGIN_LOCKOUT",
            Self::LoginRateLimited => "LOGIN_RATE_LIMITED",
            Self::Logout => "LOGOUT",
            Self::PasswordChanged => "PASSWORD_CHANGED",
            Self::AdminCreated => "ADMIN_CREATED",
            Self::AdminActivated => "ADMIN_ACTIVATED",
            Self::AdminDeactivated => "ADMIN_DEACTIVATED",
            Self::AdminPromoted => "ADMIN_PROMOTED",
            Self::AdminDemoted => "ADMIN_DEMOTED",
            Self::UserBlocked => "USER_BLOCKED",
            Self::UserUnblocked => "USER_UNBLOCKED",
            Self::UserDeleted => "USER_DELETED",
            Self::BulkBlock => "BULK_BLOCK",
            Self::ReportResolved => "REPORT_RESOLVED",
            Self::RateLimited => "RATE_LIMITED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::BootstrapAdmin => "BOOTSTRAP_ADMIN",
        }
    }

    const ALL: [Self; 19] = [
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::LoginLockout,
        Self::LoginRateLimited,
        Self::Logout,
        Self::PasswordChanged,
        Self::AdminCreated,
        Self::AdminActivated,
        Self::AdminDeactivated,
        Self::AdminPromoted,
        Self::AdminDemoted,
        Self::UserBlocked,
        Self::UserUnblocked,
        Self::UserDeleted,
        Self::BulkBlock,
        Self::ReportResolved,
        Self::RateLimited,
        Self::AccessDenied,
        Self::BootstrapAdmin,
    ];
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| anyhow::anyhow!("unknown audit event type: {value}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// ULID; sorts by creation time.
    pub id: String,
    pub event_type: AuditEventType,
    pub actor: String,
    pub target_id: Option<String>,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Build an event with sanitized fields.
    #[must_use]
    pub fn new(
        event_type: AuditEventType,
        actor: &str,
        target_id: Option<&str>,
        detail: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            event_type,
            actor: sanitize(actor, MAX_ACTOR_LEN),
            target_id: target_id.map(|target| sanitize(target, MAX_TARGET_LEN)),
            detail: sanitize(detail, MAX_DETAIL_LEN),
            timestamp,
        }
    }
}

/// Escape control and line-separator characters, then cap at `max_chars`.
#[must_use]
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let mut escaped = String::with_capacity(input.len().min(max_chars));
    // Escaping only grows the text, so anything past max_chars + 1 is cut anyway.
    for ch in input.chars().take(max_chars + 1) {
        if ch.is_control() || matches!(ch, '\u{2028}' | '\u{2029}') {
            escaped.extend(ch.escape_default());
        } else {
            escaped.push(ch);
        }
    }
    if escaped.chars().count() > max_chars {
        let truncated: String = escaped.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        escaped
    }
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    queue_capacity: usize,
    retry: RetryPolicy,
}

impl AuditConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self::new()
    }
}

enum Command {
    Event(AuditEvent),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<Command>,
    sink: Arc<dyn AuditSink>,
    alert: Arc<dyn AlertChannel>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    /// Start the persistence worker. The worker stops once every logger clone
    /// has been dropped and the queue is drained.
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        alert: Arc<dyn AlertChannel>,
        config: AuditConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity());
        let handle = tokio::spawn(run_worker(
            rx,
            sink.clone(),
            alert.clone(),
            config.retry().clone(),
        ));
        let logger = Self {
            tx,
            sink,
            alert,
            retry: config.retry().clone(),
            clock,
        };
        (logger, handle)
    }

    /// Queue an event. Never waits on the sink.
    pub fn record(
        &self,
        event_type: AuditEventType,
        actor: &str,
        target_id: Option<&str>,
        detail: &str,
    ) {
        let event = AuditEvent::new(event_type, actor, target_id, detail, self.clock.now());
        info!(
            audit.id = %event.id,
            audit.event = %event.event_type,
            audit.actor = %event.actor,
            audit.target = event.target_id.as_deref().unwrap_or("-"),
            "{}",
            event.detail
        );

        if let Err(err) = self.tx.try_send(Command::Event(event)) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "audit queue full",
                mpsc::error::TrySendError::Closed(_) => "audit worker stopped",
            };
            let Command::Event(event) = err.into_inner() else {
                return;
            };
            let alert = self.alert.clone();
            tokio::spawn(async move { alert.escalate(&event, reason).await });
        }
    }

    /// Wait until every event queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Newest events first.
    ///
    /// # Errors
    /// `DependencyError` if the sink cannot be read.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, DependencyError> {
        let sink = &self.sink;
        with_retry(&self.retry, "audit read", move || sink.recent(limit)).await
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("capacity", &self.tx.max_capacity())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Command>,
    sink: Arc<dyn AuditSink>,
    alert: Arc<dyn AlertChannel>,
    retry: RetryPolicy,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Event(event) => {
                let target = &event;
                let sink = &sink;
                let result =
                    with_retry(&retry, "audit append", move || sink.append(target)).await;
                if let Err(err) = result {
                    error!(audit.id = %event.id, "audit append failed: {err}");
                    alert.escalate(&event, "audit sink unavailable").await;
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
