//! Administrative operations over admin accounts and the chat directory.
//!
//! Every operation takes the caller's [`Principal`] (resolved from the session,
//! never from request data), checks the role held in the credential store,
//! applies the per-actor rate limit for the action and writes an audit event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType, AuditLogger};
use crate::auth::{
    AuthError, Clock, CredentialStore, DependencyError, NewAccount, Principal,
    RateLimitAction, RateLimitDecision, RateLimiter, RetryPolicy, SessionIssuer,
    ValidationError, retry::with_retry,
};
use crate::auth::password::generate_password;
use crate::storage::{
    AdminAccount, AdminRole, DirectoryRepository, DirectoryStats, DirectoryUser, Report,
    ReportStatus,
};

pub const MAX_BULK_IDS: usize = 100;
pub const MAX_AUDIT_PAGE: usize = 500;

/// Admin account as exposed to other admins. Never carries the hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdminSummary {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<AdminAccount> for AdminSummary {
    fn from(account: AdminAccount) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
            is_active: account.is_active,
            created_at: account.created_at,
            created_by: account.created_by,
            last_login_at: account.last_login_at,
        }
    }
}

/// A newly created admin. `generated_password` is set only when the caller let
/// the server pick the password, and is never stored or shown again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CreatedAdmin {
    #[serde(flatten)]
    pub admin: AdminSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_password: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkBlockResult {
    pub blocked: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
}

/// Account status/role transitions available to super admins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminUpdate {
    Activate,
    Deactivate,
    Promote,
    Demote,
}

impl AdminUpdate {
    fn event_type(self) -> AuditEventType {
        match self {
            Self::Activate => AuditEventType::AdminActivated,
            Self::Deactivate => AuditEventType::AdminDeactivated,
            Self::Promote => AuditEventType::AdminPromoted,
            Self::Demote => AuditEventType::AdminDemoted,
        }
    }
}

pub struct AdminService {
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionIssuer>,
    directory: Arc<dyn DirectoryRepository>,
    limiter: Arc<RateLimiter>,
    audit: AuditLogger,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionIssuer>,
        directory: Arc<dyn DirectoryRepository>,
        limiter: Arc<RateLimiter>,
        audit: AuditLogger,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            directory,
            limiter,
            audit,
            retry,
            clock,
        }
    }

    /// # Errors
    /// `Forbidden` unless super admin, `Dependency` on store failure.
    pub async fn list_admins(&self, actor: &Principal) -> Result<Vec<AdminSummary>, AuthError> {
        self.require_super_admin(actor, "list admins")?;
        let admins = self.credentials.list().await?;
        Ok(admins.into_iter().map(AdminSummary::from).collect())
    }

    /// Create an admin. Without `password` a strong one is generated and
    /// returned once.
    ///
    /// # Errors
    /// `Forbidden`, `Lockout` when throttled, `Validation` for bad input.
    pub async fn create_admin(
        &self,
        actor: &Principal,
        email: &str,
        password: Option<&str>,
        name: &str,
        role: AdminRole,
    ) -> Result<CreatedAdmin, AuthError> {
        self.require_super_admin(actor, "create admin")?;
        self.throttle(actor, RateLimitAction::CreateAdmin).await?;

        let generated_password = password.is_none().then(generate_password);
        let account = self
            .credentials
            .create(NewAccount {
                email,
                password: password.or(generated_password.as_deref()).unwrap_or_default(),
                name,
                role,
                created_by: Some(actor.id),
            })
            .await?;
        self.record(
            actor,
            AuditEventType::AdminCreated,
            &account.id.to_string(),
            &format!(
                "created {} with role {}{}",
                account.email,
                account.role,
                if generated_password.is_some() { ", generated password" } else { "" }
            ),
        );
        Ok(CreatedAdmin {
            admin: account.into(),
            generated_password,
        })
    }

    /// Activate, deactivate, promote or demote another admin.
    ///
    /// # Errors
    /// `Forbidden`, `Lockout` when throttled, `Validation` for self-modification,
    /// `NotFound` for an unknown id.
    pub async fn update_admin(
        &self,
        actor: &Principal,
        target: Uuid,
        update: AdminUpdate,
    ) -> Result<AdminSummary, AuthError> {
        self.require_super_admin(actor, "update admin")?;
        if target == actor.id {
            return Err(ValidationError::SelfModification.into());
        }
        self.throttle(actor, RateLimitAction::UpdateAdmin).await?;

        let account = match update {
            AdminUpdate::Activate => self.credentials.set_active(target, true).await?,
            AdminUpdate::Deactivate => self.credentials.set_active(target, false).await?,
            AdminUpdate::Promote => self.credentials.promote(target).await?,
            AdminUpdate::Demote => self.credentials.demote(target).await?,
        };
        // Sessions of the target pick up the change on their next request.
        self.sessions.invalidate(target).await;

        self.record(
            actor,
            update.event_type(),
            &target.to_string(),
            &format!("{} is now {} ({})", account.email, account.role, status(&account)),
        );
        Ok(account.into())
    }

    /// # Errors
    /// `Lockout` when throttled, `Dependency` on store failure.
    pub async fn list_users(&self, actor: &Principal) -> Result<Vec<DirectoryUser>, AuthError> {
        self.throttle(actor, RateLimitAction::LoadUsers).await?;
        let directory = &self.directory;
        Ok(with_retry(&self.retry, "directory list", move || directory.list_users()).await?)
    }

    /// Overview counts: total users, blocked users, pending reports.
    ///
    /// # Errors
    /// `Lockout` when throttled, `Dependency` on store failure.
    pub async fn stats(&self, actor: &Principal) -> Result<DirectoryStats, AuthError> {
        self.throttle(actor, RateLimitAction::LoadStats).await?;
        let directory = &self.directory;
        Ok(with_retry(&self.retry, "directory stats", move || directory.stats()).await?)
    }

    /// # Errors
    /// `Lockout` when throttled, `NotFound` for an unknown user.
    pub async fn set_user_blocked(
        &self,
        actor: &Principal,
        user_id: Uuid,
        blocked: bool,
    ) -> Result<DirectoryUser, AuthError> {
        self.throttle(actor, RateLimitAction::BlockUser).await?;
        let user = self
            .block(actor, user_id, blocked)
            .await?
            .ok_or(AuthError::NotFound)?;

        let (event, verb) = if blocked {
            (AuditEventType::UserBlocked, "blocked")
        } else {
            (AuditEventType::UserUnblocked, "unblocked")
        };
        self.record(actor, event, &user_id.to_string(), &format!("{verb} {}", user.email));
        Ok(user)
    }

    /// Block up to [`MAX_BULK_IDS`] users in one call. Unknown ids are reported,
    /// not treated as errors. A store failure stops the loop; the users blocked
    /// before it are still audited.
    ///
    /// # Errors
    /// `Validation` for an empty or oversized list, `Lockout` when throttled,
    /// `Dependency` when the store fails partway.
    pub async fn bulk_block(
        &self,
        actor: &Principal,
        user_ids: &[Uuid],
    ) -> Result<BulkBlockResult, AuthError> {
        if user_ids.is_empty() {
            return Err(ValidationError::Invalid("no user ids given".to_string()).into());
        }
        if user_ids.len() > MAX_BULK_IDS {
            return Err(ValidationError::Invalid(format!(
                "at most {MAX_BULK_IDS} users can be blocked at once"
            ))
            .into());
        }
        self.throttle(actor, RateLimitAction::BulkBlock).await?;

        let mut seen = HashSet::new();
        let mut result = BulkBlockResult::default();
        let mut failure = None;
        for &user_id in user_ids.iter().filter(|id| seen.insert(**id)) {
            match self.block(actor, user_id, true).await {
                Ok(Some(_)) => result.blocked.push(user_id),
                Ok(None) => result.not_found.push(user_id),
                Err(err) => {
                    failure = Some((user_id, err));
                    break;
                }
            }
        }

        let mut detail = format!(
            "blocked {} user(s), {} unknown",
            result.blocked.len(),
            result.not_found.len()
        );
        if let Some((user_id, err)) = &failure {
            detail.push_str(&format!(", stopped at {user_id}: {err}"));
        }
        self.audit
            .record(AuditEventType::BulkBlock, &actor.email, None, &detail);

        match failure {
            Some((_, err)) => Err(err.into()),
            None => Ok(result),
        }
    }

    /// # Errors
    /// `Lockout` when throttled, `NotFound` for an unknown user.
    pub async fn delete_user(&self, actor: &Principal, user_id: Uuid) -> Result<(), AuthError> {
        self.throttle(actor, RateLimitAction::DeleteUser).await?;

        // Deletes are not retried: a lost acknowledgement would turn into NotFound.
        let single = self.retry.clone().with_attempts(1);
        let directory = &self.directory;
        let deleted =
            with_retry(&single, "directory delete", move || directory.delete_user(user_id))
                .await?;
        if !deleted {
            return Err(AuthError::NotFound);
        }

        self.record(actor, AuditEventType::UserDeleted, &user_id.to_string(), "user deleted");
        info!(user = %user_id, actor = %actor.id, "directory user deleted");
        Ok(())
    }

    /// # Errors
    /// `Lockout` when throttled, `Dependency` on store failure.
    pub async fn list_reports(
        &self,
        actor: &Principal,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>, AuthError> {
        self.throttle(actor, RateLimitAction::LoadReports).await?;
        let directory = &self.directory;
        Ok(with_retry(&self.retry, "report list", move || {
            directory.list_reports(status)
        })
        .await?)
    }

    /// Resolve a report. `Approved` also blocks the reported user. The
    /// resolution is audited even when that block fails.
    ///
    /// # Errors
    /// `Validation` when resolving to `pending`, `Lockout` when throttled,
    /// `NotFound` for an unknown report, `Dependency` when the follow-up block
    /// fails (resolving again retries it).
    pub async fn resolve_report(
        &self,
        actor: &Principal,
        report_id: Uuid,
        status: ReportStatus,
    ) -> Result<Report, AuthError> {
        if status == ReportStatus::Pending {
            return Err(
                ValidationError::Invalid("a report cannot be resolved as pending".to_string())
                    .into(),
            );
        }
        self.throttle(actor, RateLimitAction::ResolveReport).await?;

        let now = self.clock.now();
        let directory = &self.directory;
        let by = actor.id;
        let report = with_retry(&self.retry, "report resolve", move || {
            directory.resolve_report(report_id, status, by, now)
        })
        .await?
        .ok_or(AuthError::NotFound)?;

        let blocked = if status == ReportStatus::Approved {
            self.block(actor, report.reported_user_id, true).await
        } else {
            Ok(None)
        };

        let detail = match &blocked {
            Ok(Some(_)) => {
                self.record(
                    actor,
                    AuditEventType::UserBlocked,
                    &report.reported_user_id.to_string(),
                    &format!("blocked {} via report {report_id}", report.reported_user_email),
                );
                format!("report {}", status.as_str())
            }
            Ok(None) => format!("report {}", status.as_str()),
            Err(err) => format!(
                "report {}, blocking {} failed: {err}",
                status.as_str(),
                report.reported_user_email
            ),
        };
        self.record(
            actor,
            AuditEventType::ReportResolved,
            &report_id.to_string(),
            &detail,
        );

        blocked?;
        Ok(report)
    }

    /// Newest audit events, capped at [`MAX_AUDIT_PAGE`].
    ///
    /// # Errors
    /// `Forbidden` unless super admin, `Dependency` if the sink is unreadable.
    pub async fn audit_trail(
        &self,
        actor: &Principal,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, AuthError> {
        self.require_super_admin(actor, "read audit trail")?;
        Ok(self.audit.recent(limit.clamp(1, MAX_AUDIT_PAGE)).await?)
    }

    async fn block(
        &self,
        actor: &Principal,
        user_id: Uuid,
        blocked: bool,
    ) -> Result<Option<DirectoryUser>, DependencyError> {
        let now = self.clock.now();
        let directory = &self.directory;
        let by = actor.id;
        with_retry(&self.retry, "directory block", move || {
            directory.set_blocked(user_id, blocked, by, now)
        })
        .await
    }

    fn require_super_admin(&self, actor: &Principal, action: &str) -> Result<(), AuthError> {
        if actor.is_super_admin() {
            return Ok(());
        }
        self.audit.record(
            AuditEventType::AccessDenied,
            &actor.email,
            Some(&actor.id.to_string()),
            &format!("{action} requires super admin"),
        );
        Err(AuthError::Forbidden)
    }

    async fn throttle(&self, actor: &Principal, action: RateLimitAction) -> Result<(), AuthError> {
        match self.limiter.check(action, &actor.id.to_string()).await {
            RateLimitDecision::Allowed => Ok(()),
            RateLimitDecision::Limited { retry_after } => {
                self.audit.record(
                    AuditEventType::RateLimited,
                    &actor.email,
                    Some(&actor.id.to_string()),
                    action.as_str(),
                );
                Err(AuthError::Lockout { retry_after })
            }
        }
    }

    fn record(&self, actor: &Principal, event: AuditEventType, target: &str, detail: &str) {
        self.audit.record(event, &actor.email, Some(target), detail);
    }
}

fn status(account: &AdminAccount) -> &'static str {
    if account.is_active { "active" } else { "inactive" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditConfig, LogAlert, MemorySink};
    use crate::auth::credentials::tests::{STRONG, fast_retry};
    use crate::auth::password::test_hasher;
    use crate::auth::{ManualClock, RateLimitPolicy};
    use crate::storage::memory::{MemoryAccounts, MemoryDirectory};
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::SecretSlice;
    use std::time::Duration;

    /// Directory whose block updates fail for one user, standing in for a
    /// database that drops out partway through a request.
    struct FailsOn {
        inner: Arc<MemoryDirectory>,
        user: Uuid,
    }

    #[async_trait]
    impl DirectoryRepository for FailsOn {
        async fn insert_user(&self, user: &DirectoryUser) -> Result<()> {
            self.inner.insert_user(user).await
        }
        async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
            self.inner.list_users().await
        }
        async fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>> {
            self.inner.find_user(id).await
        }
        async fn set_blocked(
            &self,
            id: Uuid,
            blocked: bool,
            by: Uuid,
            at: DateTime<Utc>,
        ) -> Result<Option<DirectoryUser>> {
            if id == self.user {
                return Err(anyhow::anyhow!("connection reset"));
            }
            self.inner.set_blocked(id, blocked, by, at).await
        }
        async fn delete_user(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_user(id).await
        }
        async fn insert_report(&self, report: &Report) -> Result<()> {
            self.inner.insert_report(report).await
        }
        async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
            self.inner.list_reports(status).await
        }
        async fn resolve_report(
            &self,
            id: Uuid,
            status: ReportStatus,
            by: Uuid,
            at: DateTime<Utc>,
        ) -> Result<Option<Report>> {
            self.inner.resolve_report(id, status, by, at).await
        }
        async fn stats(&self) -> Result<DirectoryStats> {
            self.inner.stats().await
        }
    }

    struct Fixture {
        service: AdminService,
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionIssuer>,
        directory: Arc<MemoryDirectory>,
        audit: AuditLogger,
        root: Principal,
        plain: Principal,
    }

    async fn principal(credentials: &CredentialStore, email: &str, role: AdminRole) -> Result<Principal> {
        let account = credentials
            .create(NewAccount {
                email,
                password: STRONG,
                name: "Fixture",
                role,
                created_by: None,
            })
            .await?;
        Ok(Principal {
            id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
            expires_at: Utc::now(),
        })
    }

    async fn fixture_with(limiter: RateLimiter, clock: Arc<ManualClock>) -> Result<Fixture> {
        let directory = Arc::new(MemoryDirectory::new());
        fixture_over(limiter, clock, directory.clone(), directory).await
    }

    async fn fixture_over(
        limiter: RateLimiter,
        clock: Arc<ManualClock>,
        directory: Arc<MemoryDirectory>,
        repository: Arc<dyn DirectoryRepository>,
    ) -> Result<Fixture> {
        let credentials = Arc::new(CredentialStore::new(
            Arc::new(MemoryAccounts::new()),
            test_hasher(),
            fast_retry(),
            clock.clone(),
        )?);
        let sessions = Arc::new(SessionIssuer::new(
            SecretSlice::from(vec![3u8; 32]),
            Duration::from_secs(3600),
            Duration::from_secs(5),
            credentials.clone(),
            clock.clone(),
        )?);
        let (audit, _worker) = AuditLogger::spawn(
            Arc::new(MemorySink::new()),
            Arc::new(LogAlert),
            AuditConfig::new(),
            clock.clone(),
        );
        let service = AdminService::new(
            credentials.clone(),
            sessions.clone(),
            repository,
            Arc::new(limiter),
            audit.clone(),
            fast_retry(),
            clock,
        );
        let root = principal(&credentials, "root@x.com", AdminRole::SuperAdmin).await?;
        let plain = principal(&credentials, "plain@x.com", AdminRole::Admin).await?;
        Ok(Fixture {
            service,
            credentials,
            sessions,
            directory,
            audit,
            root,
            plain,
        })
    }

    async fn fixture() -> Result<Fixture> {
        let clock = Arc::new(ManualClock::default());
        fixture_with(RateLimiter::new(clock.clone()), clock).await
    }

    /// Fixture whose directory fails to block `user` once it exists.
    async fn failing_fixture() -> Result<(Fixture, DirectoryUser)> {
        let clock = Arc::new(ManualClock::default());
        let directory = Arc::new(MemoryDirectory::new());
        let doomed = seed_user(&directory, "doomed@x.com").await?;
        let repository = Arc::new(FailsOn {
            inner: directory.clone(),
            user: doomed.id,
        });
        let fx = fixture_over(RateLimiter::new(clock.clone()), clock, directory, repository).await?;
        Ok((fx, doomed))
    }

    fn report_against(user: &DirectoryUser) -> Report {
        Report {
            id: Uuid::new_v4(),
            reporter_email: "victim@x.com".to_string(),
            reported_user_id: user.id,
            reported_user_email: user.email.clone(),
            reason: "spam".to_string(),
            details: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    async fn seed_user(directory: &MemoryDirectory, email: &str) -> Result<DirectoryUser> {
        let user = DirectoryUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: email.to_string(),
            is_blocked: false,
            blocked_at: None,
            blocked_by: None,
            created_at: Utc::now(),
        };
        directory.insert_user(&user).await?;
        Ok(user)
    }

    #[tokio::test]
    async fn only_super_admins_manage_admins() -> Result<()> {
        let fx = fixture().await?;

        let denied = fx
            .service
            .create_admin(&fx.plain, "new@x.com", Some(STRONG), "New", AdminRole::Admin)
            .await;
        assert_eq!(denied.err(), Some(AuthError::Forbidden));
        assert_eq!(
            fx.service.list_admins(&fx.plain).await.err(),
            Some(AuthError::Forbidden)
        );

        let created = fx
            .service
            .create_admin(&fx.root, "new@x.com", Some(STRONG), "New", AdminRole::Admin)
            .await?;
        assert_eq!(created.admin.created_by, Some(fx.root.id));
        assert_eq!(created.generated_password, None);
        assert_eq!(fx.service.list_admins(&fx.root).await?.len(), 3);

        fx.audit.flush().await;
        let events = fx.audit.recent(10).await?;
        assert!(events.iter().any(|e| e.event_type == AuditEventType::AccessDenied));
        assert!(events.iter().any(|e| e.event_type == AuditEventType::AdminCreated));
        Ok(())
    }

    #[tokio::test]
    async fn deactivation_revokes_sessions_immediately() -> Result<()> {
        let fx = fixture().await?;
        let token = fx.sessions.issue(fx.plain.id)?;
        assert!(fx.sessions.validate(&token.token).await.is_ok());

        let updated = fx
            .service
            .update_admin(&fx.root, fx.plain.id, AdminUpdate::Deactivate)
            .await?;
        assert!(!updated.is_active);
        assert!(fx.sessions.validate(&token.token).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn admins_cannot_modify_themselves() -> Result<()> {
        let fx = fixture().await?;
        let result = fx
            .service
            .update_admin(&fx.root, fx.root.id, AdminUpdate::Demote)
            .await;
        assert_eq!(
            result.err(),
            Some(AuthError::Validation(ValidationError::SelfModification))
        );
        Ok(())
    }

    #[tokio::test]
    async fn promote_and_demote() -> Result<()> {
        let fx = fixture().await?;
        let promoted = fx
            .service
            .update_admin(&fx.root, fx.plain.id, AdminUpdate::Promote)
            .await?;
        assert_eq!(promoted.role, AdminRole::SuperAdmin);
        let demoted = fx
            .service
            .update_admin(&fx.root, fx.plain.id, AdminUpdate::Demote)
            .await?;
        assert_eq!(demoted.role, AdminRole::Admin);
        assert_eq!(
            fx.service
                .update_admin(&fx.root, Uuid::new_v4(), AdminUpdate::Promote)
                .await
                .err(),
            Some(AuthError::NotFound)
        );
        assert!(fx.credentials.get(fx.plain.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn block_unblock_and_delete_users() -> Result<()> {
        let fx = fixture().await?;
        let user = seed_user(&fx.directory, "chat@x.com").await?;

        let blocked = fx.service.set_user_blocked(&fx.plain, user.id, true).await?;
        assert!(blocked.is_blocked);
        assert_eq!(blocked.blocked_by, Some(fx.plain.id));

        let unblocked = fx.service.set_user_blocked(&fx.plain, user.id, false).await?;
        assert!(!unblocked.is_blocked);

        fx.service.delete_user(&fx.plain, user.id).await?;
        assert_eq!(
            fx.service.delete_user(&fx.plain, user.id).await.err(),
            Some(AuthError::NotFound)
        );
        assert!(fx.service.list_users(&fx.plain).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn bulk_block_limits_and_reports_unknown_ids() -> Result<()> {
        let fx = fixture().await?;
        let a = seed_user(&fx.directory, "a@x.com").await?;
        let b = seed_user(&fx.directory, "b@x.com").await?;
        let ghost = Uuid::new_v4();

        let result = fx
            .service
            .bulk_block(&fx.plain, &[a.id, b.id, a.id, ghost])
            .await?;
        assert_eq!(result.blocked, vec![a.id, b.id]);
        assert_eq!(result.not_found, vec![ghost]);

        let too_many: Vec<Uuid> = (0..=MAX_BULK_IDS).map(|_| Uuid::new_v4()).collect();
        assert!(matches!(
            fx.service.bulk_block(&fx.plain, &too_many).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            fx.service.bulk_block(&fx.plain, &[]).await,
            Err(AuthError::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn bulk_block_failure_still_audits_partial_progress() -> Result<()> {
        let (fx, doomed) = failing_fixture().await?;
        let first = seed_user(&fx.directory, "first@x.com").await?;
        let last = seed_user(&fx.directory, "last@x.com").await?;

        let result = fx
            .service
            .bulk_block(&fx.plain, &[first.id, doomed.id, last.id])
            .await;
        assert!(matches!(result, Err(AuthError::Dependency(_))));

        let first = fx.directory.find_user(first.id).await?;
        assert_eq!(first.map(|u| u.is_blocked), Some(true));
        let last = fx.directory.find_user(last.id).await?;
        assert_eq!(last.map(|u| u.is_blocked), Some(false));

        fx.audit.flush().await;
        let events = fx.audit.recent(10).await?;
        let bulk = events
            .iter()
            .find(|e| e.event_type == AuditEventType::BulkBlock)
            .ok_or_else(|| anyhow::anyhow!("bulk block was not audited"))?;
        assert_eq!(bulk.target_id, None);
        assert!(bulk.detail.starts_with("blocked 1 user(s), 0 unknown"));
        assert!(bulk.detail.contains(&doomed.id.to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn bulk_block_audit_carries_the_count_in_detail() -> Result<()> {
        let fx = fixture().await?;
        let a = seed_user(&fx.directory, "a@x.com").await?;
        fx.service.bulk_block(&fx.plain, &[a.id]).await?;

        fx.audit.flush().await;
        let events = fx.audit.recent(10).await?;
        let bulk = events
            .iter()
            .find(|e| e.event_type == AuditEventType::BulkBlock)
            .ok_or_else(|| anyhow::anyhow!("bulk block was not audited"))?;
        assert_eq!(bulk.target_id, None);
        assert_eq!(bulk.detail, "blocked 1 user(s), 0 unknown");
        Ok(())
    }

    #[tokio::test]
    async fn approval_is_audited_when_the_block_fails() -> Result<()> {
        let (fx, doomed) = failing_fixture().await?;
        let report = report_against(&doomed);
        fx.directory.insert_report(&report).await?;

        let result = fx
            .service
            .resolve_report(&fx.plain, report.id, ReportStatus::Approved)
            .await;
        assert!(matches!(result, Err(AuthError::Dependency(_))));

        fx.audit.flush().await;
        let events = fx.audit.recent(10).await?;
        let resolved = events
            .iter()
            .find(|e| e.event_type == AuditEventType::ReportResolved)
            .ok_or_else(|| anyhow::anyhow!("resolution was not audited"))?;
        assert_eq!(resolved.target_id.as_deref(), Some(report.id.to_string().as_str()));
        assert!(resolved.detail.contains("blocking doomed@x.com failed"));
        assert!(!events.iter().any(|e| e.event_type == AuditEventType::UserBlocked));
        Ok(())
    }

    #[tokio::test]
    async fn generated_admin_password_is_returned_once() -> Result<()> {
        let fx = fixture().await?;
        let created = fx
            .service
            .create_admin(&fx.root, "gen@x.com", None, "Generated", AdminRole::Admin)
            .await?;
        let password = created
            .generated_password
            .ok_or_else(|| anyhow::anyhow!("no password generated"))?;
        let account = fx.credentials.verify("gen@x.com", &password).await?;
        assert_eq!(account.id, created.admin.id);

        let listed = serde_json::to_value(fx.service.list_admins(&fx.root).await?)?;
        assert!(!listed.to_string().contains(&password));
        Ok(())
    }

    #[tokio::test]
    async fn stats_and_user_listing_are_throttled() -> Result<()> {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(clock.clone())
            .with_policy(
                RateLimitAction::LoadUsers,
                RateLimitPolicy {
                    limit: 1,
                    window: Duration::from_secs(5),
                },
            )
            .with_policy(
                RateLimitAction::LoadStats,
                RateLimitPolicy {
                    limit: 1,
                    window: Duration::from_secs(5),
                },
            );
        let fx = fixture_with(limiter, clock).await?;
        let user = seed_user(&fx.directory, "s@x.com").await?;
        fx.directory.set_blocked(user.id, true, fx.root.id, Utc::now()).await?;

        assert_eq!(fx.service.list_users(&fx.plain).await?.len(), 1);
        assert!(matches!(
            fx.service.list_users(&fx.plain).await,
            Err(AuthError::Lockout { .. })
        ));

        let stats = fx.service.stats(&fx.plain).await?;
        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.blocked_users, 1);
        assert_eq!(stats.pending_reports, 0);
        assert!(matches!(
            fx.service.stats(&fx.plain).await,
            Err(AuthError::Lockout { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn approving_a_report_blocks_the_reported_user() -> Result<()> {
        let fx = fixture().await?;
        let offender = seed_user(&fx.directory, "offender@x.com").await?;
        let report = report_against(&offender);
        fx.directory.insert_report(&report).await?;

        assert!(matches!(
            fx.service
                .resolve_report(&fx.plain, report.id, ReportStatus::Pending)
                .await,
            Err(AuthError::Validation(_))
        ));

        let resolved = fx
            .service
            .resolve_report(&fx.plain, report.id, ReportStatus::Approved)
            .await?;
        assert_eq!(resolved.status, ReportStatus::Approved);
        assert_eq!(resolved.resolved_by, Some(fx.plain.id));

        let offender = fx.directory.find_user(offender.id).await?;
        assert_eq!(offender.map(|u| u.is_blocked), Some(true));

        let pending = fx
            .service
            .list_reports(&fx.plain, Some(ReportStatus::Pending))
            .await?;
        assert!(pending.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn actions_are_rate_limited_per_actor() -> Result<()> {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(clock.clone()).with_policy(
            RateLimitAction::LoadReports,
            RateLimitPolicy {
                limit: 2,
                window: Duration::from_secs(5),
            },
        );
        let fx = fixture_with(limiter, clock.clone()).await?;

        fx.service.list_reports(&fx.plain, None).await?;
        fx.service.list_reports(&fx.plain, None).await?;
        assert!(matches!(
            fx.service.list_reports(&fx.plain, None).await,
            Err(AuthError::Lockout { .. })
        ));
        // A different admin has its own budget.
        fx.service.list_reports(&fx.root, None).await?;

        clock.advance(Duration::from_secs(5));
        fx.service.list_reports(&fx.plain, None).await?;
        Ok(())
    }

    #[tokio::test]
    async fn audit_trail_is_super_admin_only() -> Result<()> {
        let fx = fixture().await?;
        let user = seed_user(&fx.directory, "t@x.com").await?;
        fx.service.set_user_blocked(&fx.plain, user.id, true).await?;
        fx.audit.flush().await;

        assert_eq!(
            fx.service.audit_trail(&fx.plain, 10).await.err(),
            Some(AuthError::Forbidden)
        );
        let trail = fx.service.audit_trail(&fx.root, 10).await?;
        assert!(trail.iter().any(|e| e.event_type == AuditEventType::UserBlocked
            && e.target_id.as_deref() == Some(user.id.to_string().as_str())));
        Ok(())
    }
}
