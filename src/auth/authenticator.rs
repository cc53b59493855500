//! Login orchestration.
//!
//! Flow Overview:
//! 1) Rate limiter gate, keyed by the server-observed client address.
//! 2) Attempt ledger reservation for the account identity (normalized email).
//!    Refused while locked out or while the remaining attempts are all in flight.
//! 3) Credential verification.
//! 4) Success clears the ledger and mints a session; failure is recorded and may
//!    lock the identity.
//! 5) Every path emits an audit event.
//!
//! Callers see only `AuthFailure`, `Lockout` (with a retry hint) or `Dependency`.

use std::sync::Arc;
use tracing::{info, warn};

use super::{
    credentials::CredentialStore,
    error::{AuthError, DependencyError, ValidationError},
    ledger::{AttemptLedger, IdentityKey},
    limiter::{RateLimitAction, RateLimitDecision, RateLimiter},
    password::normalize_email,
    session::{Principal, SessionIssuer, SessionToken},
};
use crate::audit::{AuditEventType, AuditLogger};
use crate::storage::AdminAccount;

#[derive(Debug)]
pub struct LoginOutcome {
    pub account: AdminAccount,
    pub session: SessionToken,
}

/// Password change request for the signed-in admin.
#[derive(Clone, Copy)]
pub struct PasswordChange<'a> {
    pub current: &'a str,
    pub new: &'a str,
    pub confirm: &'a str,
}

pub struct Authenticator {
    limiter: Arc<RateLimiter>,
    ledger: Arc<AttemptLedger>,
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionIssuer>,
    audit: AuditLogger,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        limiter: Arc<RateLimiter>,
        ledger: Arc<AttemptLedger>,
        credentials: Arc<CredentialStore>,
        sessions: Arc<SessionIssuer>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            limiter,
            ledger,
            credentials,
            sessions,
            audit,
        }
    }

    /// Authenticate `email`/`password` from `client` (a server-observed address).
    ///
    /// # Errors
    /// `Lockout` when throttled or locked, `AuthFailure` for bad credentials,
    /// `Dependency` when the credential store is unreachable.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);

        if let RateLimitDecision::Limited { retry_after } =
            self.limiter.check(RateLimitAction::Login, client).await
        {
            self.audit.record(
                AuditEventType::LoginRateLimited,
                &email,
                None,
                &format!("client {client} exceeded login rate limit"),
            );
            return Err(AuthError::Lockout { retry_after });
        }

        let identity = IdentityKey::account(&email);
        let slot = match self.ledger.begin_attempt(&identity).await {
            Ok(slot) => slot,
            Err(retry_after) => {
                self.audit.record(
                    AuditEventType::LoginFailure,
                    &email,
                    None,
                    &format!("attempt from {client} while locked out"),
                );
                return Err(AuthError::Lockout { retry_after });
            }
        };

        match self.credentials.verify(&email, password).await {
            Ok(account) => {
                if let Some(retry_after) = self.ledger.settle_success(slot).await {
                    self.audit.record(
                        AuditEventType::LoginFailure,
                        &email,
                        None,
                        &format!("valid credentials from {client} during lockout"),
                    );
                    return Err(AuthError::Lockout { retry_after });
                }
                self.complete_login(account, client).await
            }
            Err(AuthError::AuthFailure) => {
                let outcome = self.ledger.settle_failure(slot).await;
                self.audit.record(
                    AuditEventType::LoginFailure,
                    &email,
                    None,
                    &format!(
                        "invalid credentials from {client}, {} attempt(s) left",
                        outcome.remaining_attempts
                    ),
                );
                if outcome.blocked {
                    self.audit.record(
                        AuditEventType::LoginLockout,
                        &email,
                        None,
                        &format!("identity locked after failures from {client}"),
                    );
                }
                Err(AuthError::AuthFailure)
            }
            Err(err) => {
                drop(slot);
                self.audit.record(
                    AuditEventType::LoginFailure,
                    &email,
                    None,
                    &format!("login from {client} failed closed: {err}"),
                );
                Err(err)
            }
        }
    }

    async fn complete_login(
        &self,
        account: AdminAccount,
        client: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let session = self.sessions.issue(account.id).map_err(|err| {
            warn!("failed to issue session: {err:#}");
            AuthError::Dependency(DependencyError {
                operation: "session issue".to_string(),
                attempts: 1,
            })
        })?;

        if let Err(err) = self.credentials.record_login(account.id).await {
            warn!(account = %account.id, "failed to record last login: {err}");
        }

        let account_id = account.id.to_string();
        self.audit.record(
            AuditEventType::LoginSuccess,
            &account.email,
            Some(&account_id),
            &format!("login from {client}"),
        );
        info!(account = %account.id, "admin signed in");
        Ok(LoginOutcome { account, session })
    }

    /// Record a logout. Tokens are stateless, so the client drops its copy.
    pub async fn logout(&self, principal: &Principal) {
        self.sessions.invalidate(principal.id).await;
        let account_id = principal.id.to_string();
        self.audit.record(
            AuditEventType::Logout,
            &principal.email,
            Some(&account_id),
            "session ended",
        );
    }

    /// Change the caller's own password.
    ///
    /// # Errors
    /// `Lockout` when throttled or locked, `Validation` for mismatched, reused or
    /// weak passwords, `AuthFailure` if `current` is wrong.
    pub async fn change_password(
        &self,
        principal: &Principal,
        change: PasswordChange<'_>,
    ) -> Result<(), AuthError> {
        let account_id = principal.id.to_string();
        if let RateLimitDecision::Limited { retry_after } = self
            .limiter
            .check(RateLimitAction::ChangePassword, &account_id)
            .await
        {
            self.audit.record(
                AuditEventType::RateLimited,
                &principal.email,
                Some(&account_id),
                RateLimitAction::ChangePassword.as_str(),
            );
            return Err(AuthError::Lockout { retry_after });
        }

        if change.new != change.confirm {
            return Err(ValidationError::PasswordMismatch.into());
        }
        let identity = IdentityKey::account(&principal.email);
        let slot = self
            .ledger
            .begin_attempt(&identity)
            .await
            .map_err(|retry_after| AuthError::Lockout { retry_after })?;

        match self
            .credentials
            .change_password(principal.id, change.current, change.new)
            .await
        {
            Ok(()) => {
                let _ = self.ledger.settle_success(slot).await;
                self.sessions.invalidate(principal.id).await;
                self.audit.record(
                    AuditEventType::PasswordChanged,
                    &principal.email,
                    Some(&account_id),
                    "password changed",
                );
                Ok(())
            }
            Err(AuthError::AuthFailure) => {
                let outcome = self.ledger.settle_failure(slot).await;
                self.audit.record(
                    AuditEventType::LoginFailure,
                    &principal.email,
                    Some(&account_id),
                    "wrong current password on password change",
                );
                if outcome.blocked {
                    self.audit.record(
                        AuditEventType::LoginLockout,
                        &principal.email,
                        Some(&account_id),
                        "identity locked after failed password changes",
                    );
                }
                Err(AuthError::AuthFailure)
            }
            Err(err) => Err(err),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }
}
