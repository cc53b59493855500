//! Shared request state: every service the handlers reach, wired once at startup.

use anyhow::Result;
use secrecy::SecretSlice;
use sqlx::PgPool;
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::admin::AdminService;
use crate::audit::AuditLogger;
use crate::auth::{
    AttemptLedger, AuthConfig, Authenticator, Clock, CredentialStore, PasswordHasher,
    RateLimitAction, RateLimiter, SessionIssuer,
};
use crate::storage::{AccountRepository, DirectoryRepository};

/// Storage handles the state is built on.
pub struct Backends {
    pub accounts: Arc<dyn AccountRepository>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub audit: AuditLogger,
    /// Present when running against PostgreSQL; used by `/health`.
    pub pool: Option<PgPool>,
}

pub struct AppState {
    config: AuthConfig,
    authenticator: Authenticator,
    admin: AdminService,
    credentials: Arc<CredentialStore>,
    sessions: Arc<SessionIssuer>,
    ledger: Arc<AttemptLedger>,
    limiter: Arc<RateLimiter>,
    audit: AuditLogger,
    pool: Option<PgPool>,
}

impl AppState {
    /// # Errors
    /// Returns an error if the session key is too short or the password hasher
    /// cannot prepare its dummy hash.
    pub fn new(
        config: AuthConfig,
        session_key: SecretSlice<u8>,
        hasher: PasswordHasher,
        backends: Backends,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let Backends {
            accounts,
            directory,
            audit,
            pool,
        } = backends;

        let credentials = Arc::new(CredentialStore::new(
            accounts,
            hasher,
            config.retry().clone(),
            clock.clone(),
        )?);
        let sessions = Arc::new(SessionIssuer::new(
            session_key,
            config.session_ttl(),
            config.liveness_cache_ttl(),
            credentials.clone(),
            clock.clone(),
        )?);
        let ledger = Arc::new(AttemptLedger::new(config.lockout(), clock.clone()));
        let limiter = Arc::new(
            RateLimiter::new(clock.clone())
                .with_policy(RateLimitAction::Login, config.login_rate_limit()),
        );

        let authenticator = Authenticator::new(
            limiter.clone(),
            ledger.clone(),
            credentials.clone(),
            sessions.clone(),
            audit.clone(),
        );
        let admin = AdminService::new(
            credentials.clone(),
            sessions.clone(),
            directory,
            limiter.clone(),
            audit.clone(),
            config.retry().clone(),
            clock,
        );

        Ok(Self {
            config,
            authenticator,
            admin,
            credentials,
            sessions,
            ledger,
            limiter,
            audit,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn admin(&self) -> &AdminService {
        &self.admin
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Evict idle ledger, limiter and liveness entries. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let ledger = self.ledger.sweep().await;
        let limiter = self.limiter.sweep().await;
        let sessions = self.sessions.sweep().await;
        debug!(ledger, limiter, sessions, "swept idle auth state");
        ledger + limiter + sessions
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("database", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audit::{AuditConfig, LogAlert, MemorySink};
    use crate::auth::{ManualClock, credentials::tests::fast_retry, password::test_hasher};
    use crate::storage::memory::{MemoryAccounts, MemoryDirectory};
    use std::time::Duration;

    pub(crate) struct TestState {
        pub(crate) state: Arc<AppState>,
        pub(crate) directory: Arc<MemoryDirectory>,
        pub(crate) sink: Arc<MemorySink>,
        pub(crate) clock: Arc<ManualClock>,
    }

    pub(crate) fn test_state(config: AuthConfig) -> Result<TestState> {
        let clock = Arc::new(ManualClock::default());
        let directory = Arc::new(MemoryDirectory::new());
        let sink = Arc::new(MemorySink::new());
        let (audit, _worker) = AuditLogger::spawn(
            sink.clone(),
            Arc::new(LogAlert),
            AuditConfig::new().with_retry(fast_retry()),
            clock.clone(),
        );
        let state = AppState::new(
            config.with_retry(fast_retry()),
            SecretSlice::from(vec![7u8; 32]),
            test_hasher(),
            Backends {
                accounts: Arc::new(MemoryAccounts::new()),
                directory: directory.clone(),
                audit,
                pool: None,
            },
            clock.clone(),
        )?;
        Ok(TestState {
            state: Arc::new(state),
            directory,
            sink,
            clock,
        })
    }

    #[tokio::test]
    async fn sweep_evicts_expired_lockouts() -> Result<()> {
        let t = test_state(AuthConfig::new())?;
        for _ in 0..3 {
            let _ = t
                .state
                .authenticator()
                .login("nobody@x.com", "wrong", "10.0.0.1")
                .await;
        }
        assert!(t.state.ledger.tracked().await > 0);
        assert!(t.state.limiter.tracked().await > 0);

        t.clock.advance(Duration::from_secs(3600));
        assert!(t.state.sweep().await >= 2);
        assert_eq!(t.state.ledger.tracked().await, 0);
        assert_eq!(t.state.limiter.tracked().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn short_session_key_is_rejected() {
        let clock = Arc::new(ManualClock::default());
        let (audit, _worker) = AuditLogger::spawn(
            Arc::new(MemorySink::new()),
            Arc::new(LogAlert),
            AuditConfig::new(),
            clock.clone(),
        );
        let result = AppState::new(
            AuthConfig::new(),
            SecretSlice::from(vec![1u8; 8]),
            test_hasher(),
            Backends {
                accounts: Arc::new(MemoryAccounts::new()),
                directory: Arc::new(MemoryDirectory::new()),
                audit,
                pool: None,
            },
            clock,
        );
        assert!(result.is_err());
    }
}
