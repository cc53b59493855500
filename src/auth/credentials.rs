//! Credential store: admin account lifecycle and password verification.
//!
//! Flow Overview:
//! 1) `verify` normalizes the email and loads the account (timeout + retry).
//! 2) Unknown or inactive accounts are checked against a dummy hash so every
//!    failure costs one Argon2id verification and looks the same to the caller.
//! 3) `create` validates email, name and password strength before hashing.
//!
//! Repository failures surface as `AuthError::Dependency`; nothing here treats
//! an unreachable store as a successful check.

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    clock::Clock,
    error::{AuthError, DependencyError, ValidationError},
    password::{
        PasswordHasher, check_password_policy, normalize_email, normalize_name, valid_email,
    },
    retry::{RetryPolicy, with_retry},
};
use crate::storage::{AccountRepository, AdminAccount, AdminRole};

pub struct CredentialStore {
    repo: Arc<dyn AccountRepository>,
    hasher: PasswordHasher,
    dummy_hash: String,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

/// Fields required to create an account.
#[derive(Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
    pub role: AdminRole,
    pub created_by: Option<Uuid>,
}

impl CredentialStore {
    /// # Errors
    /// Returns an error if the dummy hash cannot be prepared.
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        hasher: PasswordHasher,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let dummy_hash = hasher.dummy_hash()?;
        Ok(Self {
            repo,
            hasher,
            dummy_hash,
            retry,
            clock,
        })
    }

    /// Check an email/password pair. Unknown email, wrong password and inactive
    /// account all yield `AuthFailure`.
    ///
    /// # Errors
    /// `AuthFailure` on any credential mismatch, `Dependency` if the store is unreachable.
    pub async fn verify(&self, email: &str, password: &str) -> Result<AdminAccount, AuthError> {
        let email = normalize_email(email);
        let found = self.find_by_email(&email).await?;

        match found {
            Some(account) if account.is_active => {
                if self.check(password, &account.password_hash).await {
                    Ok(account)
                } else {
                    Err(AuthError::AuthFailure)
                }
            }
            _ => {
                self.check(password, &self.dummy_hash).await;
                Err(AuthError::AuthFailure)
            }
        }
    }

    /// Create an account after validating email, name and password policy.
    ///
    /// # Errors
    /// `Validation` for bad input or a taken email, `Dependency` on store failure.
    pub async fn create(&self, new: NewAccount<'_>) -> Result<AdminAccount, AuthError> {
        let email = normalize_email(new.email);
        if !valid_email(&email) {
            return Err(ValidationError::InvalidEmail.into());
        }
        let name = normalize_name(new.name)?;
        check_password_policy(new.password)?;

        let account = AdminAccount {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash: self.hash(new.password).await?,
            role: new.role,
            is_active: true,
            created_at: self.clock.now(),
            created_by: new.created_by,
            last_login_at: None,
        };

        let repo = &self.repo;
        let candidate = &account;
        let inserted = with_retry(&self.retry, "credential insert", move || {
            repo.insert(candidate)
        })
        .await?;

        if !inserted {
            // A retried insert may conflict with its own earlier write.
            let existing = self.find_by_email(&account.email).await?;
            if existing.is_none_or(|found| found.id != account.id) {
                return Err(ValidationError::DuplicateEmail.into());
            }
        }

        info!(account = %account.id, role = %account.role, "admin account created");
        Ok(account)
    }

    /// Create the first super admin when the store is empty. Returns `None` if
    /// any account already exists.
    ///
    /// # Errors
    /// Same as [`CredentialStore::create`].
    pub async fn bootstrap(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Option<AdminAccount>, AuthError> {
        if self.count().await? > 0 {
            return Ok(None);
        }
        self.create(NewAccount {
            email,
            password,
            name,
            role: AdminRole::SuperAdmin,
            created_by: None,
        })
        .await
        .map(Some)
    }

    /// # Errors
    /// `NotFound` for an unknown id, `Dependency` on store failure.
    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<AdminAccount, AuthError> {
        let repo = &self.repo;
        let updated = with_retry(&self.retry, "credential update", move || {
            repo.set_active(id, active)
        })
        .await?;
        self.updated(id, updated).await
    }

    /// Move `admin` to `super_admin`.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `Dependency` on store failure.
    pub async fn promote(&self, id: Uuid) -> Result<AdminAccount, AuthError> {
        self.set_role(id, AdminRole::SuperAdmin).await
    }

    /// Move `super_admin` to `admin`.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `Dependency` on store failure.
    pub async fn demote(&self, id: Uuid) -> Result<AdminAccount, AuthError> {
        self.set_role(id, AdminRole::Admin).await
    }

    async fn set_role(&self, id: Uuid, role: AdminRole) -> Result<AdminAccount, AuthError> {
        let repo = &self.repo;
        let updated = with_retry(&self.retry, "credential update", move || {
            repo.set_role(id, role)
        })
        .await?;
        self.updated(id, updated).await
    }

    /// Replace the password after verifying the current one.
    ///
    /// # Errors
    /// `AuthFailure` if `current` is wrong, `Validation` if `new` is weak or
    /// unchanged, `Dependency` on store failure.
    pub async fn change_password(
        &self,
        id: Uuid,
        current: &str,
        new: &str,
    ) -> Result<(), AuthError> {
        let account = self.get(id).await?.ok_or(AuthError::NotFound)?;
        if !account.is_active || !self.check(current, &account.password_hash).await {
            return Err(AuthError::AuthFailure);
        }
        if current == new {
            return Err(ValidationError::PasswordReuse.into());
        }
        check_password_policy(new)?;

        let password_hash = self.hash(new).await?;
        let repo = &self.repo;
        let hash = password_hash.as_str();
        let updated = with_retry(&self.retry, "credential update", move || {
            repo.set_password_hash(id, hash)
        })
        .await?;
        if !updated {
            return Err(AuthError::NotFound);
        }
        info!(account = %id, "admin password changed");
        Ok(())
    }

    /// Stamp `last_login_at`.
    ///
    /// # Errors
    /// `Dependency` on store failure.
    pub async fn record_login(&self, id: Uuid) -> Result<(), AuthError> {
        let at = self.clock.now();
        let repo = &self.repo;
        with_retry(&self.retry, "credential update", move || {
            repo.set_last_login(id, at)
        })
        .await?;
        Ok(())
    }

    /// # Errors
    /// `Dependency` on store failure.
    pub async fn get(&self, id: Uuid) -> Result<Option<AdminAccount>, DependencyError> {
        let repo = &self.repo;
        with_retry(&self.retry, "credential lookup", move || repo.find_by_id(id)).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>, DependencyError> {
        let repo = &self.repo;
        with_retry(&self.retry, "credential lookup", move || {
            repo.find_by_email(email)
        })
        .await
    }

    /// # Errors
    /// `Dependency` on store failure.
    pub async fn list(&self) -> Result<Vec<AdminAccount>, DependencyError> {
        let repo = &self.repo;
        with_retry(&self.retry, "credential list", move || repo.list()).await
    }

    /// # Errors
    /// `Dependency` on store failure.
    pub async fn count(&self) -> Result<u64, DependencyError> {
        let repo = &self.repo;
        with_retry(&self.retry, "credential count", move || repo.count()).await
    }

    async fn updated(&self, id: Uuid, updated: bool) -> Result<AdminAccount, AuthError> {
        if !updated {
            return Err(AuthError::NotFound);
        }
        self.get(id).await?.ok_or(AuthError::NotFound)
    }

    /// Argon2id verification off the async runtime.
    async fn check(&self, password: &str, phc: &str) -> bool {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let phc = phc.to_string();
        match tokio::task::spawn_blocking(move || hasher.verify(&password, &phc)).await {
            Ok(valid) => valid,
            Err(err) => {
                error!("password verification task failed: {err}");
                false
            }
        }
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("password hashing task failed")
            .and_then(|result| result);
        hashed.map_err(|err| {
            error!("password hashing failed: {err:#}");
            AuthError::Dependency(DependencyError {
                operation: "password hashing".to_string(),
                attempts: 1,
            })
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::password::test_hasher;
    use crate::storage::memory::MemoryAccounts;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    pub(crate) const STRONG: &str = "Str0ng!Passw0rd";

    pub(crate) fn fast_retry() -> RetryPolicy {
        RetryPolicy::new()
            .with_attempts(2)
            .with_timeout(Duration::from_millis(200))
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    pub(crate) fn store_with(repo: Arc<dyn AccountRepository>) -> Result<CredentialStore> {
        CredentialStore::new(
            repo,
            test_hasher(),
            fast_retry(),
            Arc::new(ManualClock::default()),
        )
    }

    fn new_account<'a>(email: &'a str, role: AdminRole) -> NewAccount<'a> {
        NewAccount {
            email,
            password: STRONG,
            name: "Test Admin",
            role,
            created_by: None,
        }
    }

    /// Repository whose every call fails, standing in for an unreachable database.
    struct Unreachable;

    #[async_trait]
    impl AccountRepository for Unreachable {
        async fn find_by_email(&self, _email: &str) -> Result<Option<AdminAccount>> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<AdminAccount>> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn insert(&self, _account: &AdminAccount) -> Result<bool> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn set_active(&self, _id: Uuid, _active: bool) -> Result<bool> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn set_role(&self, _id: Uuid, _role: AdminRole) -> Result<bool> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn set_password_hash(&self, _id: Uuid, _hash: &str) -> Result<bool> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn set_last_login(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<bool> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn list(&self) -> Result<Vec<AdminAccount>> {
            Err(anyhow::anyhow!("connection refused"))
        }
        async fn count(&self) -> Result<u64> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn create_then_verify() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let created = store
            .create(new_account("Admin@Example.com", AdminRole::Admin))
            .await?;
        assert_eq!(created.email, "admin@example.com");
        assert!(created.salt().is_some());
        assert!(!created.password_hash.contains(STRONG));

        let verified = store.verify(" ADMIN@example.com", STRONG).await?;
        assert_eq!(verified.id, created.id);
        Ok(())
    }

    #[tokio::test]
    async fn failures_are_indistinguishable() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let active = store.create(new_account("a@x.com", AdminRole::Admin)).await?;
        let inactive = store.create(new_account("b@x.com", AdminRole::Admin)).await?;
        store.set_active(inactive.id, false).await?;

        let unknown = store.verify("nobody@x.com", STRONG).await;
        let wrong = store.verify(&active.email, "Str0ng!Passw0rX").await;
        let disabled = store.verify(&inactive.email, STRONG).await;

        assert_eq!(unknown, Err(AuthError::AuthFailure));
        assert_eq!(wrong, Err(AuthError::AuthFailure));
        assert_eq!(disabled, Err(AuthError::AuthFailure));
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_input() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        store.create(new_account("dup@x.com", AdminRole::Admin)).await?;

        let duplicate = store.create(new_account("DUP@x.com", AdminRole::Admin)).await;
        assert_eq!(
            duplicate.err(),
            Some(AuthError::Validation(ValidationError::DuplicateEmail))
        );

        let malformed = store.create(new_account("not-an-email", AdminRole::Admin)).await;
        assert_eq!(
            malformed.err(),
            Some(AuthError::Validation(ValidationError::InvalidEmail))
        );

        let weak = store
            .create(NewAccount {
                password: "password1",
                ..new_account("weak@x.com", AdminRole::Admin)
            })
            .await;
        assert_eq!(
            weak.err(),
            Some(AuthError::Validation(ValidationError::WeakPassword {
                score: 2
            }))
        );

        let unnamed = store
            .create(NewAccount {
                name: "x",
                ..new_account("unnamed@x.com", AdminRole::Admin)
            })
            .await;
        assert_eq!(
            unnamed.err(),
            Some(AuthError::Validation(ValidationError::InvalidName))
        );
        Ok(())
    }

    #[tokio::test]
    async fn role_and_status_changes() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let account = store.create(new_account("r@x.com", AdminRole::Admin)).await?;

        assert_eq!(store.promote(account.id).await?.role, AdminRole::SuperAdmin);
        assert_eq!(store.demote(account.id).await?.role, AdminRole::Admin);
        assert!(!store.set_active(account.id, false).await?.is_active);
        assert!(store.set_active(account.id, true).await?.is_active);
        assert_eq!(
            store.promote(Uuid::new_v4()).await.err(),
            Some(AuthError::NotFound)
        );
        Ok(())
    }

    #[tokio::test]
    async fn change_password_rules() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let account = store.create(new_account("p@x.com", AdminRole::Admin)).await?;

        assert_eq!(
            store.change_password(account.id, "wrong", "N3w!Password99").await,
            Err(AuthError::AuthFailure)
        );
        assert_eq!(
            store.change_password(account.id, STRONG, STRONG).await,
            Err(AuthError::Validation(ValidationError::PasswordReuse))
        );
        assert!(matches!(
            store.change_password(account.id, STRONG, "short").await,
            Err(AuthError::Validation(ValidationError::WeakPassword { .. }))
        ));

        store
            .change_password(account.id, STRONG, "N3w!Password99")
            .await?;
        assert!(store.verify("p@x.com", STRONG).await.is_err());
        assert!(store.verify("p@x.com", "N3w!Password99").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_only_when_empty() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let first = store.bootstrap("root@x.com", STRONG, "Root").await?;
        assert_eq!(first.map(|a| a.role), Some(AdminRole::SuperAdmin));

        let second = store.bootstrap("other@x.com", STRONG, "Other").await?;
        assert!(second.is_none());
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn record_login_stamps_timestamp() -> Result<()> {
        let store = store_with(Arc::new(MemoryAccounts::new()))?;
        let account = store.create(new_account("l@x.com", AdminRole::Admin)).await?;
        assert!(account.last_login_at.is_none());
        store.record_login(account.id).await?;
        let reloaded = store.get(account.id).await?;
        assert!(reloaded.and_then(|a| a.last_login_at).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_fails_closed() -> Result<()> {
        let store = store_with(Arc::new(Unreachable))?;
        let result = store.verify("a@x.com", STRONG).await;
        assert_eq!(
            result,
            Err(AuthError::Dependency(DependencyError {
                operation: "credential lookup".to_string(),
                attempts: 2,
            }))
        );
        Ok(())
    }
}
