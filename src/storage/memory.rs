//! In-memory repositories. Used when no database DSN is configured, and by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AccountRepository, AdminAccount, AdminRole, DirectoryRepository, DirectoryStats,
    DirectoryUser, Report, ReportStatus,
};

#[derive(Debug, Default)]
pub struct MemoryAccounts {
    accounts: RwLock<HashMap<Uuid, AdminAccount>>,
}

impl MemoryAccounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut AdminAccount) + Send,
    {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(account) => {
                apply(account);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn insert(&self, account: &AdminAccount) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Ok(false);
        }
        accounts.insert(account.id, account.clone());
        Ok(true)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        Ok(self.update(id, |a| a.is_active = active).await)
    }

    async fn set_role(&self, id: Uuid, role: AdminRole) -> Result<bool> {
        Ok(self.update(id, |a| a.role = role).await)
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        let password_hash = password_hash.to_string();
        Ok(self.update(id, |a| a.password_hash = password_hash).await)
    }

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.update(id, |a| a.last_login_at = Some(at)).await)
    }

    async fn list(&self) -> Result<Vec<AdminAccount>> {
        let mut accounts: Vec<_> = self.accounts.read().await.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.accounts.read().await.len() as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<Uuid, DirectoryUser>>,
    reports: RwLock<HashMap<Uuid, Report>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryRepository for MemoryDirectory {
    async fn insert_user(&self, user: &DirectoryUser) -> Result<()> {
        self.users.write().await.insert(user.id, user.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        let mut users: Vec<_> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn set_blocked(
        &self,
        id: Uuid,
        blocked: bool,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<DirectoryUser>> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        user.is_blocked = blocked;
        if blocked {
            user.blocked_at = Some(at);
            user.blocked_by = Some(by);
        } else {
            user.blocked_at = None;
            user.blocked_by = None;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(())
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let mut reports: Vec<_> = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn resolve_report(
        &self,
        id: Uuid,
        status: ReportStatus,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let mut reports = self.reports.write().await;
        let Some(report) = reports.get_mut(&id) else {
            return Ok(None);
        };
        report.status = status;
        report.resolved_at = Some(at);
        report.resolved_by = Some(by);
        Ok(Some(report.clone()))
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let users = self.users.read().await;
        let reports = self.reports.read().await;
        Ok(DirectoryStats {
            total_users: users.len() as u64,
            blocked_users: users.values().filter(|u| u.is_blocked).count() as u64,
            pending_reports: reports
                .values()
                .filter(|r| r.status == ReportStatus::Pending)
                .count() as u64,
        })
    }
}
