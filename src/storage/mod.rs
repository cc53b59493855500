//! Persistence seams for admin accounts and the chat directory.
//!
//! Two backends implement the same traits: [`memory`] for development and tests,
//! [`postgres`] for deployments. Repositories return `anyhow::Result`; the
//! credential store wraps every call in a timeout and bounded retry.

pub mod memory;
pub mod postgres;
pub mod seed;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

impl AdminRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    #[must_use]
    pub fn is_super_admin(self) -> bool {
        matches!(self, Self::SuperAdmin)
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(anyhow::anyhow!("unknown admin role: {other}")),
        }
    }
}

/// Persisted admin credential. `email` is stored normalized (trimmed, lowercase).
#[derive(Clone, PartialEq, Eq)]
pub struct AdminAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    /// PHC-formatted Argon2id hash; the salt is embedded.
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl AdminAccount {
    /// Per-account salt, read back out of the PHC hash.
    #[must_use]
    pub fn salt(&self) -> Option<String> {
        crate::auth::password::phc_salt(&self.password_hash)
    }
}

impl fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAccount")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_hash", &"[redacted]")
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("created_at", &self.created_at)
            .field("created_by", &self.created_by)
            .field("last_login_at", &self.last_login_at)
            .finish()
    }
}

/// A chat application user as seen by admins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub is_blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Warning,
    Dismissed,
}

impl ReportStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Warning => "warning",
            Self::Dismissed => "dismissed",
        }
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "warning" => Ok(Self::Warning),
            "dismissed" => Ok(Self::Dismissed),
            other => Err(anyhow::anyhow!("unknown report status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Report {
    pub id: Uuid,
    pub reporter_email: String,
    pub reported_user_id: Uuid,
    pub reported_user_email: String,
    pub reason: String,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

/// Headline counts for the dashboard overview.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DirectoryStats {
    pub total_users: u64,
    pub blocked_users: u64,
    pub pending_reports: u64,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>>;

    /// Insert unless the email is taken. Returns `false` on conflict.
    async fn insert(&self, account: &AdminAccount) -> Result<bool>;

    /// Returns `false` when no account has this id.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool>;

    async fn set_role(&self, id: Uuid, role: AdminRole) -> Result<bool>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool>;

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<AdminAccount>>;

    async fn count(&self) -> Result<u64>;
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn insert_user(&self, user: &DirectoryUser) -> Result<()>;

    async fn list_users(&self) -> Result<Vec<DirectoryUser>>;

    async fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>>;

    /// Update the blocked flag. Returns the updated user, or `None` if unknown.
    async fn set_blocked(
        &self,
        id: Uuid,
        blocked: bool,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<DirectoryUser>>;

    async fn delete_user(&self, id: Uuid) -> Result<bool>;

    async fn insert_report(&self, report: &Report) -> Result<()>;

    /// Reports, newest first, optionally filtered by status.
    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>>;

    async fn resolve_report(
        &self,
        id: Uuid,
        status: ReportStatus,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>>;

    async fn stats(&self) -> Result<DirectoryStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_names() {
        assert_eq!(AdminRole::SuperAdmin.as_str(), "super_admin");
        assert_eq!("admin".parse::<AdminRole>().ok(), Some(AdminRole::Admin));
        assert!("root".parse::<AdminRole>().is_err());
        assert_eq!(
            "warning".parse::<ReportStatus>().ok(),
            Some(ReportStatus::Warning)
        );
        assert_eq!(
            serde_json::to_string(&AdminRole::SuperAdmin).ok().as_deref(),
            Some("\"super_admin\"")
        );
    }

    #[test]
    fn account_debug_redacts_hash() {
        let account = AdminAccount {
            id: Uuid::nil(),
            email: "a@x.com".to_string(),
            name: "Al".to_string(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaGhhc2hoYXNoaGFzaGhhc2g".to_string(),
            role: AdminRole::Admin,
            is_active: true,
            created_at: DateTime::<Utc>::default(),
            created_by: None,
            last_login_at: None,
        };
        let debug = format!("{account:?}");
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("argon2id"));
        assert_eq!(account.salt().as_deref(), Some("c2FsdHNhbHQ"));
    }
}
