//! PostgreSQL repositories (`db/sql/schema.sql`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::{
    AccountRepository, AdminAccount, AdminRole, DirectoryRepository, DirectoryStats,
    DirectoryUser, Report, ReportStatus,
};

const ACCOUNT_COLUMNS: &str = "id, email, name, password_hash, role, is_active, created_at, created_by, last_login_at";
const USER_COLUMNS: &str =
    "id, email, display_name, is_blocked, blocked_at, blocked_by, created_at";
const REPORT_COLUMNS: &str = "id, reporter_email, reported_user_id, reported_user_email, reason, details, status, created_at, resolved_at, resolved_by";

fn db_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("db.query", db.system = "postgresql", db.operation = operation)
}

fn account_from_row(row: &PgRow) -> Result<AdminAccount> {
    let role: String = row.try_get("role")?;
    Ok(AdminAccount {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse()?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        created_by: row.try_get("created_by")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<DirectoryUser> {
    Ok(DirectoryUser {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        is_blocked: row.try_get("is_blocked")?,
        blocked_at: row.try_get("blocked_at")?,
        blocked_by: row.try_get("blocked_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn report_from_row(row: &PgRow) -> Result<Report> {
    let status: String = row.try_get("status")?;
    Ok(Report {
        id: row.try_get("id")?,
        reporter_email: row.try_get("reporter_email")?,
        reported_user_id: row.try_get("reported_user_id")?,
        reported_user_email: row.try_get("reported_user_email")?,
        reason: row.try_get("reason")?,
        details: row.try_get("details")?,
        status: status.parse()?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
        resolved_by: row.try_get("resolved_by")?,
    })
}

#[derive(Clone, Debug)]
pub struct PgAccounts {
    pool: PgPool,
}

impl PgAccounts {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_one(&self, query: &str, id: Uuid, bind: UpdateValue<'_>) -> Result<bool> {
        let statement = sqlx::query(query);
        let statement = match bind {
            UpdateValue::Bool(value) => statement.bind(value),
            UpdateValue::Text(value) => statement.bind(value),
            UpdateValue::Timestamp(value) => statement.bind(value),
        };
        let result = statement
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .context("failed to update admin account")?;
        Ok(result.rows_affected() > 0)
    }
}

enum UpdateValue<'a> {
    Bool(bool),
    Text(&'a str),
    Timestamp(DateTime<Utc>),
}

#[async_trait]
impl AccountRepository for PgAccounts {
    async fn find_by_email(&self, email: &str) -> Result<Option<AdminAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM admin_accounts WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to lookup admin by email")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AdminAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM admin_accounts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to lookup admin by id")?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert(&self, account: &AdminAccount) -> Result<bool> {
        let query = r"
            INSERT INTO admin_accounts
                (id, email, name, password_hash, role, is_active, created_at, created_by, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (email) DO NOTHING
        ";
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.is_active)
            .bind(account.created_at)
            .bind(account.created_by)
            .bind(account.last_login_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await
            .context("failed to insert admin account")?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<bool> {
        self.update_one(
            "UPDATE admin_accounts SET is_active = $1 WHERE id = $2",
            id,
            UpdateValue::Bool(active),
        )
        .await
    }

    async fn set_role(&self, id: Uuid, role: AdminRole) -> Result<bool> {
        self.update_one(
            "UPDATE admin_accounts SET role = $1 WHERE id = $2",
            id,
            UpdateValue::Text(role.as_str()),
        )
        .await
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<bool> {
        self.update_one(
            "UPDATE admin_accounts SET password_hash = $1 WHERE id = $2",
            id,
            UpdateValue::Text(password_hash),
        )
        .await
    }

    async fn set_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.update_one(
            "UPDATE admin_accounts SET last_login_at = $1 WHERE id = $2",
            id,
            UpdateValue::Timestamp(at),
        )
        .await
    }

    async fn list(&self) -> Result<Vec<AdminAccount>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM admin_accounts ORDER BY created_at");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to list admin accounts")?;
        rows.iter().map(account_from_row).collect()
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) FROM admin_accounts")
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to count admin accounts")?;
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DirectoryRepository for PgDirectory {
    async fn insert_user(&self, user: &DirectoryUser) -> Result<()> {
        let query = format!(
            "INSERT INTO directory_users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        sqlx::query(&query)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.display_name)
            .bind(user.is_blocked)
            .bind(user.blocked_at)
            .bind(user.blocked_by)
            .bind(user.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await
            .context("failed to insert directory user")?;
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        let query = format!("SELECT {USER_COLUMNS} FROM directory_users ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to list directory users")?;
        rows.iter().map(user_from_row).collect()
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<DirectoryUser>> {
        let query = format!("SELECT {USER_COLUMNS} FROM directory_users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to lookup directory user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_blocked(
        &self,
        id: Uuid,
        blocked: bool,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<DirectoryUser>> {
        let query = format!(
            r"
            UPDATE directory_users
            SET is_blocked = $1,
                blocked_at = CASE WHEN $1 THEN $2 ELSE NULL END,
                blocked_by = CASE WHEN $1 THEN $3 ELSE NULL END
            WHERE id = $4
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(blocked)
            .bind(at)
            .bind(by)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .context("failed to update blocked flag")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM directory_users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await
            .context("failed to delete directory user")?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let query = format!(
            "INSERT INTO reports ({REPORT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&query)
            .bind(report.id)
            .bind(&report.reporter_email)
            .bind(report.reported_user_id)
            .bind(&report.reported_user_email)
            .bind(&report.reason)
            .bind(&report.details)
            .bind(report.status.as_str())
            .bind(report.created_at)
            .bind(report.resolved_at)
            .bind(report.resolved_by)
            .execute(&self.pool)
            .instrument(db_span("INSERT"))
            .await
            .context("failed to insert report")?;
        Ok(())
    }

    async fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<Report>> {
        let query = format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(status.map(ReportStatus::as_str))
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .context("failed to list reports")?;
        rows.iter().map(report_from_row).collect()
    }

    async fn resolve_report(
        &self,
        id: Uuid,
        status: ReportStatus,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let query = format!(
            "UPDATE reports SET status = $1, resolved_at = $2, resolved_by = $3 WHERE id = $4 RETURNING {REPORT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(status.as_str())
            .bind(at)
            .bind(by)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE"))
            .await
            .context("failed to resolve report")?;
        row.as_ref().map(report_from_row).transpose()
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let row = sqlx::query(
            r"
            SELECT
                (SELECT COUNT(*) FROM directory_users) AS total_users,
                (SELECT COUNT(*) FROM directory_users WHERE is_blocked) AS blocked_users,
                (SELECT COUNT(*) FROM reports WHERE status = 'pending') AS pending_reports
            ",
        )
        .fetch_one(&self.pool)
        .instrument(db_span("SELECT"))
        .await
        .context("failed to count directory stats")?;
        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(u64::try_from(value).unwrap_or(0))
        };
        Ok(DirectoryStats {
            total_users: count("total_users")?,
            blocked_users: count("blocked_users")?,
            pending_reports: count("pending_reports")?,
        })
    }
}
