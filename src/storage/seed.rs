//! Directory fixture loaded at startup with `--seed-directory`.
//!
//! The fixture is only applied to an empty directory, so restarting against a
//! database that already holds users never duplicates them.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::{DirectoryRepository, DirectoryUser, Report, ReportStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySeed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub reports: Vec<SeedReport>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub is_blocked: bool,
    pub joined: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedReport {
    pub reporter_email: String,
    /// Must match the email of a user in the same fixture.
    pub reported_user_email: String,
    pub reason: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default = "pending")]
    pub status: ReportStatus,
    pub created_at: Option<DateTime<Utc>>,
}

fn pending() -> ReportStatus {
    ReportStatus::Pending
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub reports: usize,
}

impl DirectorySeed {
    /// # Errors
    /// Returns an error if the JSON does not describe a fixture.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid directory seed JSON")
    }

    /// Insert the fixture into `directory`. Returns `None` when the directory
    /// already holds users and nothing was written.
    ///
    /// # Errors
    /// Returns an error if a report names an unknown user, or on store failure.
    pub async fn apply(
        &self,
        directory: &dyn DirectoryRepository,
        now: DateTime<Utc>,
    ) -> Result<Option<SeedSummary>> {
        if directory.stats().await?.total_users > 0 {
            info!("directory already populated, seed skipped");
            return Ok(None);
        }

        let users: Vec<DirectoryUser> = self
            .users
            .iter()
            .map(|seed| DirectoryUser {
                id: Uuid::new_v4(),
                email: seed.email.trim().to_lowercase(),
                display_name: seed.display_name.clone(),
                is_blocked: seed.is_blocked,
                blocked_at: seed.is_blocked.then_some(now),
                blocked_by: None,
                created_at: seed.joined.unwrap_or(now),
            })
            .collect();
        let by_email: HashMap<&str, Uuid> = users
            .iter()
            .map(|user| (user.email.as_str(), user.id))
            .collect();

        // Resolve every reference before writing anything.
        let mut reports = Vec::with_capacity(self.reports.len());
        for seed in &self.reports {
            let reported_email = seed.reported_user_email.trim().to_lowercase();
            let reported_user_id = *by_email.get(reported_email.as_str()).ok_or_else(|| {
                anyhow!("seed report references unknown user {reported_email}")
            })?;
            let created_at = seed.created_at.unwrap_or(now);
            let resolved = seed.status != ReportStatus::Pending;
            reports.push(Report {
                id: Uuid::new_v4(),
                reporter_email: seed.reporter_email.clone(),
                reported_user_id,
                reported_user_email: reported_email,
                reason: seed.reason.clone(),
                details: seed.details.clone(),
                status: seed.status,
                created_at,
                resolved_at: resolved.then_some(created_at),
                resolved_by: None,
            });
        }

        for user in &users {
            directory.insert_user(user).await?;
        }
        for report in &reports {
            directory.insert_report(report).await?;
        }

        let summary = SeedSummary {
            users: users.len(),
            reports: reports.len(),
        };
        info!(users = summary.users, reports = summary.reports, "directory seeded");
        Ok(Some(summary))
    }
}
