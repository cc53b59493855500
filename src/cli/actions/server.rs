use anyhow::{Context, Result, anyhow};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{fs, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

use crate::api::{self, AppState, Backends};
use crate::audit::{
    AlertChannel, AuditConfig, AuditEventType, AuditLogger, AuditSink, LogAlert, MemorySink,
    PgSink, WebhookAlert,
};
use crate::auth::{
    AuthConfig, Clock, PasswordHasher, SessionIssuer, SystemClock, session::MIN_SECRET_LEN,
};
use crate::cli::commands::auth::Bootstrap;
use crate::storage::{
    AccountRepository, DirectoryRepository,
    memory::{MemoryAccounts, MemoryDirectory},
    postgres::{PgAccounts, PgDirectory},
    seed::DirectorySeed,
};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_base_url: Option<String>,
    pub seed_directory: Option<String>,
    pub session_secret: Option<SecretString>,
    pub auth_config: AuthConfig,
    pub bootstrap: Option<Bootstrap>,
    pub alert_webhook_url: Option<Url>,
    pub audit_queue_capacity: usize,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the session secret is too
/// short, bootstrapping fails or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = connect(args.dsn.as_deref()).await?;
    if let Some(path) = &args.seed_directory {
        seed_directory(storage.directory.as_ref(), path, clock.as_ref()).await?;
    }

    let alert: Arc<dyn AlertChannel> = match &args.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlert::new(url.clone(), WEBHOOK_TIMEOUT)?),
        None => Arc::new(LogAlert),
    };
    let (audit, audit_worker) = AuditLogger::spawn(
        storage.audit,
        alert,
        AuditConfig::new()
            .with_queue_capacity(args.audit_queue_capacity)
            .with_retry(args.auth_config.retry().clone()),
        clock.clone(),
    );

    let state = Arc::new(AppState::new(
        args.auth_config,
        session_key(args.session_secret.as_ref())?,
        PasswordHasher::default(),
        Backends {
            accounts: storage.accounts,
            directory: storage.directory,
            audit: audit.clone(),
            pool: storage.pool,
        },
        clock,
    )?);

    bootstrap(&state, args.bootstrap.as_ref()).await?;

    let served = api::new(args.port, state, args.frontend_base_url.as_deref()).await;

    // Drain queued audit events before exiting.
    audit.flush().await;
    drop(audit);
    if let Err(err) = audit_worker.await {
        warn!("audit worker ended abnormally: {err}");
    }
    served
}

struct Storage {
    accounts: Arc<dyn AccountRepository>,
    directory: Arc<dyn DirectoryRepository>,
    audit: Arc<dyn AuditSink>,
    pool: Option<sqlx::PgPool>,
}

async fn connect(dsn: Option<&str>) -> Result<Storage> {
    let Some(dsn) = dsn else {
        warn!("No --dsn given: admin accounts and the audit trail live in memory only");
        return Ok(Storage {
            accounts: Arc::new(MemoryAccounts::new()),
            directory: Arc::new(MemoryDirectory::new()),
            audit: Arc::new(MemorySink::new()),
            pool: None,
        });
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    Ok(Storage {
        accounts: Arc::new(PgAccounts::new(pool.clone())),
        directory: Arc::new(PgDirectory::new(pool.clone())),
        audit: Arc::new(PgSink::new(pool.clone())),
        pool: Some(pool),
    })
}

async fn seed_directory(
    directory: &dyn DirectoryRepository,
    path: &str,
    clock: &dyn Clock,
) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read directory seed: {path}"))?;
    let seed = DirectorySeed::from_json(&raw)?;
    seed.apply(directory, clock.now())
        .await
        .with_context(|| format!("Failed to apply directory seed: {path}"))?;
    Ok(())
}

fn session_key(secret: Option<&SecretString>) -> Result<SecretSlice<u8>> {
    match secret {
        Some(secret) => {
            let bytes = secret.expose_secret().as_bytes();
            if bytes.len() < MIN_SECRET_LEN {
                return Err(anyhow!(
                    "--session-secret must be at least {MIN_SECRET_LEN} bytes"
                ));
            }
            Ok(SecretSlice::from(bytes.to_vec()))
        }
        None => {
            warn!("No --session-secret given: using a random key, sessions end on restart");
            Ok(SessionIssuer::generate_key())
        }
    }
}

async fn bootstrap(state: &AppState, bootstrap: Option<&Bootstrap>) -> Result<()> {
    let Some(bootstrap) = bootstrap else {
        if state.credentials().count().await? == 0 {
            warn!("No admin accounts exist; set WARDEN_BOOTSTRAP_EMAIL and WARDEN_BOOTSTRAP_PASSWORD");
        }
        return Ok(());
    };

    let created = state
        .credentials()
        .bootstrap(
            &bootstrap.email,
            bootstrap.password.expose_secret(),
            &bootstrap.name,
        )
        .await
        .context("Failed to bootstrap super admin")?;

    match created {
        Some(account) => {
            let account_id = account.id.to_string();
            state.audit().record(
                AuditEventType::BootstrapAdmin,
                "system",
                Some(&account_id),
                &format!("bootstrapped super admin {}", account.email),
            );
            info!(account = %account.id, "bootstrapped super admin");
        }
        None => debug!("admin accounts exist, skipping bootstrap"),
    }
    Ok(())
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "storage",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        (
            "frontend_base_url",
            args.frontend_base_url
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        ("session_secret_set", args.session_secret.is_some().to_string()),
        (
            "session_ttl_seconds",
            args.auth_config.session_ttl().as_secs().to_string(),
        ),
        (
            "lockout",
            format!(
                "{} attempts / {}s, locked {}s",
                args.auth_config.lockout().max_attempts,
                args.auth_config.lockout().attempt_window.as_secs(),
                args.auth_config.lockout().lockout_duration.as_secs()
            ),
        ),
        (
            "trust_proxy_headers",
            args.auth_config.trust_proxy_headers().to_string(),
        ),
        ("bootstrap_set", args.bootstrap.is_some().to_string()),
        (
            "seed_directory",
            args.seed_directory
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
        (
            "alert_webhook",
            args.alert_webhook_url
                .as_ref()
                .map_or_else(|| "log".to_string(), |url| redact_url(url.clone())),
        ),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = String::from("Startup configuration:");
    for (key, value) in &entries {
        message.push_str(&format!("\n  {key:<max_key_len$}  {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    Url::parse(dsn).map_or_else(|_| "invalid-dsn".to_string(), redact_url)
}

fn redact_url(mut url: Url) -> String {
    if url.password().is_some() {
        let _ = url.set_password(Some("REDACTED"));
    }
    url.to_string()
}
