//! Session, lockout, rate limit and bootstrap arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

use crate::auth::{AuthConfig, LockoutPolicy, RateLimitPolicy};

pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_TRUST_PROXY_HEADERS: &str = "trust-proxy-headers";
pub const ARG_LOCKOUT_MAX_ATTEMPTS: &str = "lockout-max-attempts";
pub const ARG_LOCKOUT_WINDOW_SECONDS: &str = "lockout-window-seconds";
pub const ARG_LOCKOUT_DURATION_SECONDS: &str = "lockout-duration-seconds";
pub const ARG_LOGIN_RATE_LIMIT: &str = "login-rate-limit";
pub const ARG_LOGIN_RATE_WINDOW_SECONDS: &str = "login-rate-window-seconds";
pub const ARG_BOOTSTRAP_EMAIL: &str = "bootstrap-email";
pub const ARG_BOOTSTRAP_PASSWORD: &str = "bootstrap-password";
pub const ARG_BOOTSTRAP_NAME: &str = "bootstrap-name";

/// Upper bound for every duration flag: one year.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_lockout_args(command);
    with_bootstrap_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("HMAC key for session tokens, at least 32 bytes")
                .long_help(
                    "HMAC key for session tokens, at least 32 bytes. When unset a random key is generated and sessions do not survive a restart.",
                )
                .env("WARDEN_SESSION_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("WARDEN_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64).range(60..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark the session cookie Secure (disable only for plain-HTTP development)")
                .env("WARDEN_SESSION_COOKIE_SECURE")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_TRUST_PROXY_HEADERS)
                .long(ARG_TRUST_PROXY_HEADERS)
                .help("Key login throttling on the first X-Forwarded-For hop (only behind a trusted proxy)")
                .env("WARDEN_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOCKOUT_MAX_ATTEMPTS)
                .long(ARG_LOCKOUT_MAX_ATTEMPTS)
                .help("Failed logins within the window before an account is locked")
                .env("WARDEN_LOCKOUT_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_WINDOW_SECONDS)
                .long(ARG_LOCKOUT_WINDOW_SECONDS)
                .help("Sliding window for counting failed logins")
                .env("WARDEN_LOCKOUT_WINDOW_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_DURATION_SECONDS)
                .long(ARG_LOCKOUT_DURATION_SECONDS)
                .help("How long a locked account stays locked")
                .env("WARDEN_LOCKOUT_DURATION_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
        .arg(
            Arg::new(ARG_LOGIN_RATE_LIMIT)
                .long(ARG_LOGIN_RATE_LIMIT)
                .help("Login requests allowed per client address within the rate window")
                .env("WARDEN_LOGIN_RATE_LIMIT")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOGIN_RATE_WINDOW_SECONDS)
                .long(ARG_LOGIN_RATE_WINDOW_SECONDS)
                .help("Window for the login rate limit")
                .env("WARDEN_LOGIN_RATE_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_DURATION_SECONDS)),
        )
}

fn with_bootstrap_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BOOTSTRAP_EMAIL)
                .long(ARG_BOOTSTRAP_EMAIL)
                .help("Email of the first super admin, created only when no admin exists")
                .env("WARDEN_BOOTSTRAP_EMAIL")
                .requires(ARG_BOOTSTRAP_PASSWORD),
        )
        .arg(
            Arg::new(ARG_BOOTSTRAP_PASSWORD)
                .long(ARG_BOOTSTRAP_PASSWORD)
                .help("Password of the first super admin")
                .env("WARDEN_BOOTSTRAP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_BOOTSTRAP_EMAIL),
        )
        .arg(
            Arg::new(ARG_BOOTSTRAP_NAME)
                .long(ARG_BOOTSTRAP_NAME)
                .help("Display name of the first super admin")
                .env("WARDEN_BOOTSTRAP_NAME")
                .default_value("Super Admin"),
        )
}

#[derive(Debug)]
pub struct Bootstrap {
    pub email: String,
    pub password: SecretString,
    pub name: String,
}

#[derive(Debug)]
pub struct Options {
    pub session_secret: Option<SecretString>,
    pub config: AuthConfig,
    pub bootstrap: Option<Bootstrap>,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let seconds = |id: &str| -> Result<Duration> {
            matches
                .get_one::<u64>(id)
                .copied()
                .map(Duration::from_secs)
                .with_context(|| format!("missing required argument: --{id}"))
        };

        let lockout = LockoutPolicy {
            max_attempts: matches
                .get_one::<u32>(ARG_LOCKOUT_MAX_ATTEMPTS)
                .copied()
                .context("missing required argument: --lockout-max-attempts")?,
            attempt_window: seconds(ARG_LOCKOUT_WINDOW_SECONDS)?,
            lockout_duration: seconds(ARG_LOCKOUT_DURATION_SECONDS)?,
        };
        let login_rate_limit = RateLimitPolicy {
            limit: matches
                .get_one::<u32>(ARG_LOGIN_RATE_LIMIT)
                .copied()
                .context("missing required argument: --login-rate-limit")?,
            window: seconds(ARG_LOGIN_RATE_WINDOW_SECONDS)?,
        };

        let config = AuthConfig::new()
            .with_lockout(lockout)
            .with_session_ttl(seconds(ARG_SESSION_TTL_SECONDS)?)
            .with_login_rate_limit(login_rate_limit)
            .with_trust_proxy_headers(matches.get_flag(ARG_TRUST_PROXY_HEADERS))
            .with_session_cookie_secure(
                matches
                    .get_one::<bool>(ARG_SESSION_COOKIE_SECURE)
                    .copied()
                    .unwrap_or(true),
            );

        let bootstrap = match (
            matches.get_one::<String>(ARG_BOOTSTRAP_EMAIL),
            matches.get_one::<String>(ARG_BOOTSTRAP_PASSWORD),
        ) {
            (Some(email), Some(password)) => Some(Bootstrap {
                email: email.clone(),
                password: SecretString::from(password.clone()),
                name: matches
                    .get_one::<String>(ARG_BOOTSTRAP_NAME)
                    .cloned()
                    .unwrap_or_else(|| "Super Admin".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            session_secret: matches
                .get_one::<String>(ARG_SESSION_SECRET)
                .map(|secret| SecretString::from(secret.clone())),
            config,
            bootstrap,
        })
    }
}
