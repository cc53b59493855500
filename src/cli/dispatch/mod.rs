//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{
    ARG_DSN, ARG_FRONTEND_BASE_URL, ARG_PORT, ARG_SEED_DIRECTORY, audit, auth,
};
use anyhow::{Context, Result};

/// Build the server action from parsed matches.
///
/// # Errors
/// Returns an error if an argument is missing or fails validation.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(ARG_PORT)
        .copied()
        .context("missing required argument: --port")?;
    let dsn = matches.get_one::<String>(ARG_DSN).cloned();
    let frontend_base_url = matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned();
    let seed_directory = matches.get_one::<String>(ARG_SEED_DIRECTORY).cloned();

    let auth_opts = auth::Options::parse(matches)?;
    let audit_opts = audit::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url,
        seed_directory,
        session_secret: auth_opts.session_secret,
        auth_config: auth_opts.config,
        bootstrap: auth_opts.bootstrap,
        alert_webhook_url: audit_opts.alert_webhook_url,
        audit_queue_capacity: audit_opts.queue_capacity,
    }))
}
