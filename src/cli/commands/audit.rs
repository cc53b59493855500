use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use url::Url;

pub const ARG_ALERT_WEBHOOK_URL: &str = "alert-webhook-url";
pub const ARG_AUDIT_QUEUE_CAPACITY: &str = "audit-queue-capacity";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ALERT_WEBHOOK_URL)
                .long(ARG_ALERT_WEBHOOK_URL)
                .help("Webhook receiving audit events that could not be persisted")
                .long_help(
                    "Webhook receiving audit events that could not be persisted (JSON POST). Falls back to the error log when unset or unreachable.",
                )
                .env("WARDEN_ALERT_WEBHOOK_URL"),
        )
        .arg(
            Arg::new(ARG_AUDIT_QUEUE_CAPACITY)
                .long(ARG_AUDIT_QUEUE_CAPACITY)
                .help("Audit events buffered before new ones are escalated instead of queued")
                .env("WARDEN_AUDIT_QUEUE_CAPACITY")
                .default_value("1024")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub alert_webhook_url: Option<Url>,
    pub queue_capacity: usize,
}

impl Options {
    /// # Errors
    /// Returns an error if the webhook URL does not parse.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let alert_webhook_url = matches
            .get_one::<String>(ARG_ALERT_WEBHOOK_URL)
            .map(|url| Url::parse(url).with_context(|| format!("invalid alert webhook URL: {url}")))
            .transpose()?;
        let queue_capacity = matches
            .get_one::<u32>(ARG_AUDIT_QUEUE_CAPACITY)
            .copied()
            .context("missing required argument: --audit-queue-capacity")?;

        Ok(Self {
            alert_webhook_url,
            queue_capacity: usize::try_from(queue_capacity)?,
        })
    }
}
