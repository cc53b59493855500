pub mod audit;
pub mod auth;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SEED_DIRECTORY: &str = "seed-directory";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("warden")
        .about("Admin authentication and abuse rate limiting")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("WARDEN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .long_help(
                    "PostgreSQL connection string. When unset, accounts, directory and audit trail are kept in memory and lost on restart.",
                )
                .env("WARDEN_DSN"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Admin dashboard URL allowed by CORS")
                .env("WARDEN_FRONTEND_BASE_URL"),
        )
        .arg(
            Arg::new(ARG_SEED_DIRECTORY)
                .long(ARG_SEED_DIRECTORY)
                .help("JSON fixture of chat users and reports")
                .long_help(
                    "Path to a JSON fixture of chat users and reports, loaded at startup only when the directory is empty. See db/seed/directory.json.",
                )
                .env("WARDEN_SEED_DIRECTORY"),
        );

    let command = auth::with_args(command);
    let command = audit::with_args(command);
    logging::with_args(command)
}
