use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Parse arguments, install logging and return the action to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments are invalid
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(get_verbosity_level(
        matches
            .get_one::<u8>(commands::logging::ARG_VERBOSITY)
            .copied()
            .unwrap_or(0),
    ))?;

    dispatch::handler(&matches)
}
