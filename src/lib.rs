//! # Warden (admin authentication and abuse rate limiting)
//!
//! `warden` is the server-side authority for an admin dashboard. It verifies
//! admin credentials, issues signed sessions, throttles sensitive actions and
//! keeps an append-only audit trail of everything security relevant.
//!
//! ## Login flow
//!
//! 1. The rate limiter gates the request by server-observed client address.
//! 2. The attempt ledger rejects identities that are locked out.
//! 3. The credential store verifies the Argon2id password hash.
//! 4. On success the ledger is cleared and a session token is minted; on failure
//!    the ledger records the attempt and may lock the identity.
//! 5. Every outcome is written to the audit logger.
//!
//! ## Authorization
//!
//! Roles live in the credential store. Session tokens only carry the account id,
//! and every request re-checks that the account is still active (through a short
//! lived cache), so a deactivated admin loses access within seconds.
//!
//! ## Failure policy
//!
//! Nothing fails open: when a dependency is unreachable, authentication is denied.
//! Audit writes that cannot be persisted are escalated to an alert channel.

pub mod admin;
pub mod api;
pub mod audit;
pub mod auth;
pub mod cli;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
