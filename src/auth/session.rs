//! Signed, stateless session tokens.
//!
//! Token format: `base64url(claims_json) "." base64url(HMAC-SHA256(key, claims_b64))`.
//! The MAC is checked in constant time before the claims are parsed. A token is
//! only honored while the account is still active; that check goes through a
//! small liveness cache whose entries never outlive `liveness_cache_ttl`.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    clock::{Clock, after, before},
    credentials::CredentialStore,
    error::{AuthError, DependencyError},
};
use crate::storage::AdminRole;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid session")]
    Invalid,
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid => AuthError::AuthFailure,
            SessionError::Dependency(err) => AuthError::Dependency(err),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Wire form handed to the client.
    pub token: String,
    pub subject_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("subject_id", &self.subject_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The authenticated caller, as known to the credential store right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: AdminRole,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.role.is_super_admin()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iat: i64,
    exp: i64,
    nonce: String,
}

#[derive(Clone, Debug)]
struct Liveness {
    account: Option<LiveAccount>,
    checked_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct LiveAccount {
    email: String,
    name: String,
    role: AdminRole,
    is_active: bool,
}

pub struct SessionIssuer {
    key: SecretSlice<u8>,
    ttl: Duration,
    liveness_ttl: Duration,
    credentials: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    liveness: Mutex<HashMap<Uuid, Liveness>>,
}

impl SessionIssuer {
    /// # Errors
    /// Returns an error if the key is shorter than [`MIN_SECRET_LEN`] bytes.
    pub fn new(
        key: SecretSlice<u8>,
        ttl: Duration,
        liveness_ttl: Duration,
        credentials: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        if key.expose_secret().len() < MIN_SECRET_LEN {
            anyhow::bail!("session secret must be at least {MIN_SECRET_LEN} bytes");
        }
        Ok(Self {
            key,
            ttl,
            liveness_ttl: liveness_ttl.min(super::config::MAX_LIVENESS_STALENESS),
            credentials,
            clock,
            liveness: Mutex::new(HashMap::new()),
        })
    }

    /// Random signing key for deployments that did not configure one. Sessions
    /// do not survive a restart with a generated key.
    #[must_use]
    pub fn generate_key() -> SecretSlice<u8> {
        let mut key = vec![0u8; MIN_SECRET_LEN];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut key);
        SecretSlice::from(key)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `account_id`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, account_id: Uuid) -> anyhow::Result<SessionToken> {
        let issued_at = self.clock.now();
        let expires_at = after(issued_at, self.ttl);
        let claims = Claims {
            sub: account_id,
            iat: issued_at.timestamp_millis(),
            exp: expires_at.timestamp_millis(),
            nonce: ulid::Ulid::new().to_string(),
        };
        let payload = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&claims)?);
        let signature = Base64UrlUnpadded::encode_string(&self.mac(&payload)?.finalize().into_bytes());

        Ok(SessionToken {
            token: format!("{payload}.{signature}"),
            subject_id: account_id,
            issued_at,
            expires_at,
            signature,
        })
    }

    /// Check MAC, expiry and account liveness. Returns the subject id.
    ///
    /// # Errors
    /// `Invalid` for any rejected token, `Dependency` if liveness cannot be checked.
    pub async fn validate(&self, token: &str) -> Result<Uuid, SessionError> {
        self.resolve(token).await.map(|principal| principal.id)
    }

    /// Like [`SessionIssuer::validate`], but returns the caller's current role
    /// and identity from the credential store.
    ///
    /// # Errors
    /// `Invalid` for any rejected token, `Dependency` if liveness cannot be checked.
    pub async fn resolve(&self, token: &str) -> Result<Principal, SessionError> {
        let claims = self.verified_claims(token)?;
        let now = self.clock.now();
        let expires_at =
            DateTime::from_timestamp_millis(claims.exp).ok_or(SessionError::Invalid)?;
        if now >= expires_at {
            debug!(subject = %claims.sub, "session expired");
            return Err(SessionError::Invalid);
        }

        match self.live_account(claims.sub, now).await? {
            Some(account) if account.is_active => Ok(Principal {
                id: claims.sub,
                email: account.email,
                name: account.name,
                role: account.role,
                expires_at,
            }),
            _ => {
                debug!(subject = %claims.sub, "session subject missing or inactive");
                Err(SessionError::Invalid)
            }
        }
    }

    /// Drop the cached liveness entry so the next validation re-reads the store.
    pub async fn invalidate(&self, account_id: Uuid) {
        self.liveness.lock().await.remove(&account_id);
    }

    /// Drop cache entries older than the liveness TTL.
    pub async fn sweep(&self) -> usize {
        let cutoff = before(self.clock.now(), self.liveness_ttl);
        let mut cache = self.liveness.lock().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.checked_at > cutoff);
        before - cache.len()
    }

    fn mac(&self, payload: &str) -> anyhow::Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|err| anyhow::anyhow!("invalid session key: {err}"))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    fn verified_claims(&self, token: &str) -> Result<Claims, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Invalid)?;
        let signature =
            Base64UrlUnpadded::decode_vec(signature).map_err(|_| SessionError::Invalid)?;
        self.mac(payload)
            .map_err(|_| SessionError::Invalid)?
            .verify_slice(&signature)
            .map_err(|_| SessionError::Invalid)?;

        let raw = Base64UrlUnpadded::decode_vec(payload).map_err(|_| SessionError::Invalid)?;
        serde_json::from_slice(&raw).map_err(|_| SessionError::Invalid)
    }

    async fn live_account(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<LiveAccount>, SessionError> {
        let fresh_after = before(now, self.liveness_ttl);
        if let Some(entry) = self.liveness.lock().await.get(&id) {
            if entry.checked_at > fresh_after {
                return Ok(entry.account.clone());
            }
        }

        // Lock released; the store lookup happens without holding it.
        let account = self.credentials.get(id).await?.map(|account| LiveAccount {
            email: account.email,
            name: account.name,
            role: account.role,
            is_active: account.is_active,
        });

        self.liveness.lock().await.insert(
            id,
            Liveness {
                account: account.clone(),
                checked_at: now,
            },
        );
        Ok(account)
    }
}

impl fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("ttl", &self.ttl)
            .field("liveness_ttl", &self.liveness_ttl)
            .finish_non_exhaustive()
    }
}
