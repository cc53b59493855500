//! Authentication core: credentials, attempt ledger, rate limiting and sessions.

pub mod authenticator;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod ledger;
pub mod limiter;
pub mod password;
pub mod retry;
pub mod session;

pub use authenticator::{Authenticator, LoginOutcome, PasswordChange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, LockoutPolicy};
pub use credentials::{CredentialStore, NewAccount};
pub use error::{AuthError, DependencyError, ValidationError};
pub use ledger::{AttemptLedger, AttemptSlot, FailureOutcome, IdentityKey};
pub use limiter::{RateLimitAction, RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use password::PasswordHasher;
pub use retry::RetryPolicy;
pub use session::{Principal, SessionError, SessionIssuer, SessionToken};
