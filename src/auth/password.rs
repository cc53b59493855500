//! Password policy, email normalization and Argon2id hashing.
//!
//! Hashes are stored as PHC strings, so the per-account salt travels inside the
//! hash (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`) and never needs its own
//! column.

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::{Rng, rngs::OsRng, seq::SliceRandom};
use regex::Regex;
use std::sync::LazyLock;

use super::error::ValidationError;

pub const MIN_PASSWORD_LENGTH: usize = 12;
pub const MIN_PASSWORD_SCORE: u8 = 4;
pub const MIN_NAME_LENGTH: usize = 2;
pub const GENERATED_PASSWORD_LENGTH: usize = 16;
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";
const GENERATED_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const GENERATED_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const GENERATED_DIGITS: &[u8] = b"0123456789";
const GENERATED_SYMBOLS: &[u8] = b"!@#$%^&*";

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Which strength criteria a password meets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PasswordStrength {
    pub length: bool,
    pub uppercase: bool,
    pub lowercase: bool,
    pub digit: bool,
    pub symbol: bool,
}

impl PasswordStrength {
    #[must_use]
    pub fn evaluate(password: &str) -> Self {
        Self {
            length: password.chars().count() >= MIN_PASSWORD_LENGTH,
            uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            symbol: password.chars().any(|c| SYMBOLS.contains(c)),
        }
    }

    #[must_use]
    pub fn score(&self) -> u8 {
        [
            self.length,
            self.uppercase,
            self.lowercase,
            self.digit,
            self.symbol,
        ]
        .into_iter()
        .map(u8::from)
        .sum()
    }

    #[must_use]
    pub fn is_strong(&self) -> bool {
        self.score() >= MIN_PASSWORD_SCORE
    }
}

/// Reject passwords scoring below 4 of 5.
///
/// # Errors
/// Returns `ValidationError::WeakPassword` with the achieved score.
pub fn check_password_policy(password: &str) -> Result<(), ValidationError> {
    let strength = PasswordStrength::evaluate(password);
    if strength.is_strong() {
        Ok(())
    } else {
        Err(ValidationError::WeakPassword {
            score: strength.score(),
        })
    }
}

/// Trim and lowercase an email. Emails compare case-insensitively everywhere.
#[must_use]
/// Random password for a new admin, drawn from the OS generator. Always holds
/// every character class, so it scores 5 of 5.
#[must_use]
pub fn generate_password() -> String {
    let classes = [
        GENERATED_UPPER,
        GENERATED_LOWER,
        GENERATED_DIGITS,
        GENERATED_SYMBOLS,
    ];
    let alphabet = classes.concat();
    let mut rng = OsRng;

    let mut bytes: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while bytes.len() < GENERATED_PASSWORD_LENGTH {
        bytes.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    bytes.shuffle(&mut rng);
    bytes.into_iter().map(char::from).collect()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|re| email.len() <= 254 && re.is_match(email))
}

/// Trim a display name and require at least two characters.
///
/// # Errors
/// Returns `ValidationError::InvalidName` when the trimmed name is too short.
pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.chars().count() < MIN_NAME_LENGTH {
        return Err(ValidationError::InvalidName);
    }
    Ok(name.to_string())
}

/// Argon2id hasher with configurable cost parameters.
#[derive(Clone, Debug)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if Argon2 rejects the input.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?;
        Ok(hash.to_string())
    }

    /// Constant-time verification against a stored PHC string. A malformed hash
    /// never verifies.
    #[must_use]
    pub fn verify(&self, password: &str, phc: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(phc) else {
            return false;
        };
        // Cost parameters come from the PHC string, not from `self.params`.
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash used to burn the same work when no account can be checked.
    ///
    /// # Errors
    /// Returns an error if Argon2 rejects the input.
    pub fn dummy_hash(&self) -> Result<String> {
        let mut seed = [0u8; 24];
        rand::RngCore::fill_bytes(&mut OsRng, &mut seed);
        let filler: String = seed.iter().map(|b| format!("{b:02x}")).collect();
        self.hash(&filler).context("failed to prepare dummy hash")
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

/// Extract the encoded salt from a PHC hash string.
#[must_use]
pub fn phc_salt(phc: &str) -> Option<String> {
    PasswordHash::new(phc)
        .ok()
        .and_then(|hash| hash.salt.map(|salt| salt.as_str().to_string()))
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    match Params::new(1024, 1, 1, None) {
        Ok(params) => PasswordHasher::new(params),
        Err(_) => PasswordHasher::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_and_strong_passwords() {
        assert_eq!(PasswordStrength::evaluate("password1").score(), 2);
        assert_eq!(
            check_password_policy("password1"),
            Err(ValidationError::WeakPassword { score: 2 })
        );

        let strong = PasswordStrength::evaluate("Str0ng!Passw0rd");
        assert_eq!(strong.score(), 5);
        assert!(check_password_policy("Str0ng!Passw0rd").is_ok());
    }

    #[test]
    fn four_of_five_is_enough() {
        // No symbol, but long with all three character classes.
        assert!(check_password_policy("LongPassword12").is_ok());
        // Short but every class present.
        assert!(check_password_policy("Ab1!").is_ok());
        assert!(check_password_policy("abcdefghijkl").is_err());
    }

    #[test]
    fn generated_passwords_are_strong_and_distinct() {
        let first = generate_password();
        assert_eq!(first.len(), GENERATED_PASSWORD_LENGTH);
        assert_eq!(PasswordStrength::evaluate(&first).score(), 5);
        assert!(check_password_policy(&first).is_ok());

        for _ in 0..32 {
            let next = generate_password();
            assert!(PasswordStrength::evaluate(&next).is_strong());
            assert_ne!(next, first);
        }
    }

    #[test]
    fn email_rules() {
        assert_eq!(normalize_email("  Admin@Example.COM "), "admin@example.com");
        assert!(valid_email("admin@example.com"));
        assert!(!valid_email("admin@example"));
        assert!(!valid_email("admin example@x.com"));
        assert!(!valid_email("@x.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn names_need_two_characters() {
        assert_eq!(normalize_name("  Al ").ok().as_deref(), Some("Al"));
        assert_eq!(normalize_name(" A "), Err(ValidationError::InvalidName));
    }

    #[test]
    fn hash_and_verify() -> Result<()> {
        let hasher = test_hasher();
        let hash = hasher.hash("Str0ng!Passw0rd")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Str0ng!Passw0rd", &hash));
        assert!(!hasher.verify("Str0ng!Passw0rD", &hash));
        assert!(!hasher.verify("Str0ng!Passw0rd", "not-a-phc-string"));
        Ok(())
    }

    #[test]
    fn salts_are_unique_and_embedded() -> Result<()> {
        let hasher = test_hasher();
        let first = hasher.hash("Str0ng!Passw0rd")?;
        let second = hasher.hash("Str0ng!Passw0rd")?;
        assert_ne!(first, second);

        let salt = phc_salt(&first);
        assert!(salt.is_some());
        assert_ne!(salt, phc_salt(&second));
        assert!(first.contains(&salt.unwrap_or_default()));
        Ok(())
    }
}
