use crate::model::{Id, user::UserMarker};
use argon2::{
    Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const AUTH_TOKEN_CORE_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing auth token failed: {0}")]
pub struct AuthTokenHashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Password hashing failed: {0}")]
pub struct PasswordHashError(argon2::password_hash::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// A bearer token as held by the client: the owning user id plus random
/// core and salt bytes. Only its argon2 hash is ever stored.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; AUTH_TOKEN_CORE_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(pub Box<[u8; AUTH_TOKEN_HASH_LEN]>);

/// A stored login session.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: UtcDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        let core = rand::random();
        let salt = rand::random();

        Self {
            user_id,
            core,
            salt,
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<AuthTokenHash, AuthTokenHashError> {
        let argon2 = Argon2::default();

        let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
        argon2
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(AuthTokenHashError)?;

        Ok(AuthTokenHash(hash))
    }
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = i64::from_str(user_id_part)
            .map_err(Self::Err::InvalidUserId)?
            .into();
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Box<[u8]>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Box<[u8]>) -> Result<Self, Self::Error> {
        Ok(Self(
            value.try_into().map_err(|_| InvalidAuthTokenHashError)?,
        ))
    }
}

/// Hash a signup password for storage, in PHC string format.
pub fn hash_password(password: &str) -> Result<String, PasswordHashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(PasswordHashError)?;

    Ok(hash.to_string())
}

/// Check a login password against the stored PHC hash string.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordHashError> {
    let parsed = PasswordHash::new(stored_hash).map_err(PasswordHashError)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(PasswordHashError(err)),
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_through_its_string_form() {
        let token = AuthToken::generate_random(Id::new(7));
        let reparsed: AuthToken = token.as_token_str().parse().unwrap();

        assert_eq!(token, reparsed);
    }

    #[test]
    fn garbage_tokens_fail_to_decode() {
        assert!(AuthToken::from_str("no-colons-here").is_err());
        assert!(AuthToken::from_str("x:YWJj:YWJj").is_err());
        assert!(AuthToken::from_str("1:YWJj:YWJj").is_err());
    }

    #[test]
    fn password_verification() {
        let stored = hash_password("correct horse").unwrap();

        assert!(verify_password("correct horse", &stored).unwrap());
        assert!(!verify_password("battery staple", &stored).unwrap());
    }
}
