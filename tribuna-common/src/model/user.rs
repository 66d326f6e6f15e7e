use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::Display;
use thiserror::Error;

pub const USERNAME_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub username: Username,
}

/// A username: non-empty, at most [`USERNAME_MAX_LEN`] characters, and made
/// of characters that need no escaping in a URL path segment.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The username is invalid: {0}")]
pub struct InvalidUsernameError(String);

impl Username {
    pub fn new(username: String) -> Result<Self, InvalidUsernameError> {
        let legal_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');

        if !username.is_empty()
            && username.chars().count() <= USERNAME_MAX_LEN
            && username.chars().all(legal_char)
        {
            Ok(Username(username))
        } else {
            Err(InvalidUsernameError(username))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Username::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Username"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(Username::new("leo.tolstoy".to_owned()).is_ok());
        assert!(Username::new("a".repeat(USERNAME_MAX_LEN)).is_ok());

        assert!(Username::new(String::new()).is_err());
        assert!(Username::new("a".repeat(USERNAME_MAX_LEN + 1)).is_err());
        assert!(Username::new("has space".to_owned()).is_err());
        assert!(Username::new("sla/sh".to_owned()).is_err());
    }
}
