use crate::model::Id;
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::Display;
use thiserror::Error;

pub const SLUG_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct GroupMarker;

/// A topic posts can be filed under. Groups are created administratively;
/// deleting one is out of the modeled flows, and posts only ever hold a
/// nullable reference to it.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct Group {
    pub id: Id<GroupMarker>,
    pub title: String,
    pub slug: Slug,
    pub description: String,
}

/// The group's identity in URLs: non-empty, at most [`SLUG_MAX_LEN`]
/// characters, lowercase ascii alphanumerics plus `-` and `_`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The group slug is invalid: {0}")]
pub struct InvalidSlugError(String);

impl Slug {
    pub fn new(slug: String) -> Result<Self, InvalidSlugError> {
        let legal_char =
            |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_');

        if !slug.is_empty() && slug.chars().count() <= SLUG_MAX_LEN && slug.chars().all(legal_char)
        {
            Ok(Slug(slug))
        } else {
            Err(InvalidSlugError(slug))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Slug::new(inner).map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Slug"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_validation() {
        assert!(Slug::new("rust-lang".to_owned()).is_ok());
        assert!(Slug::new("group_2".to_owned()).is_ok());

        assert!(Slug::new(String::new()).is_err());
        assert!(Slug::new("Capitalized".to_owned()).is_err());
        assert!(Slug::new("with space".to_owned()).is_err());
        assert!(Slug::new("a".repeat(SLUG_MAX_LEN + 1)).is_err());
    }
}
