use crate::model::{Id, group::Group, user::User};
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use thiserror::Error;
use time::UtcDateTime;

pub const POST_TEXT_MAX_LEN: usize = 1000;
pub const POST_WORD_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A post as served to readers, with its author and optional group resolved.
///
/// The author is immutable after creation; text, group, and image may be
/// changed later by the author through the edit flow.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: User,
    pub group: Option<Group>,
    pub text: PostText,
    /// Path of the attached image in the external media store, if any.
    pub image: Option<String>,
    pub created_at: UtcDateTime,
}

/// Validated post body: at most [`POST_TEXT_MAX_LEN`] characters, with no
/// whitespace-delimited word longer than [`POST_WORD_MAX_LEN`] characters.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct PostText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPostTextError {
    #[error("post text must not be empty")]
    Empty,
    #[error("post text exceeds {POST_TEXT_MAX_LEN} characters")]
    TooLong,
    #[error("word exceeds {POST_WORD_MAX_LEN} characters")]
    WordTooLong,
}

impl PostText {
    pub fn new(text: String) -> Result<Self, InvalidPostTextError> {
        if text.trim().is_empty() {
            return Err(InvalidPostTextError::Empty);
        }
        if text.chars().count() > POST_TEXT_MAX_LEN {
            return Err(InvalidPostTextError::TooLong);
        }
        if text
            .split_whitespace()
            .any(|word| word.chars().count() > POST_WORD_MAX_LEN)
        {
            return Err(InvalidPostTextError::WordTooLong);
        }

        Ok(PostText(text))
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

impl<'de> Deserialize<'de> for PostText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostText::new(inner).map_err(Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_at_limit_is_accepted() {
        let text = "a ".repeat(POST_TEXT_MAX_LEN / 2);
        assert_eq!(text.chars().count(), POST_TEXT_MAX_LEN);
        assert!(PostText::new(text).is_ok());
    }

    #[test]
    fn text_over_limit_is_rejected() {
        let text = "a ".repeat(POST_TEXT_MAX_LEN / 2) + "b";
        assert_eq!(text.chars().count(), POST_TEXT_MAX_LEN + 1);
        assert_eq!(PostText::new(text), Err(InvalidPostTextError::TooLong));
    }

    #[test]
    fn word_at_limit_is_accepted() {
        assert!(PostText::new("x".repeat(POST_WORD_MAX_LEN)).is_ok());
    }

    #[test]
    fn word_over_limit_is_rejected() {
        let text = format!("short {}", "x".repeat(POST_WORD_MAX_LEN + 1));
        assert_eq!(PostText::new(text), Err(InvalidPostTextError::WordTooLong));
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        // Multi-byte characters: 50 of them in one word is still legal.
        assert!(PostText::new("ё".repeat(POST_WORD_MAX_LEN)).is_ok());
        assert!(PostText::new("ё".repeat(POST_WORD_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn empty_text_is_rejected() {
        assert_eq!(PostText::new(String::new()), Err(InvalidPostTextError::Empty));
        assert_eq!(
            PostText::new("   \n".to_owned()),
            Err(InvalidPostTextError::Empty)
        );
    }
}
