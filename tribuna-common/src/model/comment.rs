use crate::model::{Id, post::PostMarker, user::User};
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use thiserror::Error;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

/// A comment under a post. Comments are never edited or deleted through the
/// modeled flows.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post: Id<PostMarker>,
    pub author: User,
    pub text: CommentText,
    pub created_at: UtcDateTime,
}

/// Validated comment body: non-empty, with no length ceiling.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentText(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("comment text must not be empty")]
pub struct InvalidCommentTextError;

impl CommentText {
    pub fn new(text: String) -> Result<Self, InvalidCommentTextError> {
        if text.trim().is_empty() {
            Err(InvalidCommentTextError)
        } else {
            Ok(CommentText(text))
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

impl<'de> Deserialize<'de> for CommentText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        CommentText::new(inner).map_err(Error::custom)
    }
}
