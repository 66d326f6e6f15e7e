pub mod auth;
pub mod comment;
pub mod group;
pub mod post;
pub mod user;

use crate::model::{
    auth::{InvalidAuthTokenHashError, NonPositiveDurationError},
    comment::InvalidCommentTextError,
    group::InvalidSlugError,
    post::InvalidPostTextError,
    user::InvalidUsernameError,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    Slug(#[from] InvalidSlugError),
    #[error(transparent)]
    PostText(#[from] InvalidPostTextError),
    #[error(transparent)]
    CommentText(#[from] InvalidCommentTextError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidAuthTokenHashError),
}

impl ModelValidationError {
    /// The submitted field the error should be reported against.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            ModelValidationError::Username(_) => "username",
            ModelValidationError::Slug(_) => "group",
            ModelValidationError::PostText(_) | ModelValidationError::CommentText(_) => "text",
            ModelValidationError::NonPositiveDuration(_) | ModelValidationError::TokenHash(_) => {
                "token"
            }
        }
    }
}

/// A server-assigned row id, branded with the entity it identifies.
///
/// The database assigns ids in insertion order, so `ORDER BY id DESC` is
/// newest-first.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id<Marker>(i64, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(id: i64) -> Self {
        Self(id, PhantomData)
    }

    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<i64> for Id<Marker> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for i64 {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}
