use sqlx::FromRow;
use time::{Duration, PrimitiveDateTime};
use tribuna_common::model::{
    ModelValidationError,
    auth::Authentication,
    comment::{Comment, CommentText},
    group::{Group, Slug},
    post::{Post, PostText},
    user::{User, Username},
};

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub id: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct GroupRecord {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A post row joined with its author and (optionally) its group.
#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub id: i64,
    pub text: String,
    pub image: Option<String>,
    pub created_at: PrimitiveDateTime,
    pub author_id: i64,
    pub author_username: String,
    pub group_id: Option<i64>,
    pub group_title: Option<String>,
    pub group_slug: Option<String>,
    pub group_description: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct CommentRecord {
    pub id: i64,
    pub text: String,
    pub created_at: PrimitiveDateTime,
    pub post_id: i64,
    pub author_id: i64,
    pub author_username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, FromRow)]
pub(crate) struct SessionRecord {
    pub user_id: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.into(),
            username: Username::new(value.username)?,
        })
    }
}

impl TryFrom<GroupRecord> for Group {
    type Error = ModelValidationError;

    fn try_from(value: GroupRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.into(),
            title: value.title,
            slug: Slug::new(value.slug)?,
            description: value.description,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        let group = match (
            value.group_id,
            value.group_title,
            value.group_slug,
            value.group_description,
        ) {
            (Some(id), Some(title), Some(slug), Some(description)) => Some(Group {
                id: id.into(),
                title,
                slug: Slug::new(slug)?,
                description,
            }),
            _ => None,
        };

        Ok(Self {
            id: value.id.into(),
            author: User {
                id: value.author_id.into(),
                username: Username::new(value.author_username)?,
            },
            group,
            text: PostText::new(value.text)?,
            image: value.image,
            created_at: value.created_at.as_utc(),
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.into(),
            post: value.post_id.into(),
            author: User {
                id: value.author_id.into(),
                username: Username::new(value.author_username)?,
            },
            text: CommentText::new(value.text)?,
            created_at: value.created_at.as_utc(),
        })
    }
}

impl TryFrom<SessionRecord> for Authentication {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user_id.into(),
            token_hash: value.token_hash.into_boxed_slice().try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}
