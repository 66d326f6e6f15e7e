use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::{convert::Infallible, sync::Arc};
use time::UtcDateTime;
use tribuna_common::model::{
    Id,
    auth::AuthToken,
    user::{User, UserMarker, Username},
};
use tribuna_db::client::DbClient;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The current user, resolved from the `Authorization: Bearer` header.
///
/// A missing header rejects with [`ServerError::Unauthenticated`], which
/// redirects to the login page with the original URL as `next`; a present
/// but invalid or expired token is a hard 401 instead.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
    username: Username,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &Username {
        &self.username
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                if rejection.is_missing() {
                    ServerError::Unauthenticated {
                        next: parts.uri.to_string(),
                    }
                } else {
                    ServerError::InvalidAuthorizationHeader(rejection)
                }
            })?;

        let request_token: AuthToken = header.token().parse()?;
        let token_hash = request_token.hash()?;

        let db = Arc::<DbClient>::from_ref(state);
        let authentication = db
            .fetch_session(&token_hash)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        if let Some(expires_after) = authentication.expires_after
            && authentication.created_at + expires_after.get() < UtcDateTime::now()
        {
            return Err(ServerError::InvalidToken);
        }

        let User { id, username } = db
            .fetch_user(authentication.user)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        Ok(Self { id, username })
    }
}

/// The current user if the request carries a valid token, otherwise nothing.
/// Public pages use this where being logged in only changes presentation.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for MaybeUser
where
    Arc<DbClient>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            AuthenticatedUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}
