use crate::server::{cache::PageCache, json::Json};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use tribuna_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenDecodeError, AuthTokenHashError, PasswordHashError},
        group::Slug,
        post::PostMarker,
        user::Username,
    },
    pagination::PageOutOfRange,
};
use tribuna_db::client::{DbClient, DbError};

pub mod auth;
pub mod cache;
mod json;
mod query;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub page_cache: PageCache,
}

/// Build the full application router. The page cache wraps only the index
/// route, inside `routes`.
pub fn app(db_client: Arc<DbClient>, page_cache: PageCache) -> Router {
    let state = ServerState {
        db_client,
        page_cache: page_cache.clone(),
    };

    routes::routes(&page_cache)
        .fallback(fallback)
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Incoming query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Authentication required")]
    Unauthenticated { next: String },
    #[error("The provided auth token could not be decoded: {0}")]
    InvalidAuthToken(#[from] AuthTokenDecodeError),
    #[error("The auth token could not be hashed: {0}")]
    AuthTokenHash(#[from] AuthTokenHashError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error("Provided token was invalid")]
    InvalidToken,
    #[error("Unknown username or wrong password")]
    WrongCredentials,
    #[error("Submitted form was invalid: {0}")]
    Validation(#[from] ModelValidationError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Group with slug {0} was not found.")]
    GroupBySlugNotFound(Slug),
    #[error("User with username {0} was not found.")]
    UserByUsernameNotFound(Username),
    #[error("Not following {0}.")]
    NotFollowing(Username),
    #[error(transparent)]
    PageOutOfRange(#[from] PageOutOfRange),
}

impl ServerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::GroupBySlugNotFound(_)
            | ServerError::UserByUsernameNotFound(_)
            | ServerError::NotFollowing(_)
            | ServerError::PageOutOfRange(_) => StatusCode::NOT_FOUND,
            ServerError::Unauthenticated { .. } => StatusCode::SEE_OTHER,
            ServerError::InvalidToken | ServerError::WrongCredentials => StatusCode::UNAUTHORIZED,
            ServerError::Database(DbError::UniqueViolation)
            | ServerError::JsonRejection(_)
            | ServerError::QueryRejection(_)
            | ServerError::InvalidAuthorizationHeader(_)
            | ServerError::InvalidAuthToken(_)
            | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::Database(_)
            | ServerError::AuthTokenHash(_)
            | ServerError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The submitted field a 400 should be reported against, if any.
    fn field(&self) -> Option<&'static str> {
        match self {
            ServerError::Validation(err) => Some(err.field()),
            ServerError::Database(DbError::UniqueViolation) => Some("username"),
            _ => None,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        match self {
            ServerError::Unauthenticated { next } => {
                debug!(%next, "Redirecting unauthenticated request to login");
                Redirect::to(&format!("/auth/login/?next={next}")).into_response()
            }
            error => {
                error!(%error, %status, "Replying with error");

                let error_response = ErrorResponse {
                    status: status.as_u16(),
                    message: error.to_string(),
                    field: error.field(),
                };
                (status, Json(error_response)).into_response()
            }
        }
    }
}
