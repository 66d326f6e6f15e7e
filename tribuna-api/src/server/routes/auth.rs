use crate::server::{Result, ServerError, ServerRouter, json::Json, query::Query};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, UtcDateTime};
use tribuna_common::model::{
    Id, ModelValidationError,
    auth::{self, AuthToken, Authentication, PositiveDuration},
    user::{User, UserMarker, Username},
};
use tribuna_db::client::DbClient;

const SESSION_LIFETIME: Duration = Duration::days(30);

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_get(login_form)
        .typed_post(login)
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct TokenResponse {
    token: String,
    user: User,
}

async fn issue_session(db: &DbClient, user: User) -> Result<TokenResponse> {
    let token = AuthToken::generate_random(user.id);
    let token_hash = token.hash()?;

    db.create_session(&Authentication {
        user: user.id,
        token_hash,
        created_at: UtcDateTime::now(),
        expires_after: PositiveDuration::new(SESSION_LIFETIME),
    })
    .await?;

    Ok(TokenResponse {
        token: token.as_token_str(),
        user,
    })
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
struct SignupPath();

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct SignupForm {
    username: String,
    password: String,
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<SignupForm>,
) -> Result<Json<TokenResponse>> {
    let username = Username::new(form.username).map_err(ModelValidationError::from)?;
    let password_hash = auth::hash_password(&form.password)?;

    let id: Id<UserMarker> = db.create_user(&username, &password_hash).await?;

    Ok(Json(issue_session(&db, User { id, username }).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
struct LoginPath();

/// Where unauthenticated requests to auth-required routes get redirected.
/// Echoes the `next` parameter so a client can resume after logging in.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
struct LoginForwarding {
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

async fn login_form(
    LoginPath(): LoginPath,
    Query(forwarding): Query<LoginForwarding>,
) -> Json<LoginForwarding> {
    Json(forwarding)
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    Json(form): Json<LoginForm>,
) -> Result<Json<TokenResponse>> {
    let username = Username::new(form.username).map_err(|_| ServerError::WrongCredentials)?;

    let credentials = db
        .fetch_credentials(&username)
        .await?
        .ok_or(ServerError::WrongCredentials)?;

    if !auth::verify_password(&form.password, &credentials.password_hash)? {
        return Err(ServerError::WrongCredentials);
    }

    Ok(Json(issue_session(&db, credentials.user).await?))
}
