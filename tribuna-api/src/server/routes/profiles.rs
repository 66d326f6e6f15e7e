use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{AuthenticatedUser, MaybeUser},
    json::Json,
    query::Query,
    routes::PageQuery,
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tribuna_common::{
    model::{
        post::Post,
        user::{User, Username},
    },
    pagination::{Page, PageBounds},
};
use tribuna_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(profile)
        .typed_get(profile_follow)
        .typed_get(profile_unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
struct ProfilePath {
    username: Username,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ProfileFeed {
    author: User,
    /// Whether the viewer already follows this author. Always false for
    /// anonymous viewers.
    following: bool,
    page: Page<Post>,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    Query(PageQuery { page }): Query<PageQuery>,
    MaybeUser(viewer): MaybeUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<ProfileFeed>> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))?;

    let following = match viewer {
        Some(viewer) => db.is_following(viewer.user_id(), author.id).await?,
        None => false,
    };

    let total = db.count_author_posts(author.id).await?;
    let bounds = PageBounds::new(page, total)?;
    let posts = db.list_author_posts(author.id, bounds).await?;

    Ok(Json(ProfileFeed {
        author,
        following,
        page: bounds.page(posts),
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
struct ProfileFollowPath {
    username: Username,
}

async fn profile_follow(
    ProfileFollowPath { username }: ProfileFollowPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Redirect> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or_else(|| ServerError::UserByUsernameNotFound(username.clone()))?;

    db.follow(user.user_id(), author.id).await?;

    Ok(Redirect::to(&format!("/profile/{username}/")))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
struct ProfileUnfollowPath {
    username: Username,
}

async fn profile_unfollow(
    ProfileUnfollowPath { username }: ProfileUnfollowPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Redirect> {
    let author = db
        .fetch_user_by_username(&username)
        .await?
        .ok_or_else(|| ServerError::UserByUsernameNotFound(username.clone()))?;

    let removed = db.unfollow(user.user_id(), author.id).await?;
    if !removed {
        return Err(ServerError::NotFollowing(username));
    }

    Ok(Redirect::to(&format!("/profile/{username}/")))
}
