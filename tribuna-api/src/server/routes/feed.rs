use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    cache::{self, PageCache},
    json::Json,
    query::Query,
    routes::PageQuery,
};
use axum::{extract::State, http::StatusCode, middleware};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tribuna_common::{
    model::post::Post,
    pagination::{Page, PageBounds},
};
use tribuna_db::client::DbClient;

pub fn routes(page_cache: &PageCache) -> ServerRouter {
    // Only the index feed is page-cached; everything registered after the
    // layer call stays uncached.
    ServerRouter::new()
        .typed_get(index)
        .layer(middleware::from_fn_with_state(
            page_cache.clone(),
            cache::serve_cached,
        ))
        .typed_get(follow_index)
        .typed_post(clear_cache)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

async fn index(
    IndexPath(): IndexPath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Page<Post>>> {
    let total = db.count_posts().await?;
    let bounds = PageBounds::new(page, total)?;
    let posts = db.list_posts(bounds).await?;

    Ok(Json(bounds.page(posts)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
struct FollowIndexPath();

async fn follow_index(
    FollowIndexPath(): FollowIndexPath,
    Query(PageQuery { page }): Query<PageQuery>,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Page<Post>>> {
    let total = db.count_followed_posts(user.user_id()).await?;
    let bounds = PageBounds::new(page, total)?;
    let posts = db.list_followed_posts(user.user_id(), bounds).await?;

    Ok(Json(bounds.page(posts)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/internal/clear-cache/", rejection(ServerError))]
struct ClearCachePath();

async fn clear_cache(
    ClearCachePath(): ClearCachePath,
    _user: AuthenticatedUser,
    State(page_cache): State<PageCache>,
) -> StatusCode {
    page_cache.clear();

    StatusCode::NO_CONTENT
}
