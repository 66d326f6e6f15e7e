use crate::server::{Result, ServerError, ServerRouter, json::Json, query::Query, routes::PageQuery};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tribuna_common::{
    model::{group::{Group, Slug}, post::Post},
    pagination::{Page, PageBounds},
};
use tribuna_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
struct GroupPath {
    slug: Slug,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct GroupFeed {
    group: Group,
    page: Page<Post>,
}

async fn group_posts(
    GroupPath { slug }: GroupPath,
    Query(PageQuery { page }): Query<PageQuery>,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<GroupFeed>> {
    let group = db
        .fetch_group_by_slug(&slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    let total = db.count_group_posts(group.id).await?;
    let bounds = PageBounds::new(page, total)?;
    let posts = db.list_group_posts(group.id, bounds).await?;

    Ok(Json(GroupFeed {
        group,
        page: bounds.page(posts),
    }))
}
