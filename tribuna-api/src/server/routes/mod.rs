use crate::server::{ServerRouter, cache::PageCache};
use axum::Router;
use serde::{Deserialize, Deserializer};

mod auth;
mod feed;
mod groups;
mod posts;
mod profiles;

/// The `?page=` query parameter shared by every paginated listing.
///
/// Values that do not parse as a positive number count as absent, so
/// `?page=abc` and `?page=-1` serve the first page.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default, deserialize_with = "lenient_page_number")]
    pub page: Option<u32>,
}

fn lenient_page_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

pub fn routes(page_cache: &PageCache) -> ServerRouter {
    Router::new()
        .merge(feed::routes(page_cache))
        .merge(groups::routes())
        .merge(posts::routes())
        .merge(profiles::routes())
        .merge(auth::routes())
}
