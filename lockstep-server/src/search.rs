use axum::{extract::Query, routing::get, Json};
use lockstep_collab::VideoMetadata;
use serde::Deserialize;

use crate::{context::ServerContext, Router};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// GET /v1/search?q=...
///
/// Search never fails from a client's point of view, an upstream problem just
/// produces an empty list.
async fn search(context: ServerContext, Query(query): Query<SearchQuery>) -> Json<SearchResults> {
    let items = context.collab.search.search(&query.q).await;

    Json(SearchResults { items })
}

#[derive(Debug, serde::Serialize)]
struct SearchResults {
    items: Vec<VideoMetadata>,
}

pub fn router() -> Router {
    Router::new().route("/search", get(search))
}
