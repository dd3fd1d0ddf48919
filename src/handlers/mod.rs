use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::PollError;
use crate::models::{Tallies, TallyQuery, VoteRequest, VoteResponse};
use crate::voting::TallyService;

pub const POLL_API_PATH: &str = "/poll-api";
// Pages built against the PHP endpoint still post here.
pub const LEGACY_POLL_API_PATH: &str = "/poll-api.php";

pub fn router(service: Arc<TallyService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    // Both paths share the same handlers and CORS rules
    Router::new()
        .route(POLL_API_PATH, get(tallies_handler).post(vote_handler))
        .route(LEGACY_POLL_API_PATH, get(tallies_handler).post(vote_handler))
        .layer(cors)
        .with_state(service)
}

async fn tallies_handler(
    State(service): State<Arc<TallyService>>,
    query: Result<Query<TallyQuery>, QueryRejection>,
) -> Result<Json<Tallies>, PollError> {
    // A query string we can't read (e.g. a repeated `poll`) names no poll we
    // could have stored, so it reads as all zeroes like any unknown poll
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            warn!("Unreadable tally query: {}", rejection);
            return Ok(Json(service.default_poll().zero_tallies()));
        }
    };

    // No `poll` parameter means the configured poll, as the PHP endpoint did
    let poll_name = query
        .poll
        .unwrap_or_else(|| service.default_poll().name.clone());

    let tallies = service.get_tallies(&poll_name).await?;
    Ok(Json(tallies))
}

// The body is parsed by hand so malformed JSON gets the same 400 contract as
// missing fields instead of axum's extractor rejections.
async fn vote_handler(
    State(service): State<Arc<TallyService>>,
    body: Bytes,
) -> Result<Json<VoteResponse>, PollError> {
    let request: VoteRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected vote with unreadable body: {}", e);
        PollError::InvalidRequest("Missing poll or option".to_string())
    })?;

    // Only an explicit success reaches the client as `"success": true`
    match service.cast_vote(request).await {
        Ok(votes) => Ok(Json(VoteResponse {
            success: true,
            votes,
        })),
        Err(e) => {
            info!("Vote rejected: {:?}", e);
            Err(e)
        }
    }
}
