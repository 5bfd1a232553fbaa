use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::clients::{NewPlaylist, save_playlist};
use crate::config::MAX_TOP_N;
use crate::pipeline::{FailureKind, JobContext};

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateRequest {
    query: String,
    #[serde(default)]
    top_n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    uris: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    playlist_id: String,
    tracks_added: usize,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<Uuid>,
}

fn bad_request(message: impl Into<String>) -> Response {
    let body = Json(ErrorResponse {
        error: message.into(),
        kind: None,
        job_id: None,
    });
    (StatusCode::BAD_REQUEST, body).into_response()
}

pub(crate) async fn generate(
    State(state): State<AppState>,
    Json(payload): Json<GenerateRequest>,
) -> Response {
    let query = payload.query.trim();
    if query.is_empty() {
        return bad_request("query must not be empty");
    }
    let top_n = payload.top_n.unwrap_or_else(|| state.config().rank_top_n());
    if !(1..=MAX_TOP_N).contains(&top_n) {
        return bad_request(format!("top_n must be between 1 and {MAX_TOP_N}"));
    }

    let job = JobContext::new(query, top_n);
    match state.pipeline().execute(&job).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => {
            let kind = error.kind();
            let status = StatusCode::from_u16(kind.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = Json(ErrorResponse {
                error: kind.user_message().to_string(),
                kind: Some(kind),
                job_id: Some(job.job_id),
            });
            (status, body).into_response()
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub(crate) async fn save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SaveRequest>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        let body = Json(ErrorResponse {
            error: "a user bearer token is required".into(),
            kind: None,
            job_id: None,
        });
        return (StatusCode::UNAUTHORIZED, body).into_response();
    };
    if payload.uris.is_empty() {
        return bad_request("uris must not be empty");
    }

    let name = payload
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| state.config().playlist_default_name().to_string());
    let playlist = NewPlaylist {
        name,
        description: payload.description,
        public: false,
        collaborative: false,
    };

    match save_playlist(state.playlists(), token, &playlist, &payload.uris).await {
        Ok(saved) => {
            state.telemetry().metrics().playlists_saved.inc();
            info!(playlist_id = %saved.playlist_id, tracks = saved.tracks_added, "playlist saved via API");
            let body = Json(SaveResponse {
                playlist_id: saved.playlist_id,
                tracks_added: saved.tracks_added,
            });
            (StatusCode::CREATED, body).into_response()
        }
        Err(error) => {
            warn!(error = %error, "saving playlist failed");
            let status = if error.is_unauthorized() {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::BAD_GATEWAY
            };
            let body = Json(ErrorResponse {
                error: format!("could not save playlist: {error}"),
                kind: None,
                job_id: None,
            });
            (status, body).into_response()
        }
    }
}
