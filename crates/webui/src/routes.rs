// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP routes of the explorer

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::header,
    response::{Html, IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use serde_json::{json, Map, Value as JsonValue};
use tbx_common::{VariableMap, FAILED_VARIABLES_KEY};
use tbx_engine::{decode_blob, to_live, FrameId, FrameView, SessionId, SessionRegistry};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::{
    error::ApiError,
    render::{render_index, render_traceback},
    storage::{DumpKind, DumpStore},
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<DumpStore>,
    pub(crate) sessions: Arc<SessionRegistry>,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(|| async { "OK" }))
        .route("/tb/{tb_id}", get(open_traceback).post(upload_traceback))
        .route("/df/{df_id}", get(download_dataframe).post(upload_dataframe))
        .route("/session/{session_id}", get(session_view))
        .route("/last_session", get(last_session))
        .route("/frame/{frame_id}", get(frame_variables))
        .route("/clear-sessions", get(clear_sessions))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn home(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let tracebacks = state.store.list(DumpKind::Traceback).await?;
    let dataframes = state.store.list(DumpKind::Dataframe).await?;
    let sessions = state.sessions.list();
    Ok(Html(render_index(&sessions, &tracebacks, &dataframes)?))
}

async fn store_upload(
    state: &AppState,
    kind: DumpKind,
    id: &str,
    body: Body,
) -> Result<Json<JsonValue>, ApiError> {
    state.store.save(kind, id, body.into_data_stream()).await?;
    Ok(Json(json!({ "success": true, "message": "File uploaded" })))
}

async fn upload_traceback(
    State(state): State<AppState>,
    Path(tb_id): Path<String>,
    body: Body,
) -> Result<Json<JsonValue>, ApiError> {
    store_upload(&state, DumpKind::Traceback, &tb_id, body).await
}

async fn upload_dataframe(
    State(state): State<AppState>,
    Path(df_id): Path<String>,
    body: Body,
) -> Result<Json<JsonValue>, ApiError> {
    store_upload(&state, DumpKind::Dataframe, &df_id, body).await
}

async fn download_dataframe(
    State(state): State<AppState>,
    Path(df_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = state.store.load(DumpKind::Dataframe, &df_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Load a stored traceback into a new session and redirect to its page
async fn open_traceback(
    State(state): State<AppState>,
    Path(tb_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let blob = state.store.load(DumpKind::Traceback, &tb_id).await?;
    let traceback = tokio::task::spawn_blocking(move || decode_blob(&blob).map(to_live))
        .await
        .map_err(|e| ApiError::Internal(format!("traceback decoding task failed: {e}")))??;
    let traceback = Arc::new(traceback);
    let session_id = state.sessions.register(tb_id, traceback);
    Ok(Redirect::to(&format!("/session/{session_id}")))
}

async fn session_view(
    State(state): State<AppState>,
    Path(session_id): Path<SessionId>,
) -> Result<Html<String>, ApiError> {
    let traceback = state.sessions.lookup(session_id)?;
    Ok(Html(render_traceback(session_id, traceback.as_ref())?))
}

async fn last_session(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let session =
        state.sessions.latest().ok_or_else(|| ApiError::NotFound("no session".to_string()))?;
    Ok(Html(render_traceback(session.id, session.traceback.as_ref())?))
}

fn variables_json(variables: &VariableMap) -> JsonValue {
    let entries: Map<String, JsonValue> = variables
        .iter()
        .filter(|(name, _)| name.as_str() != FAILED_VARIABLES_KEY)
        .map(|(name, value)| {
            (name.clone(), json!({ "type": value.type_name(), "value": value.to_string() }))
        })
        .collect();
    JsonValue::Object(entries)
}

/// Variables of one frame of any open session
async fn frame_variables(
    State(state): State<AppState>,
    Path(frame_id): Path<FrameId>,
) -> Result<Json<JsonValue>, ApiError> {
    let frame = state
        .sessions
        .find_frame(frame_id)
        .ok_or_else(|| ApiError::NotFound(format!("no frame with id {frame_id}")))?;
    debug!("Serving variables of frame {frame_id}");

    Ok(Json(json!({
        "success": true,
        "id": frame.id(),
        "function": frame.function_name(),
        "filename": frame.filename(),
        "lineno": frame.lineno(),
        "locals": variables_json(&frame.locals()),
        "globals": variables_json(&frame.globals()),
        "failed_locals": frame.failed_locals(),
        "failed_globals": frame.failed_globals(),
    })))
}

async fn clear_sessions(State(state): State<AppState>) -> &'static str {
    let cleared = state.sessions.clear();
    info!("Cleared {cleared} sessions on request");
    "cleared"
}
