//! HTTP handlers for entry operations.
//! Thin adapters: authentication and parameter parsing happen here, every
//! rule lives in the ingest and retrieval services.

use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::{
    errors::AppError,
    handlers::auth::{AuthUser, MaybeToken},
    models::Entry,
    services::{ingest_service::CreateEntry, retrieval_service::DEFAULT_PAGE_SIZE},
    state::AppState,
};

/// Query params accepted by the listing endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub parent_id: Option<String>,
    pub page: Option<String>,
}

/// Query params accepted by the content endpoint.
#[derive(Debug, Deserialize)]
pub struct DataQuery {
    pub size: Option<String>,
}

/// `POST /files`: create a folder, file or image.
pub async fn post_upload(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateEntry>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let entry = state.ingest.create(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `GET /files/{id}`: metadata of one of the caller's entries.
pub async fn get_show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Entry>, AppError> {
    Ok(Json(state.retrieval.get(user.user_id, &id).await?))
}

/// `GET /files?parentId=&page=`: one page of the caller's entries.
pub async fn get_index(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Entry>>, AppError> {
    let page = q
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let entries = state
        .retrieval
        .list(user.user_id, q.parent_id.as_deref(), page, DEFAULT_PAGE_SIZE)
        .await?;
    Ok(Json(entries))
}

/// `PUT /files/{id}/publish`
pub async fn put_publish(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Entry>, AppError> {
    Ok(Json(state.retrieval.set_visibility(user.user_id, &id, true).await?))
}

/// `PUT /files/{id}/unpublish`
pub async fn put_unpublish(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Entry>, AppError> {
    Ok(Json(state.retrieval.set_visibility(user.user_id, &id, false).await?))
}

/// `GET /files/{id}/data?size=`: raw content, canonical or a derived width.
pub async fn get_file(
    State(state): State<AppState>,
    MaybeToken(token): MaybeToken,
    Path(id): Path<String>,
    Query(q): Query<DataQuery>,
) -> Result<Response, AppError> {
    // Unparsable sizes become 0, which the width check rejects after access control.
    let width = q.size.map(|s| s.trim().parse::<u32>().unwrap_or(0));
    let content = state.retrieval.fetch(token.as_deref(), &id, width).await?;

    let mut response = Response::new(Body::from(content.bytes));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    Ok(response)
}
