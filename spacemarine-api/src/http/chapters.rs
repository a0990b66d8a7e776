// Chapter HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use spacemarine_core::models::{Chapter, ChapterInput};

use super::{AppResult, AppState};

pub fn create_chapter_router() -> Router<AppState> {
    Router::new()
        .route("/api/chapters", get(list_chapters).post(create_chapter))
        .route(
            "/api/chapters/{id}",
            get(get_chapter).put(update_chapter).delete(delete_chapter),
        )
        .route("/api/chapters/create-via-db", post(create_via_db))
        .route("/api/chapters/dissolve-via-db/{id}", delete(dissolve_via_db))
}

/// Query of `POST /api/chapters/create-via-db`
#[derive(Debug, Deserialize)]
pub struct CreateViaDbQuery {
    pub name: String,
    pub count: i64,
}

pub async fn list_chapters(State(state): State<AppState>) -> AppResult<Json<Vec<Chapter>>> {
    Ok(Json(state.chapter_service.list_all().await?))
}

pub async fn get_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Chapter>> {
    Ok(Json(state.chapter_service.get(id).await?))
}

pub async fn create_chapter(
    State(state): State<AppState>,
    payload: Result<Json<ChapterInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Chapter>)> {
    let Json(input) = payload?;
    let chapter = state.chapter_service.create(&input).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn update_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<ChapterInput>, JsonRejection>,
) -> AppResult<Json<Chapter>> {
    let Json(input) = payload?;
    Ok(Json(state.chapter_service.update(id, &input).await?))
}

pub async fn delete_chapter(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.chapter_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create through the database routine; responds with the new id
pub async fn create_via_db(
    State(state): State<AppState>,
    query: Result<Query<CreateViaDbQuery>, QueryRejection>,
) -> AppResult<(StatusCode, Json<i64>)> {
    let Query(query) = query?;
    let id = state.chapter_service.create_via_db(&query.name, query.count).await?;
    Ok((StatusCode::CREATED, Json(id)))
}

pub async fn dissolve_via_db(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.chapter_service.dissolve_via_db(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
