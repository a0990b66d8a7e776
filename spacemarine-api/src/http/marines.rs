// Space marine HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use spacemarine_core::models::{MarineInput, MarineListQuery, MarineSort, Page, PageParams, SpaceMarine};

use super::{AppResult, AppState};

pub fn create_marine_router() -> Router<AppState> {
    Router::new()
        .route("/api/space-marines", get(list_marines).post(create_marine))
        .route(
            "/api/space-marines/{id}",
            get(get_marine).put(update_marine).delete(delete_marine),
        )
}

/// Listing query: `?page=0&size=20&sortBy=name,desc&name=...&achievements=...`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMarinesQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub name: Option<String>,
    pub achievements: Option<String>,
}

impl ListMarinesQuery {
    fn into_list_query(self) -> spacemarine_core::Result<MarineListQuery> {
        Ok(MarineListQuery {
            params: PageParams::new(self.page, self.size),
            sort: MarineSort::parse(self.sort_by.as_deref())?,
            name: self.name,
            achievements: self.achievements,
        })
    }
}

pub async fn list_marines(
    State(state): State<AppState>,
    query: Result<Query<ListMarinesQuery>, QueryRejection>,
) -> AppResult<Json<Page<SpaceMarine>>> {
    let Query(query) = query?;
    let query = query.into_list_query()?;
    Ok(Json(state.marine_service.list(&query).await?))
}

pub async fn get_marine(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<SpaceMarine>> {
    Ok(Json(state.marine_service.get(id).await?))
}

pub async fn create_marine(
    State(state): State<AppState>,
    payload: Result<Json<MarineInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SpaceMarine>)> {
    let Json(input) = payload?;
    let marine = state.marine_service.create(&input).await?;
    Ok((StatusCode::CREATED, Json(marine)))
}

pub async fn update_marine(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<MarineInput>, JsonRejection>,
) -> AppResult<Json<SpaceMarine>> {
    let Json(input) = payload?;
    Ok(Json(state.marine_service.update(id, &input).await?))
}

pub async fn delete_marine(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.marine_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
