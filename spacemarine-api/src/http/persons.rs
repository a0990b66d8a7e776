// Person HTTP handlers

use std::str::FromStr;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use spacemarine_core::models::{Color, PageParams, Person, PersonInput, PersonListQuery};

use super::{AppError, AppResult, AppState};

pub fn create_person_router() -> Router<AppState> {
    Router::new()
        .route("/api/persons", get(list_persons).post(create_person))
        .route(
            "/api/persons/{id}",
            get(get_person).put(update_person).delete(delete_person),
        )
        .route("/api/persons/countByBirthday", get(count_by_birthday))
        .route(
            "/api/persons/deleteByBirthday",
            axum::routing::delete(delete_by_birthday),
        )
        .route("/api/persons/countHeightLessThan", get(count_height_less_than))
        .route("/api/persons/countByHairColor", get(count_by_hair_color))
        .route("/api/persons/countByEyeColor", get(count_by_eye_color))
}

/// Listing query: `?page=0&size=20&sort=name&asc=true&filterColumn=...&filterValue=...`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPersonsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    pub asc: Option<bool>,
    pub filter_column: Option<String>,
    pub filter_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BirthdayQuery {
    #[serde(default)]
    pub birthday: String,
}

#[derive(Debug, Deserialize)]
pub struct HeightQuery {
    pub height: f32,
}

#[derive(Debug, Deserialize)]
pub struct ColorQuery {
    #[serde(default)]
    pub color: String,
}

/// Parse an RFC 3339 timestamp from a query string. An unencoded `+` in the
/// offset arrives as a space.
fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    let normalized = raw.trim().replace(' ', "+");
    DateTime::parse_from_rfc3339(&normalized)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::bad_request(format!("Invalid timestamp '{raw}': {e}")))
}

/// Lists persons; `X-Total-Count` carries the unfiltered total
pub async fn list_persons(
    State(state): State<AppState>,
    query: Result<Query<ListPersonsQuery>, QueryRejection>,
) -> AppResult<impl IntoResponse> {
    let Query(query) = query?;
    let list_query = PersonListQuery::new(
        PageParams::new(query.page, query.size),
        query.sort.as_deref(),
        query.asc.unwrap_or(true),
        query.filter_column.as_deref(),
        query.filter_value,
    )?;

    let (persons, total) = state.person_service.list(&list_query).await?;
    Ok(([("x-total-count", total.to_string())], Json(persons)))
}

pub async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Person>> {
    Ok(Json(state.person_service.get(id).await?))
}

pub async fn create_person(
    State(state): State<AppState>,
    payload: Result<Json<PersonInput>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let person = state.person_service.create(&input).await?;
    let location = format!("/api/persons/{}", person.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(person)))
}

pub async fn update_person(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<PersonInput>, JsonRejection>,
) -> AppResult<Json<Person>> {
    let Json(input) = payload?;
    Ok(Json(state.person_service.update(id, &input).await?))
}

pub async fn delete_person(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.person_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn count_by_birthday(
    State(state): State<AppState>,
    query: Result<Query<BirthdayQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    let birthday = parse_timestamp(&query.birthday)?;
    Ok(Json(state.person_service.count_by_birthday(birthday).await?))
}

/// Responds with the number of persons removed
pub async fn delete_by_birthday(
    State(state): State<AppState>,
    query: Result<Query<BirthdayQuery>, QueryRejection>,
) -> AppResult<Json<u64>> {
    let Query(query) = query?;
    let birthday = parse_timestamp(&query.birthday)?;
    Ok(Json(state.person_service.delete_by_birthday(birthday).await?))
}

pub async fn count_height_less_than(
    State(state): State<AppState>,
    query: Result<Query<HeightQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    Ok(Json(state.person_service.count_height_less_than(query.height).await?))
}

pub async fn count_by_hair_color(
    State(state): State<AppState>,
    query: Result<Query<ColorQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    let color = Color::from_str(query.color.trim())?;
    Ok(Json(state.person_service.count_by_hair_color(color).await?))
}

pub async fn count_by_eye_color(
    State(state): State<AppState>,
    query: Result<Query<ColorQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    let color = Color::from_str(query.color.trim())?;
    Ok(Json(state.person_service.count_by_eye_color(color).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_restores_plus_offset() {
        let ts = parse_timestamp("1990-05-01T03:00:00 03:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "1990-05-01T00:00:00+00:00");

        let ts = parse_timestamp("1990-05-01T00:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "1990-05-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(parse_timestamp("").is_err());
    }
}
