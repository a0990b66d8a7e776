// Special marine reports

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use spacemarine_core::models::{AchievementGroup, SpaceMarine};

use super::{AppResult, AppState};

pub fn create_special_router() -> Router<AppState> {
    Router::new()
        .route("/api/special/group-by-achievements", get(group_by_achievements))
        .route("/api/special/count-weapon-less-than", get(count_weapon_less_than))
        .route("/api/special/count-health-greater-than", get(count_health_greater_than))
        .route("/api/special/all-marines", get(all_marines))
}

#[derive(Debug, Deserialize)]
pub struct WeaponQuery {
    #[serde(default)]
    pub weapon: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: i64,
}

pub async fn group_by_achievements(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<AchievementGroup>>> {
    Ok(Json(state.marine_service.group_by_achievements().await?))
}

pub async fn count_weapon_less_than(
    State(state): State<AppState>,
    query: Result<Query<WeaponQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    Ok(Json(state.marine_service.count_weapon_less_than(&query.weapon).await?))
}

pub async fn count_health_greater_than(
    State(state): State<AppState>,
    query: Result<Query<ThresholdQuery>, QueryRejection>,
) -> AppResult<Json<i64>> {
    let Query(query) = query?;
    Ok(Json(
        state
            .marine_service
            .count_health_greater_than(query.threshold)
            .await?,
    ))
}

pub async fn all_marines(State(state): State<AppState>) -> AppResult<Json<Vec<SpaceMarine>>> {
    Ok(Json(state.marine_service.all_marines().await?))
}
