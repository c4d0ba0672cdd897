use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    auth::Role,
    domain::{BookingPlan, CreatePlanRequest, Slot, UpdatePlanRequest},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    include_inactive: bool,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<BookingPlan>)> {
    user.require(Role::Tutor)?;

    let plan = state.service_context.plan_registry
        .create_plan(user.id(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<BookingPlan>>> {
    user.require(Role::Tutor)?;

    let plans = state.service_context.plan_registry
        .list_plans(user.id(), params.include_inactive)
        .await?;

    Ok(Json(plans))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingPlan>> {
    let plan = state.service_context.plan_registry.get_plan(id).await?;
    Ok(Json(plan))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePlanRequest>,
) -> Result<Json<BookingPlan>> {
    user.require(Role::Tutor)?;

    let plan = state.service_context.plan_registry
        .update_plan(id, user.id(), request)
        .await?;

    Ok(Json(plan))
}

pub async fn deactivate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingPlan>> {
    user.require(Role::Tutor)?;

    let plan = state.service_context.plan_registry
        .deactivate_plan(id, user.id())
        .await?;

    Ok(Json(plan))
}

pub async fn slots(
    State(state): State<AppState>,
    Extension(_user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Slot>>> {
    // 404 for unknown plans rather than an empty list
    state.service_context.plan_registry.get_plan(id).await?;

    let slots = state.service_context.slot_allocator.list_slots(id).await?;
    Ok(Json(slots))
}
