use crate::auth::{AuthUser, OptionalAuthUser};
use crate::error::{AppError, Result};
use crate::models::{
    CompleteEvent, CreateEvent, Event, EventDetail, EventRegistration, EventSummary,
    MarkAttendance, MyRegistration, UpdateEvent,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

pub async fn create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateEvent>,
) -> Result<(StatusCode, Json<Event>)> {
    input.validate().map_err(AppError::from)?;
    let event = state.event_service.create(&auth, input).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateEvent>,
) -> Result<Json<Event>> {
    input.validate().map_err(AppError::from)?;
    let event = state.event_service.update(&auth, id, input).await?;
    Ok(Json(event))
}

pub async fn delete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    state.event_service.delete(&auth, id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn publish_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Event>> {
    let event = state.event_service.publish(&auth, id).await?;
    Ok(Json(event))
}

pub async fn cancel_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Event>> {
    let event = state.event_service.cancel(&auth, id).await?;
    Ok(Json(event))
}

pub async fn complete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    input: Option<Json<CompleteEvent>>,
) -> Result<Json<Event>> {
    let replay_url = input.and_then(|Json(input)| input.replay_url);
    let event = state.event_service.complete(&auth, id, replay_url).await?;
    Ok(Json(event))
}

pub async fn list_all_events(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<EventSummary>>> {
    let events = state.event_service.list_all(&auth).await?;
    Ok(Json(events))
}

pub async fn list_published_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventSummary>>> {
    let events = state.event_service.list_published().await?;
    Ok(Json(events))
}

pub async fn list_upcoming_events(
    State(state): State<AppState>,
) -> Result<Json<Vec<EventSummary>>> {
    let events = state.event_service.list_upcoming().await?;
    Ok(Json(events))
}

pub async fn list_past_events(State(state): State<AppState>) -> Result<Json<Vec<EventSummary>>> {
    let events = state.event_service.list_past().await?;
    Ok(Json(events))
}

pub async fn get_event(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EventDetail>> {
    let detail = state.event_service.get_detail(viewer.as_ref(), id).await?;
    Ok(Json(detail))
}

pub async fn register(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EventRegistration>)> {
    let registration = state.event_service.register(&auth, id).await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    state.event_service.cancel_registration(&auth, id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn my_registrations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<MyRegistration>>> {
    let registrations = state.event_service.my_registrations(&auth).await?;
    Ok(Json(registrations))
}

pub async fn list_participants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EventRegistration>>> {
    let participants = state.event_service.participants(&auth, id).await?;
    Ok(Json(participants))
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<MarkAttendance>,
) -> Result<Json<EventRegistration>> {
    let registration = state
        .event_service
        .mark_attendance(&auth, id, user_id, input.attended)
        .await?;
    Ok(Json(registration))
}
