use crate::auth::{AuthUser, OptionalAuthUser};
use crate::error::{AppError, Result};
use crate::models::{
    Community, CommunityDetail, CommunityMember, CommunitySummary, CreateCommunity,
    DeleteCommunity, JoinCommunity, JoinRequest, JoinRequestStatus, JoinResponse, Paginated,
    Pagination, ResolveJoinRequest, TransferOwnership, UpdateCommunity, UpdateMemberRole,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;
use validator::Validate;

pub async fn create_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(input): Json<CreateCommunity>,
) -> Result<(StatusCode, Json<Community>)> {
    input.validate().map_err(AppError::from)?;
    let community = state.community_service.create(&auth, input).await?;
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn list_communities(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CommunitySummary>>> {
    let communities = state
        .community_service
        .list(viewer.as_ref(), &pagination)
        .await?;
    Ok(Json(communities))
}

pub async fn my_communities(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CommunitySummary>>> {
    let communities = state
        .community_service
        .my_communities(&auth, &pagination)
        .await?;
    Ok(Json(communities))
}

pub async fn get_community(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(id_or_slug): Path<String>,
) -> Result<Json<CommunityDetail>> {
    let detail = state
        .community_service
        .get(viewer.as_ref(), &id_or_slug)
        .await?;
    Ok(Json(detail))
}

pub async fn update_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCommunity>,
) -> Result<Json<Community>> {
    input.validate().map_err(AppError::from)?;
    let community = state.community_service.update(&auth, id, input).await?;
    Ok(Json(community))
}

pub async fn delete_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<DeleteCommunity>,
) -> Result<Json<Value>> {
    state.community_service.delete(&auth, id, &input.name).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn join_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    input: Option<Json<JoinCommunity>>,
) -> Result<Json<JoinResponse>> {
    let message = match input {
        Some(Json(input)) => {
            input.validate().map_err(AppError::from)?;
            input.message
        }
        None => None,
    };

    let status = state.community_service.join(&auth, id, message).await?;
    Ok(Json(JoinResponse { status }))
}

pub async fn leave_community(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    state.community_service.leave(&auth, id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CommunityMember>>> {
    let members = state
        .community_service
        .list_members(&auth, id, &pagination)
        .await?;
    Ok(Json(members))
}

pub async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateMemberRole>,
) -> Result<Json<CommunityMember>> {
    let member = state
        .community_service
        .update_member_role(&auth, id, user_id, input.role)
        .await?;
    Ok(Json(member))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>> {
    state.community_service.remove_member(&auth, id, user_id).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_join_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<JoinRequest>>> {
    let requests = state
        .community_service
        .list_join_requests(&auth, id, &pagination)
        .await?;
    Ok(Json(requests))
}

pub async fn resolve_join_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, request_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<ResolveJoinRequest>,
) -> Result<Json<Value>> {
    let status = state
        .community_service
        .resolve_join_request(&auth, id, request_id, input.action, input.reject_reason)
        .await?;

    let status = match status {
        JoinRequestStatus::Approved => "approved",
        JoinRequestStatus::Rejected => "rejected",
        JoinRequestStatus::Pending => "pending",
    };
    Ok(Json(json!({ "status": status })))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<TransferOwnership>,
) -> Result<Json<Value>> {
    state
        .community_service
        .transfer_ownership(&auth, id, input.new_owner_id)
        .await?;
    Ok(Json(json!({ "success": true })))
}
