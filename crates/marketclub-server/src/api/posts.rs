use crate::auth::{AuthUser, OptionalAuthUser};
use crate::error::{AppError, Result};
use crate::models::{
    CommentThread, CommunityPost, CreateComment, CreatePost, LikeResponse, Paginated, Pagination,
    PostComment, PostView,
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

pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(community_id): Path<Uuid>,
    Json(input): Json<CreatePost>,
) -> Result<(StatusCode, Json<CommunityPost>)> {
    input.validate().map_err(AppError::from)?;
    let post = state.post_service.create(&auth, community_id, input).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    OptionalAuthUser(viewer): OptionalAuthUser,
    Path(community_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<PostView>>> {
    let posts = state
        .post_service
        .list(viewer.as_ref(), community_id, &pagination)
        .await?;
    Ok(Json(posts))
}

pub async fn list_pending_posts(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(community_id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CommunityPost>>> {
    let posts = state
        .post_service
        .list_pending(&auth, community_id, &pagination)
        .await?;
    Ok(Json(posts))
}

pub async fn approve_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CommunityPost>> {
    let post = state.post_service.approve(&auth, id).await?;
    Ok(Json(post))
}

pub async fn like_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>> {
    let response = state.post_service.like(&auth, id).await?;
    Ok(Json(response))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LikeResponse>> {
    let response = state.post_service.unlike(&auth, id).await?;
    Ok(Json(response))
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateComment>,
) -> Result<(StatusCode, Json<PostComment>)> {
    input.validate().map_err(AppError::from)?;
    let comment = state.post_service.comment(&auth, id, input).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Paginated<CommentThread>>> {
    let comments = state.post_service.list_comments(id, &pagination).await?;
    Ok(Json(comments))
}

pub async fn toggle_pin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CommunityPost>> {
    let post = state.post_service.toggle_pin(&auth, id).await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    state.post_service.delete(&auth, id).await?;
    Ok(Json(json!({ "success": true })))
}
