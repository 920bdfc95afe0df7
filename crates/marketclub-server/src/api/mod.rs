mod communities;
mod events;
mod posts;

use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Community routes
        .route("/api/communities", post(communities::create_community))
        .route("/api/communities", get(communities::list_communities))
        .route("/api/me/communities", get(communities::my_communities))
        .route("/api/communities/{id}", get(communities::get_community))
        .route("/api/communities/{id}", patch(communities::update_community))
        .route("/api/communities/{id}", delete(communities::delete_community))
        .route("/api/communities/{id}/join", post(communities::join_community))
        .route("/api/communities/{id}/leave", post(communities::leave_community))
        .route("/api/communities/{id}/transfer", post(communities::transfer_ownership))
        .route("/api/communities/{id}/members", get(communities::list_members))
        .route(
            "/api/communities/{id}/members/{user_id}",
            patch(communities::update_member_role),
        )
        .route(
            "/api/communities/{id}/members/{user_id}",
            delete(communities::remove_member),
        )
        .route("/api/communities/{id}/requests", get(communities::list_join_requests))
        .route(
            "/api/communities/{id}/requests/{request_id}",
            post(communities::resolve_join_request),
        )
        // Post routes
        .route("/api/communities/{id}/posts", post(posts::create_post))
        .route("/api/communities/{id}/posts", get(posts::list_posts))
        .route("/api/communities/{id}/posts/pending", get(posts::list_pending_posts))
        .route("/api/posts/{id}/approve", post(posts::approve_post))
        .route("/api/posts/{id}/like", post(posts::like_post))
        .route("/api/posts/{id}/like", delete(posts::unlike_post))
        .route("/api/posts/{id}/comments", post(posts::create_comment))
        .route("/api/posts/{id}/comments", get(posts::list_comments))
        .route("/api/posts/{id}/pin", post(posts::toggle_pin))
        .route("/api/posts/{id}", delete(posts::delete_post))
        // Event routes
        .route("/api/events", post(events::create_event))
        .route("/api/events", get(events::list_published_events))
        .route("/api/events/all", get(events::list_all_events))
        .route("/api/events/upcoming", get(events::list_upcoming_events))
        .route("/api/events/past", get(events::list_past_events))
        .route("/api/me/registrations", get(events::my_registrations))
        .route("/api/events/{id}", get(events::get_event))
        .route("/api/events/{id}", patch(events::update_event))
        .route("/api/events/{id}", delete(events::delete_event))
        .route("/api/events/{id}/publish", post(events::publish_event))
        .route("/api/events/{id}/cancel", post(events::cancel_event))
        .route("/api/events/{id}/complete", post(events::complete_event))
        .route("/api/events/{id}/register", post(events::register))
        .route("/api/events/{id}/register", delete(events::cancel_registration))
        .route("/api/events/{id}/participants", get(events::list_participants))
        .route(
            "/api/events/{id}/participants/{user_id}/attendance",
            patch(events::mark_attendance),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
