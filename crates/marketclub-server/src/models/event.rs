use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Event lifecycle state. CANCELLED and COMPLETED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Draft,
    Published,
    Cancelled,
    Completed,
}

/// A webinar or in-person event with capacity-constrained registration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: EventStatus,
    pub event_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: String,
    pub is_online: bool,
    pub platform: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_password: Option<String>,
    pub physical_location: Option<String>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub max_participants: Option<i64>,
    pub replay_url: Option<String>,
    pub image_url: Option<String>,
    pub is_free: bool,
    pub price: Option<f64>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration rows are soft-deleted on cancellation so attendance history
/// survives re-registration.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventRegistration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub attended: bool,
    pub cancelled: bool,
    pub registered_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEvent {
    #[validate(length(min = 3, max = 160))]
    pub title: String,
    #[validate(length(min = 1, max = 10000))]
    pub description: String,
    pub event_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub is_online: Option<bool>,
    pub platform: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_password: Option<String>,
    pub physical_location: Option<String>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_participants: Option<i64>,
    pub image_url: Option<String>,
    pub is_free: Option<bool>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEvent {
    #[validate(length(min = 3, max = 160))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub description: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub is_online: Option<bool>,
    pub platform: Option<String>,
    pub meeting_url: Option<String>,
    pub meeting_id: Option<String>,
    pub meeting_password: Option<String>,
    pub physical_location: Option<String>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub max_participants: Option<i64>,
    pub image_url: Option<String>,
    pub is_free: Option<bool>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteEvent {
    pub replay_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkAttendance {
    pub attended: bool,
}

/// Event detail with meeting credentials masked for non-registrants.
#[derive(Debug, Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub registrations_count: i64,
    pub is_registered: bool,
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub registrations_count: i64,
}

/// One row of a user's registration history, flattened with its event.
#[derive(Debug, Serialize, FromRow)]
pub struct MyRegistration {
    pub event_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub attended: bool,
    pub title: String,
    pub status: EventStatus,
    pub event_date: DateTime<Utc>,
    pub is_online: bool,
}
