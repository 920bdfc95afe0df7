use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    CreateEvent, Event, EventDetail, EventRegistration, EventStatus, EventSummary, MyRegistration,
    UpdateEvent,
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const EVENT_COLS: &str = "id, title, description, status, event_date, end_date, timezone, \
     is_online, platform, meeting_url, meeting_id, meeting_password, physical_location, \
     registration_deadline, max_participants, replay_url, image_url, is_free, price, \
     created_by, created_at, updated_at";

const REGISTRATION_COLS: &str =
    "id, event_id, user_id, attended, cancelled, registered_at, cancelled_at";

#[derive(Clone)]
pub struct EventService {
    db: SqlitePool,
}

impl EventService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn require_events_admin(principal: &AuthUser) -> Result<()> {
        if !principal.is_platform_admin() {
            return Err(AppError::Forbidden(
                "Not authorized to manage events".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Event> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLS} FROM events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        Ok(event)
    }

    async fn active_registration_count(&self, event_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ? AND cancelled = 0",
        )
        .bind(event_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    // Event CRUD

    pub async fn create(&self, principal: &AuthUser, input: CreateEvent) -> Result<Event> {
        Self::require_events_admin(principal)?;

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            status: EventStatus::Draft,
            event_date: input.event_date,
            end_date: input.end_date,
            timezone: input.timezone.unwrap_or_else(|| "GMT".to_string()),
            is_online: input.is_online.unwrap_or(true),
            platform: input.platform,
            meeting_url: input.meeting_url,
            meeting_id: input.meeting_id,
            meeting_password: input.meeting_password,
            physical_location: input.physical_location,
            registration_deadline: input.registration_deadline,
            max_participants: input.max_participants,
            replay_url: None,
            image_url: input.image_url,
            is_free: input.is_free.unwrap_or(true),
            price: input.price,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO events (id, title, description, status, event_date, end_date, timezone, \
             is_online, platform, meeting_url, meeting_id, meeting_password, physical_location, \
             registration_deadline, max_participants, replay_url, image_url, is_free, price, \
             created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.status)
        .bind(event.event_date)
        .bind(event.end_date)
        .bind(&event.timezone)
        .bind(event.is_online)
        .bind(&event.platform)
        .bind(&event.meeting_url)
        .bind(&event.meeting_id)
        .bind(&event.meeting_password)
        .bind(&event.physical_location)
        .bind(event.registration_deadline)
        .bind(event.max_participants)
        .bind(&event.replay_url)
        .bind(&event.image_url)
        .bind(event.is_free)
        .bind(event.price)
        .bind(event.created_by)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.db)
        .await?;

        tracing::info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Field-wise update. Status never moves here; lifecycle transitions go
    /// through publish/cancel/complete.
    pub async fn update(&self, principal: &AuthUser, id: Uuid, input: UpdateEvent) -> Result<Event> {
        Self::require_events_admin(principal)?;

        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events \
             SET title = COALESCE(?, title), \
                 description = COALESCE(?, description), \
                 event_date = COALESCE(?, event_date), \
                 end_date = COALESCE(?, end_date), \
                 timezone = COALESCE(?, timezone), \
                 is_online = COALESCE(?, is_online), \
                 platform = COALESCE(?, platform), \
                 meeting_url = COALESCE(?, meeting_url), \
                 meeting_id = COALESCE(?, meeting_id), \
                 meeting_password = COALESCE(?, meeting_password), \
                 physical_location = COALESCE(?, physical_location), \
                 registration_deadline = COALESCE(?, registration_deadline), \
                 max_participants = COALESCE(?, max_participants), \
                 image_url = COALESCE(?, image_url), \
                 is_free = COALESCE(?, is_free), \
                 price = COALESCE(?, price), \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING {EVENT_COLS}"
        ))
        .bind(input.title)
        .bind(input.description)
        .bind(input.event_date)
        .bind(input.end_date)
        .bind(input.timezone)
        .bind(input.is_online)
        .bind(input.platform)
        .bind(input.meeting_url)
        .bind(input.meeting_id)
        .bind(input.meeting_password)
        .bind(input.physical_location)
        .bind(input.registration_deadline)
        .bind(input.max_participants)
        .bind(input.image_url)
        .bind(input.is_free)
        .bind(input.price)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        Ok(event)
    }

    pub async fn delete(&self, principal: &AuthUser, id: Uuid) -> Result<()> {
        Self::require_events_admin(principal)?;

        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Event not found".to_string()));
        }

        tracing::info!(event_id = %id, "Event deleted");
        Ok(())
    }

    // Lifecycle transitions. Each is a conditional update keyed on the current
    // status so a stale caller gets Conflict, never a silent overwrite.

    pub async fn publish(&self, principal: &AuthUser, id: Uuid) -> Result<Event> {
        Self::require_events_admin(principal)?;
        self.transition(id, EventStatus::Draft, EventStatus::Published, None)
            .await
    }

    pub async fn cancel(&self, principal: &AuthUser, id: Uuid) -> Result<Event> {
        Self::require_events_admin(principal)?;

        let event = self.get_by_id(id).await?;
        let concluded_at = event.end_date.unwrap_or(event.event_date);
        if event.status == EventStatus::Published && Utc::now() >= concluded_at {
            return Err(AppError::Conflict(
                "Event has already concluded and can no longer be cancelled".to_string(),
            ));
        }

        // Registrations are kept for audit and history.
        self.transition(id, EventStatus::Published, EventStatus::Cancelled, None)
            .await
    }

    pub async fn complete(
        &self,
        principal: &AuthUser,
        id: Uuid,
        replay_url: Option<String>,
    ) -> Result<Event> {
        Self::require_events_admin(principal)?;
        self.transition(id, EventStatus::Published, EventStatus::Completed, replay_url)
            .await
    }

    async fn transition(
        &self,
        id: Uuid,
        from: EventStatus,
        to: EventStatus,
        replay_url: Option<String>,
    ) -> Result<Event> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "UPDATE events SET status = ?, replay_url = COALESCE(?, replay_url), updated_at = ? \
             WHERE id = ? AND status = ? \
             RETURNING {EVENT_COLS}"
        ))
        .bind(to)
        .bind(replay_url)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .fetch_optional(&self.db)
        .await?;

        match event {
            Some(event) => {
                tracing::info!(event_id = %id, status = ?to, "Event transitioned");
                Ok(event)
            }
            None => {
                // Distinguish a missing event from an invalid transition.
                let current = self.get_by_id(id).await?;
                Err(AppError::Conflict(format!(
                    "Cannot transition event from {:?} state",
                    current.status
                )))
            }
        }
    }

    // Registration

    /// Capacity check and insert are a single conditional statement, so two
    /// concurrent registrations can never both take the last slot.
    pub async fn register(&self, principal: &AuthUser, event_id: Uuid) -> Result<EventRegistration> {
        let event = self.get_by_id(event_id).await?;
        let now = Utc::now();

        if event.status != EventStatus::Published {
            return Err(AppError::Forbidden(
                "Event is not open for registration".to_string(),
            ));
        }

        if let Some(deadline) = event.registration_deadline {
            if now >= deadline {
                return Err(AppError::Forbidden(
                    "Registration deadline has passed".to_string(),
                ));
            }
        }

        if now >= event.event_date {
            return Err(AppError::Forbidden(
                "Event has already started".to_string(),
            ));
        }

        let existing = sqlx::query_as::<_, EventRegistration>(&format!(
            "SELECT {REGISTRATION_COLS} FROM event_registrations \
             WHERE event_id = ? AND user_id = ?"
        ))
        .bind(event_id)
        .bind(principal.user_id)
        .fetch_optional(&self.db)
        .await?;

        let rows_affected = match &existing {
            Some(registration) if !registration.cancelled => {
                return Err(AppError::Conflict(
                    "You are already registered for this event".to_string(),
                ));
            }
            Some(_) => {
                // Reactivate the cancelled row, still under the capacity guard.
                sqlx::query(
                    "UPDATE event_registrations SET cancelled = 0, cancelled_at = NULL \
                     WHERE event_id = ?1 AND user_id = ?2 AND cancelled = 1 \
                       AND ((SELECT max_participants FROM events WHERE id = ?1) IS NULL \
                            OR (SELECT COUNT(*) FROM event_registrations \
                                WHERE event_id = ?1 AND cancelled = 0) \
                               < (SELECT max_participants FROM events WHERE id = ?1))",
                )
                .bind(event_id)
                .bind(principal.user_id)
                .execute(&self.db)
                .await?
                .rows_affected()
            }
            None => {
                sqlx::query(
                    "INSERT INTO event_registrations \
                     (id, event_id, user_id, attended, cancelled, registered_at) \
                     SELECT ?1, ?2, ?3, 0, 0, ?4 \
                     WHERE (SELECT max_participants FROM events WHERE id = ?2) IS NULL \
                        OR (SELECT COUNT(*) FROM event_registrations \
                            WHERE event_id = ?2 AND cancelled = 0) \
                           < (SELECT max_participants FROM events WHERE id = ?2)",
                )
                .bind(Uuid::new_v4())
                .bind(event_id)
                .bind(principal.user_id)
                .bind(now)
                .execute(&self.db)
                .await?
                .rows_affected()
            }
        };

        if rows_affected == 0 {
            return Err(AppError::Conflict(
                "Event has reached its maximum number of participants".to_string(),
            ));
        }

        let registration = sqlx::query_as::<_, EventRegistration>(&format!(
            "SELECT {REGISTRATION_COLS} FROM event_registrations \
             WHERE event_id = ? AND user_id = ?"
        ))
        .bind(event_id)
        .bind(principal.user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(registration)
    }

    /// Soft delete: the row survives for attendance history and the slot is
    /// freed for the next registrant.
    pub async fn cancel_registration(&self, principal: &AuthUser, event_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE event_registrations SET cancelled = 1, cancelled_at = ? \
             WHERE event_id = ? AND user_id = ? AND cancelled = 0",
        )
        .bind(Utc::now())
        .bind(event_id)
        .bind(principal.user_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "You are not registered for this event".to_string(),
            ));
        }

        Ok(())
    }

    pub async fn mark_attendance(
        &self,
        principal: &AuthUser,
        event_id: Uuid,
        user_id: Uuid,
        attended: bool,
    ) -> Result<EventRegistration> {
        Self::require_events_admin(principal)?;

        let registration = sqlx::query_as::<_, EventRegistration>(&format!(
            "UPDATE event_registrations SET attended = ? \
             WHERE event_id = ? AND user_id = ? \
             RETURNING {REGISTRATION_COLS}"
        ))
        .bind(attended)
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Registration not found".to_string()))?;

        Ok(registration)
    }

    // Queries

    /// Detail view with meeting credentials masked unless the viewer is
    /// actively registered or an events admin.
    pub async fn get_detail(&self, viewer: Option<&AuthUser>, id: Uuid) -> Result<EventDetail> {
        let mut event = self.get_by_id(id).await?;
        let registrations_count = self.active_registration_count(id).await?;

        let is_registered = match viewer {
            Some(user) => {
                let active: Option<i64> = sqlx::query_scalar(
                    "SELECT 1 FROM event_registrations \
                     WHERE event_id = ? AND user_id = ? AND cancelled = 0",
                )
                .bind(id)
                .bind(user.user_id)
                .fetch_optional(&self.db)
                .await?;
                active.is_some()
            }
            None => false,
        };

        let can_see_meeting =
            is_registered || viewer.is_some_and(|user| user.is_platform_admin());
        if !can_see_meeting {
            event.meeting_url = None;
            event.meeting_id = None;
            event.meeting_password = None;
        }

        Ok(EventDetail {
            event,
            registrations_count,
            is_registered,
        })
    }

    pub async fn list_all(&self, principal: &AuthUser) -> Result<Vec<EventSummary>> {
        Self::require_events_admin(principal)?;
        self.list_where("1 = 1", "event_date DESC", None).await
    }

    pub async fn list_published(&self) -> Result<Vec<EventSummary>> {
        self.list_where("status IN ('PUBLISHED', 'COMPLETED')", "event_date DESC", None)
            .await
    }

    pub async fn list_upcoming(&self) -> Result<Vec<EventSummary>> {
        self.list_where(
            "status = 'PUBLISHED' AND event_date >= ?",
            "event_date ASC",
            Some(Utc::now()),
        )
        .await
    }

    pub async fn list_past(&self) -> Result<Vec<EventSummary>> {
        self.list_where(
            "status IN ('PUBLISHED', 'COMPLETED') AND event_date < ?",
            "event_date DESC",
            Some(Utc::now()),
        )
        .await
    }

    async fn list_where(
        &self,
        filter: &str,
        order: &str,
        now: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<EventSummary>> {
        let sql = format!("SELECT {EVENT_COLS} FROM events WHERE {filter} ORDER BY {order}");
        let mut query = sqlx::query_as::<_, Event>(&sql);
        if let Some(now) = now {
            query = query.bind(now);
        }
        let events = query.fetch_all(&self.db).await?;

        let mut summaries = Vec::with_capacity(events.len());
        for mut event in events {
            let registrations_count = self.active_registration_count(event.id).await?;
            // Listings never expose meeting credentials.
            event.meeting_url = None;
            event.meeting_id = None;
            event.meeting_password = None;
            summaries.push(EventSummary {
                event,
                registrations_count,
            });
        }

        Ok(summaries)
    }

    pub async fn my_registrations(&self, principal: &AuthUser) -> Result<Vec<MyRegistration>> {
        let registrations = sqlx::query_as::<_, MyRegistration>(
            "SELECT r.event_id, r.registered_at, r.attended, \
                    e.title, e.status, e.event_date, e.is_online \
             FROM event_registrations r \
             INNER JOIN events e ON e.id = r.event_id \
             WHERE r.user_id = ? AND r.cancelled = 0 \
             ORDER BY e.event_date ASC",
        )
        .bind(principal.user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(registrations)
    }

    pub async fn participants(
        &self,
        principal: &AuthUser,
        event_id: Uuid,
    ) -> Result<Vec<EventRegistration>> {
        Self::require_events_admin(principal)?;
        self.get_by_id(event_id).await?;

        let registrations = sqlx::query_as::<_, EventRegistration>(&format!(
            "SELECT {REGISTRATION_COLS} FROM event_registrations \
             WHERE event_id = ? AND cancelled = 0 ORDER BY registered_at ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.db)
        .await?;

        Ok(registrations)
    }
}
