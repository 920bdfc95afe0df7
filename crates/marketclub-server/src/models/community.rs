use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Who can discover and join a community.
///
/// PUBLIC: discoverable, open join. PRIVATE: discoverable, join by approved
/// request. SECRET: invite-only, hidden from non-members entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum CommunityVisibility {
    Public,
    Private,
    Secret,
}

/// Per-community privilege level, totally ordered by variant order:
/// MEMBER < MODERATOR < ADMIN < OWNER.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum CommunityRole {
    Member,
    Moderator,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// A community - a themed discussion group with membership tiers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Community {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: CommunityVisibility,
    pub require_post_approval: bool,
    pub allow_invitations: bool,
    pub min_level: i64,
    pub members_count: i64,
    pub posts_count: i64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommunityMember {
    pub community_id: Uuid,
    pub user_id: Uuid,
    pub role: CommunityRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JoinRequest {
    pub id: Uuid,
    pub community_id: Uuid,
    pub user_id: Uuid,
    pub status: JoinRequestStatus,
    pub message: Option<String>,
    pub reject_reason: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommunity {
    #[validate(length(min = 3, max = 80))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub visibility: Option<CommunityVisibility>,
    pub require_post_approval: Option<bool>,
    pub allow_invitations: Option<bool>,
    #[validate(range(min = 0))]
    pub min_level: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommunity {
    #[validate(length(min = 3, max = 80))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub visibility: Option<CommunityVisibility>,
    pub require_post_approval: Option<bool>,
    pub allow_invitations: Option<bool>,
    #[validate(range(min = 0))]
    pub min_level: Option<i64>,
}

/// Deleting a community is irreversible; the caller must echo its exact name.
#[derive(Debug, Deserialize)]
pub struct DeleteCommunity {
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JoinCommunity {
    #[validate(length(max = 500))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinOutcome {
    Joined,
    Pending,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub status: JoinOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ResolveJoinRequest {
    pub action: ResolveAction,
    pub reject_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRole {
    pub role: CommunityRole,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnership {
    pub new_owner_id: Uuid,
}

/// A community plus the viewer's relationship to it.
#[derive(Debug, Serialize)]
pub struct CommunityDetail {
    #[serde(flatten)]
    pub community: Community,
    pub is_member: bool,
    pub member_role: Option<CommunityRole>,
    pub has_pending_request: bool,
}

#[derive(Debug, Serialize)]
pub struct CommunitySummary {
    #[serde(flatten)]
    pub community: Community,
    pub is_member: bool,
    pub member_role: Option<CommunityRole>,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    /// Clamped (page, limit, offset) with the defaults the listings use.
    pub fn resolve(&self, default_limit: i64) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, 100);
        (page, limit, (page - 1) * limit)
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, page: i64, limit: i64) -> Self {
        Self {
            data,
            total,
            page,
            total_pages: (total + limit - 1) / limit,
        }
    }
}
