use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    Community, CommunityDetail, CommunityMember, CommunityRole, CommunitySummary,
    CommunityVisibility, CreateCommunity, JoinOutcome, JoinRequest, JoinRequestStatus, Paginated,
    Pagination, ResolveAction, UpdateCommunity,
};
use crate::services::authz::{self, Action};
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

const COMMUNITY_COLS: &str = "id, slug, name, description, visibility, require_post_approval, \
     allow_invitations, min_level, members_count, posts_count, created_by, created_at, updated_at";

#[derive(Clone)]
pub struct CommunityService {
    db: SqlitePool,
}

impl CommunityService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // Lookups

    pub async fn get_by_id(&self, id: Uuid) -> Result<Community> {
        let community = sqlx::query_as::<_, Community>(&format!(
            "SELECT {COMMUNITY_COLS} FROM communities WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

        Ok(community)
    }

    pub async fn find_membership(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<CommunityMember>> {
        let membership = sqlx::query_as::<_, CommunityMember>(
            "SELECT community_id, user_id, role, joined_at FROM community_members \
             WHERE community_id = ? AND user_id = ?",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(membership)
    }

    async fn membership_role(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<CommunityRole>> {
        Ok(self
            .find_membership(community_id, user_id)
            .await?
            .map(|m| m.role))
    }

    // Community CRUD

    pub async fn create(&self, principal: &AuthUser, input: CreateCommunity) -> Result<Community> {
        let slug = self.unique_slug(&input.name).await?;
        let now = Utc::now();

        let community = Community {
            id: Uuid::new_v4(),
            slug,
            name: input.name,
            description: input.description,
            visibility: input.visibility.unwrap_or(CommunityVisibility::Public),
            require_post_approval: input.require_post_approval.unwrap_or(false),
            allow_invitations: input.allow_invitations.unwrap_or(true),
            min_level: input.min_level.unwrap_or(0),
            members_count: 1,
            posts_count: 0,
            created_by: principal.user_id,
            created_at: now,
            updated_at: now,
        };

        // The creator becomes the single OWNER in the same transaction.
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO communities (id, slug, name, description, visibility, \
             require_post_approval, allow_invitations, min_level, members_count, posts_count, \
             created_by, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(community.id)
        .bind(&community.slug)
        .bind(&community.name)
        .bind(&community.description)
        .bind(community.visibility)
        .bind(community.require_post_approval)
        .bind(community.allow_invitations)
        .bind(community.min_level)
        .bind(community.members_count)
        .bind(community.posts_count)
        .bind(community.created_by)
        .bind(community.created_at)
        .bind(community.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO community_members (community_id, user_id, role, joined_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(community.id)
        .bind(principal.user_id)
        .bind(CommunityRole::Owner)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(community_id = %community.id, slug = %community.slug, "Community created");
        Ok(community)
    }

    pub async fn update(
        &self,
        principal: &AuthUser,
        id: Uuid,
        input: UpdateCommunity,
    ) -> Result<Community> {
        let community = self.get_by_id(id).await?;
        let role = self.membership_role(id, principal.user_id).await?;

        if !authz::can(role, &community, Action::ManageSettings) {
            return Err(AppError::Forbidden(
                "You do not have permission to update this community".to_string(),
            ));
        }

        // A renamed community gets a fresh unique slug.
        let slug = match &input.name {
            Some(name) if *name != community.name => Some(self.unique_slug(name).await?),
            _ => None,
        };

        let updated = sqlx::query_as::<_, Community>(&format!(
            "UPDATE communities \
             SET name = COALESCE(?, name), \
                 slug = COALESCE(?, slug), \
                 description = COALESCE(?, description), \
                 visibility = COALESCE(?, visibility), \
                 require_post_approval = COALESCE(?, require_post_approval), \
                 allow_invitations = COALESCE(?, allow_invitations), \
                 min_level = COALESCE(?, min_level), \
                 updated_at = ? \
             WHERE id = ? \
             RETURNING {COMMUNITY_COLS}"
        ))
        .bind(input.name)
        .bind(slug)
        .bind(input.description)
        .bind(input.visibility)
        .bind(input.require_post_approval)
        .bind(input.allow_invitations)
        .bind(input.min_level)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }

    /// Irreversible. The caller must echo the exact community name; cascades to
    /// members, join requests, posts, likes, and comments.
    pub async fn delete(&self, principal: &AuthUser, id: Uuid, confirm_name: &str) -> Result<()> {
        let community = self.get_by_id(id).await?;
        let role = self.membership_role(id, principal.user_id).await?;

        if !authz::can(role, &community, Action::DeleteCommunity) {
            return Err(AppError::Forbidden(
                "Only the owner can delete this community".to_string(),
            ));
        }

        if confirm_name != community.name {
            return Err(AppError::Validation(
                "Community name confirmation does not match".to_string(),
            ));
        }

        sqlx::query("DELETE FROM communities WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::info!(community_id = %id, "Community deleted");
        Ok(())
    }

    /// Lookup by UUID or slug. SECRET communities answer NotFound to
    /// non-members so their existence is never disclosed.
    pub async fn get(&self, viewer: Option<&AuthUser>, id_or_slug: &str) -> Result<CommunityDetail> {
        let community = match Uuid::parse_str(id_or_slug) {
            Ok(id) => {
                sqlx::query_as::<_, Community>(&format!(
                    "SELECT {COMMUNITY_COLS} FROM communities WHERE id = ? OR slug = ?"
                ))
                .bind(id)
                .bind(id_or_slug)
                .fetch_optional(&self.db)
                .await?
            }
            Err(_) => {
                sqlx::query_as::<_, Community>(&format!(
                    "SELECT {COMMUNITY_COLS} FROM communities WHERE slug = ?"
                ))
                .bind(id_or_slug)
                .fetch_optional(&self.db)
                .await?
            }
        }
        .ok_or_else(|| AppError::NotFound("Community not found".to_string()))?;

        let membership = match viewer {
            Some(user) => self.find_membership(community.id, user.user_id).await?,
            None => None,
        };
        let role = membership.as_ref().map(|m| m.role);

        if !authz::can(role, &community, Action::View) {
            return Err(AppError::NotFound("Community not found".to_string()));
        }

        let has_pending_request = match (viewer, &membership) {
            (Some(user), None) => {
                let status: Option<JoinRequestStatus> = sqlx::query_scalar(
                    "SELECT status FROM join_requests WHERE community_id = ? AND user_id = ?",
                )
                .bind(community.id)
                .bind(user.user_id)
                .fetch_optional(&self.db)
                .await?;
                status == Some(JoinRequestStatus::Pending)
            }
            _ => false,
        };

        Ok(CommunityDetail {
            community,
            is_member: membership.is_some(),
            member_role: role,
            has_pending_request,
        })
    }

    /// Discovery listing. SECRET communities are never included.
    pub async fn list(
        &self,
        viewer: Option<&AuthUser>,
        pagination: &Pagination,
    ) -> Result<Paginated<CommunitySummary>> {
        let (page, limit, offset) = pagination.resolve(20);

        let communities = sqlx::query_as::<_, Community>(&format!(
            "SELECT {COMMUNITY_COLS} FROM communities WHERE visibility != 'SECRET' \
             ORDER BY members_count DESC, created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM communities WHERE visibility != 'SECRET'")
                .fetch_one(&self.db)
                .await?;

        let roles = match viewer {
            Some(user) => self.roles_by_community(user.user_id).await?,
            None => HashMap::new(),
        };

        let data = communities
            .into_iter()
            .map(|c| {
                let role = roles.get(&c.id).copied();
                CommunitySummary {
                    is_member: role.is_some(),
                    member_role: role,
                    community: c,
                }
            })
            .collect();

        Ok(Paginated::new(data, total, page, limit))
    }

    pub async fn my_communities(
        &self,
        principal: &AuthUser,
        pagination: &Pagination,
    ) -> Result<Paginated<CommunitySummary>> {
        let (page, limit, offset) = pagination.resolve(20);

        let communities = sqlx::query_as::<_, Community>(&format!(
            "SELECT c.{} FROM communities c \
             INNER JOIN community_members m ON c.id = m.community_id \
             WHERE m.user_id = ? ORDER BY m.joined_at DESC LIMIT ? OFFSET ?",
            COMMUNITY_COLS.replace(", ", ", c.")
        ))
        .bind(principal.user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM community_members WHERE user_id = ?")
                .bind(principal.user_id)
                .fetch_one(&self.db)
                .await?;

        let roles = self.roles_by_community(principal.user_id).await?;

        let data = communities
            .into_iter()
            .map(|c| {
                let role = roles.get(&c.id).copied();
                CommunitySummary {
                    is_member: true,
                    member_role: role,
                    community: c,
                }
            })
            .collect();

        Ok(Paginated::new(data, total, page, limit))
    }

    // Membership state machine

    /// PUBLIC: immediate membership. PRIVATE: a pending join request.
    /// SECRET: forbidden (invite-only).
    pub async fn join(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        message: Option<String>,
    ) -> Result<JoinOutcome> {
        let community = self.get_by_id(community_id).await?;
        let membership = self
            .find_membership(community_id, principal.user_id)
            .await?;

        if membership.is_some() {
            return Err(AppError::Conflict(
                "You are already a member of this community".to_string(),
            ));
        }

        match community.visibility {
            CommunityVisibility::Secret => Err(AppError::Forbidden(
                "This community requires an invitation to join".to_string(),
            )),
            CommunityVisibility::Private => {
                self.create_join_request(community_id, principal.user_id, message)
                    .await?;
                Ok(JoinOutcome::Pending)
            }
            CommunityVisibility::Public => {
                debug_assert!(authz::can(None, &community, Action::Join));

                let mut tx = self.db.begin().await?;

                sqlx::query(
                    "INSERT INTO community_members (community_id, user_id, role, joined_at) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(community_id)
                .bind(principal.user_id)
                .bind(CommunityRole::Member)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "UPDATE communities SET members_count = members_count + 1 WHERE id = ?",
                )
                .bind(community_id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(JoinOutcome::Joined)
            }
        }
    }

    async fn create_join_request(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        message: Option<String>,
    ) -> Result<()> {
        let existing: Option<JoinRequestStatus> = sqlx::query_scalar(
            "SELECT status FROM join_requests WHERE community_id = ? AND user_id = ?",
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        match existing {
            Some(JoinRequestStatus::Pending) => Err(AppError::Conflict(
                "You already have a pending request to join this community".to_string(),
            )),
            Some(JoinRequestStatus::Rejected) => Err(AppError::Forbidden(
                "Your request to join this community was rejected".to_string(),
            )),
            Some(JoinRequestStatus::Approved) => {
                // Approved earlier but no longer a member (left or was removed):
                // the row is reused as a fresh pending request.
                sqlx::query(
                    "UPDATE join_requests SET status = 'PENDING', message = ?, \
                     reject_reason = NULL, resolved_by = NULL, resolved_at = NULL, created_at = ? \
                     WHERE community_id = ? AND user_id = ?",
                )
                .bind(message)
                .bind(Utc::now())
                .bind(community_id)
                .bind(user_id)
                .execute(&self.db)
                .await?;
                Ok(())
            }
            None => {
                sqlx::query(
                    "INSERT INTO join_requests (id, community_id, user_id, status, message, created_at) \
                     VALUES (?, ?, ?, 'PENDING', ?, ?)",
                )
                .bind(Uuid::new_v4())
                .bind(community_id)
                .bind(user_id)
                .bind(message)
                .bind(Utc::now())
                .execute(&self.db)
                .await?;
                Ok(())
            }
        }
    }

    pub async fn leave(&self, principal: &AuthUser, community_id: Uuid) -> Result<()> {
        let membership = self
            .find_membership(community_id, principal.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("You are not a member of this community".to_string())
            })?;

        if membership.role == CommunityRole::Owner {
            return Err(AppError::Forbidden(
                "The owner cannot leave the community. Transfer ownership or delete it instead."
                    .to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let result =
            sqlx::query("DELETE FROM community_members WHERE community_id = ? AND user_id = ?")
                .bind(community_id)
                .bind(principal.user_id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(
                "You are not a member of this community".to_string(),
            ));
        }

        sqlx::query("UPDATE communities SET members_count = members_count - 1 WHERE id = ?")
            .bind(community_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_join_requests(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Paginated<JoinRequest>> {
        let community = self.get_by_id(community_id).await?;
        let role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::can(role, &community, Action::ModerateMembers) {
            return Err(AppError::Forbidden(
                "You do not have permission to view join requests".to_string(),
            ));
        }

        let (page, limit, offset) = pagination.resolve(20);

        let requests = sqlx::query_as::<_, JoinRequest>(
            "SELECT id, community_id, user_id, status, message, reject_reason, resolved_by, \
             resolved_at, created_at \
             FROM join_requests WHERE community_id = ? AND status = 'PENDING' \
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(community_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM join_requests WHERE community_id = ? AND status = 'PENDING'",
        )
        .bind(community_id)
        .fetch_one(&self.db)
        .await?;

        Ok(Paginated::new(requests, total, page, limit))
    }

    /// Approval atomically marks the request APPROVED, inserts the member row,
    /// and bumps the counter. Rejection only records the outcome.
    pub async fn resolve_join_request(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        request_id: Uuid,
        action: ResolveAction,
        reject_reason: Option<String>,
    ) -> Result<JoinRequestStatus> {
        let community = self.get_by_id(community_id).await?;
        let role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::can(role, &community, Action::ModerateMembers) {
            return Err(AppError::Forbidden(
                "You do not have permission to process join requests".to_string(),
            ));
        }

        let request = sqlx::query_as::<_, JoinRequest>(
            "SELECT id, community_id, user_id, status, message, reject_reason, resolved_by, \
             resolved_at, created_at \
             FROM join_requests WHERE id = ? AND community_id = ? AND status = 'PENDING'",
        )
        .bind(request_id)
        .bind(community_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Join request not found or already processed".to_string())
        })?;

        let now = Utc::now();

        match action {
            ResolveAction::Approve => {
                let mut tx = self.db.begin().await?;

                sqlx::query(
                    "UPDATE join_requests SET status = 'APPROVED', resolved_by = ?, resolved_at = ? \
                     WHERE id = ?",
                )
                .bind(principal.user_id)
                .bind(now)
                .bind(request_id)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO community_members (community_id, user_id, role, joined_at) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(community_id)
                .bind(request.user_id)
                .bind(CommunityRole::Member)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "UPDATE communities SET members_count = members_count + 1 WHERE id = ?",
                )
                .bind(community_id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(JoinRequestStatus::Approved)
            }
            ResolveAction::Reject => {
                sqlx::query(
                    "UPDATE join_requests SET status = 'REJECTED', reject_reason = ?, \
                     resolved_by = ?, resolved_at = ? WHERE id = ?",
                )
                .bind(reject_reason)
                .bind(principal.user_id)
                .bind(now)
                .bind(request_id)
                .execute(&self.db)
                .await?;

                Ok(JoinRequestStatus::Rejected)
            }
        }
    }

    /// Promote or demote within ADMIN / MODERATOR / MEMBER. OWNER is never
    /// assigned or unassigned here; that goes through `transfer_ownership`.
    pub async fn update_member_role(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        target_user_id: Uuid,
        new_role: CommunityRole,
    ) -> Result<CommunityMember> {
        let community = self.get_by_id(community_id).await?;
        let actor_role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::can(actor_role, &community, Action::ModerateMembers) {
            return Err(AppError::Forbidden(
                "You do not have permission to change member roles".to_string(),
            ));
        }

        if target_user_id == principal.user_id {
            return Err(AppError::Forbidden(
                "Cannot change your own role".to_string(),
            ));
        }

        if new_role == CommunityRole::Owner {
            return Err(AppError::Forbidden(
                "Ownership is reassigned through the transfer operation".to_string(),
            ));
        }

        let target = self
            .find_membership(community_id, target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if target.role == CommunityRole::Owner {
            return Err(AppError::Forbidden(
                "Cannot change the owner's role".to_string(),
            ));
        }

        let member = sqlx::query_as::<_, CommunityMember>(
            "UPDATE community_members SET role = ? WHERE community_id = ? AND user_id = ? \
             RETURNING community_id, user_id, role, joined_at",
        )
        .bind(new_role)
        .bind(community_id)
        .bind(target_user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(member)
    }

    pub async fn remove_member(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        target_user_id: Uuid,
    ) -> Result<()> {
        let community = self.get_by_id(community_id).await?;
        let actor_role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::can(actor_role, &community, Action::ModerateMembers) {
            return Err(AppError::Forbidden(
                "You do not have permission to remove members".to_string(),
            ));
        }

        let target = self
            .find_membership(community_id, target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        if target.role == CommunityRole::Owner {
            return Err(AppError::Forbidden("Cannot remove the owner".to_string()));
        }

        // Admins can only be removed by the owner.
        if target.role == CommunityRole::Admin && actor_role != Some(CommunityRole::Owner) {
            return Err(AppError::Forbidden(
                "Only the owner can remove admins".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let result =
            sqlx::query("DELETE FROM community_members WHERE community_id = ? AND user_id = ?")
                .bind(community_id)
                .bind(target_user_id)
                .execute(&mut *tx)
                .await?;

        // A concurrent removal (or leave) may have already deleted the row;
        // the counter only moves when this call did the deleting.
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Member not found".to_string()));
        }

        sqlx::query("UPDATE communities SET members_count = members_count - 1 WHERE id = ?")
            .bind(community_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Atomic owner swap: the target becomes OWNER and the caller drops to
    /// ADMIN, so exactly one OWNER exists at every commit point.
    pub async fn transfer_ownership(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        new_owner_id: Uuid,
    ) -> Result<()> {
        let actor = self
            .find_membership(community_id, principal.user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("You are not a member of this community".to_string())
            })?;

        if actor.role != CommunityRole::Owner {
            return Err(AppError::Forbidden(
                "Only the owner can transfer ownership".to_string(),
            ));
        }

        if new_owner_id == principal.user_id {
            return Err(AppError::Validation(
                "You already own this community".to_string(),
            ));
        }

        self.find_membership(community_id, new_owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        // Both writes are guarded on current state so a concurrent transfer
        // cannot commit a second OWNER row: the loser's demote matches nothing
        // and the whole transaction rolls back.
        let mut tx = self.db.begin().await?;

        let demoted = sqlx::query(
            "UPDATE community_members SET role = 'ADMIN' \
             WHERE community_id = ? AND user_id = ? AND role = 'OWNER'",
        )
        .bind(community_id)
        .bind(principal.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let promoted = sqlx::query(
            "UPDATE community_members SET role = 'OWNER' \
             WHERE community_id = ? AND user_id = ? AND role != 'OWNER'",
        )
        .bind(community_id)
        .bind(new_owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if demoted != 1 || promoted != 1 {
            return Err(AppError::Conflict(
                "Ownership changed while the transfer was in progress".to_string(),
            ));
        }

        tx.commit().await?;

        tracing::info!(community_id = %community_id, new_owner = %new_owner_id, "Ownership transferred");
        Ok(())
    }

    pub async fn list_members(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Paginated<CommunityMember>> {
        let community = self.get_by_id(community_id).await?;
        let role = self.membership_role(community_id, principal.user_id).await?;

        if community.visibility != CommunityVisibility::Public && role.is_none() {
            // Hide secret communities entirely; private ones gate the roster.
            if community.visibility == CommunityVisibility::Secret {
                return Err(AppError::NotFound("Community not found".to_string()));
            }
            return Err(AppError::Forbidden(
                "You must be a member to view the member list".to_string(),
            ));
        }

        let (page, limit, offset) = pagination.resolve(20);

        let members = sqlx::query_as::<_, CommunityMember>(
            "SELECT community_id, user_id, role, joined_at FROM community_members \
             WHERE community_id = ? \
             ORDER BY CASE role WHEN 'OWNER' THEN 0 WHEN 'ADMIN' THEN 1 \
                      WHEN 'MODERATOR' THEN 2 ELSE 3 END, joined_at ASC \
             LIMIT ? OFFSET ?",
        )
        .bind(community_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM community_members WHERE community_id = ?")
                .bind(community_id)
                .fetch_one(&self.db)
                .await?;

        Ok(Paginated::new(members, total, page, limit))
    }

    // Helpers

    async fn roles_by_community(&self, user_id: Uuid) -> Result<HashMap<Uuid, CommunityRole>> {
        let rows: Vec<(Uuid, CommunityRole)> =
            sqlx::query_as("SELECT community_id, role FROM community_members WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.db)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn unique_slug(&self, name: &str) -> Result<String> {
        let base = slugify(name);
        let mut candidate = base.clone();
        let mut counter = 0;

        loop {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM communities WHERE slug = ?")
                    .bind(&candidate)
                    .fetch_optional(&self.db)
                    .await?;

            if exists.is_none() {
                return Ok(candidate);
            }

            counter += 1;
            candidate = format!("{base}-{counter}");
        }
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut prev_dash = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            prev_dash = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.is_empty() && !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "community".to_string()
    } else {
        slug.to_string()
    }
}
