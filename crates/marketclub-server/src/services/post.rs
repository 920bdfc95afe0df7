use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{
    CommentThread, CommunityPost, CommunityRole, CommunityVisibility, CreateComment, CreatePost,
    LikeResponse, Paginated, Pagination, PostComment, PostType, PostView,
};
use crate::services::authz::{self, Action};
use crate::services::community::CommunityService;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

const POST_COLS: &str = "id, community_id, author_id, post_type, title, content, is_pinned, \
     is_approved, likes_count, comments_count, created_at, updated_at";

const COMMENT_COLS: &str = "id, post_id, author_id, parent_id, content, created_at";

#[derive(Clone)]
pub struct PostService {
    db: SqlitePool,
    communities: CommunityService,
}

impl PostService {
    pub fn new(db: SqlitePool, communities: CommunityService) -> Self {
        Self { db, communities }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<CommunityPost> {
        let post = sqlx::query_as::<_, CommunityPost>(&format!(
            "SELECT {POST_COLS} FROM community_posts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        Ok(post)
    }

    async fn membership_role(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<CommunityRole>> {
        Ok(self
            .communities
            .find_membership(community_id, user_id)
            .await?
            .map(|m| m.role))
    }

    /// Posts by plain members start unapproved when the community requires
    /// approval; moderator+ posts are approved immediately.
    pub async fn create(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        input: CreatePost,
    ) -> Result<CommunityPost> {
        let community = self.communities.get_by_id(community_id).await?;
        let role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::can(role, &community, Action::Post) {
            return Err(AppError::Forbidden(
                "You must be a member to post in this community".to_string(),
            ));
        }

        let needs_approval = community.require_post_approval && !authz::is_moderator(role);
        let now = Utc::now();

        let post = CommunityPost {
            id: Uuid::new_v4(),
            community_id,
            author_id: principal.user_id,
            post_type: input.post_type.unwrap_or(PostType::Opinion),
            title: input.title,
            content: input.content,
            is_pinned: false,
            is_approved: !needs_approval,
            likes_count: 0,
            comments_count: 0,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO community_posts (id, community_id, author_id, post_type, title, content, \
             is_pinned, is_approved, likes_count, comments_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.id)
        .bind(post.community_id)
        .bind(post.author_id)
        .bind(post.post_type)
        .bind(&post.title)
        .bind(&post.content)
        .bind(post.is_pinned)
        .bind(post.is_approved)
        .bind(post.likes_count)
        .bind(post.comments_count)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE communities SET posts_count = posts_count + 1 WHERE id = ?")
            .bind(community_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(post)
    }

    /// Public feed: approved posts only, pinned first.
    pub async fn list(
        &self,
        viewer: Option<&AuthUser>,
        community_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Paginated<PostView>> {
        let community = self.communities.get_by_id(community_id).await?;

        let role = match viewer {
            Some(user) => self.membership_role(community_id, user.user_id).await?,
            None => None,
        };

        if community.visibility != CommunityVisibility::Public && role.is_none() {
            if community.visibility == CommunityVisibility::Secret {
                return Err(AppError::NotFound("Community not found".to_string()));
            }
            return match viewer {
                Some(_) => Err(AppError::Forbidden(
                    "You must be a member to view posts in this community".to_string(),
                )),
                None => Err(AppError::Unauthorized),
            };
        }

        let (page, limit, offset) = pagination.resolve(10);

        let posts = sqlx::query_as::<_, CommunityPost>(&format!(
            "SELECT {POST_COLS} FROM community_posts \
             WHERE community_id = ? AND is_approved = 1 \
             ORDER BY is_pinned DESC, created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(community_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM community_posts WHERE community_id = ? AND is_approved = 1",
        )
        .bind(community_id)
        .fetch_one(&self.db)
        .await?;

        let liked = match viewer {
            Some(user) => self.liked_post_ids(community_id, user.user_id).await?,
            None => HashSet::new(),
        };

        let data = posts
            .into_iter()
            .map(|p| PostView {
                has_liked: liked.contains(&p.id),
                post: p,
            })
            .collect();

        Ok(Paginated::new(data, total, page, limit))
    }

    /// Moderation queue: posts awaiting approval, oldest first.
    pub async fn list_pending(
        &self,
        principal: &AuthUser,
        community_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Paginated<CommunityPost>> {
        self.communities.get_by_id(community_id).await?;
        let role = self.membership_role(community_id, principal.user_id).await?;

        if !authz::is_moderator(role) {
            return Err(AppError::Forbidden(
                "You do not have permission to review pending posts".to_string(),
            ));
        }

        let (page, limit, offset) = pagination.resolve(10);

        let posts = sqlx::query_as::<_, CommunityPost>(&format!(
            "SELECT {POST_COLS} FROM community_posts \
             WHERE community_id = ? AND is_approved = 0 \
             ORDER BY created_at ASC LIMIT ? OFFSET ?"
        ))
        .bind(community_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM community_posts WHERE community_id = ? AND is_approved = 0",
        )
        .bind(community_id)
        .fetch_one(&self.db)
        .await?;

        Ok(Paginated::new(posts, total, page, limit))
    }

    pub async fn approve(&self, principal: &AuthUser, post_id: Uuid) -> Result<CommunityPost> {
        let post = self.get_by_id(post_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if !authz::is_moderator(role) {
            return Err(AppError::Forbidden(
                "You do not have permission to approve posts".to_string(),
            ));
        }

        let approved = sqlx::query_as::<_, CommunityPost>(&format!(
            "UPDATE community_posts SET is_approved = 1, updated_at = ? \
             WHERE id = ? AND is_approved = 0 \
             RETURNING {POST_COLS}"
        ))
        .bind(Utc::now())
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Conflict("Post is already approved".to_string()))?;

        Ok(approved)
    }

    /// Idempotent: the counter moves only when the like row actually changed,
    /// so concurrent toggles cannot drift it.
    pub async fn like(&self, principal: &AuthUser, post_id: Uuid) -> Result<LikeResponse> {
        let post = self.get_by_id(post_id).await?;
        let community = self.communities.get_by_id(post.community_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if !authz::can(role, &community, Action::Like) {
            return Err(AppError::Forbidden(
                "You must be a member to like posts".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(principal.user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            sqlx::query("UPDATE community_posts SET likes_count = likes_count + 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        let likes_count: i64 =
            sqlx::query_scalar("SELECT likes_count FROM community_posts WHERE id = ?")
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(LikeResponse {
            liked: true,
            likes_count,
        })
    }

    pub async fn unlike(&self, principal: &AuthUser, post_id: Uuid) -> Result<LikeResponse> {
        let post = self.get_by_id(post_id).await?;
        let community = self.communities.get_by_id(post.community_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if !authz::can(role, &community, Action::Like) {
            return Err(AppError::Forbidden(
                "You must be a member to like posts".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        let deleted = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(principal.user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 1 {
            sqlx::query("UPDATE community_posts SET likes_count = likes_count - 1 WHERE id = ?")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
        }

        let likes_count: i64 =
            sqlx::query_scalar("SELECT likes_count FROM community_posts WHERE id = ?")
                .bind(post_id)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(LikeResponse {
            liked: false,
            likes_count,
        })
    }

    /// Replies nest exactly one level: the parent must be a top-level comment
    /// on the same post.
    pub async fn comment(
        &self,
        principal: &AuthUser,
        post_id: Uuid,
        input: CreateComment,
    ) -> Result<PostComment> {
        let post = self.get_by_id(post_id).await?;
        let community = self.communities.get_by_id(post.community_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if !authz::can(role, &community, Action::Comment) {
            return Err(AppError::Forbidden(
                "You must be a member to comment".to_string(),
            ));
        }

        if let Some(parent_id) = input.parent_id {
            let parent = sqlx::query_as::<_, PostComment>(&format!(
                "SELECT {COMMENT_COLS} FROM post_comments WHERE id = ?"
            ))
            .bind(parent_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Parent comment not found".to_string()))?;

            if parent.post_id != post_id {
                return Err(AppError::Validation(
                    "Parent comment belongs to a different post".to_string(),
                ));
            }
            if parent.parent_id.is_some() {
                return Err(AppError::Validation(
                    "Replies cannot be nested more than one level".to_string(),
                ));
            }
        }

        let comment = PostComment {
            id: Uuid::new_v4(),
            post_id,
            author_id: principal.user_id,
            parent_id: input.parent_id,
            content: input.content,
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO post_comments (id, post_id, author_id, parent_id, content, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.id)
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.parent_id)
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE community_posts SET comments_count = comments_count + 1 WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    pub async fn list_comments(
        &self,
        post_id: Uuid,
        pagination: &Pagination,
    ) -> Result<Paginated<CommentThread>> {
        self.get_by_id(post_id).await?;

        let all = sqlx::query_as::<_, PostComment>(&format!(
            "SELECT {COMMENT_COLS} FROM post_comments WHERE post_id = ? ORDER BY created_at DESC"
        ))
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;

        let (top_level, replies): (Vec<_>, Vec<_>) =
            all.into_iter().partition(|c| c.parent_id.is_none());

        let total = top_level.len() as i64;
        let (page, limit, offset) = pagination.resolve(20);

        let data = top_level
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|comment| {
                let mut thread_replies: Vec<PostComment> = replies
                    .iter()
                    .filter(|r| r.parent_id == Some(comment.id))
                    .cloned()
                    .collect();
                thread_replies.sort_by_key(|r| r.created_at);
                CommentThread {
                    comment,
                    replies: thread_replies,
                }
            })
            .collect();

        Ok(Paginated::new(data, total, page, limit))
    }

    pub async fn toggle_pin(&self, principal: &AuthUser, post_id: Uuid) -> Result<CommunityPost> {
        let post = self.get_by_id(post_id).await?;
        let community = self.communities.get_by_id(post.community_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if !authz::can(role, &community, Action::Pin) {
            return Err(AppError::Forbidden(
                "You do not have permission to pin posts".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, CommunityPost>(&format!(
            "UPDATE community_posts SET is_pinned = NOT is_pinned, updated_at = ? \
             WHERE id = ? RETURNING {POST_COLS}"
        ))
        .bind(Utc::now())
        .bind(post_id)
        .fetch_one(&self.db)
        .await?;

        Ok(updated)
    }

    /// The author may delete their own post; moderators may delete any post.
    pub async fn delete(&self, principal: &AuthUser, post_id: Uuid) -> Result<()> {
        let post = self.get_by_id(post_id).await?;
        let role = self
            .membership_role(post.community_id, principal.user_id)
            .await?;

        if post.author_id != principal.user_id && !authz::is_moderator(role) {
            return Err(AppError::Forbidden(
                "You do not have permission to delete this post".to_string(),
            ));
        }

        let mut tx = self.db.begin().await?;

        // Likes and comments go with the post via FK cascade.
        sqlx::query("DELETE FROM community_posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE communities SET posts_count = posts_count - 1 WHERE id = ?")
            .bind(post.community_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn liked_post_ids(&self, community_id: Uuid, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT l.post_id FROM post_likes l \
             INNER JOIN community_posts p ON p.id = l.post_id \
             WHERE l.user_id = ? AND p.community_id = ?",
        )
        .bind(user_id)
        .bind(community_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
