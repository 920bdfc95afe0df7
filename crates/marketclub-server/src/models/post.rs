use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum PostType {
    Opinion,
    Analysis,
    Question,
    News,
}

/// A post inside one community. Unapproved posts are visible to moderators only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CommunityPost {
    pub id: Uuid,
    pub community_id: Uuid,
    pub author_id: Uuid,
    pub post_type: PostType,
    pub title: Option<String>,
    pub content: String,
    pub is_pinned: bool,
    pub is_approved: bool,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comments nest exactly one level: a reply's parent is always top-level.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostComment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePost {
    pub post_type: Option<PostType>,
    #[validate(length(max = 160))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateComment {
    #[validate(length(min = 1, max = 2000))]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: CommunityPost,
    pub has_liked: bool,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: PostComment,
    pub replies: Vec<PostComment>,
}
