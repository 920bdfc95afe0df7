//! Community authorization engine.
//!
//! Pure decision logic: given the viewer's role in a community (if any) and the
//! community itself, decide whether an action is permitted. Every mutating
//! operation in the community and post services consults this module before
//! touching the store.

use crate::models::{Community, CommunityRole, CommunityVisibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Join,
    Post,
    Comment,
    Like,
    Pin,
    ModerateMembers,
    ManageSettings,
    DeleteCommunity,
}

pub fn can(role: Option<CommunityRole>, community: &Community, action: Action) -> bool {
    match action {
        Action::View => match community.visibility {
            CommunityVisibility::Public | CommunityVisibility::Private => true,
            CommunityVisibility::Secret => role.is_some(),
        },
        // Direct join without a request: only open communities, and only for
        // users who are not already members.
        Action::Join => {
            community.visibility == CommunityVisibility::Public && role.is_none()
        }
        Action::Post | Action::Comment | Action::Like => role.is_some(),
        Action::Pin => is_moderator(role),
        Action::ModerateMembers | Action::ManageSettings => {
            role.is_some_and(|r| r >= CommunityRole::Admin)
        }
        Action::DeleteCommunity => role == Some(CommunityRole::Owner),
    }
}

/// Moderation rights over content (pin, approve pending posts, delete others'
/// posts): MODERATOR and above.
pub fn is_moderator(role: Option<CommunityRole>) -> bool {
    role.is_some_and(|r| r >= CommunityRole::Moderator)
}
