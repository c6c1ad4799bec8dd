use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FeedFilter, PostId, UserId, ViewerReaction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
}

/// One post as served by the feed and single-post endpoints.
///
/// Counters default to zero and `viewer_reaction` to `None` so that older
/// backend deployments that omit them still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostPayload {
    pub post_id: PostId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub dislike_count: u64,
    #[serde(default)]
    pub share_count: u64,
    #[serde(default)]
    pub viewer_reaction: ViewerReaction,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeedQuery {
    pub filter: FeedFilter,
    pub page: u32,
    pub limit: u32,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            filter: FeedFilter::Recent,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Authoritative state the backend may attach to a like/dislike response.
///
/// The backend contract is unsettled here: some deployments return the new
/// counters, some return an empty body. Every field is therefore an
/// optional override; an absent field means the client keeps whatever it
/// computed optimistically.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReactionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dislike_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_reaction: Option<ViewerReaction>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShareResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_update_deserializes_from_empty_object() {
        let update: ReactionUpdate = serde_json::from_str("{}").expect("parse");
        assert!(update.like_count.is_none());
        assert!(update.dislike_count.is_none());
        assert!(update.viewer_reaction.is_none());
    }

    #[test]
    fn viewer_reaction_uses_snake_case_wire_values() {
        assert_eq!(
            serde_json::to_string(&ViewerReaction::Disliked).expect("serialize"),
            "\"disliked\""
        );
        let parsed: ViewerReaction = serde_json::from_str("\"liked\"").expect("parse");
        assert_eq!(parsed, ViewerReaction::Liked);
    }

    #[test]
    fn post_payload_defaults_missing_counters_to_zero() {
        let raw = r#"{
            "post_id": 4,
            "user_id": 9,
            "title": "sunset",
            "content": "golden hour",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let post: PostPayload = serde_json::from_str(raw).expect("parse");
        assert_eq!(post.like_count, 0);
        assert_eq!(post.dislike_count, 0);
        assert_eq!(post.share_count, 0);
        assert_eq!(post.viewer_reaction, ViewerReaction::None);
        assert!(post.image_url.is_none());
    }
}
