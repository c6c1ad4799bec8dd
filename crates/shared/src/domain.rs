use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(UserId);
id_newtype!(PostId);

/// The viewer's reaction to a post. A single value, so a viewer can never
/// be liked and disliked at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerReaction {
    #[default]
    None,
    Liked,
    Disliked,
}

/// Feed ordering accepted by the posts listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedFilter {
    #[default]
    Recent,
    Likes,
    Popular,
}

impl FeedFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "recent" => Some(Self::Recent),
            "likes" => Some(Self::Likes),
            "popular" => Some(Self::Popular),
            _ => None,
        }
    }
}
