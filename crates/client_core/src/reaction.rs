use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shared::{
    domain::{PostId, ViewerReaction},
    protocol::{PostPayload, ReactionUpdate},
};

use crate::error::ClientError;

/// Mutating reaction calls the controller issues against the backend.
///
/// `VistagramClient` is the production implementation; tests script their
/// own. Auth handling is the implementation's problem: a 401 must already
/// have been escalated by the time `ClientError::Unauthorized` reaches the
/// controller, which only propagates it.
#[async_trait]
pub trait ReactionApi: Send + Sync {
    async fn like_post(&self, post_id: PostId) -> Result<ReactionUpdate, ClientError>;
    async fn dislike_post(&self, post_id: PostId) -> Result<ReactionUpdate, ClientError>;
    async fn share_post(&self, post_id: PostId) -> Result<Option<u64>, ClientError>;
}

/// The reaction counters for one post as seen by one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionSnapshot {
    pub like_count: u64,
    pub dislike_count: u64,
    pub share_count: u64,
    pub viewer_reaction: ViewerReaction,
}

impl ReactionSnapshot {
    pub fn seed(
        like_count: u64,
        dislike_count: u64,
        share_count: u64,
        viewer_reaction: ViewerReaction,
    ) -> Self {
        Self {
            like_count,
            dislike_count,
            share_count,
            viewer_reaction,
        }
    }
}

impl From<&PostPayload> for ReactionSnapshot {
    fn from(post: &PostPayload) -> Self {
        Self {
            like_count: post.like_count,
            dislike_count: post.dislike_count,
            share_count: post.share_count,
            viewer_reaction: post.viewer_reaction,
        }
    }
}

/// Result of a settled `like()`/`dislike()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// The call settled; this is the reconciled state.
    Applied(ReactionSnapshot),
    /// A like/dislike was already in flight for this post. The request was
    /// dropped, not queued, and local state is untouched.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleKind {
    Like,
    Dislike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingCall {
    None,
    Like,
    Dislike,
}

impl From<ToggleKind> for PendingCall {
    fn from(kind: ToggleKind) -> Self {
        match kind {
            ToggleKind::Like => Self::Like,
            ToggleKind::Dislike => Self::Dislike,
        }
    }
}

#[derive(Debug)]
struct ReactionState {
    snapshot: ReactionSnapshot,
    pending: PendingCall,
}

/// Per-post reaction state with optimistic updates, server reconciliation,
/// and rollback.
///
/// One controller per displayed post, seeded from the server payload and
/// discarded on view teardown. The pending flag is checked and set under
/// the lock, and the lock is released around the network await, so a
/// second tap while a call is in flight observes the gate and is dropped.
pub struct ReactionController {
    post_id: PostId,
    api: Arc<dyn ReactionApi>,
    state: Mutex<ReactionState>,
}

impl ReactionController {
    pub fn new(post_id: PostId, seed: ReactionSnapshot, api: Arc<dyn ReactionApi>) -> Self {
        Self {
            post_id,
            api,
            state: Mutex::new(ReactionState {
                snapshot: seed,
                pending: PendingCall::None,
            }),
        }
    }

    pub fn from_post(post: &PostPayload, api: Arc<dyn ReactionApi>) -> Self {
        Self::new(post.post_id, ReactionSnapshot::from(post), api)
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub async fn snapshot(&self) -> ReactionSnapshot {
        self.state.lock().await.snapshot
    }

    /// True while a like/dislike call is outstanding.
    pub async fn is_pending(&self) -> bool {
        self.state.lock().await.pending != PendingCall::None
    }

    /// Toggle the viewer's like. A second call while one is in flight is a
    /// no-op; on remote failure the pre-call state is restored exactly.
    pub async fn like(&self) -> Result<ReactionOutcome, ClientError> {
        self.toggle(ToggleKind::Like).await
    }

    /// Symmetric to `like()`, swapping the roles of the two counters.
    pub async fn dislike(&self) -> Result<ReactionOutcome, ClientError> {
        self.toggle(ToggleKind::Dislike).await
    }

    async fn toggle(&self, kind: ToggleKind) -> Result<ReactionOutcome, ClientError> {
        let before = {
            let mut state = self.state.lock().await;
            if state.pending != PendingCall::None {
                debug!(
                    post_id = self.post_id.0,
                    "reaction dropped: a call is already in flight"
                );
                return Ok(ReactionOutcome::Dropped);
            }
            let before = state.snapshot;
            state.snapshot = match kind {
                ToggleKind::Like => apply_like(before),
                ToggleKind::Dislike => apply_dislike(before),
            };
            state.pending = kind.into();
            before
        };

        let result = match kind {
            ToggleKind::Like => self.api.like_post(self.post_id).await,
            ToggleKind::Dislike => self.api.dislike_post(self.post_id).await,
        };

        let mut state = self.state.lock().await;
        state.pending = PendingCall::None;
        match result {
            Ok(update) => {
                reconcile(&mut state.snapshot, update);
                Ok(ReactionOutcome::Applied(state.snapshot))
            }
            Err(err) => {
                rollback(&mut state.snapshot, before);
                Err(err)
            }
        }
    }

    /// Record a share. Not part of the like/dislike mutual exclusion:
    /// shares are not a toggle and have no inverse, so the optimistic
    /// increment is never rolled back. Remote failure is surfaced so the
    /// caller can show a notice.
    pub async fn share(&self) -> Result<u64, ClientError> {
        {
            let mut state = self.state.lock().await;
            state.snapshot.share_count += 1;
        }

        match self.api.share_post(self.post_id).await {
            Ok(server_count) => {
                let mut state = self.state.lock().await;
                if let Some(count) = server_count {
                    state.snapshot.share_count = count;
                }
                Ok(state.snapshot.share_count)
            }
            Err(err) => {
                warn!(post_id = self.post_id.0, "share call failed: {err}");
                Err(err)
            }
        }
    }
}

fn apply_like(s: ReactionSnapshot) -> ReactionSnapshot {
    match s.viewer_reaction {
        // Already liked: toggle off.
        ViewerReaction::Liked => ReactionSnapshot {
            like_count: s.like_count.saturating_sub(1),
            viewer_reaction: ViewerReaction::None,
            ..s
        },
        ViewerReaction::Disliked => ReactionSnapshot {
            like_count: s.like_count + 1,
            dislike_count: s.dislike_count.saturating_sub(1),
            viewer_reaction: ViewerReaction::Liked,
            ..s
        },
        ViewerReaction::None => ReactionSnapshot {
            like_count: s.like_count + 1,
            viewer_reaction: ViewerReaction::Liked,
            ..s
        },
    }
}

fn apply_dislike(s: ReactionSnapshot) -> ReactionSnapshot {
    match s.viewer_reaction {
        ViewerReaction::Disliked => ReactionSnapshot {
            dislike_count: s.dislike_count.saturating_sub(1),
            viewer_reaction: ViewerReaction::None,
            ..s
        },
        ViewerReaction::Liked => ReactionSnapshot {
            dislike_count: s.dislike_count + 1,
            like_count: s.like_count.saturating_sub(1),
            viewer_reaction: ViewerReaction::Disliked,
            ..s
        },
        ViewerReaction::None => ReactionSnapshot {
            dislike_count: s.dislike_count + 1,
            viewer_reaction: ViewerReaction::Disliked,
            ..s
        },
    }
}

/// Server-provided fields win; omitted fields keep the optimistic value.
fn reconcile(snapshot: &mut ReactionSnapshot, update: ReactionUpdate) {
    if let Some(count) = update.like_count {
        snapshot.like_count = count;
    }
    if let Some(count) = update.dislike_count {
        snapshot.dislike_count = count;
    }
    if let Some(reaction) = update.viewer_reaction {
        snapshot.viewer_reaction = reaction;
    }
}

/// Restore the reaction fields captured before the failed call. The share
/// counter is outside the toggle's snapshot: a share settled while the
/// toggle was in flight must survive the rollback.
fn rollback(snapshot: &mut ReactionSnapshot, before: ReactionSnapshot) {
    snapshot.like_count = before.like_count;
    snapshot.dislike_count = before.dislike_count;
    snapshot.viewer_reaction = before.viewer_reaction;
}

#[cfg(test)]
#[path = "tests/reaction_tests.rs"]
mod tests;
