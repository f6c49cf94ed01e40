//! Celebration queue for newly unlocked badges.
//!
//! The presentation surface shows the front entry and calls
//! [`CelebrationQueue::dismiss_front`] when the user (or its own display
//! timer) is done with it. The queue never advances by itself.

use crate::badges::Badge;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// How long a consumer that auto-dismisses should show each celebration
pub const CELEBRATION_DISPLAY_DURATION: Duration = Duration::from_secs(4);

/// FIFO queue of badges awaiting celebration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CelebrationQueue {
    pending: VecDeque<Badge>,
    /// Every badge id ever accepted, including dismissed ones
    seen: BTreeSet<String>,
}

impl CelebrationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a badge to the tail
    ///
    /// Returns false (and leaves the queue untouched) if this badge id was
    /// already accepted at any point in the queue's lifetime.
    pub fn enqueue(&mut self, badge: Badge) -> bool {
        if !self.seen.insert(badge.id.clone()) {
            tracing::debug!("Badge {} already celebrated, not re-queued", badge.id);
            return false;
        }

        tracing::debug!(
            "Queued celebration for {} ({} pending)",
            badge.id,
            self.pending.len() + 1
        );
        self.pending.push_back(badge);
        true
    }

    /// The badge currently being celebrated
    pub fn peek_front(&self) -> Option<&Badge> {
        self.pending.front()
    }

    /// Remove the current celebration, making the next one the front
    pub fn dismiss_front(&mut self) -> Option<Badge> {
        let dismissed = self.pending.pop_front();
        if let Some(ref badge) = dismissed {
            tracing::debug!("Dismissed celebration for {}", badge.id);
        }
        dismissed
    }

    /// Badges waiting behind (and including) the front
    pub fn pending(&self) -> impl Iterator<Item = &Badge> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of distinct badges accepted over the queue's lifetime
    pub fn lifetime_count(&self) -> usize {
        self.seen.len()
    }
}
