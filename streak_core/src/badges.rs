//! Badge catalog and unlock evaluation.
//!
//! The catalog is a fixed, ordered list of badges. Evaluation walks it in
//! order, so badges unlocked by the same stats change are reported in
//! catalog order.

use crate::{Error, Result, UserStats};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Unlock predicate for a badge
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BadgeCondition {
    StreakAtLeast(u32),
    WorkoutsAtLeast(u32),
    LevelAtLeast(u32),
}

impl BadgeCondition {
    pub fn is_met(&self, stats: &UserStats) -> bool {
        match *self {
            BadgeCondition::StreakAtLeast(n) => stats.streak >= n,
            BadgeCondition::WorkoutsAtLeast(n) => stats.total_workouts >= n,
            BadgeCondition::LevelAtLeast(n) => stats.level >= n,
        }
    }

    fn threshold(&self) -> u32 {
        match *self {
            BadgeCondition::StreakAtLeast(n)
            | BadgeCondition::WorkoutsAtLeast(n)
            | BadgeCondition::LevelAtLeast(n) => n,
        }
    }
}

/// An achievement badge
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub condition: BadgeCondition,
    /// Set once on unlock, never changed afterwards
    pub unlocked_at: Option<NaiveDateTime>,
}

impl Badge {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        icon: &str,
        condition: BadgeCondition,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            icon: icon.into(),
            condition,
            unlocked_at: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked_at.is_some()
    }
}

/// Cached default catalog - built once and reused
static DEFAULT_BADGES: Lazy<Vec<Badge>> = Lazy::new(build_default_badges);

/// Get a fresh copy of the default badge catalog (all locked)
pub fn default_badges() -> Vec<Badge> {
    DEFAULT_BADGES.clone()
}

fn build_default_badges() -> Vec<Badge> {
    use BadgeCondition::*;

    vec![
        Badge::new(
            "first_workout",
            "First Step",
            "Complete your first workout",
            "👟",
            WorkoutsAtLeast(1),
        ),
        Badge::new(
            "streak_3",
            "Warming Up",
            "Work out 3 days in a row",
            "🔥",
            StreakAtLeast(3),
        ),
        Badge::new(
            "streak_7",
            "Week Warrior",
            "Work out 7 days in a row",
            "⚔️",
            StreakAtLeast(7),
        ),
        Badge::new(
            "workouts_10",
            "Double Digits",
            "Complete 10 workouts",
            "💪",
            WorkoutsAtLeast(10),
        ),
        Badge::new(
            "streak_14",
            "Fortnight Force",
            "Work out 14 days in a row",
            "🌗",
            StreakAtLeast(14),
        ),
        Badge::new(
            "workouts_25",
            "Quarter Century",
            "Complete 25 workouts",
            "🏅",
            WorkoutsAtLeast(25),
        ),
        Badge::new(
            "level_5",
            "Rising Star",
            "Reach level 5",
            "⭐",
            LevelAtLeast(5),
        ),
        Badge::new(
            "streak_30",
            "Habit Formed",
            "Work out 30 days in a row",
            "🗓️",
            StreakAtLeast(30),
        ),
        Badge::new(
            "workouts_50",
            "Half Century",
            "Complete 50 workouts",
            "🎯",
            WorkoutsAtLeast(50),
        ),
        Badge::new(
            "workouts_100",
            "Centurion",
            "Complete 100 workouts",
            "🏆",
            WorkoutsAtLeast(100),
        ),
    ]
}

/// Validate a badge catalog, returning every problem found
pub fn validate_catalog(badges: &[Badge]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for badge in badges {
        if badge.id.is_empty() {
            errors.push("Badge with empty id".to_string());
        }
        if !seen.insert(badge.id.as_str()) {
            errors.push(format!("Duplicate badge id '{}'", badge.id));
        }
        if badge.name.is_empty() {
            errors.push(format!("Badge '{}': empty name", badge.id));
        }
        if badge.condition.threshold() == 0 {
            errors.push(format!(
                "Badge '{}': zero threshold unlocks immediately",
                badge.id
            ));
        }
    }

    errors
}

/// Result of one evaluation pass
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// The full catalog with unlock marks applied
    pub updated_badges: Vec<Badge>,
    /// Badges unlocked by this pass, in catalog order
    pub newly_unlocked: Vec<Badge>,
}

/// Evaluate every locked badge against `stats`
///
/// Already-unlocked badges are skipped, so a second call with the same stats
/// returns no new unlocks.
pub fn evaluate(stats: &UserStats, badges: &[Badge], now: NaiveDateTime) -> Evaluation {
    let mut updated_badges = badges.to_vec();
    let newly_unlocked = unlock_met(&mut updated_badges, stats, now);
    Evaluation {
        updated_badges,
        newly_unlocked,
    }
}

fn unlock_met(badges: &mut [Badge], stats: &UserStats, now: NaiveDateTime) -> Vec<Badge> {
    let mut newly_unlocked = Vec::new();

    for badge in badges.iter_mut() {
        if badge.unlocked_at.is_none() && badge.condition.is_met(stats) {
            badge.unlocked_at = Some(now);
            tracing::info!("Badge unlocked: {} ({})", badge.name, badge.id);
            newly_unlocked.push(badge.clone());
        }
    }

    newly_unlocked
}

/// Session owner of the badge catalog
#[derive(Clone, Debug)]
pub struct BadgeBook {
    badges: Vec<Badge>,
}

impl BadgeBook {
    /// Build a book over a validated catalog
    pub fn new(badges: Vec<Badge>) -> Result<Self> {
        let errors = validate_catalog(&badges);
        if !errors.is_empty() {
            return Err(Error::Catalog(errors.join("; ")));
        }
        Ok(Self { badges })
    }

    /// Book over the default catalog, validated like any other
    pub fn with_defaults() -> Result<Self> {
        Self::new(default_badges())
    }

    /// Restore persisted unlock marks
    ///
    /// Ids not present in the catalog are ignored. Badges that are already
    /// unlocked keep their original timestamp.
    pub fn restore_unlocks(&mut self, unlocks: &BTreeMap<String, NaiveDateTime>) {
        for (id, at) in unlocks {
            match self.badges.iter_mut().find(|b| &b.id == id) {
                Some(badge) => {
                    if badge.unlocked_at.is_none() {
                        badge.unlocked_at = Some(*at);
                    }
                }
                None => tracing::warn!("Ignoring unlock for unknown badge '{}'", id),
            }
        }
    }

    /// Export unlock marks for persistence
    pub fn unlocks(&self) -> BTreeMap<String, NaiveDateTime> {
        self.badges
            .iter()
            .filter_map(|b| b.unlocked_at.map(|at| (b.id.clone(), at)))
            .collect()
    }

    /// Evaluate locked badges in place, returning the newly unlocked ones
    pub fn evaluate(&mut self, stats: &UserStats, now: NaiveDateTime) -> Vec<Badge> {
        unlock_met(&mut self.badges, stats, now)
    }

    pub fn badges(&self) -> &[Badge] {
        &self.badges
    }

    pub fn get(&self, id: &str) -> Option<&Badge> {
        self.badges.iter().find(|b| b.id == id)
    }

    pub fn unlocked(&self) -> impl Iterator<Item = &Badge> {
        self.badges.iter().filter(|b| b.is_unlocked())
    }

    pub fn locked(&self) -> impl Iterator<Item = &Badge> {
        self.badges.iter().filter(|b| !b.is_unlocked())
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    /// Clear every unlock mark (logout reset only)
    pub(crate) fn clear_unlocks(&mut self) {
        for badge in &mut self.badges {
            badge.unlocked_at = None;
        }
    }
}
