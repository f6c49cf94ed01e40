//! Stats and streak tracking.
//!
//! Every function here is a pure transformation over [`UserStats`]:
//! - Workout completions bump totals, streak and XP
//! - Levels are derived from XP through a fixed threshold table
//! - A missed day resets the streak

use crate::UserStats;
use chrono::NaiveDate;

/// XP awarded for each completed workout
pub const XP_PER_WORKOUT: u32 = 50;

/// Minimum XP for levels 1 through 6
pub const LEVEL_THRESHOLDS: [u32; 6] = [0, 100, 250, 450, 700, 1000];

/// XP needed for each level past the end of [`LEVEL_THRESHOLDS`]
pub const XP_PER_LEVEL_BEYOND: u32 = 500;

/// Compute the level for a given XP total
///
/// Total and monotonic: more XP never yields a lower level, and there is no
/// level cap.
pub fn level_for_xp(xp: u32) -> u32 {
    let last = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1];
    if xp >= last {
        return LEVEL_THRESHOLDS.len() as u32 + (xp - last) / XP_PER_LEVEL_BEYOND;
    }

    LEVEL_THRESHOLDS
        .iter()
        .take_while(|&&threshold| threshold <= xp)
        .count() as u32
}

/// Minimum XP required to reach `level`
pub fn xp_for_level(level: u32) -> u32 {
    let level = level.max(1) as usize;
    if level <= LEVEL_THRESHOLDS.len() {
        return LEVEL_THRESHOLDS[level - 1];
    }

    let last = LEVEL_THRESHOLDS[LEVEL_THRESHOLDS.len() - 1];
    let extra = (level - LEVEL_THRESHOLDS.len()) as u32;
    last.saturating_add(extra.saturating_mul(XP_PER_LEVEL_BEYOND))
}

/// Progress within the current level as `(xp_into_level, xp_span_of_level)`
pub fn level_progress(xp: u32) -> (u32, u32) {
    let level = level_for_xp(xp);
    let floor = xp_for_level(level);
    let ceiling = xp_for_level(level + 1);
    (xp - floor, ceiling - floor)
}

/// Apply one completed workout on calendar day `on`
///
/// Streak rules:
/// 1. First ever completion → streak 1
/// 2. Last completion was the previous day → streak + 1
/// 3. Already completed that day (or an earlier day) → streak unchanged
/// 4. Any gap → streak restarts at 1
pub fn apply_workout_completion(stats: &UserStats, on: NaiveDate) -> UserStats {
    let (streak, last_workout_on) = match stats.last_workout_on {
        None => (1, on),
        Some(last) if last.succ_opt() == Some(on) => (stats.streak.saturating_add(1), on),
        Some(last) if on <= last => (stats.streak.max(1), last),
        Some(_) => (1, on),
    };

    let xp = stats.xp.saturating_add(XP_PER_WORKOUT);
    let next = UserStats {
        streak,
        total_workouts: stats.total_workouts.saturating_add(1),
        level: level_for_xp(xp).max(stats.level),
        xp,
        last_workout_on: Some(last_workout_on),
    };

    tracing::debug!(
        "Workout completion on {}: streak {} -> {}, total {}, level {}",
        on,
        stats.streak,
        next.streak,
        next.total_workouts,
        next.level
    );

    next
}

/// Apply an explicit missed-day event (streak back to zero)
pub fn apply_missed_day(stats: &UserStats) -> UserStats {
    tracing::debug!("Missed day: streak {} -> 0", stats.streak);
    UserStats {
        streak: 0,
        ..stats.clone()
    }
}
