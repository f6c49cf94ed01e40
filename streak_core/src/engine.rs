//! Session context tying the components together.
//!
//! `Tracker` owns the stats, the badge book, the celebration queue and the
//! notification scheduler. Every mutation goes through one pipeline:
//!
//! 1. Compute the next `UserStats`
//! 2. Evaluate badges against it
//! 3. Enqueue newly unlocked badges for celebration
//! 4. Dispatch milestone and badge notifications
//!
//! The whole pipeline runs inside one `&mut self` call, so no caller can
//! observe stats that have not been evaluated yet.

use crate::badges::{Badge, BadgeBook};
use crate::celebration::CelebrationQueue;
use crate::channel::NotificationPlatform;
use crate::scheduler::{NotificationScheduler, ScheduledReminder, TickReport};
use crate::settings::SettingsStore;
use crate::state::TrackerState;
use crate::stats::{apply_missed_day, apply_workout_completion};
use crate::workout::WorkoutSource;
use crate::{NotificationSettings, NotificationSettingsUpdate, Permission, Result, UserStats};
use chrono::NaiveDateTime;

/// What one pass through the pipeline produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub stats: UserStats,
    /// Badges unlocked by this mutation, in catalog order
    pub newly_unlocked: Vec<Badge>,
    /// Tags of the notifications actually shown
    pub dispatched: Vec<String>,
}

/// Per-user session context
pub struct Tracker<P: NotificationPlatform, S: SettingsStore> {
    stats: UserStats,
    badges: BadgeBook,
    celebrations: CelebrationQueue,
    scheduler: NotificationScheduler<P, S>,
}

impl<P: NotificationPlatform, S: SettingsStore> Tracker<P, S> {
    /// Start a session from persisted state
    pub fn new(
        state: TrackerState,
        mut badges: BadgeBook,
        mut scheduler: NotificationScheduler<P, S>,
    ) -> Self {
        badges.restore_unlocks(&state.unlocks);
        scheduler.restore_notified(state.notified_milestones);

        Self {
            stats: state.stats,
            badges,
            celebrations: state.celebrations,
            scheduler,
        }
    }

    /// Snapshot for persistence
    pub fn to_state(&self) -> TrackerState {
        TrackerState {
            stats: self.stats.clone(),
            unlocks: self.badges.unlocks(),
            celebrations: self.celebrations.clone(),
            notified_milestones: self.scheduler.notified_milestones().clone(),
        }
    }

    pub fn stats(&self) -> &UserStats {
        &self.stats
    }

    pub fn badges(&self) -> &BadgeBook {
        &self.badges
    }

    pub fn celebrations(&self) -> &CelebrationQueue {
        &self.celebrations
    }

    pub fn settings(&self) -> &NotificationSettings {
        self.scheduler.settings()
    }

    pub fn scheduler(&self) -> &NotificationScheduler<P, S> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut NotificationScheduler<P, S> {
        &mut self.scheduler
    }

    /// Badge currently being celebrated
    pub fn peek_celebration(&self) -> Option<&Badge> {
        self.celebrations.peek_front()
    }

    /// The consumer finished showing the front celebration
    pub fn dismiss_celebration(&mut self) -> Option<Badge> {
        self.celebrations.dismiss_front()
    }

    /// Record a completed workout dated `now`
    pub fn complete_workout(&mut self, now: NaiveDateTime) -> PipelineOutcome {
        let next = apply_workout_completion(&self.stats, now.date());
        self.commit(next, now)
    }

    /// Complete today's workout from `source`
    ///
    /// Returns `Ok(None)` without touching any state when there is no workout
    /// today or it has already been completed.
    pub fn complete_todays_workout<W: WorkoutSource>(
        &mut self,
        source: &mut W,
        now: NaiveDateTime,
    ) -> Result<Option<PipelineOutcome>> {
        let workout = match source.fetch_todays_workout(now.date())? {
            Some(workout) => workout,
            None => {
                tracing::info!("No workout scheduled for {}", now.date());
                return Ok(None);
            }
        };

        if workout.completed {
            tracing::info!("Workout '{}' already completed", workout.id);
            return Ok(None);
        }

        source.mark_complete(&workout.id)?;
        Ok(Some(self.complete_workout(now)))
    }

    /// The user missed a day: the streak drops to zero
    pub fn record_missed_day(&mut self, now: NaiveDateTime) -> PipelineOutcome {
        let next = apply_missed_day(&self.stats);
        self.commit(next, now)
    }

    /// Debug stimulus: set the streak directly
    pub fn test_streak_milestone(&mut self, streak: u32, now: NaiveDateTime) -> PipelineOutcome {
        let mut next = self.stats.clone();
        next.streak = streak;
        self.commit(next, now)
    }

    /// Debug stimulus: set the workout total directly
    pub fn test_workout_milestone(&mut self, total: u32, now: NaiveDateTime) -> PipelineOutcome {
        let mut next = self.stats.clone();
        next.total_workouts = total;
        self.commit(next, now)
    }

    pub fn request_permission(&mut self, now: NaiveDateTime) -> Permission {
        self.scheduler.request_permission(now)
    }

    pub fn update_notification_settings(
        &mut self,
        update: NotificationSettingsUpdate,
        now: NaiveDateTime,
    ) -> &NotificationSettings {
        self.scheduler.update_notification_settings(update, now)
    }

    pub fn schedule_daily_reminder(&mut self, now: NaiveDateTime) -> Option<ScheduledReminder> {
        self.scheduler.schedule_daily_reminder(now)
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        self.scheduler.tick(now)
    }

    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        self.scheduler.next_deadline()
    }

    /// Logout: back to first-login values
    ///
    /// Settings (including the permission answer) belong to the device and
    /// survive.
    pub fn reset(&mut self) {
        self.stats = UserStats::default();
        self.badges.clear_unlocks();
        self.celebrations = CelebrationQueue::new();
        self.scheduler.reset();
        tracing::info!("Tracker reset");
    }

    fn commit(&mut self, next: UserStats, now: NaiveDateTime) -> PipelineOutcome {
        let prev = std::mem::replace(&mut self.stats, next);

        let newly_unlocked = self.badges.evaluate(&self.stats, now);
        for badge in &newly_unlocked {
            if !self.celebrations.enqueue(badge.clone()) {
                tracing::debug!("Badge '{}' was already celebrated", badge.id);
            }
        }

        let mut dispatched = self.scheduler.on_stats_changed(&prev, &self.stats, now);
        dispatched.extend(self.scheduler.notify_badges(&newly_unlocked, now));

        tracing::debug!(
            "Stats now streak={} total={} level={} xp={}",
            self.stats.streak,
            self.stats.total_workouts,
            self.stats.level,
            self.stats.xp
        );

        PipelineOutcome {
            stats: self.stats.clone(),
            newly_unlocked,
            dispatched,
        }
    }
}
