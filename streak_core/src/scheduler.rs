//! Notification scheduler.
//!
//! Owns [`NotificationSettings`], the single daily reminder and milestone
//! dispatch. Like the rest of the core it has no internal threads: the host
//! calls [`NotificationScheduler::tick`] and can sleep until
//! [`NotificationScheduler::next_deadline`] in between.
//!
//! ## Reminder state machine
//!
//! ```text
//! permission: Unrequested --request--> Granted | Denied
//! reminder:   active only while permission == Granted && enabled
//! ```
//!
//! Every (re)schedule cancels the previous reminder first, and a firing is
//! only honoured if it carries the id of the current reminder.

use crate::badges::Badge;
use crate::channel::{NotificationChannel, NotificationPlatform};
use crate::settings::SettingsStore;
use crate::{
    Notification, NotificationSettings, NotificationSettingsUpdate, Permission, ReminderTime,
    UserStats,
};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Tag shared by every daily reminder, so a stale one is replaced
pub const DAILY_REMINDER_TAG: &str = "daily-workout-reminder";

/// Streak values that trigger a milestone notification
pub const STREAK_MILESTONES: [u32; 7] = [3, 7, 14, 30, 50, 100, 365];

/// Workout totals that trigger a milestone notification
pub const WORKOUT_MILESTONES: [u32; 7] = [1, 10, 25, 50, 100, 250, 500];

pub fn streak_milestone_tag(streak: u32) -> String {
    format!("streak-milestone-{}", streak)
}

pub fn workout_milestone_tag(total: u32) -> String {
    format!("workout-milestone-{}", total)
}

pub fn badge_unlocked_tag(badge_id: &str) -> String {
    format!("badge-unlocked-{}", badge_id)
}

/// Next occurrence of `time` strictly after `now`
///
/// A time that has already passed today (or is exactly now) rolls to
/// tomorrow, so the resulting delay is always positive.
pub fn next_occurrence(now: NaiveDateTime, time: ReminderTime) -> NaiveDateTime {
    let today = now.date().and_time(time.as_naive_time());
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Handle to the pending daily reminder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduledReminder {
    id: Uuid,
    fire_at: NaiveDateTime,
}

impl ScheduledReminder {
    fn at(fire_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            fire_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn fire_at(&self) -> NaiveDateTime {
        self.fire_at
    }
}

/// What a call to [`NotificationScheduler::tick`] did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reminder_fired: bool,
    pub retracted: usize,
}

/// Permission lifecycle, daily reminder and milestone dispatch
pub struct NotificationScheduler<P: NotificationPlatform, S: SettingsStore> {
    channel: NotificationChannel<P>,
    store: S,
    settings: NotificationSettings,
    reminder: Option<ScheduledReminder>,
    /// Milestone tags already dispatched
    notified: BTreeSet<String>,
}

impl<P: NotificationPlatform, S: SettingsStore> NotificationScheduler<P, S> {
    /// Create a scheduler, loading settings from `store`
    ///
    /// Missing or unreadable settings fall back to `defaults`. When the
    /// platform knows a definite permission that differs from the stored
    /// one (granted or revoked outside the app), the platform wins.
    pub fn new(channel: NotificationChannel<P>, store: S, defaults: NotificationSettings) -> Self {
        let settings = match store.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => defaults,
            Err(e) => {
                tracing::warn!("Failed to load notification settings: {}. Using defaults.", e);
                defaults
            }
        };

        let mut scheduler = Self {
            channel,
            store,
            settings,
            reminder: None,
            notified: BTreeSet::new(),
        };

        if scheduler.channel.is_supported() {
            let platform = scheduler.channel.permission();
            if platform != scheduler.settings.permission {
                tracing::info!(
                    "Platform permission is {}, stored was {}; adopting platform value",
                    platform,
                    scheduler.settings.permission
                );
                scheduler.settings.permission = platform;
                scheduler.persist();
            }
        }

        scheduler
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn active_reminder(&self) -> Option<&ScheduledReminder> {
        self.reminder.as_ref()
    }

    pub fn channel(&self) -> &NotificationChannel<P> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut NotificationChannel<P> {
        &mut self.channel
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notified_milestones(&self) -> &BTreeSet<String> {
        &self.notified
    }

    /// Seed the milestone dedup table from persisted state
    pub fn restore_notified(&mut self, notified: BTreeSet<String>) {
        self.notified = notified;
    }

    /// Ask the user for notification permission
    ///
    /// Never fails: refusal, unsupported platforms and platform errors all
    /// resolve to `Denied`. A grant while reminders are enabled schedules the
    /// daily reminder right away.
    pub fn request_permission(&mut self, now: NaiveDateTime) -> Permission {
        let outcome = self.channel.request_permission();

        if outcome != self.settings.permission {
            tracing::info!(
                "Notification permission {} -> {}",
                self.settings.permission,
                outcome
            );
            self.settings.permission = outcome;
            self.persist();
        }

        if self.settings.reminders_eligible() {
            self.schedule_daily_reminder(now);
        } else {
            self.cancel_reminder();
        }

        outcome
    }

    /// Merge a partial settings change and persist it
    ///
    /// A change to `time` or `enabled` always cancels the pending reminder and
    /// recreates it when still eligible.
    pub fn update_notification_settings(
        &mut self,
        update: NotificationSettingsUpdate,
        now: NaiveDateTime,
    ) -> &NotificationSettings {
        let mut reschedule = false;

        if let Some(enabled) = update.enabled {
            reschedule |= enabled != self.settings.enabled;
            self.settings.enabled = enabled;
        }
        if let Some(time) = update.time {
            reschedule |= time != self.settings.time;
            self.settings.time = time;
        }

        self.persist();

        if reschedule {
            self.cancel_reminder();
            if self.settings.reminders_eligible() {
                self.schedule_daily_reminder(now);
            }
        }

        &self.settings
    }

    /// Schedule the daily reminder at the next occurrence of the configured time
    ///
    /// Replaces any pending reminder. Returns `None`, with no reminder left
    /// pending, unless permission is granted and reminders are enabled.
    pub fn schedule_daily_reminder(&mut self, now: NaiveDateTime) -> Option<ScheduledReminder> {
        if !self.settings.reminders_eligible() {
            tracing::debug!(
                "Daily reminder not scheduled (enabled: {}, permission: {})",
                self.settings.enabled,
                self.settings.permission
            );
            self.cancel_reminder();
            return None;
        }

        self.cancel_reminder();
        let reminder = ScheduledReminder::at(next_occurrence(now, self.settings.time));
        tracing::info!("Daily reminder scheduled for {}", reminder.fire_at);
        self.reminder = Some(reminder);
        Some(reminder)
    }

    /// Cancel the pending reminder, if any
    pub fn cancel_reminder(&mut self) -> Option<ScheduledReminder> {
        let cancelled = self.reminder.take();
        if let Some(ref reminder) = cancelled {
            tracing::debug!("Cancelled daily reminder for {}", reminder.fire_at);
        }
        cancelled
    }

    /// Handle a reminder timer firing
    ///
    /// A firing for anything but the current reminder is stale and ignored.
    /// Otherwise the reminder notification is dispatched and the next day's
    /// reminder takes its place.
    pub fn fire_reminder(&mut self, id: Uuid, now: NaiveDateTime) -> bool {
        let current = match self.reminder {
            Some(reminder) if reminder.id == id => reminder,
            _ => {
                tracing::debug!("Ignoring stale reminder firing {}", id);
                return false;
            }
        };

        self.channel.dispatch(&reminder_notification(), now);

        let next = ScheduledReminder::at(next_occurrence(
            now.max(current.fire_at),
            self.settings.time,
        ));
        tracing::info!("Daily reminder fired; next one at {}", next.fire_at);
        self.reminder = Some(next);
        true
    }

    /// Drive timers: fire a due reminder and retract expired notifications
    pub fn tick(&mut self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        if let Some(reminder) = self.reminder {
            if reminder.fire_at <= now {
                report.reminder_fired = self.fire_reminder(reminder.id, now);
            }
        }
        report.retracted = self.channel.retract_expired(now);

        report
    }

    /// Earliest moment at which [`Self::tick`] has work to do
    pub fn next_deadline(&self) -> Option<NaiveDateTime> {
        let reminder = self.reminder.map(|r| r.fire_at);
        match (reminder, self.channel.next_retract_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Dispatch milestone notifications for a stats change
    ///
    /// Edge-triggered: the streak milestone fires only when the streak moves
    /// onto a milestone value, the workout milestone only when the total
    /// crosses one (highest crossed wins). Returns the dispatched tags.
    pub fn on_stats_changed(
        &mut self,
        prev: &UserStats,
        next: &UserStats,
        now: NaiveDateTime,
    ) -> Vec<String> {
        let mut dispatched = Vec::new();

        if next.streak < prev.streak {
            for milestone in STREAK_MILESTONES.iter().filter(|&&m| m > next.streak) {
                self.notified.remove(&streak_milestone_tag(*milestone));
            }
        }

        if next.streak != prev.streak && STREAK_MILESTONES.contains(&next.streak) {
            let notification = streak_notification(next.streak);
            if self.notify_milestone(&notification, now) {
                dispatched.push(notification.tag);
            }
        }

        let crossed = WORKOUT_MILESTONES
            .iter()
            .rev()
            .find(|&&m| prev.total_workouts < m && m <= next.total_workouts);
        if let Some(&milestone) = crossed {
            let notification = workout_notification(milestone);
            if self.notify_milestone(&notification, now) {
                dispatched.push(notification.tag);
            }
        }

        dispatched
    }

    /// Dispatch one "badge unlocked" notification per newly unlocked badge
    pub fn notify_badges(&mut self, newly_unlocked: &[Badge], now: NaiveDateTime) -> Vec<String> {
        newly_unlocked
            .iter()
            .map(badge_notification)
            .filter_map(|notification| {
                self.channel
                    .dispatch(&notification, now)
                    .map(|_| notification.tag)
            })
            .collect()
    }

    /// Logout: drop the pending reminder and the milestone dedup table
    pub fn reset(&mut self) {
        self.cancel_reminder();
        self.notified.clear();
    }

    fn notify_milestone(&mut self, notification: &Notification, now: NaiveDateTime) -> bool {
        if self.notified.contains(&notification.tag) {
            tracing::debug!("Milestone '{}' already notified", notification.tag);
            return false;
        }

        match self.channel.dispatch(notification, now) {
            Some(_) => {
                self.notified.insert(notification.tag.clone());
                true
            }
            None => false,
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.settings) {
            tracing::warn!("Failed to persist notification settings: {}", e);
        }
    }
}

fn reminder_notification() -> Notification {
    Notification {
        title: "Time to work out! 💪".into(),
        body: "Your workout for today is waiting. Keep your streak alive!".into(),
        tag: DAILY_REMINDER_TAG.into(),
        require_interaction: true,
    }
}

fn streak_notification(streak: u32) -> Notification {
    Notification {
        title: format!("🔥 {}-Day Streak!", streak),
        body: format!("You've worked out {} days in a row. Keep it going!", streak),
        tag: streak_milestone_tag(streak),
        require_interaction: false,
    }
}

fn workout_notification(total: u32) -> Notification {
    let title = if total == 1 {
        "🎉 First Workout Complete!".to_string()
    } else {
        format!("🎉 {} Workouts Complete!", total)
    };
    Notification {
        title,
        body: format!("That's {} workouts logged. Nice work!", total),
        tag: workout_milestone_tag(total),
        require_interaction: false,
    }
}

fn badge_notification(badge: &Badge) -> Notification {
    Notification {
        title: format!("{} Badge Unlocked: {}", badge.icon, badge.name),
        body: badge.description.clone(),
        tag: badge_unlocked_tag(&badge.id),
        require_interaction: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingPlatform;
    use crate::settings::MemorySettingsStore;
    use crate::{Error, Result};
    use chrono::NaiveDate;

    type TestScheduler = NotificationScheduler<RecordingPlatform, MemorySettingsStore>;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn time(s: &str) -> ReminderTime {
        s.parse().unwrap()
    }

    fn scheduler(platform: RecordingPlatform) -> TestScheduler {
        NotificationScheduler::new(
            NotificationChannel::new(platform),
            MemorySettingsStore::new(),
            NotificationSettings::default(),
        )
    }

    fn granted() -> TestScheduler {
        scheduler(RecordingPlatform::granted())
    }

    fn stats(streak: u32, total: u32) -> UserStats {
        UserStats {
            streak,
            total_workouts: total,
            ..UserStats::default()
        }
    }

    fn count(s: &TestScheduler, tag: &str) -> usize {
        s.channel().platform().count_tag(tag)
    }

    #[test]
    fn test_next_occurrence_later_today() {
        assert_eq!(next_occurrence(at(7, 0), time("19:00")), at(19, 0));
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        assert_eq!(
            next_occurrence(at(20, 0), time("19:00")),
            at(19, 0) + Duration::days(1)
        );
        // Exactly now is not in the future
        assert_eq!(
            next_occurrence(at(19, 0), time("19:00")),
            at(19, 0) + Duration::days(1)
        );
    }

    #[test]
    fn test_schedule_creates_single_reminder() {
        let mut s = granted();
        let first = s.schedule_daily_reminder(at(7, 0)).unwrap();
        let second = s.schedule_daily_reminder(at(7, 0)).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(s.active_reminder(), Some(&second));
        assert_eq!(second.fire_at(), at(19, 0));
    }

    #[test]
    fn test_denied_permission_blocks_reminders() {
        let mut s = scheduler(RecordingPlatform::unrequested(Permission::Denied));
        assert_eq!(s.request_permission(at(7, 0)), Permission::Denied);
        assert_eq!(s.settings().permission, Permission::Denied);

        assert!(s.schedule_daily_reminder(at(7, 0)).is_none());
        assert!(s.active_reminder().is_none());

        s.update_notification_settings(NotificationSettingsUpdate::enabled(false), at(7, 0));
        s.update_notification_settings(NotificationSettingsUpdate::enabled(true), at(7, 0));
        assert!(s.active_reminder().is_none());
    }

    #[test]
    fn test_grant_schedules_reminder() {
        let mut s = scheduler(RecordingPlatform::unrequested(Permission::Granted));
        assert!(s.active_reminder().is_none());

        assert_eq!(s.request_permission(at(7, 0)), Permission::Granted);
        assert_eq!(s.active_reminder().unwrap().fire_at(), at(19, 0));
        assert_eq!(
            s.store().stored().unwrap().permission,
            Permission::Granted
        );

        // Asking again does not prompt again
        s.request_permission(at(7, 0));
        assert_eq!(s.channel().platform().prompts, 1);
    }

    #[test]
    fn test_grant_while_disabled_does_not_schedule() {
        let mut s = scheduler(RecordingPlatform::unrequested(Permission::Granted));
        s.update_notification_settings(NotificationSettingsUpdate::enabled(false), at(7, 0));
        s.request_permission(at(7, 0));
        assert!(s.active_reminder().is_none());
    }

    #[test]
    fn test_two_time_changes_fire_once_at_second_time() {
        let mut s = granted();
        s.schedule_daily_reminder(at(7, 0));
        s.update_notification_settings(NotificationSettingsUpdate::time(time("08:00")), at(7, 0));
        s.update_notification_settings(NotificationSettingsUpdate::time(time("09:00")), at(7, 0));

        assert!(!s.tick(at(8, 0)).reminder_fired);
        assert_eq!(count(&s, DAILY_REMINDER_TAG), 0);

        assert!(s.tick(at(9, 0)).reminder_fired);
        assert_eq!(count(&s, DAILY_REMINDER_TAG), 1);

        // Rescheduled for tomorrow, not again today
        assert!(!s.tick(at(9, 30)).reminder_fired);
        assert_eq!(
            s.active_reminder().unwrap().fire_at(),
            at(9, 0) + Duration::days(1)
        );
    }

    #[test]
    fn test_stale_firing_is_noop() {
        let mut s = granted();
        let stale = s.schedule_daily_reminder(at(7, 0)).unwrap();
        s.update_notification_settings(NotificationSettingsUpdate::time(time("20:00")), at(7, 0));

        assert!(!s.fire_reminder(stale.id(), at(19, 0)));
        assert_eq!(count(&s, DAILY_REMINDER_TAG), 0);
        assert_eq!(s.active_reminder().unwrap().fire_at(), at(20, 0));
    }

    #[test]
    fn test_reminder_requires_interaction_and_renews() {
        let mut s = granted();
        let reminder = s.schedule_daily_reminder(at(7, 0)).unwrap();
        assert!(s.fire_reminder(reminder.id(), at(19, 0)));

        let (_, shown) = &s.channel().platform().shown[0];
        assert_eq!(shown.tag, DAILY_REMINDER_TAG);
        assert!(shown.require_interaction);

        let next = *s.active_reminder().unwrap();
        assert_ne!(next.id(), reminder.id());
        assert_eq!(next.fire_at(), at(19, 0) + Duration::days(1));

        // The old handle is now stale
        assert!(!s.fire_reminder(reminder.id(), at(19, 1)));

        // Next day's reminder replaces the old visible one
        assert!(s.tick(next.fire_at()).reminder_fired);
        assert_eq!(s.channel().visible_tags(), vec![DAILY_REMINDER_TAG]);
        assert_eq!(s.channel().platform().closed.len(), 1);
    }

    #[test]
    fn test_disable_cancels_reminder() {
        let mut s = granted();
        s.schedule_daily_reminder(at(7, 0));
        s.update_notification_settings(NotificationSettingsUpdate::enabled(false), at(7, 0));
        assert!(s.active_reminder().is_none());
        assert!(!s.tick(at(19, 0)).reminder_fired);

        s.update_notification_settings(NotificationSettingsUpdate::enabled(true), at(7, 0));
        assert_eq!(s.active_reminder().unwrap().fire_at(), at(19, 0));
    }

    #[test]
    fn test_settings_persisted_on_every_update() {
        let mut s = granted();
        let before = s.store().saves();
        s.update_notification_settings(NotificationSettingsUpdate::default(), at(7, 0));
        s.update_notification_settings(NotificationSettingsUpdate::time(time("06:30")), at(7, 0));
        assert_eq!(s.store().saves(), before + 2);
        assert_eq!(s.store().stored().unwrap().time, time("06:30"));
    }

    #[test]
    fn test_next_deadline_includes_retractions() {
        let mut s = granted();
        assert!(s.next_deadline().is_none());

        s.schedule_daily_reminder(at(7, 0));
        assert_eq!(s.next_deadline(), Some(at(19, 0)));

        s.on_stats_changed(&stats(2, 2), &stats(3, 3), at(7, 0));
        assert_eq!(s.next_deadline(), Some(at(7, 0) + Duration::seconds(5)));

        assert_eq!(s.tick(at(7, 0) + Duration::seconds(5)).retracted, 1);
        assert_eq!(s.next_deadline(), Some(at(19, 0)));
    }

    #[test]
    fn test_streak_milestone_edge_triggered() {
        let mut s = granted();
        let tag = streak_milestone_tag(7);

        assert_eq!(s.on_stats_changed(&stats(6, 6), &stats(7, 7), at(7, 0)), vec![tag.clone()]);
        assert!(s.on_stats_changed(&stats(7, 7), &stats(7, 7), at(7, 0)).is_empty());
        assert!(s.on_stats_changed(&stats(7, 7), &stats(7, 8), at(7, 0)).is_empty());
        assert_eq!(count(&s, &tag), 1);
    }

    #[test]
    fn test_streak_milestone_dedup_until_streak_drops() {
        let mut s = granted();
        let tag = streak_milestone_tag(7);
        s.on_stats_changed(&stats(6, 6), &stats(7, 7), at(7, 0));

        // Moving down onto 7 again does not re-notify
        s.on_stats_changed(&stats(7, 7), &stats(8, 8), at(7, 0));
        s.on_stats_changed(&stats(8, 8), &stats(7, 8), at(7, 0));
        assert_eq!(count(&s, &tag), 1);

        // A rebuilt streak earns the milestone again
        s.on_stats_changed(&stats(7, 8), &stats(0, 8), at(7, 0));
        s.on_stats_changed(&stats(6, 14), &stats(7, 15), at(7, 0));
        assert_eq!(count(&s, &tag), 2);
    }

    #[test]
    fn test_workout_milestone_highest_crossed() {
        let mut s = granted();
        let dispatched = s.on_stats_changed(&stats(0, 0), &stats(0, 30), at(7, 0));
        assert_eq!(dispatched, vec![workout_milestone_tag(25)]);

        assert!(s.on_stats_changed(&stats(0, 30), &stats(0, 31), at(7, 0)).is_empty());
        assert_eq!(
            s.on_stats_changed(&stats(0, 49), &stats(0, 50), at(7, 0)),
            vec![workout_milestone_tag(50)]
        );
    }

    #[test]
    fn test_milestones_skipped_without_permission() {
        let mut s = scheduler(RecordingPlatform::unrequested(Permission::Denied));
        assert!(s.on_stats_changed(&stats(6, 0), &stats(7, 1), at(7, 0)).is_empty());
        assert!(s.notified_milestones().is_empty());
        assert!(s.channel().platform().shown.is_empty());
    }

    #[test]
    fn test_badge_notifications_once_per_badge() {
        let mut s = granted();
        let badges = crate::badges::default_badges();
        let tags = s.notify_badges(&badges[..2], at(7, 0));
        assert_eq!(
            tags,
            vec![
                badge_unlocked_tag("first_workout"),
                badge_unlocked_tag("streak_3")
            ]
        );
        assert!(s.notify_badges(&[], at(7, 0)).is_empty());
    }

    #[test]
    fn test_platform_permission_wins_at_startup() {
        let store = MemorySettingsStore::with(NotificationSettings::default());
        let s = NotificationScheduler::new(
            NotificationChannel::new(RecordingPlatform::granted()),
            store,
            NotificationSettings::default(),
        );
        assert_eq!(s.settings().permission, Permission::Granted);
        assert_eq!(s.store().saves(), 1);
    }

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn load(&self) -> Result<Option<NotificationSettings>> {
            Err(Error::Settings("disk on fire".into()))
        }

        fn save(&mut self, _settings: &NotificationSettings) -> Result<()> {
            Err(Error::Settings("disk on fire".into()))
        }
    }

    #[test]
    fn test_store_failures_degrade_to_defaults() {
        let defaults = NotificationSettings {
            time: time("07:15"),
            ..NotificationSettings::default()
        };
        let mut s = NotificationScheduler::new(
            NotificationChannel::new(RecordingPlatform::granted()),
            BrokenStore,
            defaults,
        );
        assert_eq!(s.settings().time, time("07:15"));

        s.update_notification_settings(NotificationSettingsUpdate::time(time("07:30")), at(7, 0));
        assert_eq!(s.settings().time, time("07:30"));
        assert_eq!(s.active_reminder().unwrap().fire_at(), at(7, 30));
    }

    #[test]
    fn test_reset_clears_reminder_and_dedup() {
        let mut s = granted();
        s.schedule_daily_reminder(at(7, 0));
        s.on_stats_changed(&stats(6, 6), &stats(7, 7), at(7, 0));
        assert!(!s.notified_milestones().is_empty());

        s.reset();
        assert!(s.active_reminder().is_none());
        assert!(s.notified_milestones().is_empty());
    }
}
