//! Notification channel adapter.
//!
//! Wraps a [`NotificationPlatform`] and is the only place platform failures
//! are seen. Everything above this module gets `Option`/`Permission` answers
//! and never an error.
//!
//! The adapter also owns two rules the platform may or may not implement:
//! - Tag dedup: a new notification closes any visible one with the same tag
//! - Auto-retract: non-interactive notifications are closed after
//!   [`AUTO_RETRACT_AFTER_SECS`] seconds

use crate::{Notification, NotificationHandle, Permission, Result};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// Lifetime in seconds of a notification shown without `require_interaction`
pub const AUTO_RETRACT_AFTER_SECS: i64 = 5;

/// External notification capability
pub trait NotificationPlatform {
    /// Whether notifications exist at all in this environment
    fn is_supported(&self) -> bool;

    /// Current permission as known to the platform
    fn permission(&self) -> Permission;

    /// Ask the user for permission, blocking until they answer
    fn request_permission(&mut self) -> Result<Permission>;

    /// Present a notification under the given handle at host time `at`
    fn show(
        &mut self,
        handle: NotificationHandle,
        notification: &Notification,
        at: NaiveDateTime,
    ) -> Result<()>;

    /// Retract a previously shown notification
    fn close(&mut self, handle: NotificationHandle, at: NaiveDateTime) -> Result<()>;
}

/// A notification shown earlier and not closed since
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShownNotification {
    pub handle: NotificationHandle,
    pub notification: Notification,
    pub shown_at: NaiveDateTime,
}

#[derive(Clone, Debug)]
struct Visible {
    handle: NotificationHandle,
    retract_at: Option<NaiveDateTime>,
}

/// Permission-gated, failure-absorbing front for a platform
pub struct NotificationChannel<P: NotificationPlatform> {
    platform: P,
    visible: HashMap<String, Visible>,
}

impl<P: NotificationPlatform> NotificationChannel<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            visible: HashMap::new(),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    /// Current permission; an unsupported environment reports `Denied`
    pub fn permission(&self) -> Permission {
        if !self.platform.is_supported() {
            return Permission::Denied;
        }
        self.platform.permission()
    }

    /// Ask for permission, resolving to `Granted` or `Denied`
    ///
    /// The prompt is only shown while the permission is still unrequested;
    /// any failure counts as `Denied`.
    pub fn request_permission(&mut self) -> Permission {
        if !self.platform.is_supported() {
            tracing::debug!("Notifications unsupported, permission request skipped");
            return Permission::Denied;
        }

        let current = self.platform.permission();
        if current != Permission::Unrequested {
            tracing::debug!("Permission already resolved as {}, not prompting", current);
            return current;
        }

        match self.platform.request_permission() {
            Ok(Permission::Granted) => Permission::Granted,
            Ok(_) => Permission::Denied,
            Err(e) => {
                tracing::warn!("Permission request failed: {}. Treating as denied.", e);
                Permission::Denied
            }
        }
    }

    /// Show a notification, replacing any visible one with the same tag
    ///
    /// Returns `None` when notifications are unsupported, not granted, or the
    /// platform fails to show it.
    pub fn dispatch(
        &mut self,
        notification: &Notification,
        now: NaiveDateTime,
    ) -> Option<NotificationHandle> {
        if !self.platform.is_supported() {
            tracing::debug!("Notifications unsupported, skipping '{}'", notification.tag);
            return None;
        }
        if self.platform.permission() != Permission::Granted {
            tracing::debug!("Permission not granted, skipping '{}'", notification.tag);
            return None;
        }

        if let Some(previous) = self.visible.remove(&notification.tag) {
            tracing::debug!("Replacing visible notification '{}'", notification.tag);
            self.close_quietly(previous.handle, now);
        }

        let handle = NotificationHandle::new();
        if let Err(e) = self.platform.show(handle, notification, now) {
            tracing::warn!("Failed to show notification '{}': {}", notification.tag, e);
            return None;
        }

        let retract_at = retract_deadline(notification, now);
        self.visible.insert(
            notification.tag.clone(),
            Visible { handle, retract_at },
        );

        tracing::info!("Notification shown: {}", notification.tag);
        Some(handle)
    }

    /// Take over notifications left on screen by an earlier session
    ///
    /// Entries are applied in the order given. A later entry with a tag
    /// already present replaces (and closes) the earlier one. Deadlines are
    /// `shown_at` based, so anything already past due goes on the next
    /// [`Self::retract_expired`].
    pub fn restore_visible<I>(&mut self, shown: I, now: NaiveDateTime) -> usize
    where
        I: IntoIterator<Item = ShownNotification>,
    {
        let mut restored = 0;
        for entry in shown {
            let tag = entry.notification.tag.clone();
            let visible = Visible {
                handle: entry.handle,
                retract_at: retract_deadline(&entry.notification, entry.shown_at),
            };
            if let Some(previous) = self.visible.insert(tag.clone(), visible) {
                tracing::debug!("Closing duplicate visible notification '{}'", tag);
                self.close_quietly(previous.handle, now);
            } else {
                restored += 1;
            }
        }
        tracing::debug!("Restored {} visible notification(s)", restored);
        restored
    }

    /// User closed the notification with this tag
    pub fn dismiss(&mut self, tag: &str, now: NaiveDateTime) -> bool {
        match self.visible.remove(tag) {
            Some(visible) => {
                self.close_quietly(visible.handle, now);
                true
            }
            None => false,
        }
    }

    /// Close every auto-retracting notification whose deadline has passed
    pub fn retract_expired(&mut self, now: NaiveDateTime) -> usize {
        let expired: Vec<String> = self
            .visible
            .iter()
            .filter(|(_, v)| v.retract_at.is_some_and(|at| at <= now))
            .map(|(tag, _)| tag.clone())
            .collect();

        for tag in &expired {
            if let Some(visible) = self.visible.remove(tag) {
                tracing::debug!("Auto-retracting notification '{}'", tag);
                self.close_quietly(visible.handle, now);
            }
        }

        expired.len()
    }

    /// Earliest pending auto-retract deadline
    pub fn next_retract_at(&self) -> Option<NaiveDateTime> {
        self.visible.values().filter_map(|v| v.retract_at).min()
    }

    /// Tag of every notification currently visible
    pub fn visible_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.visible.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn is_visible(&self, tag: &str) -> bool {
        self.visible.contains_key(tag)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn close_quietly(&mut self, handle: NotificationHandle, at: NaiveDateTime) {
        if let Err(e) = self.platform.close(handle, at) {
            tracing::warn!("Failed to close notification {}: {}", handle, e);
        }
    }
}

fn retract_deadline(notification: &Notification, shown_at: NaiveDateTime) -> Option<NaiveDateTime> {
    if notification.require_interaction {
        None
    } else {
        Some(shown_at + Duration::seconds(AUTO_RETRACT_AFTER_SECS))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPlatform;
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn note(tag: &str, require_interaction: bool) -> Notification {
        Notification {
            title: "Title".into(),
            body: "Body".into(),
            tag: tag.into(),
            require_interaction,
        }
    }

    #[test]
    fn test_dispatch_when_granted() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let handle = channel.dispatch(&note("a", false), now());
        assert!(handle.is_some());
        assert_eq!(channel.platform().shown.len(), 1);
        assert!(channel.is_visible("a"));
    }

    #[test]
    fn test_dispatch_skipped_without_permission() {
        let mut channel =
            NotificationChannel::new(RecordingPlatform::unrequested(Permission::Granted));
        assert!(channel.dispatch(&note("a", false), now()).is_none());
        assert!(channel.platform().shown.is_empty());
    }

    #[test]
    fn test_unsupported_degrades_silently() {
        let mut channel = NotificationChannel::new(RecordingPlatform::unsupported());
        assert!(!channel.is_supported());
        assert_eq!(channel.permission(), Permission::Denied);
        assert_eq!(channel.request_permission(), Permission::Denied);
        assert!(channel.dispatch(&note("a", true), now()).is_none());
        assert_eq!(channel.platform().prompts, 0);
    }

    #[test]
    fn test_same_tag_replaces_visible() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let first = channel.dispatch(&note("a", true), now()).unwrap();
        let second = channel.dispatch(&note("a", true), now()).unwrap();

        assert_ne!(first, second);
        assert_eq!(channel.platform().closed, vec![first]);
        assert_eq!(channel.visible_tags(), vec!["a"]);
    }

    #[test]
    fn test_auto_retract_after_five_seconds() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let handle = channel.dispatch(&note("milestone", false), now()).unwrap();
        channel.dispatch(&note("reminder", true), now());

        assert_eq!(channel.next_retract_at(), Some(now() + Duration::seconds(5)));
        assert_eq!(channel.retract_expired(now() + Duration::seconds(4)), 0);
        assert_eq!(channel.retract_expired(now() + Duration::seconds(5)), 1);

        assert_eq!(channel.platform().closed, vec![handle]);
        assert_eq!(channel.visible_tags(), vec!["reminder"]);
        assert_eq!(channel.next_retract_at(), None);

        // Interactive notifications stay until dismissed
        assert_eq!(channel.retract_expired(now() + Duration::days(1)), 0);
        assert!(channel.dismiss("reminder", now()));
        assert!(!channel.dismiss("reminder", now()));
    }

    #[test]
    fn test_restore_visible_resumes_retract_deadline() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let milestone = NotificationHandle::new();
        let reminder = NotificationHandle::new();
        let restored = channel.restore_visible(
            vec![
                ShownNotification {
                    handle: milestone,
                    notification: note("milestone", false),
                    shown_at: now(),
                },
                ShownNotification {
                    handle: reminder,
                    notification: note("reminder", true),
                    shown_at: now(),
                },
            ],
            now() + Duration::seconds(1),
        );

        assert_eq!(restored, 2);
        assert!(channel.platform().shown.is_empty());
        assert_eq!(channel.next_retract_at(), Some(now() + Duration::seconds(5)));

        // Already past due by the time the next session looks
        assert_eq!(channel.retract_expired(now() + Duration::minutes(10)), 1);
        assert_eq!(channel.platform().closed, vec![milestone]);
        assert_eq!(channel.visible_tags(), vec!["reminder"]);
    }

    #[test]
    fn test_restored_tag_replaced_by_dispatch() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let earlier = NotificationHandle::new();
        channel.restore_visible(
            vec![ShownNotification {
                handle: earlier,
                notification: note("reminder", true),
                shown_at: now() - Duration::days(1),
            }],
            now(),
        );

        let fresh = channel.dispatch(&note("reminder", true), now()).unwrap();
        assert_eq!(channel.platform().closed, vec![earlier]);
        assert_eq!(channel.visible_tags(), vec!["reminder"]);
        assert_ne!(fresh, earlier);
    }

    #[test]
    fn test_restore_duplicate_tags_keeps_latest() {
        let mut channel = NotificationChannel::new(RecordingPlatform::granted());
        let older = NotificationHandle::new();
        let newer = NotificationHandle::new();
        let restored = channel.restore_visible(
            vec![
                ShownNotification {
                    handle: older,
                    notification: note("reminder", true),
                    shown_at: now() - Duration::days(1),
                },
                ShownNotification {
                    handle: newer,
                    notification: note("reminder", true),
                    shown_at: now(),
                },
            ],
            now(),
        );

        assert_eq!(restored, 1);
        assert_eq!(channel.platform().closed, vec![older]);
        assert!(channel.dismiss("reminder", now()));
        assert_eq!(channel.platform().closed, vec![older, newer]);
    }

    #[test]
    fn test_show_failure_returns_none() {
        let mut platform = RecordingPlatform::granted();
        platform.fail_show = true;
        let mut channel = NotificationChannel::new(platform);
        assert!(channel.dispatch(&note("a", false), now()).is_none());
        assert!(!channel.is_visible("a"));
    }

    #[test]
    fn test_request_permission_prompts_once() {
        let mut channel =
            NotificationChannel::new(RecordingPlatform::unrequested(Permission::Granted));
        assert_eq!(channel.request_permission(), Permission::Granted);
        assert_eq!(channel.request_permission(), Permission::Granted);
        assert_eq!(channel.platform().prompts, 1);
    }

    #[test]
    fn test_request_failure_counts_as_denied() {
        let mut platform = RecordingPlatform::unrequested(Permission::Granted);
        platform.fail_request = true;
        let mut channel = NotificationChannel::new(platform);
        assert_eq!(channel.request_permission(), Permission::Denied);
    }
}
