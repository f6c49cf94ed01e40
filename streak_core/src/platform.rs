//! Outbox notification platform.
//!
//! A platform for hosts without a desktop notification service: every shown
//! or closed notification is appended to a JSONL outbox file with file
//! locking, so another process (or a test) can follow along. The outbox is
//! also what carries visible notifications from one session to the next, see
//! [`still_visible`].

use crate::channel::{NotificationPlatform, ShownNotification};
use crate::{Notification, NotificationHandle, Permission, Result};
use chrono::NaiveDateTime;
use fs2::FileExt;
use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the outbox file
///
/// `at` is host local time, the same clock the engine runs on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboxRecord {
    Shown {
        handle: NotificationHandle,
        at: NaiveDateTime,
        notification: Notification,
    },
    Closed {
        handle: NotificationHandle,
        at: NaiveDateTime,
    },
}

/// How the permission prompt gets answered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptMode {
    /// Ask on stdout, read y/n from stdin
    Stdin,
    /// Answer without asking (scripts and tests)
    Answer(bool),
}

/// JSONL-backed notification platform
pub struct OutboxPlatform {
    path: PathBuf,
    supported: bool,
    permission: Permission,
    prompt: PromptMode,
    echo: bool,
}

impl OutboxPlatform {
    /// Open an outbox at `path`
    ///
    /// `remembered` is the permission the user gave in an earlier session.
    /// If the outbox directory cannot be created the platform reports itself
    /// as unsupported.
    pub fn open(path: impl Into<PathBuf>, remembered: Permission, prompt: PromptMode) -> Self {
        let path = path.into();
        let supported = match path.parent() {
            Some(parent) => match std::fs::create_dir_all(parent) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Outbox directory {:?} unavailable: {}", parent, e);
                    false
                }
            },
            None => false,
        };

        Self {
            path,
            supported,
            permission: remembered,
            prompt,
            echo: false,
        }
    }

    /// Also print shown notifications to stdout
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &OutboxRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = io::BufWriter::new(&file);
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;
        Ok(())
    }

    fn ask_stdin() -> Result<bool> {
        print!("Allow streakr to show notifications? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

impl NotificationPlatform for OutboxPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission(&self) -> Permission {
        self.permission
    }

    fn request_permission(&mut self) -> Result<Permission> {
        let allowed = match self.prompt {
            PromptMode::Stdin => Self::ask_stdin()?,
            PromptMode::Answer(answer) => answer,
        };

        self.permission = if allowed {
            Permission::Granted
        } else {
            Permission::Denied
        };
        Ok(self.permission)
    }

    fn show(
        &mut self,
        handle: NotificationHandle,
        notification: &Notification,
        at: NaiveDateTime,
    ) -> Result<()> {
        self.append(&OutboxRecord::Shown {
            handle,
            at,
            notification: notification.clone(),
        })?;

        if self.echo {
            println!("🔔 {}: {}", notification.title, notification.body);
        }
        tracing::debug!("Outbox: shown {} ({})", notification.tag, handle);
        Ok(())
    }

    fn close(&mut self, handle: NotificationHandle, at: NaiveDateTime) -> Result<()> {
        self.append(&OutboxRecord::Closed { handle, at })?;
        tracing::debug!("Outbox: closed {}", handle);
        Ok(())
    }
}

/// Read every record from an outbox file
///
/// Malformed lines are skipped with a warning.
pub fn read_outbox(path: &Path) -> Result<Vec<OutboxRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<OutboxRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Failed to parse outbox record at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    Ok(records)
}

/// Notifications shown in the outbox and never closed, oldest first
pub fn still_visible(records: &[OutboxRecord]) -> Vec<ShownNotification> {
    let closed: HashSet<NotificationHandle> = records
        .iter()
        .filter_map(|record| match record {
            OutboxRecord::Closed { handle, .. } => Some(*handle),
            OutboxRecord::Shown { .. } => None,
        })
        .collect();

    records
        .iter()
        .filter_map(|record| match record {
            OutboxRecord::Shown {
                handle,
                at,
                notification,
            } if !closed.contains(handle) => Some(ShownNotification {
                handle: *handle,
                notification: notification.clone(),
                shown_at: *at,
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::NotificationChannel;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn note(tag: &str) -> Notification {
        Notification {
            title: "Hello".into(),
            body: "World".into(),
            tag: tag.into(),
            require_interaction: false,
        }
    }

    #[test]
    fn test_show_and_close_are_logged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");

        let mut platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        let handle = NotificationHandle::new();
        platform.show(handle, &note("a"), at(9)).unwrap();
        platform.close(handle, at(10)).unwrap();

        let records = read_outbox(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], OutboxRecord::Shown { notification, .. } if notification.tag == "a"));
        assert!(matches!(&records[1], OutboxRecord::Closed { handle: h, at: t } if *h == handle && *t == at(10)));
    }

    #[test]
    fn test_fixed_answer_prompt() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");

        let mut platform =
            OutboxPlatform::open(&path, Permission::Unrequested, PromptMode::Answer(false));
        assert_eq!(platform.request_permission().unwrap(), Permission::Denied);
        assert_eq!(platform.permission(), Permission::Denied);
    }

    #[test]
    fn test_missing_outbox_reads_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let records = read_outbox(&temp_dir.path().join("none.jsonl")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");

        let mut platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        platform.show(NotificationHandle::new(), &note("a"), at(9)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();

        assert_eq!(read_outbox(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_channel_over_outbox_retracts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");
        let now = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        let platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        let mut channel = NotificationChannel::new(platform);
        channel.dispatch(&note("a"), now).unwrap();
        channel.retract_expired(now + chrono::Duration::seconds(5));

        let records = read_outbox(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[1], OutboxRecord::Closed { .. }));
    }

    #[test]
    fn test_still_visible_skips_closed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");

        let mut platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        let gone = NotificationHandle::new();
        let open = NotificationHandle::new();
        platform.show(gone, &note("a"), at(9)).unwrap();
        platform.show(open, &note("b"), at(10)).unwrap();
        platform.close(gone, at(11)).unwrap();

        let visible = still_visible(&read_outbox(&path).unwrap());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].handle, open);
        assert_eq!(visible[0].notification.tag, "b");
        assert_eq!(visible[0].shown_at, at(10));
    }

    #[test]
    fn test_retract_carries_across_sessions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("notifications.jsonl");

        // First session shows and exits before the retract deadline
        let platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        let mut first = NotificationChannel::new(platform);
        let handle = first.dispatch(&note("a"), at(9)).unwrap();
        drop(first);

        let platform = OutboxPlatform::open(&path, Permission::Granted, PromptMode::Answer(true));
        let mut second = NotificationChannel::new(platform);
        second.restore_visible(still_visible(&read_outbox(&path).unwrap()), at(12));
        assert_eq!(second.retract_expired(at(12)), 1);

        let records = read_outbox(&path).unwrap();
        assert!(matches!(&records[1], OutboxRecord::Closed { handle: h, .. } if *h == handle));
        assert!(still_visible(&records).is_empty());
    }
}
