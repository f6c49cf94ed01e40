use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use streak_core::stats::level_progress;
use streak_core::*;

#[derive(Parser)]
#[command(name = "streakr")]
#[command(about = "Workout streaks, badges and reminders", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretend the local time is this (YYYY-MM-DDTHH:MM:SS)
    #[arg(long, global = true, hide = true)]
    now: Option<NaiveDateTime>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show streak, level and reminder status (default)
    Status,

    /// Complete today's workout
    Complete,

    /// Record a missed day (resets the streak)
    Missed,

    /// Show the badge currently being celebrated
    Celebrate {
        /// Dismiss the current celebration and show the next one
        #[arg(long, conflicts_with = "play")]
        dismiss: bool,

        /// Show every pending celebration in turn, auto-dismissing each
        #[arg(long)]
        play: bool,
    },

    /// List all badges
    Badges,

    /// Notification permission and reminder settings
    Notify {
        #[command(subcommand)]
        action: NotifyCommand,
    },

    /// Fire the daily reminder now
    Remind,

    /// Stay running and deliver reminders when they are due
    Watch,

    /// Drive the pipeline with synthetic stats (for testing)
    Debug {
        #[command(subcommand)]
        stimulus: DebugCommand,
    },

    /// Log out: clear stats, badges and celebrations
    Reset,
}

#[derive(Subcommand)]
enum NotifyCommand {
    /// Ask for permission to show notifications
    Request {
        /// Answer the prompt without asking (for scripts)
        #[arg(long, value_enum)]
        answer: Option<Answer>,
    },

    /// Change reminder settings
    Set {
        /// Reminder time (HH:MM)
        #[arg(long)]
        time: Option<ReminderTime>,

        /// Turn the daily reminder on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Turn the daily reminder off
        #[arg(long)]
        disable: bool,
    },

    /// Show notification settings
    Show,

    /// Show recent notifications from the outbox
    Log {
        /// Number of records to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Set the streak to a value
    Streak { value: u32 },

    /// Set the total workout count to a value
    Workouts { value: u32 },
}

#[derive(Clone, Copy, ValueEnum)]
enum Answer {
    Yes,
    No,
}

type CliTracker = Tracker<OutboxPlatform, JsonSettingsStore>;

/// Wall clock, optionally shifted so that startup reads as `--now`
#[derive(Clone, Copy)]
struct Clock {
    offset: chrono::Duration,
}

impl Clock {
    fn new(pretend: Option<NaiveDateTime>) -> Self {
        let offset = pretend
            .map(|at| at - Local::now().naive_local())
            .unwrap_or_else(chrono::Duration::zero);
        Self { offset }
    }

    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local() + self.offset
    }
}

/// Files for one data directory
struct Paths {
    state: PathBuf,
    settings: PathBuf,
    outbox: PathBuf,
    lock: PathBuf,
}

impl Paths {
    fn new(data_dir: &Path) -> Self {
        Self {
            state: data_dir.join("state.json"),
            settings: data_dir.join("settings.json"),
            outbox: data_dir.join("notifications.jsonl"),
            lock: data_dir.join("state.lock"),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    streak_core::logging::init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;

    let paths = Paths::new(&data_dir);
    let clock = Clock::new(cli.now);

    let prompt = match cli.command {
        Some(Commands::Notify {
            action: NotifyCommand::Request {
                answer: Some(answer),
            },
        }) => PromptMode::Answer(matches!(answer, Answer::Yes)),
        _ => PromptMode::Stdin,
    };
    // One load-run-save at a time per data directory; `watch` never saves state
    let _lock = match cli.command {
        Some(Commands::Watch) => None,
        _ => Some(StateLock::acquire(&paths.lock)?),
    };
    let mut tracker = open_tracker(&paths, &config, prompt, clock.now())?;

    match cli.command {
        None | Some(Commands::Status) => cmd_status(&tracker, &config, clock.now()),
        Some(Commands::Complete) => cmd_complete(&mut tracker, &paths, &config, clock.now())?,
        Some(Commands::Missed) => {
            let outcome = tracker.record_missed_day(clock.now());
            save(&tracker, &paths)?;
            println!("Streak reset. Workouts so far: {}", outcome.stats.total_workouts);
        }
        Some(Commands::Celebrate { dismiss, play }) => {
            cmd_celebrate(&mut tracker, &paths, dismiss, play)?
        }
        Some(Commands::Badges) => cmd_badges(&tracker),
        Some(Commands::Notify { action }) => cmd_notify(&mut tracker, &paths, action, clock.now())?,
        Some(Commands::Remind) => cmd_remind(&mut tracker, clock.now()),
        Some(Commands::Watch) => cmd_watch(&mut tracker, clock),
        Some(Commands::Debug { stimulus }) => {
            let now = clock.now();
            let outcome = match stimulus {
                DebugCommand::Streak { value } => tracker.test_streak_milestone(value, now),
                DebugCommand::Workouts { value } => tracker.test_workout_milestone(value, now),
            };
            save(&tracker, &paths)?;
            print_outcome(&outcome);
        }
        Some(Commands::Reset) => {
            tracker.reset();
            save(&tracker, &paths)?;
            println!("✓ Progress reset");
        }
    }

    Ok(())
}

fn open_tracker(
    paths: &Paths,
    config: &Config,
    prompt: PromptMode,
    now: NaiveDateTime,
) -> Result<CliTracker> {
    let store = JsonSettingsStore::new(&paths.settings);
    // The outbox has no OS-level memory of its own, so it starts from the last answer we stored
    let remembered = match store.load() {
        Ok(Some(settings)) => settings.permission,
        _ => Permission::Unrequested,
    };

    let platform = OutboxPlatform::open(&paths.outbox, remembered, prompt).with_echo(true);
    let mut channel = NotificationChannel::new(platform);
    match read_outbox(&paths.outbox) {
        Ok(records) => {
            channel.restore_visible(still_visible(&records), now);
        }
        Err(e) => tracing::warn!("Failed to read outbox: {}. Visible notifications not restored.", e),
    }

    let scheduler = NotificationScheduler::new(
        channel,
        store,
        config.default_notification_settings(),
    );

    let state = match TrackerState::load(&paths.state) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!("Failed to load state: {}. Starting fresh.", e);
            TrackerState::default()
        }
    };

    let mut tracker = Tracker::new(state, BadgeBook::with_defaults()?, scheduler);
    tracker.schedule_daily_reminder(now);
    // Retract whatever an earlier run left past its deadline
    tracker.tick(now);
    Ok(tracker)
}

fn save(tracker: &CliTracker, paths: &Paths) -> Result<()> {
    tracker.to_state().save(&paths.state)
}

fn rotation_for(tracker: &CliTracker, config: &Config, today: NaiveDate) -> RotationSource {
    let source = RotationSource::new(config.workouts.rotation.clone());
    if tracker.stats().last_workout_on == Some(today) {
        source.with_completed_day(today)
    } else {
        source
    }
}

fn cmd_status(tracker: &CliTracker, config: &Config, now: NaiveDateTime) {
    let stats = tracker.stats();
    let (into, span) = level_progress(stats.xp);

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  STREAKR");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  Streak:    {} day(s) 🔥", stats.streak);
    println!("  Workouts:  {}", stats.total_workouts);
    println!("  Level:     {} ({}/{} XP)", stats.level, into, span);

    let today = now.date();
    if let Some(workout) = rotation_for(tracker, config, today).workout_for(today) {
        let mark = if workout.completed { "✓ done" } else { "pending" };
        println!("  Today:     {} ({})", workout.name, mark);
    }

    let unlocked = tracker.badges().unlocked().count();
    println!("  Badges:    {}/{}", unlocked, tracker.badges().len());

    let settings = tracker.settings();
    println!(
        "  Reminder:  {} ({}, permission {})",
        settings.time,
        if settings.enabled { "on" } else { "off" },
        settings.permission
    );

    if let Some(badge) = tracker.peek_celebration() {
        println!();
        println!("  🎉 New badge: {} {}", badge.icon, badge.name);
        println!("     Run `streakr celebrate` to see it.");
    }
    println!();
}

fn cmd_complete(
    tracker: &mut CliTracker,
    paths: &Paths,
    config: &Config,
    now: NaiveDateTime,
) -> Result<()> {
    let today = now.date();
    let mut source = rotation_for(tracker, config, today);
    let name = source.workout_for(today).map(|w| w.name);

    match tracker.complete_todays_workout(&mut source, now)? {
        Some(outcome) => {
            save(tracker, paths)?;
            if let Some(name) = name {
                println!("✓ Workout logged: {}", name);
            }
            print_outcome(&outcome);
        }
        None => println!("Nothing to complete today - already done."),
    }

    Ok(())
}

fn cmd_celebrate(tracker: &mut CliTracker, paths: &Paths, dismiss: bool, play: bool) -> Result<()> {
    if play {
        while let Some(badge) = tracker.peek_celebration() {
            display_celebration(badge);
            std::thread::sleep(CELEBRATION_DISPLAY_DURATION);
            tracker.dismiss_celebration();
            save(tracker, paths)?;
        }
        println!("No more celebrations.");
        return Ok(());
    }

    if dismiss && tracker.dismiss_celebration().is_some() {
        save(tracker, paths)?;
    }

    match tracker.peek_celebration() {
        Some(badge) => {
            display_celebration(badge);
            let waiting = tracker.celebrations().len() - 1;
            if waiting > 0 {
                println!("  ({} more waiting)", waiting);
            }
        }
        None => println!("No celebrations pending."),
    }

    Ok(())
}

fn cmd_badges(tracker: &CliTracker) {
    println!();
    for badge in tracker.badges().badges() {
        match badge.unlocked_at {
            Some(at) => println!(
                "  ✓ {} {:<14} {}  (unlocked {})",
                badge.icon,
                badge.name,
                badge.description,
                at.format("%Y-%m-%d")
            ),
            None => println!("  · {} {:<14} {}", badge.icon, badge.name, badge.description),
        }
    }
    println!();
}

fn cmd_notify(
    tracker: &mut CliTracker,
    paths: &Paths,
    action: NotifyCommand,
    now: NaiveDateTime,
) -> Result<()> {
    match action {
        NotifyCommand::Request { .. } => {
            let permission = tracker.request_permission(now);
            println!("Notification permission: {}", permission);
            if permission == Permission::Denied {
                println!("Reminders and milestone notifications are off. Badges still show in-app.");
            }
        }
        NotifyCommand::Set {
            time,
            enable,
            disable,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            if time.is_none() && enabled.is_none() {
                return Err(Error::Settings(
                    "Nothing to change; pass --time, --enable or --disable".into(),
                ));
            }

            tracker.update_notification_settings(NotificationSettingsUpdate { enabled, time }, now);
            print_settings(tracker);
        }
        NotifyCommand::Show => print_settings(tracker),
        NotifyCommand::Log { limit } => {
            let records = read_outbox(&paths.outbox)?;
            if records.is_empty() {
                println!("No notifications yet.");
            }
            let skip = records.len().saturating_sub(limit);
            for record in records.iter().skip(skip) {
                match record {
                    OutboxRecord::Shown {
                        at, notification, ..
                    } => println!(
                        "  {}  shown   [{}] {}",
                        at.format("%Y-%m-%d %H:%M:%S"),
                        notification.tag,
                        notification.title
                    ),
                    OutboxRecord::Closed { at, handle } => println!(
                        "  {}  closed  {}",
                        at.format("%Y-%m-%d %H:%M:%S"),
                        handle
                    ),
                }
            }
        }
    }

    Ok(())
}

fn cmd_remind(tracker: &mut CliTracker, now: NaiveDateTime) {
    let id = match tracker.scheduler().active_reminder() {
        Some(reminder) => reminder.id(),
        None => {
            println!("No reminder scheduled (enable reminders and grant permission first).");
            return;
        }
    };

    tracker.scheduler_mut().fire_reminder(id, now);
    if let Some(next) = tracker.scheduler().active_reminder() {
        println!("Next reminder: {}", next.fire_at().format("%Y-%m-%d %H:%M"));
    }
}

fn cmd_watch(tracker: &mut CliTracker, clock: Clock) {
    const MAX_SLEEP_SECS: i64 = 60;

    if tracker.next_deadline().is_none() {
        println!("No reminder scheduled (enable reminders and grant permission first).");
        return;
    }

    if let Some(reminder) = tracker.scheduler().active_reminder() {
        println!(
            "Watching. Next reminder: {}",
            reminder.fire_at().format("%Y-%m-%d %H:%M")
        );
    }

    loop {
        let now = clock.now();
        let report = tracker.tick(now);
        if report.reminder_fired {
            if let Some(next) = tracker.scheduler().active_reminder() {
                println!("Next reminder: {}", next.fire_at().format("%Y-%m-%d %H:%M"));
            }
        }

        let wait = match tracker.next_deadline() {
            Some(deadline) => (deadline - now).num_seconds().clamp(1, MAX_SLEEP_SECS),
            None => MAX_SLEEP_SECS,
        };
        tracing::debug!("Sleeping {}s", wait);
        std::thread::sleep(std::time::Duration::from_secs(wait as u64));
    }
}

fn print_outcome(outcome: &PipelineOutcome) {
    let stats = &outcome.stats;
    println!(
        "  Streak: {}  Workouts: {}  Level: {}  XP: {}",
        stats.streak, stats.total_workouts, stats.level, stats.xp
    );
    for badge in &outcome.newly_unlocked {
        println!("  🏅 Badge unlocked: {} {}", badge.icon, badge.name);
    }
}

fn print_settings(tracker: &CliTracker) {
    let settings = tracker.settings();
    println!("  Reminders:  {}", if settings.enabled { "on" } else { "off" });
    println!("  Time:       {}", settings.time);
    println!("  Permission: {}", settings.permission);
    match tracker.scheduler().active_reminder() {
        Some(reminder) => println!(
            "  Next:       {}",
            reminder.fire_at().format("%Y-%m-%d %H:%M")
        ),
        None => println!("  Next:       none"),
    }
}

fn display_celebration(badge: &Badge) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  🎉 BADGE UNLOCKED");
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!("  {} {}", badge.icon, badge.name);
    println!("  {}", badge.description);
    println!();
}
