//! Workout source.
//!
//! The core does not own workout content. It only needs to know whether there
//! is a workout for today and to tell the source when it has been done.

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Today's workout as reported by a source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workout {
    pub id: String,
    pub name: String,
    pub date: NaiveDate,
    pub completed: bool,
}

/// External provider of daily workouts
pub trait WorkoutSource {
    fn fetch_todays_workout(&mut self, today: NaiveDate) -> Result<Option<Workout>>;

    fn mark_complete(&mut self, workout_id: &str) -> Result<()>;
}

/// Assigns one workout per calendar day from a fixed rotation of names
#[derive(Clone, Debug)]
pub struct RotationSource {
    rotation: Vec<String>,
    completed: HashSet<String>,
}

impl RotationSource {
    pub fn new(rotation: Vec<String>) -> Self {
        Self {
            rotation,
            completed: HashSet::new(),
        }
    }

    /// Mark the workout of `day` as already done (e.g. in a previous run)
    pub fn with_completed_day(mut self, day: NaiveDate) -> Self {
        if let Some(workout) = self.workout_for(day) {
            self.completed.insert(workout.id);
        }
        self
    }

    /// Workout assigned to `day`, `None` for an empty rotation
    pub fn workout_for(&self, day: NaiveDate) -> Option<Workout> {
        if self.rotation.is_empty() {
            return None;
        }

        let index = day.num_days_from_ce().rem_euclid(self.rotation.len() as i32) as usize;
        let name = &self.rotation[index];
        let id = format!("{}:{}", day.format("%Y-%m-%d"), slugify(name));

        Some(Workout {
            completed: self.completed.contains(&id),
            id,
            name: name.clone(),
            date: day,
        })
    }
}

impl WorkoutSource for RotationSource {
    fn fetch_todays_workout(&mut self, today: NaiveDate) -> Result<Option<Workout>> {
        Ok(self.workout_for(today))
    }

    fn mark_complete(&mut self, workout_id: &str) -> Result<()> {
        let (date, _) = workout_id
            .split_once(':')
            .ok_or_else(|| Error::Workout(format!("Malformed workout id '{}'", workout_id)))?;
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| Error::Workout(format!("Malformed workout id '{}': {}", workout_id, e)))?;

        match self.workout_for(day) {
            Some(workout) if workout.id == workout_id => {
                self.completed.insert(workout.id);
                tracing::debug!("Marked workout {} complete", workout_id);
                Ok(())
            }
            _ => Err(Error::Workout(format!("Unknown workout '{}'", workout_id))),
        }
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation() -> RotationSource {
        RotationSource::new(vec!["Full-body circuit".into(), "Core & mobility".into()])
    }

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + chrono::Duration::days(n)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Core & mobility"), "core-mobility");
        assert_eq!(slugify("  Upper body!! "), "upper-body");
    }

    #[test]
    fn test_rotation_alternates_by_day() {
        let source = rotation();
        let a = source.workout_for(day(0)).unwrap();
        let b = source.workout_for(day(1)).unwrap();
        let c = source.workout_for(day(2)).unwrap();

        assert_ne!(a.name, b.name);
        assert_eq!(a.name, c.name);
        assert!(a.id.starts_with("2026-03-01:"));
    }

    #[test]
    fn test_mark_complete() {
        let mut source = rotation();
        let workout = source.fetch_todays_workout(day(0)).unwrap().unwrap();
        assert!(!workout.completed);

        source.mark_complete(&workout.id).unwrap();
        assert!(source.fetch_todays_workout(day(0)).unwrap().unwrap().completed);
        assert!(!source.fetch_todays_workout(day(1)).unwrap().unwrap().completed);
    }

    #[test]
    fn test_mark_complete_rejects_unknown_ids() {
        let mut source = rotation();
        assert!(source.mark_complete("nonsense").is_err());
        assert!(source.mark_complete("2026-03-01:not-this-one").is_err());
    }

    #[test]
    fn test_with_completed_day() {
        let mut source = rotation().with_completed_day(day(3));
        assert!(source.fetch_todays_workout(day(3)).unwrap().unwrap().completed);
    }

    #[test]
    fn test_empty_rotation_has_no_workout() {
        let mut source = RotationSource::new(vec![]);
        assert!(source.fetch_todays_workout(day(0)).unwrap().is_none());
    }
}
