use crate::models::listing::parse_or;
use crate::upstream::exercisedb::Exercise;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

const MAX_PER_DAY: i64 = 12;
const MAX_DAYS: i64 = 6;

/// Query parameters controlling plan volume. All optional; see `Volume::from_query`.
#[derive(serde::Deserialize, Default, Debug)]
#[serde(default, rename_all = "camelCase")]
pub struct VolumeQuery {
    pub intensity: Option<String>,
    pub sets: Option<String>,
    pub reps: Option<String>,
    pub rest_sec: Option<String>,
    pub per_day: Option<String>,
    pub days: Option<String>,
}

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub sets: i64,
    pub reps: i64,
    pub rest_sec: i64,
    pub per_day: i64,
    pub days: i64,
}

impl Volume {
    const EASY: Volume = Volume {
        sets: 2,
        reps: 8,
        rest_sec: 60,
        per_day: 4,
        days: 3,
    };
    const STANDARD: Volume = Volume {
        sets: 3,
        reps: 10,
        rest_sec: 90,
        per_day: 6,
        days: 3,
    };
    const HARD: Volume = Volume {
        sets: 4,
        reps: 8,
        rest_sec: 120,
        per_day: 8,
        days: 3,
    };

    /// Start from the intensity preset (`standard` when unknown), then apply overrides.
    /// `perDay` and `days` are capped so a plan stays a sensible size.
    pub fn from_query(query: &VolumeQuery) -> Self {
        let base = match query
            .intensity
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            Some("easy") => Self::EASY,
            Some("hard") => Self::HARD,
            _ => Self::STANDARD,
        };

        Volume {
            sets: parse_or(query.sets.as_deref(), base.sets),
            reps: parse_or(query.reps.as_deref(), base.reps),
            rest_sec: parse_or(query.rest_sec.as_deref(), base.rest_sec),
            per_day: parse_or(query.per_day.as_deref(), base.per_day).clamp(0, MAX_PER_DAY),
            days: parse_or(query.days.as_deref(), base.days).clamp(0, MAX_DAYS),
        }
    }
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: Option<String>,
    pub name: Option<String>,
    pub equipment: String,
    pub target: String,
    pub gif_url: Option<String>,
    pub sets: i64,
    pub reps: i64,
    pub rest_sec: i64,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Day {
    pub name: String,
    pub blocks: Vec<Block>,
}

// Upstream sends `""` for unknown values as often as it leaves them out.
fn present(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.is_empty())
}

/// Turn one day's exercises into prescribed blocks. `label` stands in for a missing target.
pub fn build_day(name: String, exercises: Vec<Exercise>, label: &str, volume: &Volume) -> Day {
    let blocks = exercises
        .into_iter()
        .map(|exercise| Block {
            id: present(exercise.id).or_else(|| present(exercise.name.clone())),
            name: exercise.name,
            equipment: present(exercise.equipment).unwrap_or_else(|| "body weight".to_string()),
            target: present(exercise.target).unwrap_or_else(|| label.to_string()),
            gif_url: present(exercise.gif_url),
            sets: volume.sets,
            reps: volume.reps,
            rest_sec: volume.rest_sec,
        })
        .collect();

    Day { name, blocks }
}

/// `Day 1` .. `Day n`, in order.
pub fn build_days(day_lists: Vec<Vec<Exercise>>, label: &str, volume: &Volume) -> Vec<Day> {
    day_lists
        .into_iter()
        .enumerate()
        .map(|(i, list)| build_day(format!("Day {}", i + 1), list, label, volume))
        .collect()
}

/// Spread exercises over `days` days of at most `per_day` each, balanced by target.
///
/// Exercises are bucketed by lower-cased target (`other` when missing) and each bucket is
/// shuffled. Buckets then take turns handing out one exercise, which goes to the first day
/// that still has room. Stops once every day is full or every bucket is empty.
pub fn balanced_days<R: Rng + ?Sized>(
    exercises: Vec<Exercise>,
    days: usize,
    per_day: usize,
    rng: &mut R,
) -> Vec<Vec<Exercise>> {
    let mut result: Vec<Vec<Exercise>> = (0..days).map(|_| Vec::new()).collect();
    if days == 0 || per_day == 0 {
        return result;
    }

    // Keep buckets in first-seen order so the rotation doesn't depend on hash order.
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<Exercise>> = HashMap::new();
    for exercise in exercises {
        let key = exercise
            .target
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| "other".to_string());
        if !buckets.contains_key(&key) {
            order.push(key.clone());
        }
        buckets.entry(key).or_default().push(exercise);
    }

    for bucket in buckets.values_mut() {
        bucket.shuffle(rng);
    }

    while !order.is_empty() {
        let mut exhausted = Vec::new();

        for key in &order {
            match buckets.get_mut(key).and_then(Vec::pop) {
                Some(exercise) => match result.iter_mut().find(|day| day.len() < per_day) {
                    Some(day) => day.push(exercise),
                    // all days full
                    None => return result,
                },
                None => exhausted.push(key.clone()),
            }
        }

        order.retain(|key| !exhausted.contains(key));
    }

    result
}
