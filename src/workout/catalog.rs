use crate::upstream::exercisedb::{Exercise, ExerciseSource};
use std::collections::HashSet;
use std::time::Duration;

/// Muscle groups and the ExerciseDB target keys they cover.
pub const GROUPS: &[(&str, &[&str])] = &[
    ("Chest", &["pectorals", "serratus anterior"]),
    (
        "Back",
        &["lats", "upper back", "traps", "spine", "levator scapulae"],
    ),
    ("Shoulders", &["delts"]),
    ("Arms", &["biceps", "triceps", "forearms"]),
    ("Core", &["abs", "obliques"]),
    (
        "Legs",
        &["quads", "hamstrings", "glutes", "calves", "adductors", "abductors"],
    ),
    ("Cardio", &["cardiovascular system"]),
];

/// Body areas as unions of groups.
pub const AREAS: &[(&str, &[&str])] = &[
    ("UpperBody", &["Chest", "Back", "Shoulders", "Arms"]),
    ("LowerBody", &["Core", "Legs"]),
    (
        "FullBody",
        &["Chest", "Back", "Shoulders", "Arms", "Core", "Legs", "Cardio"],
    ),
];

/// Anatomical names people actually type, mapped to ExerciseDB's target keys.
const TARGET_ALIASES: &[(&str, &str)] = &[
    // Chest
    ("pectoralis major", "pectorals"),
    ("pectorals", "pectorals"),
    // Back
    ("latissimus dorsi", "lats"),
    ("lats", "lats"),
    ("upper back", "upper back"),
    ("trapezius", "traps"),
    ("traps", "traps"),
    ("spine", "spine"),
    ("levator scapulae", "levator scapulae"),
    // Shoulders
    ("deltoids", "delts"),
    ("delts", "delts"),
    // Arms
    ("biceps brachii", "biceps"),
    ("biceps", "biceps"),
    ("triceps brachii", "triceps"),
    ("triceps", "triceps"),
    ("forearms", "forearms"),
    // Core
    ("abdominals", "abs"),
    ("abs", "abs"),
    ("obliques", "obliques"),
    // Legs
    ("quadriceps", "quads"),
    ("quads", "quads"),
    ("hamstrings", "hamstrings"),
    ("glutes", "glutes"),
    ("calves", "calves"),
    ("adductors", "adductors"),
    ("abductors", "abductors"),
    // Cardio
    ("cardiovascular system", "cardiovascular system"),
];

/// Map a user-supplied target to ExerciseDB's key. Unknown targets pass through unchanged.
pub fn normalize_target(target: &str) -> String {
    let key = target.trim().to_lowercase();
    TARGET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, normalized)| normalized.to_string())
        .unwrap_or_else(|| target.to_string())
}

/// Case-insensitive group lookup, returning the canonical name.
pub fn find_group(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    GROUPS
        .iter()
        .find(|(group, _)| group.eq_ignore_ascii_case(name))
        .copied()
}

pub fn find_area(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    AREAS
        .iter()
        .find(|(area, _)| area.eq_ignore_ascii_case(name))
        .copied()
}

/// Every target key covered by the groups of an area, in group order.
pub fn area_targets(groups: &[&str]) -> Vec<&'static str> {
    groups
        .iter()
        .filter_map(|group| find_group(group))
        .flat_map(|(_, targets)| targets.iter().copied())
        .collect()
}

/// Drop exercises without an id or name, and repeats of one already seen.
pub fn dedup(exercises: Vec<Exercise>) -> Vec<Exercise> {
    let mut seen = HashSet::new();
    exercises
        .into_iter()
        .filter(|exercise| match exercise.dedup_key() {
            Some(key) => seen.insert(key.to_string()),
            None => false,
        })
        .collect()
}

/// Fetch exercises for one target, treating any failure as "no exercises".
pub async fn fetch_target(source: &(dyn ExerciseSource + Send + Sync), target: &str) -> Vec<Exercise> {
    let normalized = normalize_target(target);
    match source.exercises_by_target(&normalized).await {
        Ok(exercises) => exercises,
        Err(e) => {
            log::warn!("fetching exercises for target {:?} failed: {}", normalized, e);
            Vec::new()
        }
    }
}

/// Fetch several targets one after another, pausing `throttle` between requests so
/// RapidAPI's rate limit isn't tripped, then de-duplicate.
pub async fn fetch_targets(
    source: &(dyn ExerciseSource + Send + Sync),
    targets: &[&str],
    throttle: Duration,
) -> Vec<Exercise> {
    let mut results = Vec::new();
    for (i, target) in targets.iter().enumerate() {
        if i > 0 && !throttle.is_zero() {
            tokio::time::sleep(throttle).await;
        }
        results.extend(fetch_target(source, target).await);
    }
    dedup(results)
}
