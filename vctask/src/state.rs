//! Persisted dedup state
//!
//! One small YAML document with a single `tasks` mapping of flat string
//! fields. Loading fails soft: a missing or malformed file yields a
//! default-initialized state rather than an error. Saving uses the temp
//! file + rename pattern so a crash never leaves a half-written file.
//!
//! The two id sets are comma-joined strings on disk and an empty set
//! encodes as the empty string. Splitting the empty string back must yield
//! an empty set, not a set containing `""`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Dedup state carried across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    /// Task ids believed still in progress as of the last run.
    pub running_task_ids: HashSet<String>,
    /// Most recently opened epoch bucket, 0 if none yet.
    pub current_epoch: i64,
    /// Task ids already reported within `current_epoch`.
    pub current_epoch_task_ids: HashSet<String>,
}

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDoc {
    #[serde(default)]
    tasks: TasksSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TasksSection {
    #[serde(default, deserialize_with = "lenient_string")]
    running: String,
    #[serde(default, deserialize_with = "lenient_string")]
    current: String,
    #[serde(default, deserialize_with = "lenient_string")]
    current_tasks: String,
}

/// Accept unquoted YAML scalars (a hand-edited `current: 100` is a number,
/// not a string) without failing the whole document.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn join_ids(ids: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

fn split_ids(joined: &str) -> HashSet<String> {
    // split(",") on "" yields [""], which means "no ids", not the id "".
    joined
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

impl PersistedState {
    /// Load state from `path`.
    ///
    /// Missing file, unreadable file, malformed document, or missing keys
    /// all produce a fresh default state. A non-integer `current` field is
    /// coerced to 0.
    pub fn load(path: &Path) -> PersistedState {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                debug!("No state file at {}, starting fresh", path.display());
                return PersistedState::default();
            }
        };

        let doc: StateDoc = match serde_yaml::from_str(&content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "Malformed state file {}, starting fresh: {}",
                    path.display(),
                    e
                );
                return PersistedState::default();
            }
        };

        PersistedState {
            running_task_ids: split_ids(&doc.tasks.running),
            current_epoch: doc.tasks.current.trim().parse().unwrap_or(0),
            current_epoch_task_ids: split_ids(&doc.tasks.current_tasks),
        }
    }

    /// Write state to `path` atomically (temp file + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let doc = StateDoc {
            tasks: TasksSection {
                running: join_ids(&self.running_task_ids),
                current: self.current_epoch.to_string(),
                current_tasks: join_ids(&self.current_epoch_task_ids),
            },
        };
        let yaml = serde_yaml::to_string(&doc)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = path.with_extension("yaml.tmp");
        fs::write(&tmp_path, &yaml)
            .with_context(|| format!("Failed to write temp file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} -> {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_trip_non_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");

        let state = PersistedState {
            running_task_ids: ids(&["5001", "5002"]),
            current_epoch: 1_700_000_000,
            current_epoch_task_ids: ids(&["6001"]),
        };
        state.save(&path).unwrap();

        assert_eq!(PersistedState::load(&path), state);
    }

    #[test]
    fn test_round_trip_empty_sets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");

        let state = PersistedState::default();
        state.save(&path).unwrap();

        let loaded = PersistedState::load(&path);
        assert!(loaded.running_task_ids.is_empty());
        assert!(loaded.current_epoch_task_ids.is_empty());
        assert_eq!(loaded.current_epoch, 0);
    }

    #[test]
    fn test_empty_string_is_not_an_id() {
        assert!(split_ids("").is_empty());
        assert_eq!(split_ids("5001"), ids(&["5001"]));
        assert_eq!(split_ids("5001,5002"), ids(&["5001", "5002"]));
    }

    #[test]
    fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = PersistedState::load(&dir.path().join("absent.yaml"));
        assert_eq!(loaded, PersistedState::default());
    }

    #[test]
    fn test_malformed_document_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, "tasks: [not, a, mapping]").unwrap();
        assert_eq!(PersistedState::load(&path), PersistedState::default());
    }

    #[test]
    fn test_missing_tasks_section_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, "other: {}\n").unwrap();
        assert_eq!(PersistedState::load(&path), PersistedState::default());
    }

    #[test]
    fn test_malformed_epoch_coerces_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(
            &path,
            "tasks:\n  running: \"5001\"\n  current: \"not-a-number\"\n  current_tasks: \"\"\n",
        )
        .unwrap();

        let loaded = PersistedState::load(&path);
        assert_eq!(loaded.current_epoch, 0);
        assert_eq!(loaded.running_task_ids, ids(&["5001"]));
    }

    #[test]
    fn test_unquoted_numeric_epoch_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, "tasks:\n  running: \"\"\n  current: 100\n  current_tasks: \"\"\n")
            .unwrap();

        assert_eq!(PersistedState::load(&path).current_epoch, 100);
    }

    #[test]
    fn test_save_replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.yaml");

        let first = PersistedState {
            running_task_ids: ids(&["1"]),
            current_epoch: 10,
            current_epoch_task_ids: ids(&["1"]),
        };
        first.save(&path).unwrap();

        let second = PersistedState {
            running_task_ids: HashSet::new(),
            current_epoch: 20,
            current_epoch_task_ids: ids(&["2"]),
        };
        second.save(&path).unwrap();

        assert_eq!(PersistedState::load(&path), second);
        assert!(!path.with_extension("yaml.tmp").exists());
    }
}
