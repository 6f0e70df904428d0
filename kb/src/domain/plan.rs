//! Plan - an ordered list of independently generatable units

use serde::{Deserialize, Serialize};

/// Maximum length of a unit id
const MAX_ID_LEN: usize = 50;

/// One independently generatable piece of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// snake_case identifier, unique within its plan; doubles as a directory name
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// What the unit asks the candidate to build
    #[serde(default)]
    pub description: String,

    /// Filenames the implementation is expected to contain
    #[serde(default)]
    pub target_files: Vec<String>,
}

/// The planner's output: a titled, ordered list of units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub units: Vec<Unit>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Check the structural invariants a buildable plan must hold
    ///
    /// Returns a description of the first violation found.
    pub fn check(&self, expected_units: usize) -> Result<(), String> {
        if self.units.len() != expected_units {
            return Err(format!(
                "expected {} units, plan has {}",
                expected_units,
                self.units.len()
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for unit in &self.units {
            if unit.id.is_empty() || unit.id != unit_id_from(&unit.id) {
                return Err(format!("unit id '{}' is not a valid snake_case id", unit.id));
            }
            if !seen.insert(unit.id.as_str()) {
                return Err(format!("duplicate unit id '{}'", unit.id));
            }
        }
        Ok(())
    }

    /// Markdown overview written as the repo's root README
    pub fn overview_markdown(&self) -> String {
        let mut md = format!("# {}\n\n{}\n\n## Tasks\n\n", self.title, self.description);
        for unit in &self.units {
            md.push_str(&format!("- {}: {}\n", unit.name, unit.description));
        }
        md
    }
}

/// Turn arbitrary text into a snake_case unit id
///
/// Keeps ASCII alphanumerics, lowercases them, and collapses every other run of
/// characters into a single underscore. The result is safe as a path segment
/// and may be empty.
pub fn unit_id_from(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '\u{2019}')
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_ID_LEN)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, name: &str) -> Unit {
        Unit {
            id: id.to_string(),
            name: name.to_string(),
            description: format!("{} description", name),
            target_files: vec!["main.py".to_string()],
        }
    }

    #[test]
    fn test_unit_id_from() {
        assert_eq!(unit_id_from("Parse CSV Input"), "parse_csv_input");
        assert_eq!(unit_id_from("task_1"), "task_1");
        assert_eq!(unit_id_from("  --REST api!! "), "rest_api");
        assert_eq!(unit_id_from("Don't Panic"), "dont_panic");
        assert_eq!(unit_id_from("../etc/passwd"), "etc_passwd");
        assert_eq!(unit_id_from("!!!"), "");
    }

    #[test]
    fn test_unit_id_from_truncates() {
        let id = unit_id_from(&"a ".repeat(100));
        assert!(id.len() <= MAX_ID_LEN);
        assert!(!id.ends_with('_'));
    }

    #[test]
    fn test_check_accepts_valid_plan() {
        let plan = Plan {
            title: "Kata".to_string(),
            description: String::new(),
            units: vec![unit("task_1", "One"), unit("task_2", "Two")],
        };
        assert!(plan.check(2).is_ok());
    }

    #[test]
    fn test_check_rejects_count_mismatch() {
        let plan = Plan {
            title: "Kata".to_string(),
            description: String::new(),
            units: vec![unit("task_1", "One")],
        };
        let err = plan.check(3).unwrap_err();
        assert!(err.contains("expected 3"));
    }

    #[test]
    fn test_check_rejects_duplicate_and_invalid_ids() {
        let dup = Plan {
            title: "Kata".to_string(),
            description: String::new(),
            units: vec![unit("task_1", "One"), unit("task_1", "Two")],
        };
        assert!(dup.check(2).unwrap_err().contains("duplicate"));

        let bad = Plan {
            title: "Kata".to_string(),
            description: String::new(),
            units: vec![unit("Task One", "One")],
        };
        assert!(bad.check(1).is_err());
    }

    #[test]
    fn test_overview_markdown() {
        let plan = Plan {
            title: "Lab Pipeline Kata".to_string(),
            description: "Build a sample tracker.".to_string(),
            units: vec![unit("task_1", "Ingest"), unit("task_2", "Report")],
        };
        let md = plan.overview_markdown();
        assert!(md.starts_with("# Lab Pipeline Kata\n\nBuild a sample tracker.\n\n## Tasks\n\n"));
        assert!(md.contains("- Ingest: Ingest description\n"));
        assert!(md.find("Ingest").unwrap() < md.find("Report").unwrap());
    }
}
