//! Repo - ordered path -> content mapping assembled during a build

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Root-level overview file
pub const OVERVIEW_FILE: &str = "README.md";

/// Per-unit narrative file
pub const NARRATIVE_FILE: &str = "README.md";

/// Path of a file belonging to a unit: `{unit_id}/{filename}`
pub fn unit_path(unit_id: &str, filename: &str) -> String {
    format!("{}/{}", unit_id, filename)
}

/// A unit that produced at least its narrative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub unit_id: String,
    pub narrative: String,
    /// filename -> content, relative to the unit directory
    pub files: BTreeMap<String, String>,
}

impl GeneratedUnit {
    pub fn narrative_path(&self) -> String {
        unit_path(&self.unit_id, NARRATIVE_FILE)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Path already written: {0}")]
pub struct DuplicatePath(pub String);

/// Insertion-ordered file tree; each path is written at most once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repo {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Repo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file; a path already present is rejected and the repo is unchanged
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> Result<(), DuplicatePath> {
        let path = path.into();
        if self.index.contains_key(&path) {
            return Err(DuplicatePath(path));
        }
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push((path, content.into()));
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.index.get(path).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths in the order they were written
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(p, _)| p.as_str())
    }

    /// `(path, content)` pairs in the order they were written
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Number of files under `{unit_id}/`
    pub fn unit_file_count(&self, unit_id: &str) -> usize {
        let prefix = format!("{}/", unit_id);
        self.entries.iter().filter(|(p, _)| p.starts_with(&prefix)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order() {
        let mut repo = Repo::new();
        repo.insert("README.md", "# root").unwrap();
        repo.insert("task_2/README.md", "two").unwrap();
        repo.insert("task_1/README.md", "one").unwrap();

        let paths: Vec<_> = repo.paths().collect();
        assert_eq!(paths, vec!["README.md", "task_2/README.md", "task_1/README.md"]);
        assert_eq!(repo.get("task_1/README.md"), Some("one"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut repo = Repo::new();
        repo.insert("README.md", "first").unwrap();
        let err = repo.insert("README.md", "second").unwrap_err();

        assert_eq!(err, DuplicatePath("README.md".to_string()));
        assert_eq!(repo.get("README.md"), Some("first"));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_unit_file_count() {
        let mut repo = Repo::new();
        repo.insert("README.md", "root").unwrap();
        repo.insert(unit_path("task_1", "README.md"), "n").unwrap();
        repo.insert(unit_path("task_1", "main.py"), "code").unwrap();
        repo.insert(unit_path("task_10", "README.md"), "n").unwrap();

        assert_eq!(repo.unit_file_count("task_1"), 2);
        assert_eq!(repo.unit_file_count("task_10"), 1);
        assert_eq!(repo.unit_file_count("task_2"), 0);
    }

    #[test]
    fn test_narrative_path() {
        let unit = GeneratedUnit {
            unit_id: "task_3".to_string(),
            narrative: "story".to_string(),
            files: BTreeMap::new(),
        };
        assert_eq!(unit.narrative_path(), "task_3/README.md");
    }
}
