//! Instructor ratings, looked up by name.
//!
//! Ratings come from a separate collaborator as a JSON object mapping
//! instructor names to [`RmpInfo`]. They are only attached to courses when
//! serializing; extraction never sees them.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RmpInfo {
    pub avg_difficulty: f64,
    pub avg_rating: f64,
    pub rmp_url: String,
    pub num_ratings: u32,
    pub would_take_again_percent: f64,
}

/// `"Doe, Jane Q."` and `"Jane Doe"` both become `"jane doe"`: surname-first
/// names are flipped, everything but letters dropped, and middle names
/// removed.
pub fn normalize_name(name: &str) -> String {
    let flipped = name.split(',').rev().join(" ").to_lowercase();
    let letters: String = flipped
        .chars()
        .filter(|c| c.is_ascii_lowercase() || *c == ' ')
        .collect();
    let words: Vec<&str> = letters.split_whitespace().collect();
    match words.as_slice() {
        [] => String::new(),
        [only] => only.to_string(),
        [first, .., last] => format!("{first} {last}"),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingTable {
    by_name: BTreeMap<String, RmpInfo>,
}

impl RatingTable {
    /// Reads a JSON object of instructor name to rating
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read ratings from {}", path.display()))?;
        let raw: BTreeMap<String, RmpInfo> =
            serde_json::from_str(&json).with_context(|| format!("failed to parse ratings in {}", path.display()))?;
        let table: RatingTable = raw.into_iter().collect();
        debug!(instructors = table.len(), "loaded ratings");
        Ok(table)
    }

    pub fn lookup(&self, instructor: &str) -> Option<&RmpInfo> {
        self.by_name.get(&normalize_name(instructor))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, RmpInfo)> for RatingTable {
    fn from_iter<I: IntoIterator<Item = (S, RmpInfo)>>(iter: I) -> Self {
        let by_name = iter
            .into_iter()
            .map(|(name, info)| (normalize_name(name.as_ref()), info))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        RatingTable { by_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn info(rating: f64) -> RmpInfo {
        RmpInfo {
            avg_difficulty: 3.1,
            avg_rating: rating,
            rmp_url: "https://www.ratemyprofessors.com/professor/1".to_string(),
            num_ratings: 12,
            would_take_again_percent: 80.0,
        }
    }

    #[test_case("Jane Doe", "jane doe" ; "plain")]
    #[test_case("Doe, Jane", "jane doe" ; "surname first")]
    #[test_case("Jane Q. Public Doe", "jane doe" ; "middle names")]
    #[test_case("O'Brien", "obrien" ; "single word")]
    #[test_case("  ", "" ; "blank")]
    fn normalizes_names(name: &str, expected: &str) {
        assert_eq!(normalize_name(name), expected);
    }

    #[test]
    fn lookup_ignores_name_order() {
        let table: RatingTable = [("Doe, Jane", info(4.5))].into_iter().collect();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup("Jane A. Doe"), Some(&info(4.5)));
        assert_eq!(table.lookup("John Roe"), None);
    }

    #[tokio::test]
    async fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        let json = serde_json::json!({ "Jane Doe": info(4.0) }).to_string();
        fs::write(&path, json).await.unwrap();
        let table = RatingTable::load(&path).await.unwrap();
        assert_eq!(table.lookup("jane doe"), Some(&info(4.0)));
    }
}
