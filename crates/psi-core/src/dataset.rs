//! Client dataset, correlation maps and server dataset pages

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// The client's local dataset: a set of unique opaque strings
///
/// Iteration is sorted, which is the order identifiers are minted in.
/// Re-runs over the same file therefore produce the same identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDataset {
    entries: BTreeSet<String>,
}

impl ClientDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a line-oriented dataset file, one entry per line
    ///
    /// Blank lines are skipped and duplicate lines collapse into one entry.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_lines(&content))
    }

    /// Parse dataset content, one entry per line
    pub fn from_lines(content: &str) -> Self {
        content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn insert(&mut self, entry: impl Into<String>) -> bool {
        self.entries.insert(entry.into())
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }

    /// Keep only the entries matching `predicate`
    pub fn filtered(&self, mut predicate: impl FnMut(&str) -> bool) -> Self {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.as_str()))
            .cloned()
            .collect()
    }
}

impl FromIterator<String> for ClientDataset {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for ClientDataset {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

/// Dataset entries keyed by the identifiers minted for this run
///
/// Identifiers are sequential from 0 and never reused within a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedDataset {
    entries: BTreeMap<u64, String>,
}

impl IndexedDataset {
    /// Mint identifiers `0..n` over the dataset in its sorted order
    pub fn from_dataset(dataset: &ClientDataset) -> Self {
        let entries = dataset
            .iter()
            .enumerate()
            .map(|(id, entry)| (id as u64, entry.clone()))
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.entries.iter().map(|(id, entry)| (*id, entry.as_str()))
    }

    pub fn ids(&self) -> BTreeSet<u64> {
        self.entries.keys().copied().collect()
    }
}

/// Identifier to encrypted value
///
/// Two of these exist per run: the client's single encryption and the
/// server's double encryption. Both must carry the same identifier set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryCorrelationMap(BTreeMap<u64, String>);

impl EntryCorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64, value: String) -> Option<String> {
        self.0.insert(id, value)
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &str)> {
        self.0.iter().map(|(id, value)| (*id, value.as_str()))
    }

    pub fn ids(&self) -> BTreeSet<u64> {
        self.0.keys().copied().collect()
    }

    /// True when both maps carry exactly the same identifiers
    pub fn same_ids(&self, other: &EntryCorrelationMap) -> bool {
        self.0.len() == other.0.len() && self.0.keys().eq(other.0.keys())
    }

    /// Identifiers present in exactly one of the two maps
    pub fn id_difference(&self, other: &EntryCorrelationMap) -> Vec<u64> {
        let ours = self.ids();
        let theirs = other.ids();
        ours.symmetric_difference(&theirs).copied().collect()
    }
}

impl FromIterator<(u64, String)> for EntryCorrelationMap {
    fn from_iter<I: IntoIterator<Item = (u64, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One page of the server's encrypted dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDatasetPage {
    /// Page index, starting at 0
    pub page: u32,
    /// Requested page size
    pub size: u32,
    /// Number of entries the server reports for this page
    pub entries: u32,
    /// Set only on the final page
    pub last: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<u64>,
    /// Server-encrypted values
    #[serde(default)]
    pub content: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_dataset_from_lines() {
        let dataset = ClientDataset::from_lines("B\nA\r\n\nA\nC\n");
        assert_eq!(dataset.len(), 3);
        let entries: Vec<&String> = dataset.iter().collect();
        assert_eq!(entries, ["A", "B", "C"]);
    }

    #[test]
    fn test_dataset_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "COMMON1").unwrap();
        writeln!(file, "A").unwrap();
        writeln!(file, "COMMON1").unwrap();

        let dataset = ClientDataset::load(file.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.contains("COMMON1"));
        assert!(dataset.contains("A"));
    }

    #[test]
    fn test_dataset_load_missing_file() {
        let err = ClientDataset::load("/nonexistent/psi-dataset.txt").unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }

    #[test]
    fn test_identifiers_are_sequential_and_deterministic() {
        let dataset: ClientDataset = ["zeta", "alpha", "mid"].into_iter().collect();
        let first = IndexedDataset::from_dataset(&dataset);
        let second = IndexedDataset::from_dataset(&dataset.clone());

        assert_eq!(first, second);
        assert_eq!(first.ids(), (0..3).collect::<BTreeSet<u64>>());
        assert_eq!(first.get(0), Some("alpha"));
        assert_eq!(first.get(2), Some("zeta"));
    }

    #[test]
    fn test_correlation_map_id_checks() {
        let a: EntryCorrelationMap = [(0, "x".to_string()), (1, "y".to_string())]
            .into_iter()
            .collect();
        let b: EntryCorrelationMap = [(0, "xx".to_string()), (1, "yy".to_string())]
            .into_iter()
            .collect();
        let c: EntryCorrelationMap = [(0, "xx".to_string()), (2, "zz".to_string())]
            .into_iter()
            .collect();

        assert!(a.same_ids(&b));
        assert!(!a.same_ids(&c));
        assert_eq!(a.id_difference(&c), vec![1, 2]);
    }

    #[test]
    fn test_correlation_map_wire_shape() {
        let map: EntryCorrelationMap = [(0, "x".to_string()), (7, "y".to_string())]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"0":"x","7":"y"}"#);

        let parsed: EntryCorrelationMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn test_page_defaults_missing_fields() {
        let page: ServerDatasetPage =
            serde_json::from_str(r#"{"page":3,"size":100,"entries":0,"last":false}"#).unwrap();
        assert_eq!(page.page, 3);
        assert!(page.content.is_empty());
        assert!(!page.last);
        assert_eq!(page.total_pages, None);
    }
}
