use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::extract::CodeCategory;

/// One terminology dictionary entry. Only `positive_terms` feeds
/// descriptions; any other fields in the source file are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminologyEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub positive_terms: Vec<String>,
}

/// The dictionary ships in two shapes: a flat `code -> entry` map, or a list
/// of entries each carrying its own `code` field. Both normalize to the map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TerminologyFile {
    Entries(Vec<TerminologyEntry>),
    Map(HashMap<String, TerminologyEntry>),
}

/// Immutable `code -> entry` table, built once at startup and shared
/// read-only across requests.
#[derive(Debug, Default)]
pub struct Terminology {
    entries: HashMap<String, TerminologyEntry>,
}

impl Terminology {
    /// Load the table from `path`. A missing file degrades to an empty table;
    /// a present-but-malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Terminology file {} not found; continuing with an empty table",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read terminology {}", path.display()));
            }
        };

        let parsed: TerminologyFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse terminology {}", path.display()))?;

        let entries = match parsed {
            TerminologyFile::Map(map) => map,
            TerminologyFile::Entries(list) => {
                let mut map = HashMap::new();
                for entry in list {
                    let Some(code) = entry.code.clone().filter(|c| !c.is_empty()) else {
                        continue;
                    };
                    map.insert(code, entry);
                }
                map
            }
        };

        Ok(Self { entries })
    }

    pub fn from_entries(entries: HashMap<String, TerminologyEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable description for `code`: the first positive term when
    /// the dictionary has one, else a generic `<CATEGORY> code <code>` label.
    pub fn describe(&self, category: CodeCategory, code: &str) -> String {
        self.entries
            .get(code)
            .and_then(|entry| entry.positive_terms.first())
            .cloned()
            .unwrap_or_else(|| format!("{} code {}", category.label(), code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn loads_flat_map_shape() {
        let path = write_temp(
            "terminology_map.json",
            r#"{"F41.1": {"positive_terms": ["Generalized anxiety disorder"]}}"#,
        );
        let table = Terminology::load(&path).expect("load");
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.describe(CodeCategory::Icd10, "F41.1"),
            "Generalized anxiety disorder"
        );
    }

    #[test]
    fn loads_entry_list_shape() {
        let path = write_temp(
            "terminology_list.json",
            r#"[
                {"code": "99213", "positive_terms": ["Office visit, established patient"]},
                {"positive_terms": ["orphan entry without code"]},
                {"code": "", "positive_terms": ["blank code dropped"]}
            ]"#,
        );
        let table = Terminology::load(&path).expect("load");
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.describe(CodeCategory::Cpt, "99213"),
            "Office visit, established patient"
        );
    }

    #[test]
    fn missing_file_degrades_to_empty_table() {
        let path = std::env::temp_dir().join("terminology_definitely_absent.json");
        let _ = std::fs::remove_file(&path);
        let table = Terminology::load(&path).expect("load");
        assert!(table.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = write_temp("terminology_bad.json", "not json at all");
        assert!(Terminology::load(&path).is_err());
    }

    #[test]
    fn describe_falls_back_per_category() {
        let table = Terminology::default();
        assert_eq!(
            table.describe(CodeCategory::Icd10, "F41.9"),
            "ICD-10 code F41.9"
        );
        assert_eq!(table.describe(CodeCategory::Cpt, "99213"), "CPT code 99213");
        assert_eq!(
            table.describe(CodeCategory::Hcpcs, "J3490"),
            "HCPCS code J3490"
        );
    }

    #[test]
    fn empty_positive_terms_falls_back_to_generic_label() {
        let path = write_temp(
            "terminology_empty_terms.json",
            r#"{"F41.1": {"positive_terms": []}}"#,
        );
        let table = Terminology::load(&path).expect("load");
        assert_eq!(
            table.describe(CodeCategory::Icd10, "F41.1"),
            "ICD-10 code F41.1"
        );
    }
}
