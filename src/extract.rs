use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Code systems this backend extracts and ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeCategory {
    Icd10,
    Cpt,
    Hcpcs,
}

/// Which strategy produced a candidate: a structured metadata field on the
/// passage, or pattern extraction over the passage text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSource {
    Metadata,
    TextExtraction,
}

impl CodeCategory {
    pub const ALL: [CodeCategory; 3] =
        [CodeCategory::Icd10, CodeCategory::Cpt, CodeCategory::Hcpcs];

    pub fn label(self) -> &'static str {
        match self {
            CodeCategory::Icd10 => "ICD-10",
            CodeCategory::Cpt => "CPT",
            CodeCategory::Hcpcs => "HCPCS",
        }
    }

    /// How many codes of this category survive ranking.
    pub fn result_limit(self) -> usize {
        match self {
            CodeCategory::Icd10 => 20,
            CodeCategory::Cpt => 15,
            CodeCategory::Hcpcs => 10,
        }
    }

    /// Metadata keys probed in priority order. Upstream chunkers have keyed
    /// these fields inconsistently, so each category carries its aliases.
    fn metadata_keys(self) -> &'static [&'static str] {
        match self {
            CodeCategory::Icd10 => &["icd10_codes", "icd10", "icd_10", "icd-10"],
            CodeCategory::Cpt => &["cpt_codes", "cpt", "procedure_codes"],
            CodeCategory::Hcpcs => &["hcpcs_codes", "hcpcs"],
        }
    }

    fn text_pattern(self) -> Option<&'static Regex> {
        match self {
            CodeCategory::Icd10 => Some(icd10_pattern()),
            CodeCategory::Cpt => Some(cpt_pattern()),
            // HCPCS codes only arrive through structured metadata.
            CodeCategory::Hcpcs => None,
        }
    }

    fn is_valid(self, code: &str) -> bool {
        match self {
            CodeCategory::Icd10 => code.len() >= 3 && icd10_prefix_pattern().is_match(code),
            CodeCategory::Cpt => code.len() == 5 && code.bytes().all(|b| b.is_ascii_digit()),
            CodeCategory::Hcpcs => !code.is_empty(),
        }
    }
}

// ICD-10 chapter letters exclude U (reserved range).
fn icd10_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-TV-Z][0-9]{2}(?:\.[0-9]{1,4})?\b").expect("ICD-10 regex must compile")
    })
}

fn icd10_prefix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-TV-Z][0-9]{2}").expect("ICD-10 prefix regex must compile"))
}

fn cpt_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[0-9]{5}\b").expect("CPT regex must compile"))
}

/// Extract raw `(code, source)` candidates for one category from one passage.
///
/// Metadata fields are preferred; pattern extraction over the passage text is
/// only attempted when no metadata key yields a value for the category, so a
/// populated-but-unparseable metadata field never falls through to text.
/// Tokens failing the category's shape check are dropped silently, and
/// repeated code values within the passage keep only their first occurrence.
pub fn extract_codes(
    text: &str,
    metadata: &HashMap<String, String>,
    category: CodeCategory,
) -> Vec<(String, CodeSource)> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    if let Some(raw) = first_metadata_value(metadata, category) {
        for token in raw.split([',', ';']) {
            push_candidate(token, CodeSource::Metadata, category, &mut out, &mut seen);
        }
        return out;
    }

    let Some(pattern) = category.text_pattern() else {
        return out;
    };
    for m in pattern.find_iter(text) {
        push_candidate(
            m.as_str(),
            CodeSource::TextExtraction,
            category,
            &mut out,
            &mut seen,
        );
    }
    out
}

fn first_metadata_value<'a>(
    metadata: &'a HashMap<String, String>,
    category: CodeCategory,
) -> Option<&'a str> {
    category.metadata_keys().iter().find_map(|key| {
        metadata
            .get(*key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    })
}

fn push_candidate(
    token: &str,
    source: CodeSource,
    category: CodeCategory,
    out: &mut Vec<(String, CodeSource)>,
    seen: &mut HashSet<String>,
) {
    let code = token.trim();
    if !category.is_valid(code) {
        return;
    }
    if seen.insert(code.to_string()) {
        out.push((code.to_string(), source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn icd10_codes_extracted_from_text_when_metadata_absent() {
        let codes = extract_codes("diagnosed with F41.1", &HashMap::new(), CodeCategory::Icd10);
        assert_eq!(
            codes,
            vec![("F41.1".to_string(), CodeSource::TextExtraction)]
        );
    }

    #[test]
    fn metadata_value_splits_on_commas_and_semicolons() {
        let metadata = meta(&[("icd10_codes", "F41.1, F41.9;E11.9")]);
        let codes = extract_codes("", &metadata, CodeCategory::Icd10);
        let values: Vec<&str> = codes.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(values, vec!["F41.1", "F41.9", "E11.9"]);
        assert!(codes.iter().all(|(_, s)| *s == CodeSource::Metadata));
    }

    #[test]
    fn metadata_keys_probed_in_priority_order() {
        let metadata = meta(&[("icd10", "E11.9"), ("icd10_codes", "F41.1")]);
        let codes = extract_codes("", &metadata, CodeCategory::Icd10);
        assert_eq!(codes, vec![("F41.1".to_string(), CodeSource::Metadata)]);
    }

    #[test]
    fn empty_metadata_value_falls_through_to_next_key() {
        let metadata = meta(&[("icd10_codes", "  "), ("icd10", "F41.1")]);
        let codes = extract_codes("", &metadata, CodeCategory::Icd10);
        assert_eq!(codes, vec![("F41.1".to_string(), CodeSource::Metadata)]);
    }

    #[test]
    fn metadata_strategy_suppresses_text_fallback_even_when_invalid() {
        // A populated metadata field that validates to nothing still counts as
        // the metadata strategy having fired for this category.
        let metadata = meta(&[("icd10_codes", "not-a-code")]);
        let codes = extract_codes("text mentions F41.1", &metadata, CodeCategory::Icd10);
        assert!(codes.is_empty());
    }

    #[test]
    fn icd10_validation_drops_short_and_misshapen_tokens() {
        let metadata = meta(&[("icd10_codes", "X9, F41.1, U07.1, 123")]);
        let codes = extract_codes("", &metadata, CodeCategory::Icd10);
        assert_eq!(codes, vec![("F41.1".to_string(), CodeSource::Metadata)]);
    }

    #[test]
    fn cpt_validation_requires_exactly_five_digits() {
        let metadata = meta(&[("cpt_codes", "99213, 9921, 992134, 9921a")]);
        let codes = extract_codes("", &metadata, CodeCategory::Cpt);
        assert_eq!(codes, vec![("99213".to_string(), CodeSource::Metadata)]);
    }

    #[test]
    fn cpt_procedure_codes_alias_recognized() {
        let metadata = meta(&[("procedure_codes", "99213")]);
        let codes = extract_codes("", &metadata, CodeCategory::Cpt);
        assert_eq!(codes, vec![("99213".to_string(), CodeSource::Metadata)]);
    }

    #[test]
    fn cpt_text_extraction_matches_bounded_five_digit_runs() {
        let codes = extract_codes(
            "billed 99213 and 99214, claim 123456 ignored",
            &HashMap::new(),
            CodeCategory::Cpt,
        );
        let values: Vec<&str> = codes.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(values, vec!["99213", "99214"]);
    }

    #[test]
    fn hcpcs_has_no_text_fallback() {
        let codes = extract_codes("supply J3490 was used", &HashMap::new(), CodeCategory::Hcpcs);
        assert!(codes.is_empty());
    }

    #[test]
    fn hcpcs_metadata_keeps_any_nonempty_token() {
        let metadata = meta(&[("hcpcs_codes", "J3490, , E0601")]);
        let codes = extract_codes("", &metadata, CodeCategory::Hcpcs);
        let values: Vec<&str> = codes.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(values, vec!["J3490", "E0601"]);
    }

    #[test]
    fn duplicate_tokens_within_a_passage_kept_once() {
        let metadata = meta(&[("icd10_codes", "F41.1, F41.1; F41.1")]);
        let codes = extract_codes("", &metadata, CodeCategory::Icd10);
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn icd10_text_pattern_excludes_u_chapter_and_lowercase() {
        let codes = extract_codes(
            "U07.1 and f41.1 should not match, but G43.909 should",
            &HashMap::new(),
            CodeCategory::Icd10,
        );
        assert_eq!(
            codes,
            vec![("G43.909".to_string(), CodeSource::TextExtraction)]
        );
    }

    #[test]
    fn empty_passage_contributes_nothing() {
        for category in CodeCategory::ALL {
            assert!(extract_codes("", &HashMap::new(), category).is_empty());
        }
    }
}
