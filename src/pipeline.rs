use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::extract::{self, CodeCategory, CodeSource};
use crate::terminology::Terminology;

/// One scored unit of retrieved text, as returned by the similarity search.
/// Metadata keys are not guaranteed present or consistently named.
#[derive(Debug, Clone)]
pub struct Passage {
    pub text: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// A deduplicated, described, ranked code in the response.
#[derive(Debug, Clone, Serialize)]
pub struct RankedCode {
    pub code: String,
    pub description: String,
    pub score: f32,
    pub source: CodeSource,
}

/// Ranked code lists per category. An empty category serializes as an empty
/// array, never as a missing field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CodeBuckets {
    pub icd10: Vec<RankedCode>,
    pub cpt: Vec<RankedCode>,
    pub hcpcs: Vec<RankedCode>,
}

impl CodeBuckets {
    pub fn total_codes(&self) -> usize {
        self.icd10.len() + self.cpt.len() + self.hcpcs.len()
    }

    fn bucket_mut(&mut self, category: CodeCategory) -> &mut Vec<RankedCode> {
        match category {
            CodeCategory::Icd10 => &mut self.icd10,
            CodeCategory::Cpt => &mut self.cpt,
            CodeCategory::Hcpcs => &mut self.hcpcs,
        }
    }
}

/// Run the full pipeline over the passages in collaborator order: drop
/// excluded passages, extract candidates per category, consolidate with
/// first-seen-wins dedup, attach descriptions, rank by score, truncate.
///
/// First-seen-wins is deliberate: the first passage that yields a code fixes
/// its score, description, and source; later occurrences are ignored even
/// when they score higher.
pub fn consolidate(
    passages: &[Passage],
    exclusion_terms: &[String],
    terminology: &Terminology,
) -> CodeBuckets {
    let kept: Vec<&Passage> = passages
        .iter()
        .filter(|p| !is_excluded(&p.text, exclusion_terms))
        .collect();

    let mut buckets = CodeBuckets::default();
    for category in CodeCategory::ALL {
        let mut entries: Vec<RankedCode> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for passage in &kept {
            for (code, source) in
                extract::extract_codes(&passage.text, &passage.metadata, category)
            {
                if !seen.insert(code.clone()) {
                    continue;
                }
                let description = terminology.describe(category, &code);
                entries.push(RankedCode {
                    code,
                    description,
                    score: passage.score,
                    source,
                });
            }
        }

        // Stable sort keeps first-seen order among equal scores.
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        entries.truncate(category.result_limit());
        *buckets.bucket_mut(category) = entries;
    }
    buckets
}

/// True when the passage text contains any exclusion term as a
/// case-insensitive substring. An excluded passage is suppressed entirely;
/// none of its codes reach consolidation.
fn is_excluded(text: &str, exclusion_terms: &[String]) -> bool {
    if exclusion_terms.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    exclusion_terms
        .iter()
        .any(|term| haystack.contains(&term.to_lowercase()))
}
