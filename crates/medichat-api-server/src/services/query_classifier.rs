/// Query Intent Classifier
/// Maps free-form user text to one of three handling strategies. Symptom
/// keywords win over facility keywords when both match, so the same text
/// always carries the same tag into the persisted history.
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    /// "I have a headache", "my back hurts"
    Symptom,
    /// "find me a clinic", "hospital nearby"
    Location,
    /// Everything else: open-ended medical Q&A
    General,
}

impl QueryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Location => "location",
            Self::General => "general",
        }
    }
}

const SYMPTOM_KEYWORDS: &[&str] = &["symptom", "feel", "pain", "hurt", "sick", "ache"];
const LOCATION_KEYWORDS: &[&str] = &["clinic", "hospital", "doctor", "facility", "nearby"];

/// Pure and deterministic: no state, no I/O, always returns a category.
pub fn classify(query: &str) -> QueryCategory {
    let query_lower = query.to_lowercase();

    if SYMPTOM_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        debug!("Classified as symptom query");
        return QueryCategory::Symptom;
    }

    if LOCATION_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
        debug!("Classified as location query");
        return QueryCategory::Location;
    }

    debug!("Classified as general query");
    QueryCategory::General
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symptom_keywords() {
        assert_eq!(classify("I have a headache and fever"), QueryCategory::Symptom);
        assert_eq!(classify("my stomach hurts"), QueryCategory::Symptom);
        assert_eq!(classify("I feel dizzy"), QueryCategory::Symptom);
        assert_eq!(classify("chest PAIN since morning"), QueryCategory::Symptom);
    }

    #[test]
    fn test_location_keywords() {
        assert_eq!(classify("find me a clinic"), QueryCategory::Location);
        assert_eq!(classify("is there a hospital nearby?"), QueryCategory::Location);
        assert_eq!(classify("I need a doctor"), QueryCategory::Location);
    }

    #[test]
    fn test_general_fallback() {
        assert_eq!(classify("what is a balanced diet?"), QueryCategory::General);
        assert_eq!(classify(""), QueryCategory::General);
    }

    #[test]
    fn test_symptom_wins_over_location() {
        // Both keyword sets match; symptom set is checked first
        assert_eq!(
            classify("the pain is bad, should I go to a hospital?"),
            QueryCategory::Symptom
        );
        assert_eq!(
            classify("I feel sick, find me a clinic"),
            QueryCategory::Symptom
        );
    }

    #[test]
    fn test_deterministic() {
        let text = "I have a headache and fever";
        let first = classify(text);
        for _ in 0..10 {
            assert_eq!(classify(text), first);
        }
    }
}
