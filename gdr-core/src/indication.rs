//! Fuzzy matching of free-text indications against a built-in clinical
//! dictionary and the facility's allowed-indication lists.
//!
//! Matching is deterministic and stateless: the same input, target class,
//! and allowed list always produce the same result, so callers recompute on
//! every evaluation instead of storing match output.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{IndicationMatchResult, MatchSource, TherapeuticClass};

/// Minimum confidence for a match to count, on either path.
const MATCH_THRESHOLD: f64 = 0.6;

/// Confidence assigned when a recognized ICD-10 or SNOMED code is present.
const CODE_MATCH_CONFIDENCE: f64 = 0.95;

/// Filler words ignored when comparing indication text.
const STOP_WORDS: [&str; 12] = [
    "a", "an", "and", "the", "of", "with", "for", "to", "in", "on", "or", "due",
];

static ICD10_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]\d{2}(?:\.\w{1,4})?\b").unwrap());
static SNOMED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{6,9}\b").unwrap());

struct ClinicalEntry {
    /// Primary ICD-10 code, doubling as the stable entry id.
    id: &'static str,
    /// The medication class this diagnosis can justify.
    class: TherapeuticClass,
    label: &'static str,
    icd10: &'static [&'static str],
    snomed: &'static [&'static str],
    synonyms: &'static [&'static str],
}

/// Diagnoses that justify psychotropic use in long-term care, with the code
/// spellings and shorthand staff actually write on medication lines.
const CLINICAL_DICTIONARY: &[ClinicalEntry] = &[
    ClinicalEntry {
        id: "F20.9",
        class: TherapeuticClass::Antipsychotic,
        label: "Schizophrenia",
        icd10: &["F20.9", "F20"],
        snomed: &["58214004"],
        synonyms: &["chronic schizophrenia", "paranoid schizophrenia"],
    },
    ClinicalEntry {
        id: "F25.9",
        class: TherapeuticClass::Antipsychotic,
        label: "Schizoaffective disorder",
        icd10: &["F25.9", "F25"],
        snomed: &["68890003"],
        synonyms: &[],
    },
    ClinicalEntry {
        id: "F31.9",
        class: TherapeuticClass::Antipsychotic,
        label: "Bipolar disorder",
        icd10: &["F31.9", "F31"],
        snomed: &["13746004"],
        synonyms: &["bipolar affective disorder", "manic depression"],
    },
    ClinicalEntry {
        id: "F29",
        class: TherapeuticClass::Antipsychotic,
        label: "Psychotic disorder",
        icd10: &["F29"],
        snomed: &["69322001"],
        synonyms: &["psychosis", "unspecified psychosis"],
    },
    ClinicalEntry {
        id: "F03.91",
        class: TherapeuticClass::Antipsychotic,
        label: "Dementia with behavioral disturbance",
        icd10: &["F03.91", "F03.90"],
        snomed: &["52448006"],
        synonyms: &["dementia with behaviors", "dementia related behaviors"],
    },
    ClinicalEntry {
        id: "R45.1",
        class: TherapeuticClass::Antipsychotic,
        label: "Agitation",
        icd10: &["R45.1"],
        snomed: &["24199005"],
        synonyms: &["restlessness and agitation", "severe agitation"],
    },
    ClinicalEntry {
        id: "F32.9",
        class: TherapeuticClass::Antidepressant,
        label: "Major depressive disorder",
        icd10: &["F32.9", "F33.9", "F32", "F33"],
        snomed: &["35489007"],
        synonyms: &["depression", "depressive disorder", "mdd"],
    },
    ClinicalEntry {
        id: "F43.10",
        class: TherapeuticClass::Antidepressant,
        label: "Post-traumatic stress disorder",
        icd10: &["F43.10", "F43.1"],
        snomed: &["47505003"],
        synonyms: &["ptsd"],
    },
    ClinicalEntry {
        id: "F42.9",
        class: TherapeuticClass::Antidepressant,
        label: "Obsessive-compulsive disorder",
        icd10: &["F42.9", "F42"],
        snomed: &["191736004"],
        synonyms: &["ocd"],
    },
    ClinicalEntry {
        id: "F41.1",
        class: TherapeuticClass::Antianxiety,
        label: "Generalized anxiety disorder",
        icd10: &["F41.1", "F41.9"],
        snomed: &["21897009", "48694002"],
        synonyms: &["anxiety", "anxiety disorder", "gad"],
    },
    ClinicalEntry {
        id: "F41.0",
        class: TherapeuticClass::Antianxiety,
        label: "Panic disorder",
        icd10: &["F41.0"],
        snomed: &["371631005"],
        synonyms: &["panic attacks"],
    },
    ClinicalEntry {
        id: "F10.239",
        class: TherapeuticClass::Antianxiety,
        label: "Alcohol withdrawal",
        icd10: &["F10.239"],
        snomed: &["191480000"],
        synonyms: &["alcohol withdrawal syndrome", "etoh withdrawal"],
    },
    ClinicalEntry {
        id: "G47.00",
        class: TherapeuticClass::Hypnotic,
        label: "Insomnia",
        icd10: &["G47.00", "F51.01"],
        snomed: &["193462001"],
        synonyms: &["sleep disturbance", "difficulty sleeping", "sleeplessness"],
    },
    ClinicalEntry {
        id: "F90.9",
        class: TherapeuticClass::Stimulant,
        label: "Attention-deficit hyperactivity disorder",
        icd10: &["F90.9", "F90.0"],
        snomed: &["406506008"],
        synonyms: &["adhd", "attention deficit disorder"],
    },
    ClinicalEntry {
        id: "G40.909",
        class: TherapeuticClass::Anticonvulsant,
        label: "Epilepsy",
        icd10: &["G40.909", "G40.9"],
        snomed: &["84757009"],
        synonyms: &["seizure disorder", "seizures"],
    },
];

fn significant_tokens(text: &str) -> Vec<String> {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    spaced
        .split_whitespace()
        .filter(|t| t.len() > 1 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Similarity between two indication strings in `[0, 1]`. Symmetric: a
/// shared word counts once however often either side repeats it.
///
/// Trimmed case-insensitive equality scores 1.0 even when every token
/// would be dropped as noise. Below that, token-normalized equality scores
/// 1.0, one side containing the other 0.85, and token overlap falls into
/// fixed buckets, so a substring hit always outranks a partial word
/// overlap.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.trim();
    let b = b.trim();
    if !a.is_empty() && a.to_lowercase() == b.to_lowercase() {
        return 1.0;
    }

    let tokens_a = significant_tokens(a);
    let tokens_b = significant_tokens(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let joined_a = tokens_a.join(" ");
    let joined_b = tokens_b.join(" ");
    if joined_a == joined_b {
        return 1.0;
    }
    if joined_a.contains(&joined_b) || joined_b.contains(&joined_a) {
        return 0.85;
    }

    let set_a: BTreeSet<&str> = tokens_a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = tokens_b.iter().map(String::as_str).collect();
    let shared = set_a.intersection(&set_b).count();
    let ratio = shared as f64 / tokens_a.len().max(tokens_b.len()) as f64;
    if ratio >= 0.75 {
        0.8
    } else if ratio >= 0.5 {
        0.65
    } else if ratio >= 0.35 {
        0.5
    } else {
        0.0
    }
}

fn entries_for(class: TherapeuticClass) -> impl Iterator<Item = &'static ClinicalEntry> {
    CLINICAL_DICTIONARY.iter().filter(move |e| e.class == class)
}

fn code_match(text: &str, class: TherapeuticClass) -> Option<&'static ClinicalEntry> {
    let upper = text.to_uppercase();
    let icd_tokens: Vec<&str> = ICD10_CODE.find_iter(&upper).map(|m| m.as_str()).collect();
    let snomed_tokens: Vec<&str> = SNOMED_CODE.find_iter(text).map(|m| m.as_str()).collect();
    if icd_tokens.is_empty() && snomed_tokens.is_empty() {
        return None;
    }
    entries_for(class).find(|entry| {
        icd_tokens.iter().any(|t| entry.icd10.contains(t))
            || snomed_tokens.iter().any(|t| entry.snomed.contains(t))
    })
}

fn best_dictionary_match(
    text: &str,
    class: TherapeuticClass,
) -> (f64, Option<&'static ClinicalEntry>) {
    let mut best_score = 0.0;
    let mut best_entry = None;
    for entry in entries_for(class) {
        let mut score = similarity(text, entry.label);
        for synonym in entry.synonyms {
            score = score.max(similarity(text, synonym));
        }
        if score > best_score {
            best_score = score;
            best_entry = Some(entry);
        }
    }
    (best_score, best_entry)
}

fn best_allowed_match<'a>(text: &str, allowed: &'a [String]) -> (f64, Option<&'a str>) {
    let mut best_score = 0.0;
    let mut best_label = None;
    for candidate in allowed {
        let score = similarity(text, candidate);
        if score > best_score {
            best_score = score;
            best_label = Some(candidate.as_str());
        }
    }
    (best_score, best_label)
}

/// Resolve a free-text indication for a medication of `class`.
///
/// The clinical dictionary is consulted first, restricted to entries for
/// that class: a recognized ICD-10 or SNOMED code wins outright, otherwise
/// the best label/synonym similarity decides. Only when the dictionary has
/// no match does the facility's allowed list get a turn, scored the same
/// way. Below the threshold on both paths the result is unmatched but
/// still carries the best score seen.
pub fn resolve_indication(
    text: &str,
    class: TherapeuticClass,
    allowed: Option<&[String]>,
) -> IndicationMatchResult {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return IndicationMatchResult::unmatched(0.0);
    }

    if let Some(entry) = code_match(trimmed, class) {
        return IndicationMatchResult {
            matched: true,
            confidence: CODE_MATCH_CONFIDENCE,
            source: MatchSource::ClinicalDictionary,
            label: Some(entry.label.to_string()),
            entry_id: Some(entry.id.to_string()),
        };
    }

    let (dict_score, dict_entry) = best_dictionary_match(trimmed, class);
    if dict_score >= MATCH_THRESHOLD {
        if let Some(entry) = dict_entry {
            return IndicationMatchResult {
                matched: true,
                confidence: dict_score,
                source: MatchSource::ClinicalDictionary,
                label: Some(entry.label.to_string()),
                entry_id: Some(entry.id.to_string()),
            };
        }
    }

    let (map_score, map_label) = match allowed {
        Some(list) => best_allowed_match(trimmed, list),
        None => (0.0, None),
    };
    if map_score >= MATCH_THRESHOLD {
        return IndicationMatchResult {
            matched: true,
            confidence: map_score,
            source: MatchSource::IndicationMap,
            label: map_label.map(str::to_string),
            entry_id: None,
        };
    }

    IndicationMatchResult::unmatched(dict_score.max(map_score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icd10_code_beats_text_matching() {
        let result = resolve_indication("dx F32.9 per chart", TherapeuticClass::Antidepressant, None);
        assert!(result.matched);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.source, MatchSource::ClinicalDictionary);
        assert_eq!(result.label.as_deref(), Some("Major depressive disorder"));
        assert_eq!(result.entry_id.as_deref(), Some("F32.9"));
    }

    #[test]
    fn snomed_code_is_recognized() {
        let result = resolve_indication("snomed 58214004", TherapeuticClass::Antipsychotic, None);
        assert!(result.matched);
        assert_eq!(result.label.as_deref(), Some("Schizophrenia"));
    }

    #[test]
    fn code_for_another_class_does_not_match() {
        // F32.9 is a depression code; it cannot justify an antipsychotic.
        let result = resolve_indication("dx F32.9", TherapeuticClass::Antipsychotic, None);
        assert!(!result.matched);
        assert_eq!(result.source, MatchSource::None);
    }

    #[test]
    fn exact_label_scores_full_confidence() {
        let result = resolve_indication("Schizophrenia", TherapeuticClass::Antipsychotic, None);
        assert!(result.matched);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.source, MatchSource::ClinicalDictionary);
    }

    #[test]
    fn synonyms_resolve_to_the_canonical_label() {
        let result = resolve_indication("PTSD", TherapeuticClass::Antidepressant, None);
        assert!(result.matched);
        assert_eq!(
            result.label.as_deref(),
            Some("Post-traumatic stress disorder")
        );
    }

    #[test]
    fn containment_scores_higher_than_token_overlap() {
        assert_eq!(similarity("chronic insomnia", "insomnia"), 0.85);
        assert_eq!(
            similarity("anxiety disorder generalized", "generalized anxiety disorder"),
            0.8
        );
    }

    #[test]
    fn repeated_words_count_once_in_the_overlap() {
        // One shared word out of three significant tokens sits below every
        // bucket, from either side.
        assert_eq!(similarity("hospice hospice comfort", "hospice care"), 0.0);
        assert_eq!(similarity("hospice care", "hospice hospice comfort"), 0.0);

        let allowed = vec!["hospice care".to_string()];
        let result = resolve_indication(
            "hospice hospice comfort",
            TherapeuticClass::Hypnotic,
            Some(&allowed),
        );
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.source, MatchSource::None);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [
            ("hospice hospice comfort", "hospice care"),
            ("agitation agitation", "agitation dementia"),
            ("chronic insomnia", "insomnia"),
            ("mood disorder", "bipolar disorder"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn similarity_is_reflexive_for_real_text() {
        for text in ["schizophrenia", "major depressive disorder", "sleep disturbance"] {
            assert_eq!(similarity(text, text), 1.0);
        }
    }

    #[test]
    fn identical_short_token_text_is_still_reflexive() {
        // "x" and "y" fall out of tokenization entirely; only the raw
        // equality check can score these.
        assert_eq!(similarity("x y", "x y"), 1.0);
        assert_eq!(similarity(" X y", "x Y "), 1.0);
        assert_eq!(similarity("x y", "y z"), 0.0);
    }

    #[test]
    fn stop_words_do_not_affect_the_score() {
        assert_eq!(
            similarity("agitation due to dementia", "agitation dementia"),
            1.0
        );
    }

    #[test]
    fn unrelated_text_stays_unmatched_with_best_score() {
        let result = resolve_indication("left knee pain", TherapeuticClass::Antipsychotic, None);
        assert!(!result.matched);
        assert_eq!(result.source, MatchSource::None);
        assert!(result.confidence < MATCH_THRESHOLD);
        assert!(result.label.is_none());
    }

    #[test]
    fn empty_input_is_unmatched_at_zero() {
        let result = resolve_indication("   ", TherapeuticClass::Antipsychotic, None);
        assert!(!result.matched);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn facility_list_is_consulted_when_the_dictionary_misses() {
        let allowed = vec!["hospice comfort care".to_string()];
        let result = resolve_indication(
            "hospice comfort care",
            TherapeuticClass::Antipsychotic,
            Some(&allowed),
        );
        assert!(result.matched);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.source, MatchSource::IndicationMap);
        assert_eq!(result.label.as_deref(), Some("hospice comfort care"));
        assert!(result.entry_id.is_none());
    }

    #[test]
    fn dictionary_match_preempts_the_facility_list() {
        let allowed = vec!["insomnia".to_string()];
        let result =
            resolve_indication("insomnia", TherapeuticClass::Hypnotic, Some(&allowed));
        assert_eq!(result.source, MatchSource::ClinicalDictionary);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn cross_class_indication_falls_through_to_the_facility_list() {
        // SSRIs are often written for anxiety; the dictionary files that
        // diagnosis under antianxiety, so the antidepressant list catches it.
        let allowed = vec!["generalized anxiety disorder".to_string()];
        let result = resolve_indication(
            "generalized anxiety disorder",
            TherapeuticClass::Antidepressant,
            Some(&allowed),
        );
        assert!(result.matched);
        assert_eq!(result.source, MatchSource::IndicationMap);
    }
}
