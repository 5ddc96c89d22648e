//! The medication-report pipeline.
//!
//! A medication line mixes name, strength, instructions, schedule, start
//! date, and sometimes an indication or a class label, in no fixed order.
//! Extraction runs as a fixed sequence of stages, each peeling one field
//! off the line and passing the remainder on, so every stage stays small
//! and testable on its own.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use gdr_core::{classify, normalize_drug_name, Medication, TherapeuticClass};

use crate::{normalize_line, take_date, take_mrn, ParseContext, ScanState, UNIT_HEADER};

static CLASS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(antipsychotic|antidepressant|anti-?anxiety|anxiolytic|hypnotic|sedative|stimulant|anticonvulsant|mood stabilizer)s?\b",
    )
    .unwrap()
});
static FOR_PHRASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfor\s+(.+)$").unwrap());
static INSTRUCTION_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(give|take|administer|apply|may|use|hold|offer|notify|call|check|monitor|start|stop|continue|discontinue)\b",
    )
    .unwrap()
});
static ADMIN_VERB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(give|take|administer|apply|may|offer|place|insert|chew|dissolve|swallow|inject|use)\b")
        .unwrap()
});
static QUANTITY_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b\d+(\.\d+)?\s*(tablet|tab|capsule|cap|puff|patch|spray|drop|ml)s?\b")
        .unwrap()
});
static STRENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+(\.\d+)?\s*(mg|mcg|ml|gm?|units?)\b").unwrap());
static FORM_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(tablet|tab|capsule|cap|chewable|patch|cream|solution|suspension)s?\b")
        .unwrap()
});
static BARE_FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(oral|tablet|tab|capsule|cap|solution|suspension|cream|patch|topical)s?\b")
        .unwrap()
});
static FREQUENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(at bedtime|every morning|every evening|every night|once daily|twice daily|three times daily|four times daily|every \d+ hours?|daily|nightly|weekly|as needed|prn|bid|tid|qid|qhs|qam|qpm|q\d+h)\b",
    )
    .unwrap()
});

/// Condition words accepted as an indication when no "for ..." phrase is
/// present and the line simply trails off with a diagnosis.
const FALLBACK_KEYWORDS: [&str; 8] = [
    "depression",
    "anxiety",
    "psychosis",
    "insomnia",
    "schizophrenia",
    "agitation",
    "bipolar",
    "pain",
];

/// Pull a therapeutic-class label phrase out of the line, if one is
/// printed on it. The label becomes a class override that beats whatever
/// the dictionary derives from the drug name.
pub(crate) fn take_class_label(text: &str) -> (Option<TherapeuticClass>, String) {
    let Some(found) = CLASS_LABEL.find(text) else {
        return (None, text.to_string());
    };
    let label = found.as_str().trim_end_matches(['s', 'S']);
    let Some(class) = TherapeuticClass::from_label(label) else {
        return (None, text.to_string());
    };
    let mut rest = String::with_capacity(text.len());
    rest.push_str(&text[..found.start()]);
    rest.push(' ');
    rest.push_str(&text[found.end()..]);
    (Some(class), normalize_line(&rest))
}

fn dedup_words(phrase: &str) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<&str> = Vec::new();
    for word in phrase.split_whitespace() {
        let key = word.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(word);
        }
    }
    out.join(" ")
}

/// Extract the indication. The main path takes a "for <phrase>" segment,
/// cut short at the first delimiter or instruction verb, with repeated
/// words collapsed. Without one, a trailing condition keyword is accepted.
pub(crate) fn take_indication(text: &str) -> (String, String) {
    if let Some(caps) = FOR_PHRASE.captures(text) {
        if let (Some(whole), Some(tail)) = (caps.get(0), caps.get(1)) {
            let phrase = tail.as_str();
            let mut end = phrase
                .find(['.', ';', ',', '[', '('])
                .unwrap_or(phrase.len());
            if let Some(verb) = INSTRUCTION_VERB.find(&phrase[..end]) {
                end = verb.start();
            }
            let indication = dedup_words(phrase[..end].trim());
            if !indication.is_empty() {
                let mut rest = String::with_capacity(text.len());
                rest.push_str(&text[..whole.start()]);
                rest.push(' ');
                rest.push_str(&phrase[end..]);
                return (indication, normalize_line(&rest));
            }
        }
    }

    let Some(last) = text.split_whitespace().last() else {
        return (String::new(), text.to_string());
    };
    let word = last.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if FALLBACK_KEYWORDS.contains(&word.to_lowercase().as_str()) {
        let rest = text
            .rsplit_once(last)
            .map(|(head, _)| head.to_string())
            .unwrap_or_default();
        return (word.to_string(), normalize_line(&rest));
    }
    (String::new(), text.to_string())
}

/// Split what remains into the name/dose segment and the instruction
/// segment. An administration verb or a quantity + dose-form phrase marks
/// the start of instructions; failing that, the boundary is approximated
/// from the first strength token (kept with the name so the dose survives)
/// or, last, the first bare form/route word.
pub(crate) fn split_name_and_instructions(text: &str) -> (String, String) {
    let verb_pos = ADMIN_VERB.find(text).map(|m| m.start());
    let qty_pos = QUANTITY_FORM.find(text).map(|m| m.start());
    let marker = match (verb_pos, qty_pos) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };
    if let Some(pos) = marker {
        return (text[..pos].to_string(), text[pos..].to_string());
    }
    if let Some(found) = STRENGTH.find(text) {
        let mut end = found.end();
        if let Some(suffix) = FORM_SUFFIX.find(&text[end..]) {
            end += suffix.end();
        }
        return (text[..end].to_string(), text[end..].to_string());
    }
    if let Some(found) = BARE_FORM.find(text) {
        if found.start() > 0 {
            return (text[..found.start()].to_string(), text[found.start()..].to_string());
        }
    }
    (text.to_string(), String::new())
}

fn clean_display_name(text: &str) -> String {
    let cleaned = text.replace("()", " ");
    let trimmed = cleaned.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | ':' | ',' | ';' | '.' | '|')
    });
    normalize_line(trimmed)
}

fn parse_medication_line(
    mrn: &str,
    line: &str,
    custom_map: &BTreeMap<String, TherapeuticClass>,
) -> Option<Medication> {
    let (start_date, rest) = take_date(line);
    let (class_override, rest) = take_class_label(&rest);
    let (indication_text, rest) = take_indication(&rest);
    let (name_segment, instruction_segment) = split_name_and_instructions(&rest);

    let display_name = clean_display_name(&name_segment);
    if display_name.is_empty() {
        return None;
    }
    let normalized_name = normalize_drug_name(&display_name);
    if normalized_name.is_empty() {
        return None;
    }
    let therapeutic_class = classify(&display_name, custom_map);

    // Plenty of export noise (page footers, column headers) survives this
    // far; require at least one medication signal before accepting.
    let recognized = STRENGTH.is_match(line)
        || ADMIN_VERB.is_match(line)
        || class_override.is_some()
        || therapeutic_class != TherapeuticClass::Other;
    if !recognized {
        return None;
    }

    let dose_text = STRENGTH
        .find(&name_segment)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let frequency_text = FREQUENCY
        .find(&instruction_segment)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();

    Some(Medication {
        mrn: mrn.to_string(),
        display_name,
        normalized_name,
        therapeutic_class,
        class_override,
        dose_text,
        frequency_text,
        start_date,
        indication_text,
    })
}

/// Parse a medication report. Lines inherit the most recent resident
/// header; a line that never resolves a resident or never looks like a
/// medication is dropped.
pub fn parse_medications(text: &str, context: &ParseContext) -> Vec<Medication> {
    let mut state = ScanState::default();
    let mut meds = Vec::new();
    for raw in text.lines() {
        let mut line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }
        if UNIT_HEADER.is_match(&line) {
            state.unit = Some(line);
            continue;
        }
        if let Some((mrn, after)) = take_mrn(&line) {
            state.mrn = Some(mrn);
            if after.is_empty() {
                continue;
            }
            line = after;
        }
        let Some(mrn) = state.mrn.clone() else {
            tracing::debug!(%line, "medications: line before any resident header, skipping");
            continue;
        };
        let Some(med) = parse_medication_line(&mrn, &line, &context.custom_medication_map) else {
            tracing::debug!(%line, "medications: line does not look like a medication, skipping");
            continue;
        };
        meds.push(med);
    }
    meds
}
