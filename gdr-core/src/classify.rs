//! Drug-name normalization and therapeutic-class lookup.
//!
//! Report lines arrive as `QUETIAPINE FUMARATE 25 MG (SEROQUEL) tablet`;
//! classification works on a normalized form so brand, generic, salt, and
//! dose spellings all land on the same dictionary entry.

use std::collections::BTreeMap;

use crate::TherapeuticClass;

/// Unit, form, and route words dropped during normalization. Anything left
/// after dropping these is treated as part of the drug's name.
const NOISE_TOKENS: [&str; 34] = [
    "mg", "mcg", "ml", "gm", "unit", "units", "tab", "tabs", "tablet", "tablets", "cap", "caps",
    "capsule", "capsules", "chewable", "solution", "soln", "suspension", "syrup", "elixir",
    "cream", "ointment", "gel", "patch", "injection", "inj", "oral", "po", "sl", "im", "subq",
    "topical", "liquid", "spray",
];

/// Lowercase a raw drug string and strip everything that is not name:
/// parenthesized segments, dose numbers, and unit/form/route words.
/// Whitespace collapses to single spaces.
pub fn normalize_drug_name(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for ch in raw.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(ch),
            _ => {}
        }
    }

    let lowered = cleaned.to_lowercase();
    let spaced: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    let tokens: Vec<&str> = spaced
        .split_whitespace()
        .filter(|token| {
            !token.starts_with(|c: char| c.is_ascii_digit()) && !NOISE_TOKENS.contains(token)
        })
        .collect();
    tokens.join(" ")
}

/// Built-in dictionary: generic and brand names for the six tracked
/// classes. First entry whose pattern appears inside the normalized name
/// wins, so order is part of the contract.
const BUILTIN_DRUG_CLASSES: &[(&str, TherapeuticClass)] = &[
    // Antipsychotics
    ("risperidone", TherapeuticClass::Antipsychotic),
    ("risperdal", TherapeuticClass::Antipsychotic),
    ("quetiapine", TherapeuticClass::Antipsychotic),
    ("seroquel", TherapeuticClass::Antipsychotic),
    ("olanzapine", TherapeuticClass::Antipsychotic),
    ("zyprexa", TherapeuticClass::Antipsychotic),
    ("haloperidol", TherapeuticClass::Antipsychotic),
    ("haldol", TherapeuticClass::Antipsychotic),
    ("aripiprazole", TherapeuticClass::Antipsychotic),
    ("abilify", TherapeuticClass::Antipsychotic),
    ("ziprasidone", TherapeuticClass::Antipsychotic),
    ("geodon", TherapeuticClass::Antipsychotic),
    ("paliperidone", TherapeuticClass::Antipsychotic),
    ("invega", TherapeuticClass::Antipsychotic),
    ("clozapine", TherapeuticClass::Antipsychotic),
    ("clozaril", TherapeuticClass::Antipsychotic),
    ("lurasidone", TherapeuticClass::Antipsychotic),
    ("latuda", TherapeuticClass::Antipsychotic),
    ("pimavanserin", TherapeuticClass::Antipsychotic),
    ("nuplazid", TherapeuticClass::Antipsychotic),
    // Antidepressants
    ("sertraline", TherapeuticClass::Antidepressant),
    ("zoloft", TherapeuticClass::Antidepressant),
    ("escitalopram", TherapeuticClass::Antidepressant),
    ("lexapro", TherapeuticClass::Antidepressant),
    ("citalopram", TherapeuticClass::Antidepressant),
    ("celexa", TherapeuticClass::Antidepressant),
    ("fluoxetine", TherapeuticClass::Antidepressant),
    ("prozac", TherapeuticClass::Antidepressant),
    ("paroxetine", TherapeuticClass::Antidepressant),
    ("paxil", TherapeuticClass::Antidepressant),
    ("mirtazapine", TherapeuticClass::Antidepressant),
    ("remeron", TherapeuticClass::Antidepressant),
    ("trazodone", TherapeuticClass::Antidepressant),
    ("duloxetine", TherapeuticClass::Antidepressant),
    ("cymbalta", TherapeuticClass::Antidepressant),
    ("venlafaxine", TherapeuticClass::Antidepressant),
    ("effexor", TherapeuticClass::Antidepressant),
    ("bupropion", TherapeuticClass::Antidepressant),
    ("wellbutrin", TherapeuticClass::Antidepressant),
    ("nortriptyline", TherapeuticClass::Antidepressant),
    ("pamelor", TherapeuticClass::Antidepressant),
    ("amitriptyline", TherapeuticClass::Antidepressant),
    ("elavil", TherapeuticClass::Antidepressant),
    ("doxepin", TherapeuticClass::Antidepressant),
    // Antianxiety
    ("lorazepam", TherapeuticClass::Antianxiety),
    ("ativan", TherapeuticClass::Antianxiety),
    ("alprazolam", TherapeuticClass::Antianxiety),
    ("xanax", TherapeuticClass::Antianxiety),
    ("clonazepam", TherapeuticClass::Antianxiety),
    ("klonopin", TherapeuticClass::Antianxiety),
    ("diazepam", TherapeuticClass::Antianxiety),
    ("valium", TherapeuticClass::Antianxiety),
    ("buspirone", TherapeuticClass::Antianxiety),
    ("buspar", TherapeuticClass::Antianxiety),
    ("hydroxyzine", TherapeuticClass::Antianxiety),
    ("vistaril", TherapeuticClass::Antianxiety),
    ("oxazepam", TherapeuticClass::Antianxiety),
    // Hypnotics
    ("zolpidem", TherapeuticClass::Hypnotic),
    ("ambien", TherapeuticClass::Hypnotic),
    ("temazepam", TherapeuticClass::Hypnotic),
    ("restoril", TherapeuticClass::Hypnotic),
    ("eszopiclone", TherapeuticClass::Hypnotic),
    ("lunesta", TherapeuticClass::Hypnotic),
    ("zaleplon", TherapeuticClass::Hypnotic),
    ("sonata", TherapeuticClass::Hypnotic),
    ("melatonin", TherapeuticClass::Hypnotic),
    ("ramelteon", TherapeuticClass::Hypnotic),
    ("rozerem", TherapeuticClass::Hypnotic),
    ("suvorexant", TherapeuticClass::Hypnotic),
    ("belsomra", TherapeuticClass::Hypnotic),
    ("silenor", TherapeuticClass::Hypnotic),
    // Stimulants
    ("methylphenidate", TherapeuticClass::Stimulant),
    ("ritalin", TherapeuticClass::Stimulant),
    ("concerta", TherapeuticClass::Stimulant),
    ("amphetamine", TherapeuticClass::Stimulant),
    ("adderall", TherapeuticClass::Stimulant),
    ("lisdexamfetamine", TherapeuticClass::Stimulant),
    ("vyvanse", TherapeuticClass::Stimulant),
    ("focalin", TherapeuticClass::Stimulant),
    ("modafinil", TherapeuticClass::Stimulant),
    ("provigil", TherapeuticClass::Stimulant),
    // Anticonvulsants and mood stabilizers
    ("divalproex", TherapeuticClass::Anticonvulsant),
    ("depakote", TherapeuticClass::Anticonvulsant),
    ("valproic", TherapeuticClass::Anticonvulsant),
    ("depakene", TherapeuticClass::Anticonvulsant),
    ("lamotrigine", TherapeuticClass::Anticonvulsant),
    ("lamictal", TherapeuticClass::Anticonvulsant),
    ("carbamazepine", TherapeuticClass::Anticonvulsant),
    ("tegretol", TherapeuticClass::Anticonvulsant),
    ("oxcarbazepine", TherapeuticClass::Anticonvulsant),
    ("trileptal", TherapeuticClass::Anticonvulsant),
    ("gabapentin", TherapeuticClass::Anticonvulsant),
    ("neurontin", TherapeuticClass::Anticonvulsant),
    ("topiramate", TherapeuticClass::Anticonvulsant),
    ("topamax", TherapeuticClass::Anticonvulsant),
    ("levetiracetam", TherapeuticClass::Anticonvulsant),
    ("keppra", TherapeuticClass::Anticonvulsant),
    ("lithium", TherapeuticClass::Anticonvulsant),
    ("lithobid", TherapeuticClass::Anticonvulsant),
    ("phenytoin", TherapeuticClass::Anticonvulsant),
    ("dilantin", TherapeuticClass::Anticonvulsant),
];

/// Classify a raw drug string. Exact normalized-name hits come first, the
/// facility map ahead of the built-in table; only then do keys match as
/// substrings, in the same order. Anything unrecognized is `Other`.
pub fn classify(raw: &str, custom_map: &BTreeMap<String, TherapeuticClass>) -> TherapeuticClass {
    let normalized = normalize_drug_name(raw);
    if normalized.is_empty() {
        return TherapeuticClass::Other;
    }
    if let Some(class) = custom_map.get(&normalized) {
        return *class;
    }
    if let Some((_, class)) = BUILTIN_DRUG_CLASSES
        .iter()
        .find(|(name, _)| *name == normalized)
    {
        return *class;
    }
    for (key, class) in custom_map {
        if normalized.contains(key.as_str()) {
            return *class;
        }
    }
    for (pattern, class) in BUILTIN_DRUG_CLASSES {
        if normalized.contains(pattern) {
            return *class;
        }
    }
    TherapeuticClass::Other
}
