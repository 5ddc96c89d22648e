//! Facility-tunable review settings and the plain-text mapping formats
//! administrators paste into the settings screen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::classify::normalize_drug_name;
use crate::{IssueSeverity, TherapeuticClass};

/// Tunable knobs for the compliance rules. Every evaluation call receives a
/// full copy, so two facilities can run different policies side by side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// How recent a psychiatric consult must be, in days.
    pub consult_recency_days: u32,
    /// Behavior notes required inside the lookback window.
    pub behavior_threshold: usize,
    /// Behavior lookback window, in days.
    pub behavior_window_days: u32,
    /// Severity of an indication that fails to match the allowed list.
    pub indication_mismatch_severity: IssueSeverity,
    /// Allowed indications per class. A class absent here is not policed.
    pub indication_map: BTreeMap<TherapeuticClass, Vec<String>>,
    /// Facility drug-name overrides, keyed by normalized name.
    pub custom_medication_map: BTreeMap<String, TherapeuticClass>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            consult_recency_days: 90,
            behavior_threshold: 8,
            behavior_window_days: 56,
            indication_mismatch_severity: IssueSeverity::Warning,
            indication_map: default_indication_map(),
            custom_medication_map: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Apply a sparse override set on top of `self`. `None` fields keep the
    /// current value, so a facility can change one knob without restating
    /// the rest.
    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        if let Some(days) = overrides.consult_recency_days {
            self.consult_recency_days = days;
        }
        if let Some(threshold) = overrides.behavior_threshold {
            self.behavior_threshold = threshold;
        }
        if let Some(days) = overrides.behavior_window_days {
            self.behavior_window_days = days;
        }
        if let Some(severity) = overrides.indication_mismatch_severity {
            self.indication_mismatch_severity = severity;
        }
        if let Some(map) = overrides.indication_map {
            self.indication_map = map;
        }
        if let Some(map) = overrides.custom_medication_map {
            self.custom_medication_map = map;
        }
        self
    }
}

/// Sparse counterpart of [`Settings`] for partial updates from the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SettingsOverrides {
    pub consult_recency_days: Option<u32>,
    pub behavior_threshold: Option<usize>,
    pub behavior_window_days: Option<u32>,
    pub indication_mismatch_severity: Option<IssueSeverity>,
    pub indication_map: Option<BTreeMap<TherapeuticClass, Vec<String>>>,
    pub custom_medication_map: Option<BTreeMap<String, TherapeuticClass>>,
}

/// Allowed-indication lists shipped as the starting policy. Stimulants and
/// anticonvulsants are left unpoliced until a facility opts in.
pub fn default_indication_map() -> BTreeMap<TherapeuticClass, Vec<String>> {
    let mut map = BTreeMap::new();
    map.insert(
        TherapeuticClass::Antipsychotic,
        vec![
            "schizophrenia".to_string(),
            "schizoaffective disorder".to_string(),
            "bipolar disorder".to_string(),
            "psychotic disorder".to_string(),
            "huntington disease with psychosis".to_string(),
            "tourette syndrome".to_string(),
        ],
    );
    map.insert(
        TherapeuticClass::Antidepressant,
        vec![
            "major depressive disorder".to_string(),
            "depression".to_string(),
            "generalized anxiety disorder".to_string(),
            "obsessive compulsive disorder".to_string(),
            "post traumatic stress disorder".to_string(),
        ],
    );
    map.insert(
        TherapeuticClass::Antianxiety,
        vec![
            "generalized anxiety disorder".to_string(),
            "anxiety".to_string(),
            "panic disorder".to_string(),
            "alcohol withdrawal".to_string(),
        ],
    );
    map.insert(
        TherapeuticClass::Hypnotic,
        vec![
            "insomnia".to_string(),
            "sleep disturbance".to_string(),
            "circadian rhythm disorder".to_string(),
        ],
    );
    map
}

/// One problem found while parsing pasted mapping text. Parsing never
/// aborts; bad lines are reported and skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingIssue {
    /// 1-based line number in the pasted text.
    pub line: usize,
    pub message: String,
}

/// Parse indication-map text of the form `Class: indication, indication`.
/// Blank lines and `#` comments are skipped. Repeating a class extends its
/// list instead of replacing it.
pub fn parse_indication_map_text(
    text: &str,
) -> (BTreeMap<TherapeuticClass, Vec<String>>, Vec<MappingIssue>) {
    let mut map: BTreeMap<TherapeuticClass, Vec<String>> = BTreeMap::new();
    let mut issues = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((label, rest)) = line.split_once(':') else {
            issues.push(MappingIssue {
                line: line_no,
                message: format!("expected `Class: indication, indication`, got `{line}`"),
            });
            continue;
        };
        let Some(class) = TherapeuticClass::from_label(label) else {
            issues.push(MappingIssue {
                line: line_no,
                message: format!("unknown medication class `{}`", label.trim()),
            });
            continue;
        };
        let entries: Vec<String> = rest
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if entries.is_empty() {
            issues.push(MappingIssue {
                line: line_no,
                message: format!("no indications listed for `{}`", class.label()),
            });
            continue;
        }
        let list = map.entry(class).or_default();
        for entry in entries {
            if !list.contains(&entry) {
                list.push(entry);
            }
        }
    }

    (map, issues)
}

/// Render an indication map back into the pasteable text format.
pub fn render_indication_map_text(map: &BTreeMap<TherapeuticClass, Vec<String>>) -> String {
    let mut out = String::new();
    for (class, indications) in map {
        out.push_str(class.label());
        out.push_str(": ");
        out.push_str(&indications.join(", "));
        out.push('\n');
    }
    out
}

/// Parse medication-map text of the form `drug name = Class`, one override
/// per line. Keys are normalized the same way report names are, so a paste
/// of `Thorazine 100 MG = Antipsychotic` keys on plain `thorazine`.
pub fn parse_medication_map_text(
    text: &str,
) -> (BTreeMap<String, TherapeuticClass>, Vec<MappingIssue>) {
    let mut map = BTreeMap::new();
    let mut issues = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((drug, label)) = line.split_once('=') else {
            issues.push(MappingIssue {
                line: line_no,
                message: format!("expected `drug = Class`, got `{line}`"),
            });
            continue;
        };
        let key = normalize_drug_name(drug);
        if key.is_empty() {
            issues.push(MappingIssue {
                line: line_no,
                message: "drug name is empty".to_string(),
            });
            continue;
        }
        let Some(class) = TherapeuticClass::from_label(label) else {
            issues.push(MappingIssue {
                line: line_no,
                message: format!("unknown medication class `{}`", label.trim()),
            });
            continue;
        };
        map.insert(key, class);
    }

    (map, issues)
}

/// Render a medication map back into the pasteable text format.
pub fn render_medication_map_text(map: &BTreeMap<String, TherapeuticClass>) -> String {
    let mut out = String::new();
    for (drug, class) in map {
        out.push_str(drug);
        out.push_str(" = ");
        out.push_str(class.label());
        out.push('\n');
    }
    out
}
