//! Shared data model and rule logic for the medication-review compliance core.
//!
//! Everything here is pure: parsers and the evaluator transform caller-owned
//! state and hand back new values, so the whole crate is safe to drive from a
//! worker with plain request/response messages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub mod classify;
pub mod evaluate;
pub mod indication;
pub mod settings;

pub use classify::{classify, normalize_drug_name};
pub use evaluate::evaluate;
pub use indication::{resolve_indication, similarity};
pub use settings::{MappingIssue, Settings, SettingsOverrides};

/// The six clinical medication classes tracked for dose-reduction review,
/// plus a catch-all for everything else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TherapeuticClass {
    Antipsychotic,
    Antidepressant,
    Antianxiety,
    Hypnotic,
    Stimulant,
    Anticonvulsant,
    Other,
}

impl TherapeuticClass {
    /// Label as printed in facility reports and settings text.
    pub fn label(&self) -> &'static str {
        match self {
            TherapeuticClass::Antipsychotic => "Antipsychotic",
            TherapeuticClass::Antidepressant => "Antidepressant",
            TherapeuticClass::Antianxiety => "Antianxiety",
            TherapeuticClass::Hypnotic => "Hypnotic",
            TherapeuticClass::Stimulant => "Stimulant",
            TherapeuticClass::Anticonvulsant => "Anticonvulsant",
            TherapeuticClass::Other => "Other",
        }
    }

    /// Parse a label as written by facility staff. Accepts the printed
    /// labels plus the spellings that show up in exported reports.
    pub fn from_label(label: &str) -> Option<Self> {
        let needle = label.trim().to_lowercase();
        match needle.as_str() {
            "antipsychotic" | "antipsychotics" => Some(TherapeuticClass::Antipsychotic),
            "antidepressant" | "antidepressants" => Some(TherapeuticClass::Antidepressant),
            "antianxiety" | "anxiolytic" | "anti-anxiety" => Some(TherapeuticClass::Antianxiety),
            "hypnotic" | "sedative" | "sedative/hypnotic" | "hypnotic/sedative" => {
                Some(TherapeuticClass::Hypnotic)
            }
            "stimulant" | "adhd" | "adhd/stimulant" => Some(TherapeuticClass::Stimulant),
            "anticonvulsant" | "mood stabilizer" | "misc neurological" => {
                Some(TherapeuticClass::Anticonvulsant)
            }
            "other" => Some(TherapeuticClass::Other),
            _ => None,
        }
    }
}

impl fmt::Display for TherapeuticClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resident identity created by census parsing. The MRN is the join key for
/// every other record type and is never regenerated once assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resident {
    pub mrn: String,
    pub name: String,
    pub room: String,
    pub unit: String,
}

/// One medication as extracted from a medication report line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub mrn: String,
    pub display_name: String,
    pub normalized_name: String,
    pub therapeutic_class: TherapeuticClass,
    #[serde(default)]
    pub class_override: Option<TherapeuticClass>,
    pub dose_text: String,
    pub frequency_text: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub indication_text: String,
}

impl Medication {
    /// The class compliance rules act on: an explicit label printed on the
    /// report line beats whatever the dictionary derived from the name.
    pub fn effective_class(&self) -> TherapeuticClass {
        self.class_override.unwrap_or(self.therapeutic_class)
    }
}

/// A dated psychiatric consult entry. Deduplicated by date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultEvent {
    pub mrn: String,
    pub date: NaiveDate,
    pub note: String,
}

/// A dated behavior-monitoring note. Deduplicated by date + note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorEvent {
    pub mrn: String,
    pub date: NaiveDate,
    pub note: String,
}

/// A narrative behavior episode condensed to a snippet. Deduplicated by
/// date + snippet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodicBehaviorEvent {
    pub mrn: String,
    pub date: NaiveDate,
    pub snippet: String,
}

/// A physician order touching psychotropic care. Deduplicated by date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PsychMdOrder {
    pub mrn: String,
    pub date: NaiveDate,
    pub text: String,
}

/// One care-plan listing entry; `psych_related` is derived at parse time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarePlanItem {
    pub mrn: String,
    pub text: String,
    pub psych_related: bool,
}

/// Staff-entered entry on the dose-reduction attempt timeline. Display data
/// only; the evaluator reads `ManualGdrData` instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GdrEvent {
    pub mrn: String,
    pub date: NaiveDate,
    pub status: String,
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub last_psych_eval: Option<NaiveDate>,
}

/// Staff answer to "was a gradual dose reduction attempted this period?".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GdrStatus {
    #[default]
    NotSet,
    Done,
    Contraindicated,
}

/// Checkbox set documenting why a dose reduction was contraindicated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContraindicationReasons {
    pub prior_attempt_failed: bool,
    pub clinical_risk: bool,
    pub psychiatrist_recommendation: bool,
    pub hospice_care: bool,
    pub other: bool,
    #[serde(default)]
    pub other_text: String,
}

impl ContraindicationReasons {
    pub fn any_checked(&self) -> bool {
        self.prior_attempt_failed
            || self.clinical_risk
            || self.psychiatrist_recommendation
            || self.hospice_care
            || self.other
    }
}

/// Per-resident, per-period record of the manual dose-reduction workflow.
/// Mutated only by explicit staff action, never by parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ManualGdrData {
    pub status: GdrStatus,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub reasons: ContraindicationReasons,
}

/// Everything accumulated for one resident within one review period.
/// Owned by the caller; the core only fills and reads it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResidentRecord {
    pub resident: Resident,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub consults: Vec<ConsultEvent>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorEvent>,
    #[serde(default)]
    pub episodes: Vec<EpisodicBehaviorEvent>,
    #[serde(default)]
    pub orders: Vec<PsychMdOrder>,
    #[serde(default)]
    pub care_plan: Vec<CarePlanItem>,
    #[serde(default)]
    pub gdr_events: Vec<GdrEvent>,
    #[serde(default)]
    pub manual_gdr: ManualGdrData,
}

impl ResidentRecord {
    pub fn new(resident: Resident) -> Self {
        Self {
            resident,
            medications: Vec::new(),
            consults: Vec::new(),
            behaviors: Vec::new(),
            episodes: Vec::new(),
            orders: Vec::new(),
            care_plan: Vec::new(),
            gdr_events: Vec::new(),
            manual_gdr: ManualGdrData::default(),
        }
    }

    /// Placeholder record for events that arrive before the census paste.
    pub fn stub(mrn: &str) -> Self {
        Self::new(Resident {
            mrn: mrn.to_string(),
            name: String::new(),
            room: String::new(),
            unit: String::new(),
        })
    }

    pub fn push_consult(&mut self, event: ConsultEvent) {
        if !self.consults.iter().any(|e| e.date == event.date) {
            self.consults.push(event);
        }
    }

    pub fn push_behavior(&mut self, event: BehaviorEvent) {
        if !self
            .behaviors
            .iter()
            .any(|e| e.date == event.date && e.note == event.note)
        {
            self.behaviors.push(event);
        }
    }

    pub fn push_episode(&mut self, event: EpisodicBehaviorEvent) {
        if !self
            .episodes
            .iter()
            .any(|e| e.date == event.date && e.snippet == event.snippet)
        {
            self.episodes.push(event);
        }
    }

    pub fn push_order(&mut self, event: PsychMdOrder) {
        if !self.orders.iter().any(|e| e.date == event.date) {
            self.orders.push(event);
        }
    }

    pub fn push_gdr_event(&mut self, event: GdrEvent) {
        if !self.gdr_events.iter().any(|e| e.date == event.date) {
            self.gdr_events.push(event);
        }
    }
}

/// The seven report formats the parsers understand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Census,
    Medications,
    Consults,
    Behaviors,
    CarePlan,
    PhysicianOrders,
    EpisodicBehavior,
}

impl FromStr for ReportKind {
    type Err = GdrError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "census" => Ok(ReportKind::Census),
            "medications" | "meds" => Ok(ReportKind::Medications),
            "consults" | "consult" => Ok(ReportKind::Consults),
            "behaviors" | "behavior" => Ok(ReportKind::Behaviors),
            "care_plan" | "careplan" | "care-plan" => Ok(ReportKind::CarePlan),
            "physician_orders" | "orders" => Ok(ReportKind::PhysicianOrders),
            "episodic_behavior" | "episodic" => Ok(ReportKind::EpisodicBehavior),
            other => Err(GdrError::UnknownReportKind(other.to_string())),
        }
    }
}

/// Typed output of one parse call: a list of events per report kind, each
/// event already tagged with its owning MRN.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "events")]
pub enum ParsedReport {
    Census(Vec<Resident>),
    Medications(Vec<Medication>),
    Consults(Vec<ConsultEvent>),
    Behaviors(Vec<BehaviorEvent>),
    CarePlan(Vec<CarePlanItem>),
    PhysicianOrders(Vec<PsychMdOrder>),
    EpisodicBehavior(Vec<EpisodicBehaviorEvent>),
}

impl ParsedReport {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            ParsedReport::Census(v) => v.len(),
            ParsedReport::Medications(v) => v.len(),
            ParsedReport::Consults(v) => v.len(),
            ParsedReport::Behaviors(v) => v.len(),
            ParsedReport::CarePlan(v) => v.len(),
            ParsedReport::PhysicianOrders(v) => v.len(),
            ParsedReport::EpisodicBehavior(v) => v.len(),
        }
    }
}

/// Merge one parse result into the per-resident accumulator map.
///
/// Census entries create or refresh identities. Medication and care-plan
/// lists are replaced wholesale for every resident present in the parse
/// (each report is a full snapshot); dated events append with their
/// per-type dedup key, so re-pasting the same report is a no-op.
pub fn apply_report(records: &mut BTreeMap<String, ResidentRecord>, report: ParsedReport) {
    match report {
        ParsedReport::Census(residents) => {
            for resident in residents {
                let entry = records
                    .entry(resident.mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&resident.mrn));
                entry.resident = resident;
            }
        }
        ParsedReport::Medications(meds) => {
            let mut grouped: BTreeMap<String, Vec<Medication>> = BTreeMap::new();
            for med in meds {
                grouped.entry(med.mrn.clone()).or_default().push(med);
            }
            for (mrn, list) in grouped {
                records
                    .entry(mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&mrn))
                    .medications = list;
            }
        }
        ParsedReport::Consults(events) => {
            for event in events {
                records
                    .entry(event.mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&event.mrn))
                    .push_consult(event);
            }
        }
        ParsedReport::Behaviors(events) => {
            for event in events {
                records
                    .entry(event.mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&event.mrn))
                    .push_behavior(event);
            }
        }
        ParsedReport::CarePlan(items) => {
            let mut grouped: BTreeMap<String, Vec<CarePlanItem>> = BTreeMap::new();
            for item in items {
                grouped.entry(item.mrn.clone()).or_default().push(item);
            }
            for (mrn, list) in grouped {
                records
                    .entry(mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&mrn))
                    .care_plan = list;
            }
        }
        ParsedReport::PhysicianOrders(events) => {
            for event in events {
                records
                    .entry(event.mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&event.mrn))
                    .push_order(event);
            }
        }
        ParsedReport::EpisodicBehavior(events) => {
            for event in events {
                records
                    .entry(event.mrn.clone())
                    .or_insert_with(|| ResidentRecord::stub(&event.mrn))
                    .push_episode(event);
            }
        }
    }
}

/// Where an indication match came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    ClinicalDictionary,
    IndicationMap,
    None,
}

/// Result of fuzzy-matching an indication string for one medication.
/// Recomputed on every evaluation, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicationMatchResult {
    pub matched: bool,
    pub confidence: f64,
    pub source: MatchSource,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub entry_id: Option<String>,
}

impl IndicationMatchResult {
    pub fn unmatched(confidence: f64) -> Self {
        Self {
            matched: false,
            confidence,
            source: MatchSource::None,
            label: None,
            entry_id: None,
        }
    }
}

/// Severity attached to a single compliance finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Warning,
    Critical,
}

/// One human-readable compliance finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Issue {
    pub severity: IssueSeverity,
    pub message: String,
}

/// Overall verdict for a resident's review period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    Warning,
    Critical,
    Unknown,
}

/// Outcome of a single rule, for explainable display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    Ok,
    Warning,
    Critical,
    NotAssessed,
}

/// Per-rule derived flags alongside the issue list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleChecks {
    pub indication_status: CheckOutcome,
    pub consult_status: CheckOutcome,
    pub manual_gdr_status: CheckOutcome,
    pub behavior_notes_count: usize,
    pub care_plan_psych_present: bool,
}

/// Full compliance verdict. Recomputed whole on every accumulator change so
/// `status` and `issues` can never drift apart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    pub issues: Vec<Issue>,
    pub checks: RuleChecks,
}

/// A calendar month for which a resident's compliance snapshot is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReviewPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReviewPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// "YYYY-MM" key used by callers to shelve period snapshots.
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or_default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// Errors surfaced at the crate boundary.
#[derive(Debug, thiserror::Error)]
pub enum GdrError {
    #[error("unknown report kind: {0}")]
    UnknownReportKind(String),
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// Parse a `YYYY-MM-DD` reference date handed over a call boundary.
pub fn parse_reference_date(text: &str) -> Result<NaiveDate, GdrError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| GdrError::InvalidDate(text.to_string()))
}
