//! Line-scanning parsers for pasted EHR report text.
//!
//! Facility exports are inconsistently formatted, so every parser favors
//! recall over strictness: a line that does not fit the expected shape is
//! skipped with a debug log, never an error, and an empty event list is a
//! valid result. Cross-line context (current unit, current resident) lives
//! in an explicit scan state threaded through the line loop.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use gdr_core::{
    BehaviorEvent, CarePlanItem, ConsultEvent, EpisodicBehaviorEvent, ParsedReport, PsychMdOrder,
    ReportKind, Resident, TherapeuticClass,
};

mod medication;

pub use medication::parse_medications;

static UNIT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(unit|wing|floor|hall|station)\b").unwrap());
static MRN_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([A-Za-z0-9]{3,})\)").unwrap());
static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/-](\d{1,2})[/-](\d{2,4})\b").unwrap());
static CENSUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(.+?)\s*\(([A-Za-z0-9]{3,})\)\s*$").unwrap());
static PSYCH_CARE_PLAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)psych|behav|mood|agitat|anxiet|depress|antipsychotic|psychotropic").unwrap()
});
static SECTION_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(situation|immediate action|intervention|response)\s*:\s*(.*)$").unwrap()
});

/// Caller-supplied context for one parse call. Physician-order parsing uses
/// the resident list to resolve lines that name a resident without an MRN
/// token; medication parsing uses the facility drug-class overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseContext {
    #[serde(default)]
    pub residents: Vec<Resident>,
    #[serde(default)]
    pub custom_medication_map: BTreeMap<String, TherapeuticClass>,
}

/// Cross-line context for the scan loop. The single carrier of everything
/// a later line may inherit from an earlier one.
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    pub(crate) unit: Option<String>,
    pub(crate) mrn: Option<String>,
}

/// Collapse interior whitespace runs and trim the ends.
pub(crate) fn normalize_line(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_separators(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '-' | ':' | ',' | ';' | '.' | '|' | '*' | '\u{2022}')
    })
}

fn looks_like_mrn(token: &str) -> bool {
    // Brand names ride in parentheses too; a chart number always carries
    // at least one digit.
    token.len() >= 3 && token.chars().any(|c| c.is_ascii_digit())
}

/// Take the first parenthesized MRN token out of a line. Returns the
/// uppercased token and the text after it.
pub(crate) fn take_mrn(line: &str) -> Option<(String, String)> {
    for caps in MRN_TOKEN.captures_iter(line) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !looks_like_mrn(token.as_str()) {
            continue;
        }
        let after = line[whole.end()..].trim().to_string();
        return Some((token.as_str().to_uppercase(), after));
    }
    None
}

fn date_from_parts(month: u32, day: u32, year_text: &str) -> Option<NaiveDate> {
    let year: i32 = match year_text.len() {
        2 => {
            let two: i32 = year_text.parse().ok()?;
            if two < 50 {
                2000 + two
            } else {
                1900 + two
            }
        }
        4 => year_text.parse().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// First valid US `m/d/y` date in `text`, plus the text with that token
/// removed. Out-of-range month/day tokens are passed over, never guessed
/// at; two-digit years below 50 land in the 2000s.
pub(crate) fn take_date(text: &str) -> (Option<NaiveDate>, String) {
    for caps in DATE_TOKEN.captures_iter(text) {
        let (Some(whole), Some(m), Some(d), Some(y)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let (Ok(month), Ok(day)) = (m.as_str().parse(), d.as_str().parse()) else {
            continue;
        };
        if let Some(date) = date_from_parts(month, day, y.as_str()) {
            let mut rest = String::with_capacity(text.len());
            rest.push_str(&text[..whole.start()]);
            rest.push(' ');
            rest.push_str(&text[whole.end()..]);
            return (Some(date), normalize_line(&rest));
        }
    }
    (None, text.to_string())
}

/// Parse the first valid US-style date anywhere in `text`.
pub fn parse_us_date(text: &str) -> Option<NaiveDate> {
    take_date(text).0
}

/// Parse one pasted report blob into typed events. Unrecognized lines are
/// skipped; the result may be empty.
pub fn parse_report(kind: ReportKind, text: &str, context: &ParseContext) -> ParsedReport {
    match kind {
        ReportKind::Census => ParsedReport::Census(parse_census(text)),
        ReportKind::Medications => {
            ParsedReport::Medications(parse_medications(text, context))
        }
        ReportKind::Consults => ParsedReport::Consults(parse_consults(text)),
        ReportKind::Behaviors => ParsedReport::Behaviors(parse_behaviors(text)),
        ReportKind::CarePlan => ParsedReport::CarePlan(parse_care_plan(text)),
        ReportKind::PhysicianOrders => {
            ParsedReport::PhysicianOrders(parse_physician_orders(text, context))
        }
        ReportKind::EpisodicBehavior => ParsedReport::EpisodicBehavior(parse_episodic(text)),
    }
}

/// Census roster: unit header lines scope the `room name (MRN)` lines that
/// follow them.
pub fn parse_census(text: &str) -> Vec<Resident> {
    let mut state = ScanState::default();
    let mut residents = Vec::new();
    for raw in text.lines() {
        let line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }
        if UNIT_HEADER.is_match(&line) {
            state.unit = Some(line);
            continue;
        }
        let Some(caps) = CENSUS_LINE.captures(&line) else {
            tracing::debug!(%line, "census: line did not match, skipping");
            continue;
        };
        if !looks_like_mrn(&caps[3]) {
            tracing::debug!(%line, "census: parenthetical is not a chart number, skipping");
            continue;
        }
        residents.push(Resident {
            mrn: caps[3].to_uppercase(),
            name: caps[2].trim().to_string(),
            room: caps[1].to_string(),
            unit: state.unit.clone().unwrap_or_default(),
        });
    }
    residents
}

/// Shared shape for consult and behavior logs: resident header lines carry
/// the MRN, dated lines under them carry the note.
fn parse_dated_notes(text: &str, report: &str) -> Vec<(String, NaiveDate, String)> {
    let mut state = ScanState::default();
    let mut events = Vec::new();
    for raw in text.lines() {
        let line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }
        if UNIT_HEADER.is_match(&line) {
            state.unit = Some(line);
            continue;
        }
        let (date, mut rest) = take_date(&line);
        if let Some((mrn, after)) = take_mrn(&rest) {
            state.mrn = Some(mrn);
            rest = after;
        }
        let Some(mrn) = state.mrn.clone() else {
            tracing::debug!(%line, report, "line before any resident header, skipping");
            continue;
        };
        let Some(date) = date else {
            if !rest.is_empty() {
                tracing::debug!(%line, report, "no date on line, skipping");
            }
            continue;
        };
        events.push((mrn, date, trim_separators(&rest).to_string()));
    }
    events
}

pub fn parse_consults(text: &str) -> Vec<ConsultEvent> {
    parse_dated_notes(text, "consults")
        .into_iter()
        .map(|(mrn, date, note)| ConsultEvent { mrn, date, note })
        .collect()
}

pub fn parse_behaviors(text: &str) -> Vec<BehaviorEvent> {
    parse_dated_notes(text, "behaviors")
        .into_iter()
        .map(|(mrn, date, note)| BehaviorEvent { mrn, date, note })
        .collect()
}

/// Care-plan listing: every content line under a resident header becomes an
/// item, flagged when it touches psychotropic care.
pub fn parse_care_plan(text: &str) -> Vec<CarePlanItem> {
    let mut state = ScanState::default();
    let mut items = Vec::new();
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
            tracing::debug!(%line, "care plan: line before any resident header, skipping");
            continue;
        };
        let item_text = trim_separators(&line).to_string();
        if item_text.is_empty() {
            continue;
        }
        let psych_related = PSYCH_CARE_PLAN.is_match(&item_text);
        items.push(CarePlanItem {
            mrn,
            text: item_text,
            psych_related,
        });
    }
    items
}

fn resolve_mrn_by_name(line: &str, context: &ParseContext) -> Option<String> {
    let haystack = line.to_lowercase();
    for resident in &context.residents {
        let name = resident.name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        if haystack.contains(&name) {
            return Some(resident.mrn.to_uppercase());
        }
        // Census names come through as "Last, First" in some exports.
        if let Some((last, first)) = name.split_once(',') {
            let flipped = format!("{} {}", first.trim(), last.trim());
            if haystack.contains(&flipped) {
                return Some(resident.mrn.to_uppercase());
            }
        }
    }
    None
}

/// Physician orders: one dated order per line. The MRN comes from an
/// inline token, a known resident's name appearing in the line, or the
/// most recent header, in that order.
pub fn parse_physician_orders(text: &str, context: &ParseContext) -> Vec<PsychMdOrder> {
    let mut state = ScanState::default();
    let mut events = Vec::new();
    for raw in text.lines() {
        let line = normalize_line(raw);
        if line.is_empty() {
            continue;
        }
        if UNIT_HEADER.is_match(&line) {
            state.unit = Some(line);
            continue;
        }
        let (date, mut rest) = take_date(&line);
        let mut mrn = None;
        if let Some((token, after)) = take_mrn(&rest) {
            state.mrn = Some(token.clone());
            mrn = Some(token);
            rest = after;
        }
        let Some(date) = date else {
            if !rest.is_empty() {
                tracing::debug!(%line, "orders: no date on line, skipping");
            }
            continue;
        };
        let mrn = mrn
            .or_else(|| resolve_mrn_by_name(&rest, context))
            .or_else(|| state.mrn.clone());
        let Some(mrn) = mrn else {
            tracing::debug!(%line, "orders: no resolvable resident, skipping");
            continue;
        };
        let text_body = trim_separators(&rest).to_string();
        if text_body.is_empty() {
            continue;
        }
        events.push(PsychMdOrder {
            mrn,
            date,
            text: text_body,
        });
    }
    events
}

const SECTION_ORDER: [&str; 4] = ["Situation", "Immediate Action", "Intervention", "Response"];

#[derive(Default)]
struct EpisodeBlock {
    mrn: String,
    date: Option<NaiveDate>,
    sections: [Option<String>; 4],
    current: Option<usize>,
}

impl EpisodeBlock {
    fn finalize(self, out: &mut Vec<EpisodicBehaviorEvent>) {
        let Some(date) = self.date else {
            tracing::debug!(mrn = %self.mrn, "episodic block without a date, dropping");
            return;
        };
        let parts: Vec<String> = SECTION_ORDER
            .iter()
            .zip(&self.sections)
            .filter_map(|(label, text)| {
                text.as_ref()
                    .filter(|t| !t.is_empty())
                    .map(|t| format!("{label}: {t}"))
            })
            .collect();
        if parts.is_empty() {
            tracing::debug!(mrn = %self.mrn, "episodic block without sections, dropping");
            return;
        }
        out.push(EpisodicBehaviorEvent {
            mrn: self.mrn,
            date,
            snippet: parts.join("; "),
        });
    }
}

/// Narrative episode notes: a line with an MRN token starts a block, the
/// labeled Situation / Immediate Action / Intervention / Response sections
/// inside it are condensed into one snippet, and the block closes on the
/// next start marker or end of input.
pub fn parse_episodic(text: &str) -> Vec<EpisodicBehaviorEvent> {
    let mut events = Vec::new();
    let mut block: Option<EpisodeBlock> = None;

    for raw in text.lines() {
        let line = normalize_line(raw);
        if line.is_empty() {
            if let Some(b) = block.as_mut() {
                b.current = None;
            }
            continue;
        }
        if let Some((mrn, after)) = take_mrn(&line) {
            if let Some(prev) = block.take() {
                prev.finalize(&mut events);
            }
            let mut next = EpisodeBlock {
                mrn,
                ..EpisodeBlock::default()
            };
            if !after.is_empty() {
                next.date = parse_us_date(&after);
            }
            block = Some(next);
            continue;
        }
        let Some(b) = block.as_mut() else {
            tracing::debug!(%line, "episodic text outside any block, skipping");
            continue;
        };
        if b.date.is_none() {
            b.date = parse_us_date(&line);
        }
        if let Some(caps) = SECTION_LABEL.captures(&line) {
            let idx = match caps[1].to_lowercase().as_str() {
                "situation" => 0,
                "immediate action" => 1,
                "intervention" => 2,
                _ => 3,
            };
            let content = caps[2].trim().to_string();
            match b.sections[idx].as_mut() {
                Some(existing) if !content.is_empty() => {
                    if !existing.is_empty() {
                        existing.push(' ');
                    }
                    existing.push_str(&content);
                }
                Some(_) => {}
                None => b.sections[idx] = Some(content),
            }
            b.current = Some(idx);
            continue;
        }
        if let Some(idx) = b.current {
            if let Some(section) = b.sections[idx].as_mut() {
                if !section.is_empty() {
                    section.push(' ');
                }
                section.push_str(&line);
            }
        } else {
            tracing::debug!(%line, "episodic line outside a labeled section, skipping");
        }
    }
    if let Some(prev) = block.take() {
        prev.finalize(&mut events);
    }
    events
}
