//! Compliance rules for one resident's review period.
//!
//! Evaluation is a full recomputation every time: rules append to a fresh
//! issue list in a fixed order, and the final status is derived from the
//! issues, so `status` can never disagree with what the list says.

use chrono::{Duration, NaiveDate};

use crate::indication::resolve_indication;
use crate::settings::Settings;
use crate::{
    CheckOutcome, ComplianceResult, ComplianceStatus, GdrStatus, Issue, IssueSeverity,
    ResidentRecord, RuleChecks,
};

/// Matches with confidence below this are flagged for human review.
const LOW_CONFIDENCE: f64 = 0.75;

/// Indication phrasings that mean "staff have not settled this yet".
const REVIEW_MARKERS: [&str; 4] = ["unknown", "review", "uncertain", "tbd"];

fn in_lookback(date: NaiveDate, reference_date: NaiveDate, days: u32) -> bool {
    let start = reference_date
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    date >= start && date <= reference_date
}

fn check_care_plan(record: &ResidentRecord, issues: &mut Vec<Issue>) -> bool {
    let present = record.care_plan.iter().any(|item| item.psych_related);
    if !present {
        issues.push(Issue {
            severity: IssueSeverity::Critical,
            message: "No psychotropic-related care plan item on file".to_string(),
        });
    }
    present
}

fn check_behavior(
    record: &ResidentRecord,
    reference_date: NaiveDate,
    settings: &Settings,
    issues: &mut Vec<Issue>,
) -> usize {
    let count = record
        .behaviors
        .iter()
        .filter(|e| in_lookback(e.date, reference_date, settings.behavior_window_days))
        .count();
    if count < settings.behavior_threshold {
        issues.push(Issue {
            severity: IssueSeverity::Warning,
            message: format!(
                "Behavior documentation below threshold: {} of {} notes in the last {} days",
                count, settings.behavior_threshold, settings.behavior_window_days
            ),
        });
    }
    count
}

fn check_psych_follow_up(
    record: &ResidentRecord,
    reference_date: NaiveDate,
    settings: &Settings,
    issues: &mut Vec<Issue>,
) -> CheckOutcome {
    let days = settings.consult_recency_days;
    let has_consult = record
        .consults
        .iter()
        .any(|e| in_lookback(e.date, reference_date, days));
    let has_order = record
        .orders
        .iter()
        .any(|e| in_lookback(e.date, reference_date, days));

    if has_consult {
        CheckOutcome::Ok
    } else if has_order {
        issues.push(Issue {
            severity: IssueSeverity::Warning,
            message: format!(
                "Physician order on file but no completed psych consult in the last {days} days"
            ),
        });
        CheckOutcome::Warning
    } else {
        issues.push(Issue {
            severity: IssueSeverity::Critical,
            message: format!("No psychiatric consult or physician order in the last {days} days"),
        });
        CheckOutcome::Critical
    }
}

fn check_manual_gdr(record: &ResidentRecord, issues: &mut Vec<Issue>) -> CheckOutcome {
    let gdr = &record.manual_gdr;
    match gdr.status {
        GdrStatus::NotSet => {
            issues.push(Issue {
                severity: IssueSeverity::Critical,
                message: "Gradual dose reduction not addressed for this review period".to_string(),
            });
            CheckOutcome::Critical
        }
        GdrStatus::Done => {
            if gdr.note.trim().is_empty() {
                issues.push(Issue {
                    severity: IssueSeverity::Critical,
                    message: "Dose reduction marked done but has no documentation note"
                        .to_string(),
                });
                CheckOutcome::Critical
            } else {
                CheckOutcome::Ok
            }
        }
        GdrStatus::Contraindicated => {
            if !gdr.reasons.any_checked() {
                issues.push(Issue {
                    severity: IssueSeverity::Critical,
                    message: "Dose reduction contraindicated but no reason is selected"
                        .to_string(),
                });
                CheckOutcome::Critical
            } else if gdr.reasons.other && gdr.reasons.other_text.trim().is_empty() {
                issues.push(Issue {
                    severity: IssueSeverity::Critical,
                    message: "Contraindication reason 'Other' requires an explanation"
                        .to_string(),
                });
                CheckOutcome::Critical
            } else {
                CheckOutcome::Ok
            }
        }
    }
}

fn check_indications(
    record: &ResidentRecord,
    settings: &Settings,
    issues: &mut Vec<Issue>,
) -> CheckOutcome {
    let mut outcome = CheckOutcome::Ok;
    let mut worsen = |issues: &mut Vec<Issue>, severity: IssueSeverity, message: String| {
        issues.push(Issue { severity, message });
        outcome = match (outcome, severity) {
            (_, IssueSeverity::Critical) => CheckOutcome::Critical,
            (CheckOutcome::Critical, _) => CheckOutcome::Critical,
            (_, IssueSeverity::Warning) => CheckOutcome::Warning,
        };
    };

    for med in &record.medications {
        let name = &med.display_name;
        let text = med.indication_text.trim();
        let lowered = text.to_lowercase();

        if text.is_empty() || lowered == "unknown" {
            worsen(
                issues,
                IssueSeverity::Critical,
                format!("No indication documented for {name}"),
            );
            continue;
        }
        if REVIEW_MARKERS.iter().any(|m| lowered.contains(m)) {
            worsen(
                issues,
                IssueSeverity::Warning,
                format!("Indication for {name} is marked for review: \"{text}\""),
            );
            continue;
        }

        let class = med.effective_class();
        let allowed = settings.indication_map.get(&class);
        let result = resolve_indication(text, class, allowed.map(Vec::as_slice));
        if result.matched {
            if result.confidence < LOW_CONFIDENCE {
                let label = result.label.unwrap_or_else(|| "a known indication".to_string());
                worsen(
                    issues,
                    IssueSeverity::Warning,
                    format!(
                        "Indication \"{text}\" for {name} only weakly matches {label} \
                         (confidence {:.2})",
                        result.confidence
                    ),
                );
            }
        } else if allowed.is_some() {
            worsen(
                issues,
                settings.indication_mismatch_severity,
                format!("Indication \"{text}\" for {name} is not an allowed use of {class}"),
            );
        }
        // Unmatched with no allowed list configured: the facility has not
        // opted into policing this class, so stay silent.
    }
    outcome
}

/// Run all compliance rules for one resident as of `reference_date`.
///
/// A record with no parsed medications short-circuits to `Unknown`: there
/// is nothing to review yet, and guessing would be worse than saying so.
pub fn evaluate(
    record: &ResidentRecord,
    reference_date: NaiveDate,
    settings: &Settings,
) -> ComplianceResult {
    if record.medications.is_empty() {
        return ComplianceResult {
            status: ComplianceStatus::Unknown,
            issues: Vec::new(),
            checks: RuleChecks {
                indication_status: CheckOutcome::NotAssessed,
                consult_status: CheckOutcome::NotAssessed,
                manual_gdr_status: CheckOutcome::NotAssessed,
                behavior_notes_count: 0,
                care_plan_psych_present: false,
            },
        };
    }

    let mut issues = Vec::new();
    let care_plan_psych_present = check_care_plan(record, &mut issues);
    let behavior_notes_count = check_behavior(record, reference_date, settings, &mut issues);
    let consult_status = check_psych_follow_up(record, reference_date, settings, &mut issues);
    let manual_gdr_status = check_manual_gdr(record, &mut issues);
    let indication_status = check_indications(record, settings, &mut issues);

    let status = if issues.iter().any(|i| i.severity == IssueSeverity::Critical) {
        ComplianceStatus::Critical
    } else if issues.iter().any(|i| i.severity == IssueSeverity::Warning) {
        ComplianceStatus::Warning
    } else {
        ComplianceStatus::Compliant
    };

    ComplianceResult {
        status,
        issues,
        checks: RuleChecks {
            indication_status,
            consult_status,
            manual_gdr_status,
            behavior_notes_count,
            care_plan_psych_present,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BehaviorEvent, CarePlanItem, ConsultEvent, ContraindicationReasons, ManualGdrData,
        Medication, PsychMdOrder, Resident, TherapeuticClass,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const REFERENCE: (i32, u32, u32) = (2025, 3, 31);

    fn reference_date() -> NaiveDate {
        date(REFERENCE.0, REFERENCE.1, REFERENCE.2)
    }

    fn medication(indication: &str) -> Medication {
        Medication {
            mrn: "ABC123".to_string(),
            display_name: "Seroquel".to_string(),
            normalized_name: "seroquel".to_string(),
            therapeutic_class: TherapeuticClass::Antipsychotic,
            class_override: None,
            dose_text: "25 MG".to_string(),
            frequency_text: "at bedtime".to_string(),
            start_date: None,
            indication_text: indication.to_string(),
        }
    }

    /// A record that passes every rule as of the fixed reference date.
    fn compliant_record() -> ResidentRecord {
        let mut record = ResidentRecord::new(Resident {
            mrn: "ABC123".to_string(),
            name: "John Doe".to_string(),
            room: "101-A".to_string(),
            unit: "Unit 3".to_string(),
        });
        record.medications.push(medication("schizophrenia"));
        record.care_plan.push(CarePlanItem {
            mrn: "ABC123".to_string(),
            text: "Monitor psychotropic medication response".to_string(),
            psych_related: true,
        });
        record.consults.push(ConsultEvent {
            mrn: "ABC123".to_string(),
            date: date(2025, 3, 21),
            note: "Psych consult completed".to_string(),
        });
        for day in 1..=8 {
            record.behaviors.push(BehaviorEvent {
                mrn: "ABC123".to_string(),
                date: date(2025, 3, day),
                note: format!("Behavior note {day}"),
            });
        }
        record.manual_gdr = ManualGdrData {
            status: GdrStatus::Done,
            note: "Taper attempted 3/10, tolerated well".to_string(),
            reasons: ContraindicationReasons::default(),
        };
        record
    }

    fn run(record: &ResidentRecord) -> ComplianceResult {
        evaluate(record, reference_date(), &Settings::default())
    }

    #[test]
    fn no_medications_short_circuits_to_unknown() {
        let record = ResidentRecord::stub("ABC123");
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Unknown);
        assert!(result.issues.is_empty());
        assert_eq!(result.checks.indication_status, CheckOutcome::NotAssessed);
        assert_eq!(result.checks.consult_status, CheckOutcome::NotAssessed);
        assert_eq!(result.checks.manual_gdr_status, CheckOutcome::NotAssessed);
        assert_eq!(result.checks.behavior_notes_count, 0);
        assert!(!result.checks.care_plan_psych_present);
    }

    #[test]
    fn fully_documented_resident_is_compliant() {
        let result = run(&compliant_record());
        assert_eq!(result.status, ComplianceStatus::Compliant);
        assert!(result.issues.is_empty(), "issues: {:?}", result.issues);
        assert_eq!(result.checks.indication_status, CheckOutcome::Ok);
        assert_eq!(result.checks.consult_status, CheckOutcome::Ok);
        assert_eq!(result.checks.manual_gdr_status, CheckOutcome::Ok);
        assert_eq!(result.checks.behavior_notes_count, 8);
        assert!(result.checks.care_plan_psych_present);
    }

    #[test]
    fn literal_unknown_indication_is_critical() {
        let mut record = compliant_record();
        record.medications[0].indication_text = "Unknown".to_string();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Critical);
        assert!(result.issues.iter().any(|i| {
            i.severity == IssueSeverity::Critical && i.message.contains("No indication")
        }));
        assert_eq!(result.checks.indication_status, CheckOutcome::Critical);
    }

    #[test]
    fn review_marker_in_indication_is_a_warning() {
        let mut record = compliant_record();
        record.medications[0].indication_text = "needs review by psych".to_string();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert_eq!(result.checks.indication_status, CheckOutcome::Warning);
    }

    #[test]
    fn weak_indication_match_is_a_warning() {
        let mut record = compliant_record();
        record.medications[0].indication_text = "mood disorder".to_string();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert!(result
            .issues
            .iter()
            .any(|i| i.message.contains("weakly matches")));
    }

    #[test]
    fn unmatched_indication_uses_configured_severity() {
        let mut record = compliant_record();
        record.medications[0].indication_text = "toe fungus".to_string();

        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Warning);

        let strict = Settings {
            indication_mismatch_severity: IssueSeverity::Critical,
            ..Settings::default()
        };
        let result = evaluate(&record, reference_date(), &strict);
        assert_eq!(result.status, ComplianceStatus::Critical);
        assert!(result
            .issues
            .iter()
            .any(|i| i.message.contains("not an allowed use")));
    }

    #[test]
    fn unpoliced_class_raises_no_indication_issue() {
        let mut record = compliant_record();
        // Stimulants ship without an allowed list.
        record.medications[0].therapeutic_class = TherapeuticClass::Stimulant;
        record.medications[0].indication_text = "morning alertness program".to_string();
        let result = run(&record);
        assert_eq!(result.checks.indication_status, CheckOutcome::Ok);
        assert_eq!(result.status, ComplianceStatus::Compliant);
    }

    #[test]
    fn missing_care_plan_item_is_critical() {
        let mut record = compliant_record();
        record.care_plan.clear();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Critical);
        assert!(!result.checks.care_plan_psych_present);
        assert!(result.issues.iter().any(|i| i.message.contains("care plan")));
    }

    #[test]
    fn behavior_count_below_threshold_is_a_warning() {
        let mut record = compliant_record();
        record.behaviors.pop();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert_eq!(result.checks.behavior_notes_count, 7);
        assert!(result.issues.iter().any(|i| i.message.contains("7 of 8")));
    }

    #[test]
    fn behavior_notes_outside_the_window_do_not_count() {
        let mut record = compliant_record();
        // 56-day window from 2025-03-31 starts 2025-02-03.
        record.behaviors[0].date = date(2025, 2, 2);
        let result = run(&record);
        assert_eq!(result.checks.behavior_notes_count, 7);
        assert_eq!(result.status, ComplianceStatus::Warning);
    }

    #[test]
    fn order_without_consult_downgrades_to_warning() {
        let mut record = compliant_record();
        record.consults.clear();
        record.orders.push(PsychMdOrder {
            mrn: "ABC123".to_string(),
            date: date(2025, 3, 26),
            text: "Continue Seroquel, psych to follow".to_string(),
        });
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Warning);
        assert_eq!(result.checks.consult_status, CheckOutcome::Warning);
        assert!(result
            .issues
            .iter()
            .any(|i| i.message.contains("no completed psych consult")));
    }

    #[test]
    fn no_follow_up_at_all_is_critical() {
        let mut record = compliant_record();
        record.consults.clear();
        let result = run(&record);
        assert_eq!(result.status, ComplianceStatus::Critical);
        assert_eq!(result.checks.consult_status, CheckOutcome::Critical);
    }

    #[test]
    fn stale_consult_outside_the_window_is_ignored() {
        let mut record = compliant_record();
        // 90-day window from 2025-03-31 starts 2024-12-31.
        record.consults[0].date = date(2024, 12, 30);
        let result = run(&record);
        assert_eq!(result.checks.consult_status, CheckOutcome::Critical);
    }

    #[test]
    fn manual_gdr_branches() {
        let mut record = compliant_record();
        record.manual_gdr.status = GdrStatus::NotSet;
        assert_eq!(run(&record).checks.manual_gdr_status, CheckOutcome::Critical);

        record.manual_gdr = ManualGdrData {
            status: GdrStatus::Done,
            note: "   ".to_string(),
            reasons: ContraindicationReasons::default(),
        };
        assert_eq!(run(&record).checks.manual_gdr_status, CheckOutcome::Critical);

        record.manual_gdr = ManualGdrData {
            status: GdrStatus::Contraindicated,
            note: String::new(),
            reasons: ContraindicationReasons::default(),
        };
        assert_eq!(run(&record).checks.manual_gdr_status, CheckOutcome::Critical);

        record.manual_gdr.reasons.other = true;
        assert_eq!(run(&record).checks.manual_gdr_status, CheckOutcome::Critical);

        record.manual_gdr.reasons.other_text = "Cardiology advised against changes".to_string();
        let result = run(&record);
        assert_eq!(result.checks.manual_gdr_status, CheckOutcome::Ok);
        assert_eq!(result.status, ComplianceStatus::Compliant);

        record.manual_gdr.reasons = ContraindicationReasons {
            clinical_risk: true,
            ..ContraindicationReasons::default()
        };
        assert_eq!(run(&record).checks.manual_gdr_status, CheckOutcome::Ok);
    }

    #[test]
    fn issues_follow_rule_order() {
        let mut record = compliant_record();
        record.care_plan.clear();
        record.consults.clear();
        record.manual_gdr.status = GdrStatus::NotSet;
        record.medications[0].indication_text = String::new();

        let result = run(&record);
        let messages: Vec<&str> = result.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages[0].contains("care plan"));
        assert!(messages[1].contains("consult or physician order"));
        assert!(messages[2].contains("dose reduction"));
        assert!(messages[3].contains("No indication"));
    }
}
