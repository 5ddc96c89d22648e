use std::collections::BTreeMap;
use std::fs;

use chrono::NaiveDate;
use gdr_core::{
    apply_report, evaluate, CheckOutcome, ComplianceStatus, ContraindicationReasons, GdrStatus,
    ManualGdrData, ParsedReport, ReportKind, ResidentRecord, Settings, TherapeuticClass,
};
use gdr_reports::{parse_report, ParseContext};

fn fixture(name: &str) -> String {
    let path = format!("{}/tests/data/{name}", env!("CARGO_MANIFEST_DIR"));
    fs::read_to_string(&path).expect("fixture should be readable")
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 31).expect("valid date")
}

#[test]
fn census_roster_parses_every_unit() {
    let report = parse_report(
        ReportKind::Census,
        &fixture("census.txt"),
        &ParseContext::default(),
    );
    let ParsedReport::Census(residents) = report else {
        panic!("expected census events");
    };

    assert_eq!(residents.len(), 3);
    assert_eq!(residents[0].mrn, "ABC123");
    assert_eq!(residents[0].name, "Doe, John");
    assert_eq!(residents[0].room, "101-A");
    assert_eq!(residents[0].unit, "Unit 3 North");
    assert_eq!(residents[2].mrn, "MRN4452");
    assert_eq!(residents[2].unit, "Unit 4 South");
}

#[test]
fn medication_report_runs_the_full_pipeline() {
    let report = parse_report(
        ReportKind::Medications,
        &fixture("medications.txt"),
        &ParseContext::default(),
    );
    let ParsedReport::Medications(meds) = report else {
        panic!("expected medication events");
    };

    assert_eq!(meds.len(), 3);

    let seroquel = &meds[0];
    assert_eq!(seroquel.mrn, "ABC123");
    assert_eq!(seroquel.normalized_name, "seroquel");
    assert_eq!(seroquel.therapeutic_class, TherapeuticClass::Antipsychotic);
    assert_eq!(seroquel.dose_text, "25 MG");
    assert_eq!(seroquel.frequency_text, "at bedtime");
    assert_eq!(seroquel.indication_text, "schizophrenia");

    let sertraline = &meds[1];
    assert_eq!(sertraline.therapeutic_class, TherapeuticClass::Antidepressant);
    assert_eq!(sertraline.start_date, NaiveDate::from_ymd_opt(2025, 3, 1));

    let melatonin = &meds[2];
    assert_eq!(melatonin.mrn, "DEF456");
    assert_eq!(melatonin.therapeutic_class, TherapeuticClass::Hypnotic);
    assert_eq!(melatonin.indication_text, "sleep disturbance");
}

#[test]
fn orders_resolve_residents_through_census_context() {
    let ParsedReport::Census(roster) = parse_report(
        ReportKind::Census,
        &fixture("census.txt"),
        &ParseContext::default(),
    ) else {
        panic!("expected census events");
    };
    let context = ParseContext {
        residents: roster,
        ..ParseContext::default()
    };

    let ParsedReport::PhysicianOrders(orders) =
        parse_report(ReportKind::PhysicianOrders, &fixture("orders.txt"), &context)
    else {
        panic!("expected order events");
    };

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].mrn, "ABC123");
    assert_eq!(
        orders[0].date,
        NaiveDate::from_ymd_opt(2025, 3, 18).expect("valid date")
    );
    assert_eq!(orders[1].mrn, "DEF456");
    assert!(orders[1].text.contains("melatonin taper"));
}

#[test]
fn episodic_notes_condense_into_snippets() {
    let ParsedReport::EpisodicBehavior(events) = parse_report(
        ReportKind::EpisodicBehavior,
        &fixture("episodic.txt"),
        &ParseContext::default(),
    ) else {
        panic!("expected episodic events");
    };

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].mrn, "ABC123");
    assert_eq!(
        events[0].date,
        NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date")
    );
    assert!(events[0].snippet.starts_with("Situation: Resident became agitated"));
    assert!(events[0].snippet.contains("Intervention: PRN lorazepam"));
    assert_eq!(events[1].mrn, "MRN4452");
    assert_eq!(
        events[1].snippet,
        "Situation: Refused morning care and medications; \
         Response: Accepted care after second approach"
    );
}

#[test]
fn end_to_end_parse_merge_and_evaluate() {
    let mut records: BTreeMap<String, ResidentRecord> = BTreeMap::new();
    let settings = Settings::default();

    let ParsedReport::Census(roster) = parse_report(
        ReportKind::Census,
        &fixture("census.txt"),
        &ParseContext::default(),
    ) else {
        panic!("expected census events");
    };
    let context = ParseContext {
        residents: roster.clone(),
        custom_medication_map: settings.custom_medication_map.clone(),
    };
    apply_report(&mut records, ParsedReport::Census(roster));

    for (kind, file) in [
        (ReportKind::Medications, "medications.txt"),
        (ReportKind::Consults, "consults.txt"),
        (ReportKind::Behaviors, "behaviors.txt"),
        (ReportKind::CarePlan, "care_plan.txt"),
        (ReportKind::PhysicianOrders, "orders.txt"),
        (ReportKind::EpisodicBehavior, "episodic.txt"),
    ] {
        apply_report(&mut records, parse_report(kind, &fixture(file), &context));
    }

    assert_eq!(records.len(), 3);
    assert_eq!(records["ABC123"].medications.len(), 2);
    assert_eq!(records["ABC123"].behaviors.len(), 8);
    assert_eq!(records["ABC123"].episodes.len(), 1);
    assert_eq!(records["MRN4452"].consults.len(), 1);

    // Re-pasting the same reports must not change anything.
    for (kind, file) in [
        (ReportKind::Medications, "medications.txt"),
        (ReportKind::Behaviors, "behaviors.txt"),
        (ReportKind::Consults, "consults.txt"),
        (ReportKind::EpisodicBehavior, "episodic.txt"),
    ] {
        apply_report(&mut records, parse_report(kind, &fixture(file), &context));
    }
    assert_eq!(records["ABC123"].medications.len(), 2);
    assert_eq!(records["ABC123"].behaviors.len(), 8);
    assert_eq!(records["ABC123"].consults.len(), 2);
    assert_eq!(records["ABC123"].episodes.len(), 1);

    // John has everything documented once staff record the dose reduction.
    records
        .get_mut("ABC123")
        .expect("John is on the census")
        .manual_gdr = ManualGdrData {
        status: GdrStatus::Done,
        note: "Taper attempted 3/10, tolerated well".to_string(),
        reasons: ContraindicationReasons::default(),
    };
    let john = evaluate(&records["ABC123"], reference_date(), &settings);
    assert_eq!(john.status, ComplianceStatus::Compliant, "issues: {:?}", john.issues);
    assert!(john.issues.is_empty());
    assert_eq!(john.checks.behavior_notes_count, 8);
    assert!(john.checks.care_plan_psych_present);

    // Alice is missing a psych care-plan item, a consult, behavior
    // documentation, and a dose-reduction answer.
    let alice = evaluate(&records["DEF456"], reference_date(), &settings);
    assert_eq!(alice.status, ComplianceStatus::Critical);
    assert_eq!(alice.checks.consult_status, CheckOutcome::Warning);
    assert_eq!(alice.checks.behavior_notes_count, 1);
    assert!(!alice.checks.care_plan_psych_present);

    // Mary has records but no parsed medications, so there is nothing to
    // review yet.
    let mary = evaluate(&records["MRN4452"], reference_date(), &settings);
    assert_eq!(mary.status, ComplianceStatus::Unknown);
    assert!(mary.issues.is_empty());
}
