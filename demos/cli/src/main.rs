use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gdr_core::{apply_report, evaluate, ReportKind, ResidentRecord, Settings};
use gdr_reports::ParseContext;

#[derive(Parser, Debug)]
#[command(
    name = "gdr-cli",
    about = "Parse a pasted facility report and print per-resident compliance verdicts."
)]
struct Args {
    /// Report kind: census, medications, consults, behaviors, care_plan,
    /// physician_orders, or episodic_behavior.
    #[arg(short, long)]
    kind: ReportKind,

    /// Path to the pasted report text.
    #[arg(short, long)]
    input: PathBuf,

    /// Evaluation reference date (YYYY-MM-DD); defaults to today.
    #[arg(short, long)]
    reference_date: Option<NaiveDate>,

    /// Print full evaluation results as JSON instead of the summary.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gdr_reports=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read {:?}", args.input))?;

    let report = gdr_reports::parse_report(args.kind, &text, &ParseContext::default());
    if report.is_empty() {
        println!("No events recognized in {:?}", args.input);
        return Ok(());
    }
    let parsed = report.len();

    let mut records: BTreeMap<String, ResidentRecord> = BTreeMap::new();
    apply_report(&mut records, report);

    let reference_date = args
        .reference_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let settings = Settings::default();

    if args.json {
        let results: BTreeMap<&str, _> = records
            .iter()
            .map(|(mrn, record)| (mrn.as_str(), evaluate(record, reference_date, &settings)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!(
        "Parsed {parsed} event(s) into {} resident record(s), evaluated as of {reference_date}\n",
        records.len()
    );
    for (mrn, record) in &records {
        let result = evaluate(record, reference_date, &settings);
        let name = if record.resident.name.is_empty() {
            "(name pending census)"
        } else {
            record.resident.name.as_str()
        };
        println!("{mrn}  {name}  [{:?}]", result.status);
        for issue in &result.issues {
            println!("    {:?}: {}", issue.severity, issue.message);
        }
    }

    Ok(())
}
