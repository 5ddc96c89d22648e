//! Browser-worker boundary: every export takes and returns plain JS values
//! so the UI can talk to the core over structured-clone messages.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

use gdr_core::settings::{self, MappingIssue};
use gdr_core::{
    parse_reference_date, ParsedReport, ReportKind, ResidentRecord, Settings, SettingsOverrides,
};
use gdr_reports::ParseContext;

fn install_panic_hook() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

fn js_err(context: &str, err: impl Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {err}"))
}

fn settings_from(config: Option<JsValue>) -> Result<Settings, JsValue> {
    match config {
        Some(js) => {
            let overrides: SettingsOverrides =
                from_value(js).map_err(|err| js_err("Could not read settings", err))?;
            Ok(Settings::default().with_overrides(overrides))
        }
        None => Ok(Settings::default()),
    }
}

/// Parse one pasted report. `kind` is a report-kind string ("census",
/// "medications", ...); `context` optionally carries the known residents
/// and the facility medication map.
#[wasm_bindgen]
pub fn parse_report(
    kind: &str,
    text: &str,
    context: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let kind = ReportKind::from_str(kind).map_err(|err| js_err("Could not parse report", err))?;
    let context = match context {
        Some(js) => from_value::<ParseContext>(js)
            .map_err(|err| js_err("Could not read parse context", err))?,
        None => ParseContext::default(),
    };

    let report = gdr_reports::parse_report(kind, text, &context);
    to_value(&report).map_err(|err| js_err("Could not serialize events", err))
}

/// Merge parsed events into the caller's record map and hand the map back.
#[wasm_bindgen]
pub fn apply_report(records: JsValue, report: JsValue) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let mut records: BTreeMap<String, ResidentRecord> =
        from_value(records).map_err(|err| js_err("Could not read records", err))?;
    let report: ParsedReport =
        from_value(report).map_err(|err| js_err("Could not read events", err))?;

    gdr_core::apply_report(&mut records, report);
    to_value(&records).map_err(|err| js_err("Could not serialize records", err))
}

/// Run the compliance rules for one resident record as of `reference_date`
/// (`YYYY-MM-DD`). `settings` is a sparse override object; omitted fields
/// keep their defaults.
#[wasm_bindgen]
pub fn evaluate_resident(
    record: JsValue,
    reference_date: &str,
    settings: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let record: ResidentRecord =
        from_value(record).map_err(|err| js_err("Could not read resident record", err))?;
    let reference_date = parse_reference_date(reference_date)
        .map_err(|err| js_err("Could not evaluate resident", err))?;
    let settings = settings_from(settings)?;

    let result = gdr_core::evaluate(&record, reference_date, &settings);
    to_value(&result).map_err(|err| js_err("Could not serialize result", err))
}

#[derive(Serialize)]
struct MappingOutcome<M> {
    map: M,
    issues: Vec<MappingIssue>,
}

/// Parse pasted `Class: indication, indication` text for the settings
/// editor; returns the map plus line-numbered problems.
#[wasm_bindgen]
pub fn parse_indication_map_text(text: &str) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let (map, issues) = settings::parse_indication_map_text(text);
    to_value(&MappingOutcome { map, issues })
        .map_err(|err| js_err("Could not serialize indication map", err))
}

/// Parse pasted `drug = Class` override text for the settings editor.
#[wasm_bindgen]
pub fn parse_medication_map_text(text: &str) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let (map, issues) = settings::parse_medication_map_text(text);
    to_value(&MappingOutcome { map, issues })
        .map_err(|err| js_err("Could not serialize medication map", err))
}
