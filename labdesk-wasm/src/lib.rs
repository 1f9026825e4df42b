//! WASM <-> JavaScript bridge for the result-entry form.

use chrono::Utc;
use labdesk_interpret::{
    values_from_json, ResultSheet, SheetError, SheetInterpretation, TestTemplate,
};
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

#[derive(Serialize)]
struct JsClassification {
    flag: &'static str,
    arrow: &'static str,
    #[serde(flatten)]
    classification: labdesk_core::Classification,
}

#[derive(Serialize)]
struct JsSheet {
    #[serde(flatten)]
    sheet: ResultSheet,
    interpretation: SheetInterpretation,
    missing_required: Vec<String>,
}

fn install_panic_hook() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Classify one entered value; called on every keystroke in a parameter field.
#[wasm_bindgen]
pub fn classify(value: &str, reference_range: &str) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let classification = labdesk_interpret::classify(value, reference_range);
    let payload = JsClassification {
        flag: classification.flag(),
        arrow: classification.arrow(),
        classification,
    };

    payload
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Could not serialize classification: {err}")))
}

/// Build a result sheet from a template and the entered values.
#[wasm_bindgen]
pub fn interpret_sheet(template: JsValue, values: JsValue) -> Result<JsValue, JsValue> {
    install_panic_hook();

    let template_value = from_value::<serde_json::Value>(template)
        .map_err(|err| JsValue::from_str(&format!("Could not read template: {err}")))?;
    let values_value = from_value::<serde_json::Value>(values)
        .map_err(|err| JsValue::from_str(&format!("Could not read values: {err}")))?;

    let template = TestTemplate::from_json_value(template_value).map_err(format_sheet_error)?;
    let values = values_from_json(values_value).map_err(format_sheet_error)?;
    let sheet =
        labdesk_interpret::interpret_values(template, &values).map_err(format_sheet_error)?;

    let payload = JsSheet {
        interpretation: sheet.interpretation(),
        missing_required: sheet.missing_required(),
        sheet,
    };

    payload
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Could not serialize sheet: {err}")))
}

/// Calendar age for a date of birth, as of `as_of` or today.
#[wasm_bindgen]
pub fn calculate_age(birth_date: &str, as_of: Option<String>) -> Option<u32> {
    let birth = labdesk_identity::parse_birth_date(birth_date)?;
    let today = match as_of {
        Some(text) => labdesk_identity::parse_birth_date(&text)?,
        None => Utc::now().date_naive(),
    };
    labdesk_identity::age_on(birth, today)
}

fn format_sheet_error(err: SheetError) -> JsValue {
    JsValue::from_str(&format!("Result sheet error: {err}"))
}
