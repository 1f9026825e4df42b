//! Result sheets: a test template's parameters with entered values.

use std::collections::BTreeMap;

use labdesk_core::{Classification, Direction, RangeDiagnostic, Status};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::range::classify;

/// One parameter of a test template, as stored with the template row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterTemplate {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub reference_range: Option<String>,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub order: Option<u32>,
}

fn default_kind() -> String {
    "numeric".to_string()
}

impl ParameterTemplate {
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// A test template: either a bare parameter list or a template row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestTemplate {
    #[serde(default)]
    pub test_name: Option<String>,
    #[serde(default)]
    pub test_code: Option<String>,
    pub parameters: Vec<ParameterTemplate>,
}

impl TestTemplate {
    pub fn from_json_value(value: Value) -> Result<Self, SheetError> {
        match value {
            Value::Array(_) => {
                let parameters = serde_json::from_value(value)
                    .map_err(|err| SheetError::Parse(err.to_string()))?;
                Ok(Self {
                    parameters,
                    ..Self::default()
                })
            }
            Value::Object(_) => {
                serde_json::from_value(value).map_err(|err| SheetError::Parse(err.to_string()))
            }
            _ => Err(SheetError::Parse(
                "template must be a parameter array or a template object".to_string(),
            )),
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, SheetError> {
        let value: Value =
            serde_json::from_str(input).map_err(|err| SheetError::Parse(err.to_string()))?;
        Self::from_json_value(value)
    }
}

/// A parameter with its entered value and derived status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterResult {
    pub name: String,
    pub display_name: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub required: bool,
    pub value: String,
    pub status: Status,
    pub direction: Option<Direction>,
    pub flag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<RangeDiagnostic>,
}

impl ParameterResult {
    fn from_template(template: ParameterTemplate) -> Self {
        let mut result = Self {
            display_name: template.label().to_string(),
            name: template.name,
            unit: template.unit,
            reference_range: template.reference_range,
            required: template.required,
            value: String::new(),
            status: Status::Normal,
            direction: None,
            flag: String::new(),
            diagnostic: None,
        };
        result.apply(Classification::normal());
        result
    }

    fn set_value(&mut self, value: String) {
        let classification = classify(&value, self.reference_range.as_deref().unwrap_or(""));
        self.value = value;
        self.apply(classification);
    }

    fn apply(&mut self, classification: Classification) {
        self.status = classification.status;
        self.direction = classification.direction;
        self.flag = classification.flag().to_string();
        self.diagnostic = if self.value.trim().is_empty() {
            None
        } else {
            classification.diagnostic
        };
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// Overall reading of a sheet, stored with the saved result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SheetInterpretation {
    pub overall_interpretation: Status,
    pub has_abnormal_values: bool,
    pub has_critical_values: bool,
    pub normal: usize,
    pub abnormal: usize,
    pub critical: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResultSheet {
    pub test_name: Option<String>,
    pub parameters: Vec<ParameterResult>,
}

impl ResultSheet {
    /// Build an empty sheet with parameters in template order.
    pub fn from_template(template: TestTemplate) -> Self {
        let mut parameters = template.parameters;
        parameters.sort_by_key(|param| param.order.unwrap_or(u32::MAX));
        Self {
            test_name: template.test_name,
            parameters: parameters
                .into_iter()
                .map(ParameterResult::from_template)
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterResult> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Enter a value and reclassify the parameter.
    pub fn record(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<&ParameterResult, SheetError> {
        let param = self
            .parameters
            .iter_mut()
            .find(|param| param.name == name)
            .ok_or_else(|| SheetError::UnknownParameter(name.to_string()))?;
        param.set_value(value.into());
        Ok(param)
    }

    pub fn record_all(&mut self, values: &BTreeMap<String, String>) -> Result<(), SheetError> {
        for (name, value) in values {
            self.record(name, value.clone())?;
        }
        Ok(())
    }

    /// Display names of required parameters still blank.
    pub fn missing_required(&self) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|param| param.required && param.is_blank())
            .map(|param| param.display_name.clone())
            .collect()
    }

    pub fn validate(&self) -> Result<(), SheetError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SheetError::MissingRequired(missing))
        }
    }

    pub fn interpretation(&self) -> SheetInterpretation {
        let mut summary = SheetInterpretation::default();
        for param in &self.parameters {
            match param.status {
                Status::Normal => summary.normal += 1,
                Status::Abnormal => summary.abnormal += 1,
                Status::Critical => summary.critical += 1,
            }
        }
        summary.has_abnormal_values = summary.abnormal > 0;
        summary.has_critical_values = summary.critical > 0;
        summary.overall_interpretation = if summary.has_critical_values {
            Status::Critical
        } else if summary.has_abnormal_values {
            Status::Abnormal
        } else {
            Status::Normal
        };
        summary
    }
}

/// Build a sheet from a template and record every entered value.
pub fn interpret_values(
    template: TestTemplate,
    values: &BTreeMap<String, String>,
) -> Result<ResultSheet, SheetError> {
    let mut sheet = ResultSheet::from_template(template);
    sheet.record_all(values)?;
    Ok(sheet)
}

/// Read `{ "param": value }` where values may be strings, numbers or null.
pub fn values_from_json(value: Value) -> Result<BTreeMap<String, String>, SheetError> {
    let Value::Object(entries) = value else {
        return Err(SheetError::Parse(
            "values must be an object keyed by parameter name".to_string(),
        ));
    };

    entries
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Null => String::new(),
                other => {
                    return Err(SheetError::Parse(format!(
                        "value for {name} must be a string or number, received {other}"
                    )))
                }
            };
            Ok((name, text))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SheetError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("please fill in required parameters: {}", .0.join(", "))]
    MissingRequired(Vec<String>),
    #[error("could not read sheet input: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lipid_template() -> TestTemplate {
        TestTemplate::from_json_value(json!({
            "test_name": "Lipid Profile",
            "parameters": [
                { "name": "hdl", "display_name": "HDL", "reference_range": ">40", "required": true, "order": 2 },
                { "name": "cholesterol", "display_name": "TOTAL CHOLESTEROL", "reference_range": "<200", "required": true, "order": 1 },
                { "name": "remarks", "type": "text", "order": 3 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn parameters_follow_template_order() {
        let sheet = ResultSheet::from_template(lipid_template());
        let names: Vec<_> = sheet.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["cholesterol", "hdl", "remarks"]);
        assert_eq!(sheet.parameters[2].display_name, "remarks");
    }

    #[test]
    fn recording_reclassifies_and_flags() {
        let mut sheet = ResultSheet::from_template(lipid_template());

        let result = sheet.record("cholesterol", "260").unwrap();
        assert_eq!(result.status, Status::Critical);
        assert_eq!(result.flag, "C");

        let result = sheet.record("cholesterol", "210").unwrap();
        assert_eq!(result.status, Status::Abnormal);
        assert_eq!(result.flag, "H/L");
        assert_eq!(result.direction, Some(Direction::Above));

        let result = sheet.record("cholesterol", "180").unwrap();
        assert_eq!(result.status, Status::Normal);
        assert_eq!(result.flag, "");
        assert_eq!(result.direction, None);
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut sheet = ResultSheet::from_template(lipid_template());
        assert_eq!(
            sheet.record("ldl", "100").unwrap_err(),
            SheetError::UnknownParameter("ldl".into())
        );
    }

    #[test]
    fn missing_required_lists_display_names() {
        let mut sheet = ResultSheet::from_template(lipid_template());
        sheet.record("hdl", "55").unwrap();
        sheet.record("cholesterol", "  ").unwrap();

        assert_eq!(sheet.missing_required(), vec!["TOTAL CHOLESTEROL"]);
        let err = sheet.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "please fill in required parameters: TOTAL CHOLESTEROL"
        );
    }

    #[test]
    fn critical_dominates_overall_interpretation() {
        let values = BTreeMap::from([
            ("cholesterol".to_string(), "210".to_string()),
            ("hdl".to_string(), "30".to_string()),
            ("remarks".to_string(), "fasting".to_string()),
        ]);
        let sheet = interpret_values(lipid_template(), &values).unwrap();
        let summary = sheet.interpretation();

        assert_eq!(summary.overall_interpretation, Status::Critical);
        assert!(summary.has_abnormal_values);
        assert!(summary.has_critical_values);
        assert_eq!((summary.normal, summary.abnormal, summary.critical), (1, 1, 1));
        assert!(sheet.validate().is_ok());
    }

    #[test]
    fn all_normal_sheet() {
        let values = BTreeMap::from([
            ("cholesterol".to_string(), "150".to_string()),
            ("hdl".to_string(), "60".to_string()),
        ]);
        let summary = interpret_values(lipid_template(), &values)
            .unwrap()
            .interpretation();
        assert_eq!(summary.overall_interpretation, Status::Normal);
        assert!(!summary.has_abnormal_values);
        assert!(!summary.has_critical_values);
    }

    #[test]
    fn values_accept_numbers_and_null() {
        let values = values_from_json(json!({ "hdl": 45.5, "cholesterol": null, "remarks": "ok" }))
            .unwrap();
        assert_eq!(values["hdl"], "45.5");
        assert_eq!(values["cholesterol"], "");
        assert!(values_from_json(json!({ "hdl": [1] })).is_err());
        assert!(values_from_json(json!([1])).is_err());
    }

    #[test]
    fn bare_parameter_array_is_a_template() {
        let template = TestTemplate::from_json_str(
            r#"[{ "name": "blood_urea", "reference_range": "15 - 45" }]"#,
        )
        .unwrap();
        assert_eq!(template.test_name, None);
        assert_eq!(template.parameters[0].kind, "numeric");
        assert!(!template.parameters[0].required);
    }
}
