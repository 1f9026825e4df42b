//! Lab value interpretation: reference-range classification and result sheets.

mod range;
mod sheet;

pub use range::{classify, parse_value, ReferenceRange, CRITICAL_HIGH, CRITICAL_LOW};
pub use sheet::{
    interpret_values, values_from_json, ParameterResult, ParameterTemplate, ResultSheet,
    SheetError, SheetInterpretation, TestTemplate,
};
