//! Reference-range parsing and value classification.

use std::fmt;
use std::sync::LazyLock;

use labdesk_core::{Classification, Direction, RangeDiagnostic, Status};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Below `min * CRITICAL_LOW` a low value is critical.
pub const CRITICAL_LOW: f64 = 0.8;
/// Above `max * CRITICAL_HIGH` a high value is critical.
pub const CRITICAL_HIGH: f64 = 1.2;

static BOUNDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)\s*-\s*(\d+\.?\d*)").expect("bounded range pattern"));
static UPPER_BOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*(\d+\.?\d*)").expect("upper bound pattern"));
static LOWER_BOUND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s*(\d+\.?\d*)").expect("lower bound pattern"));
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("leading number pattern")
});

/// A reference range recognised in free-form template text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferenceRange {
    Bounded { min: f64, max: f64 },
    UpperBound { max: f64 },
    LowerBound { min: f64 },
}

impl ReferenceRange {
    /// Recognise the first `min - max`, else `<max`, else `>min` in `text`.
    ///
    /// Text such as `"13-17 (M), 12-15 (F)"` yields the first pair.
    pub fn parse(text: &str) -> Result<Self, RangeDiagnostic> {
        if text.trim().is_empty() {
            return Err(RangeDiagnostic::EmptyRange);
        }

        if let Some(caps) = BOUNDED.captures(text) {
            let min = parse_bound(&caps[1])?;
            let max = parse_bound(&caps[2])?;
            return Ok(ReferenceRange::Bounded { min, max });
        }

        if let Some(caps) = UPPER_BOUND.captures(text) {
            let max = parse_bound(&caps[1])?;
            return Ok(ReferenceRange::UpperBound { max });
        }

        if let Some(caps) = LOWER_BOUND.captures(text) {
            let min = parse_bound(&caps[1])?;
            return Ok(ReferenceRange::LowerBound { min });
        }

        Err(RangeDiagnostic::UnrecognizedRange)
    }

    pub fn classify(&self, value: f64) -> Classification {
        match *self {
            ReferenceRange::Bounded { min, max } => {
                if value >= min && value <= max {
                    return Classification::normal();
                }
                let direction = if value < min {
                    Direction::Below
                } else {
                    Direction::Above
                };
                let status = if value < min * CRITICAL_LOW || value > max * CRITICAL_HIGH {
                    Status::Critical
                } else {
                    Status::Abnormal
                };
                Classification::out_of_range(status, direction)
            }
            ReferenceRange::UpperBound { max } => {
                if value < max {
                    return Classification::normal();
                }
                let status = if value >= max * CRITICAL_HIGH {
                    Status::Critical
                } else {
                    Status::Abnormal
                };
                Classification::out_of_range(status, Direction::Above)
            }
            ReferenceRange::LowerBound { min } => {
                if value > min {
                    return Classification::normal();
                }
                let status = if value <= min * CRITICAL_LOW {
                    Status::Critical
                } else {
                    Status::Abnormal
                };
                Classification::out_of_range(status, Direction::Below)
            }
        }
    }
}

impl fmt::Display for ReferenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceRange::Bounded { min, max } => write!(f, "{min} - {max}"),
            ReferenceRange::UpperBound { max } => write!(f, "<{max}"),
            ReferenceRange::LowerBound { min } => write!(f, ">{min}"),
        }
    }
}

fn parse_bound(text: &str) -> Result<f64, RangeDiagnostic> {
    match text.parse::<f64>() {
        Ok(bound) if bound.is_finite() => Ok(bound),
        _ => Err(RangeDiagnostic::MalformedBound),
    }
}

/// Read the leading decimal number of an entered value, ignoring any
/// trailing unit text (`"5.2 mg/dl"` reads as 5.2). Overflowing exponents
/// read as infinity.
pub fn parse_value(value: &str) -> Option<f64> {
    let trimmed = value.trim_start();
    let matched = LEADING_NUMBER.find(trimmed)?;
    matched.as_str().parse::<f64>().ok()
}

/// Classify an entered value against a reference-range string.
///
/// Never fails. Blank or non-numeric values, blank ranges and ranges that
/// cannot be read all come back `normal`, with a diagnostic explaining why.
pub fn classify(value: &str, reference_range: &str) -> Classification {
    if value.trim().is_empty() {
        return Classification::inconclusive(RangeDiagnostic::EmptyValue);
    }
    if reference_range.trim().is_empty() {
        return Classification::inconclusive(RangeDiagnostic::EmptyRange);
    }
    let Some(number) = parse_value(value) else {
        return Classification::inconclusive(RangeDiagnostic::NonNumericValue);
    };

    match ReferenceRange::parse(reference_range) {
        Ok(range) => range.classify(number),
        Err(diagnostic) => {
            tracing::debug!(
                reference_range,
                ?diagnostic,
                "reference range not usable, value left unflagged"
            );
            Classification::inconclusive(diagnostic)
        }
    }
}
