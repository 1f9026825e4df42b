//! Shared types for lab value interpretation and patient identity lookup.

use serde::{Deserialize, Serialize};

pub mod access;

pub use access::{AccessError, DataAccess, Filter, MemoryStore, OrderBy, Row};

/// Table names and lookup behaviour for patient identity resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub appointments_table: String,
    pub patients_table: String,
    pub walk_ins_table: String,
    /// Let appointment rows fill age and gender, not only the name.
    pub appointment_demographics: bool,
    pub columns: ColumnAliases,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            appointments_table: "appointments".to_string(),
            patients_table: "users".to_string(),
            walk_ins_table: "walk_in_patients".to_string(),
            appointment_demographics: false,
            columns: ColumnAliases::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON config; missing keys keep their defaults.
    pub fn from_json_str(input: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(input)?)
    }
}

/// Historic column names carrying the same logical field.
///
/// Lookups by identifier match any of the listed columns. Field reads take
/// the first alias holding a non-empty value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnAliases {
    pub patient_id: Vec<String>,
    /// Key columns of the patient master table, which may be keyed by the
    /// record number itself in `id`.
    pub patient_master_id: Vec<String>,
    pub appointment_id: Vec<String>,
    pub name: Vec<String>,
    pub age: Vec<String>,
    pub gender: Vec<String>,
    pub date_of_birth: Vec<String>,
    pub created_at: String,
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            patient_id: strings(&["mrno", "patient_mrno"]),
            patient_master_id: strings(&["id", "mrno", "patient_mrno"]),
            appointment_id: strings(&["appointment_id"]),
            name: strings(&["patient_name", "name", "full_name"]),
            age: strings(&["age", "patient_age"]),
            gender: strings(&["gender", "sex", "patient_gender"]),
            date_of_birth: strings(&["date_of_birth", "dob", "birth_date"]),
            created_at: "created_at".to_string(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Clinical status of a measured value against its reference range.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Normal,
    Abnormal,
    Critical,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Normal => "normal",
            Status::Abnormal => "abnormal",
            Status::Critical => "critical",
        }
    }

    /// Flag printed next to the value on a report.
    pub fn flag(self) -> &'static str {
        match self {
            Status::Normal => "",
            Status::Abnormal => "H/L",
            Status::Critical => "C",
        }
    }
}

/// Side of the reference range an out-of-range value falls on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Below,
    Above,
}

impl Direction {
    pub fn arrow(self) -> &'static str {
        match self {
            Direction::Below => "↓",
            Direction::Above => "↑",
        }
    }
}

/// Why a classification fell back to `normal` without comparing anything.
///
/// Carried for visibility only; it never changes the status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RangeDiagnostic {
    EmptyValue,
    NonNumericValue,
    EmptyRange,
    UnrecognizedRange,
    MalformedBound,
}

/// Outcome of classifying one value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Classification {
    pub status: Status,
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<RangeDiagnostic>,
}

impl Classification {
    pub fn normal() -> Self {
        Self::default()
    }

    /// Normal status, with the reason no comparison took place.
    pub fn inconclusive(diagnostic: RangeDiagnostic) -> Self {
        Self {
            diagnostic: Some(diagnostic),
            ..Self::default()
        }
    }

    pub fn out_of_range(status: Status, direction: Direction) -> Self {
        Self {
            status,
            direction: Some(direction),
            diagnostic: None,
        }
    }

    pub fn flag(&self) -> &'static str {
        self.status.flag()
    }

    /// Arrow shown beside abnormal or critical values, empty otherwise.
    pub fn arrow(&self) -> &'static str {
        match (self.status, self.direction) {
            (Status::Normal, _) | (_, None) => "",
            (_, Some(direction)) => direction.arrow(),
        }
    }
}

/// Candidate table a patient field came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Appointments,
    PatientMaster,
    WalkIn,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Appointments => "appointments",
            SourceKind::PatientMaster => "patient master",
            SourceKind::WalkIn => "walk-in patients",
        }
    }
}

/// Patient demographics assembled for one lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PatientIdentity {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    /// Source of the first non-empty name.
    pub source: Option<SourceKind>,
}

impl PatientIdentity {
    pub fn is_complete(&self) -> bool {
        self.name.is_some() && self.age.is_some() && self.gender.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.gender.is_none()
    }
}

/// Failure reading a JSON config or table snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unexpected shape: {0}")]
    Shape(String),
}
