//! Candidate tables a patient's demographics can be read from.

use async_trait::async_trait;
use chrono::NaiveDate;
use labdesk_core::{
    AccessError, ColumnAliases, DataAccess, Filter, OrderBy, PatientIdentity, ResolverConfig, Row,
    SourceKind,
};
use serde_json::Value;

use crate::age::{age_on, parse_birth_date};

/// Identifiers for one lookup, with blanks already dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub patient_id: Option<String>,
    pub appointment_id: Option<String>,
    /// Reference date for ages derived from a date of birth.
    pub today: NaiveDate,
}

impl LookupRequest {
    pub fn new(patient_id: &str, appointment_id: Option<&str>, today: NaiveDate) -> Self {
        Self {
            patient_id: non_blank(patient_id),
            appointment_id: appointment_id.and_then(non_blank),
            today,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patient_id.is_none() && self.appointment_id.is_none()
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Demographic fields one source produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatientFields {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl PatientFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.gender.is_none()
    }

    /// Fill only the fields `identity` still lacks.
    pub fn fill_into(self, identity: &mut PatientIdentity, source: SourceKind) {
        if identity.name.is_none() {
            if let Some(name) = self.name {
                identity.name = Some(name);
                identity.source = Some(source);
            }
        }
        if identity.age.is_none() {
            identity.age = self.age;
        }
        if identity.gender.is_none() {
            identity.gender = self.gender;
        }
    }
}

/// What a source produced for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The request lacks the key this source is searched by; nothing queried.
    Skipped,
    NotFound,
    Found(PatientFields),
}

impl SourceOutcome {
    fn from_fields(fields: PatientFields) -> Self {
        if fields.is_empty() {
            SourceOutcome::NotFound
        } else {
            SourceOutcome::Found(fields)
        }
    }
}

#[async_trait]
pub trait IdentitySource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn lookup(
        &self,
        store: &dyn DataAccess,
        request: &LookupRequest,
    ) -> Result<SourceOutcome, AccessError>;
}

/// Sources in priority order for `config`.
pub fn default_sources(config: &ResolverConfig) -> Vec<Box<dyn IdentitySource>> {
    vec![
        Box::new(AppointmentSource {
            table: config.appointments_table.clone(),
            columns: config.columns.clone(),
            demographics: config.appointment_demographics,
        }),
        Box::new(PatientMasterSource {
            table: config.patients_table.clone(),
            columns: config.columns.clone(),
        }),
        Box::new(WalkInSource {
            table: config.walk_ins_table.clone(),
            columns: config.columns.clone(),
        }),
    ]
}

/// Most recent appointment for the appointment id, else for the patient id.
pub struct AppointmentSource {
    pub table: String,
    pub columns: ColumnAliases,
    /// Read age and gender too; appointment rows usually carry only a name.
    pub demographics: bool,
}

#[async_trait]
impl IdentitySource for AppointmentSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Appointments
    }

    async fn lookup(
        &self,
        store: &dyn DataAccess,
        request: &LookupRequest,
    ) -> Result<SourceOutcome, AccessError> {
        let filter = match (&request.appointment_id, &request.patient_id) {
            (Some(appointment_id), _) => {
                Filter::any_column(&self.columns.appointment_id, appointment_id)
            }
            (None, Some(patient_id)) => Filter::any_column(&self.columns.patient_id, patient_id),
            (None, None) => return Ok(SourceOutcome::Skipped),
        };
        let order = OrderBy::desc(self.columns.created_at.as_str());

        let Some(row) = store.query_one(&self.table, &filter, Some(&order)).await? else {
            return Ok(SourceOutcome::NotFound);
        };

        let mut fields = read_fields(&row, &self.columns, request.today);
        if !self.demographics {
            fields.age = None;
            fields.gender = None;
        }
        Ok(SourceOutcome::from_fields(fields))
    }
}

/// Registered patient (user) master records.
pub struct PatientMasterSource {
    pub table: String,
    pub columns: ColumnAliases,
}

#[async_trait]
impl IdentitySource for PatientMasterSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PatientMaster
    }

    async fn lookup(
        &self,
        store: &dyn DataAccess,
        request: &LookupRequest,
    ) -> Result<SourceOutcome, AccessError> {
        let key_columns = &self.columns.patient_master_id;
        lookup_by_patient_id(store, &self.table, key_columns, &self.columns, request).await
    }
}

/// Walk-in patients registered at the counter.
pub struct WalkInSource {
    pub table: String,
    pub columns: ColumnAliases,
}

#[async_trait]
impl IdentitySource for WalkInSource {
    fn kind(&self) -> SourceKind {
        SourceKind::WalkIn
    }

    async fn lookup(
        &self,
        store: &dyn DataAccess,
        request: &LookupRequest,
    ) -> Result<SourceOutcome, AccessError> {
        let key_columns = &self.columns.patient_id;
        lookup_by_patient_id(store, &self.table, key_columns, &self.columns, request).await
    }
}

async fn lookup_by_patient_id(
    store: &dyn DataAccess,
    table: &str,
    key_columns: &[String],
    columns: &ColumnAliases,
    request: &LookupRequest,
) -> Result<SourceOutcome, AccessError> {
    let Some(patient_id) = &request.patient_id else {
        return Ok(SourceOutcome::Skipped);
    };
    let filter = Filter::any_column(key_columns, patient_id);
    match store.query_one(table, &filter, None).await? {
        Some(row) => Ok(SourceOutcome::from_fields(read_fields(
            &row,
            columns,
            request.today,
        ))),
        None => Ok(SourceOutcome::NotFound),
    }
}

/// Read name, age and gender through their column aliases.
///
/// A direct age column wins over one derived from the date of birth.
pub fn read_fields(row: &Row, columns: &ColumnAliases, today: NaiveDate) -> PatientFields {
    let age = columns
        .age
        .iter()
        .find_map(|column| row.get(column).and_then(value_as_age))
        .or_else(|| {
            columns
                .date_of_birth
                .iter()
                .find_map(|column| row.get(column).and_then(Value::as_str))
                .and_then(parse_birth_date)
                .and_then(|birth| age_on(birth, today))
        });

    PatientFields {
        name: first_text(row, &columns.name),
        age,
        gender: first_text(row, &columns.gender),
    }
}

fn first_text(row: &Row, columns: &[String]) -> Option<String> {
    columns.iter().find_map(|column| {
        row.get(column)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

fn value_as_age(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|age| *age >= 0.0 && age.fract() == 0.0)
                    .map(|age| age as u64)
            })
            .and_then(|age| u32::try_from(age).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}
