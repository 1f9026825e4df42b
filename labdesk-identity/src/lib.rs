//! Patient identity resolution across appointment, patient master and
//! walk-in tables.
//!
//! Sources are queried one at a time in priority order. Each may only fill
//! fields that are still empty, and the lookup stops as soon as name, age
//! and gender are all known.

use std::fmt;

use chrono::{NaiveDate, Utc};
use labdesk_core::{AccessError, DataAccess, PatientIdentity, ResolverConfig, SourceKind};

pub mod age;
mod sources;

pub use age::{age_on, parse_birth_date};
pub use sources::{
    default_sources, read_fields, AppointmentSource, IdentitySource, LookupRequest,
    PatientFields, PatientMasterSource, SourceOutcome, WalkInSource,
};

/// Resolves patient demographics for the result-entry form.
pub struct Resolver<D> {
    store: D,
    sources: Vec<Box<dyn IdentitySource>>,
    today: Option<NaiveDate>,
}

impl<D: DataAccess> Resolver<D> {
    pub fn new(store: D, config: &ResolverConfig) -> Self {
        Self::with_sources(store, default_sources(config))
    }

    /// Use a custom source list; earlier sources take precedence.
    pub fn with_sources(store: D, sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self {
            store,
            sources,
            today: None,
        }
    }

    /// Pin the date ages are computed against. Defaults to today (UTC).
    pub fn as_of(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    /// Look up a patient by medical record number and/or appointment id.
    ///
    /// Returns `Ok(None)` when no source knows the patient. A failing source
    /// is logged and skipped; only when every queried source fails is
    /// `ResolveError::Unavailable` returned.
    pub async fn resolve(
        &self,
        patient_id: &str,
        appointment_id: Option<&str>,
    ) -> Result<Option<PatientIdentity>, ResolveError> {
        let today = self.today.unwrap_or_else(|| Utc::now().date_naive());
        let request = LookupRequest::new(patient_id, appointment_id, today);
        if request.is_empty() {
            return Err(ResolveError::MissingIdentifier);
        }

        let mut identity = PatientIdentity::default();
        let mut failures = Vec::new();
        let mut queried = 0usize;

        for source in &self.sources {
            if identity.is_complete() {
                break;
            }

            let kind = source.kind();
            match source.lookup(&self.store, &request).await {
                Ok(SourceOutcome::Skipped) => {
                    tracing::debug!(source = kind.label(), "no identifier for source, skipped");
                }
                Ok(SourceOutcome::NotFound) => {
                    queried += 1;
                    tracing::debug!(source = kind.label(), "patient not found in source");
                }
                Ok(SourceOutcome::Found(fields)) => {
                    queried += 1;
                    tracing::debug!(source = kind.label(), ?fields, "patient fields found");
                    fields.fill_into(&mut identity, kind);
                }
                Err(error) => {
                    queried += 1;
                    tracing::warn!(
                        source = kind.label(),
                        %error,
                        "patient lookup failed, trying next source"
                    );
                    failures.push(SourceFailure {
                        source: kind,
                        error,
                    });
                }
            }
        }

        if queried > 0 && failures.len() == queried {
            return Err(ResolveError::Unavailable(failures));
        }

        if identity.is_empty() {
            tracing::info!(
                patient_id = request.patient_id.as_deref().unwrap_or(""),
                appointment_id = request.appointment_id.as_deref().unwrap_or(""),
                "patient not found in any source"
            );
            Ok(None)
        } else {
            Ok(Some(identity))
        }
    }
}

/// One source that could not be queried.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub error: AccessError,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source.label(), self.error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("a patient identifier or appointment identifier is required")]
    MissingIdentifier,
    #[error("patient data service unavailable ({})", join_failures(.0))]
    Unavailable(Vec<SourceFailure>),
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
