use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use labdesk_core::{
    AccessError, DataAccess, Filter, MemoryStore, PatientIdentity, ResolverConfig, Row, SourceKind,
};
use labdesk_identity::{ResolveError, Resolver};
use serde_json::{json, Value};

/// Wraps a `MemoryStore`, recording every table queried and failing the
/// tables listed in `failing`.
struct ScriptedStore {
    inner: MemoryStore,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedStore {
    fn new(tables: Value) -> Self {
        Self {
            inner: MemoryStore::from_json_value(tables).expect("tables"),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing(mut self, tables: &[&str]) -> Self {
        self.failing = tables.iter().map(|t| t.to_string()).collect();
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataAccess for ScriptedStore {
    async fn query_many(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, AccessError> {
        self.calls.lock().unwrap().push(table.to_string());
        if self.failing.contains(table) {
            return Err(AccessError::Unavailable("connection refused".into()));
        }
        self.inner.query_many(table, filter).await
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
}

fn resolver(store: ScriptedStore) -> Resolver<ScriptedStore> {
    Resolver::new(store, &ResolverConfig::default()).as_of(today())
}

fn clinic_tables() -> Value {
    json!({
        "appointments": [
            { "appointment_id": "AP-1", "mrno": "1001", "patient_name": "Alice Thomas", "age": 99, "gender": "X", "created_at": "2025-12-01T09:00:00Z" },
            { "appointment_id": "AP-2", "mrno": "1001", "patient_name": "Alice M. Thomas", "created_at": "2026-01-10T09:00:00Z" },
            { "appointment_id": "AP-3", "mrno": "2002", "patient_name": "", "created_at": "2026-01-11T09:00:00Z" }
        ],
        "users": [
            { "mrno": "1001", "name": "Bob", "age": 34, "gender": "Female" },
            { "mrno": "2002", "name": "Chen Wei", "date_of_birth": "2000-01-20", "gender": null },
            { "patient_mrno": "3003", "full_name": "Dina", "dob": "2000-01-10" }
        ],
        "walk_in_patients": [
            { "mrno": "2002", "name": "Chen W.", "age": 40, "gender": "Male" },
            { "mrno": "4004", "name": "Esha Rao", "age": "29", "gender": "Female" }
        ]
    })
}

#[tokio::test]
async fn higher_priority_source_is_never_overwritten() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("1001", None).await.unwrap().unwrap();

    assert_eq!(
        identity,
        PatientIdentity {
            name: Some("Alice M. Thomas".into()),
            age: Some(34),
            gender: Some("Female".into()),
            source: Some(SourceKind::Appointments),
        }
    );
    assert_eq!(resolver.store().calls(), vec!["appointments", "users"]);
}

#[tokio::test]
async fn patient_master_keyed_by_id() {
    let store = ScriptedStore::new(json!({
        "appointments": [],
        "users": [ { "id": "1001", "name": "Bob", "age": 40, "gender": "Male" } ],
        "walk_in_patients": [ { "id": "7", "name": "Row Seven", "mrno": "7007" } ]
    }));
    let resolver = resolver(store);

    let identity = resolver.resolve("1001", None).await.unwrap().unwrap();
    assert_eq!(
        identity,
        PatientIdentity {
            name: Some("Bob".into()),
            age: Some(40),
            gender: Some("Male".into()),
            source: Some(SourceKind::PatientMaster),
        }
    );

    // `id` is a row id outside the patient master table.
    assert_eq!(resolver.resolve("7", None).await.unwrap(), None);
}

#[tokio::test]
async fn appointment_id_selects_that_appointment() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("1001", Some("AP-1")).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Alice Thomas"));
    // Appointment demographics are ignored unless enabled.
    assert_eq!(identity.age, Some(34));
    assert_eq!(identity.gender.as_deref(), Some("Female"));
}

#[tokio::test]
async fn complete_appointment_stops_the_lookup() {
    let config = ResolverConfig {
        appointment_demographics: true,
        ..ResolverConfig::default()
    };
    let store = ScriptedStore::new(clinic_tables());
    let resolver = Resolver::new(store, &config).as_of(today());

    let identity = resolver.resolve("1001", Some("AP-1")).await.unwrap().unwrap();

    assert_eq!(identity.age, Some(99));
    assert_eq!(identity.gender.as_deref(), Some("X"));
    assert_eq!(resolver.store().calls(), vec!["appointments"]);
}

#[tokio::test]
async fn partial_sources_are_merged_in_order() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("2002", None).await.unwrap().unwrap();

    assert_eq!(
        identity,
        PatientIdentity {
            name: Some("Chen Wei".into()),
            age: Some(25),
            gender: Some("Male".into()),
            source: Some(SourceKind::PatientMaster),
        }
    );
    assert_eq!(
        resolver.store().calls(),
        vec!["appointments", "users", "walk_in_patients"]
    );
}

#[tokio::test]
async fn aliased_columns_and_birth_date() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("3003", None).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Dina"));
    assert_eq!(identity.age, Some(26));
    assert_eq!(identity.gender, None);
}

#[tokio::test]
async fn walk_in_only_patient() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("4004", None).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Esha Rao"));
    assert_eq!(identity.age, Some(29));
    assert_eq!(identity.source, Some(SourceKind::WalkIn));
}

#[tokio::test]
async fn unknown_patient_is_none() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("9999", None).await.unwrap();

    assert_eq!(identity, None);
    assert_eq!(resolver.store().calls().len(), 3);
}

#[tokio::test]
async fn appointment_only_request_skips_patient_tables() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let identity = resolver.resolve("", Some("AP-2")).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Alice M. Thomas"));
    assert_eq!(identity.age, None);
    assert_eq!(resolver.store().calls(), vec!["appointments"]);
}

#[tokio::test]
async fn failing_source_is_skipped() {
    let store = ScriptedStore::new(clinic_tables()).failing(&["appointments"]);
    let resolver = resolver(store);

    let identity = resolver.resolve("1001", None).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Bob"));
    assert_eq!(identity.source, Some(SourceKind::PatientMaster));
}

#[tokio::test]
async fn missing_table_is_not_fatal() {
    let store = ScriptedStore::new(json!({
        "appointments": [],
        "users": [ { "mrno": "5005", "name": "Farah" } ]
    }));
    let resolver = resolver(store);

    let identity = resolver.resolve("5005", None).await.unwrap().unwrap();

    assert_eq!(identity.name.as_deref(), Some("Farah"));
    assert_eq!(identity.age, None);
}

#[tokio::test]
async fn every_source_failing_is_unavailable() {
    let store = ScriptedStore::new(clinic_tables()).failing(&[
        "appointments",
        "users",
        "walk_in_patients",
    ]);
    let resolver = resolver(store);

    let err = resolver.resolve("1001", None).await.unwrap_err();

    match err {
        ResolveError::Unavailable(failures) => {
            let sources: Vec<_> = failures.iter().map(|f| f.source).collect();
            assert_eq!(
                sources,
                vec![
                    SourceKind::Appointments,
                    SourceKind::PatientMaster,
                    SourceKind::WalkIn
                ]
            );
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn failures_plus_not_found_is_none() {
    let store = ScriptedStore::new(clinic_tables()).failing(&["appointments", "users"]);
    let resolver = resolver(store);

    assert_eq!(resolver.resolve("9999", None).await.unwrap(), None);
}

#[tokio::test]
async fn blank_identifiers_are_rejected() {
    let resolver = resolver(ScriptedStore::new(clinic_tables()));

    let err = resolver.resolve("  ", None).await.unwrap_err();

    assert!(matches!(err, ResolveError::MissingIdentifier));
    assert!(resolver.store().calls().is_empty());
}
