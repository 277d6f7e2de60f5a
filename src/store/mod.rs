//! Read-only view over the clinic record store, plus the single write this
//! daemon performs (in-app notification inserts).
//!
//! The records themselves are owned by the dashboard; this module only
//! defines the query surface the reminder engine consumes. Timestamp-bearing
//! fields cross the trait as raw strings and are normalized downstream by
//! [`crate::dates::coerce_to_instant`].

mod sqlite;

pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Notification;

/// A pregnancy case. Only `active` pregnancies feed the prenatal reminder
/// flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pregnancy {
    pub id: String,
    pub case_record_id: String,
    /// "active" or "completed".
    pub status: String,
}

pub const PREGNANCY_ACTIVE: &str = "active";

/// A prenatal visit (CPN) slot under one pregnancy. The appointment itself
/// lives on the linked consultation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrenatalVisit {
    pub id: String,
    pub pregnancy_id: String,
    /// Visit label shown to staff, e.g. "CPN 2".
    pub label: String,
    pub consultation_id: Option<String>,
    pub created_at: String,
}

/// A consultation record holding the scheduled appointment timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: String,
    /// Scheduled appointment timestamp, raw. Empty/missing means no
    /// appointment was set.
    pub rdv: Option<String>,
    pub diagnosis: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// A family-planning record with its next scheduled visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyPlanningRecord {
    pub id: String,
    pub case_record_id: String,
    /// Contraception method chosen, e.g. "DIU", "implant".
    pub method: String,
    /// Next appointment timestamp, raw.
    pub rdv_prochain: Option<String>,
    pub created_by: Option<String>,
}

/// Link record: pregnancy/planning case → patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub patient_id: String,
}

/// Link record: patient → person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIdentity {
    pub id: String,
    pub person_id: String,
}

/// The person behind a patient: name and contact details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A staff user of the dashboard; summary recipients are filtered in-memory
/// from the full list by presence of phone or email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffUser {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Query surface the reminder engine needs from the record store.
///
/// Every read is a plain fetch; resolution failures surface as `Ok(None)`
/// (record absent) rather than errors, so collectors can skip and continue.
/// `Err` means the store itself misbehaved.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn pregnancies_by_status(&self, status: &str) -> anyhow::Result<Vec<Pregnancy>>;

    async fn prenatal_visits_for_pregnancy(
        &self,
        pregnancy_id: &str,
    ) -> anyhow::Result<Vec<PrenatalVisit>>;

    async fn consultation_by_id(&self, id: &str) -> anyhow::Result<Option<Consultation>>;

    /// Full scan; the planning collection filters in-memory.
    async fn family_planning_records(&self) -> anyhow::Result<Vec<FamilyPlanningRecord>>;

    async fn case_record_by_id(&self, id: &str) -> anyhow::Result<Option<CaseRecord>>;

    async fn patient_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PatientIdentity>>;

    async fn person_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PersonIdentity>>;

    /// Full scan; summary jobs filter by contact field in-memory.
    async fn staff_users(&self) -> anyhow::Result<Vec<StaffUser>>;

    /// The only write this daemon performs: a fresh, independent insert per
    /// notification. No update path exists here; the dashboard marks them
    /// read.
    async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()>;

    // Trailing-window aggregates for the weekly staff summary.

    async fn count_consultations_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn count_patients_registered_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn count_births_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64>;
}
