//! Test infrastructure: MemoryRecordStore and RecordingChannel.
//!
//! In-memory implementations of the real traits, suitable for integration
//! tests that exercise collection and dispatch without SQLite or network.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::channels::ReminderChannel;
use crate::store::{
    CaseRecord, Consultation, FamilyPlanningRecord, PatientIdentity, PersonIdentity, Pregnancy,
    PrenatalVisit, RecordStore, StaffUser,
};
use crate::types::{
    DailySummary, DeliveryResult, Notification, ReminderCandidate, WeeklySummary,
};

// ---------------------------------------------------------------------------
// MemoryRecordStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Records {
    pregnancies: Vec<Pregnancy>,
    visits: Vec<PrenatalVisit>,
    consultations: Vec<Consultation>,
    planning: Vec<FamilyPlanningRecord>,
    case_records: Vec<CaseRecord>,
    patients: Vec<PatientIdentity>,
    persons: Vec<PersonIdentity>,
    staff: Vec<StaffUser>,
    notifications: Vec<Notification>,
    /// RFC 3339 registration/record timestamps backing the count queries.
    patient_registrations: Vec<String>,
    birth_records: Vec<String>,
}

/// Vec-of-everything record store for tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Records>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pregnancy(&self, id: &str, case_record_id: &str, status: &str) {
        self.records.lock().unwrap().pregnancies.push(Pregnancy {
            id: id.to_string(),
            case_record_id: case_record_id.to_string(),
            status: status.to_string(),
        });
    }

    pub fn add_visit(
        &self,
        id: &str,
        pregnancy_id: &str,
        label: &str,
        consultation_id: Option<&str>,
    ) {
        self.records.lock().unwrap().visits.push(PrenatalVisit {
            id: id.to_string(),
            pregnancy_id: pregnancy_id.to_string(),
            label: label.to_string(),
            consultation_id: consultation_id.map(String::from),
            created_at: Utc::now().to_rfc3339(),
        });
    }

    pub fn add_consultation(
        &self,
        id: &str,
        rdv: Option<&str>,
        created_by: Option<&str>,
        created_at: DateTime<Utc>,
    ) {
        self.records.lock().unwrap().consultations.push(Consultation {
            id: id.to_string(),
            rdv: rdv.map(String::from),
            diagnosis: None,
            created_by: created_by.map(String::from),
            created_at: created_at.to_rfc3339(),
        });
    }

    pub fn add_planning_record(
        &self,
        id: &str,
        case_record_id: &str,
        method: &str,
        rdv_prochain: Option<&str>,
        created_by: Option<&str>,
    ) {
        self.records
            .lock()
            .unwrap()
            .planning
            .push(FamilyPlanningRecord {
                id: id.to_string(),
                case_record_id: case_record_id.to_string(),
                method: method.to_string(),
                rdv_prochain: rdv_prochain.map(String::from),
                created_by: created_by.map(String::from),
            });
    }

    /// Seed a full CaseRecord → PatientIdentity → PersonIdentity chain.
    pub fn add_patient_chain(
        &self,
        case_record_id: &str,
        patient_id: &str,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) {
        let mut records = self.records.lock().unwrap();
        let person_id = format!("person-{}", patient_id);
        records.case_records.push(CaseRecord {
            id: case_record_id.to_string(),
            patient_id: patient_id.to_string(),
        });
        records.patients.push(PatientIdentity {
            id: patient_id.to_string(),
            person_id: person_id.clone(),
        });
        records.persons.push(PersonIdentity {
            id: person_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            phone: phone.map(String::from),
            email: email.map(String::from),
        });
    }

    pub fn add_staff(&self, id: &str, name: &str, phone: Option<&str>, email: Option<&str>) {
        self.records.lock().unwrap().staff.push(StaffUser {
            id: id.to_string(),
            name: name.to_string(),
            phone: phone.map(String::from),
            email: email.map(String::from),
        });
    }

    pub fn add_patient_registration(&self, at: DateTime<Utc>) {
        self.records
            .lock()
            .unwrap()
            .patient_registrations
            .push(at.to_rfc3339());
    }

    pub fn add_birth(&self, at: DateTime<Utc>) {
        self.records.lock().unwrap().birth_records.push(at.to_rfc3339());
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.records.lock().unwrap().notifications.clone()
    }
}

fn count_since(timestamps: &[String], since: DateTime<Utc>) -> u64 {
    timestamps
        .iter()
        .filter_map(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .filter(|dt| dt.with_timezone(&Utc) >= since)
        .count() as u64
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn pregnancies_by_status(&self, status: &str) -> anyhow::Result<Vec<Pregnancy>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .pregnancies
            .iter()
            .filter(|p| p.status == status)
            .cloned()
            .collect())
    }

    async fn prenatal_visits_for_pregnancy(
        &self,
        pregnancy_id: &str,
    ) -> anyhow::Result<Vec<PrenatalVisit>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .visits
            .iter()
            .filter(|v| v.pregnancy_id == pregnancy_id)
            .cloned()
            .collect())
    }

    async fn consultation_by_id(&self, id: &str) -> anyhow::Result<Option<Consultation>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .consultations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn family_planning_records(&self) -> anyhow::Result<Vec<FamilyPlanningRecord>> {
        Ok(self.records.lock().unwrap().planning.clone())
    }

    async fn case_record_by_id(&self, id: &str) -> anyhow::Result<Option<CaseRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .case_records
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn patient_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PatientIdentity>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .patients
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn person_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PersonIdentity>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .persons
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn staff_users(&self) -> anyhow::Result<Vec<StaffUser>> {
        Ok(self.records.lock().unwrap().staff.clone())
    }

    async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn count_consultations_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        let records = self.records.lock().unwrap();
        let timestamps: Vec<String> =
            records.consultations.iter().map(|c| c.created_at.clone()).collect();
        Ok(count_since(&timestamps, since))
    }

    async fn count_patients_registered_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(count_since(
            &self.records.lock().unwrap().patient_registrations,
            since,
        ))
    }

    async fn count_births_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        Ok(count_since(&self.records.lock().unwrap().birth_records, since))
    }
}

// ---------------------------------------------------------------------------
// RecordingChannel
// ---------------------------------------------------------------------------

/// A delivery channel that records every attempt instead of sending.
pub struct RecordingChannel {
    name: &'static str,
    available: bool,
    fail_with: Option<String>,
    /// Reference ids of reminder attempts and staff ids of summary sends.
    pub attempts: Mutex<Vec<String>>,
    pub last_daily_summary: Mutex<Option<DailySummary>>,
    pub last_weekly_summary: Mutex<Option<WeeklySummary>>,
}

impl RecordingChannel {
    pub fn available(name: &'static str) -> Self {
        Self {
            name,
            available: true,
            fail_with: None,
            attempts: Mutex::new(Vec::new()),
            last_daily_summary: Mutex::new(None),
            last_weekly_summary: Mutex::new(None),
        }
    }

    pub fn unavailable(name: &'static str) -> Self {
        Self {
            name,
            available: false,
            fail_with: None,
            attempts: Mutex::new(Vec::new()),
            last_daily_summary: Mutex::new(None),
            last_weekly_summary: Mutex::new(None),
        }
    }

    /// Available, but every attempt comes back as a provider failure.
    pub fn failing(name: &'static str, error: &str) -> Self {
        Self {
            name,
            available: true,
            fail_with: Some(error.to_string()),
            attempts: Mutex::new(Vec::new()),
            last_daily_summary: Mutex::new(None),
            last_weekly_summary: Mutex::new(None),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    fn outcome(&self) -> DeliveryResult {
        match &self.fail_with {
            Some(error) => DeliveryResult::failed(error.clone()),
            None => DeliveryResult::ok(),
        }
    }
}

#[async_trait]
impl ReminderChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn send_appointment_reminder(&self, candidate: &ReminderCandidate) -> DeliveryResult {
        self.attempts
            .lock()
            .unwrap()
            .push(candidate.reference_id.clone());
        self.outcome()
    }

    async fn send_daily_summary(
        &self,
        summary: &DailySummary,
        staff: &StaffUser,
    ) -> DeliveryResult {
        *self.last_daily_summary.lock().unwrap() = Some(*summary);
        self.attempts
            .lock()
            .unwrap()
            .push(format!("daily:{}", staff.id));
        self.outcome()
    }

    async fn send_weekly_summary(
        &self,
        summary: &WeeklySummary,
        staff: &StaffUser,
    ) -> DeliveryResult {
        *self.last_weekly_summary.lock().unwrap() = Some(*summary);
        self.attempts
            .lock()
            .unwrap()
            .push(format!("weekly:{}", staff.id));
        self.outcome()
    }
}
