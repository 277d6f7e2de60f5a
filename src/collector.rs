//! Builds the set of reminder candidates from the record store.
//!
//! Both collection operations are pure reads. They tolerate partial data:
//! a single record failing to resolve is logged and skipped, never fatal to
//! the pass. Only a failure of the top-level store query surfaces as an
//! error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, warn};

use crate::dates::{coerce_to_instant, day_offset};
use crate::store::{Consultation, Pregnancy, PrenatalVisit, RecordStore, PREGNANCY_ACTIVE};
use crate::types::{AppointmentKind, PatientView, ReminderCandidate};

#[derive(Clone)]
pub struct ReminderCollector {
    store: Arc<dyn RecordStore>,
    tz: Tz,
}

impl ReminderCollector {
    pub fn new(store: Arc<dyn RecordStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    /// One candidate per active pregnancy, at most: the visit whose linked
    /// consultation was created most recently among those carrying an
    /// appointment timestamp. Overdue appointments are kept: a missed CPN
    /// still needs chasing.
    pub async fn collect_prenatal_candidates(&self) -> anyhow::Result<Vec<ReminderCandidate>> {
        let pregnancies = self.store.pregnancies_by_status(PREGNANCY_ACTIVE).await?;
        let now = Utc::now();

        let mut candidates = Vec::new();
        for pregnancy in pregnancies {
            match self.prenatal_candidate_for(&pregnancy, now).await {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(e) => {
                    warn!(pregnancy_id = %pregnancy.id, "Skipping pregnancy: {:#}", e);
                }
            }
        }

        debug!(count = candidates.len(), "Collected prenatal candidates");
        Ok(candidates)
    }

    async fn prenatal_candidate_for(
        &self,
        pregnancy: &Pregnancy,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<ReminderCandidate>> {
        let visits = self
            .store
            .prenatal_visits_for_pregnancy(&pregnancy.id)
            .await?;

        // Visits whose consultation exists and carries an appointment.
        let mut eligible: Vec<(PrenatalVisit, Consultation, DateTime<Utc>)> = Vec::new();
        for visit in visits {
            let Some(consultation_id) = visit.consultation_id.as_deref() else {
                continue;
            };
            let Some(consultation) = self.store.consultation_by_id(consultation_id).await? else {
                warn!(
                    visit_id = %visit.id,
                    consultation_id = %consultation_id,
                    "Visit points at a missing consultation"
                );
                continue;
            };
            let Some(rdv) = consultation
                .rdv
                .as_deref()
                .and_then(|raw| coerce_to_instant(raw, self.tz))
            else {
                continue;
            };
            eligible.push((visit, consultation, rdv));
        }

        // Most recently created consultation wins; identical creation
        // timestamps fall back to the greater id so the pick stays
        // deterministic.
        let Some((visit, consultation, rdv)) = eligible.into_iter().max_by_key(|(_, c, _)| {
            let created = coerce_to_instant(&c.created_at, self.tz)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            (created, c.id.clone())
        }) else {
            return Ok(None);
        };

        let patient = self.resolve_patient_identity(&pregnancy.case_record_id).await?;
        let owner_user_id = consultation
            .created_by
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow::anyhow!("consultation {} has no creator", consultation.id))?;

        Ok(Some(ReminderCandidate {
            kind: AppointmentKind::Prenatal,
            reference_id: consultation.id.clone(),
            label: visit.label.clone(),
            appointment_at: rdv,
            day_offset: day_offset(rdv, now, self.tz),
            patient,
            owner_user_id,
            metadata: json!({
                "pregnancy_id": pregnancy.id,
                "visit_id": visit.id,
            }),
        }))
    }

    /// One candidate per family-planning record with a future-or-today next
    /// appointment. Records whose appointment date has passed are excluded
    /// entirely; there is no overdue chasing for planning visits.
    pub async fn collect_family_planning_candidates(
        &self,
    ) -> anyhow::Result<Vec<ReminderCandidate>> {
        let records = self.store.family_planning_records().await?;
        let now = Utc::now();

        let mut candidates = Vec::new();
        for record in records {
            let Some(rdv) = record
                .rdv_prochain
                .as_deref()
                .and_then(|raw| coerce_to_instant(raw, self.tz))
            else {
                continue;
            };

            let offset = day_offset(rdv, now, self.tz);
            if offset < 0 {
                continue;
            }

            let patient = match self.resolve_patient_identity(&record.case_record_id).await {
                Ok(patient) => patient,
                Err(e) => {
                    warn!(record_id = %record.id, "Skipping planning record: {:#}", e);
                    continue;
                }
            };
            let Some(owner_user_id) =
                record.created_by.clone().filter(|u| !u.is_empty())
            else {
                warn!(record_id = %record.id, "Skipping planning record with no creator");
                continue;
            };

            candidates.push(ReminderCandidate {
                kind: AppointmentKind::Planning,
                reference_id: record.id.clone(),
                label: record.method.clone(),
                appointment_at: rdv,
                day_offset: offset,
                patient,
                owner_user_id,
                metadata: json!({
                    "case_record_id": record.case_record_id,
                    "method": record.method,
                }),
            });
        }

        debug!(count = candidates.len(), "Collected family-planning candidates");
        Ok(candidates)
    }

    /// Walk CaseRecord → PatientIdentity → PersonIdentity and produce the
    /// contact view. Any missing link is an error; callers skip the
    /// candidate and move on.
    pub async fn resolve_patient_identity(
        &self,
        case_record_id: &str,
    ) -> anyhow::Result<PatientView> {
        let case_record = self
            .store
            .case_record_by_id(case_record_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("case record {} not found", case_record_id))?;

        let patient = self
            .store
            .patient_identity_by_id(&case_record.patient_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("patient identity {} not found", case_record.patient_id)
            })?;

        let person = self
            .store
            .person_identity_by_id(&patient.person_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("person identity {} not found", patient.person_id))?;

        Ok(PatientView {
            id: patient.id,
            first_name: person.first_name,
            last_name: person.last_name,
            phone: person.phone,
            email: person.email,
        })
    }
}
