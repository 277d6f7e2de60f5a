//! Applies the day-offset policy and fans selected candidates out to the
//! delivery channels.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::ReminderChannel;
use crate::collector::ReminderCollector;
use crate::types::{AppointmentKind, DeliveryResult, ReminderCandidate, ReminderPassReport};

/// Whether a candidate's day offset falls in a reminder window.
///
/// Prenatal: 3 days ahead, 1 day ahead, same day, or any amount overdue.
/// Planning: 3/1/0 only; overdue planning records never reach the
/// dispatcher, the collector already drops them.
pub fn should_remind(kind: AppointmentKind, day_offset: i64) -> bool {
    match kind {
        AppointmentKind::Prenatal => matches!(day_offset, 0 | 1 | 3) || day_offset < 0,
        AppointmentKind::Planning => matches!(day_offset, 0 | 1 | 3),
    }
}

pub struct ReminderDispatcher {
    collector: ReminderCollector,
    in_app: Arc<dyn ReminderChannel>,
    sms: Arc<dyn ReminderChannel>,
    email: Arc<dyn ReminderChannel>,
}

impl ReminderDispatcher {
    pub fn new(
        collector: ReminderCollector,
        in_app: Arc<dyn ReminderChannel>,
        sms: Arc<dyn ReminderChannel>,
        email: Arc<dyn ReminderChannel>,
    ) -> Self {
        Self {
            collector,
            in_app,
            sms,
            email,
        }
    }

    /// Collect, filter by the offset policy, and dispatch. One candidate
    /// counts as sent once its in-app attempt was made; SMS and email are
    /// conditional extras. Per-candidate problems never abort the pass.
    pub async fn run_reminder_pass(&self) -> anyhow::Result<ReminderPassReport> {
        let mut candidates = self.collector.collect_prenatal_candidates().await?;
        candidates.extend(self.collector.collect_family_planning_candidates().await?);

        let mut report = ReminderPassReport {
            collected: candidates.len(),
            sent: 0,
        };

        for candidate in &candidates {
            if !should_remind(candidate.kind, candidate.day_offset) {
                debug!(
                    kind = candidate.kind.as_str(),
                    reference_id = %candidate.reference_id,
                    day_offset = candidate.day_offset,
                    "Outside reminder windows"
                );
                continue;
            }

            self.dispatch_candidate(candidate).await;
            report.sent += 1;
        }

        info!(
            collected = report.collected,
            sent = report.sent,
            "Reminder pass finished"
        );
        Ok(report)
    }

    /// In-app always; SMS and email only when the channel is available and
    /// the patient has the matching contact field. Channel outcomes are
    /// independent of each other.
    async fn dispatch_candidate(&self, candidate: &ReminderCandidate) {
        let in_app = self.in_app.send_appointment_reminder(candidate).await;
        log_outcome(self.in_app.name(), candidate, &in_app);

        if self.sms.is_available() && candidate.patient.has_phone() {
            let sms = self.sms.send_appointment_reminder(candidate).await;
            log_outcome(self.sms.name(), candidate, &sms);
        } else {
            debug!(reference_id = %candidate.reference_id, "SMS not attempted");
        }

        if self.email.is_available() && candidate.patient.has_email() {
            let email = self.email.send_appointment_reminder(candidate).await;
            log_outcome(self.email.name(), candidate, &email);
        } else {
            debug!(reference_id = %candidate.reference_id, "Email not attempted");
        }
    }
}

fn log_outcome(channel: &str, candidate: &ReminderCandidate, result: &DeliveryResult) {
    if result.success {
        debug!(
            channel = channel,
            reference_id = %candidate.reference_id,
            mock = result.mock,
            "Reminder delivered"
        );
    } else if result.skipped {
        debug!(
            channel = channel,
            reference_id = %candidate.reference_id,
            reason = result.error.as_deref().unwrap_or(""),
            "Reminder skipped"
        );
    } else {
        warn!(
            channel = channel,
            reference_id = %candidate.reference_id,
            error = result.error.as_deref().unwrap_or("unknown"),
            "Reminder delivery failed"
        );
    }
}
