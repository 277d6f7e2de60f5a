use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::{offset_phrase, ReminderChannel};
use crate::store::RecordStore;
use crate::types::{priority, AppointmentKind, DeliveryResult, Notification, ReminderCandidate};

/// In-app channel: writes a notification document the dashboard displays to
/// the staff member who owns the record. Always available; there is no
/// external provider to be missing.
pub struct InAppChannel {
    store: Arc<dyn RecordStore>,
}

impl InAppChannel {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

/// Title, message and priority for a candidate, or `None` when the offset is
/// outside the reminder windows (the dispatcher's policy already excludes
/// those; this is the channel's own guard).
fn compose(candidate: &ReminderCandidate) -> Option<(String, String, &'static str)> {
    let what = match candidate.kind {
        AppointmentKind::Prenatal => format!("consultation prénatale ({})", candidate.label),
        AppointmentKind::Planning => format!("visite de planification familiale ({})", candidate.label),
    };
    let name = candidate.patient.full_name();

    let (title, message, prio) = match candidate.day_offset {
        0 => (
            "Rendez-vous aujourd'hui",
            format!("La {} de {} est aujourd'hui.", what, name),
            priority::HIGH,
        ),
        1 => (
            "Rendez-vous demain",
            format!("La {} de {} est demain.", what, name),
            priority::HIGH,
        ),
        3 => (
            "Rendez-vous dans 3 jours",
            format!("La {} de {} est dans 3 jours.", what, name),
            priority::MEDIUM,
        ),
        n if n < 0 => (
            "Rendez-vous en retard",
            format!("La {} de {} est {}.", what, name, offset_phrase(n)),
            priority::URGENT,
        ),
        _ => return None,
    };

    Some((title.to_string(), message, prio))
}

#[async_trait]
impl ReminderChannel for InAppChannel {
    fn name(&self) -> &'static str {
        "inapp"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn send_appointment_reminder(&self, candidate: &ReminderCandidate) -> DeliveryResult {
        let Some((title, message, prio)) = compose(candidate) else {
            return DeliveryResult::skipped(format!(
                "day offset {} is outside the notification windows",
                candidate.day_offset
            ));
        };

        let notification = Notification::appointment_reminder(candidate, &title, &message, prio);
        match self.store.insert_notification(&notification).await {
            Ok(()) => {
                debug!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    priority = %notification.priority,
                    "Created in-app notification"
                );
                DeliveryResult::ok_with_id(notification.id)
            }
            Err(e) => {
                error!(reference_id = %candidate.reference_id, "Notification insert failed: {}", e);
                DeliveryResult::failed(format!("notification insert failed: {}", e))
            }
        }
    }
}
