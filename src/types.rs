use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The two appointment kinds the reminder engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    /// Prenatal consultation (CPN), attached to an active pregnancy.
    Prenatal,
    /// Family-planning follow-up visit.
    Planning,
}

impl AppointmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Prenatal => "prenatal",
            AppointmentKind::Planning => "planning",
        }
    }
}

/// Resolved patient contact info for one candidate, built by walking the
/// Pregnancy → CaseRecord → PatientIdentity → PersonIdentity chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl PatientView {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// One appointment eligible for reminding. Built fresh on every collection
/// pass, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderCandidate {
    pub kind: AppointmentKind,
    /// Id of the record the appointment lives on (consultation or
    /// family-planning record).
    pub reference_id: String,
    /// Human label for message copy: the CPN visit number, or the
    /// family-planning method.
    pub label: String,
    pub appointment_at: DateTime<Utc>,
    /// Whole calendar days between today and the appointment, in the clinic
    /// timezone. Negative means overdue.
    pub day_offset: i64,
    pub patient: PatientView,
    /// Staff user who created the underlying record; receives the in-app
    /// notification.
    pub owner_user_id: String,
    pub metadata: Value,
}

/// Priority values carried on in-app notifications. Stored as plain strings
/// in the notifications collection; the dashboard sorts on them.
pub mod priority {
    pub const MEDIUM: &str = "medium";
    pub const HIGH: &str = "high";
    pub const URGENT: &str = "urgent";
}

/// An in-app notification document. Written once by the in-app channel;
/// the dashboard marks it read later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub user_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub appointment_at: DateTime<Utc>,
    pub day_offset: i64,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Build an unread appointment-reminder notification for a candidate.
    pub fn appointment_reminder(
        candidate: &ReminderCandidate,
        title: &str,
        message: &str,
        priority: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: "appointment_reminder".to_string(),
            title: title.to_string(),
            message: message.to_string(),
            priority: priority.to_string(),
            user_id: candidate.owner_user_id.clone(),
            patient_id: candidate.patient.id.clone(),
            patient_name: candidate.patient.full_name(),
            appointment_at: candidate.appointment_at,
            day_offset: candidate.day_offset,
            read: false,
            created_at: Utc::now(),
            read_at: None,
        }
    }
}

/// Uniform outcome of one delivery attempt on one channel.
///
/// Channels never propagate provider failures as errors; they are folded
/// into `success: false` here so a bad SMS can never sink a whole pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
    /// The channel declined to attempt delivery (missing phone, invalid
    /// number, unsupported operation). Not a failure.
    pub skipped: bool,
    /// Delivery was simulated (mock mode); nothing left the process.
    pub mock: bool,
    pub provider_message_id: Option<String>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn ok_with_id(provider_message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_message_id: Some(provider_message_id.into()),
            ..Default::default()
        }
    }

    pub fn mock() -> Self {
        Self {
            success: true,
            mock: true,
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Outcome of one reminder pass.
#[derive(Debug, Clone, Default)]
pub struct ReminderPassReport {
    /// Candidates produced by collection, before the offset policy.
    pub collected: usize,
    /// Candidates selected by the offset policy and dispatched. A candidate
    /// counts as sent once the in-app attempt was made, whatever the other
    /// channels did.
    pub sent: usize,
}

/// Day-level counts pushed to staff phones every evening.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailySummary {
    pub today: usize,
    pub late: usize,
    pub upcoming_week: usize,
}

/// Trailing-week activity counts mailed to staff.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeeklySummary {
    pub consultations_done: u64,
    pub new_patients: u64,
    pub births: u64,
    pub upcoming: usize,
    pub late: usize,
}

/// Outcome of one staff summary fan-out.
#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    /// Staff users with the required contact field on file.
    pub recipients: usize,
    pub delivered: usize,
}
