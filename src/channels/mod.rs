mod email;
mod inapp;
mod sms;

pub use email::EmailChannel;
pub use inapp::InAppChannel;
pub use sms::SmsChannel;

use async_trait::async_trait;

use crate::store::StaffUser;
use crate::types::{DailySummary, DeliveryResult, ReminderCandidate, WeeklySummary};

/// A reminder delivery channel (in-app, SMS, email).
///
/// Channels are independent: each decides its own availability from its
/// configuration and reports provider problems through [`DeliveryResult`],
/// never as errors. The dispatcher attempts each available channel and
/// carries on whatever the outcome.
#[async_trait]
pub trait ReminderChannel: Send + Sync {
    /// Short channel name used in logs ("inapp", "sms", "email").
    fn name(&self) -> &'static str;

    /// Whether the channel's provider credentials were configured at
    /// process start. Unavailable channels are never attempted.
    fn is_available(&self) -> bool;

    /// Deliver an appointment reminder for one candidate.
    async fn send_appointment_reminder(&self, candidate: &ReminderCandidate) -> DeliveryResult;

    /// Deliver the evening day-level summary to one staff member.
    /// Only the SMS channel supports this.
    async fn send_daily_summary(
        &self,
        _summary: &DailySummary,
        _staff: &StaffUser,
    ) -> DeliveryResult {
        DeliveryResult::skipped(format!("{} channel does not carry daily summaries", self.name()))
    }

    /// Deliver the trailing-week summary to one staff member.
    /// Only the email channel supports this.
    async fn send_weekly_summary(
        &self,
        _summary: &WeeklySummary,
        _staff: &StaffUser,
    ) -> DeliveryResult {
        DeliveryResult::skipped(format!("{} channel does not carry weekly summaries", self.name()))
    }
}

/// French day-offset wording shared by the SMS and in-app copy.
pub(crate) fn offset_phrase(day_offset: i64) -> String {
    match day_offset {
        0 => "aujourd'hui".to_string(),
        1 => "demain".to_string(),
        n if n > 1 => format!("dans {} jours", n),
        -1 => "en retard de 1 jour".to_string(),
        n => format!("en retard de {} jours", -n),
    }
}
