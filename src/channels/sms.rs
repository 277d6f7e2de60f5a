use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info, warn};

use super::{offset_phrase, ReminderChannel};
use crate::config::SmsConfig;
use crate::phone;
use crate::store::StaffUser;
use crate::types::{AppointmentKind, DailySummary, DeliveryResult, ReminderCandidate};

const PROVIDER_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// SMS channel over a Twilio-style REST provider.
///
/// Available only when account id, auth token and sender number were all
/// configured at process start. Numbers that fail normalization produce a
/// skipped result, never an error. With `mock = true` the message is logged
/// instead of sent, which is how staging runs against production records.
pub struct SmsChannel {
    http: Client,
    config: SmsConfig,
    clinic_name: String,
}

impl SmsChannel {
    pub fn new(config: SmsConfig, clinic_name: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            clinic_name: clinic_name.to_string(),
        }
    }

    fn has_credentials(&self) -> bool {
        !self.config.account_id.is_empty()
            && !self.config.auth_token.is_empty()
            && !self.config.from_number.is_empty()
    }

    /// Normalize, guard and deliver one SMS. Shared by reminders and
    /// summaries.
    async fn send_to(&self, raw_phone: &str, body: &str) -> DeliveryResult {
        let Some(to) = phone::normalize_e164(raw_phone) else {
            warn!(phone = %raw_phone, "Unusable phone number, skipping SMS");
            return DeliveryResult::skipped(format!("unusable phone number: {}", raw_phone));
        };

        // Never message our own outbound number.
        if phone::normalize_e164(&self.config.from_number).as_deref() == Some(to.as_str()) {
            return DeliveryResult::skipped("recipient is the service's own number");
        }

        if self.config.mock {
            info!(to = %to, body = %body, "Mock SMS (not sent)");
            return DeliveryResult::mock();
        }

        let url = format!(
            "{}/Accounts/{}/Messages.json",
            PROVIDER_BASE_URL, self.config.account_id
        );
        let params = [
            ("To", to.as_str()),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = match self
            .http
            .post(&url)
            .basic_auth(&self.config.account_id, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(to = %to, "SMS provider unreachable: {}", e);
                return DeliveryResult::failed(format!("sms provider unreachable: {}", e));
            }
        };

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!(to = %to, status = %status, "SMS provider rejected message");
            return DeliveryResult::failed(format!(
                "sms provider returned {}: {}",
                status,
                truncate_body(&body_text)
            ));
        }

        let sid = serde_json::from_str::<serde_json::Value>(&body_text)
            .ok()
            .and_then(|v| v["sid"].as_str().map(String::from));
        match sid {
            Some(sid) => DeliveryResult::ok_with_id(sid),
            None => DeliveryResult::ok(),
        }
    }
}

/// Reminder copy, bucketed by day offset. SMS length matters; keep it to one
/// sentence plus the clinic signature.
fn reminder_body(candidate: &ReminderCandidate, clinic_name: &str) -> String {
    let what = match candidate.kind {
        AppointmentKind::Prenatal => format!("consultation prénatale ({})", candidate.label),
        AppointmentKind::Planning => "visite de planification familiale".to_string(),
    };

    if candidate.day_offset < 0 {
        format!(
            "Bonjour {}, votre {} est {}. Merci de passer au centre dès que possible. - {}",
            candidate.patient.first_name,
            what,
            offset_phrase(candidate.day_offset),
            clinic_name
        )
    } else {
        format!(
            "Bonjour {}, rappel: votre {} est {}. - {}",
            candidate.patient.first_name,
            what,
            offset_phrase(candidate.day_offset),
            clinic_name
        )
    }
}

fn daily_summary_body(summary: &DailySummary, clinic_name: &str) -> String {
    format!(
        "{}: {} rendez-vous CPN aujourd'hui, {} en retard, {} dans les 7 prochains jours.",
        clinic_name, summary.today, summary.late, summary.upcoming_week
    )
}

fn truncate_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(300) {
        Some((i, _)) => format!("{}...", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl ReminderChannel for SmsChannel {
    fn name(&self) -> &'static str {
        "sms"
    }

    fn is_available(&self) -> bool {
        self.config.mock || self.has_credentials()
    }

    async fn send_appointment_reminder(&self, candidate: &ReminderCandidate) -> DeliveryResult {
        if !self.is_available() {
            return DeliveryResult::skipped("sms provider not configured");
        }
        let Some(raw_phone) = candidate.patient.phone.as_deref().filter(|p| !p.trim().is_empty())
        else {
            return DeliveryResult::skipped("patient has no phone number");
        };

        let body = reminder_body(candidate, &self.clinic_name);
        self.send_to(raw_phone, &body).await
    }

    async fn send_daily_summary(
        &self,
        summary: &DailySummary,
        staff: &StaffUser,
    ) -> DeliveryResult {
        if !self.is_available() {
            return DeliveryResult::skipped("sms provider not configured");
        }
        let Some(raw_phone) = staff.phone.as_deref().filter(|p| !p.trim().is_empty()) else {
            return DeliveryResult::skipped("staff user has no phone number");
        };

        let body = daily_summary_body(summary, &self.clinic_name);
        self.send_to(raw_phone, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    use crate::types::PatientView;

    fn config(mock: bool) -> SmsConfig {
        SmsConfig {
            account_id: "AC123".to_string(),
            auth_token: "token".to_string(),
            from_number: "+22940000000".to_string(),
            mock,
        }
    }

    fn candidate(day_offset: i64, phone: Option<&str>) -> ReminderCandidate {
        ReminderCandidate {
            kind: AppointmentKind::Prenatal,
            reference_id: "c1".to_string(),
            label: "CPN 3".to_string(),
            appointment_at: Utc::now(),
            day_offset,
            patient: PatientView {
                id: "p1".to_string(),
                first_name: "Afi".to_string(),
                last_name: "Dossou".to_string(),
                phone: phone.map(String::from),
                email: None,
            },
            owner_user_id: "staff1".to_string(),
            metadata: json!({}),
        }
    }

    #[test]
    fn test_availability_requires_all_credentials() {
        let channel = SmsChannel::new(config(false), "Centre Abomey");
        assert!(channel.is_available());

        let mut missing = config(false);
        missing.auth_token.clear();
        let channel = SmsChannel::new(missing, "Centre Abomey");
        assert!(!channel.is_available());

        // Mock mode works without a real provider.
        let mut mock_only = config(true);
        mock_only.account_id.clear();
        let channel = SmsChannel::new(mock_only, "Centre Abomey");
        assert!(channel.is_available());
    }

    #[test]
    fn test_reminder_body_buckets() {
        let today = reminder_body(&candidate(0, None), "Centre Abomey");
        assert!(today.contains("aujourd'hui"));
        assert!(today.contains("CPN 3"));
        assert!(today.ends_with("- Centre Abomey"));

        let tomorrow = reminder_body(&candidate(1, None), "Centre Abomey");
        assert!(tomorrow.contains("demain"));

        let ahead = reminder_body(&candidate(3, None), "Centre Abomey");
        assert!(ahead.contains("dans 3 jours"));

        let overdue = reminder_body(&candidate(-2, None), "Centre Abomey");
        assert!(overdue.contains("en retard de 2 jours"));
        assert!(overdue.contains("dès que possible"));
    }

    #[tokio::test]
    async fn test_invalid_phone_is_skipped_not_failed() {
        let channel = SmsChannel::new(config(true), "Centre Abomey");
        let result = channel
            .send_appointment_reminder(&candidate(0, Some("123")))
            .await;
        assert!(result.skipped);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_missing_phone_is_skipped() {
        let channel = SmsChannel::new(config(true), "Centre Abomey");
        let result = channel.send_appointment_reminder(&candidate(0, None)).await;
        assert!(result.skipped);
    }

    #[tokio::test]
    async fn test_never_sends_to_own_number() {
        let channel = SmsChannel::new(config(true), "Centre Abomey");
        let result = channel
            .send_appointment_reminder(&candidate(0, Some("+22940000000")))
            .await;
        assert!(result.skipped);
        assert!(!result.mock);
    }

    #[tokio::test]
    async fn test_mock_mode_sends_nothing() {
        let channel = SmsChannel::new(config(true), "Centre Abomey");
        let result = channel
            .send_appointment_reminder(&candidate(0, Some("60807271")))
            .await;
        assert!(result.success);
        assert!(result.mock);
    }

    #[test]
    fn test_daily_summary_body() {
        let body = daily_summary_body(
            &DailySummary {
                today: 2,
                late: 1,
                upcoming_week: 5,
            },
            "Centre Abomey",
        );
        assert!(body.contains("2 rendez-vous CPN aujourd'hui"));
        assert!(body.contains("1 en retard"));
        assert!(body.contains("5 dans les 7 prochains jours"));
    }
}
