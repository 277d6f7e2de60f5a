use async_trait::async_trait;
use chrono_tz::Tz;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, warn};

use super::{offset_phrase, ReminderChannel};
use crate::config::EmailConfig;
use crate::store::StaffUser;
use crate::types::{AppointmentKind, DeliveryResult, ReminderCandidate, WeeklySummary};

/// Email channel over SMTP.
///
/// Available only when host, username and password were configured at
/// process start. Provider failures are folded into the delivery result at
/// this boundary; the dispatcher never sees an SMTP error.
pub struct EmailChannel {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    config: EmailConfig,
    clinic_name: String,
    tz: Tz,
}

impl EmailChannel {
    pub fn new(config: EmailConfig, clinic_name: &str, tz: Tz) -> Self {
        let transport = if config.has_credentials() {
            match AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host) {
                Ok(builder) => Some(
                    builder
                        .port(config.port)
                        .credentials(Credentials::new(
                            config.username.clone(),
                            config.password.clone(),
                        ))
                        .build(),
                ),
                Err(e) => {
                    warn!(host = %config.host, "SMTP relay setup failed, email channel disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            transport,
            config,
            clinic_name: clinic_name.to_string(),
            tz,
        }
    }

    fn from_mailbox(&self) -> Result<Mailbox, String> {
        let from = if self.config.from_address.is_empty() {
            &self.config.username
        } else {
            &self.config.from_address
        };
        format!("{} <{}>", self.clinic_name, from)
            .parse()
            .map_err(|e| format!("bad from address '{}': {}", from, e))
    }

    async fn deliver(&self, to: &str, subject: &str, text: String, html: String) -> DeliveryResult {
        if self.config.mock {
            info!(to = %to, subject = %subject, "Mock email (not sent)");
            return DeliveryResult::mock();
        }

        let Some(transport) = &self.transport else {
            return DeliveryResult::skipped("email provider not configured");
        };

        let from = match self.from_mailbox() {
            Ok(mailbox) => mailbox,
            Err(e) => return DeliveryResult::failed(e),
        };
        let to_mailbox: Mailbox = match to.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!(to = %to, "Unusable email address, skipping: {}", e);
                return DeliveryResult::skipped(format!("unusable email address: {}", to));
            }
        };

        let message = match Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
        {
            Ok(message) => message,
            Err(e) => return DeliveryResult::failed(format!("email build failed: {}", e)),
        };

        match transport.send(message).await {
            Ok(response) => DeliveryResult::ok_with_id(response.code().to_string()),
            Err(e) => {
                error!(to = %to, "SMTP send failed: {}", e);
                DeliveryResult::failed(format!("smtp send failed: {}", e))
            }
        }
    }

    fn reminder_subject(&self, candidate: &ReminderCandidate) -> String {
        match candidate.kind {
            AppointmentKind::Prenatal => {
                format!("Rappel de rendez-vous — {}", candidate.label)
            }
            AppointmentKind::Planning => "Rappel de visite de planification familiale".to_string(),
        }
    }

    fn reminder_bodies(&self, candidate: &ReminderCandidate) -> (String, String) {
        let what = match candidate.kind {
            AppointmentKind::Prenatal => {
                format!("consultation prénatale ({})", candidate.label)
            }
            AppointmentKind::Planning => "visite de planification familiale".to_string(),
        };
        let when = candidate
            .appointment_at
            .with_timezone(&self.tz)
            .format("%d/%m/%Y à %H:%M");
        let phrase = offset_phrase(candidate.day_offset);

        let text = format!(
            "Bonjour {},\n\nVotre {} est {} (le {}).\n\nMerci de vous présenter au centre.\n\n{}",
            candidate.patient.first_name, what, phrase, when, self.clinic_name
        );
        let html = format!(
            "<p>Bonjour {},</p><p>Votre {} est <strong>{}</strong> (le {}).</p>\
             <p>Merci de vous présenter au centre.</p><p>{}</p>",
            candidate.patient.first_name, what, phrase, when, self.clinic_name
        );
        (text, html)
    }
}

fn weekly_bodies(summary: &WeeklySummary, clinic_name: &str) -> (String, String) {
    let text = format!(
        "Résumé hebdomadaire — {}\n\n\
         Consultations réalisées (7 derniers jours): {}\n\
         Nouvelles patientes: {}\n\
         Accouchements enregistrés: {}\n\
         Rendez-vous à venir (7 prochains jours): {}\n\
         Rendez-vous en retard: {}\n",
        clinic_name,
        summary.consultations_done,
        summary.new_patients,
        summary.births,
        summary.upcoming,
        summary.late
    );
    let html = format!(
        "<h3>Résumé hebdomadaire — {}</h3><ul>\
         <li>Consultations réalisées (7 derniers jours): <strong>{}</strong></li>\
         <li>Nouvelles patientes: <strong>{}</strong></li>\
         <li>Accouchements enregistrés: <strong>{}</strong></li>\
         <li>Rendez-vous à venir (7 prochains jours): <strong>{}</strong></li>\
         <li>Rendez-vous en retard: <strong>{}</strong></li></ul>",
        clinic_name,
        summary.consultations_done,
        summary.new_patients,
        summary.births,
        summary.upcoming,
        summary.late
    );
    (text, html)
}

#[async_trait]
impl ReminderChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn is_available(&self) -> bool {
        self.config.mock || self.transport.is_some()
    }

    async fn send_appointment_reminder(&self, candidate: &ReminderCandidate) -> DeliveryResult {
        if !self.is_available() {
            return DeliveryResult::skipped("email provider not configured");
        }
        let Some(to) = candidate.patient.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return DeliveryResult::skipped("patient has no email address");
        };

        let subject = self.reminder_subject(candidate);
        let (text, html) = self.reminder_bodies(candidate);
        self.deliver(to, &subject, text, html).await
    }

    async fn send_weekly_summary(
        &self,
        summary: &WeeklySummary,
        staff: &StaffUser,
    ) -> DeliveryResult {
        if !self.is_available() {
            return DeliveryResult::skipped("email provider not configured");
        }
        let Some(to) = staff.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            return DeliveryResult::skipped("staff user has no email address");
        };

        let subject = format!("Résumé hebdomadaire — {}", self.clinic_name);
        let (text, html) = weekly_bodies(summary, &self.clinic_name);
        self.deliver(to, &subject, text, html).await
    }
}
