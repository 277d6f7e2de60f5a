//! Staff summary jobs: the evening day-level SMS and the weekly activity
//! email. Both aggregate from a fresh collection pass plus trailing-window
//! counts; recipients come from a full staff scan filtered in-memory by the
//! contact field the channel needs.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::channels::ReminderChannel;
use crate::collector::ReminderCollector;
use crate::store::RecordStore;
use crate::types::{DailySummary, SummaryReport, WeeklySummary};

/// Day offsets counted as "upcoming" in summaries: today through one week
/// out.
const UPCOMING_WINDOW_DAYS: i64 = 7;

pub struct SummaryService {
    store: Arc<dyn RecordStore>,
    collector: ReminderCollector,
    sms: Arc<dyn ReminderChannel>,
    email: Arc<dyn ReminderChannel>,
}

impl SummaryService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        collector: ReminderCollector,
        sms: Arc<dyn ReminderChannel>,
        email: Arc<dyn ReminderChannel>,
    ) -> Self {
        Self {
            store,
            collector,
            sms,
            email,
        }
    }

    /// Compute today's CPN counts and push them by SMS to every staff user
    /// with a phone number on file.
    pub async fn run_daily_summary(&self) -> anyhow::Result<SummaryReport> {
        let candidates = self.collector.collect_prenatal_candidates().await?;

        let summary = DailySummary {
            today: candidates.iter().filter(|c| c.day_offset == 0).count(),
            late: candidates.iter().filter(|c| c.day_offset < 0).count(),
            upcoming_week: candidates
                .iter()
                .filter(|c| (1..=UPCOMING_WINDOW_DAYS).contains(&c.day_offset))
                .count(),
        };

        let staff = self.store.staff_users().await?;
        let mut report = SummaryReport::default();
        for member in staff
            .iter()
            .filter(|s| s.phone.as_deref().is_some_and(|p| !p.trim().is_empty()))
        {
            report.recipients += 1;
            let result = self.sms.send_daily_summary(&summary, member).await;
            if result.success {
                report.delivered += 1;
            } else if !result.skipped {
                warn!(
                    staff_id = %member.id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Daily summary SMS failed"
                );
            }
        }

        info!(
            today = summary.today,
            late = summary.late,
            upcoming_week = summary.upcoming_week,
            recipients = report.recipients,
            delivered = report.delivered,
            "Daily summary finished"
        );
        Ok(report)
    }

    /// Aggregate trailing-week activity plus current upcoming/late counts
    /// and mail them to every staff user with an email on file.
    pub async fn run_weekly_summary(&self) -> anyhow::Result<SummaryReport> {
        let since = Utc::now() - Duration::days(7);

        let candidates = self.collector.collect_prenatal_candidates().await?;
        let summary = WeeklySummary {
            consultations_done: self.store.count_consultations_since(since).await?,
            new_patients: self.store.count_patients_registered_since(since).await?,
            births: self.store.count_births_since(since).await?,
            upcoming: candidates
                .iter()
                .filter(|c| (0..=UPCOMING_WINDOW_DAYS).contains(&c.day_offset))
                .count(),
            late: candidates.iter().filter(|c| c.day_offset < 0).count(),
        };

        let staff = self.store.staff_users().await?;
        let mut report = SummaryReport::default();
        for member in staff
            .iter()
            .filter(|s| s.email.as_deref().is_some_and(|e| !e.trim().is_empty()))
        {
            report.recipients += 1;
            let result = self.email.send_weekly_summary(&summary, member).await;
            if result.success {
                report.delivered += 1;
            } else if !result.skipped {
                warn!(
                    staff_id = %member.id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Weekly summary email failed"
                );
            }
        }

        info!(
            consultations = summary.consultations_done,
            new_patients = summary.new_patients,
            births = summary.births,
            recipients = report.recipients,
            delivered = report.delivered,
            "Weekly summary finished"
        );
        Ok(report)
    }
}
