use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use regex::Regex;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::dispatcher::ReminderDispatcher;
use crate::summary::SummaryService;
use crate::types::{ReminderPassReport, SummaryReport};

/// The three recurring jobs this daemon owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Reminders,
    DailySummary,
    WeeklySummary,
}

impl JobKind {
    fn name(&self) -> &'static str {
        match self {
            JobKind::Reminders => "reminders",
            JobKind::DailySummary => "daily_summary",
            JobKind::WeeklySummary => "weekly_summary",
        }
    }
}

struct JobSpec {
    kind: JobKind,
    cron: Cron,
    schedule_display: String,
    enabled: bool,
}

/// Owns the three recurring jobs and their trigger times in the clinic's
/// local timezone. Constructed once at process start and handed to whatever
/// owns the process lifecycle; holds no state beyond the live job handles
/// and the per-job pass locks.
///
/// A manual trigger and a scheduled firing of the same job are serialized
/// through a try-lock: whichever comes second is rejected (manual) or
/// skipped with a warning (scheduled), never queued.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    tz: Tz,
    jobs: Vec<JobSpec>,
    dispatcher: Arc<ReminderDispatcher>,
    summaries: Arc<SummaryService>,
    /// Some = running. Dropping the sender ends every job loop at its next
    /// sleep; a pass already underway still runs to completion.
    stop_tx: StdMutex<Option<watch::Sender<()>>>,
    reminder_lock: Mutex<()>,
    daily_lock: Mutex<()>,
    weekly_lock: Mutex<()>,
}

impl SchedulerHandle {
    pub fn new(
        config: &SchedulerConfig,
        tz: Tz,
        dispatcher: Arc<ReminderDispatcher>,
        summaries: Arc<SummaryService>,
    ) -> anyhow::Result<Self> {
        let jobs = vec![
            job_spec(JobKind::Reminders, &config.reminder_schedule, config.reminders_enabled)?,
            job_spec(
                JobKind::DailySummary,
                &config.daily_summary_schedule,
                config.daily_summary_enabled,
            )?,
            job_spec(
                JobKind::WeeklySummary,
                &config.weekly_summary_schedule,
                config.weekly_summary_enabled,
            )?,
        ];

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                tz,
                jobs,
                dispatcher,
                summaries,
                stop_tx: StdMutex::new(None),
                reminder_lock: Mutex::new(()),
                daily_lock: Mutex::new(()),
                weekly_lock: Mutex::new(()),
            }),
        })
    }

    /// Register and spawn all enabled job loops. Calling `start` on a
    /// running scheduler is a no-op with a warning.
    pub fn start(&self) {
        let mut guard = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if guard.is_some() {
            warn!("Scheduler already running, start() ignored");
            return;
        }

        let (tx, _) = watch::channel(());
        for (index, job) in self.inner.jobs.iter().enumerate() {
            if !job.enabled {
                info!(job = job.kind.name(), "Job disabled by config");
                continue;
            }
            info!(
                job = job.kind.name(),
                schedule = %job.schedule_display,
                timezone = %self.inner.tz,
                "Job registered"
            );
            tokio::spawn(job_loop(self.inner.clone(), index, tx.subscribe()));
        }

        *guard = Some(tx);
        info!("Scheduler started");
    }

    /// Cancel all registered job loops. Calling `stop` on a stopped
    /// scheduler is a no-op with a warning.
    pub fn stop(&self) {
        let mut guard = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match guard.take() {
            Some(_tx) => info!("Scheduler stopped"),
            None => warn!("Scheduler is not running, stop() ignored"),
        }
    }

    /// Run a reminder pass immediately, bypassing the schedule. Fails fast
    /// when a pass is already underway.
    pub async fn run_reminders_now(&self) -> anyhow::Result<ReminderPassReport> {
        let _guard = self
            .inner
            .reminder_lock
            .try_lock()
            .map_err(|_| anyhow::anyhow!("a reminder pass is already running"))?;
        self.inner.dispatcher.run_reminder_pass().await
    }

    /// Run the daily staff summary immediately.
    pub async fn run_daily_summary_now(&self) -> anyhow::Result<SummaryReport> {
        let _guard = self
            .inner
            .daily_lock
            .try_lock()
            .map_err(|_| anyhow::anyhow!("the daily summary is already running"))?;
        self.inner.summaries.run_daily_summary().await
    }

    /// Run the weekly staff summary immediately.
    pub async fn run_weekly_summary_now(&self) -> anyhow::Result<SummaryReport> {
        let _guard = self
            .inner
            .weekly_lock
            .try_lock()
            .map_err(|_| anyhow::anyhow!("the weekly summary is already running"))?;
        self.inner.summaries.run_weekly_summary().await
    }
}

impl SchedulerInner {
    async fn run_scheduled(&self, kind: JobKind) {
        match kind {
            JobKind::Reminders => {
                let Ok(_guard) = self.reminder_lock.try_lock() else {
                    warn!(job = kind.name(), "Pass already running, scheduled run skipped");
                    return;
                };
                if let Err(e) = self.dispatcher.run_reminder_pass().await {
                    error!(job = kind.name(), "Scheduled run failed: {:#}", e);
                }
            }
            JobKind::DailySummary => {
                let Ok(_guard) = self.daily_lock.try_lock() else {
                    warn!(job = kind.name(), "Pass already running, scheduled run skipped");
                    return;
                };
                if let Err(e) = self.summaries.run_daily_summary().await {
                    error!(job = kind.name(), "Scheduled run failed: {:#}", e);
                }
            }
            JobKind::WeeklySummary => {
                let Ok(_guard) = self.weekly_lock.try_lock() else {
                    warn!(job = kind.name(), "Pass already running, scheduled run skipped");
                    return;
                };
                if let Err(e) = self.summaries.run_weekly_summary().await {
                    error!(job = kind.name(), "Scheduled run failed: {:#}", e);
                }
            }
        }
    }
}

async fn job_loop(inner: Arc<SchedulerInner>, job_index: usize, mut stop_rx: watch::Receiver<()>) {
    let job = &inner.jobs[job_index];
    loop {
        let next = match compute_next_occurrence(&job.cron, inner.tz) {
            Ok(next) => next,
            Err(e) => {
                // The expression was validated at construction; no
                // occurrence left means a pathological schedule.
                error!(job = job.kind.name(), "No next occurrence, job loop ends: {}", e);
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                info!(job = job.kind.name(), "Job fired");
                inner.run_scheduled(job.kind).await;
            }
            _ = stop_rx.changed() => {
                info!(job = job.kind.name(), "Job loop stopped");
                return;
            }
        }
    }
}

/// Next firing of a cron expression, evaluated in the clinic timezone.
pub fn compute_next_occurrence(cron: &Cron, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    let now = Utc::now().with_timezone(&tz);
    let next = cron
        .find_next_occurrence(&now, false)
        .map_err(|e| anyhow::anyhow!("no next occurrence: {}", e))?;
    Ok(next.with_timezone(&Utc))
}

fn job_spec(kind: JobKind, schedule: &str, enabled: bool) -> anyhow::Result<JobSpec> {
    let cron_expr = parse_schedule(schedule)
        .map_err(|e| anyhow::anyhow!("bad schedule for {} job: {}", kind.name(), e))?;
    let cron: Cron = cron_expr
        .parse()
        .map_err(|e| anyhow::anyhow!("bad cron '{}' for {} job: {}", cron_expr, kind.name(), e))?;
    Ok(JobSpec {
        kind,
        cron,
        schedule_display: schedule.to_string(),
        enabled,
    })
}

/// Parse a human-friendly schedule string into a 5-field cron expression.
/// Supports "daily at ...", "weekly on <weekday> at ..." and raw cron
/// pass-through.
pub fn parse_schedule(input: &str) -> anyhow::Result<String> {
    let input = input.trim();

    let re_daily = Regex::new(r"(?i)^daily\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")?;
    if let Some(caps) = re_daily.captures(input) {
        let (hour, minute) = parse_time(
            &caps[1],
            caps.get(2).map(|m| m.as_str()),
            caps.get(3).map(|m| m.as_str()),
        )?;
        return Ok(format!("{} {} * * *", minute, hour));
    }

    let re_weekly =
        Regex::new(r"(?i)^weekly\s+on\s+([a-z]+)\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")?;
    if let Some(caps) = re_weekly.captures(input) {
        let weekday = parse_weekday(&caps[1])?;
        let (hour, minute) = parse_time(
            &caps[2],
            caps.get(3).map(|m| m.as_str()),
            caps.get(4).map(|m| m.as_str()),
        )?;
        return Ok(format!("{} {} * * {}", minute, hour, weekday));
    }

    // Raw cron pass-through: validate with croner.
    let parts: Vec<&str> = input.split_whitespace().collect();
    if parts.len() == 5 {
        input
            .parse::<Cron>()
            .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", input, e))?;
        return Ok(input.to_string());
    }

    anyhow::bail!(
        "Unrecognized schedule format '{}'. Use 'daily at 8am', 'weekly on monday at 9am' or a 5-field cron expression.",
        input
    )
}

/// Hour and minute from the captured pieces, with optional AM/PM.
fn parse_time(hour: &str, minute: Option<&str>, ampm: Option<&str>) -> anyhow::Result<(u32, u32)> {
    let mut hour: u32 = hour.parse()?;
    let minute: u32 = minute.map_or(Ok(0), |m| m.parse())?;
    if let Some(ampm) = ampm {
        let ampm = ampm.to_lowercase();
        if ampm == "pm" && hour < 12 {
            hour += 12;
        } else if ampm == "am" && hour == 12 {
            hour = 0;
        }
    }
    if hour > 23 {
        anyhow::bail!("Hour must be between 0 and 23");
    }
    if minute > 59 {
        anyhow::bail!("Minute must be between 0 and 59");
    }
    Ok((hour, minute))
}

fn parse_weekday(name: &str) -> anyhow::Result<u32> {
    match name.to_lowercase().as_str() {
        "sunday" | "sun" => Ok(0),
        "monday" | "mon" => Ok(1),
        "tuesday" | "tue" => Ok(2),
        "wednesday" | "wed" => Ok(3),
        "thursday" | "thu" => Ok(4),
        "friday" | "fri" => Ok(5),
        "saturday" | "sat" => Ok(6),
        other => anyhow::bail!("Unknown weekday '{}'", other),
    }
}
