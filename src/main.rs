mod channels;
mod collector;
mod config;
mod dates;
mod dispatcher;
mod phone;
mod scheduler;
mod store;
mod summary;
mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::channels::{EmailChannel, InAppChannel, ReminderChannel, SmsChannel};
use crate::collector::ReminderCollector;
use crate::config::AppConfig;
use crate::dispatcher::ReminderDispatcher;
use crate::scheduler::SchedulerHandle;
use crate::store::{RecordStore, SqliteRecordStore};
use crate::summary::SummaryService;

enum Command {
    /// Run the daemon with all scheduled jobs.
    Run,
    /// Manual triggers: run one job body immediately and exit.
    RemindNow,
    DailySummaryNow,
    WeeklySummaryNow,
}

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        None => Command::Run,
        Some("remind-now") => Command::RemindNow,
        Some("daily-summary-now") => Command::DailySummaryNow,
        Some("weekly-summary-now") => Command::WeeklySummaryNow,
        Some("--version") | Some("-V") => {
            println!("rappeld {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help") | Some("-h") => {
            println!("rappeld {}", env!("CARGO_PKG_VERSION"));
            println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
            println!("Usage: rappeld [COMMAND]\n");
            println!("Commands:");
            println!("  (none)              Run the daemon with all scheduled jobs");
            println!("  remind-now          Run a reminder pass immediately, then exit");
            println!("  daily-summary-now   Send the daily staff summary immediately, then exit");
            println!("  weekly-summary-now  Send the weekly staff summary immediately, then exit");
            println!("\nOptions:");
            println!("  -h, --help       Print help");
            println!("  -V, --version    Print version");
            return Ok(());
        }
        Some(other) => {
            eprintln!("Unknown command '{}'. See --help.", other);
            std::process::exit(2);
        }
    };

    tokio::runtime::Runtime::new()?.block_on(run(command))
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = AppConfig::load(&PathBuf::from("config.toml"))?;
    let tz = config.clinic_tz()?;
    if config.scheduler.trigger_token.is_some() {
        info!("Trigger token configured for the external HTTP trigger surface");
    }

    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteRecordStore::connect(&config.store.db_path).await?);

    let in_app: Arc<dyn ReminderChannel> = Arc::new(InAppChannel::new(store.clone()));
    let sms: Arc<dyn ReminderChannel> =
        Arc::new(SmsChannel::new(config.sms.clone(), &config.clinic.name));
    let email: Arc<dyn ReminderChannel> =
        Arc::new(EmailChannel::new(config.email.clone(), &config.clinic.name, tz));

    for channel in [&in_app, &sms, &email] {
        info!(
            channel = channel.name(),
            available = channel.is_available(),
            "Channel configured"
        );
    }

    let collector = ReminderCollector::new(store.clone(), tz);
    let dispatcher = Arc::new(ReminderDispatcher::new(
        collector.clone(),
        in_app,
        sms.clone(),
        email.clone(),
    ));
    let summaries = Arc::new(SummaryService::new(
        store.clone(),
        collector,
        sms,
        email,
    ));

    let scheduler = SchedulerHandle::new(&config.scheduler, tz, dispatcher, summaries)?;

    match command {
        Command::Run => {
            scheduler.start();
            info!(timezone = %tz, "rappeld running, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.stop();
        }
        Command::RemindNow => {
            let report = scheduler.run_reminders_now().await?;
            info!(
                collected = report.collected,
                sent = report.sent,
                "Manual reminder pass finished"
            );
        }
        Command::DailySummaryNow => {
            let report = scheduler.run_daily_summary_now().await?;
            info!(
                recipients = report.recipients,
                delivered = report.delivered,
                "Manual daily summary finished"
            );
        }
        Command::WeeklySummaryNow => {
            let report = scheduler.run_weekly_summary_now().await?;
            info!(
                recipients = report.recipients,
                delivered = report.delivered,
                "Manual weekly summary finished"
            );
        }
    }

    Ok(())
}
