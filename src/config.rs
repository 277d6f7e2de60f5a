use std::path::Path;

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub clinic: ClinicConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClinicConfig {
    /// Display label used as the "from" identity on outbound messages.
    #[serde(default = "default_clinic_name")]
    pub name: String,
    /// IANA timezone the clinic operates in. Every schedule and day-offset
    /// computation runs in this zone, never UTC or server-local.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            name: default_clinic_name(),
            timezone: default_timezone(),
        }
    }
}

fn default_clinic_name() -> String {
    "Centre de Santé Maternelle".to_string()
}
fn default_timezone() -> String {
    "Africa/Porto-Novo".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "rappeld.db".to_string()
}

/// SMS provider credentials. The channel reports unavailable unless all
/// three values are present (or `mock` is set).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SmsConfig {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
    /// Log messages instead of sending them.
    #[serde(default)]
    pub mock: bool,
}

/// SMTP credentials. The channel reports unavailable unless host, username
/// and password are present (or `mock` is set).
#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address; falls back to `username` when empty.
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub mock: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            mock: false,
        }
    }
}

impl EmailConfig {
    pub fn has_credentials(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Morning reminder pass.
    #[serde(default = "default_reminder_schedule")]
    pub reminder_schedule: String,
    #[serde(default = "default_true")]
    pub reminders_enabled: bool,
    /// Evening staff summary over SMS.
    #[serde(default = "default_daily_summary_schedule")]
    pub daily_summary_schedule: String,
    #[serde(default = "default_true")]
    pub daily_summary_enabled: bool,
    /// Weekly staff summary over email.
    #[serde(default = "default_weekly_summary_schedule")]
    pub weekly_summary_schedule: String,
    #[serde(default = "default_true")]
    pub weekly_summary_enabled: bool,
    /// Shared secret an external HTTP trigger shim must present before
    /// invoking the manual trigger operations. The daemon itself only
    /// parses it.
    #[serde(default)]
    pub trigger_token: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reminder_schedule: default_reminder_schedule(),
            reminders_enabled: true,
            daily_summary_schedule: default_daily_summary_schedule(),
            daily_summary_enabled: true,
            weekly_summary_schedule: default_weekly_summary_schedule(),
            weekly_summary_enabled: true,
            trigger_token: None,
        }
    }
}

fn default_reminder_schedule() -> String {
    "daily at 8am".to_string()
}
fn default_daily_summary_schedule() -> String {
    "daily at 6pm".to_string()
}
fn default_weekly_summary_schedule() -> String {
    "weekly on monday at 9am".to_string()
}
fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load from `config.toml`, falling back to defaults when the file is
    /// absent, then apply environment overrides for secrets.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config: AppConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))?
        } else {
            warn!(path = %path.display(), "No config file found, using defaults");
            AppConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Secrets can live outside the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RAPPELD_SMS_ACCOUNT_ID") {
            self.sms.account_id = v;
        }
        if let Ok(v) = std::env::var("RAPPELD_SMS_AUTH_TOKEN") {
            self.sms.auth_token = v;
        }
        if let Ok(v) = std::env::var("RAPPELD_SMTP_PASSWORD") {
            self.email.password = v;
        }
    }

    /// Resolve the configured clinic timezone.
    pub fn clinic_tz(&self) -> anyhow::Result<chrono_tz::Tz> {
        self.clinic
            .timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown timezone '{}'", self.clinic.timezone))
    }
}
