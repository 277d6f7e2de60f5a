use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use async_trait::async_trait;

use super::{
    CaseRecord, Consultation, FamilyPlanningRecord, PatientIdentity, PersonIdentity, Pregnancy,
    PrenatalVisit, RecordStore, StaffUser,
};
use crate::types::Notification;

/// SQLite-backed record store.
///
/// The clinic tables are owned by the dashboard; this daemon only reads them.
/// They are still created here if missing so the daemon can start against an
/// empty development database. The notifications table is the one surface
/// this process writes.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub async fn connect(db_path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pregnancies (
                id TEXT PRIMARY KEY,
                case_record_id TEXT NOT NULL,
                status TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS prenatal_visits (
                id TEXT PRIMARY KEY,
                pregnancy_id TEXT NOT NULL,
                label TEXT NOT NULL,
                consultation_id TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_prenatal_visits_pregnancy
             ON prenatal_visits (pregnancy_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS consultations (
                id TEXT PRIMARY KEY,
                rdv TEXT,
                diagnosis TEXT,
                created_by TEXT,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS family_planning_records (
                id TEXT PRIMARY KEY,
                case_record_id TEXT NOT NULL,
                method TEXT NOT NULL,
                rdv_prochain TEXT,
                created_by TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS case_records (
                id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS patient_identities (
                id TEXT PRIMARY KEY,
                person_id TEXT NOT NULL,
                created_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS person_identities (
                id TEXT PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                phone TEXT,
                email TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS staff_users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT,
                email TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS births (
                id TEXT PRIMARY KEY,
                case_record_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                priority TEXT NOT NULL,
                user_id TEXT NOT NULL,
                patient_id TEXT NOT NULL,
                patient_name TEXT NOT NULL,
                appointment_at TEXT NOT NULL,
                day_offset INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                read_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_user
             ON notifications (user_id, read)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn count_since(&self, query: &str, since: DateTime<Utc>) -> anyhow::Result<u64> {
        // Timestamps are stored as RFC 3339 text, which orders correctly
        // under string comparison.
        let row = sqlx::query(query)
            .bind(since.to_rfc3339())
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get(0);
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn pregnancies_by_status(&self, status: &str) -> anyhow::Result<Vec<Pregnancy>> {
        let rows = sqlx::query("SELECT id, case_record_id, status FROM pregnancies WHERE status = ?")
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Pregnancy {
                id: row.get("id"),
                case_record_id: row.get("case_record_id"),
                status: row.get("status"),
            })
            .collect())
    }

    async fn prenatal_visits_for_pregnancy(
        &self,
        pregnancy_id: &str,
    ) -> anyhow::Result<Vec<PrenatalVisit>> {
        let rows = sqlx::query(
            "SELECT id, pregnancy_id, label, consultation_id, created_at
             FROM prenatal_visits WHERE pregnancy_id = ?",
        )
        .bind(pregnancy_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PrenatalVisit {
                id: row.get("id"),
                pregnancy_id: row.get("pregnancy_id"),
                label: row.get("label"),
                consultation_id: row.get("consultation_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn consultation_by_id(&self, id: &str) -> anyhow::Result<Option<Consultation>> {
        let row = sqlx::query(
            "SELECT id, rdv, diagnosis, created_by, created_at FROM consultations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Consultation {
            id: row.get("id"),
            rdv: row.get("rdv"),
            diagnosis: row.get("diagnosis"),
            created_by: row.get("created_by"),
            created_at: row.get("created_at"),
        }))
    }

    async fn family_planning_records(&self) -> anyhow::Result<Vec<FamilyPlanningRecord>> {
        let rows = sqlx::query(
            "SELECT id, case_record_id, method, rdv_prochain, created_by
             FROM family_planning_records",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FamilyPlanningRecord {
                id: row.get("id"),
                case_record_id: row.get("case_record_id"),
                method: row.get("method"),
                rdv_prochain: row.get("rdv_prochain"),
                created_by: row.get("created_by"),
            })
            .collect())
    }

    async fn case_record_by_id(&self, id: &str) -> anyhow::Result<Option<CaseRecord>> {
        let row = sqlx::query("SELECT id, patient_id FROM case_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| CaseRecord {
            id: row.get("id"),
            patient_id: row.get("patient_id"),
        }))
    }

    async fn patient_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PatientIdentity>> {
        let row = sqlx::query("SELECT id, person_id FROM patient_identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| PatientIdentity {
            id: row.get("id"),
            person_id: row.get("person_id"),
        }))
    }

    async fn person_identity_by_id(&self, id: &str) -> anyhow::Result<Option<PersonIdentity>> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, phone, email FROM person_identities WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PersonIdentity {
            id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            phone: row.get("phone"),
            email: row.get("email"),
        }))
    }

    async fn staff_users(&self) -> anyhow::Result<Vec<StaffUser>> {
        let rows = sqlx::query("SELECT id, name, phone, email FROM staff_users")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| StaffUser {
                id: row.get("id"),
                name: row.get("name"),
                phone: row.get("phone"),
                email: row.get("email"),
            })
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, type, title, message, priority, user_id,
                patient_id, patient_name, appointment_at, day_offset, read, created_at, read_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.priority)
        .bind(&notification.user_id)
        .bind(&notification.patient_id)
        .bind(&notification.patient_name)
        .bind(notification.appointment_at.to_rfc3339())
        .bind(notification.day_offset)
        .bind(notification.read as i32)
        .bind(notification.created_at.to_rfc3339())
        .bind(notification.read_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_consultations_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        self.count_since(
            "SELECT COUNT(*) FROM consultations WHERE created_at >= ?",
            since,
        )
        .await
    }

    async fn count_patients_registered_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        self.count_since(
            "SELECT COUNT(*) FROM patient_identities WHERE created_at >= ?",
            since,
        )
        .await
    }

    async fn count_births_since(&self, since: DateTime<Utc>) -> anyhow::Result<u64> {
        self.count_since("SELECT COUNT(*) FROM births WHERE recorded_at >= ?", since)
            .await
    }
}
