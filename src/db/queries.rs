use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::census::was_active;
use crate::core::period::TimeWindow;
use crate::models::{Outcome, Patient, Unit};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("patient not found")]
    NotFound,

    #[error("patient {0} already exists")]
    Conflict(Uuid),

    #[error("patient {0} was changed by another request; reload and retry")]
    StaleWrite(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored patient document is malformed: {0}")]
    Document(#[from] serde_json::Error),
}

/// Filters for listing one institution's patients.
#[derive(Debug, Clone, Default)]
pub struct PatientQuery {
    pub unit: Option<Unit>,
    pub outcome: Option<Outcome>,
    /// Case-insensitive match on name or diagnosis.
    pub search: Option<String>,
    pub active_in: Option<TimeWindow>,
}

impl PatientQuery {
    fn matches_in_memory(&self, patient: &Patient) -> bool {
        let text_ok = match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                patient.name.to_lowercase().contains(&needle)
                    || patient.diagnosis.to_lowercase().contains(&needle)
            }
            None => true,
        };
        let window_ok = self
            .active_in
            .as_ref()
            .map_or(true, |window| was_active(patient, window));
        text_ok && window_ok
    }
}

/// Persistence for the `patients` collection, keyed by institution.
#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn insert(&self, patient: &Patient) -> Result<(), StoreError>;

    async fn get(&self, institution_id: &str, id: Uuid) -> Result<Patient, StoreError>;

    /// Newest admissions first.
    async fn list(&self, institution_id: &str, query: &PatientQuery) -> Result<Vec<Patient>, StoreError>;

    /// Replaces the stored document, provided it was last written at `loaded_at`.
    ///
    /// `loaded_at` is the `last_edited_at` of the copy the caller read; a
    /// concurrent write in between yields [`StoreError::StaleWrite`].
    async fn update(&self, patient: &Patient, loaded_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete(&self, institution_id: &str, id: Uuid) -> Result<(), StoreError>;
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.message().contains("UNIQUE constraint failed"))
}

#[derive(Clone)]
pub struct SqlitePatientStore {
    pool: SqlitePool,
}

impl SqlitePatientStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PatientStore for SqlitePatientStore {
    #[instrument(skip(self, patient), fields(patient_id = %patient.id, institution = %patient.institution_id))]
    async fn insert(&self, patient: &Patient) -> Result<(), StoreError> {
        let document = serde_json::to_string(patient)?;

        sqlx::query(
            "INSERT INTO patients (
                id, institution_id, unit, outcome, admission_date, updated_at, document
            ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(patient.id.to_string())
        .bind(&patient.institution_id)
        .bind(patient.unit.as_str())
        .bind(patient.outcome.as_str())
        .bind(timestamp(&patient.admission_date))
        .bind(timestamp(&patient.last_edited_at))
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(patient.id)
            } else {
                StoreError::Database(e)
            }
        })?;

        info!("patient created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, institution_id: &str, id: Uuid) -> Result<Patient, StoreError> {
        let row = sqlx::query("SELECT document FROM patients WHERE id = ? AND institution_id = ?")
            .bind(id.to_string())
            .bind(institution_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        let document: String = row.try_get("document")?;
        Ok(serde_json::from_str(&document)?)
    }

    #[instrument(skip(self, query))]
    async fn list(&self, institution_id: &str, query: &PatientQuery) -> Result<Vec<Patient>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT document FROM patients WHERE institution_id = ");
        builder.push_bind(institution_id);
        if let Some(unit) = query.unit {
            builder.push(" AND unit = ").push_bind(unit.as_str());
        }
        if let Some(outcome) = query.outcome {
            builder.push(" AND outcome = ").push_bind(outcome.as_str());
        }
        builder.push(" ORDER BY admission_date DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut patients = Vec::with_capacity(rows.len());
        for row in rows {
            let document: String = row.try_get("document")?;
            let patient: Patient = serde_json::from_str(&document)?;
            if query.matches_in_memory(&patient) {
                patients.push(patient);
            }
        }

        debug!(count = patients.len(), "patients listed");
        Ok(patients)
    }

    #[instrument(skip(self, patient), fields(patient_id = %patient.id, institution = %patient.institution_id))]
    async fn update(&self, patient: &Patient, loaded_at: DateTime<Utc>) -> Result<(), StoreError> {
        let document = serde_json::to_string(patient)?;

        let result = sqlx::query(
            "UPDATE patients
             SET unit = ?, outcome = ?, admission_date = ?, updated_at = ?, document = ?
             WHERE id = ? AND institution_id = ? AND updated_at = ?",
        )
        .bind(patient.unit.as_str())
        .bind(patient.outcome.as_str())
        .bind(timestamp(&patient.admission_date))
        .bind(timestamp(&patient.last_edited_at))
        .bind(document)
        .bind(patient.id.to_string())
        .bind(&patient.institution_id)
        .bind(timestamp(&loaded_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM patients WHERE id = ? AND institution_id = ?")
                .bind(patient.id.to_string())
                .bind(&patient.institution_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if exists {
                warn!("stale write rejected");
                return Err(StoreError::StaleWrite(patient.id));
            }
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, institution_id: &str, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM patients WHERE id = ? AND institution_id = ?")
            .bind(id.to_string())
            .bind(institution_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        info!("patient deleted");
        Ok(())
    }
}
