use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::api::error::Result;
use crate::api::handlers::{parse_filter, require_actor, InstitutionQuery};
use crate::audit::{self, ChainBreak, EditEntry};
use crate::core::lifecycle::{self, OutcomeChange};
use crate::core::period::PeriodQuery;
use crate::core::vitals::{screen_patient, VitalAlert};
use crate::db::PatientQuery;
use crate::models::{NewPatient, Patient, PatientUpdate};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub institution: String,
    pub unit: Option<String>,
    pub outcome: Option<String>,
    pub q: Option<String>,
}

/// Lists an institution's patients, newest admission first.
///
/// With a period, only patients active at some point of it are returned.
#[instrument(skip(state))]
pub async fn list_patients(
    state: web::Data<AppState>,
    params: web::Query<ListParams>,
    period: web::Query<PeriodQuery>,
) -> Result<HttpResponse> {
    let institution = InstitutionQuery {
        institution: params.institution.clone(),
    };
    let active_in = match period.period()? {
        Some(period) => Some(period.resolve(Utc::now(), state.config.ward.offset())?),
        None => None,
    };
    let query = PatientQuery {
        unit: parse_filter(params.unit.as_deref())?,
        outcome: parse_filter(params.outcome.as_deref())?,
        search: params.q.clone(),
        active_in,
    };

    let patients = state.store.list(institution.id()?, &query).await?;
    Ok(HttpResponse::Ok().json(patients))
}

#[instrument(skip(state, body), fields(institution = %body.institution_id))]
pub async fn create_patient(
    state: web::Data<AppState>,
    body: web::Json<NewPatient>,
) -> Result<HttpResponse> {
    let new = body.into_inner();
    new.validate()?;
    require_actor(&new.created_by, "createdBy")?;

    let patient = Patient::admit(new, Utc::now());
    state.store.insert(&patient).await?;

    info!(patient_id = %patient.id, unit = %patient.unit, "patient admitted");
    Ok(HttpResponse::Created().json(patient))
}

#[instrument(skip(state))]
pub async fn get_patient(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let patient = state.store.get(query.id()?, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(patient))
}

#[instrument(skip(state, body))]
pub async fn update_patient(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
    body: web::Json<PatientUpdate>,
) -> Result<HttpResponse> {
    let update = body.into_inner();
    update.validate()?;
    require_actor(&update.edited_by, "editedBy")?;

    let mut patient = state.store.get(query.id()?, id.into_inner()).await?;
    let loaded_at = patient.last_edited_at;
    let actor = update.edited_by.trim().to_string();
    let changed = patient.apply_update(update, &actor, Utc::now())?;
    if !changed.is_empty() {
        state.store.update(&patient, loaded_at).await?;
        info!(patient_id = %patient.id, fields = ?changed, "patient updated");
    }

    Ok(HttpResponse::Ok().json(patient))
}

#[instrument(skip(state))]
pub async fn delete_patient(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    state.store.delete(query.id()?, id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(skip(state, body), fields(outcome = %body.outcome))]
pub async fn change_outcome(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
    body: web::Json<OutcomeChange>,
) -> Result<HttpResponse> {
    let change = body.into_inner();
    require_actor(&change.changed_by, "changedBy")?;

    let mut patient = state.store.get(query.id()?, id.into_inner()).await?;
    let loaded_at = patient.last_edited_at;
    lifecycle::apply_outcome(&mut patient, change, Utc::now())?;
    state.store.update(&patient, loaded_at).await?;

    Ok(HttpResponse::Ok().json(patient))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadmitRequest {
    pub readmitted_by: String,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
}

#[instrument(skip(state, body))]
pub async fn readmit_patient(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
    body: web::Json<ReadmitRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    require_actor(&request.readmitted_by, "readmittedBy")?;

    let mut patient = state.store.get(query.id()?, id.into_inner()).await?;
    let loaded_at = patient.last_edited_at;
    lifecycle::readmit(&mut patient, request.readmitted_by.trim(), request.date, Utc::now())?;
    state.store.update(&patient, loaded_at).await?;

    Ok(HttpResponse::Ok().json(patient))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub entries: Vec<EditEntry>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<ChainBreak>,
}

/// Edit history with the result of re-hashing the chain.
#[instrument(skip(state))]
pub async fn edit_history(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let patient = state.store.get(query.id()?, id.into_inner()).await?;
    let broken_at = audit::verify(&patient.edit_history).err();

    Ok(HttpResponse::Ok().json(HistoryResponse {
        verified: broken_at.is_none(),
        broken_at,
        entries: patient.edit_history,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub patient_id: Uuid,
    pub alerts: Vec<VitalAlert>,
}

#[instrument(skip(state))]
pub async fn vitals_alerts(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let patient = state.store.get(query.id()?, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AlertsResponse {
        patient_id: patient.id,
        alerts: screen_patient(&patient),
    }))
}
