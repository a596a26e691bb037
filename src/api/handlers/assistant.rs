use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::api::error::{AppError, Result};
use crate::api::handlers::{parse_filter, InstitutionQuery};
use crate::core::ai::Assistant;
use crate::db::PatientQuery;
use crate::models::{Outcome, Patient};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedText {
    pub patient_id: Uuid,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct Question {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchParams {
    pub institution: String,
    pub unit: Option<String>,
}

fn assistant(state: &AppState) -> Result<Arc<Assistant>> {
    state
        .assistant
        .clone()
        .ok_or(AppError::AssistantUnavailable)
}

async fn load(state: &AppState, id: Uuid, query: &InstitutionQuery) -> Result<Patient> {
    Ok(state.store.get(query.id()?, id).await?)
}

#[instrument(skip(state))]
pub async fn summary(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let assistant = assistant(&state)?;
    let patient = load(&state, id.into_inner(), &query).await?;
    let text = assistant.summarize(&patient, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(GeneratedText {
        patient_id: patient.id,
        text,
    }))
}

#[instrument(skip(state))]
pub async fn handoff(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let assistant = assistant(&state)?;
    let patient = load(&state, id.into_inner(), &query).await?;
    let text = assistant.handoff_note(&patient, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(GeneratedText {
        patient_id: patient.id,
        text,
    }))
}

#[instrument(skip(state, body))]
pub async fn ask(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
    body: web::Json<Question>,
) -> Result<HttpResponse> {
    let question = body.question.trim();
    if question.is_empty() {
        return Err(AppError::BadRequest("question is required".to_string()));
    }

    let assistant = assistant(&state)?;
    let patient = load(&state, id.into_inner(), &query).await?;
    let text = assistant.ask(&patient, question, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(GeneratedText {
        patient_id: patient.id,
        text,
    }))
}

#[instrument(skip(state))]
pub async fn risk(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
) -> Result<HttpResponse> {
    let assistant = assistant(&state)?;
    let patient = load(&state, id.into_inner(), &query).await?;
    let assessment = assistant.assess_risk(&patient, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(assessment))
}

/// Scores every In Progress patient of the institution, one request at a time.
#[instrument(skip(state))]
pub async fn risk_batch(
    state: web::Data<AppState>,
    params: web::Query<BatchParams>,
) -> Result<HttpResponse> {
    let assistant = assistant(&state)?;
    let institution = InstitutionQuery {
        institution: params.institution.clone(),
    };
    let query = PatientQuery {
        unit: parse_filter(params.unit.as_deref())?,
        outcome: Some(Outcome::InProgress),
        ..PatientQuery::default()
    };

    let patients = state.store.list(institution.id()?, &query).await?;
    let entries = assistant.assess_risk_batch(&patients, Utc::now()).await;

    Ok(HttpResponse::Ok().json(entries))
}
