use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::api::error::Result;
use crate::api::handlers::InstitutionQuery;
use crate::models::NewProgressNote;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NotesParams {
    pub institution: String,
    pub limit: Option<usize>,
}

/// Progress notes, newest first.
#[instrument(skip(state))]
pub async fn list_notes(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    params: web::Query<NotesParams>,
) -> Result<HttpResponse> {
    let institution = InstitutionQuery {
        institution: params.institution.clone(),
    };
    let patient = state.store.get(institution.id()?, id.into_inner()).await?;
    let limit = params.limit.unwrap_or(patient.progress_notes.len());

    Ok(HttpResponse::Ok().json(patient.recent_notes(limit)))
}

#[instrument(skip(state, body))]
pub async fn add_note(
    state: web::Data<AppState>,
    id: web::Path<Uuid>,
    query: web::Query<InstitutionQuery>,
    body: web::Json<NewProgressNote>,
) -> Result<HttpResponse> {
    let new = body.into_inner();
    new.validate()?;

    let now = Utc::now();
    let mut patient = state.store.get(query.id()?, id.into_inner()).await?;
    let loaded_at = patient.last_edited_at;
    let note = patient.add_note(new.into_note(now), now).clone();
    state.store.update(&patient, loaded_at).await?;

    info!(patient_id = %patient.id, note_id = %note.id, "progress note added");
    Ok(HttpResponse::Created().json(note))
}
