use actix_web::{web, HttpRequest};

use crate::api::error::AppError;
use crate::api::handlers::{assistant, dashboard, health, notes, patients};

fn bad_request(err: impl std::fmt::Display, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(err.to_string()).into()
}

/// Mounts every route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(bad_request))
        .app_data(web::QueryConfig::default().error_handler(bad_request))
        .app_data(web::PathConfig::default().error_handler(bad_request))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health::health))
                .route("/dashboard", web::get().to(dashboard::dashboard))
                .route("/assistant/risk-batch", web::post().to(assistant::risk_batch))
                .service(
                    web::resource("/patients")
                        .route(web::get().to(patients::list_patients))
                        .route(web::post().to(patients::create_patient)),
                )
                .service(
                    web::resource("/patients/{id}")
                        .route(web::get().to(patients::get_patient))
                        .route(web::put().to(patients::update_patient))
                        .route(web::delete().to(patients::delete_patient)),
                )
                .route("/patients/{id}/outcome", web::post().to(patients::change_outcome))
                .route("/patients/{id}/readmit", web::post().to(patients::readmit_patient))
                .route("/patients/{id}/history", web::get().to(patients::edit_history))
                .route("/patients/{id}/alerts", web::get().to(patients::vitals_alerts))
                .service(
                    web::resource("/patients/{id}/notes")
                        .route(web::get().to(notes::list_notes))
                        .route(web::post().to(notes::add_note)),
                )
                .route("/patients/{id}/assistant/summary", web::post().to(assistant::summary))
                .route("/patients/{id}/assistant/risk", web::post().to(assistant::risk))
                .route("/patients/{id}/assistant/handoff", web::post().to(assistant::handoff))
                .route("/patients/{id}/assistant/ask", web::post().to(assistant::ask)),
        );
}
