//! Request handlers, one module per resource.

use std::str::FromStr;

use serde::Deserialize;

use crate::api::error::{AppError, Result};
use crate::models::UnknownVariant;

pub mod assistant;
pub mod dashboard;
pub mod health;
pub mod notes;
pub mod patients;

/// `?institution=` on every patient-scoped route.
#[derive(Debug, Deserialize)]
pub struct InstitutionQuery {
    pub institution: String,
}

impl InstitutionQuery {
    pub fn id(&self) -> Result<&str> {
        let id = self.institution.trim();
        if id.is_empty() {
            return Err(AppError::BadRequest("institution is required".to_string()));
        }
        Ok(id)
    }
}

/// Reads an optional enum filter; blank and `all` mean no filter.
pub fn parse_filter<T>(raw: Option<&str>) -> Result<Option<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    match raw.map(str::trim) {
        None => Ok(None),
        Some(s) if s.is_empty() || s.eq_ignore_ascii_case("all") => Ok(None),
        Some(s) => Ok(Some(s.parse()?)),
    }
}

pub fn require_actor(actor: &str, field: &str) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}
