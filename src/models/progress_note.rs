use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[validate(range(min = 25.0, max = 45.0))]
    pub temperature_c: Option<f64>,
    #[validate(range(min = 0.0, max = 300.0))]
    pub heart_rate: Option<f64>,
    #[validate(range(min = 0.0, max = 150.0))]
    pub respiratory_rate: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub spo2: Option<f64>,
    /// Capillary refill time in seconds.
    pub crt_seconds: Option<f64>,
    /// Random blood sugar, mg/dL.
    pub blood_sugar: Option<f64>,
    pub weight_kg: Option<f64>,
}

impl Vitals {
    pub fn is_empty(&self) -> bool {
        self == &Vitals::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Examination {
    pub cns: Option<String>,
    pub cvs: Option<String>,
    pub chest: Option<String>,
    pub per_abdomen: Option<String>,
    pub other: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    #[validate(length(min = 1))]
    pub name: String,
    pub dose: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
}

/// SOAP-structured body of a progress note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapSections {
    pub subjective: Option<String>,
    pub objective: Option<String>,
    pub assessment: Option<String>,
    pub plan: Option<String>,
}

impl SoapSections {
    pub fn is_empty(&self) -> bool {
        [&self.subjective, &self.objective, &self.assessment, &self.plan]
            .iter()
            .all(|s| s.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub id: Uuid,
    pub author: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap: Option<SoapSections>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<Vitals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examination: Option<Examination>,
    #[serde(default)]
    pub medications: Vec<Medication>,
}

impl ProgressNote {
    /// Single-paragraph rendering used in prompts and handoffs.
    pub fn text(&self) -> String {
        let mut parts = Vec::new();
        if !self.note.trim().is_empty() {
            parts.push(self.note.trim().to_string());
        }
        if let Some(soap) = &self.soap {
            for (label, value) in [
                ("S", &soap.subjective),
                ("O", &soap.objective),
                ("A", &soap.assessment),
                ("P", &soap.plan),
            ] {
                if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                    parts.push(format!("{}: {}", label, value));
                }
            }
        }
        parts.join(" | ")
    }
}

/// Request body for appending a progress note.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_note_has_content"))]
pub struct NewProgressNote {
    #[validate(length(min = 1))]
    pub author: String,
    /// Defaults to the time the note is received.
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: String,
    pub soap: Option<SoapSections>,
    #[validate]
    pub vitals: Option<Vitals>,
    pub examination: Option<Examination>,
    #[serde(default)]
    #[validate]
    pub medications: Vec<Medication>,
}

fn validate_note_has_content(note: &NewProgressNote) -> Result<(), ValidationError> {
    let has_text = !note.note.trim().is_empty();
    let has_soap = note.soap.as_ref().map_or(false, |s| !s.is_empty());
    let has_vitals = note.vitals.as_ref().map_or(false, |v| !v.is_empty());

    if has_text || has_soap || has_vitals {
        Ok(())
    } else {
        Err(ValidationError::new("empty_progress_note"))
    }
}

impl NewProgressNote {
    pub fn into_note(self, now: DateTime<Utc>) -> ProgressNote {
        ProgressNote {
            id: Uuid::new_v4(),
            author: self.author,
            recorded_at: self.recorded_at.unwrap_or(now),
            note: self.note,
            soap: self.soap.filter(|s| !s.is_empty()),
            vitals: self.vitals.filter(|v| !v.is_empty()),
            examination: self.examination,
            medications: self.medications,
        }
    }
}
