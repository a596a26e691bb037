//! LLM-backed assistant: summaries, risk scoring and handoff notes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AiConfig;
use crate::core::prompts;
use crate::core::vitals::{screen_patient, AlertSeverity, VitalAlert};
use crate::models::Patient;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("the AI assistant is not configured")]
    NotConfigured,

    #[error("invalid AI endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("request to the AI service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI service returned no text")]
    EmptyResponse,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(AiError::NotConfigured)?;

        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?
            .join(&format!("v1beta/models/{}:generateContent", config.model))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint.path()))]
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "AI service returned an error");
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response.json().await?;
        let text = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(AiError::EmptyResponse)?;

        Ok(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    fn parse(s: &str) -> Option<Self> {
        let word = s
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_ascii_lowercase();
        match word.as_str() {
            "low" => Some(RiskLevel::Low),
            "moderate" | "medium" => Some(RiskLevel::Moderate),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// Fallback level from the vitals screen alone.
    pub fn from_alerts(alerts: &[VitalAlert]) -> Self {
        match alerts.iter().map(|a| a.severity).max() {
            Some(AlertSeverity::Critical) => RiskLevel::High,
            Some(AlertSeverity::Warning) => RiskLevel::Moderate,
            None => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSource {
    Model,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub score: Option<u8>,
    pub justification: String,
    pub source: RiskSource,
    pub alerts: Vec<VitalAlert>,
}

fn field<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let line = line.trim().trim_start_matches(['*', '-', ' ']);
    let (key, value) = line.split_once(':')?;
    let key = key.trim().trim_matches('*').replace(' ', "_");
    key.eq_ignore_ascii_case(name).then(|| value.trim())
}

/// Reads the `RISK_LEVEL`, `RISK_SCORE` and `JUSTIFICATION` lines of a reply.
pub fn parse_risk_reply(reply: &str, alerts: Vec<VitalAlert>) -> RiskAssessment {
    let mut level = None;
    let mut score = None;
    let mut justification = Vec::new();

    for line in reply.lines() {
        if let Some(value) = field(line, "RISK_LEVEL") {
            level = level.or_else(|| RiskLevel::parse(value));
        } else if let Some(value) = field(line, "RISK_SCORE") {
            let digits: String = value
                .trim_start_matches(|c: char| !c.is_ascii_digit())
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            score = digits.parse::<u32>().ok().map(|s| s.min(100) as u8);
        } else if let Some(value) = field(line, "JUSTIFICATION") {
            justification.push(value.to_string());
        } else if !line.trim().is_empty() {
            justification.push(line.trim().to_string());
        }
    }

    let justification = justification.join(" ");
    match level {
        Some(level) => RiskAssessment {
            level,
            score,
            justification,
            source: RiskSource::Model,
            alerts,
        },
        None => RiskAssessment {
            level: RiskLevel::from_alerts(&alerts),
            score: None,
            justification: if justification.is_empty() {
                reply.trim().to_string()
            } else {
                justification
            },
            source: RiskSource::Rules,
            alerts,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRiskEntry {
    pub patient_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Assistant {
    generator: Arc<dyn TextGenerator>,
    batch_delay: Duration,
}

impl Assistant {
    pub fn new(generator: Arc<dyn TextGenerator>, batch_delay: Duration) -> Self {
        Self {
            generator,
            batch_delay,
        }
    }

    /// Builds an assistant on the configured Gemini endpoint.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let client = GeminiClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            Duration::from_millis(config.batch_delay_ms),
        ))
    }

    #[instrument(skip_all, fields(patient_id = %patient.id))]
    pub async fn summarize(&self, patient: &Patient, now: DateTime<Utc>) -> Result<String, AiError> {
        self.generator
            .generate(&prompts::summary_prompt(patient, now))
            .await
    }

    #[instrument(skip_all, fields(patient_id = %patient.id))]
    pub async fn handoff_note(&self, patient: &Patient, now: DateTime<Utc>) -> Result<String, AiError> {
        self.generator
            .generate(&prompts::handoff_prompt(patient, now))
            .await
    }

    #[instrument(skip_all, fields(patient_id = %patient.id))]
    pub async fn ask(
        &self,
        patient: &Patient,
        question: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AiError> {
        self.generator
            .generate(&prompts::question_prompt(patient, question, now))
            .await
    }

    #[instrument(skip_all, fields(patient_id = %patient.id))]
    pub async fn assess_risk(
        &self,
        patient: &Patient,
        now: DateTime<Utc>,
    ) -> Result<RiskAssessment, AiError> {
        let reply = self
            .generator
            .generate(&prompts::risk_prompt(patient, now))
            .await?;
        let assessment = parse_risk_reply(&reply, screen_patient(patient));
        info!(level = ?assessment.level, source = ?assessment.source, "risk assessed");
        Ok(assessment)
    }

    /// Scores each patient in turn, pausing between requests to stay under
    /// the provider's rate limit. Failures are reported per patient.
    pub async fn assess_risk_batch(&self, patients: &[Patient], now: DateTime<Utc>) -> Vec<BatchRiskEntry> {
        let mut entries = Vec::with_capacity(patients.len());

        for (i, patient) in patients.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }

            let (assessment, error) = match self.assess_risk(patient, now).await {
                Ok(assessment) => (Some(assessment), None),
                Err(e) => {
                    warn!(patient_id = %patient.id, error = %e, "risk assessment failed");
                    (None, Some(format!("failed to generate: {}", e)))
                }
            };
            entries.push(BatchRiskEntry {
                patient_id: patient.id,
                name: patient.name.clone(),
                assessment,
                error,
            });
        }

        info!(
            total = entries.len(),
            failed = entries.iter().filter(|e| e.error.is_some()).count(),
            "batch risk assessment finished"
        );
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::patient::fixtures::{admitted, at};
    use crate::models::{NewProgressNote, Unit, Vitals};
    use mockall::predicate::function;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ai_config(base_url: String) -> AiConfig {
        AiConfig {
            base_url,
            model: "gemini-1.5-flash".to_string(),
            api_key: Some("test-key".to_string()),
            timeout_secs: 5,
            batch_delay_ms: 0,
        }
    }

    #[test]
    fn parses_structured_reply() {
        let reply = "RISK_LEVEL: High\nRISK_SCORE: 78/100\nJUSTIFICATION: Rising oxygen need.\nTachypnoeic on CPAP.";
        let assessment = parse_risk_reply(reply, vec![]);

        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.score, Some(78));
        assert_eq!(assessment.source, RiskSource::Model);
        assert_eq!(assessment.justification, "Rising oxygen need. Tachypnoeic on CPAP.");
    }

    #[test]
    fn parses_markdown_decorated_reply() {
        let reply = "**Risk Level:** Moderate\n**Risk Score:** 140";
        let assessment = parse_risk_reply(reply, vec![]);
        assert_eq!(assessment.level, RiskLevel::Moderate);
        assert_eq!(assessment.score, Some(100));
    }

    #[test]
    fn unparsable_reply_falls_back_to_vitals() {
        let alerts = crate::core::vitals::screen_vitals(
            &Vitals {
                crt_seconds: Some(6.0),
                ..Vitals::default()
            },
            2,
        );
        let assessment = parse_risk_reply("The baby looks unwell.", alerts);

        assert_eq!(assessment.level, RiskLevel::High);
        assert_eq!(assessment.source, RiskSource::Rules);
        assert_eq!(assessment.justification, "The baby looks unwell.");
    }

    #[tokio::test]
    async fn assess_risk_sends_risk_prompt() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .with(function(|prompt: &str| prompt.contains("RISK_LEVEL") && prompt.contains("Unit: NICU")))
            .times(1)
            .returning(|_| Ok("RISK_LEVEL: Low\nRISK_SCORE: 10\nJUSTIFICATION: Stable.".to_string()));

        let assistant = Assistant::new(Arc::new(generator), Duration::ZERO);
        let patient = admitted(Unit::Nicu, at(2024, 3, 1));
        let assessment = assistant.assess_risk(&patient, at(2024, 3, 2)).await.unwrap();

        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.score, Some(10));
    }

    #[tokio::test]
    async fn batch_keeps_going_after_a_failure() {
        let mut generator = MockTextGenerator::new();
        let mut calls = 0;
        generator.expect_generate().times(3).returning(move |_| {
            calls += 1;
            if calls == 2 {
                Err(AiError::EmptyResponse)
            } else {
                Ok("RISK_LEVEL: Moderate".to_string())
            }
        });

        let assistant = Assistant::new(Arc::new(generator), Duration::from_millis(1));
        let patients = vec![
            admitted(Unit::Nicu, at(2024, 3, 1)),
            admitted(Unit::Nicu, at(2024, 3, 2)),
            admitted(Unit::Nicu, at(2024, 3, 3)),
        ];
        let entries = assistant.assess_risk_batch(&patients, at(2024, 3, 4)).await;

        assert_eq!(entries.len(), 3);
        assert!(entries[0].assessment.is_some());
        assert_eq!(
            entries[1].error.as_deref(),
            Some("failed to generate: AI service returned no text")
        );
        assert_eq!(entries[2].assessment.as_ref().map(|a| a.level), Some(RiskLevel::Moderate));
        assert_eq!(entries[1].patient_id, patients[1].id);
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let mut config = ai_config("http://localhost".to_string());
        config.api_key = None;
        assert!(matches!(GeminiClient::new(&config), Err(AiError::NotConfigured)));
    }

    #[tokio::test]
    async fn gemini_client_reads_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-1.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{ "parts": [{ "text": "hello" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Stable " }, { "text": "overnight." }] }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new(&ai_config(server.uri())).unwrap();
        let text = client.generate("hello").await.unwrap();

        assert_eq!(text, "Stable overnight.");
    }

    #[tokio::test]
    async fn gemini_client_surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&ai_config(server.uri())).unwrap();
        let err = client.generate("hello").await.unwrap_err();

        assert!(matches!(err, AiError::Status { status: 429, ref body } if body == "quota exceeded"));
    }

    #[tokio::test]
    async fn gemini_client_rejects_empty_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(&ai_config(server.uri())).unwrap();
        assert!(matches!(client.generate("hello").await, Err(AiError::EmptyResponse)));
    }

    #[tokio::test]
    async fn summary_uses_patient_notes() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .with(function(|prompt: &str| prompt.contains("weaned to room air")))
            .returning(|_| Ok("Improving.".to_string()));

        let mut patient = admitted(Unit::Nicu, at(2024, 3, 1));
        let note = NewProgressNote {
            author: "dr.rao".to_string(),
            recorded_at: None,
            note: "weaned to room air".to_string(),
            soap: None,
            vitals: None,
            examination: None,
            medications: vec![],
        };
        patient.add_note(note.into_note(at(2024, 3, 2)), at(2024, 3, 2));

        let assistant = Assistant::new(Arc::new(generator), Duration::ZERO);
        assert_eq!(assistant.summarize(&patient, at(2024, 3, 3)).await.unwrap(), "Improving.");
    }
}
