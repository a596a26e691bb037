//! Natural-language prompts sent to the text-generation model.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::core::vitals::{screen_patient, VitalAlert};
use crate::models::{Patient, Vitals};

/// Most recent notes included in any prompt.
pub const NOTE_LIMIT: usize = 5;

fn vitals_line(vitals: &Vitals) -> String {
    let fields = [
        ("Temp", vitals.temperature_c, "°C"),
        ("HR", vitals.heart_rate, "bpm"),
        ("RR", vitals.respiratory_rate, "/min"),
        ("SpO2", vitals.spo2, "%"),
        ("CRT", vitals.crt_seconds, "s"),
        ("RBS", vitals.blood_sugar, "mg/dL"),
        ("Weight", vitals.weight_kg, "kg"),
    ];
    let mut parts: Vec<String> = fields
        .iter()
        .filter_map(|(label, value, unit)| value.map(|v| format!("{} {}{}", label, v, unit)))
        .collect();
    if let (Some(sys), Some(dia)) = (vitals.systolic_bp, vitals.diastolic_bp) {
        parts.push(format!("BP {}/{} mmHg", sys, dia));
    }
    parts.join(", ")
}

fn alerts_line(alerts: &[VitalAlert]) -> String {
    alerts
        .iter()
        .map(|a| format!("{} ({:?})", a.message, a.severity))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Clinical context shared by every prompt.
pub fn patient_context(patient: &Patient, now: DateTime<Utc>) -> String {
    let mut ctx = String::new();
    let _ = writeln!(ctx, "Patient: {}", patient.name);
    let _ = writeln!(
        ctx,
        "Age: {}, Gender: {}, Unit: {}, Admission type: {}",
        patient.age_label(),
        patient.gender,
        patient.unit,
        patient.admission_type
    );
    if let Some(weight) = patient.weight_kg {
        let _ = writeln!(ctx, "Weight: {} kg", weight);
    }
    let _ = writeln!(ctx, "Diagnosis: {}", patient.diagnosis);
    let _ = writeln!(
        ctx,
        "Admitted: {} ({} days), Current status: {}",
        patient.admission_date.format("%Y-%m-%d"),
        patient.days_admitted(now),
        patient.outcome
    );
    if patient.readmitted_from_step_down {
        let _ = writeln!(ctx, "Readmitted after step down.");
    }

    if let Some(vitals) = patient.latest_vitals() {
        let _ = writeln!(ctx, "Latest vitals: {}", vitals_line(vitals));
    }
    let alerts = screen_patient(patient);
    if !alerts.is_empty() {
        let _ = writeln!(ctx, "Vitals alerts: {}", alerts_line(&alerts));
    }

    let notes = patient.recent_notes(NOTE_LIMIT);
    if !notes.is_empty() {
        let _ = writeln!(ctx, "Recent progress notes (newest first):");
        for note in notes {
            let _ = write!(ctx, "- [{}] {}", note.recorded_at.format("%Y-%m-%d %H:%M"), note.text());
            if !note.medications.is_empty() {
                let meds: Vec<String> = note
                    .medications
                    .iter()
                    .map(|m| match &m.dose {
                        Some(dose) => format!("{} {}", m.name, dose),
                        None => m.name.clone(),
                    })
                    .collect();
                let _ = write!(ctx, " (meds: {})", meds.join(", "));
            }
            ctx.push('\n');
        }
    }
    ctx
}

pub fn summary_prompt(patient: &Patient, now: DateTime<Utc>) -> String {
    format!(
        "You are a clinical assistant in a paediatric and neonatal intensive care ward.\n\
         Write a concise clinical summary (under 150 words) of the patient below: \
         presenting problem, course so far, current status and pending concerns.\n\n{}",
        patient_context(patient, now)
    )
}

pub fn risk_prompt(patient: &Patient, now: DateTime<Utc>) -> String {
    format!(
        "You are a clinical risk assessor in a paediatric and neonatal intensive care ward.\n\
         Assess the risk of clinical deterioration for the patient below.\n\
         Answer in exactly this format:\n\
         RISK_LEVEL: <Low|Moderate|High|Critical>\n\
         RISK_SCORE: <0-100>\n\
         JUSTIFICATION: <two or three sentences>\n\n{}",
        patient_context(patient, now)
    )
}

pub fn handoff_prompt(patient: &Patient, now: DateTime<Utc>) -> String {
    format!(
        "You are preparing a shift handoff in a paediatric and neonatal intensive care ward.\n\
         Write an SBAR handoff note (Situation, Background, Assessment, Recommendation), \
         one short paragraph per heading, for the patient below.\n\n{}",
        patient_context(patient, now)
    )
}

pub fn question_prompt(patient: &Patient, question: &str, now: DateTime<Utc>) -> String {
    format!(
        "You are a clinical assistant in a paediatric and neonatal intensive care ward.\n\
         Answer the clinician's question about the patient below. If the record does not \
         contain the answer, say so.\n\n{}\nQuestion: {}",
        patient_context(patient, now),
        question.trim()
    )
}
