//! Ward census over a time window: who was in the unit, what happened to them,
//! and the rates derived from those counts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::period::TimeWindow;
use crate::models::{AdmissionType, Outcome, Patient, Unit};

/// The instant the patient left the unit, if they have.
///
/// A closed admission without a release date falls back to the last edit,
/// then to the admission itself.
pub fn unit_exit(patient: &Patient) -> Option<DateTime<Utc>> {
    match patient.outcome {
        Outcome::InProgress => None,
        Outcome::StepDown => Some(
            patient
                .step_down_date
                .unwrap_or_else(|| terminal_fallback(patient)),
        ),
        Outcome::Discharged | Outcome::Referred | Outcome::Deceased => Some(
            patient
                .release_date
                .unwrap_or_else(|| terminal_fallback(patient)),
        ),
    }
}

fn terminal_fallback(patient: &Patient) -> DateTime<Utc> {
    patient.last_edited_at.max(patient.admission_date)
}

/// Whether the patient occupied a bed in the unit at any point of `window`.
pub fn was_active(patient: &Patient, window: &TimeWindow) -> bool {
    window.overlaps(patient.admission_date, unit_exit(patient))
}

pub fn is_currently_active(patient: &Patient) -> bool {
    patient.outcome == Outcome::InProgress
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusFilter {
    pub unit: Option<Unit>,
    pub admission_type: Option<AdmissionType>,
}

impl CensusFilter {
    pub fn matches(&self, patient: &Patient) -> bool {
        self.unit.map_or(true, |u| patient.unit == u)
            && self
                .admission_type
                .map_or(true, |t| patient.admission_type == t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CensusReport {
    pub window: Option<TimeWindow>,
    /// Admitted inside the window.
    pub admissions: usize,
    /// In the unit at some point of the window.
    pub active: usize,
    /// In Progress right now, regardless of the window.
    pub in_progress_now: usize,
    pub discharged: usize,
    pub referred: usize,
    pub deceased: usize,
    pub stepped_down: usize,
    pub readmitted: usize,
    pub mortality_rate: f64,
    pub discharge_rate: f64,
    pub referral_rate: f64,
    pub inborn_mortality: f64,
    pub outborn_mortality: f64,
    pub average_length_of_stay_days: f64,
}

/// Percentage rounded to two decimals; zero for an empty denominator.
pub fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    let pct = numerator as f64 * 100.0 / denominator as f64;
    (pct * 100.0).round() / 100.0
}

#[derive(Default)]
struct Tally {
    active: usize,
    deceased: usize,
}

/// Single pass over `patients`.
pub fn census(patients: &[Patient], window: &TimeWindow, filter: &CensusFilter) -> CensusReport {
    let mut report = CensusReport {
        window: Some(*window),
        ..CensusReport::default()
    };
    let mut inborn = Tally::default();
    let mut outborn = Tally::default();
    let mut stay_days_total = 0.0;
    let mut stays = 0usize;

    let in_window = |at: Option<DateTime<Utc>>| at.map_or(false, |t| window.contains(t));

    for patient in patients.iter().filter(|p| filter.matches(p)) {
        if is_currently_active(patient) {
            report.in_progress_now += 1;
        }
        if window.contains(patient.admission_date) {
            report.admissions += 1;
        }

        let active = was_active(patient, window);
        if active {
            report.active += 1;
        }

        let exit = unit_exit(patient);
        let left_in_window = in_window(exit);
        let deceased_in_window = patient.outcome == Outcome::Deceased && left_in_window;

        match patient.outcome {
            Outcome::Discharged if left_in_window => report.discharged += 1,
            Outcome::Referred if left_in_window => report.referred += 1,
            Outcome::Deceased if left_in_window => report.deceased += 1,
            _ => {}
        }
        // A readmitted patient still stepped down once.
        if in_window(patient.step_down_date) {
            report.stepped_down += 1;
        }
        if patient.readmitted_from_step_down && in_window(patient.readmission_date) {
            report.readmitted += 1;
        }

        let tally = match patient.admission_type {
            AdmissionType::Inborn => Some(&mut inborn),
            AdmissionType::Outborn => Some(&mut outborn),
            _ => None,
        };
        if let Some(tally) = tally {
            if active {
                tally.active += 1;
            }
            if deceased_in_window {
                tally.deceased += 1;
            }
        }

        if let Some(exit) = exit.filter(|_| left_in_window) {
            stay_days_total += (exit - patient.admission_date).num_minutes().max(0) as f64 / 1440.0;
            stays += 1;
        }
    }

    report.mortality_rate = rate(report.deceased, report.active);
    report.discharge_rate = rate(report.discharged, report.active);
    report.referral_rate = rate(report.referred, report.active);
    report.inborn_mortality = rate(inborn.deceased, inborn.active);
    report.outborn_mortality = rate(outborn.deceased, outborn.active);
    if stays > 0 {
        report.average_length_of_stay_days = (stay_days_total / stays as f64 * 10.0).round() / 10.0;
    }

    report
}

/// Patients active during `window`, in input order.
pub fn active_during<'a>(
    patients: &'a [Patient],
    window: &'a TimeWindow,
    filter: &'a CensusFilter,
) -> impl Iterator<Item = &'a Patient> + 'a {
    patients
        .iter()
        .filter(move |p| filter.matches(p) && was_active(p, window))
}
