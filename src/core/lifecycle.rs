//! Admission lifecycle: outcome transitions and the step-down / readmission loop.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::audit::EditAction;
use crate::models::{Outcome, Patient};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("cannot move a patient from {from} to {to}")]
    InvalidTransition { from: Outcome, to: Outcome },

    #[error("{0} date cannot precede the {1}")]
    DateOrder(&'static str, &'static str),

    #[error("a referral needs the receiving facility")]
    MissingReferralTarget,

    #[error("only patients in Step Down can be readmitted")]
    NotSteppedDown,
}

/// Request body for an outcome change.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeChange {
    pub outcome: Outcome,
    /// When the change happened; defaults to now.
    pub date: Option<DateTime<Utc>>,
    pub referred_to: Option<String>,
    pub referral_reason: Option<String>,
    pub cause_of_death: Option<String>,
    pub changed_by: String,
}

impl Outcome {
    /// Transitions only move forward, except Step Down which can go back to
    /// In Progress through a readmission.
    pub fn can_transition_to(&self, next: Outcome) -> bool {
        use Outcome::*;
        match (self, next) {
            (InProgress, StepDown | Discharged | Referred | Deceased) => true,
            (StepDown, InProgress | Discharged | Referred | Deceased) => true,
            _ => false,
        }
    }
}

/// Validates and applies `change`, appending to the patient's edit history.
pub fn apply_outcome(
    patient: &mut Patient,
    change: OutcomeChange,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    let from = patient.outcome;
    let to = change.outcome;
    let actor = change.changed_by.trim().to_string();

    if to == Outcome::InProgress {
        // Going back to the unit is only possible as a readmission.
        return if from == Outcome::StepDown {
            readmit(patient, &actor, change.date, now)
        } else {
            Err(LifecycleError::InvalidTransition { from, to })
        };
    }

    if !from.can_transition_to(to) {
        return Err(LifecycleError::InvalidTransition { from, to });
    }

    let date = change.date.unwrap_or(now);
    if date < patient.admission_date {
        return Err(LifecycleError::DateOrder("outcome", "admission date"));
    }
    if let Some(readmitted) = patient.readmission_date.filter(|_| patient.readmitted_from_step_down) {
        if date < readmitted {
            return Err(LifecycleError::DateOrder("outcome", "readmission date"));
        }
    }

    match to {
        Outcome::StepDown => {
            patient.is_step_down = true;
            patient.step_down_date = Some(date);
            patient.step_down_from = Some(patient.unit);
        }
        Outcome::Referred | Outcome::Discharged | Outcome::Deceased => {
            if let Some(step_down) = patient.step_down_date.filter(|_| from == Outcome::StepDown) {
                if date < step_down {
                    return Err(LifecycleError::DateOrder("release", "step-down date"));
                }
            }
            if to == Outcome::Referred {
                let target = change
                    .referred_to
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(LifecycleError::MissingReferralTarget)?;
                patient.referred_to = Some(target.to_string());
                patient.referral_reason = change.referral_reason;
            }
            if to == Outcome::Deceased {
                patient.cause_of_death = change.cause_of_death;
            }
            patient.release_date = Some(date);
        }
        Outcome::InProgress => unreachable!("handled above"),
    }

    patient.outcome = to;
    patient.touch(
        &actor,
        EditAction::OutcomeChanged,
        format!("{} -> {}", from, to),
        now,
    );

    info!(patient_id = %patient.id, %from, %to, "outcome changed");
    Ok(())
}

/// Brings a stepped-down patient back into the unit they left.
pub fn readmit(
    patient: &mut Patient,
    actor: &str,
    date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    if patient.outcome != Outcome::StepDown {
        return Err(LifecycleError::NotSteppedDown);
    }

    let date = date.unwrap_or(now);
    if let Some(step_down) = patient.step_down_date {
        if date < step_down {
            return Err(LifecycleError::DateOrder("readmission", "step-down date"));
        }
    }

    if let Some(unit) = patient.step_down_from {
        patient.unit = unit;
    }
    patient.outcome = Outcome::InProgress;
    patient.is_step_down = false;
    patient.readmitted_from_step_down = true;
    patient.readmission_date = Some(date);

    patient.touch(
        actor,
        EditAction::Readmitted,
        format!("readmitted to {} from step down", patient.unit),
        now,
    );

    info!(patient_id = %patient.id, unit = %patient.unit, "readmitted from step down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::patient::fixtures::{admitted, at};
    use crate::models::Unit;
    use test_case::test_case;

    fn change(outcome: Outcome, date: DateTime<Utc>) -> OutcomeChange {
        OutcomeChange {
            outcome,
            date: Some(date),
            referred_to: None,
            referral_reason: None,
            cause_of_death: None,
            changed_by: "dr.rao".to_string(),
        }
    }

    #[test_case(Outcome::InProgress, Outcome::StepDown => true)]
    #[test_case(Outcome::InProgress, Outcome::Deceased => true)]
    #[test_case(Outcome::StepDown, Outcome::InProgress => true)]
    #[test_case(Outcome::StepDown, Outcome::Discharged => true)]
    #[test_case(Outcome::Discharged, Outcome::InProgress => false)]
    #[test_case(Outcome::Deceased, Outcome::Discharged => false)]
    #[test_case(Outcome::Referred, Outcome::StepDown => false)]
    #[test_case(Outcome::InProgress, Outcome::InProgress => false)]
    fn transitions(from: Outcome, to: Outcome) -> bool {
        from.can_transition_to(to)
    }

    #[test]
    fn step_down_sets_flag_date_and_origin() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();

        assert_eq!(patient.outcome, Outcome::StepDown);
        assert!(patient.is_step_down);
        assert_eq!(patient.step_down_date, Some(at(2024, 4, 5)));
        assert_eq!(patient.step_down_from, Some(Unit::Nicu));
        assert!(patient.release_date.is_none());
    }

    #[test]
    fn readmission_returns_to_original_unit() {
        let mut patient = admitted(Unit::Picu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();
        patient.unit = Unit::Hdu;

        apply_outcome(&mut patient, change(Outcome::InProgress, at(2024, 4, 7)), at(2024, 4, 7)).unwrap();

        assert_eq!(patient.outcome, Outcome::InProgress);
        assert_eq!(patient.unit, Unit::Picu);
        assert!(!patient.is_step_down);
        assert!(patient.readmitted_from_step_down);
        assert_eq!(patient.readmission_date, Some(at(2024, 4, 7)));
        assert_eq!(patient.step_down_date, Some(at(2024, 4, 5)));
    }

    #[test]
    fn step_down_then_discharge() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();
        apply_outcome(&mut patient, change(Outcome::Discharged, at(2024, 4, 9)), at(2024, 4, 9)).unwrap();

        assert_eq!(patient.outcome, Outcome::Discharged);
        assert_eq!(patient.release_date, Some(at(2024, 4, 9)));
        assert_eq!(patient.edit_history.len(), 3);
    }

    #[test]
    fn discharge_before_step_down_date_is_rejected() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();

        let err = apply_outcome(&mut patient, change(Outcome::Discharged, at(2024, 4, 3)), at(2024, 4, 6))
            .unwrap_err();
        assert_eq!(err, LifecycleError::DateOrder("release", "step-down date"));
        assert_eq!(patient.outcome, Outcome::StepDown);
    }

    #[test_case(Outcome::Discharged; "discharge")]
    #[test_case(Outcome::Deceased; "death")]
    #[test_case(Outcome::StepDown; "second step down")]
    fn outcome_before_readmission_is_rejected(outcome: Outcome) {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();
        readmit(&mut patient, "dr.iyer", Some(at(2024, 4, 10)), at(2024, 4, 10)).unwrap();

        let err = apply_outcome(&mut patient, change(outcome, at(2024, 4, 6)), at(2024, 4, 11)).unwrap_err();

        assert_eq!(err, LifecycleError::DateOrder("outcome", "readmission date"));
        assert_eq!(patient.outcome, Outcome::InProgress);
        assert!(patient.release_date.is_none());
    }

    #[test]
    fn discharge_after_readmission_is_accepted() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::StepDown, at(2024, 4, 5)), at(2024, 4, 5)).unwrap();
        readmit(&mut patient, "dr.iyer", Some(at(2024, 4, 10)), at(2024, 4, 10)).unwrap();

        apply_outcome(&mut patient, change(Outcome::Discharged, at(2024, 4, 12)), at(2024, 4, 12)).unwrap();
        assert_eq!(patient.release_date, Some(at(2024, 4, 12)));
    }

    #[test]
    fn actor_is_trimmed_in_history() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        let mut discharge = change(Outcome::Discharged, at(2024, 4, 3));
        discharge.changed_by = "  dr.rao ".to_string();

        apply_outcome(&mut patient, discharge, at(2024, 4, 3)).unwrap();

        assert_eq!(patient.last_edited_by, "dr.rao");
        assert_eq!(patient.edit_history.last().unwrap().by, "dr.rao");
    }

    #[test]
    fn terminal_outcomes_cannot_be_reopened() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        apply_outcome(&mut patient, change(Outcome::Deceased, at(2024, 4, 2)), at(2024, 4, 2)).unwrap();

        let err = apply_outcome(&mut patient, change(Outcome::InProgress, at(2024, 4, 3)), at(2024, 4, 3))
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: Outcome::Deceased,
                to: Outcome::InProgress
            }
        );
    }

    #[test]
    fn outcome_before_admission_is_rejected() {
        let mut patient = admitted(Unit::Sncu, at(2024, 4, 10));
        let err = apply_outcome(&mut patient, change(Outcome::Discharged, at(2024, 4, 9)), at(2024, 4, 10))
            .unwrap_err();
        assert_eq!(err, LifecycleError::DateOrder("outcome", "admission date"));
    }

    #[test]
    fn referral_requires_target() {
        let mut patient = admitted(Unit::Sncu, at(2024, 4, 1));
        let mut referral = change(Outcome::Referred, at(2024, 4, 2));
        referral.referred_to = Some("  ".to_string());
        assert_eq!(
            apply_outcome(&mut patient, referral.clone(), at(2024, 4, 2)),
            Err(LifecycleError::MissingReferralTarget)
        );

        referral.referred_to = Some("AIIMS NICU".to_string());
        referral.referral_reason = Some("needs surgery".to_string());
        apply_outcome(&mut patient, referral, at(2024, 4, 2)).unwrap();
        assert_eq!(patient.referred_to.as_deref(), Some("AIIMS NICU"));
        assert_eq!(patient.release_date, Some(at(2024, 4, 2)));
    }

    #[test]
    fn readmit_requires_step_down() {
        let mut patient = admitted(Unit::Nicu, at(2024, 4, 1));
        assert_eq!(
            readmit(&mut patient, "dr.rao", None, at(2024, 4, 2)),
            Err(LifecycleError::NotSteppedDown)
        );
    }
}
