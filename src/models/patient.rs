use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::audit::{self, EditAction, EditEntry};
use crate::core::lifecycle::LifecycleError;
use crate::models::progress_note::{ProgressNote, Vitals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "NICU")]
    Nicu,
    #[serde(rename = "PICU")]
    Picu,
    #[serde(rename = "SNCU")]
    Sncu,
    #[serde(rename = "HDU")]
    Hdu,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::Nicu, Unit::Picu, Unit::Sncu, Unit::Hdu];

    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Nicu => "NICU",
            Unit::Picu => "PICU",
            Unit::Sncu => "SNCU",
            Unit::Hdu => "HDU",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Step Down")]
    StepDown,
    Discharged,
    Referred,
    Deceased,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::InProgress,
        Outcome::StepDown,
        Outcome::Discharged,
        Outcome::Referred,
        Outcome::Deceased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::InProgress => "In Progress",
            Outcome::StepDown => "Step Down",
            Outcome::Discharged => "Discharged",
            Outcome::Referred => "Referred",
            Outcome::Deceased => "Deceased",
        }
    }

    /// Discharged, Referred and Deceased close the admission for good.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Outcome::Discharged | Outcome::Referred | Outcome::Deceased
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionType {
    Inborn,
    Outborn,
    Emergency,
    Elective,
    #[serde(rename = "Referred In")]
    ReferredIn,
}

impl AdmissionType {
    pub const ALL: [AdmissionType; 5] = [
        AdmissionType::Inborn,
        AdmissionType::Outborn,
        AdmissionType::Emergency,
        AdmissionType::Elective,
        AdmissionType::ReferredIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionType::Inborn => "Inborn",
            AdmissionType::Outborn => "Outborn",
            AdmissionType::Emergency => "Emergency",
            AdmissionType::Elective => "Elective",
            AdmissionType::ReferredIn => "Referred In",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Ambiguous,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Ambiguous];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Ambiguous => "Ambiguous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl AgeUnit {
    pub const ALL: [AgeUnit; 4] = [AgeUnit::Days, AgeUnit::Weeks, AgeUnit::Months, AgeUnit::Years];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeUnit::Days => "days",
            AgeUnit::Weeks => "weeks",
            AgeUnit::Months => "months",
            AgeUnit::Years => "years",
        }
    }
}

macro_rules! impl_enum_text {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            /// Accepts the display form as well as snake_case, ignoring case.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = normalize(s);
                <$ty>::ALL
                    .iter()
                    .copied()
                    .find(|v| normalize(v.as_str()) == wanted)
                    .ok_or_else(|| UnknownVariant {
                        kind: stringify!($ty),
                        value: s.to_string(),
                    })
            }
        }
    };
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl_enum_text!(Unit);
impl_enum_text!(Outcome);
impl_enum_text!(AdmissionType);
impl_enum_text!(Gender);

impl_enum_text!(AgeUnit);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub institution_id: String,
    pub name: String,
    pub age: u32,
    pub age_unit: AgeUnit,
    pub gender: Gender,
    pub unit: Unit,
    pub admission_type: AdmissionType,
    pub diagnosis: String,
    pub weight_kg: Option<f64>,
    pub birth_weight_kg: Option<f64>,
    pub mother_name: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,

    pub admission_date: DateTime<Utc>,
    pub outcome: Outcome,
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_step_down: bool,
    pub step_down_date: Option<DateTime<Utc>>,
    pub step_down_from: Option<Unit>,
    #[serde(default)]
    pub readmitted_from_step_down: bool,
    pub readmission_date: Option<DateTime<Utc>>,
    pub referred_to: Option<String>,
    pub referral_reason: Option<String>,
    pub cause_of_death: Option<String>,

    #[serde(default)]
    pub progress_notes: Vec<ProgressNote>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub last_edited_by: String,
    pub last_edited_at: DateTime<Utc>,
    #[serde(default)]
    pub edit_history: Vec<EditEntry>,
}

impl Patient {
    /// Builds a fresh admission; the outcome always starts as In Progress.
    pub fn admit(new: NewPatient, now: DateTime<Utc>) -> Self {
        let admission_date = new.admission_date.unwrap_or(now);
        let actor = new.created_by.trim().to_string();
        let mut patient = Patient {
            id: Uuid::new_v4(),
            institution_id: new.institution_id,
            name: new.name.trim().to_string(),
            age: new.age,
            age_unit: new.age_unit,
            gender: new.gender,
            unit: new.unit,
            admission_type: new.admission_type,
            diagnosis: new.diagnosis.trim().to_string(),
            weight_kg: new.weight_kg,
            birth_weight_kg: new.birth_weight_kg,
            mother_name: new.mother_name,
            contact: new.contact,
            address: new.address,
            admission_date,
            outcome: Outcome::InProgress,
            release_date: None,
            is_step_down: false,
            step_down_date: None,
            step_down_from: None,
            readmitted_from_step_down: false,
            readmission_date: None,
            referred_to: None,
            referral_reason: None,
            cause_of_death: None,
            progress_notes: Vec::new(),
            created_by: actor.clone(),
            created_at: now,
            last_edited_by: actor.clone(),
            last_edited_at: now,
            edit_history: Vec::new(),
        };
        let summary = format!("admitted to {} ({})", patient.unit, patient.admission_type);
        patient.touch(&actor, EditAction::Created, summary, now);
        patient
    }

    /// Records an edit: bumps the audit fields and extends the history chain.
    pub fn touch(
        &mut self,
        actor: &str,
        action: EditAction,
        summary: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.last_edited_by = actor.to_string();
        self.last_edited_at = at;
        audit::record(&mut self.edit_history, actor, action, summary, at);
    }

    /// Age normalised to days, with calendar units approximated.
    pub fn age_in_days(&self) -> u32 {
        match self.age_unit {
            AgeUnit::Days => self.age,
            AgeUnit::Weeks => self.age.saturating_mul(7),
            AgeUnit::Months => self.age.saturating_mul(30),
            AgeUnit::Years => self.age.saturating_mul(365),
        }
    }

    pub fn age_label(&self) -> String {
        format!("{} {}", self.age, self.age_unit)
    }

    /// Whole days between admission and `until` (or the unit exit, whichever is earlier).
    pub fn days_admitted(&self, until: DateTime<Utc>) -> i64 {
        let end = crate::core::census::unit_exit(self)
            .map_or(until, |exit| exit.min(until));
        (end - self.admission_date).num_days().max(0)
    }

    /// Notes sorted newest first.
    pub fn recent_notes(&self, limit: usize) -> Vec<&ProgressNote> {
        let mut notes: Vec<&ProgressNote> = self.progress_notes.iter().collect();
        notes.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        notes.truncate(limit);
        notes
    }

    pub fn latest_vitals(&self) -> Option<&Vitals> {
        self.progress_notes
            .iter()
            .filter(|n| n.vitals.is_some())
            .max_by_key(|n| n.recorded_at)
            .and_then(|n| n.vitals.as_ref())
    }

    pub fn add_note(&mut self, note: ProgressNote, now: DateTime<Utc>) -> &ProgressNote {
        let author = note.author.clone();
        let summary = format!("progress note {} added", note.id);
        self.progress_notes.push(note);
        self.touch(&author, EditAction::NoteAdded, summary, now);
        &self.progress_notes[self.progress_notes.len() - 1]
    }

    /// Applies the present fields of `update`; returns the names of changed fields.
    ///
    /// A new admission date may not fall after any recorded lifecycle date.
    pub fn apply_update(
        &mut self,
        update: PatientUpdate,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<&'static str>, LifecycleError> {
        if let Some(admission) = update.admission_date {
            let later = [
                (self.step_down_date, "step-down"),
                (self.readmission_date, "readmission"),
                (self.release_date, "release"),
            ];
            if let Some((_, what)) = later
                .iter()
                .find(|(date, _)| date.map_or(false, |d| d < admission))
            {
                return Err(LifecycleError::DateOrder(*what, "admission date"));
            }
        }

        let mut changed = Vec::new();

        macro_rules! set {
            ($field:ident) => {
                if let Some(value) = update.$field {
                    if self.$field != value {
                        self.$field = value;
                        changed.push(stringify!($field));
                    }
                }
            };
            ($field:ident, optional) => {
                if let Some(value) = update.$field {
                    if self.$field.as_ref() != Some(&value) {
                        self.$field = Some(value);
                        changed.push(stringify!($field));
                    }
                }
            };
        }

        set!(name);
        set!(age);
        set!(age_unit);
        set!(gender);
        set!(unit);
        set!(admission_type);
        set!(diagnosis);
        set!(admission_date);
        set!(weight_kg, optional);
        set!(birth_weight_kg, optional);
        set!(mother_name, optional);
        set!(contact, optional);
        set!(address, optional);

        if !changed.is_empty() {
            let summary = format!("updated {}", changed.join(", "));
            self.touch(actor, EditAction::Updated, summary, now);
        }
        Ok(changed)
    }
}

/// Request body for admitting a patient.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    #[validate(length(min = 1, max = 64))]
    pub institution_id: String,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(range(max = 130))]
    pub age: u32,
    pub age_unit: AgeUnit,
    pub gender: Gender,
    pub unit: Unit,
    pub admission_type: AdmissionType,
    #[validate(length(min = 1, max = 500))]
    pub diagnosis: String,
    #[validate(range(min = 0.2, max = 200.0))]
    pub weight_kg: Option<f64>,
    #[validate(range(min = 0.2, max = 7.0))]
    pub birth_weight_kg: Option<f64>,
    pub mother_name: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    /// Defaults to the time the request is received.
    pub admission_date: Option<DateTime<Utc>>,
    #[validate(length(min = 1))]
    pub created_by: String,
}

/// Partial edit of demographic and clinical fields.
///
/// Lifecycle fields are deliberately absent; they change through
/// [`crate::core::lifecycle`] only.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(range(max = 130))]
    pub age: Option<u32>,
    pub age_unit: Option<AgeUnit>,
    pub gender: Option<Gender>,
    pub unit: Option<Unit>,
    pub admission_type: Option<AdmissionType>,
    #[validate(length(min = 1, max = 500))]
    pub diagnosis: Option<String>,
    pub admission_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0.2, max = 200.0))]
    pub weight_kg: Option<f64>,
    #[validate(range(min = 0.2, max = 7.0))]
    pub birth_weight_kg: Option<f64>,
    pub mother_name: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub edited_by: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::models::progress_note::NewProgressNote;

    #[test]
    fn admit_starts_in_progress_with_created_entry() {
        let now = at(2024, 5, 2);
        let patient = Patient::admit(new_patient(Unit::Nicu, AdmissionType::Inborn), now);

        assert_eq!(patient.outcome, Outcome::InProgress);
        assert_eq!(patient.admission_date, now);
        assert_eq!(patient.edit_history.len(), 1);
        assert_eq!(patient.edit_history[0].action, EditAction::Created);
        assert_eq!(patient.edit_history[0].summary, "admitted to NICU (Inborn)");
    }

    #[test]
    fn enum_text_parses_display_and_snake_case() {
        assert_eq!("In Progress".parse::<Outcome>(), Ok(Outcome::InProgress));
        assert_eq!("step_down".parse::<Outcome>(), Ok(Outcome::StepDown));
        assert_eq!("picu".parse::<Unit>(), Ok(Unit::Picu));
        assert_eq!("referred_in".parse::<AdmissionType>(), Ok(AdmissionType::ReferredIn));
        assert!("ward 7".parse::<Unit>().is_err());
    }

    #[test]
    fn outcome_serializes_with_spaces() {
        let json = serde_json::to_string(&Outcome::StepDown).unwrap();
        assert_eq!(json, "\"Step Down\"");
    }

    #[test]
    fn age_in_days_normalises_units() {
        let mut patient = admitted(Unit::Picu, at(2024, 1, 1));
        patient.age = 3;
        patient.age_unit = AgeUnit::Weeks;
        assert_eq!(patient.age_in_days(), 21);
        patient.age_unit = AgeUnit::Years;
        assert_eq!(patient.age_in_days(), 1095);
    }

    #[test]
    fn apply_update_reports_only_changed_fields() {
        let mut patient = admitted(Unit::Nicu, at(2024, 1, 1));
        let update = PatientUpdate {
            diagnosis: Some("Late onset sepsis".to_string()),
            unit: Some(Unit::Nicu),
            weight_kg: Some(2.1),
            ..PatientUpdate::default()
        };

        let changed = patient.apply_update(update, "dr.iyer", at(2024, 1, 3)).unwrap();

        assert_eq!(changed, vec!["diagnosis", "weight_kg"]);
        assert_eq!(patient.last_edited_by, "dr.iyer");
        assert_eq!(patient.edit_history.last().unwrap().summary, "updated diagnosis, weight_kg");
    }

    #[test]
    fn no_op_update_leaves_history_alone() {
        let mut patient = admitted(Unit::Nicu, at(2024, 1, 1));
        let changed = patient
            .apply_update(PatientUpdate::default(), "dr.iyer", at(2024, 1, 3))
            .unwrap();
        assert!(changed.is_empty());
        assert_eq!(patient.edit_history.len(), 1);
    }

    #[test]
    fn admission_date_cannot_move_past_release() {
        let mut patient = admitted(Unit::Nicu, at(2024, 3, 1));
        patient.outcome = Outcome::Discharged;
        patient.release_date = Some(at(2024, 3, 4));
        let update = PatientUpdate {
            admission_date: Some(at(2024, 3, 20)),
            ..PatientUpdate::default()
        };

        let err = patient.apply_update(update, "dr.iyer", at(2024, 3, 21)).unwrap_err();

        assert_eq!(err, LifecycleError::DateOrder("release", "admission date"));
        assert_eq!(patient.admission_date, at(2024, 3, 1));
        assert_eq!(patient.edit_history.len(), 1);
    }

    #[test]
    fn admission_date_cannot_move_past_step_down() {
        let mut patient = admitted(Unit::Picu, at(2024, 3, 1));
        patient.step_down_date = Some(at(2024, 3, 5));
        let later = PatientUpdate {
            admission_date: Some(at(2024, 3, 6)),
            ..PatientUpdate::default()
        };
        assert_eq!(
            patient.apply_update(later, "dr.iyer", at(2024, 3, 7)),
            Err(LifecycleError::DateOrder("step-down", "admission date"))
        );

        let earlier = PatientUpdate {
            admission_date: Some(at(2024, 2, 28)),
            ..PatientUpdate::default()
        };
        let changed = patient.apply_update(earlier, "dr.iyer", at(2024, 3, 7)).unwrap();
        assert_eq!(changed, vec!["admission_date"]);
    }

    #[test]
    fn latest_vitals_comes_from_newest_note_with_vitals() {
        let mut patient = admitted(Unit::Nicu, at(2024, 1, 1));
        let note = |hr: f64, day: u32| NewProgressNote {
            author: "sr.anita".to_string(),
            recorded_at: Some(at(2024, 1, day)),
            note: "round".to_string(),
            soap: None,
            vitals: Some(Vitals {
                heart_rate: Some(hr),
                ..Vitals::default()
            }),
            examination: None,
            medications: vec![],
        };
        patient.add_note(note(170.0, 3).into_note(at(2024, 1, 3)), at(2024, 1, 3));
        patient.add_note(note(140.0, 2).into_note(at(2024, 1, 3)), at(2024, 1, 3));

        assert_eq!(patient.latest_vitals().and_then(|v| v.heart_rate), Some(170.0));
        assert_eq!(patient.recent_notes(1)[0].recorded_at, at(2024, 1, 3));
        assert_eq!(patient.edit_history.len(), 3);
    }
}
