//! Patient records and the clinical notes they own.

pub mod patient;
pub mod progress_note;

pub use patient::{
    AdmissionType, AgeUnit, Gender, NewPatient, Outcome, Patient, PatientUpdate, Unit,
    UnknownVariant,
};
pub use progress_note::{Examination, Medication, NewProgressNote, ProgressNote, SoapSections, Vitals};
