//! Rule-based screening of the latest recorded vitals against age bands.

use serde::Serialize;

use crate::models::{Patient, Vitals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalAlert {
    pub parameter: &'static str,
    pub value: f64,
    pub severity: AlertSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgeBand {
    Neonate,
    Infant,
    Child,
}

impl AgeBand {
    fn of(age_in_days: u32) -> Self {
        match age_in_days {
            0..=27 => AgeBand::Neonate,
            28..=364 => AgeBand::Infant,
            _ => AgeBand::Child,
        }
    }

    /// Normal heart rate range, beats per minute.
    fn heart_rate(&self) -> (f64, f64) {
        match self {
            AgeBand::Neonate => (100.0, 180.0),
            AgeBand::Infant => (90.0, 160.0),
            AgeBand::Child => (70.0, 130.0),
        }
    }

    /// Normal respiratory rate range, breaths per minute.
    fn respiratory_rate(&self) -> (f64, f64) {
        match self {
            AgeBand::Neonate => (30.0, 60.0),
            AgeBand::Infant => (25.0, 50.0),
            AgeBand::Child => (18.0, 30.0),
        }
    }

    fn min_spo2(&self) -> f64 {
        match self {
            AgeBand::Neonate => 90.0,
            _ => 92.0,
        }
    }
}

struct Screen<'a> {
    alerts: &'a mut Vec<VitalAlert>,
}

impl Screen<'_> {
    fn check_range(
        &mut self,
        parameter: &'static str,
        unit: &str,
        value: Option<f64>,
        (low, high): (f64, f64),
        critical_margin: f64,
    ) {
        let Some(value) = value else { return };
        let (direction, distance) = if value < low {
            ("Low", low - value)
        } else if value > high {
            ("High", value - high)
        } else {
            return;
        };
        let severity = if distance >= critical_margin {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        self.alerts.push(VitalAlert {
            parameter,
            value,
            severity,
            message: format!("{} {}: {} {}", direction, parameter, value, unit),
        });
    }
}

/// Flags abnormal readings in `vitals` for a patient of the given age.
pub fn screen_vitals(vitals: &Vitals, age_in_days: u32) -> Vec<VitalAlert> {
    let band = AgeBand::of(age_in_days);
    let mut alerts = Vec::new();
    let mut screen = Screen {
        alerts: &mut alerts,
    };

    screen.check_range("heart rate", "bpm", vitals.heart_rate, band.heart_rate(), 30.0);
    screen.check_range(
        "respiratory rate",
        "/min",
        vitals.respiratory_rate,
        band.respiratory_rate(),
        15.0,
    );
    screen.check_range("temperature", "°C", vitals.temperature_c, (36.0, 38.0), 1.5);
    screen.check_range("blood sugar", "mg/dL", vitals.blood_sugar, (45.0, 180.0), 20.0);

    if let Some(spo2) = vitals.spo2 {
        let min = band.min_spo2();
        if spo2 < min {
            alerts.push(VitalAlert {
                parameter: "SpO2",
                value: spo2,
                severity: if spo2 < 85.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                message: format!("Low oxygen saturation: {}%", spo2),
            });
        }
    }

    if let Some(crt) = vitals.crt_seconds {
        if crt > 3.0 {
            alerts.push(VitalAlert {
                parameter: "CRT",
                value: crt,
                severity: if crt > 5.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                },
                message: format!("Prolonged capillary refill: {} s", crt),
            });
        }
    }

    alerts
}

/// Screens the most recent vitals on the patient's chart.
pub fn screen_patient(patient: &Patient) -> Vec<VitalAlert> {
    patient
        .latest_vitals()
        .map(|v| screen_vitals(v, patient.age_in_days()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_neonate_has_no_alerts() {
        let vitals = Vitals {
            heart_rate: Some(140.0),
            respiratory_rate: Some(45.0),
            temperature_c: Some(36.8),
            spo2: Some(96.0),
            crt_seconds: Some(2.0),
            blood_sugar: Some(80.0),
            ..Vitals::default()
        };
        assert!(screen_vitals(&vitals, 3).is_empty());
    }

    #[test]
    fn neonatal_tachycardia_is_age_specific() {
        let vitals = Vitals {
            heart_rate: Some(170.0),
            ..Vitals::default()
        };
        assert!(screen_vitals(&vitals, 5).is_empty());

        let alerts = screen_vitals(&vitals, 4 * 365);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].parameter, "heart rate");
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].message, "High heart rate: 170 bpm");
    }

    #[test]
    fn hypothermia_and_hypoglycaemia() {
        let vitals = Vitals {
            temperature_c: Some(35.2),
            blood_sugar: Some(40.0),
            ..Vitals::default()
        };
        let alerts = screen_vitals(&vitals, 1);
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Warning));
    }

    #[test]
    fn spo2_threshold_depends_on_age() {
        let vitals = Vitals {
            spo2: Some(91.0),
            ..Vitals::default()
        };
        assert!(screen_vitals(&vitals, 2).is_empty());
        assert_eq!(screen_vitals(&vitals, 400).len(), 1);
    }

    #[test]
    fn prolonged_crt_is_critical_beyond_five_seconds() {
        let vitals = Vitals {
            crt_seconds: Some(6.0),
            ..Vitals::default()
        };
        let alerts = screen_vitals(&vitals, 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    }
}
