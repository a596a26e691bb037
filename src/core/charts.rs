//! Series backing the dashboard charts.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;

use crate::core::census::{active_during, unit_exit, CensusFilter};
use crate::core::period::TimeWindow;
use crate::models::{AdmissionType, Gender, Outcome, Patient, Unit};

const TOP_DIAGNOSES: usize = 10;
const DAILY_BUCKET_LIMIT_DAYS: i64 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub label: String,
    pub admissions: usize,
    pub discharges: usize,
    pub deaths: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub granularity: Granularity,
    pub trend: Vec<TrendPoint>,
    pub outcomes: Vec<Slice>,
    pub units: Vec<Slice>,
    pub admission_types: Vec<Slice>,
    pub genders: Vec<Slice>,
    pub age_groups: Vec<Slice>,
    pub top_diagnoses: Vec<Slice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeGroup {
    Neonate,
    Infant,
    Child,
    Older,
}

impl AgeGroup {
    const ALL: [AgeGroup; 4] = [AgeGroup::Neonate, AgeGroup::Infant, AgeGroup::Child, AgeGroup::Older];

    pub fn of(patient: &Patient) -> Self {
        match patient.age_in_days() {
            0..=27 => AgeGroup::Neonate,
            28..=364 => AgeGroup::Infant,
            365..=1825 => AgeGroup::Child,
            _ => AgeGroup::Older,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AgeGroup::Neonate => "Neonate (<28 days)",
            AgeGroup::Infant => "Infant (<1 year)",
            AgeGroup::Child => "Child (1-5 years)",
            AgeGroup::Older => "Older (>5 years)",
        }
    }
}

pub fn granularity_for(window: &TimeWindow) -> Granularity {
    match window.span_days() {
        Some(days) if days <= DAILY_BUCKET_LIMIT_DAYS => Granularity::Day,
        _ => Granularity::Month,
    }
}

fn bucket_key(at: DateTime<Utc>, offset: FixedOffset, granularity: Granularity) -> NaiveDate {
    let day = at.with_timezone(&offset).date_naive();
    match granularity {
        Granularity::Day => day,
        Granularity::Month => day.with_day(1).unwrap_or(day),
    }
}

fn next_key(key: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Day => key.succ_opt(),
        Granularity::Month => key.checked_add_months(chrono::Months::new(1)),
    }
}

fn label(key: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => key.format("%Y-%m-%d").to_string(),
        Granularity::Month => key.format("%Y-%m").to_string(),
    }
}

/// Admissions, discharges and deaths per bucket, with empty buckets kept.
///
/// An open window starts at the earliest matching admission and ends at `now`.
pub fn trend(
    patients: &[Patient],
    window: &TimeWindow,
    filter: &CensusFilter,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> (Granularity, Vec<TrendPoint>) {
    let granularity = granularity_for(window);
    let matching: Vec<&Patient> = patients.iter().filter(|p| filter.matches(p)).collect();

    let Some(start) = window
        .start
        .or_else(|| matching.iter().map(|p| p.admission_date).min())
    else {
        return (granularity, Vec::new());
    };
    let end = window.end.unwrap_or(now);
    if end <= start {
        return (granularity, Vec::new());
    }

    let mut buckets: BTreeMap<NaiveDate, TrendPoint> = BTreeMap::new();
    let last = bucket_key(end - Duration::seconds(1), offset, granularity);
    let mut key = bucket_key(start, offset, granularity);
    while key <= last {
        buckets.insert(
            key,
            TrendPoint {
                label: label(key, granularity),
                admissions: 0,
                discharges: 0,
                deaths: 0,
            },
        );
        match next_key(key, granularity) {
            Some(next) => key = next,
            None => break,
        }
    }

    let bounded = TimeWindow {
        start: Some(start),
        end: Some(end),
    };
    let mut bump = |at: DateTime<Utc>, f: fn(&mut TrendPoint)| {
        if bounded.contains(at) {
            if let Some(point) = buckets.get_mut(&bucket_key(at, offset, granularity)) {
                f(point);
            }
        }
    };

    for patient in matching {
        bump(patient.admission_date, |p| p.admissions += 1);
        if let Some(exit) = unit_exit(patient) {
            match patient.outcome {
                Outcome::Discharged => bump(exit, |p| p.discharges += 1),
                Outcome::Deceased => bump(exit, |p| p.deaths += 1),
                _ => {}
            }
        }
    }

    (granularity, buckets.into_values().collect())
}

fn slices<K, I>(categories: I, counts: &HashMap<K, usize>) -> Vec<Slice>
where
    K: std::hash::Hash + Eq + Copy,
    I: IntoIterator<Item = (K, &'static str)>,
{
    categories
        .into_iter()
        .map(|(key, label)| Slice {
            label: label.to_string(),
            count: counts.get(&key).copied().unwrap_or(0),
        })
        .collect()
}

fn normalize_diagnosis(diagnosis: &str) -> String {
    diagnosis
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Most frequent diagnoses; labels keep the first spelling seen.
pub fn top_diagnoses<'a>(patients: impl IntoIterator<Item = &'a Patient>, limit: usize) -> Vec<Slice> {
    let mut counts: HashMap<String, (String, usize)> = HashMap::new();
    for patient in patients {
        let key = normalize_diagnosis(&patient.diagnosis);
        if key.is_empty() {
            continue;
        }
        counts
            .entry(key)
            .or_insert_with(|| (patient.diagnosis.split_whitespace().collect::<Vec<_>>().join(" "), 0))
            .1 += 1;
    }

    let mut ranked: Vec<Slice> = counts
        .into_values()
        .map(|(label, count)| Slice { label, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked.truncate(limit);
    ranked
}

/// Every chart over the patients active during `window`.
pub fn chart_series(
    patients: &[Patient],
    window: &TimeWindow,
    filter: &CensusFilter,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> ChartSeries {
    let (granularity, trend) = trend(patients, window, filter, offset, now);

    let mut outcomes: HashMap<Outcome, usize> = HashMap::new();
    let mut units: HashMap<Unit, usize> = HashMap::new();
    let mut admission_types: HashMap<AdmissionType, usize> = HashMap::new();
    let mut genders: HashMap<Gender, usize> = HashMap::new();
    let mut age_groups: HashMap<AgeGroup, usize> = HashMap::new();
    let mut active = Vec::new();

    for patient in active_during(patients, window, filter) {
        *outcomes.entry(patient.outcome).or_default() += 1;
        *units.entry(patient.unit).or_default() += 1;
        *admission_types.entry(patient.admission_type).or_default() += 1;
        *genders.entry(patient.gender).or_default() += 1;
        *age_groups.entry(AgeGroup::of(patient)).or_default() += 1;
        active.push(patient);
    }

    ChartSeries {
        granularity,
        trend,
        outcomes: slices(Outcome::ALL.map(|o| (o, o.as_str())), &outcomes),
        units: slices(Unit::ALL.map(|u| (u, u.as_str())), &units),
        admission_types: slices(AdmissionType::ALL.map(|t| (t, t.as_str())), &admission_types),
        genders: slices(Gender::ALL.map(|g| (g, g.as_str())), &genders),
        age_groups: slices(AgeGroup::ALL.map(|a| (a, a.label())), &age_groups),
        top_diagnoses: top_diagnoses(active, TOP_DIAGNOSES),
    }
}
