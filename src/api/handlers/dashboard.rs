use actix_web::{web, HttpResponse};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::error::Result;
use crate::api::handlers::{parse_filter, InstitutionQuery};
use crate::core::census::{census, CensusFilter, CensusReport};
use crate::core::charts::{chart_series, ChartSeries};
use crate::core::period::{Period, PeriodError, PeriodQuery};
use crate::db::PatientQuery;
use crate::models::Patient;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParams {
    pub institution: String,
    pub unit: Option<String>,
    pub admission_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub period: String,
    pub census: CensusReport,
    pub charts: ChartSeries,
}

/// Statistics and charts for one period; the current month when none is named.
pub fn build_dashboard(
    patients: &[Patient],
    period: Option<Period>,
    filter: &CensusFilter,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> std::result::Result<Dashboard, PeriodError> {
    let period = period.unwrap_or(Period::ThisMonth);
    let window = period.resolve(now, offset)?;

    Ok(Dashboard {
        period: period.label(),
        census: census(patients, &window, filter),
        charts: chart_series(patients, &window, filter, offset, now),
    })
}

#[instrument(skip(state))]
pub async fn dashboard(
    state: web::Data<AppState>,
    params: web::Query<DashboardParams>,
    period: web::Query<PeriodQuery>,
) -> Result<HttpResponse> {
    let institution = InstitutionQuery {
        institution: params.institution.clone(),
    };
    let filter = CensusFilter {
        unit: parse_filter(params.unit.as_deref())?,
        admission_type: parse_filter(params.admission_type.as_deref())?,
    };
    let period = period.period()?;

    let patients = state
        .store
        .list(institution.id()?, &PatientQuery::default())
        .await?;
    let dashboard = build_dashboard(
        &patients,
        period,
        &filter,
        state.config.ward.offset(),
        Utc::now(),
    )?;

    Ok(HttpResponse::Ok().json(dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::{apply_outcome, OutcomeChange};
    use crate::models::patient::fixtures::{admitted, at};
    use crate::models::{Outcome, Unit};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn defaults_to_the_current_month() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let patients = vec![admitted(Unit::Nicu, at(2024, 3, 2)), admitted(Unit::Nicu, at(2024, 2, 2))];

        let dashboard =
            build_dashboard(&patients, None, &CensusFilter::default(), offset, at(2024, 3, 20)).unwrap();

        assert_eq!(dashboard.period, Period::ThisMonth.label());
        assert_eq!(dashboard.census.admissions, 1);
        // The February admission is still In Progress, so it is active in March.
        assert_eq!(dashboard.census.active, 2);
    }

    #[test]
    fn unit_filter_narrows_both_census_and_charts() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let mut died = admitted(Unit::Picu, at(2024, 3, 2));
        apply_outcome(
            &mut died,
            OutcomeChange {
                outcome: Outcome::Deceased,
                date: Some(at(2024, 3, 4)),
                referred_to: None,
                referral_reason: None,
                cause_of_death: Some("Septic shock".to_string()),
                changed_by: "dr.rao".to_string(),
            },
            at(2024, 3, 4),
        )
        .unwrap();
        let patients = vec![died, admitted(Unit::Nicu, at(2024, 3, 3))];
        let filter = CensusFilter {
            unit: Some(Unit::Picu),
            ..CensusFilter::default()
        };
        let period = Period::custom(date(2024, 3, 1), date(2024, 3, 31)).unwrap();

        let dashboard = build_dashboard(&patients, Some(period), &filter, offset, at(2024, 4, 1)).unwrap();

        assert_eq!(dashboard.census.active, 1);
        assert_eq!(dashboard.census.deceased, 1);
        assert_eq!(dashboard.census.mortality_rate, 100.0);
        let admitted_total: usize = dashboard.charts.trend.iter().map(|p| p.admissions).sum();
        assert_eq!(admitted_total, 1);
    }
}
