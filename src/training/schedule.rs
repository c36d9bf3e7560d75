//! Schedule resolution for new training periods.
//!
//! Continuity wins: once a teacher has trained provider-led on some
//! schedule, every later provider-led period continues that identifier,
//! across school moves, school-led gaps, and contract years. Only a
//! teacher's first-ever provider-led period computes a schedule from the
//! calendar.

use std::cmp;

use chrono::NaiveDate;

use super::calendar::{contract_year, schedule_month_bucket, standard_identifier};
use super::domain::{Schedule, TraineePeriod, TrainingProgramme};
use super::store::TrainingStore;

/// A provider-led period cannot exist without a schedule, so a missing row
/// for the computed year/identifier is fatal to the operation that asked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no schedule {identifier} registered for contract year {contract_year}")]
pub struct ScheduleNotFound {
    pub contract_year: i32,
    pub identifier: String,
}

pub struct ScheduleResolver<'a> {
    store: &'a TrainingStore,
}

impl<'a> ScheduleResolver<'a> {
    pub fn new(store: &'a TrainingStore) -> Self {
        Self { store }
    }

    /// The schedule for a new training period, or `None` for school-led
    /// training.
    pub fn resolve(
        &self,
        trainee: &TraineePeriod,
        programme: TrainingProgramme,
        started_on: NaiveDate,
        today: NaiveDate,
    ) -> Result<Option<Schedule>, ScheduleNotFound> {
        match programme {
            TrainingProgramme::SchoolLed => Ok(None),
            TrainingProgramme::ProviderLed => self
                .resolve_provider_led(trainee, started_on, today)
                .map(Some),
        }
    }

    pub fn resolve_provider_led(
        &self,
        trainee: &TraineePeriod,
        started_on: NaiveDate,
        today: NaiveDate,
    ) -> Result<Schedule, ScheduleNotFound> {
        let history = self.store.provider_led_history(trainee.teacher());
        if let Some(previous) = history.iter().find_map(|period| period.schedule) {
            if let Some(schedule) = self.store.schedule(previous) {
                tracing::debug!(
                    teacher = trainee.teacher().0,
                    identifier = %schedule.identifier,
                    "continuing schedule from previous provider-led training"
                );
                return Ok(schedule);
            }
        }

        let pivot = cmp::max(started_on, today);
        let year = contract_year(pivot);
        let identifier = standard_identifier(schedule_month_bucket(pivot));
        self.store
            .schedule_by_identifier(year, &identifier)
            .ok_or(ScheduleNotFound {
                contract_year: year,
                identifier,
            })
    }
}
