//! Persisted state for the engine: trainee periods, training periods, and
//! the commercial/schedule reference tables, behind an in-memory relational
//! substrate with atomic batched writes.
//!
//! All lifecycle writes go through [`TrainingStore::apply`], which validates
//! a whole batch against a snapshot and commits it all-or-nothing. The
//! temporal-exclusion constraint on training period ranges per trainee
//! period is enforced there and is the backstop correctness guarantee: a
//! batch that would produce overlapping ranges fails and leaves prior state
//! intact, which also makes it the losing side of two racing writers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;

use super::domain::{
    ActiveLeadProvider, ActiveLeadProviderId, ContractPeriod, DeferralReason, DeliveryPartnerId,
    LeadProviderId, Placement, ProviderPartnership, ProviderPartnershipId, Schedule, ScheduleId,
    SchoolId, SchoolPartnership, SchoolPartnershipId, TeacherId, TraineePeriod, TraineePeriodId,
    TrainingPeriod, TrainingPeriodId, TrainingProgramme, WithdrawalReason,
};

/// Failures surfaced by the persistence layer. Everything here aborts the
/// batch that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown trainee period {0:?}")]
    UnknownTraineePeriod(TraineePeriodId),
    #[error("unknown training period {0:?}")]
    UnknownTrainingPeriod(TrainingPeriodId),
    #[error("unknown schedule {0:?}")]
    UnknownSchedule(ScheduleId),
    #[error("unknown school partnership {0:?}")]
    UnknownSchoolPartnership(SchoolPartnershipId),
    #[error("unknown active lead provider {0:?}")]
    UnknownActiveLeadProvider(ActiveLeadProviderId),
    #[error("unknown provider partnership {0:?}")]
    UnknownProviderPartnership(ProviderPartnershipId),
    #[error("no contract period registered for year {0}")]
    UnknownContractYear(i32),
    #[error("training period range finishes before it starts ({started_on} > {finished_on})")]
    InvalidRange {
        started_on: NaiveDate,
        finished_on: NaiveDate,
    },
    #[error("training period ranges overlap for trainee period {trainee_period:?}")]
    OverlappingPeriods { trainee_period: TraineePeriodId },
    #[error("a training period cannot hold both a partnership and an expression of interest")]
    PartnershipInterestConflict,
    #[error("write batch produced no row where one was expected")]
    MissingWrite,
}

/// Fields for a training period row about to be inserted. Ids and pause
/// timestamps are owned by the store.
#[derive(Debug, Clone)]
pub struct NewTrainingPeriod {
    pub trainee_period: TraineePeriodId,
    pub started_on: NaiveDate,
    pub finished_on: Option<NaiveDate>,
    pub programme: TrainingProgramme,
    pub schedule: Option<ScheduleId>,
    pub school_partnership: Option<SchoolPartnershipId>,
    pub expression_of_interest: Option<ActiveLeadProviderId>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewSchoolPartnership {
    pub school: SchoolId,
    pub provider_partnership: ProviderPartnershipId,
    pub created_on: NaiveDate,
}

/// One write within an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    InsertPeriod(NewTrainingPeriod),
    /// Insert a partnership and a period pointing at it in one op, so a
    /// revived partnership never outlives a failed period write. The
    /// period must arrive with no attachment of its own.
    InsertPeriodWithPartnership {
        partnership: NewSchoolPartnership,
        period: NewTrainingPeriod,
    },
    ClosePeriod {
        id: TrainingPeriodId,
        finished_on: NaiveDate,
    },
    MarkDeferred {
        id: TrainingPeriodId,
        deferred_at: NaiveDate,
        reason: DeferralReason,
    },
    MarkWithdrawn {
        id: TrainingPeriodId,
        withdrawn_at: NaiveDate,
        reason: WithdrawalReason,
    },
    DestroyPeriod {
        id: TrainingPeriodId,
    },
}

/// Rows created by a committed batch, in op order.
#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    pub periods: Vec<TrainingPeriod>,
    pub partnerships: Vec<SchoolPartnership>,
}

impl BatchOutcome {
    pub fn into_sole_period(self) -> Result<TrainingPeriod, StoreError> {
        self.periods.into_iter().next().ok_or(StoreError::MissingWrite)
    }
}

/// A confirmed partnership joined out to the provider and year it belongs to,
/// the shape the matcher filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartnershipLink {
    pub partnership: SchoolPartnership,
    pub lead_provider: LeadProviderId,
    pub delivery_partner: DeliveryPartnerId,
    pub contract_year: i32,
}

#[derive(Debug, Default, Clone)]
struct StoreState {
    next_id: u64,
    trainee_periods: BTreeMap<TraineePeriodId, TraineePeriod>,
    training_periods: BTreeMap<TrainingPeriodId, TrainingPeriod>,
    contract_periods: BTreeMap<i32, ContractPeriod>,
    schedules: BTreeMap<ScheduleId, Schedule>,
    active_lead_providers: BTreeMap<ActiveLeadProviderId, ActiveLeadProvider>,
    provider_partnerships: BTreeMap<ProviderPartnershipId, ProviderPartnership>,
    school_partnerships: BTreeMap<SchoolPartnershipId, SchoolPartnership>,
}

impl StoreState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn link(&self, partnership: &SchoolPartnership) -> Option<PartnershipLink> {
        let provider_partnership = self
            .provider_partnerships
            .get(&partnership.provider_partnership)?;
        let active = self
            .active_lead_providers
            .get(&provider_partnership.active_lead_provider)?;
        Some(PartnershipLink {
            partnership: *partnership,
            lead_provider: active.lead_provider,
            delivery_partner: provider_partnership.delivery_partner,
            contract_year: active.contract_year,
        })
    }
}

/// In-memory relational store. Seed methods stand in for the onboarding
/// collaborators that own the reference tables; lifecycle writes arrive as
/// atomic batches via [`TrainingStore::apply`].
#[derive(Debug, Default)]
pub struct TrainingStore {
    state: Mutex<StoreState>,
}

impl TrainingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- seeding -----------------------------------------------------------

    pub fn add_contract_period(
        &self,
        year: i32,
        started_on: NaiveDate,
        finished_on: NaiveDate,
        enabled: bool,
    ) -> ContractPeriod {
        let mut state = self.lock();
        let period = ContractPeriod {
            year,
            started_on,
            finished_on,
            enabled,
        };
        state.contract_periods.insert(year, period.clone());
        period
    }

    pub fn add_schedule(&self, contract_year: i32, identifier: &str) -> Result<Schedule, StoreError> {
        let mut state = self.lock();
        if !state.contract_periods.contains_key(&contract_year) {
            return Err(StoreError::UnknownContractYear(contract_year));
        }
        let id = ScheduleId(state.allocate());
        let schedule = Schedule {
            id,
            contract_year,
            identifier: identifier.to_string(),
        };
        state.schedules.insert(id, schedule.clone());
        Ok(schedule)
    }

    pub fn add_active_lead_provider(
        &self,
        lead_provider: LeadProviderId,
        contract_year: i32,
    ) -> Result<ActiveLeadProvider, StoreError> {
        let mut state = self.lock();
        if !state.contract_periods.contains_key(&contract_year) {
            return Err(StoreError::UnknownContractYear(contract_year));
        }
        let id = ActiveLeadProviderId(state.allocate());
        let active = ActiveLeadProvider {
            id,
            lead_provider,
            contract_year,
        };
        state.active_lead_providers.insert(id, active);
        Ok(active)
    }

    pub fn add_provider_partnership(
        &self,
        active_lead_provider: ActiveLeadProviderId,
        delivery_partner: DeliveryPartnerId,
    ) -> Result<ProviderPartnership, StoreError> {
        let mut state = self.lock();
        if !state.active_lead_providers.contains_key(&active_lead_provider) {
            return Err(StoreError::UnknownActiveLeadProvider(active_lead_provider));
        }
        let id = ProviderPartnershipId(state.allocate());
        let pairing = ProviderPartnership {
            id,
            active_lead_provider,
            delivery_partner,
        };
        state.provider_partnerships.insert(id, pairing);
        Ok(pairing)
    }

    pub fn add_school_partnership(
        &self,
        school: SchoolId,
        provider_partnership: ProviderPartnershipId,
        created_on: NaiveDate,
    ) -> Result<SchoolPartnership, StoreError> {
        let mut state = self.lock();
        if !state.provider_partnerships.contains_key(&provider_partnership) {
            return Err(StoreError::UnknownProviderPartnership(provider_partnership));
        }
        let id = SchoolPartnershipId(state.allocate());
        let partnership = SchoolPartnership {
            id,
            school,
            provider_partnership,
            created_on,
        };
        state.school_partnerships.insert(id, partnership);
        Ok(partnership)
    }

    pub fn add_ect_period(
        &self,
        teacher: TeacherId,
        school: SchoolId,
        started_on: NaiveDate,
        finished_on: Option<NaiveDate>,
    ) -> TraineePeriod {
        self.add_trainee_period(teacher, school, started_on, finished_on, false)
    }

    pub fn add_mentor_period(
        &self,
        teacher: TeacherId,
        school: SchoolId,
        started_on: NaiveDate,
        finished_on: Option<NaiveDate>,
    ) -> TraineePeriod {
        self.add_trainee_period(teacher, school, started_on, finished_on, true)
    }

    fn add_trainee_period(
        &self,
        teacher: TeacherId,
        school: SchoolId,
        started_on: NaiveDate,
        finished_on: Option<NaiveDate>,
        mentor: bool,
    ) -> TraineePeriod {
        let mut state = self.lock();
        let placement = Placement {
            id: TraineePeriodId(state.allocate()),
            teacher,
            school,
            started_on,
            finished_on,
        };
        let period = if mentor {
            TraineePeriod::Mentor(placement)
        } else {
            TraineePeriod::Ect(placement)
        };
        state.trainee_periods.insert(period.id(), period.clone());
        period
    }

    // --- reads -------------------------------------------------------------

    pub fn trainee_period(&self, id: TraineePeriodId) -> Option<TraineePeriod> {
        self.lock().trainee_periods.get(&id).cloned()
    }

    pub fn training_period(&self, id: TrainingPeriodId) -> Option<TrainingPeriod> {
        self.lock().training_periods.get(&id).cloned()
    }

    /// All training periods of a trainee period, earliest start first.
    pub fn training_periods_for(&self, trainee_period: TraineePeriodId) -> Vec<TrainingPeriod> {
        let state = self.lock();
        let mut periods: Vec<TrainingPeriod> = state
            .training_periods
            .values()
            .filter(|period| period.trainee_period == trainee_period)
            .cloned()
            .collect();
        periods.sort_by_key(|period| (period.started_on, period.id));
        periods
    }

    /// The latest training period of a trainee period, by start date.
    pub fn latest_training_period(
        &self,
        trainee_period: TraineePeriodId,
    ) -> Option<TrainingPeriod> {
        self.training_periods_for(trainee_period).into_iter().last()
    }

    /// The open (`finished_on` null) training period, if any.
    pub fn open_training_period(&self, trainee_period: TraineePeriodId) -> Option<TrainingPeriod> {
        self.training_periods_for(trainee_period)
            .into_iter()
            .find(|period| period.finished_on.is_none())
    }

    /// Provider-led training periods across all of a teacher's trainee
    /// periods, latest start first. Feeds schedule continuity.
    pub fn provider_led_history(&self, teacher: TeacherId) -> Vec<TrainingPeriod> {
        let state = self.lock();
        let placements: BTreeSet<TraineePeriodId> = state
            .trainee_periods
            .values()
            .filter(|period| period.teacher() == teacher)
            .map(|period| period.id())
            .collect();
        let mut history: Vec<TrainingPeriod> = state
            .training_periods
            .values()
            .filter(|period| {
                placements.contains(&period.trainee_period)
                    && period.programme == TrainingProgramme::ProviderLed
            })
            .cloned()
            .collect();
        history.sort_by_key(|period| (period.started_on, period.id));
        history.reverse();
        history
    }

    pub fn schedule(&self, id: ScheduleId) -> Option<Schedule> {
        self.lock().schedules.get(&id).cloned()
    }

    pub fn schedule_by_identifier(&self, contract_year: i32, identifier: &str) -> Option<Schedule> {
        let state = self.lock();
        state
            .schedules
            .values()
            .find(|schedule| {
                schedule.contract_year == contract_year && schedule.identifier == identifier
            })
            .cloned()
    }

    pub fn contract_period(&self, year: i32) -> Option<ContractPeriod> {
        self.lock().contract_periods.get(&year).cloned()
    }

    /// The provider's activity record for the year. A provider only counts
    /// as active while the contract period itself is enabled.
    pub fn active_lead_provider(
        &self,
        lead_provider: LeadProviderId,
        contract_year: i32,
    ) -> Option<ActiveLeadProvider> {
        let state = self.lock();
        if !state
            .contract_periods
            .get(&contract_year)
            .map_or(false, |period| period.enabled)
        {
            return None;
        }
        state
            .active_lead_providers
            .values()
            .find(|active| {
                active.lead_provider == lead_provider && active.contract_year == contract_year
            })
            .copied()
    }

    /// The provider/delivery-partner pairing for a given year, if the
    /// contract period is enabled, the provider is active, and the partner
    /// is on its roster.
    pub fn roster_pairing(
        &self,
        lead_provider: LeadProviderId,
        contract_year: i32,
        delivery_partner: DeliveryPartnerId,
    ) -> Option<ProviderPartnership> {
        let state = self.lock();
        if !state
            .contract_periods
            .get(&contract_year)
            .map_or(false, |period| period.enabled)
        {
            return None;
        }
        let active = state
            .active_lead_providers
            .values()
            .find(|active| {
                active.lead_provider == lead_provider && active.contract_year == contract_year
            })?
            .id;
        state
            .provider_partnerships
            .values()
            .find(|pairing| {
                pairing.active_lead_provider == active
                    && pairing.delivery_partner == delivery_partner
            })
            .copied()
    }

    pub fn school_partnership(&self, id: SchoolPartnershipId) -> Option<SchoolPartnership> {
        self.lock().school_partnerships.get(&id).copied()
    }

    /// A school's confirmed partnerships joined to provider and year.
    pub fn partnership_links(&self, school: SchoolId) -> Vec<PartnershipLink> {
        let state = self.lock();
        state
            .school_partnerships
            .values()
            .filter(|partnership| partnership.school == school)
            .filter_map(|partnership| state.link(partnership))
            .collect()
    }

    /// Join a single partnership out to provider and year.
    pub fn partnership_link(&self, id: SchoolPartnershipId) -> Option<PartnershipLink> {
        let state = self.lock();
        let partnership = state.school_partnerships.get(&id)?;
        state.link(partnership)
    }

    /// The lead provider a training period is attached to, via its confirmed
    /// partnership or its expression of interest.
    pub fn lead_provider_for_period(&self, period: &TrainingPeriod) -> Option<LeadProviderId> {
        let state = self.lock();
        if let Some(id) = period.school_partnership {
            let partnership = state.school_partnerships.get(&id)?;
            return state.link(partnership).map(|link| link.lead_provider);
        }
        if let Some(id) = period.expression_of_interest {
            return state
                .active_lead_providers
                .get(&id)
                .map(|active| active.lead_provider);
        }
        None
    }

    // --- atomic writes -----------------------------------------------------

    /// Apply a batch of writes atomically. The batch is validated against a
    /// snapshot; on any failure nothing is committed.
    pub fn apply(&self, ops: Vec<WriteOp>) -> Result<BatchOutcome, StoreError> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let mut outcome = BatchOutcome::default();
        let mut touched = BTreeSet::new();

        for op in ops {
            match op {
                WriteOp::InsertPeriod(new) => {
                    let period = Self::insert_period(&mut next, new)?;
                    touched.insert(period.trainee_period);
                    outcome.periods.push(period);
                }
                WriteOp::InsertPeriodWithPartnership {
                    partnership,
                    period: mut new,
                } => {
                    if new.school_partnership.is_some() || new.expression_of_interest.is_some() {
                        return Err(StoreError::PartnershipInterestConflict);
                    }
                    let created = Self::insert_partnership(&mut next, partnership)?;
                    new.school_partnership = Some(created.id);
                    let period = Self::insert_period(&mut next, new)?;
                    touched.insert(period.trainee_period);
                    outcome.partnerships.push(created);
                    outcome.periods.push(period);
                }
                WriteOp::ClosePeriod { id, finished_on } => {
                    let period = next
                        .training_periods
                        .get_mut(&id)
                        .ok_or(StoreError::UnknownTrainingPeriod(id))?;
                    if finished_on < period.started_on {
                        return Err(StoreError::InvalidRange {
                            started_on: period.started_on,
                            finished_on,
                        });
                    }
                    period.finished_on = Some(finished_on);
                    touched.insert(period.trainee_period);
                }
                WriteOp::MarkDeferred {
                    id,
                    deferred_at,
                    reason,
                } => {
                    let period = next
                        .training_periods
                        .get_mut(&id)
                        .ok_or(StoreError::UnknownTrainingPeriod(id))?;
                    period.deferred_at = Some(deferred_at);
                    period.deferral_reason = Some(reason);
                    touched.insert(period.trainee_period);
                }
                WriteOp::MarkWithdrawn {
                    id,
                    withdrawn_at,
                    reason,
                } => {
                    let period = next
                        .training_periods
                        .get_mut(&id)
                        .ok_or(StoreError::UnknownTrainingPeriod(id))?;
                    period.withdrawn_at = Some(withdrawn_at);
                    period.withdrawal_reason = Some(reason);
                    touched.insert(period.trainee_period);
                }
                WriteOp::DestroyPeriod { id } => {
                    let removed = next
                        .training_periods
                        .remove(&id)
                        .ok_or(StoreError::UnknownTrainingPeriod(id))?;
                    touched.insert(removed.trainee_period);
                }
            }
        }

        for trainee_period in touched {
            Self::check_exclusion(&next, trainee_period)?;
        }

        *guard = next;
        Ok(outcome)
    }

    fn insert_partnership(
        state: &mut StoreState,
        new: NewSchoolPartnership,
    ) -> Result<SchoolPartnership, StoreError> {
        if !state
            .provider_partnerships
            .contains_key(&new.provider_partnership)
        {
            return Err(StoreError::UnknownProviderPartnership(
                new.provider_partnership,
            ));
        }
        let id = SchoolPartnershipId(state.allocate());
        let partnership = SchoolPartnership {
            id,
            school: new.school,
            provider_partnership: new.provider_partnership,
            created_on: new.created_on,
        };
        state.school_partnerships.insert(id, partnership);
        Ok(partnership)
    }

    fn insert_period(
        state: &mut StoreState,
        new: NewTrainingPeriod,
    ) -> Result<TrainingPeriod, StoreError> {
        if !state.trainee_periods.contains_key(&new.trainee_period) {
            return Err(StoreError::UnknownTraineePeriod(new.trainee_period));
        }
        if new.school_partnership.is_some() && new.expression_of_interest.is_some() {
            return Err(StoreError::PartnershipInterestConflict);
        }
        if let Some(id) = new.schedule {
            if !state.schedules.contains_key(&id) {
                return Err(StoreError::UnknownSchedule(id));
            }
        }
        if let Some(id) = new.school_partnership {
            if !state.school_partnerships.contains_key(&id) {
                return Err(StoreError::UnknownSchoolPartnership(id));
            }
        }
        if let Some(id) = new.expression_of_interest {
            if !state.active_lead_providers.contains_key(&id) {
                return Err(StoreError::UnknownActiveLeadProvider(id));
            }
        }
        if let Some(finished_on) = new.finished_on {
            if finished_on < new.started_on {
                return Err(StoreError::InvalidRange {
                    started_on: new.started_on,
                    finished_on,
                });
            }
        }

        let id = TrainingPeriodId(state.allocate());
        let period = TrainingPeriod {
            id,
            trainee_period: new.trainee_period,
            started_on: new.started_on,
            finished_on: new.finished_on,
            programme: new.programme,
            schedule: new.schedule,
            school_partnership: new.school_partnership,
            expression_of_interest: new.expression_of_interest,
            withdrawn_at: None,
            withdrawal_reason: None,
            deferred_at: None,
            deferral_reason: None,
        };
        state.training_periods.insert(id, period.clone());
        Ok(period)
    }

    /// Temporal exclusion over half-open `[started_on, finished_on)` ranges.
    /// Open-ended rows extend to infinity, so two open rows always collide,
    /// which is also what keeps the single-open invariant.
    fn check_exclusion(state: &StoreState, trainee_period: TraineePeriodId) -> Result<(), StoreError> {
        let periods: Vec<&TrainingPeriod> = state
            .training_periods
            .values()
            .filter(|period| period.trainee_period == trainee_period)
            .collect();

        for (index, left) in periods.iter().enumerate() {
            for right in periods.iter().skip(index + 1) {
                let left_end = left.finished_on.unwrap_or(NaiveDate::MAX);
                let right_end = right.finished_on.unwrap_or(NaiveDate::MAX);
                if left.started_on < right_end && right.started_on < left_end {
                    return Err(StoreError::OverlappingPeriods { trainee_period });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn seeded_store() -> (TrainingStore, TraineePeriod) {
        let store = TrainingStore::new();
        let trainee =
            store.add_ect_period(TeacherId(1), SchoolId(1), date(2024, 9, 1), None);
        (store, trainee)
    }

    fn new_period(
        trainee: &TraineePeriod,
        started_on: NaiveDate,
        finished_on: Option<NaiveDate>,
    ) -> NewTrainingPeriod {
        NewTrainingPeriod {
            trainee_period: trainee.id(),
            started_on,
            finished_on,
            programme: TrainingProgramme::SchoolLed,
            schedule: None,
            school_partnership: None,
            expression_of_interest: None,
        }
    }

    #[test]
    fn overlapping_insert_rejects_and_rolls_back() {
        let (store, trainee) = seeded_store();
        store
            .apply(vec![WriteOp::InsertPeriod(new_period(
                &trainee,
                date(2024, 9, 1),
                None,
            ))])
            .expect("first insert commits");

        let result = store.apply(vec![WriteOp::InsertPeriod(new_period(
            &trainee,
            date(2025, 1, 1),
            None,
        ))]);
        assert_eq!(
            result.map(|_| ()),
            Err(StoreError::OverlappingPeriods {
                trainee_period: trainee.id()
            })
        );
        assert_eq!(store.training_periods_for(trainee.id()).len(), 1);
    }

    #[test]
    fn close_and_insert_commit_as_one_batch() {
        let (store, trainee) = seeded_store();
        let first = store
            .apply(vec![WriteOp::InsertPeriod(new_period(
                &trainee,
                date(2024, 9, 1),
                None,
            ))])
            .expect("insert commits")
            .into_sole_period()
            .expect("row created");

        let outcome = store
            .apply(vec![
                WriteOp::ClosePeriod {
                    id: first.id,
                    finished_on: date(2025, 1, 10),
                },
                WriteOp::InsertPeriod(new_period(&trainee, date(2025, 1, 10), None)),
            ])
            .expect("batch commits");

        let successor = outcome.into_sole_period().expect("row created");
        assert_eq!(successor.started_on, date(2025, 1, 10));
        let stored = store.training_periods_for(trainee.id());
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].finished_on, Some(date(2025, 1, 10)));
    }

    #[test]
    fn failed_batch_leaves_no_partial_writes() {
        let (store, trainee) = seeded_store();
        let first = store
            .apply(vec![WriteOp::InsertPeriod(new_period(
                &trainee,
                date(2024, 9, 1),
                None,
            ))])
            .expect("insert commits")
            .into_sole_period()
            .expect("row created");

        // Close succeeds in isolation; the second op's range is invalid.
        let result = store.apply(vec![
            WriteOp::ClosePeriod {
                id: first.id,
                finished_on: date(2025, 1, 10),
            },
            WriteOp::InsertPeriod(new_period(
                &trainee,
                date(2025, 1, 10),
                Some(date(2024, 12, 1)),
            )),
        ]);
        assert!(matches!(result, Err(StoreError::InvalidRange { .. })));

        let stored = store.training_periods_for(trainee.id());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].finished_on, None, "close must have rolled back");
    }

    #[test]
    fn partnership_and_interest_are_mutually_exclusive() {
        let (store, trainee) = seeded_store();
        store.add_contract_period(2024, date(2024, 6, 1), date(2025, 5, 31), true);
        let active = store
            .add_active_lead_provider(LeadProviderId(1), 2024)
            .expect("provider activates");
        let pairing = store
            .add_provider_partnership(active.id, DeliveryPartnerId(1))
            .expect("pairing registers");
        let partnership = store
            .add_school_partnership(trainee.school(), pairing.id, date(2024, 6, 15))
            .expect("partnership registers");

        let mut new = new_period(&trainee, date(2024, 9, 1), None);
        new.school_partnership = Some(partnership.id);
        new.expression_of_interest = Some(active.id);
        let result = store.apply(vec![WriteOp::InsertPeriod(new)]);
        assert_eq!(
            result.map(|_| ()),
            Err(StoreError::PartnershipInterestConflict)
        );
    }

    #[test]
    fn combined_partnership_and_period_insert_rolls_back_together() {
        let (store, trainee) = seeded_store();
        store.add_contract_period(2024, date(2024, 6, 1), date(2025, 5, 31), true);
        let active = store
            .add_active_lead_provider(LeadProviderId(1), 2024)
            .expect("provider activates");
        let pairing = store
            .add_provider_partnership(active.id, DeliveryPartnerId(1))
            .expect("pairing registers");
        store
            .apply(vec![WriteOp::InsertPeriod(new_period(
                &trainee,
                date(2024, 9, 1),
                None,
            ))])
            .expect("blocking period commits");

        // The partnership half would succeed; the period half overlaps.
        let result = store.apply(vec![WriteOp::InsertPeriodWithPartnership {
            partnership: NewSchoolPartnership {
                school: trainee.school(),
                provider_partnership: pairing.id,
                created_on: date(2024, 9, 2),
            },
            period: new_period(&trainee, date(2025, 1, 1), None),
        }]);
        assert_eq!(
            result.map(|_| ()),
            Err(StoreError::OverlappingPeriods {
                trainee_period: trainee.id()
            })
        );
        assert!(
            store.partnership_links(trainee.school()).is_empty(),
            "no partnership row survives the failed batch"
        );
    }

    #[test]
    fn disabled_contract_year_hides_provider_activity() {
        let store = TrainingStore::new();
        store.add_contract_period(2024, date(2024, 6, 1), date(2025, 5, 31), false);
        store
            .add_active_lead_provider(LeadProviderId(1), 2024)
            .expect("provider activates");

        let period = store.contract_period(2024).expect("seeded period");
        assert!(!period.enabled);
        assert_eq!(store.active_lead_provider(LeadProviderId(1), 2024), None);
        assert_eq!(
            store.roster_pairing(LeadProviderId(1), 2024, DeliveryPartnerId(1)),
            None
        );
    }

    #[test]
    fn provider_led_history_orders_latest_first_across_placements() {
        let store = TrainingStore::new();
        let first_school =
            store.add_ect_period(TeacherId(9), SchoolId(1), date(2023, 9, 1), Some(date(2024, 7, 1)));
        let second_school = store.add_ect_period(TeacherId(9), SchoolId(2), date(2024, 9, 1), None);

        let mut early = new_period(&first_school, date(2023, 9, 1), Some(date(2024, 7, 1)));
        early.programme = TrainingProgramme::ProviderLed;
        let mut late = new_period(&second_school, date(2024, 9, 1), None);
        late.programme = TrainingProgramme::ProviderLed;

        store
            .apply(vec![WriteOp::InsertPeriod(early)])
            .expect("first period commits");
        store
            .apply(vec![WriteOp::InsertPeriod(late)])
            .expect("second period commits");

        let history = store.provider_led_history(TeacherId(9));
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].started_on, date(2024, 9, 1));
        assert_eq!(history[1].started_on, date(2023, 9, 1));
    }

    #[test]
    fn schedules_require_a_registered_contract_year() {
        let store = TrainingStore::new();
        assert_eq!(
            store.add_schedule(2024, "ecf-standard-september").map(|_| ()),
            Err(StoreError::UnknownContractYear(2024))
        );
    }
}
