//! Lifecycle operations over a trainee's sequence of training periods.
//!
//! Each operation validates its guards, then commits every row change in a
//! single atomic batch against the store, then hands audit events to the
//! external sink. Guard violations come back as typed
//! [`ValidationFailure`]s and leave state untouched; schedule-resolution
//! misses and constraint violations abort the whole operation.

use std::cmp;
use std::sync::Arc;

use chrono::NaiveDate;

use super::audit::{AuditEvent, AuditRecord, AuditSink, Author};
use super::calendar::contract_year;
use super::clock::Clock;
use super::domain::{
    ActiveLeadProviderId, DeferralReason, LeadProviderId, Schedule, ScheduleId,
    SchoolPartnershipId, TraineePeriod, TraineePeriodId, TrainingPeriod, TrainingPeriodId,
    TrainingProgramme, WithdrawalReason,
};
use super::partnership::PartnershipMatcher;
use super::schedule::{ScheduleNotFound, ScheduleResolver};
use super::store::{
    BatchOutcome, NewSchoolPartnership, NewTrainingPeriod, StoreError, TrainingStore, WriteOp,
};

/// Precondition violations. Reported to the caller; the operation is a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    #[error("trainee period has no training history to act on")]
    NoTrainingHistory,
    #[error("training is already over for this placement")]
    NoOngoingTraining,
    #[error("training period is already withdrawn")]
    AlreadyWithdrawn,
    #[error("training period is already deferred")]
    AlreadyDeferred,
    #[error("training has not started yet (starts on {starts_on})")]
    NotYetStarted { starts_on: NaiveDate },
    #[error("training period is neither withdrawn nor deferred")]
    NotPaused,
    #[error("placement already finished on {finished_on}")]
    PlacementFinished { finished_on: NaiveDate },
    #[error("requested schedule is the same as the current one")]
    ScheduleUnchanged,
    #[error("schedule {requested} is for a different teacher type than {current}")]
    TeacherTypeMismatch { current: String, requested: String },
    #[error("no confirmed partnership covers contract year {contract_year}")]
    PartnershipGap { contract_year: i32 },
    #[error("lead provider is not active in contract year {contract_year}")]
    LeadProviderNotActive { contract_year: i32 },
    #[error("lead provider is unchanged")]
    LeadProviderUnchanged,
    #[error("provider-led training requires a lead provider")]
    MissingLeadProvider,
    #[error("current training period is not provider led")]
    NotProviderLed,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    #[error(transparent)]
    ScheduleNotFound(#[from] ScheduleNotFound),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fields collected for opening a training period.
#[derive(Debug, Clone)]
pub struct CreateTraining {
    pub trainee_period: TraineePeriodId,
    pub started_on: NaiveDate,
    pub finished_on: Option<NaiveDate>,
    pub programme: TrainingProgramme,
    pub lead_provider: Option<LeadProviderId>,
}

/// What a new provider-led period is commercially attached to. `Reused`
/// carries a partnership row still to be inserted; it commits in the same
/// batch as the period pointing at it.
#[derive(Debug, Clone, Copy)]
enum Attachment {
    Confirmed(SchoolPartnershipId),
    Interest(ActiveLeadProviderId),
    Reused {
        previous: SchoolPartnershipId,
        partnership: NewSchoolPartnership,
    },
    None,
}

impl Attachment {
    /// The insert op for a period carrying this attachment. `new` must
    /// arrive with neither link set.
    fn into_insert(self, mut new: NewTrainingPeriod) -> WriteOp {
        match self {
            Self::Confirmed(id) => {
                new.school_partnership = Some(id);
                WriteOp::InsertPeriod(new)
            }
            Self::Interest(id) => {
                new.expression_of_interest = Some(id);
                WriteOp::InsertPeriod(new)
            }
            Self::Reused { partnership, .. } => WriteOp::InsertPeriodWithPartnership {
                partnership,
                period: new,
            },
            Self::None => WriteOp::InsertPeriod(new),
        }
    }
}

/// Facade over the store, matcher, resolver, clock, and audit sink.
pub struct TrainingLifecycle<A, C> {
    store: Arc<TrainingStore>,
    audit: Arc<A>,
    clock: Arc<C>,
}

impl<A, C> TrainingLifecycle<A, C>
where
    A: AuditSink + 'static,
    C: Clock + 'static,
{
    pub fn new(store: Arc<TrainingStore>, audit: Arc<A>, clock: Arc<C>) -> Self {
        Self {
            store,
            audit,
            clock,
        }
    }

    /// Open a training period for a placement. Provider-led creation
    /// resolves a schedule (fatal if none exists) and attaches the best
    /// available commercial link for the target contract year.
    pub fn create(
        &self,
        request: CreateTraining,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        let trainee = self.trainee(request.trainee_period)?;
        let today = self.clock.today();

        let (schedule, attachment) = match request.programme {
            TrainingProgramme::SchoolLed => (None, Attachment::None),
            TrainingProgramme::ProviderLed => {
                let resolver = ScheduleResolver::new(&self.store);
                let schedule =
                    resolver.resolve_provider_led(&trainee, request.started_on, today)?;
                let lead_provider = request
                    .lead_provider
                    .ok_or(ValidationFailure::MissingLeadProvider)?;
                let year = contract_year(cmp::max(request.started_on, today));
                let attachment = self.attach_to_provider(&trainee, lead_provider, year)?;
                (Some(schedule), attachment)
            }
        };

        let outcome = self.store.apply(vec![attachment.into_insert(NewTrainingPeriod {
            trainee_period: trainee.id(),
            started_on: request.started_on,
            finished_on: request.finished_on,
            programme: request.programme,
            schedule: schedule.as_ref().map(|s| s.id),
            school_partnership: None,
            expression_of_interest: None,
        })])?;
        self.audit_partnership_reuse(attachment, &outcome, author);
        let period = outcome.into_sole_period()?;

        self.audit_schedule_assignment(&period, author);
        tracing::info!(
            trainee_period = trainee.id().0,
            training_period = period.id.0,
            teacher_type = trainee.teacher_type().label(),
            programme = request.programme.label(),
            "training period opened"
        );
        Ok(period)
    }

    /// Pause training. Mutates the open row in place: the pause timestamp
    /// and reason are set and the range is closed as of today. No new row.
    pub fn defer(
        &self,
        trainee_period: TraineePeriodId,
        reason: DeferralReason,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        self.trainee(trainee_period)?;
        let today = self.clock.today();
        let current = self.latest(trainee_period)?;

        if current.withdrawn_at.is_some() {
            return Err(ValidationFailure::AlreadyWithdrawn.into());
        }
        if current.deferred_at.is_some() {
            return Err(ValidationFailure::AlreadyDeferred.into());
        }
        if current.started_on > today {
            return Err(ValidationFailure::NotYetStarted {
                starts_on: current.started_on,
            }
            .into());
        }
        if !current.ongoing_on(today) {
            return Err(ValidationFailure::NoOngoingTraining.into());
        }

        self.store.apply(vec![
            WriteOp::MarkDeferred {
                id: current.id,
                deferred_at: today,
                reason,
            },
            WriteOp::ClosePeriod {
                id: current.id,
                finished_on: today,
            },
        ])?;

        self.audit.record(AuditRecord {
            author: author.clone(),
            event: AuditEvent::TrainingDeferred {
                training_period: current.id,
                deferred_at: today,
                reason,
            },
        });
        tracing::info!(training_period = current.id.0, "training deferred");
        self.reread(current.id)
    }

    /// Withdraw from training. Like defer, an in-place mutation of the
    /// current row; a deferred row can still be withdrawn.
    pub fn withdraw(
        &self,
        trainee_period: TraineePeriodId,
        reason: WithdrawalReason,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        self.trainee(trainee_period)?;
        let today = self.clock.today();
        let current = self.latest(trainee_period)?;

        if current.withdrawn_at.is_some() {
            return Err(ValidationFailure::AlreadyWithdrawn.into());
        }
        if current.deferred_at.is_none() {
            if current.started_on > today {
                return Err(ValidationFailure::NotYetStarted {
                    starts_on: current.started_on,
                }
                .into());
            }
            if !current.ongoing_on(today) {
                return Err(ValidationFailure::NoOngoingTraining.into());
            }
        }

        let mut ops = vec![WriteOp::MarkWithdrawn {
            id: current.id,
            withdrawn_at: today,
            reason,
        }];
        if current.ongoing_on(today) {
            ops.push(WriteOp::ClosePeriod {
                id: current.id,
                finished_on: today,
            });
        }
        self.store.apply(ops)?;

        self.audit.record(AuditRecord {
            author: author.clone(),
            event: AuditEvent::TrainingWithdrawn {
                training_period: current.id,
                withdrawn_at: today,
                reason,
            },
        });
        tracing::info!(training_period = current.id.0, "training withdrawn");
        self.reread(current.id)
    }

    /// Reopen training after a deferral or withdrawal: one new period
    /// starting today, carrying the paused period's programme, schedule,
    /// and commercial attachment forward.
    pub fn resume(
        &self,
        trainee_period: TraineePeriodId,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        let trainee = self.trainee(trainee_period)?;
        let today = self.clock.today();
        let previous = self.latest(trainee_period)?;

        if previous.withdrawn_at.is_none() && previous.deferred_at.is_none() {
            return Err(ValidationFailure::NotPaused.into());
        }
        if let Some(finished_on) = trainee.finished_on() {
            if finished_on <= today {
                return Err(ValidationFailure::PlacementFinished { finished_on }.into());
            }
        }

        let outcome = self.store.apply(vec![WriteOp::InsertPeriod(NewTrainingPeriod {
            trainee_period: trainee.id(),
            started_on: today,
            finished_on: trainee.finished_on(),
            programme: previous.programme,
            schedule: previous.schedule,
            school_partnership: previous.school_partnership,
            expression_of_interest: previous.expression_of_interest,
        })])?;
        let period = outcome.into_sole_period()?;

        self.audit.record(AuditRecord {
            author: author.clone(),
            event: AuditEvent::TrainingResumed {
                previous: previous.id,
                successor: period.id,
            },
        });
        self.audit_schedule_assignment(&period, author);
        tracing::info!(
            previous = previous.id.0,
            successor = period.id.0,
            "training resumed"
        );
        Ok(period)
    }

    /// Move the trainee onto a different schedule of the same teacher type.
    /// The current period is cut over (a future end date is left untouched
    /// and becomes the cutover) and the successor carries the new schedule.
    pub fn change_schedule(
        &self,
        trainee_period: TraineePeriodId,
        schedule: ScheduleId,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        let trainee = self.trainee(trainee_period)?;
        let today = self.clock.today();
        let current = self.latest(trainee_period)?;

        if current.withdrawn_at.is_some() {
            return Err(ValidationFailure::AlreadyWithdrawn.into());
        }
        if current.deferred_at.is_some() {
            return Err(ValidationFailure::AlreadyDeferred.into());
        }
        if current.started_on > today {
            return Err(ValidationFailure::NotYetStarted {
                starts_on: current.started_on,
            }
            .into());
        }
        if !current.ongoing_on(today) {
            return Err(ValidationFailure::NoOngoingTraining.into());
        }
        let Some(current_schedule_id) = current.schedule else {
            return Err(ValidationFailure::NotProviderLed.into());
        };
        let current_schedule = self
            .store
            .schedule(current_schedule_id)
            .ok_or(StoreError::UnknownSchedule(current_schedule_id))?;
        let requested = self
            .store
            .schedule(schedule)
            .ok_or(StoreError::UnknownSchedule(schedule))?;

        if requested.id == current_schedule.id {
            return Err(ValidationFailure::ScheduleUnchanged.into());
        }
        if requested.teacher_type_token() != current_schedule.teacher_type_token() {
            return Err(ValidationFailure::TeacherTypeMismatch {
                current: current_schedule.identifier.clone(),
                requested: requested.identifier.clone(),
            }
            .into());
        }

        let attachment =
            self.carry_attachment_across_years(&trainee, &current, &current_schedule, &requested)?;

        let cutover = match current.finished_on {
            Some(finished_on) if finished_on > today => finished_on,
            _ => today,
        };
        let mut ops = Vec::new();
        if current.finished_on != Some(cutover) {
            ops.push(WriteOp::ClosePeriod {
                id: current.id,
                finished_on: cutover,
            });
        }
        ops.push(attachment.into_insert(NewTrainingPeriod {
            trainee_period: trainee.id(),
            started_on: cutover,
            finished_on: trainee.finished_on().filter(|finish| *finish > cutover),
            programme: current.programme,
            schedule: Some(requested.id),
            school_partnership: None,
            expression_of_interest: None,
        }));

        let outcome = self.store.apply(ops)?;
        let period = outcome.into_sole_period()?;

        self.audit.record(AuditRecord {
            author: author.clone(),
            event: AuditEvent::ScheduleChanged {
                previous: current.id,
                successor: period.id,
                schedule: requested.id,
            },
        });
        self.audit_schedule_assignment(&period, author);
        tracing::info!(
            previous = current.id.0,
            successor = period.id.0,
            identifier = %requested.identifier,
            "schedule changed"
        );
        Ok(period)
    }

    /// Move the trainee to a different lead provider. A future-dated or
    /// never-confirmed current period is destroyed outright; a started,
    /// confirmed one is finished as of today. Either way exactly one
    /// successor attaches to the new provider.
    pub fn change_lead_provider(
        &self,
        trainee_period: TraineePeriodId,
        lead_provider: LeadProviderId,
        author: &Author,
    ) -> Result<TrainingPeriod, LifecycleError> {
        let trainee = self.trainee(trainee_period)?;
        let today = self.clock.today();
        let current = self.latest(trainee_period)?;

        if current.withdrawn_at.is_some() {
            return Err(ValidationFailure::AlreadyWithdrawn.into());
        }
        if current.deferred_at.is_some() {
            return Err(ValidationFailure::AlreadyDeferred.into());
        }
        if !current.ongoing_on(today) && current.started_on <= today {
            return Err(ValidationFailure::NoOngoingTraining.into());
        }
        if self.store.lead_provider_for_period(&current) == Some(lead_provider) {
            return Err(ValidationFailure::LeadProviderUnchanged.into());
        }

        // A period that never started or was never commercially confirmed
        // leaves no history worth keeping.
        let destructive = current.started_on > today || current.school_partnership.is_none();
        let (mut ops, successor_start) = if destructive {
            (
                vec![WriteOp::DestroyPeriod { id: current.id }],
                current.started_on,
            )
        } else {
            let cutover = cmp::max(current.started_on, today);
            (
                vec![WriteOp::ClosePeriod {
                    id: current.id,
                    finished_on: cutover,
                }],
                cutover,
            )
        };

        let year = contract_year(cmp::max(successor_start, today));
        let attachment = self.attach_to_provider(&trainee, lead_provider, year)?;
        let resolver = ScheduleResolver::new(&self.store);
        let schedule: Option<Schedule> =
            resolver.resolve(&trainee, current.programme, successor_start, today)?;

        ops.push(attachment.into_insert(NewTrainingPeriod {
            trainee_period: trainee.id(),
            started_on: successor_start,
            finished_on: trainee
                .finished_on()
                .filter(|finish| *finish > successor_start),
            programme: current.programme,
            schedule: schedule.as_ref().map(|s| s.id),
            school_partnership: None,
            expression_of_interest: None,
        }));

        let outcome = self.store.apply(ops)?;
        self.audit_partnership_reuse(attachment, &outcome, author);
        let period = outcome.into_sole_period()?;

        if !destructive {
            self.audit.record(AuditRecord {
                author: author.clone(),
                event: AuditEvent::LeadProviderChanged {
                    previous: current.id,
                    successor: period.id,
                },
            });
        }
        self.audit_schedule_assignment(&period, author);
        tracing::info!(
            trainee_period = trainee.id().0,
            successor = period.id.0,
            lead_provider = lead_provider.0,
            destroyed_previous = destructive,
            "lead provider changed"
        );
        Ok(period)
    }

    // --- helpers -----------------------------------------------------------

    fn trainee(&self, id: TraineePeriodId) -> Result<TraineePeriod, LifecycleError> {
        self.store
            .trainee_period(id)
            .ok_or_else(|| StoreError::UnknownTraineePeriod(id).into())
    }

    fn latest(&self, id: TraineePeriodId) -> Result<TrainingPeriod, LifecycleError> {
        self.store
            .latest_training_period(id)
            .ok_or_else(|| ValidationFailure::NoTrainingHistory.into())
    }

    fn reread(&self, id: TrainingPeriodId) -> Result<TrainingPeriod, LifecycleError> {
        self.store
            .training_period(id)
            .ok_or_else(|| StoreError::UnknownTrainingPeriod(id).into())
    }

    /// Best commercial link for (school, provider, year): a confirmed
    /// partnership for the year, else a previous year's partnership revived
    /// through the provider's current roster, else an expression of interest
    /// against the provider's active record; a provider inactive in the year
    /// is a guard failure.
    fn attach_to_provider(
        &self,
        trainee: &TraineePeriod,
        lead_provider: LeadProviderId,
        contract_year: i32,
    ) -> Result<Attachment, LifecycleError> {
        let matcher = PartnershipMatcher::new(&self.store);
        if let Some(partnership) = matcher.first_match(trainee.school(), lead_provider, contract_year)
        {
            return Ok(Attachment::Confirmed(partnership.id));
        }
        if let Some(previous) =
            matcher.find_previous_reusable(trainee.school(), lead_provider, contract_year)
        {
            if let Some(partnership) = matcher.create_from_previous(
                previous.id,
                trainee.school(),
                contract_year,
                self.clock.today(),
            ) {
                return Ok(Attachment::Reused {
                    previous: previous.id,
                    partnership,
                });
            }
        }
        match self.store.active_lead_provider(lead_provider, contract_year) {
            Some(active) => {
                tracing::debug!(
                    school = trainee.school().0,
                    lead_provider = lead_provider.0,
                    contract_year,
                    "no confirmed partnership; attaching expression of interest"
                );
                Ok(Attachment::Interest(active.id))
            }
            None => Err(ValidationFailure::LeadProviderNotActive { contract_year }.into()),
        }
    }

    /// ChangeSchedule keeps the current attachment within a contract year;
    /// across years it must re-match, and a gap is a guard failure.
    fn carry_attachment_across_years(
        &self,
        trainee: &TraineePeriod,
        current: &TrainingPeriod,
        current_schedule: &Schedule,
        requested: &Schedule,
    ) -> Result<Attachment, LifecycleError> {
        if requested.contract_year == current_schedule.contract_year {
            return Ok(match (current.school_partnership, current.expression_of_interest) {
                (Some(partnership), _) => Attachment::Confirmed(partnership),
                (None, Some(interest)) => Attachment::Interest(interest),
                (None, None) => Attachment::None,
            });
        }

        let Some(lead_provider) = self.store.lead_provider_for_period(current) else {
            return Ok(Attachment::None);
        };
        let matcher = PartnershipMatcher::new(&self.store);
        if current.school_partnership.is_some() {
            return matcher
                .first_match(trainee.school(), lead_provider, requested.contract_year)
                .map(|partnership| Attachment::Confirmed(partnership.id))
                .ok_or_else(|| {
                    ValidationFailure::PartnershipGap {
                        contract_year: requested.contract_year,
                    }
                    .into()
                });
        }
        match self
            .store
            .active_lead_provider(lead_provider, requested.contract_year)
        {
            Some(active) => Ok(Attachment::Interest(active.id)),
            None => Err(ValidationFailure::LeadProviderNotActive {
                contract_year: requested.contract_year,
            }
            .into()),
        }
    }

    /// Emit the reuse event once the batch carrying the revived partnership
    /// has committed.
    fn audit_partnership_reuse(
        &self,
        attachment: Attachment,
        outcome: &BatchOutcome,
        author: &Author,
    ) {
        let Attachment::Reused { previous, .. } = attachment else {
            return;
        };
        let Some(created) = outcome.partnerships.first() else {
            return;
        };
        self.audit.record(AuditRecord {
            author: author.clone(),
            event: AuditEvent::PartnershipReused {
                previous,
                created: created.id,
            },
        });
        tracing::info!(
            previous = previous.0,
            created = created.id.0,
            "reused previous partnership for current year"
        );
    }

    fn audit_schedule_assignment(&self, period: &TrainingPeriod, author: &Author) {
        if let Some(schedule) = period.schedule {
            self.audit.record(AuditRecord {
                author: author.clone(),
                event: AuditEvent::ScheduleAssigned {
                    training_period: period.id,
                    schedule,
                },
            });
        }
    }
}
