//! Domain model for trainee placements, training periods, schedules, and
//! the commercial records linking schools to lead providers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for a trainee's placement at one school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraineePeriodId(pub u64);

/// Identifier wrapper for one span of training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrainingPeriodId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeacherId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchoolId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LeadProviderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeliveryPartnerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActiveLeadProviderId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProviderPartnershipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchoolPartnershipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub u64);

/// Training programme mode; only provider-led periods carry a schedule and
/// partnership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingProgramme {
    SchoolLed,
    ProviderLed,
}

impl TrainingProgramme {
    pub const fn label(self) -> &'static str {
        match self {
            Self::SchoolLed => "school-led",
            Self::ProviderLed => "provider-led",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherType {
    EarlyCareerTeacher,
    Mentor,
}

impl TeacherType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::EarlyCareerTeacher => "early career teacher",
            Self::Mentor => "mentor",
        }
    }
}

/// Shared payload of a placement: who is training, where, and over what span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub id: TraineePeriodId,
    pub teacher: TeacherId,
    pub school: SchoolId,
    pub started_on: NaiveDate,
    pub finished_on: Option<NaiveDate>,
}

/// A trainee's placement at one school, tagged by the role being trained.
/// A training period belongs to exactly one of these, never both roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TraineePeriod {
    Ect(Placement),
    Mentor(Placement),
}

impl TraineePeriod {
    pub fn placement(&self) -> &Placement {
        match self {
            Self::Ect(placement) | Self::Mentor(placement) => placement,
        }
    }

    pub fn teacher_type(&self) -> TeacherType {
        match self {
            Self::Ect(_) => TeacherType::EarlyCareerTeacher,
            Self::Mentor(_) => TeacherType::Mentor,
        }
    }

    pub fn id(&self) -> TraineePeriodId {
        self.placement().id
    }

    pub fn teacher(&self) -> TeacherId {
        self.placement().teacher
    }

    pub fn school(&self) -> SchoolId {
        self.placement().school
    }

    pub fn finished_on(&self) -> Option<NaiveDate> {
        self.placement().finished_on
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferralReason {
    CareerBreak,
    ParentalLeave,
    LongTermSickness,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalReason {
    LeftTeachingProfession,
    MovedSchool,
    SwitchedToSchoolLed,
    Other,
}

/// Derived lifecycle state of a training period. A row can technically carry
/// both pause timestamps; precedence is fixed as withdrawn over deferred over
/// the range-derived states so every caller agrees on one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Withdrawn,
    Deferred,
    Active,
    Finished,
}

/// One non-overlapping span of training under a given programme, schedule,
/// and commercial attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPeriod {
    pub id: TrainingPeriodId,
    pub trainee_period: TraineePeriodId,
    pub started_on: NaiveDate,
    pub finished_on: Option<NaiveDate>,
    pub programme: TrainingProgramme,
    pub schedule: Option<ScheduleId>,
    pub school_partnership: Option<SchoolPartnershipId>,
    pub expression_of_interest: Option<ActiveLeadProviderId>,
    pub withdrawn_at: Option<NaiveDate>,
    pub withdrawal_reason: Option<WithdrawalReason>,
    pub deferred_at: Option<NaiveDate>,
    pub deferral_reason: Option<DeferralReason>,
}

impl TrainingPeriod {
    pub fn status(&self) -> TrainingStatus {
        if self.withdrawn_at.is_some() {
            TrainingStatus::Withdrawn
        } else if self.deferred_at.is_some() {
            TrainingStatus::Deferred
        } else if self.finished_on.is_none() {
            TrainingStatus::Active
        } else {
            TrainingStatus::Finished
        }
    }

    /// Whether the period's range still covers or extends past `date`.
    pub fn ongoing_on(&self, date: NaiveDate) -> bool {
        self.finished_on.map_or(true, |finished| finished > date)
    }
}

/// A year-keyed funding cycle. Schedules and provider activity records are
/// scoped to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPeriod {
    pub year: i32,
    pub started_on: NaiveDate,
    pub finished_on: NaiveDate,
    pub enabled: bool,
}

/// Marks a lead provider as operating in a contract year; the anchor for
/// expression-of-interest placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLeadProvider {
    pub id: ActiveLeadProviderId,
    pub lead_provider: LeadProviderId,
    pub contract_year: i32,
}

/// A provider's subcontracted delivery partner for one contract year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPartnership {
    pub id: ProviderPartnershipId,
    pub active_lead_provider: ActiveLeadProviderId,
    pub delivery_partner: DeliveryPartnerId,
}

/// Confirmed three-way commercial relationship a training period can point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolPartnership {
    pub id: SchoolPartnershipId,
    pub school: SchoolId,
    pub provider_partnership: ProviderPartnershipId,
    pub created_on: NaiveDate,
}

/// Named curriculum track for a contract year and start-month bucket, e.g.
/// `ecf-standard-september`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub contract_year: i32,
    pub identifier: String,
}

impl Schedule {
    /// Leading identifier token; encodes the teacher type the schedule is for.
    pub fn teacher_type_token(&self) -> &str {
        self.identifier
            .split_once('-')
            .map_or(self.identifier.as_str(), |(token, _)| token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn period() -> TrainingPeriod {
        TrainingPeriod {
            id: TrainingPeriodId(1),
            trainee_period: TraineePeriodId(1),
            started_on: date(2024, 9, 1),
            finished_on: None,
            programme: TrainingProgramme::ProviderLed,
            schedule: Some(ScheduleId(1)),
            school_partnership: None,
            expression_of_interest: None,
            withdrawn_at: None,
            withdrawal_reason: None,
            deferred_at: None,
            deferral_reason: None,
        }
    }

    #[test]
    fn status_precedence_prefers_withdrawn_over_deferred() {
        let mut both = period();
        both.withdrawn_at = Some(date(2025, 1, 10));
        both.deferred_at = Some(date(2024, 12, 1));
        assert_eq!(both.status(), TrainingStatus::Withdrawn);
    }

    #[test]
    fn status_derives_from_nullable_timestamps() {
        let open = period();
        assert_eq!(open.status(), TrainingStatus::Active);

        let mut finished = period();
        finished.finished_on = Some(date(2025, 7, 1));
        assert_eq!(finished.status(), TrainingStatus::Finished);

        let mut deferred = period();
        deferred.deferred_at = Some(date(2025, 1, 10));
        deferred.finished_on = Some(date(2025, 1, 10));
        assert_eq!(deferred.status(), TrainingStatus::Deferred);
    }

    #[test]
    fn teacher_type_token_takes_the_leading_identifier_segment() {
        let schedule = Schedule {
            id: ScheduleId(1),
            contract_year: 2024,
            identifier: "ecf-standard-september".to_string(),
        };
        assert_eq!(schedule.teacher_type_token(), "ecf");
    }
}
