//! Audit-event boundary. The engine emits events describing what each
//! lifecycle operation did; persistence of those events is owned by an
//! external collaborator, so from here recording is fire-and-forget.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    DeferralReason, ScheduleId, SchoolPartnershipId, TrainingPeriodId, WithdrawalReason,
};

/// Opaque principal responsible for an operation, passed through to audit
/// events untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    ScheduleAssigned {
        training_period: TrainingPeriodId,
        schedule: ScheduleId,
    },
    TrainingDeferred {
        training_period: TrainingPeriodId,
        deferred_at: NaiveDate,
        reason: DeferralReason,
    },
    TrainingWithdrawn {
        training_period: TrainingPeriodId,
        withdrawn_at: NaiveDate,
        reason: WithdrawalReason,
    },
    TrainingResumed {
        previous: TrainingPeriodId,
        successor: TrainingPeriodId,
    },
    ScheduleChanged {
        previous: TrainingPeriodId,
        successor: TrainingPeriodId,
        schedule: ScheduleId,
    },
    LeadProviderChanged {
        previous: TrainingPeriodId,
        successor: TrainingPeriodId,
    },
    PartnershipReused {
        previous: SchoolPartnershipId,
        created: SchoolPartnershipId,
    },
}

impl AuditEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ScheduleAssigned { .. } => "schedule_assigned",
            Self::TrainingDeferred { .. } => "training_deferred",
            Self::TrainingWithdrawn { .. } => "training_withdrawn",
            Self::TrainingResumed { .. } => "training_resumed",
            Self::ScheduleChanged { .. } => "schedule_changed",
            Self::LeadProviderChanged { .. } => "lead_provider_changed",
            Self::PartnershipReused { .. } => "partnership_reused",
        }
    }
}

/// Event plus the principal it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub author: Author,
    pub event: AuditEvent,
}

/// Write-only sink the engine hands audit records to. The engine never
/// conditions its own persistence on the sink's behavior.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Sink that forwards audit records to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        match serde_json::to_string(&record.event) {
            Ok(payload) => tracing::info!(
                target: "audit",
                author = %record.author.0,
                kind = record.event.kind(),
                payload,
                "audit event recorded"
            ),
            Err(error) => tracing::warn!(
                target: "audit",
                kind = record.event.kind(),
                %error,
                "audit event could not be encoded"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_kind_tag() {
        let event = AuditEvent::ScheduleAssigned {
            training_period: TrainingPeriodId(7),
            schedule: ScheduleId(3),
        };
        let value = serde_json::to_value(&event).expect("serializable");
        assert_eq!(
            value.get("kind").and_then(|kind| kind.as_str()),
            Some("schedule_assigned")
        );
        assert_eq!(event.kind(), "schedule_assigned");
    }
}
