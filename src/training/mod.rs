//! Training period lifecycle engine: the state machine over a trainee's
//! sequence of training periods, schedule resolution, and partnership
//! matching.

pub mod audit;
pub mod calendar;
pub mod clock;
pub mod domain;
pub mod lifecycle;
pub mod partnership;
pub mod schedule;
pub mod store;

pub use audit::{AuditEvent, AuditRecord, AuditSink, Author, TracingAuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use lifecycle::{CreateTraining, LifecycleError, TrainingLifecycle, ValidationFailure};
pub use partnership::PartnershipMatcher;
pub use schedule::{ScheduleNotFound, ScheduleResolver};
pub use store::{StoreError, TrainingStore};
