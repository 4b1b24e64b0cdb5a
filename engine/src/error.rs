//! Error types for the billing engine.
//!
//! Batch operations (`process_recurring_invoices`, `send_batch_reminders`)
//! reserve `Err` for faults that prevent the whole batch from running - the
//! scan guard and repository-unreachable conditions. Per-item failures are
//! aggregated into the returned outcome instead.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Faults raised by a `BillingRepository` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a due schedule could not be turned into an invoice. None of these
/// advance the schedule's `last_generated` marker.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("client {0} no longer exists")]
    ClientMissing(Uuid),
    #[error("schedule {0} has no service lines")]
    EmptyTemplate(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Notification transport failure, opaque to the engine.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),
    #[error("client {0} not found")]
    ClientNotFound(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("schedule {0} not found")]
    ScheduleNotFound(Uuid),
    #[error("schedule {0} is inactive")]
    InactiveSchedule(Uuid),
    #[error("materialization failed: {0}")]
    Materialize(#[from] MaterializeError),
    #[error("a scan is already in progress")]
    ScanInProgress,
    #[error("scheduler did not stop within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
