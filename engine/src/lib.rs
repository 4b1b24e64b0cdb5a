// Remit billing engine - recurring invoice generation and notifications

pub mod config;
pub mod delivery;
pub mod error;
pub mod materializer;
pub mod notifications;
pub mod recurrence;
pub mod repository;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use delivery::{Delivery, LogDelivery};
pub use error::{
    DeliveryError, MaterializeError, NotifyError, SchedulerError, SchedulerResult, StoreError,
    StoreResult,
};
pub use materializer::{AUTO_GENERATED_NOTE, InvoiceMaterializer};
pub use notifications::{
    NotificationManager, NotificationOutcome, ReminderFailure, ReminderOutcome,
};
pub use repository::{BillingRepository, InMemoryRepository};
pub use scheduler::{
    GeneratedInvoiceRef, InvoiceScheduler, ScanFailure, ScanOutcome, UpcomingInvoice,
};
