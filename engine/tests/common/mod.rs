// Common test utilities that are shared across integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use remit_engine::{BillingRepository, Delivery, DeliveryError, InMemoryRepository, StoreError, StoreResult};
use remit_shared::{
    AuditLogEntry, Client, Frequency, Invoice, InvoiceStatus, RecurringSchedule, ServiceLine,
};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter("remit_engine=debug")
            .try_init()
            .ok();
    });
}

pub fn test_client(email: Option<&str>) -> Client {
    Client {
        id: Uuid::new_v4(),
        name: "Initech".into(),
        email: email.map(Into::into),
        phone: None,
        billing_address: None,
        created_at: Utc::now(),
        archived_at: None,
    }
}

pub fn monthly_schedule(client_id: Uuid, start_date: NaiveDate) -> RecurringSchedule {
    RecurringSchedule {
        id: Uuid::new_v4(),
        client_id,
        project_id: None,
        lines: vec![
            ServiceLine {
                description: "Managed IT services".into(),
                amount: Decimal::new(250000, 2),
            },
            ServiceLine {
                description: "Cloud backup".into(),
                amount: Decimal::new(15000, 2),
            },
        ],
        frequency: Frequency::Monthly,
        start_date,
        end_date: None,
        is_active: true,
        last_generated: None,
        tax_rate: Decimal::ZERO,
        currency: "USD".into(),
        payment_terms_days: 30,
        created_at: Utc::now(),
        updated_at: None,
    }
}

pub fn overdue_invoice(client_id: Uuid, days_overdue: i64) -> Invoice {
    let id = Uuid::new_v4();
    let issued = Utc::now() - ChronoDuration::days(days_overdue + 30);
    Invoice {
        id,
        schedule_id: None,
        client_id,
        project_id: None,
        number: format!("INV-{}", &id.simple().to_string()[..8].to_uppercase()),
        lines: vec![],
        subtotal: Decimal::new(50000, 2),
        tax_rate: Decimal::ZERO,
        tax_amount: Decimal::ZERO,
        total: Decimal::new(50000, 2),
        currency: "USD".into(),
        status: InvoiceStatus::Unpaid,
        issued_at: issued,
        due_date: Utc::now().date_naive() - ChronoDuration::days(days_overdue),
        notes: None,
        created_at: issued,
    }
}

/// Delivery double that records every message it accepts.
#[derive(Default)]
pub struct RecordingDelivery {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingDelivery {
    pub async fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, subject, _)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .await
            .push((recipient.into(), subject.into(), body.into()));
        Ok(())
    }
}

/// Delivery double that stalls for a fixed delay before accepting. Keeps a
/// scan in flight long enough for overlap and shutdown tests to observe it.
pub struct SlowDelivery {
    pub delay: Duration,
}

#[async_trait]
impl Delivery for SlowDelivery {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), DeliveryError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

/// Repository wrapper with switchable fault injection around an in-memory
/// store. Tests flip the flags and inspect `inner` afterwards.
#[derive(Default)]
pub struct FaultyRepository {
    pub inner: InMemoryRepository,
    pub fail_listing: AtomicBool,
    pub fail_marker_update: AtomicBool,
    pub fail_audit: AtomicBool,
}

#[async_trait]
impl BillingRepository for FaultyRepository {
    async fn list_active_schedules(&self) -> StoreResult<Vec<RecurringSchedule>> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("connection pool exhausted".into()));
        }
        self.inner.list_active_schedules().await
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<RecurringSchedule>> {
        self.inner.get_schedule(id).await
    }

    async fn update_last_generated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if self.fail_marker_update.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.update_last_generated(id, at).await
    }

    async fn create_invoice(&self, invoice: Invoice) -> StoreResult<Uuid> {
        self.inner.create_invoice(invoice).await
    }

    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>> {
        self.inner.get_invoice(id).await
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        self.inner.get_client(id).await
    }

    async fn list_overdue_invoices(&self, days_overdue: i64) -> StoreResult<Vec<Invoice>> {
        self.inner.list_overdue_invoices(days_overdue).await
    }

    async fn append_audit_log(&self, entry: AuditLogEntry) -> StoreResult<()> {
        if self.fail_audit.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("audit table locked".into()));
        }
        self.inner.append_audit_log(entry).await
    }
}
