// Billing repository - the persistence boundary consumed by the engine

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use remit_shared::{AuditLogEntry, Client, Invoice, RecurringSchedule};

use crate::error::{StoreError, StoreResult};

/// Storage operations the engine needs from the host's data layer.
///
/// The durable schema belongs to the implementation; the engine only sees
/// the record shapes from `remit-shared`. Implementations are expected to
/// serialize concurrent writes to the same schedule row, and lookups return
/// `Ok(None)` for absent rows rather than an error.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    /// Every schedule with `is_active` set, in no particular order. The
    /// scheduler sorts by id before processing.
    async fn list_active_schedules(&self) -> StoreResult<Vec<RecurringSchedule>>;

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<RecurringSchedule>>;

    /// Advance a schedule's `last_generated` marker in a single atomic write.
    /// Fails with `StoreError::NotFound` if the schedule row is gone.
    async fn update_last_generated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    /// Persist a freshly materialized invoice, returning its id.
    async fn create_invoice(&self, invoice: Invoice) -> StoreResult<Uuid>;

    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>>;

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>>;

    /// Outstanding (unpaid or partially paid) invoices at least
    /// `days_overdue` days past their due date, oldest due date first.
    async fn list_overdue_invoices(&self, days_overdue: i64) -> StoreResult<Vec<Invoice>>;

    async fn append_audit_log(&self, entry: AuditLogEntry) -> StoreResult<()>;
}

/// Hash-map repository behind a `tokio` RwLock. Backs the test-suite and
/// hosts that embed the engine without a durable store.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    clients: HashMap<Uuid, Client>,
    schedules: HashMap<Uuid, RecurringSchedule>,
    invoices: HashMap<Uuid, Invoice>,
    audit_log: Vec<AuditLogEntry>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_client(&self, client: Client) {
        self.inner.write().await.clients.insert(client.id, client);
    }

    pub async fn insert_schedule(&self, schedule: RecurringSchedule) {
        self.inner
            .write()
            .await
            .schedules
            .insert(schedule.id, schedule);
    }

    pub async fn insert_invoice(&self, invoice: Invoice) {
        self.inner
            .write()
            .await
            .invoices
            .insert(invoice.id, invoice);
    }

    pub async fn remove_client(&self, id: Uuid) {
        self.inner.write().await.clients.remove(&id);
    }

    /// Snapshot of the audit trail in append order.
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.inner.read().await.audit_log.clone()
    }

    /// Invoices generated from one schedule, ordered by generation time.
    pub async fn invoices_for_schedule(&self, schedule_id: Uuid) -> Vec<Invoice> {
        let state = self.inner.read().await;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|invoice| invoice.schedule_id == Some(schedule_id))
            .cloned()
            .collect();
        invoices.sort_by_key(|invoice| invoice.issued_at);
        invoices
    }

    pub async fn invoice_count(&self) -> usize {
        self.inner.read().await.invoices.len()
    }
}

#[async_trait]
impl BillingRepository for InMemoryRepository {
    async fn list_active_schedules(&self) -> StoreResult<Vec<RecurringSchedule>> {
        let state = self.inner.read().await;
        Ok(state
            .schedules
            .values()
            .filter(|schedule| schedule.is_active)
            .cloned()
            .collect())
    }

    async fn get_schedule(&self, id: Uuid) -> StoreResult<Option<RecurringSchedule>> {
        Ok(self.inner.read().await.schedules.get(&id).cloned())
    }

    async fn update_last_generated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.inner.write().await;
        let schedule = state.schedules.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "schedule",
            id,
        })?;
        schedule.last_generated = Some(at);
        schedule.updated_at = Some(at);
        Ok(())
    }

    async fn create_invoice(&self, invoice: Invoice) -> StoreResult<Uuid> {
        let id = invoice.id;
        self.inner.write().await.invoices.insert(id, invoice);
        Ok(id)
    }

    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>> {
        Ok(self.inner.read().await.invoices.get(&id).cloned())
    }

    async fn get_client(&self, id: Uuid) -> StoreResult<Option<Client>> {
        Ok(self.inner.read().await.clients.get(&id).cloned())
    }

    async fn list_overdue_invoices(&self, days_overdue: i64) -> StoreResult<Vec<Invoice>> {
        let today = Utc::now().date_naive();
        let state = self.inner.read().await;
        let mut overdue: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|invoice| {
                invoice.status.is_outstanding() && invoice.days_overdue(today) >= days_overdue
            })
            .cloned()
            .collect();
        overdue.sort_by_key(|invoice| invoice.due_date);
        Ok(overdue)
    }

    async fn append_audit_log(&self, entry: AuditLogEntry) -> StoreResult<()> {
        self.inner.write().await.audit_log.push(entry);
        Ok(())
    }
}
