// Invoice scheduler - periodic scans over recurring schedules plus manual triggers

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use remit_shared::{
    AuditAction, AuditActor, AuditLogEntry, Frequency, Invoice, NotificationKind,
    RecurringSchedule,
};

use crate::config::SchedulerConfig;
use crate::delivery::Delivery;
use crate::error::{SchedulerError, SchedulerResult};
use crate::materializer::{self, InvoiceMaterializer};
use crate::notifications::NotificationManager;
use crate::recurrence;
use crate::repository::BillingRepository;

/// Result of one billing scan over the active schedules.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub schedules_checked: usize,
    pub generated: Vec<GeneratedInvoiceRef>,
    pub errors: Vec<ScanFailure>,
    pub total_invoiced: Decimal,
    pub notifications_sent: usize,
}

impl ScanOutcome {
    pub fn generated_count(&self) -> usize {
        self.generated.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedInvoiceRef {
    pub schedule_id: Uuid,
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanFailure {
    pub schedule_id: Uuid,
    pub reason: String,
}

/// One entry in the billing forecast: a schedule whose next invoice falls
/// within the requested window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingInvoice {
    pub schedule_id: Uuid,
    pub client_id: Uuid,
    pub client_name: String,
    pub frequency: Frequency,
    pub amount: Decimal,
    pub currency: String,
    pub next_due: chrono::NaiveDate,
    pub days_until: i64,
}

struct GenerationRecord {
    invoice: Invoice,
    notified: bool,
}

struct Worker {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    repo: Arc<dyn BillingRepository>,
    materializer: InvoiceMaterializer,
    notifier: NotificationManager,
    config: SchedulerConfig,
    // Held for the duration of any scan; `try_lock` gives timer ticks their
    // skip-if-busy behavior while manual triggers wait their turn.
    scan_lock: Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

/// Drives recurring-invoice generation. One instance owns the background
/// worker; clones share it.
#[derive(Clone)]
pub struct InvoiceScheduler {
    inner: Arc<SchedulerInner>,
}

impl InvoiceScheduler {
    pub fn new(
        repo: Arc<dyn BillingRepository>,
        delivery: Arc<dyn Delivery>,
        config: SchedulerConfig,
    ) -> Self {
        let materializer = InvoiceMaterializer::new(repo.clone());
        let notifier = NotificationManager::new(repo.clone(), delivery);
        Self {
            inner: Arc::new(SchedulerInner {
                repo,
                materializer,
                notifier,
                config,
                scan_lock: Mutex::new(()),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Launch the background worker. Starting an already-running scheduler is
    /// a no-op.
    pub async fn start(&self) {
        let mut slot = self.inner.worker.lock().await;
        if let Some(worker) = slot.as_ref() {
            if !worker.handle.is_finished() {
                debug!("Invoice scheduler is already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move { scheduler.run_loop(shutdown_rx).await });
        *slot = Some(Worker {
            shutdown_tx,
            handle,
        });

        info!(
            "Invoice scheduler started (check interval: {:?})",
            self.inner.config.check_interval
        );
    }

    /// Signal the worker to shut down and wait for it to drain. An in-flight
    /// scan is allowed to finish; if it does not within the configured
    /// timeout the worker is aborted and the timeout is reported.
    pub async fn stop(&self) -> SchedulerResult<()> {
        let worker = self.inner.worker.lock().await.take();
        let Some(worker) = worker else {
            debug!("Invoice scheduler is not running");
            return Ok(());
        };

        let _ = worker.shutdown_tx.send(true);
        let mut handle = worker.handle;
        match tokio::time::timeout(self.inner.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {
                info!("Invoice scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Invoice scheduler worker ended abnormally: {}", e);
                Ok(())
            }
            Err(_) => {
                handle.abort();
                Err(SchedulerError::ShutdownTimeout(
                    self.inner.config.shutdown_timeout,
                ))
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    async fn run_loop(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.inner.config.check_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_tick().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Invoice scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_tick(&self) {
        match self.process_recurring_invoices().await {
            Ok(outcome) => {
                if outcome.generated_count() > 0 || !outcome.errors.is_empty() {
                    info!(
                        "Billing scan completed: {} invoices generated across {} schedules, {} errors, {} total",
                        outcome.generated_count(),
                        outcome.schedules_checked,
                        outcome.errors.len(),
                        outcome.total_invoiced
                    );
                } else {
                    debug!(
                        "Billing scan completed: nothing due across {} schedules",
                        outcome.schedules_checked
                    );
                }
            }
            Err(SchedulerError::ScanInProgress) => {
                debug!("Skipping billing scan: a previous scan is still running");
            }
            Err(e) => {
                error!("Billing scan failed: {}", e);
            }
        }

        if self.inner.config.auto_reminders_enabled {
            match self
                .inner
                .notifier
                .send_batch_reminders(self.inner.config.reminder_days_overdue)
                .await
            {
                Ok(outcome) if outcome.reminders_sent > 0 || !outcome.errors.is_empty() => {
                    info!(
                        "Reminder sweep: {} sent, {} errors",
                        outcome.reminders_sent,
                        outcome.errors.len()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Reminder sweep failed: {}", e);
                }
            }
        }
    }

    /// Run one billing scan now: examine every active schedule in id order and
    /// generate an invoice for each that is due. Per-schedule failures are
    /// collected into the outcome; only an overlapping scan or a failure to
    /// list the schedules aborts the whole pass.
    pub async fn process_recurring_invoices(&self) -> SchedulerResult<ScanOutcome> {
        let _guard = self
            .inner
            .scan_lock
            .try_lock()
            .map_err(|_| SchedulerError::ScanInProgress)?;

        let now = Utc::now();
        let mut schedules = self.inner.repo.list_active_schedules().await?;
        schedules.sort_by_key(|schedule| schedule.id);

        let mut outcome = ScanOutcome {
            schedules_checked: schedules.len(),
            ..Default::default()
        };

        for schedule in schedules.iter().filter(|s| recurrence::is_due(s, now)) {
            match self.generate_for(schedule, now, AuditActor::Scheduler).await {
                Ok(record) => {
                    outcome.total_invoiced += record.invoice.total;
                    if record.notified {
                        outcome.notifications_sent += 1;
                    }
                    outcome.generated.push(GeneratedInvoiceRef {
                        schedule_id: schedule.id,
                        invoice_id: record.invoice.id,
                    });
                }
                Err(e) => {
                    error!(
                        "Failed to generate invoice for schedule {}: {}",
                        schedule.id, e
                    );
                    outcome.errors.push(ScanFailure {
                        schedule_id: schedule.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Generate an invoice for one schedule on demand, bypassing the due-date
    /// check. Waits for any in-flight scan rather than skipping. Inactive
    /// schedules are refused before anything is written.
    pub async fn manual_generate(&self, schedule_id: Uuid) -> SchedulerResult<Uuid> {
        let _guard = self.inner.scan_lock.lock().await;

        let schedule = self
            .inner
            .repo
            .get_schedule(schedule_id)
            .await?
            .ok_or(SchedulerError::ScheduleNotFound(schedule_id))?;
        if !schedule.is_active {
            return Err(SchedulerError::InactiveSchedule(schedule_id));
        }

        let record = self
            .generate_for(&schedule, Utc::now(), AuditActor::Manual)
            .await?;
        info!(
            "Manually generated invoice {} for schedule {}",
            record.invoice.number, schedule_id
        );
        Ok(record.invoice.id)
    }

    /// Read-only billing forecast: schedules whose next invoice is due within
    /// the next `days_ahead` days, soonest first. Schedules due today belong
    /// to the scan, not the forecast.
    pub async fn get_upcoming_invoices(
        &self,
        days_ahead: i64,
    ) -> SchedulerResult<Vec<UpcomingInvoice>> {
        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(days_ahead);

        let mut upcoming = Vec::new();
        for schedule in self.inner.repo.list_active_schedules().await? {
            let next_due = recurrence::next_due_date(&schedule);
            if next_due <= today || next_due > horizon {
                continue;
            }
            if schedule.end_date.is_some_and(|end| next_due > end) {
                continue;
            }

            match self.inner.repo.get_client(schedule.client_id).await? {
                Some(client) => {
                    let (_, _, total) = materializer::invoice_totals(&schedule);
                    upcoming.push(UpcomingInvoice {
                        schedule_id: schedule.id,
                        client_id: schedule.client_id,
                        client_name: client.name,
                        frequency: schedule.frequency,
                        amount: total,
                        currency: schedule.currency,
                        next_due,
                        days_until: (next_due - today).num_days(),
                    });
                }
                None => {
                    debug!(
                        "Skipping forecast entry for schedule {}: client {} no longer exists",
                        schedule.id, schedule.client_id
                    );
                }
            }
        }

        upcoming.sort_by_key(|entry| (entry.next_due, entry.schedule_id));
        Ok(upcoming)
    }

    async fn generate_for(
        &self,
        schedule: &RecurringSchedule,
        now: DateTime<Utc>,
        actor: AuditActor,
    ) -> SchedulerResult<GenerationRecord> {
        let invoice = match self.inner.materializer.materialize(schedule, now).await {
            Ok(invoice) => invoice,
            Err(e) => {
                let entry = AuditLogEntry::new(
                    actor,
                    AuditAction::GenerateInvoice,
                    "schedule",
                    schedule.id,
                )
                .failed(e.to_string());
                self.append_audit(entry).await;
                return Err(e.into());
            }
        };

        // Advancing the marker is what makes the next scan skip this
        // schedule; a failure here must surface even though the invoice
        // already exists.
        if let Err(e) = self
            .inner
            .repo
            .update_last_generated(schedule.id, now)
            .await
        {
            let entry = AuditLogEntry::new(
                actor,
                AuditAction::GenerateInvoice,
                "schedule",
                schedule.id,
            )
            .failed(format!(
                "invoice {} created but marker update failed: {}",
                invoice.number, e
            ));
            self.append_audit(entry).await;
            return Err(SchedulerError::Store(e));
        }

        let entry = AuditLogEntry::new(actor, AuditAction::GenerateInvoice, "invoice", invoice.id)
            .with_metadata(json!({
                "schedule_id": schedule.id,
                "invoice_number": invoice.number,
                "total": invoice.total,
            }));
        self.append_audit(entry).await;

        let notified = match self
            .inner
            .notifier
            .send_invoice_notification(invoice.id, NotificationKind::Created)
            .await
        {
            Ok(outcome) => outcome.delivered,
            Err(e) => {
                warn!(
                    "Invoice {} was generated but the created notification failed: {}",
                    invoice.number, e
                );
                false
            }
        };

        Ok(GenerationRecord { invoice, notified })
    }

    async fn append_audit(&self, entry: AuditLogEntry) {
        if let Err(e) = self.inner.repo.append_audit_log(entry).await {
            warn!("Failed to record audit entry: {}", e);
        }
    }
}
