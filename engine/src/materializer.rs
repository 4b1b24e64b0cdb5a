// Invoice materializer - turns a due schedule into a persisted invoice

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use remit_shared::{Invoice, InvoiceStatus, RecurringSchedule};

use crate::error::MaterializeError;
use crate::repository::BillingRepository;

/// Note stamped on every invoice this engine generates.
pub const AUTO_GENERATED_NOTE: &str = "Auto-generated from recurring schedule";

pub struct InvoiceMaterializer {
    repo: Arc<dyn BillingRepository>,
}

impl InvoiceMaterializer {
    pub fn new(repo: Arc<dyn BillingRepository>) -> Self {
        Self { repo }
    }

    /// Copy the schedule's template into a new unpaid invoice and persist it.
    ///
    /// The schedule row is left untouched: advancing `last_generated` is the
    /// scheduler's job, and happens only after this write has succeeded. On
    /// any failure here the schedule stays due and is retried next scan.
    pub async fn materialize(
        &self,
        schedule: &RecurringSchedule,
        now: DateTime<Utc>,
    ) -> Result<Invoice, MaterializeError> {
        if schedule.lines.is_empty() {
            return Err(MaterializeError::EmptyTemplate(schedule.id));
        }

        let client = self
            .repo
            .get_client(schedule.client_id)
            .await?
            .ok_or(MaterializeError::ClientMissing(schedule.client_id))?;

        let (subtotal, tax_amount, total) = invoice_totals(schedule);
        let id = Uuid::new_v4();
        let invoice = Invoice {
            id,
            schedule_id: Some(schedule.id),
            client_id: client.id,
            project_id: schedule.project_id,
            number: invoice_number_for(id),
            lines: schedule.lines.clone(),
            subtotal,
            tax_rate: schedule.tax_rate,
            tax_amount,
            total,
            currency: schedule.currency.clone(),
            status: InvoiceStatus::Unpaid,
            issued_at: now,
            due_date: now.date_naive() + Duration::days(schedule.payment_terms_days),
            notes: Some(AUTO_GENERATED_NOTE.to_string()),
            created_at: now,
        };

        self.repo.create_invoice(invoice.clone()).await?;
        info!(
            "Generated invoice {} for {} ({} {})",
            invoice.number, client.name, invoice.total, invoice.currency
        );

        Ok(invoice)
    }
}

/// Subtotal, tax, and grand total for an invoice generated from `schedule`,
/// with tax rounded to cents.
pub fn invoice_totals(schedule: &RecurringSchedule) -> (Decimal, Decimal, Decimal) {
    let subtotal = schedule.subtotal();
    let tax_amount = (subtotal * schedule.tax_rate / Decimal::ONE_HUNDRED).round_dp(2);
    (subtotal, tax_amount, subtotal + tax_amount)
}

/// Human-facing invoice reference derived from the record id.
pub fn invoice_number_for(id: Uuid) -> String {
    format!("INV-{}", id.simple().to_string()[..8].to_uppercase())
}
