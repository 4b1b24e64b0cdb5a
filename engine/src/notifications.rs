// Notification manager - composes and dispatches invoice lifecycle messages

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use remit_shared::{AuditAction, AuditActor, AuditLogEntry, Client, Invoice, NotificationKind};

use crate::delivery::Delivery;
use crate::error::NotifyError;
use crate::repository::BillingRepository;

/// Outcome of one notification attempt. Delivery trouble (transport failure,
/// client without an email address) lands here rather than in an `Err` so
/// batch callers keep going; the attempt is audited either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub invoice_id: Uuid,
    pub kind: NotificationKind,
    pub recipient: Option<String>,
    pub delivered: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderFailure {
    pub invoice_id: Uuid,
    pub reason: String,
}

/// Aggregate result of one overdue-reminder sweep.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReminderOutcome {
    pub invoices_checked: usize,
    pub reminders_sent: usize,
    pub errors: Vec<ReminderFailure>,
}

pub struct NotificationManager {
    repo: Arc<dyn BillingRepository>,
    delivery: Arc<dyn Delivery>,
}

impl NotificationManager {
    pub fn new(repo: Arc<dyn BillingRepository>, delivery: Arc<dyn Delivery>) -> Self {
        Self { repo, delivery }
    }

    /// Compose and dispatch one lifecycle notification for an invoice,
    /// recording the attempt in the audit log.
    ///
    /// Missing invoice or client is an `Err`; everything past the lookups is
    /// reported through the returned outcome.
    pub async fn send_invoice_notification(
        &self,
        invoice_id: Uuid,
        kind: NotificationKind,
    ) -> Result<NotificationOutcome, NotifyError> {
        let invoice = self
            .repo
            .get_invoice(invoice_id)
            .await?
            .ok_or(NotifyError::InvoiceNotFound(invoice_id))?;
        let client = self
            .repo
            .get_client(invoice.client_id)
            .await?
            .ok_or(NotifyError::ClientNotFound(invoice.client_id))?;

        let outcome = match client.email.clone() {
            None => {
                warn!(
                    "Cannot send {} notification for invoice {}: client {} has no email address",
                    kind.as_str(),
                    invoice.number,
                    client.name
                );
                NotificationOutcome {
                    invoice_id,
                    kind,
                    recipient: None,
                    delivered: false,
                    error: Some("client has no email address".into()),
                }
            }
            Some(recipient) => {
                let (subject, body) = compose_message(&invoice, &client, kind);
                match self.delivery.send(&recipient, &subject, &body).await {
                    Ok(()) => {
                        info!(
                            "Sent {} notification for invoice {} to {}",
                            kind.as_str(),
                            invoice.number,
                            recipient
                        );
                        NotificationOutcome {
                            invoice_id,
                            kind,
                            recipient: Some(recipient),
                            delivered: true,
                            error: None,
                        }
                    }
                    Err(e) => {
                        error!(
                            "Failed to send {} notification for invoice {}: {}",
                            kind.as_str(),
                            invoice.number,
                            e
                        );
                        NotificationOutcome {
                            invoice_id,
                            kind,
                            recipient: Some(recipient),
                            delivered: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        };

        self.record_attempt(&invoice, &outcome).await;
        Ok(outcome)
    }

    /// One reminder sweep: every outstanding invoice at least `days_overdue`
    /// days past due gets a `reminder` notification. Per-invoice failures are
    /// aggregated; only the repository listing itself is fatal.
    pub async fn send_batch_reminders(
        &self,
        days_overdue: i64,
    ) -> Result<ReminderOutcome, NotifyError> {
        let overdue = self.repo.list_overdue_invoices(days_overdue).await?;

        let mut outcome = ReminderOutcome {
            invoices_checked: overdue.len(),
            ..Default::default()
        };

        for invoice in overdue {
            match self
                .send_invoice_notification(invoice.id, NotificationKind::Reminder)
                .await
            {
                Ok(sent) if sent.delivered => outcome.reminders_sent += 1,
                Ok(sent) => outcome.errors.push(ReminderFailure {
                    invoice_id: invoice.id,
                    reason: sent.error.unwrap_or_else(|| "delivery failed".into()),
                }),
                Err(e) => outcome.errors.push(ReminderFailure {
                    invoice_id: invoice.id,
                    reason: e.to_string(),
                }),
            }
        }

        info!(
            "Reminder sweep completed: {} checked, {} sent, {} errors",
            outcome.invoices_checked,
            outcome.reminders_sent,
            outcome.errors.len()
        );

        Ok(outcome)
    }

    async fn record_attempt(&self, invoice: &Invoice, outcome: &NotificationOutcome) {
        let mut entry = AuditLogEntry::new(
            AuditActor::Scheduler,
            AuditAction::SendNotification,
            "invoice",
            invoice.id,
        )
        .with_metadata(json!({
            "kind": outcome.kind.as_str(),
            "invoice_number": invoice.number,
            "recipient": outcome.recipient,
        }));

        if !outcome.delivered {
            let reason = outcome.error.as_deref().unwrap_or("delivery failed");
            entry = entry.failed(reason);
        }

        if let Err(e) = self.repo.append_audit_log(entry).await {
            warn!(
                "Failed to record notification audit entry for invoice {}: {}",
                invoice.number, e
            );
        }
    }
}

/// Subject and plain-text body for one notification. Pure; the delivery
/// transport decides nothing about content.
pub fn compose_message(
    invoice: &Invoice,
    client: &Client,
    kind: NotificationKind,
) -> (String, String) {
    let subject = match kind {
        NotificationKind::Created => format!("New Invoice {}", invoice.number),
        NotificationKind::Reminder => format!("Payment Reminder: Invoice {}", invoice.number),
        NotificationKind::Overdue => format!("[OVERDUE] Invoice {}", invoice.number),
    };

    let opening = match kind {
        NotificationKind::Created => "A new invoice has been generated for your account.",
        NotificationKind::Reminder => {
            "This is a friendly reminder that the invoice below is awaiting payment."
        }
        NotificationKind::Overdue => "Our records show the invoice below is past its due date.",
    };

    let closing = match kind {
        NotificationKind::Created => "Thank you for your business!",
        NotificationKind::Reminder => {
            "If you have already made this payment, please disregard this reminder."
        }
        NotificationKind::Overdue => {
            "Please arrange payment at your earliest convenience to avoid service interruption."
        }
    };

    let body = format!(
        "Dear {},\n\n{}\n\nInvoice number: {}\nAmount due: {} {}\nIssued: {}\nDue date: {}\n\n{}\n",
        client.name,
        opening,
        invoice.number,
        invoice.total,
        invoice.currency,
        invoice.issued_at.format("%B %d, %Y"),
        invoice.due_date.format("%B %d, %Y"),
        closing
    );

    (subject, body)
}
