use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

/// One line of a schedule's service template, copied verbatim onto every
/// invoice generated from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLine {
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    pub id: Uuid,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub lines: Vec<ServiceLine>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub last_generated: Option<DateTime<Utc>>,
    pub tax_rate: Decimal, // percent
    pub currency: String,  // ISO 4217 code
    pub payment_terms_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecurringSchedule {
    /// Sum of the template lines, before tax.
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Unpaid or partially paid invoices still carry a balance and qualify
    /// for payment reminders.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Unpaid | Self::PartiallyPaid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub schedule_id: Option<Uuid>,
    pub client_id: Uuid,
    pub project_id: Option<Uuid>,
    pub number: String,
    pub lines: Vec<ServiceLine>,
    pub subtotal: Decimal,
    pub tax_rate: Decimal, // percent
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Days this invoice is past its due date at `today`. Negative while the
    /// due date is still in the future.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Created,
    Reminder,
    Overdue,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Reminder => "reminder",
            Self::Overdue => "overdue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditActor {
    Scheduler,
    Manual,
}

impl AuditActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    GenerateInvoice,
    SendNotification,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateInvoice => "generate_invoice",
            Self::SendNotification => "send_notification",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Append-only record of one automated action. Entries are never mutated or
/// deleted by the billing engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor: AuditActor,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub outcome: AuditOutcome,
    pub detail: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        actor: AuditActor,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            action,
            entity_type: entity_type.into(),
            entity_id,
            outcome: AuditOutcome::Success,
            detail: None,
            metadata: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.outcome = AuditOutcome::Failure;
        self.detail = Some(detail.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
