use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid recurring bill: {0}")]
    InvalidDefinition(String),
    #[error("no such recurring bill: {0}")]
    DefinitionNotFound(String),
    #[error("recurring bill '{0}' is archived")]
    DefinitionInactive(String),
    #[error("invalid payment: {0}")]
    InvalidPayment(String),
    #[error("installment is already {0}")]
    AlreadyTerminal(InstallmentStatus),
    #[error("no such record: {0}")]
    RecordNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    AVencer,
    Vencida,
    Paga,
    Cancelada,
}

impl InstallmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstallmentStatus::AVencer => "a_vencer",
            InstallmentStatus::Vencida => "vencida",
            InstallmentStatus::Paga => "paga",
            InstallmentStatus::Cancelada => "cancelada",
        }
    }

    pub fn parse(raw: &str) -> Option<InstallmentStatus> {
        match raw {
            "a_vencer" => Some(InstallmentStatus::AVencer),
            "vencida" => Some(InstallmentStatus::Vencida),
            "paga" => Some(InstallmentStatus::Paga),
            "cancelada" => Some(InstallmentStatus::Cancelada),
            _ => None,
        }
    }

    /// Terminal statuses are authoritative; the clock never rewrites them.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstallmentStatus::Paga | InstallmentStatus::Cancelada)
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOperation {
    Insert,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOperation::Insert => "INSERT",
            AuditOperation::Update => "UPDATE",
            AuditOperation::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<AuditOperation> {
        match raw {
            "INSERT" => Some(AuditOperation::Insert),
            "UPDATE" => Some(AuditOperation::Update),
            "DELETE" => Some(AuditOperation::Delete),
            _ => None,
        }
    }
}

/// Template for a periodic obligation ("rent, closes on the 28th, due on the 5th").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringBill {
    pub id: Uuid,
    pub name: String,
    pub supplier: Option<String>,
    pub category: Option<String>,
    /// Day of month the period closes for accrual. Optional.
    pub closing_day: Option<u32>,
    /// Day of month payment is due. 1-31, clamped in short months.
    pub due_day: u32,
    pub expected_amount: Decimal,
    pub active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringBill {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=31).contains(&self.due_day) {
            return Err(CoreError::InvalidDefinition(format!(
                "due day must be between 1 and 31, got {}",
                self.due_day
            )));
        }
        if let Some(closing) = self.closing_day {
            if !(1..=31).contains(&closing) {
                return Err(CoreError::InvalidDefinition(format!(
                    "closing day must be between 1 and 31, got {closing}"
                )));
            }
        }
        if self.expected_amount < Decimal::ZERO {
            return Err(CoreError::InvalidDefinition(
                "expected amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// One calendar period's instantiation of a recurring bill.
/// At most one exists per (bill, year_month).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillOccurrence {
    pub id: Uuid,
    pub bill_id: Uuid,
    /// First-of-month anchor for the period.
    pub year_month: NaiveDate,
    pub closing_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    /// Operator-confirmed completion, independent of payment status.
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// A single payable unit, either occurrence-derived or part of a manual bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installment {
    pub id: Uuid,
    pub occurrence_id: Option<Uuid>,
    pub description: String,
    pub supplier: Option<String>,
    pub category: Option<String>,
    pub installment_number: u32,
    pub total_installments: u32,
    /// Original scheduled amount.
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub due_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
    pub status: InstallmentStatus,
    pub interest: Decimal,
    pub penalty: Decimal,
    pub discount: Decimal,
    pub payment_method: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub amount_paid: Decimal,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub bank_account: Option<String>,
    pub interest: Decimal,
    pub penalty: Decimal,
    pub discount: Decimal,
    pub notes: Option<String>,
}

impl PaymentInput {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.amount_paid < Decimal::ZERO {
            return Err(CoreError::InvalidPayment(
                "paid amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduled amount plus charges, minus discount. The recorded paid amount
/// stays whatever the operator settled; under- and overpayment are both
/// accepted and simply recorded.
pub fn total_due(amount: Decimal, payment: &PaymentInput) -> Decimal {
    amount + payment.interest + payment.penalty - payment.discount
}

/// Immutable before/after record of one mutation to a tracked row.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub table_name: String,
    pub record_id: String,
    pub operation: AuditOperation,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub old_data: Option<serde_json::Value>,
    pub new_data: Option<serde_json::Value>,
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Places `day` inside the month of `year_month`, clamping to the last valid
/// day (day 31 in February lands on the 28th or 29th).
pub fn clamped_date(year_month: NaiveDate, day: u32) -> NaiveDate {
    let last = last_day_of_month(year_month.year(), year_month.month());
    year_month
        .with_day(day.clamp(1, last))
        .unwrap_or(year_month)
}

pub fn next_month(year_month: NaiveDate) -> NaiveDate {
    let (year, month) = if year_month.month() == 12 {
        (year_month.year() + 1, 1)
    } else {
        (year_month.year(), year_month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(year_month)
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Due date for a period. When the closing day is numerically greater than
/// the due day ("closes on the 28th, due on the 5th"), the due date rolls
/// into the following month.
pub fn due_date_for(bill: &RecurringBill, year_month: NaiveDate) -> NaiveDate {
    match bill.closing_day {
        Some(closing) if closing > bill.due_day => {
            clamped_date(next_month(year_month), bill.due_day)
        }
        _ => clamped_date(year_month, bill.due_day),
    }
}

pub fn closing_date_for(bill: &RecurringBill, year_month: NaiveDate) -> Option<NaiveDate> {
    bill.closing_day
        .map(|closing| clamped_date(year_month, closing))
}

/// Date-only comparison; a bill due today is not overdue.
pub fn is_overdue(due_date: NaiveDate, reference: NaiveDate) -> bool {
    due_date < reference
}

/// Status visible to readers. Terminal stored statuses win; anything else is
/// recomputed from the clock, so a stale persisted "vencida" is never trusted.
pub fn current_status(installment: &Installment, today: NaiveDate) -> InstallmentStatus {
    if installment.status.is_terminal() {
        return installment.status;
    }
    if is_overdue(installment.due_date, today) {
        InstallmentStatus::Vencida
    } else {
        InstallmentStatus::AVencer
    }
}

/// Splits a manual bill total into `count` cent-rounded parts that sum back
/// to the total; the cent remainder lands on the first installment.
pub fn split_installment_amounts(total: Decimal, count: u32) -> Vec<Decimal> {
    let count = count.max(1);
    let base = (total / Decimal::from(count)).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let mut parts = vec![base; count as usize];
    parts[0] += total - base * Decimal::from(count);
    parts
}
