use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

/// 100% expressed in basis points.
pub const MAX_TAX_RATE_BP: i64 = 10_000;

doc_state! {
    /// Lifecycle state of a sales invoice.
    ///
    /// ```text
    /// DRAFT → ISSUED → PARTIALLY_PAID → PAID
    ///         ISSUED → PAID
    ///         ISSUED → VOIDED
    /// DRAFT → CANCELLED
    /// ```
    pub enum InvoiceStatus {
        Draft = "DRAFT",
        Issued = "ISSUED",
        PartiallyPaid = "PARTIALLY_PAID",
        Paid = "PAID",
        Cancelled = "CANCELLED",
        Voided = "VOIDED",
    }
    terminal = [Paid, Cancelled, Voided];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub tax_rate_bp: i64,
}

impl InvoiceLine {
    pub fn net_cents(&self) -> Result<i64, ServiceError> {
        self.quantity
            .checked_mul(self.unit_price_cents)
            .ok_or_else(|| {
                ServiceError::Validation(format!("line '{}' amount is too large", self.description))
            })
    }

    /// Line tax, rounded half-up to the cent.
    ///
    /// Computed in `i128`; with the rate capped at 100% the result never
    /// exceeds the net amount.
    pub fn tax_cents(&self) -> Result<i64, ServiceError> {
        let net = i128::from(self.net_cents()?);
        let bp = i128::from(self.tax_rate_bp);
        let max = i128::from(MAX_TAX_RATE_BP);
        i64::try_from((net * bp + max / 2) / max).map_err(|_| {
            ServiceError::Validation(format!("line '{}' tax is too large", self.description))
        })
    }
}

/// A payment applied to an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub amount_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub recorded_by: String,
    pub paid_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    pub customer_id: String,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
    #[serde(default)]
    pub subtotal_cents: i64,
    #[serde(default)]
    pub tax_cents: i64,
    #[serde(default)]
    pub total_cents: i64,
    #[serde(default)]
    pub paid_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub void_reason: Option<String>,
}

impl InvoiceData {
    pub fn outstanding_cents(&self) -> i64 {
        self.total_cents - self.paid_cents
    }

    fn recompute_totals(&mut self) -> Result<(), ServiceError> {
        let too_large = || ServiceError::Validation("invoice total is too large".into());
        let mut subtotal: i64 = 0;
        let mut tax: i64 = 0;
        for line in &self.lines {
            subtotal = subtotal.checked_add(line.net_cents()?).ok_or_else(too_large)?;
            tax = tax.checked_add(line.tax_cents()?).ok_or_else(too_large)?;
        }
        self.subtotal_cents = subtotal;
        self.tax_cents = tax;
        self.total_cents = subtotal.checked_add(tax).ok_or_else(too_large)?;
        Ok(())
    }
}

pub struct Invoice;

impl Lifecycle for Invoice {
    type State = InvoiceStatus;
    type Data = InvoiceData;

    const KIND: &'static str = "sales.invoice";
    const NUMBER_PREFIX: &'static str = "INV";
    const CREATE_PERMISSION: &'static str = "sales:invoice:create";
    const READ_PERMISSION: &'static str = "sales:invoice:read";
    const UPDATE_PERMISSION: &'static str = "sales:invoice:update";
    const INITIAL: InvoiceStatus = InvoiceStatus::Draft;
    const EDITABLE: &'static [InvoiceStatus] = &[InvoiceStatus::Draft];
    const RULES: &'static [Rule<InvoiceStatus>] = &[
        Rule {
            action: "issue",
            from: &[InvoiceStatus::Draft],
            to: &[InvoiceStatus::Issued],
            permission: "sales:invoice:issue",
        },
        Rule {
            action: "pay",
            from: &[InvoiceStatus::Issued, InvoiceStatus::PartiallyPaid],
            to: &[InvoiceStatus::PartiallyPaid, InvoiceStatus::Paid],
            permission: "sales:invoice:pay",
        },
        Rule {
            action: "void",
            from: &[InvoiceStatus::Issued],
            to: &[InvoiceStatus::Voided],
            permission: "sales:invoice:void",
        },
        Rule {
            action: "cancel",
            from: &[InvoiceStatus::Draft],
            to: &[InvoiceStatus::Cancelled],
            permission: "sales:invoice:cancel",
        },
    ];

    /// Drafts carry no payments; totals always come from the lines.
    fn prepare(data: &mut InvoiceData) -> Result<(), ServiceError> {
        data.customer_id = data.customer_id.trim().to_string();
        if data.customer_id.is_empty() {
            return Err(ServiceError::Validation("customerId is required".into()));
        }
        for (i, line) in data.lines.iter().enumerate() {
            if line.quantity <= 0 {
                return Err(ServiceError::Validation(format!(
                    "line {} quantity must be positive",
                    i + 1
                )));
            }
            if line.unit_price_cents < 0 {
                return Err(ServiceError::Validation(format!(
                    "line {} price must not be negative",
                    i + 1
                )));
            }
            if !(0..=MAX_TAX_RATE_BP).contains(&line.tax_rate_bp) {
                return Err(ServiceError::Validation(format!(
                    "line {} tax rate must be within 0..={MAX_TAX_RATE_BP} bp",
                    i + 1
                )));
            }
        }
        data.paid_cents = 0;
        data.payments.clear();
        data.void_reason = None;
        data.recompute_totals()
    }
}

/// Body of `POST /invoices/{id}/@pay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}
