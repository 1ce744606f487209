use std::sync::Arc;

use axum::extract::FromRef;

use docflow::{Doc, DocFlow, IdempotencyKey};
use fabrica_core::types::MAX_LIMIT;
use fabrica_core::{now_rfc3339, Principal, ServiceError};

use crate::model::{Invoice, InvoiceData, InvoiceStatus, Payment, PaymentRequest};
use crate::receivables::{CustomerBalance, EntryType, LedgerEntry, Posting, Receivables};

pub const RECEIVABLES_READ: &str = "sales:receivable:read";

/// Invoicing and the receivables it feeds.
#[derive(Clone)]
pub struct SalesService {
    flow: Arc<DocFlow>,
    receivables: Arc<Receivables>,
}

impl FromRef<SalesService> for Arc<DocFlow> {
    fn from_ref(service: &SalesService) -> Self {
        Arc::clone(&service.flow)
    }
}

impl SalesService {
    pub fn new(flow: Arc<DocFlow>) -> Result<Self, ServiceError> {
        let receivables = Arc::new(Receivables::new(Arc::clone(flow.db()))?);
        Ok(Self { flow, receivables })
    }

    pub fn flow(&self) -> &Arc<DocFlow> {
        &self.flow
    }

    pub fn receivables(&self) -> &Arc<Receivables> {
        &self.receivables
    }

    // =======================================================================
    // Invoices
    // =======================================================================

    pub fn create_invoice(
        &self,
        principal: &Principal,
        data: InvoiceData,
    ) -> Result<Doc<Invoice>, ServiceError> {
        self.flow.create::<Invoice>(principal, data, None)
    }

    /// DRAFT → ISSUED. The customer is debited in the same transaction.
    pub fn issue_invoice(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Invoice>, ServiceError> {
        let receivables = Arc::clone(&self.receivables);
        self.flow.transition::<Invoice, _>(principal, id, "issue", note, None, |ctx, inv| {
            if inv.data.lines.is_empty() {
                return Err(ServiceError::Validation(format!("{} has no lines", inv.number)));
            }
            if inv.data.total_cents <= 0 {
                return Err(ServiceError::Validation(format!(
                    "{} total must be positive",
                    inv.number
                )));
            }
            let memo = format!("invoice {}", inv.number);
            receivables.post(
                ctx.executor(),
                &Posting {
                    company_id: &inv.company_id,
                    customer_id: &inv.data.customer_id,
                    document_id: &inv.id,
                    entry_type: EntryType::Debit,
                    amount_cents: inv.data.total_cents,
                    memo: &memo,
                    actor: &ctx.principal().user_id,
                },
            )?;
            Ok(())
        })
    }

    /// Apply a payment. With an idempotency key a retried request returns
    /// the first result instead of paying twice.
    pub fn record_payment(
        &self,
        principal: &Principal,
        id: &str,
        req: &PaymentRequest,
        idempotency: Option<&IdempotencyKey>,
    ) -> Result<Doc<Invoice>, ServiceError> {
        if req.amount_cents <= 0 {
            return Err(ServiceError::Validation("payment amount must be positive".into()));
        }

        let receivables = Arc::clone(&self.receivables);
        let note = req.note.as_deref();
        self.flow.transition::<Invoice, _>(principal, id, "pay", note, idempotency, |ctx, inv| {
            let outstanding = inv.data.outstanding_cents();
            if req.amount_cents > outstanding {
                return Err(ServiceError::Validation(format!(
                    "payment of {} exceeds outstanding {outstanding} on {}",
                    req.amount_cents, inv.number
                )));
            }

            let memo = match &req.reference {
                Some(reference) => format!("payment {} ({reference})", inv.number),
                None => format!("payment {}", inv.number),
            };
            receivables.post(
                ctx.executor(),
                &Posting {
                    company_id: &inv.company_id,
                    customer_id: &inv.data.customer_id,
                    document_id: &inv.id,
                    entry_type: EntryType::Credit,
                    amount_cents: req.amount_cents,
                    memo: &memo,
                    actor: &ctx.principal().user_id,
                },
            )?;

            inv.data.paid_cents = inv
                .data
                .paid_cents
                .checked_add(req.amount_cents)
                .ok_or_else(|| ServiceError::Validation("paid amount is too large".into()))?;
            inv.data.payments.push(Payment {
                amount_cents: req.amount_cents,
                method: req.method.clone(),
                reference: req.reference.clone(),
                recorded_by: ctx.principal().user_id.clone(),
                paid_at: now_rfc3339(),
            });
            inv.status = if inv.data.outstanding_cents() == 0 {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::PartiallyPaid
            };
            Ok(())
        })
    }

    /// ISSUED → VOIDED, crediting back the full amount.
    pub fn void_invoice(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<Invoice>, ServiceError> {
        let receivables = Arc::clone(&self.receivables);
        let note = reason.clone();
        self.flow.transition::<Invoice, _>(
            principal,
            id,
            "void",
            Some(note.as_str()),
            None,
            |ctx, inv| {
                if inv.data.paid_cents > 0 {
                    return Err(ServiceError::Validation(format!(
                        "{} has payments and cannot be voided",
                        inv.number
                    )));
                }
                let memo = format!("void {}", inv.number);
                receivables.post(
                    ctx.executor(),
                    &Posting {
                        company_id: &inv.company_id,
                        customer_id: &inv.data.customer_id,
                        document_id: &inv.id,
                        entry_type: EntryType::Credit,
                        amount_cents: inv.data.total_cents,
                        memo: &memo,
                        actor: &ctx.principal().user_id,
                    },
                )?;
                inv.data.void_reason = Some(reason);
                Ok(())
            },
        )
    }

    pub fn cancel_invoice(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Invoice>, ServiceError> {
        self.flow
            .transition::<Invoice, _>(principal, id, "cancel", note, None, |_, _| Ok(()))
    }

    // =======================================================================
    // Receivables
    // =======================================================================

    pub fn customer_balance(
        &self,
        principal: &Principal,
        customer_id: &str,
    ) -> Result<CustomerBalance, ServiceError> {
        principal.require(RECEIVABLES_READ)?;
        self.receivables.balance(&principal.company_id, customer_id)
    }

    pub fn customer_ledger(
        &self,
        principal: &Principal,
        customer_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, ServiceError> {
        principal.require(RECEIVABLES_READ)?;
        let limit = limit.unwrap_or(100).clamp(1, MAX_LIMIT);
        self.receivables.entries(&principal.company_id, customer_id, limit)
    }
}
