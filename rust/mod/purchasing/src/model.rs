use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

/// Extra grant needed to approve orders above the configured threshold.
pub const APPROVE_HIGH_PERMISSION: &str = "purchasing:order:approve_high";

doc_state! {
    /// Lifecycle state of a purchase order.
    ///
    /// ```text
    /// DRAFT → PENDING_APPROVAL → APPROVED → SENT → PARTIALLY_RECEIVED → RECEIVED
    ///         PENDING_APPROVAL → DRAFT (reject)
    /// DRAFT, PENDING_APPROVAL, APPROVED, SENT → CANCELLED
    /// ```
    pub enum PurchaseOrderStatus {
        Draft = "DRAFT",
        PendingApproval = "PENDING_APPROVAL",
        Approved = "APPROVED",
        Sent = "SENT",
        PartiallyReceived = "PARTIALLY_RECEIVED",
        Received = "RECEIVED",
        Cancelled = "CANCELLED",
    }
    terminal = [Received, Cancelled];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    /// Assigned on save when left empty (`L1`, `L2`, ...).
    #[serde(default)]
    pub line_id: String,
    pub item_id: String,
    #[serde(default)]
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub received_qty: i64,
}

impl OrderLine {
    pub fn total_cents(&self) -> Result<i64, ServiceError> {
        self.quantity.checked_mul(self.unit_price_cents).ok_or_else(|| {
            ServiceError::Validation(format!("line {} amount is too large", self.line_id))
        })
    }

    pub fn outstanding(&self) -> i64 {
        self.quantity - self.received_qty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrderData {
    pub supplier_id: String,
    /// Warehouse receiving the goods.
    pub warehouse_id: String,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl PurchaseOrderData {
    pub fn total_cents(&self) -> Result<i64, ServiceError> {
        self.lines.iter().try_fold(0i64, |sum, line| {
            sum.checked_add(line.total_cents()?)
                .ok_or_else(|| ServiceError::Validation("order total is too large".into()))
        })
    }

    pub fn received_any(&self) -> bool {
        self.lines.iter().any(|l| l.received_qty > 0)
    }

    pub fn fully_received(&self) -> bool {
        self.lines.iter().all(|l| l.outstanding() <= 0)
    }
}

pub struct PurchaseOrder;

impl Lifecycle for PurchaseOrder {
    type State = PurchaseOrderStatus;
    type Data = PurchaseOrderData;

    const KIND: &'static str = "purchasing.order";
    const NUMBER_PREFIX: &'static str = "PO";
    const CREATE_PERMISSION: &'static str = "purchasing:order:create";
    const READ_PERMISSION: &'static str = "purchasing:order:read";
    const UPDATE_PERMISSION: &'static str = "purchasing:order:update";
    const INITIAL: PurchaseOrderStatus = PurchaseOrderStatus::Draft;
    const EDITABLE: &'static [PurchaseOrderStatus] = &[PurchaseOrderStatus::Draft];
    const RULES: &'static [Rule<PurchaseOrderStatus>] = &[
        Rule {
            action: "submit",
            from: &[PurchaseOrderStatus::Draft],
            to: &[PurchaseOrderStatus::PendingApproval],
            permission: "purchasing:order:submit",
        },
        Rule {
            action: "approve",
            from: &[PurchaseOrderStatus::PendingApproval],
            to: &[PurchaseOrderStatus::Approved],
            permission: "purchasing:order:approve",
        },
        Rule {
            action: "reject",
            from: &[PurchaseOrderStatus::PendingApproval],
            to: &[PurchaseOrderStatus::Draft],
            permission: "purchasing:order:approve",
        },
        Rule {
            action: "send",
            from: &[PurchaseOrderStatus::Approved],
            to: &[PurchaseOrderStatus::Sent],
            permission: "purchasing:order:send",
        },
        Rule {
            action: "receive",
            from: &[PurchaseOrderStatus::Sent, PurchaseOrderStatus::PartiallyReceived],
            to: &[PurchaseOrderStatus::PartiallyReceived, PurchaseOrderStatus::Received],
            permission: "purchasing:order:receive",
        },
        Rule {
            action: "cancel",
            from: &[
                PurchaseOrderStatus::Draft,
                PurchaseOrderStatus::PendingApproval,
                PurchaseOrderStatus::Approved,
                PurchaseOrderStatus::Sent,
            ],
            to: &[PurchaseOrderStatus::Cancelled],
            permission: "purchasing:order:cancel",
        },
    ];

    fn on_update(stored: &PurchaseOrderData, patched: &mut PurchaseOrderData) {
        patched.approved_by = stored.approved_by.clone();
        patched.rejection_reason = stored.rejection_reason.clone();
    }

    /// Orders are only edited as drafts, before anything can be received.
    fn prepare(data: &mut PurchaseOrderData) -> Result<(), ServiceError> {
        data.supplier_id = data.supplier_id.trim().to_string();
        data.warehouse_id = data.warehouse_id.trim().to_string();
        if data.supplier_id.is_empty() {
            return Err(ServiceError::Validation("supplierId is required".into()));
        }
        if data.warehouse_id.is_empty() {
            return Err(ServiceError::Validation("warehouseId is required".into()));
        }

        let mut seen = HashSet::new();
        for (i, line) in data.lines.iter_mut().enumerate() {
            if line.line_id.trim().is_empty() {
                line.line_id = format!("L{}", i + 1);
            }
            if !seen.insert(line.line_id.clone()) {
                return Err(ServiceError::Validation(format!(
                    "duplicate line id {}",
                    line.line_id
                )));
            }
            if line.item_id.trim().is_empty() {
                return Err(ServiceError::Validation(format!(
                    "line {} has no itemId",
                    line.line_id
                )));
            }
            line.received_qty = 0;
        }
        data.total_cents()?;
        Ok(())
    }
}

/// One received line of a delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub line_id: String,
    pub quantity: i64,
}

/// Body of `POST /orders/{id}/@receive`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveRequest {
    pub lines: Vec<ReceiptLine>,
    #[serde(default)]
    pub note: Option<String>,
}
