use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

doc_state! {
    /// Lifecycle state of a stock adjustment.
    ///
    /// ```text
    /// DRAFT → PENDING_APPROVAL → APPLIED
    ///                          → REJECTED
    /// DRAFT, PENDING_APPROVAL → CANCELLED
    /// ```
    pub enum AdjustmentStatus {
        Draft = "DRAFT",
        PendingApproval = "PENDING_APPROVAL",
        Applied = "APPLIED",
        Rejected = "REJECTED",
        Cancelled = "CANCELLED",
    }
    terminal = [Applied, Rejected, Cancelled];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentLine {
    pub item_id: String,
    /// Signed quantity change.
    pub delta: i64,
}

/// A manual correction of on-hand quantities in one warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentData {
    pub warehouse_id: String,
    pub reason: String,
    #[serde(default)]
    pub lines: Vec<AdjustmentLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

pub struct StockAdjustment;

impl Lifecycle for StockAdjustment {
    type State = AdjustmentStatus;
    type Data = AdjustmentData;

    const KIND: &'static str = "inventory.adjustment";
    const NUMBER_PREFIX: &'static str = "ADJ";
    const CREATE_PERMISSION: &'static str = "inventory:adjustment:create";
    const READ_PERMISSION: &'static str = "inventory:adjustment:read";
    const UPDATE_PERMISSION: &'static str = "inventory:adjustment:update";
    const INITIAL: AdjustmentStatus = AdjustmentStatus::Draft;
    const EDITABLE: &'static [AdjustmentStatus] = &[AdjustmentStatus::Draft];
    const RULES: &'static [Rule<AdjustmentStatus>] = &[
        Rule {
            action: "submit",
            from: &[AdjustmentStatus::Draft],
            to: &[AdjustmentStatus::PendingApproval],
            permission: "inventory:adjustment:submit",
        },
        Rule {
            action: "approve",
            from: &[AdjustmentStatus::PendingApproval],
            to: &[AdjustmentStatus::Applied],
            permission: "inventory:adjustment:approve",
        },
        Rule {
            action: "reject",
            from: &[AdjustmentStatus::PendingApproval],
            to: &[AdjustmentStatus::Rejected],
            permission: "inventory:adjustment:reject",
        },
        Rule {
            action: "cancel",
            from: &[AdjustmentStatus::Draft, AdjustmentStatus::PendingApproval],
            to: &[AdjustmentStatus::Cancelled],
            permission: "inventory:adjustment:cancel",
        },
    ];

    fn on_update(stored: &AdjustmentData, patched: &mut AdjustmentData) {
        patched.rejection_reason = stored.rejection_reason.clone();
    }

    fn prepare(data: &mut AdjustmentData) -> Result<(), ServiceError> {
        data.warehouse_id = data.warehouse_id.trim().to_string();
        if data.warehouse_id.is_empty() {
            return Err(ServiceError::Validation("warehouseId is required".into()));
        }
        if data.reason.trim().is_empty() {
            return Err(ServiceError::Validation("reason is required".into()));
        }
        Ok(())
    }
}
