use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::FromRef;
use tracing::info;

use docflow::{Doc, DocFlow};
use fabrica_core::{Principal, ServiceError};
use inventory::ledger::{StockLedger, StockMove};

use crate::config::PurchasingConfig;
use crate::model::{
    PurchaseOrder, PurchaseOrderData, PurchaseOrderStatus, ReceiptLine, APPROVE_HIGH_PERMISSION,
};

/// Purchase order operations. Receipts post to the shared stock ledger.
#[derive(Clone)]
pub struct PurchasingService {
    flow: Arc<DocFlow>,
    ledger: Arc<StockLedger>,
    config: PurchasingConfig,
}

impl FromRef<PurchasingService> for Arc<DocFlow> {
    fn from_ref(service: &PurchasingService) -> Self {
        Arc::clone(&service.flow)
    }
}

impl PurchasingService {
    pub fn new(flow: Arc<DocFlow>, ledger: Arc<StockLedger>, config: PurchasingConfig) -> Self {
        Self { flow, ledger, config }
    }

    pub fn flow(&self) -> &Arc<DocFlow> {
        &self.flow
    }

    pub fn create_order(
        &self,
        principal: &Principal,
        mut data: PurchaseOrderData,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        data.approved_by = None;
        data.rejection_reason = None;
        self.flow.create::<PurchaseOrder>(principal, data, None)
    }

    pub fn submit_order(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        self.flow.transition::<PurchaseOrder, _>(principal, id, "submit", note, None, |_, po| {
            if po.data.lines.is_empty() {
                return Err(ServiceError::Validation(format!("{} has no lines", po.number)));
            }
            for line in &po.data.lines {
                if line.quantity <= 0 {
                    return Err(ServiceError::Validation(format!(
                        "line {} quantity must be positive",
                        line.line_id
                    )));
                }
                if line.unit_price_cents < 0 {
                    return Err(ServiceError::Validation(format!(
                        "line {} price must not be negative",
                        line.line_id
                    )));
                }
            }
            po.data.rejection_reason = None;
            Ok(())
        })
    }

    /// PENDING_APPROVAL → APPROVED. Orders above the high-value threshold
    /// need the extra approval grant.
    pub fn approve_order(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        let threshold = self.config.high_value_threshold_cents;
        self.flow.transition::<PurchaseOrder, _>(principal, id, "approve", note, None, |ctx, po| {
            let total = po.data.total_cents()?;
            if total > threshold {
                ctx.principal().require(APPROVE_HIGH_PERMISSION)?;
                info!("{} total {total} above {threshold}, high-value approval", po.number);
            }
            po.data.approved_by = Some(ctx.principal().user_id.clone());
            Ok(())
        })
    }

    /// PENDING_APPROVAL → DRAFT so the requester can fix the order.
    pub fn reject_order(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        let note = reason.clone();
        self.flow.transition::<PurchaseOrder, _>(
            principal,
            id,
            "reject",
            Some(note.as_str()),
            None,
            |_, po| {
                po.data.rejection_reason = Some(reason);
                Ok(())
            },
        )
    }

    pub fn send_order(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        self.flow
            .transition::<PurchaseOrder, _>(principal, id, "send", note, None, |_, _| Ok(()))
    }

    /// Record a delivery. Received quantities go into stock in the same
    /// transaction; the order ends PARTIALLY_RECEIVED or RECEIVED.
    pub fn receive_order(
        &self,
        principal: &Principal,
        id: &str,
        receipt: &[ReceiptLine],
        note: Option<&str>,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        if receipt.is_empty() {
            return Err(ServiceError::Validation("receipt has no lines".into()));
        }
        let mut seen = HashSet::new();
        for r in receipt {
            if r.quantity <= 0 {
                return Err(ServiceError::Validation(format!(
                    "received quantity of line {} must be positive",
                    r.line_id
                )));
            }
            if !seen.insert(r.line_id.as_str()) {
                return Err(ServiceError::Validation(format!(
                    "line {} appears twice in the receipt",
                    r.line_id
                )));
            }
        }

        let ledger = Arc::clone(&self.ledger);
        self.flow.transition::<PurchaseOrder, _>(principal, id, "receive", note, None, |ctx, po| {
            for r in receipt {
                let line = po
                    .data
                    .lines
                    .iter_mut()
                    .find(|l| l.line_id == r.line_id)
                    .ok_or_else(|| {
                        ServiceError::Validation(format!("{} has no line {}", po.number, r.line_id))
                    })?;
                if r.quantity > line.outstanding() {
                    return Err(ServiceError::Validation(format!(
                        "line {}: receiving {} but only {} outstanding",
                        line.line_id,
                        r.quantity,
                        line.outstanding()
                    )));
                }
                line.received_qty += r.quantity;

                ledger.apply_move(
                    ctx.executor(),
                    &StockMove {
                        company_id: &po.company_id,
                        warehouse_id: &po.data.warehouse_id,
                        item_id: &line.item_id,
                        delta: r.quantity,
                        reason: "po_receipt",
                        document_id: Some(&po.id),
                        actor: &ctx.principal().user_id,
                    },
                )?;
            }

            po.status = if po.data.fully_received() {
                PurchaseOrderStatus::Received
            } else {
                PurchaseOrderStatus::PartiallyReceived
            };
            Ok(())
        })
    }

    pub fn cancel_order(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<PurchaseOrder>, ServiceError> {
        self.flow.transition::<PurchaseOrder, _>(principal, id, "cancel", note, None, |_, po| {
            if po.data.received_any() {
                return Err(ServiceError::Validation(format!(
                    "{} already has received goods",
                    po.number
                )));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fabrica_core::ViewMode;
    use fabrica_sql::{SQLStore, SqliteStore};

    use crate::model::OrderLine;

    pub fn service() -> PurchasingService {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let flow = Arc::new(DocFlow::new(Arc::clone(&db)).unwrap());
        let ledger = Arc::new(StockLedger::new(db).unwrap());
        PurchasingService::new(flow, ledger, PurchasingConfig::default())
    }

    pub fn buyer(perms: &[&str]) -> Principal {
        Principal {
            user_id: "buyer".into(),
            company_id: "c1".into(),
            permissions: perms.iter().map(|p| p.to_string()).collect(),
            root: false,
            view_mode: ViewMode::Standard,
        }
    }

    pub fn order(lines: &[(i64, i64)]) -> PurchaseOrderData {
        PurchaseOrderData {
            supplier_id: "acme".into(),
            warehouse_id: "main".into(),
            lines: lines
                .iter()
                .enumerate()
                .map(|(i, (qty, price))| OrderLine {
                    line_id: String::new(),
                    item_id: format!("item-{}", i + 1),
                    description: String::new(),
                    quantity: *qty,
                    unit_price_cents: *price,
                    received_qty: 0,
                })
                .collect(),
            expected_date: None,
            notes: None,
            approved_by: None,
            rejection_reason: None,
        }
    }

    fn sent(svc: &PurchasingService, lines: &[(i64, i64)]) -> Doc<PurchaseOrder> {
        let p = buyer(&["purchasing:*"]);
        let po = svc.create_order(&p, order(lines)).unwrap();
        svc.submit_order(&p, &po.id, None).unwrap();
        svc.approve_order(&p, &po.id, None).unwrap();
        svc.send_order(&p, &po.id, None).unwrap()
    }

    fn on_hand(svc: &PurchasingService, item: &str) -> i64 {
        svc.ledger
            .levels("c1", Some("main"), Some(item))
            .unwrap()
            .first()
            .map(|l| l.qty)
            .unwrap_or(0)
    }

    fn receipt(line_id: &str, quantity: i64) -> ReceiptLine {
        ReceiptLine { line_id: line_id.into(), quantity }
    }

    #[test]
    fn partial_then_full_receipt() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = sent(&svc, &[(10, 500), (4, 250)]);
        assert_eq!(po.status, PurchaseOrderStatus::Sent);
        assert_eq!(po.data.approved_by.as_deref(), Some("buyer"));

        let po = svc.receive_order(&p, &po.id, &[receipt("L1", 6)], None).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::PartiallyReceived);
        assert_eq!(on_hand(&svc, "item-1"), 6);

        let po = svc
            .receive_order(&p, &po.id, &[receipt("L1", 4), receipt("L2", 4)], Some("final"))
            .unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Received);
        assert_eq!(on_hand(&svc, "item-1"), 10);
        assert_eq!(on_hand(&svc, "item-2"), 4);

        let err = svc.receive_order(&p, &po.id, &[receipt("L1", 1)], None).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[test]
    fn over_receipt_rolls_back_every_line() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = sent(&svc, &[(5, 100), (2, 100)]);

        let err = svc
            .receive_order(&p, &po.id, &[receipt("L1", 5), receipt("L2", 3)], None)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(on_hand(&svc, "item-1"), 0);

        let po = svc.flow().get::<PurchaseOrder>(&p, &po.id).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Sent);
        assert_eq!(po.data.lines[0].received_qty, 0);
    }

    #[test]
    fn unknown_line_is_rejected() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = sent(&svc, &[(1, 100)]);
        let err = svc.receive_order(&p, &po.id, &[receipt("L9", 1)], None).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn high_value_orders_need_extra_grant() {
        let svc = service();
        let clerk = buyer(&[
            "purchasing:order:create",
            "purchasing:order:read",
            "purchasing:order:submit",
            "purchasing:order:approve",
        ]);
        let po = svc.create_order(&clerk, order(&[(100, 20_000)])).unwrap();
        svc.submit_order(&clerk, &po.id, None).unwrap();

        let err = svc.approve_order(&clerk, &po.id, None).unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));

        let manager = buyer(&["purchasing:order:approve", APPROVE_HIGH_PERMISSION]);
        let po = svc.approve_order(&manager, &po.id, None).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Approved);

        let small = svc.create_order(&clerk, order(&[(1, 100)])).unwrap();
        svc.submit_order(&clerk, &small.id, None).unwrap();
        assert!(svc.approve_order(&clerk, &small.id, None).is_ok());
    }

    #[test]
    fn reject_returns_to_draft_for_editing() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = svc.create_order(&p, order(&[(1, 100)])).unwrap();
        svc.submit_order(&p, &po.id, None).unwrap();
        let po = svc.reject_order(&p, &po.id, "wrong supplier".into()).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Draft);
        assert_eq!(po.data.rejection_reason.as_deref(), Some("wrong supplier"));

        let patched = svc
            .flow()
            .update::<PurchaseOrder>(&p, &po.id, Some(po.version), &serde_json::json!({"supplierId": "globex"}))
            .unwrap();
        assert_eq!(patched.data.supplier_id, "globex");

        let resubmitted = svc.submit_order(&p, &po.id, None).unwrap();
        assert_eq!(resubmitted.status, PurchaseOrderStatus::PendingApproval);
        assert!(resubmitted.data.rejection_reason.is_none());
    }

    #[test]
    fn submit_rejects_bad_lines() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let empty = svc.create_order(&p, order(&[])).unwrap();
        assert!(svc.submit_order(&p, &empty.id, None).is_err());
        let zero = svc.create_order(&p, order(&[(0, 100)])).unwrap();
        assert!(svc.submit_order(&p, &zero.id, None).is_err());
    }

    #[test]
    fn sent_order_can_be_cancelled_before_delivery() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = sent(&svc, &[(3, 100)]);
        let po = svc.cancel_order(&p, &po.id, Some("supplier out of stock")).unwrap();
        assert_eq!(po.status, PurchaseOrderStatus::Cancelled);

        let po = sent(&svc, &[(3, 100)]);
        svc.receive_order(&p, &po.id, &[receipt("L1", 1)], None).unwrap();
        let err = svc.cancel_order(&p, &po.id, None).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[test]
    fn patch_cannot_set_the_approval_fields() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let po = svc.create_order(&p, order(&[(1, 100)])).unwrap();
        let patch = serde_json::json!({
            "approvedBy": "boss",
            "rejectionReason": "nope",
            "notes": "rush",
        });
        let po = svc.flow().update::<PurchaseOrder>(&p, &po.id, None, &patch).unwrap();
        assert!(po.data.approved_by.is_none());
        assert!(po.data.rejection_reason.is_none());
        assert_eq!(po.data.notes.as_deref(), Some("rush"));
    }

    #[test]
    fn overflowing_order_is_not_created() {
        let svc = service();
        let p = buyer(&["purchasing:*"]);
        let err = svc.create_order(&p, order(&[(2, i64::MAX)])).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let po = svc.create_order(&p, order(&[(1, 100)])).unwrap();
        let patch = serde_json::json!({
            "lines": [{ "itemId": "item-1", "quantity": 3, "unitPriceCents": i64::MAX }]
        });
        let err = svc.flow().update::<PurchaseOrder>(&p, &po.id, None, &patch).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
