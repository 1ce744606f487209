use std::sync::Arc;

use axum::extract::FromRef;

use docflow::{Doc, DocFlow};
use fabrica_core::types::MAX_LIMIT;
use fabrica_core::{Principal, ServiceError};

use crate::ledger::{StockLedger, StockLevel, StockMove, StockMoveRecord};
use crate::model::{
    AdjustmentData, Devolucion, DevolucionData, ItemCondition, StockAdjustment,
};

pub const STOCK_READ: &str = "inventory:stock:read";

/// Stock ledger plus the adjustment and return documents that move it.
#[derive(Clone)]
pub struct InventoryService {
    flow: Arc<DocFlow>,
    ledger: Arc<StockLedger>,
}

impl FromRef<InventoryService> for Arc<DocFlow> {
    fn from_ref(service: &InventoryService) -> Self {
        Arc::clone(&service.flow)
    }
}

impl InventoryService {
    pub fn new(flow: Arc<DocFlow>) -> Result<Self, ServiceError> {
        let ledger = Arc::new(StockLedger::new(Arc::clone(flow.db()))?);
        Ok(Self { flow, ledger })
    }

    pub fn flow(&self) -> &Arc<DocFlow> {
        &self.flow
    }

    /// The ledger, for other modules moving stock inside their own transitions.
    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    // =======================================================================
    // Stock
    // =======================================================================

    pub fn stock_levels(
        &self,
        principal: &Principal,
        warehouse_id: Option<&str>,
        item_id: Option<&str>,
    ) -> Result<Vec<StockLevel>, ServiceError> {
        principal.require(STOCK_READ)?;
        self.ledger.levels(&principal.company_id, warehouse_id, item_id)
    }

    pub fn stock_moves(
        &self,
        principal: &Principal,
        item_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<StockMoveRecord>, ServiceError> {
        principal.require(STOCK_READ)?;
        let limit = limit.unwrap_or(100).clamp(1, MAX_LIMIT);
        self.ledger.moves(&principal.company_id, item_id, limit)
    }

    // =======================================================================
    // Stock adjustments
    // =======================================================================

    pub fn create_adjustment(
        &self,
        principal: &Principal,
        mut data: AdjustmentData,
    ) -> Result<Doc<StockAdjustment>, ServiceError> {
        data.rejection_reason = None;
        self.flow.create::<StockAdjustment>(principal, data, None)
    }

    pub fn submit_adjustment(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<StockAdjustment>, ServiceError> {
        self.flow.transition::<StockAdjustment, _>(principal, id, "submit", note, None, |_, adj| {
            if adj.data.lines.is_empty() {
                return Err(ServiceError::Validation("adjustment has no lines".into()));
            }
            if let Some(line) = adj.data.lines.iter().find(|l| l.delta == 0) {
                return Err(ServiceError::Validation(format!(
                    "line for {} has a zero delta",
                    line.item_id
                )));
            }
            Ok(())
        })
    }

    /// PENDING_APPROVAL → APPLIED, moving every line into stock atomically.
    pub fn approve_adjustment(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<StockAdjustment>, ServiceError> {
        let ledger = Arc::clone(&self.ledger);
        self.flow.transition::<StockAdjustment, _>(principal, id, "approve", note, None, |ctx, adj| {
            for line in &adj.data.lines {
                ledger.apply_move(
                    ctx.executor(),
                    &StockMove {
                        company_id: &adj.company_id,
                        warehouse_id: &adj.data.warehouse_id,
                        item_id: &line.item_id,
                        delta: line.delta,
                        reason: "adjustment",
                        document_id: Some(&adj.id),
                        actor: &ctx.principal().user_id,
                    },
                )?;
            }
            Ok(())
        })
    }

    pub fn reject_adjustment(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<StockAdjustment>, ServiceError> {
        let note = reason.clone();
        self.flow.transition::<StockAdjustment, _>(
            principal,
            id,
            "reject",
            Some(note.as_str()),
            None,
            |_, adj| {
                adj.data.rejection_reason = Some(reason);
                Ok(())
            },
        )
    }

    pub fn cancel_adjustment(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<StockAdjustment>, ServiceError> {
        self.flow
            .transition::<StockAdjustment, _>(principal, id, "cancel", note, None, |_, _| Ok(()))
    }

    // =======================================================================
    // Devoluciones
    // =======================================================================

    pub fn create_devolucion(
        &self,
        principal: &Principal,
        mut data: DevolucionData,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        data.review_notes = None;
        let parent = data.invoice_id.clone();
        self.flow.create::<Devolucion>(principal, data, parent)
    }

    pub fn submit_devolucion(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        self.flow.transition::<Devolucion, _>(principal, id, "submit", note, None, |_, dev| {
            if dev.data.lines.is_empty() {
                return Err(ServiceError::Validation("return has no lines".into()));
            }
            Ok(())
        })
    }

    /// Only a return under review can be accepted.
    pub fn accept_devolucion(
        &self,
        principal: &Principal,
        id: &str,
        notes: Option<&str>,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        let review = notes.map(str::to_string);
        self.flow.transition::<Devolucion, _>(principal, id, "accept", notes, None, |_, dev| {
            dev.data.review_notes = review;
            Ok(())
        })
    }

    pub fn reject_devolucion(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        let note = reason.clone();
        self.flow.transition::<Devolucion, _>(
            principal,
            id,
            "reject",
            Some(note.as_str()),
            None,
            |_, dev| {
                dev.data.review_notes = Some(reason);
                Ok(())
            },
        )
    }

    /// ACEPTADA → PROCESADA, restocking lines returned in good condition.
    pub fn process_devolucion(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        let ledger = Arc::clone(&self.ledger);
        self.flow.transition::<Devolucion, _>(principal, id, "process", note, None, |ctx, dev| {
            for line in dev.data.lines.iter().filter(|l| l.condition == ItemCondition::Good) {
                ledger.apply_move(
                    ctx.executor(),
                    &StockMove {
                        company_id: &dev.company_id,
                        warehouse_id: &dev.data.warehouse_id,
                        item_id: &line.item_id,
                        delta: line.quantity,
                        reason: "return",
                        document_id: Some(&dev.id),
                        actor: &ctx.principal().user_id,
                    },
                )?;
            }
            Ok(())
        })
    }

    pub fn cancel_devolucion(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Devolucion>, ServiceError> {
        self.flow
            .transition::<Devolucion, _>(principal, id, "cancel", note, None, |_, _| Ok(()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fabrica_core::ViewMode;
    use fabrica_sql::{SQLStore, SqliteStore};

    use crate::model::{AdjustmentLine, AdjustmentStatus, DevolucionStatus, ReturnLine};

    pub fn service() -> InventoryService {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        InventoryService::new(Arc::new(DocFlow::new(db).unwrap())).unwrap()
    }

    pub fn clerk() -> Principal {
        Principal {
            user_id: "clerk".into(),
            company_id: "c1".into(),
            permissions: vec!["inventory:*".into()],
            root: false,
            view_mode: ViewMode::Standard,
        }
    }

    fn adjustment(lines: &[(&str, i64)]) -> AdjustmentData {
        AdjustmentData {
            warehouse_id: "main".into(),
            reason: "cycle count".into(),
            lines: lines
                .iter()
                .map(|(item, delta)| AdjustmentLine { item_id: item.to_string(), delta: *delta })
                .collect(),
            rejection_reason: None,
        }
    }

    fn applied(svc: &InventoryService, lines: &[(&str, i64)]) -> Result<Doc<StockAdjustment>, ServiceError> {
        let adj = svc.create_adjustment(&clerk(), adjustment(lines))?;
        svc.submit_adjustment(&clerk(), &adj.id, None)?;
        svc.approve_adjustment(&clerk(), &adj.id, None)
    }

    fn qty(svc: &InventoryService, item: &str) -> i64 {
        svc.stock_levels(&clerk(), Some("main"), Some(item))
            .unwrap()
            .first()
            .map(|l| l.qty)
            .unwrap_or(0)
    }

    #[test]
    fn approved_adjustment_moves_stock() {
        let svc = service();
        let adj = applied(&svc, &[("bolt", 20), ("nut", 5)]).unwrap();
        assert_eq!(adj.status, AdjustmentStatus::Applied);
        assert_eq!(qty(&svc, "bolt"), 20);
        assert_eq!(qty(&svc, "nut"), 5);

        let moves = svc.stock_moves(&clerk(), "bolt", None).unwrap();
        assert_eq!(moves[0].document_id.as_deref(), Some(adj.id.as_str()));
    }

    #[test]
    fn adjustment_that_would_go_negative_changes_nothing() {
        let svc = service();
        applied(&svc, &[("bolt", 3)]).unwrap();

        let adj = svc.create_adjustment(&clerk(), adjustment(&[("nut", 7), ("bolt", -5)])).unwrap();
        svc.submit_adjustment(&clerk(), &adj.id, None).unwrap();
        let err = svc.approve_adjustment(&clerk(), &adj.id, None).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        assert_eq!(qty(&svc, "bolt"), 3);
        assert_eq!(qty(&svc, "nut"), 0);
        let doc = svc.flow().get::<StockAdjustment>(&clerk(), &adj.id).unwrap();
        assert_eq!(doc.status, AdjustmentStatus::PendingApproval);
    }

    #[test]
    fn submit_rejects_empty_or_zero_lines() {
        let svc = service();
        let empty = svc.create_adjustment(&clerk(), adjustment(&[])).unwrap();
        assert!(svc.submit_adjustment(&clerk(), &empty.id, None).is_err());
        let zero = svc.create_adjustment(&clerk(), adjustment(&[("bolt", 0)])).unwrap();
        assert!(svc.submit_adjustment(&clerk(), &zero.id, None).is_err());
    }

    fn devolucion() -> DevolucionData {
        DevolucionData {
            customer_id: "cust-1".into(),
            invoice_id: None,
            warehouse_id: "main".into(),
            reason: "wrong size".into(),
            lines: vec![
                ReturnLine { item_id: "glove".into(), quantity: 4, condition: ItemCondition::Good },
                ReturnLine { item_id: "helmet".into(), quantity: 1, condition: ItemCondition::Damaged },
            ],
            review_notes: None,
        }
    }

    #[test]
    fn devolucion_accept_only_from_review() {
        let svc = service();
        let dev = svc.create_devolucion(&clerk(), devolucion()).unwrap();
        assert_eq!(dev.number, "DEV-000001");

        let err = svc.accept_devolucion(&clerk(), &dev.id, None).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        svc.submit_devolucion(&clerk(), &dev.id, None).unwrap();
        let accepted = svc.accept_devolucion(&clerk(), &dev.id, Some("ok")).unwrap();
        assert_eq!(accepted.status, DevolucionStatus::Aceptada);

        let err = svc.accept_devolucion(&clerk(), &dev.id, None).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));
    }

    #[test]
    fn processing_restocks_good_lines_only() {
        let svc = service();
        let dev = svc.create_devolucion(&clerk(), devolucion()).unwrap();
        svc.submit_devolucion(&clerk(), &dev.id, None).unwrap();
        svc.accept_devolucion(&clerk(), &dev.id, None).unwrap();
        let processed = svc.process_devolucion(&clerk(), &dev.id, None).unwrap();
        assert_eq!(processed.status, DevolucionStatus::Procesada);

        assert_eq!(qty(&svc, "glove"), 4);
        assert_eq!(qty(&svc, "helmet"), 0);
    }

    #[test]
    fn devolucion_keeps_its_invoice() {
        let svc = service();
        let mut data = devolucion();
        data.invoice_id = Some("inv-1".into());
        let dev = svc.create_devolucion(&clerk(), data).unwrap();

        let patch = serde_json::json!({
            "invoiceId": "inv-2",
            "reviewNotes": "pre-approved",
            "reason": "wrong colour",
        });
        let dev = svc.flow().update::<Devolucion>(&clerk(), &dev.id, None, &patch).unwrap();
        assert_eq!(dev.data.invoice_id.as_deref(), Some("inv-1"));
        assert_eq!(dev.parent_id.as_deref(), Some("inv-1"));
        assert!(dev.data.review_notes.is_none());
        assert_eq!(dev.data.reason, "wrong colour");
    }

    #[test]
    fn rejected_devolucion_is_terminal() {
        let svc = service();
        let dev = svc.create_devolucion(&clerk(), devolucion()).unwrap();
        svc.submit_devolucion(&clerk(), &dev.id, None).unwrap();
        let rejected = svc.reject_devolucion(&clerk(), &dev.id, "used goods".into()).unwrap();
        assert_eq!(rejected.status, DevolucionStatus::Rechazada);
        assert!(svc.cancel_devolucion(&clerk(), &dev.id, None).is_err());
    }

    #[test]
    fn stock_requires_permission() {
        let svc = service();
        let mut p = clerk();
        p.permissions = vec!["inventory:adjustment:read".into()];
        assert!(matches!(
            svc.stock_levels(&p, None, None).unwrap_err(),
            ServiceError::PermissionDenied(_)
        ));
    }
}
