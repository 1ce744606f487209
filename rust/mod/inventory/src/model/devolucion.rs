use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

doc_state! {
    /// Lifecycle state of a devolución (customer return).
    ///
    /// ```text
    /// BORRADOR → PENDIENTE_REVISION → ACEPTADA → PROCESADA
    ///            PENDIENTE_REVISION → RECHAZADA
    /// BORRADOR → CANCELADA
    /// ```
    pub enum DevolucionStatus {
        Borrador = "BORRADOR",
        PendienteRevision = "PENDIENTE_REVISION",
        Aceptada = "ACEPTADA",
        Rechazada = "RECHAZADA",
        Procesada = "PROCESADA",
        Cancelada = "CANCELADA",
    }
    terminal = [Rechazada, Procesada, Cancelada];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCondition {
    Good,
    Damaged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnLine {
    pub item_id: String,
    pub quantity: i64,
    pub condition: ItemCondition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevolucionData {
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    /// Warehouse receiving restocked goods.
    pub warehouse_id: String,
    pub reason: String,
    #[serde(default)]
    pub lines: Vec<ReturnLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
}

pub struct Devolucion;

impl Lifecycle for Devolucion {
    type State = DevolucionStatus;
    type Data = DevolucionData;

    const KIND: &'static str = "inventory.devolucion";
    const NUMBER_PREFIX: &'static str = "DEV";
    const CREATE_PERMISSION: &'static str = "inventory:devolucion:create";
    const READ_PERMISSION: &'static str = "inventory:devolucion:read";
    const UPDATE_PERMISSION: &'static str = "inventory:devolucion:update";
    const INITIAL: DevolucionStatus = DevolucionStatus::Borrador;
    const EDITABLE: &'static [DevolucionStatus] = &[DevolucionStatus::Borrador];
    const RULES: &'static [Rule<DevolucionStatus>] = &[
        Rule {
            action: "submit",
            from: &[DevolucionStatus::Borrador],
            to: &[DevolucionStatus::PendienteRevision],
            permission: "inventory:devolucion:submit",
        },
        Rule {
            action: "accept",
            from: &[DevolucionStatus::PendienteRevision],
            to: &[DevolucionStatus::Aceptada],
            permission: "inventory:devolucion:review",
        },
        Rule {
            action: "reject",
            from: &[DevolucionStatus::PendienteRevision],
            to: &[DevolucionStatus::Rechazada],
            permission: "inventory:devolucion:review",
        },
        Rule {
            action: "process",
            from: &[DevolucionStatus::Aceptada],
            to: &[DevolucionStatus::Procesada],
            permission: "inventory:devolucion:process",
        },
        Rule {
            action: "cancel",
            from: &[DevolucionStatus::Borrador],
            to: &[DevolucionStatus::Cancelada],
            permission: "inventory:devolucion:cancel",
        },
    ];

    /// The invoice is the document's parent and is fixed at creation.
    fn on_update(stored: &DevolucionData, patched: &mut DevolucionData) {
        patched.invoice_id = stored.invoice_id.clone();
        patched.review_notes = stored.review_notes.clone();
    }

    fn prepare(data: &mut DevolucionData) -> Result<(), ServiceError> {
        if data.customer_id.trim().is_empty() {
            return Err(ServiceError::Validation("customerId is required".into()));
        }
        if data.warehouse_id.trim().is_empty() {
            return Err(ServiceError::Validation("warehouseId is required".into()));
        }
        for line in &data.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::Validation(format!(
                    "return quantity of {} must be positive",
                    line.item_id
                )));
            }
        }
        Ok(())
    }
}
