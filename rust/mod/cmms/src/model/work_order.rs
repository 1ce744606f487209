use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

doc_state! {
    /// Lifecycle state of a work order.
    ///
    /// ```text
    /// PENDING → IN_PROGRESS ⇄ ON_HOLD
    ///           IN_PROGRESS → COMPLETED
    /// PENDING, ON_HOLD → CANCELLED
    /// ```
    pub enum WorkOrderStatus {
        Pending = "PENDING",
        InProgress = "IN_PROGRESS",
        OnHold = "ON_HOLD",
        Completed = "COMPLETED",
        Cancelled = "CANCELLED",
    }
    terminal = [Completed, Cancelled];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// A maintenance job on one machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderData {
    pub machine_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// Work may only start under an ACTIVE permit to work.
    #[serde(default)]
    pub requires_permit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_notes: Option<String>,
    #[serde(default)]
    pub labor_hours: f64,
}

pub struct WorkOrder;

impl Lifecycle for WorkOrder {
    type State = WorkOrderStatus;
    type Data = WorkOrderData;

    const KIND: &'static str = "cmms.work_order";
    const NUMBER_PREFIX: &'static str = "WO";
    const CREATE_PERMISSION: &'static str = "cmms:work_order:create";
    const READ_PERMISSION: &'static str = "cmms:work_order:read";
    const UPDATE_PERMISSION: &'static str = "cmms:work_order:update";
    const INITIAL: WorkOrderStatus = WorkOrderStatus::Pending;
    const EDITABLE: &'static [WorkOrderStatus] = &[WorkOrderStatus::Pending, WorkOrderStatus::OnHold];
    const RULES: &'static [Rule<WorkOrderStatus>] = &[
        Rule {
            action: "start",
            from: &[WorkOrderStatus::Pending, WorkOrderStatus::OnHold],
            to: &[WorkOrderStatus::InProgress],
            permission: "cmms:work_order:start",
        },
        Rule {
            action: "hold",
            from: &[WorkOrderStatus::InProgress],
            to: &[WorkOrderStatus::OnHold],
            permission: "cmms:work_order:hold",
        },
        Rule {
            action: "complete",
            from: &[WorkOrderStatus::InProgress],
            to: &[WorkOrderStatus::Completed],
            permission: "cmms:work_order:complete",
        },
        Rule {
            action: "cancel",
            from: &[WorkOrderStatus::Pending, WorkOrderStatus::OnHold],
            to: &[WorkOrderStatus::Cancelled],
            permission: "cmms:work_order:cancel",
        },
    ];

    fn on_update(stored: &WorkOrderData, patched: &mut WorkOrderData) {
        patched.hold_reason = stored.hold_reason.clone();
        patched.completion_notes = stored.completion_notes.clone();
    }

    fn prepare(data: &mut WorkOrderData) -> Result<(), ServiceError> {
        data.machine_id = data.machine_id.trim().to_string();
        data.title = data.title.trim().to_string();
        if data.machine_id.is_empty() {
            return Err(ServiceError::Validation("machineId is required".into()));
        }
        if data.title.is_empty() {
            return Err(ServiceError::Validation("title is required".into()));
        }
        if !data.labor_hours.is_finite() || data.labor_hours < 0.0 {
            return Err(ServiceError::Validation("laborHours must be >= 0".into()));
        }
        Ok(())
    }
}

/// Body for `@start`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Link (or relink) the permit covering this job.
    #[serde(default)]
    pub permit_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Body for `@complete`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub notes: String,
    #[serde(default)]
    pub labor_hours: Option<f64>,
}
