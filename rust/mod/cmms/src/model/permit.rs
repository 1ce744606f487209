use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule, SYSTEM_PERMISSION};
use fabrica_core::ServiceError;

doc_state! {
    /// Lifecycle state of a permit to work.
    ///
    /// ```text
    /// DRAFT → PENDING_APPROVAL → APPROVED → ACTIVE ⇄ SUSPENDED → CLOSED
    ///         PENDING_APPROVAL → REJECTED
    /// DRAFT, PENDING_APPROVAL, APPROVED → CANCELLED
    /// APPROVED, ACTIVE, SUSPENDED → EXPIRED (watchdog)
    /// ```
    pub enum PermitStatus {
        Draft = "DRAFT",
        PendingApproval = "PENDING_APPROVAL",
        Approved = "APPROVED",
        Active = "ACTIVE",
        Suspended = "SUSPENDED",
        Closed = "CLOSED",
        Rejected = "REJECTED",
        Cancelled = "CANCELLED",
        Expired = "EXPIRED",
    }
    terminal = [Closed, Rejected, Cancelled, Expired];
}

/// Statuses the expiry watchdog looks at.
pub const EXPIRABLE: &[PermitStatus] = &[
    PermitStatus::Approved,
    PermitStatus::Active,
    PermitStatus::Suspended,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermitType {
    HotWork,
    ConfinedSpace,
    WorkingAtHeight,
    Electrical,
    #[default]
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_order_id: Option<String>,
    #[serde(default)]
    pub permit_type: PermitType,
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hazards: Vec<String>,
    #[serde(default)]
    pub precautions: Vec<String>,
    #[serde(default)]
    pub ppe: Vec<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Set from the creating user.
    #[serde(default)]
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_notes: Option<String>,
}

impl PermitData {
    /// Whether `at` falls in `[validFrom, validUntil)`.
    pub fn valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_from <= at && at < self.valid_until
    }
}

pub struct Permit;

impl Lifecycle for Permit {
    type State = PermitStatus;
    type Data = PermitData;

    const KIND: &'static str = "cmms.permit";
    const NUMBER_PREFIX: &'static str = "PTW";
    const CREATE_PERMISSION: &'static str = "cmms:permit:create";
    const READ_PERMISSION: &'static str = "cmms:permit:read";
    const UPDATE_PERMISSION: &'static str = "cmms:permit:update";
    const INITIAL: PermitStatus = PermitStatus::Draft;
    const EDITABLE: &'static [PermitStatus] = &[PermitStatus::Draft];
    const RULES: &'static [Rule<PermitStatus>] = &[
        Rule {
            action: "submit",
            from: &[PermitStatus::Draft],
            to: &[PermitStatus::PendingApproval],
            permission: "cmms:permit:submit",
        },
        Rule {
            action: "approve",
            from: &[PermitStatus::PendingApproval],
            to: &[PermitStatus::Approved],
            permission: "cmms:permit:approve",
        },
        Rule {
            action: "reject",
            from: &[PermitStatus::PendingApproval],
            to: &[PermitStatus::Rejected],
            permission: "cmms:permit:reject",
        },
        Rule {
            action: "activate",
            from: &[PermitStatus::Approved],
            to: &[PermitStatus::Active],
            permission: "cmms:permit:activate",
        },
        Rule {
            action: "suspend",
            from: &[PermitStatus::Active],
            to: &[PermitStatus::Suspended],
            permission: "cmms:permit:suspend",
        },
        Rule {
            action: "resume",
            from: &[PermitStatus::Suspended],
            to: &[PermitStatus::Active],
            permission: "cmms:permit:resume",
        },
        Rule {
            action: "close",
            from: &[PermitStatus::Active, PermitStatus::Suspended],
            to: &[PermitStatus::Closed],
            permission: "cmms:permit:close",
        },
        Rule {
            action: "cancel",
            from: &[
                PermitStatus::Draft,
                PermitStatus::PendingApproval,
                PermitStatus::Approved,
            ],
            to: &[PermitStatus::Cancelled],
            permission: "cmms:permit:cancel",
        },
        Rule {
            action: "expire",
            from: EXPIRABLE,
            to: &[PermitStatus::Expired],
            permission: SYSTEM_PERMISSION,
        },
    ];

    /// The requester, the decision fields and the work order link are
    /// set by the server, never by a patch.
    fn on_update(stored: &PermitData, patched: &mut PermitData) {
        patched.work_order_id = stored.work_order_id.clone();
        patched.requested_by = stored.requested_by.clone();
        patched.approved_by = stored.approved_by.clone();
        patched.rejection_reason = stored.rejection_reason.clone();
        patched.suspension_reason = stored.suspension_reason.clone();
        patched.closing_notes = stored.closing_notes.clone();
    }

    fn prepare(data: &mut PermitData) -> Result<(), ServiceError> {
        data.location = data.location.trim().to_string();
        if data.location.is_empty() {
            return Err(ServiceError::Validation("location is required".into()));
        }
        for list in [&mut data.hazards, &mut data.precautions, &mut data.ppe] {
            list.iter_mut().for_each(|s| *s = s.trim().to_string());
            list.retain(|s| !s.is_empty());
        }
        Ok(())
    }
}

/// Body for `@close`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseRequest {
    pub notes: String,
}
