use std::sync::Arc;

use axum::extract::FromRef;
use chrono::Utc;
use tracing::warn;

use docflow::{Doc, DocFlow, DocState};
use fabrica_core::{now_rfc3339, Principal, ServiceError};

use crate::model::{
    Loto, LotoData, LotoStatus, Permit, PermitData, PermitStatus, WorkOrder, WorkOrderData,
    EXPIRABLE,
};

/// Maintenance and safety operations on top of the lifecycle engine.
///
/// Cheap to clone; used directly as the router state.
#[derive(Clone)]
pub struct CmmsService {
    flow: Arc<DocFlow>,
}

impl FromRef<CmmsService> for Arc<DocFlow> {
    fn from_ref(service: &CmmsService) -> Self {
        Arc::clone(&service.flow)
    }
}

impl CmmsService {
    pub fn new(flow: Arc<DocFlow>) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &Arc<DocFlow> {
        &self.flow
    }

    // =======================================================================
    // Work orders
    // =======================================================================

    pub fn create_work_order(
        &self,
        principal: &Principal,
        mut data: WorkOrderData,
    ) -> Result<Doc<WorkOrder>, ServiceError> {
        data.hold_reason = None;
        data.completion_notes = None;
        self.flow.create::<WorkOrder>(principal, data, None)
    }

    /// PENDING/ON_HOLD → IN_PROGRESS. A job that requires a permit only
    /// starts under an ACTIVE one.
    pub fn start_work_order(
        &self,
        principal: &Principal,
        id: &str,
        permit_id: Option<String>,
        note: Option<&str>,
    ) -> Result<Doc<WorkOrder>, ServiceError> {
        self.flow
            .transition::<WorkOrder, _>(principal, id, "start", note, None, |ctx, wo| {
                if let Some(permit_id) = permit_id {
                    wo.data.permit_id = Some(permit_id);
                }
                if wo.data.requires_permit {
                    let permit_id = wo.data.permit_id.as_deref().ok_or_else(|| {
                        ServiceError::Validation(format!("{} requires a permit to work", wo.number))
                    })?;
                    let permit = ctx.load::<Permit>(permit_id).map_err(|e| match e {
                        ServiceError::NotFound(_) => {
                            ServiceError::Validation(format!("permit {permit_id} not found"))
                        }
                        other => other,
                    })?;
                    if permit.status != PermitStatus::Active {
                        return Err(ServiceError::Validation(format!(
                            "permit {} is {}, not ACTIVE",
                            permit.number, permit.status
                        )));
                    }
                }
                wo.data.hold_reason = None;
                Ok(())
            })
    }

    pub fn hold_work_order(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<WorkOrder>, ServiceError> {
        let note = reason.clone();
        self.flow
            .transition::<WorkOrder, _>(principal, id, "hold", Some(note.as_str()), None, |_, wo| {
                wo.data.hold_reason = Some(reason);
                Ok(())
            })
    }

    /// IN_PROGRESS → COMPLETED once every lockout on the job is released.
    pub fn complete_work_order(
        &self,
        principal: &Principal,
        id: &str,
        notes: &str,
        labor_hours: Option<f64>,
    ) -> Result<Doc<WorkOrder>, ServiceError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(ServiceError::Validation("completion notes are required".into()));
        }
        if let Some(hours) = labor_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(ServiceError::Validation("laborHours must be >= 0".into()));
            }
        }

        self.flow
            .transition::<WorkOrder, _>(principal, id, "complete", None, None, |ctx, wo| {
                for loto in ctx.children::<Loto>(&wo.id)? {
                    if loto.status != LotoStatus::Unlocked {
                        return Err(ServiceError::Validation(format!(
                            "lockout {} is still {}",
                            loto.number, loto.status
                        )));
                    }
                }
                wo.data.completion_notes = Some(notes.to_string());
                if let Some(hours) = labor_hours {
                    wo.data.labor_hours = hours;
                }
                Ok(())
            })
    }

    pub fn cancel_work_order(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<WorkOrder>, ServiceError> {
        self.flow
            .transition::<WorkOrder, _>(principal, id, "cancel", note, None, |_, _| Ok(()))
    }

    // =======================================================================
    // Permits to work
    // =======================================================================

    pub fn create_permit(
        &self,
        principal: &Principal,
        mut data: PermitData,
    ) -> Result<Doc<Permit>, ServiceError> {
        data.requested_by = principal.user_id.clone();
        data.approved_by = None;
        data.rejection_reason = None;
        data.suspension_reason = None;
        data.closing_notes = None;
        let parent = data.work_order_id.clone();

        self.flow
            .create_with::<Permit, _>(principal, data, parent, |ctx, permit| {
                if let Some(wo_id) = permit.data.work_order_id.as_deref() {
                    let wo = ctx.load::<WorkOrder>(wo_id).map_err(|e| match e {
                        ServiceError::NotFound(_) => {
                            ServiceError::Validation(format!("work order {wo_id} not found"))
                        }
                        other => other,
                    })?;
                    if wo.status.is_terminal() {
                        return Err(ServiceError::Validation(format!(
                            "work order {} is {}",
                            wo.number, wo.status
                        )));
                    }
                }
                Ok(())
            })
    }

    /// DRAFT → PENDING_APPROVAL with hazards identified and a sane window.
    pub fn submit_permit(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Permit>, ServiceError> {
        self.flow
            .transition::<Permit, _>(principal, id, "submit", note, None, |_, permit| {
                if permit.data.hazards.is_empty() {
                    return Err(ServiceError::Validation(
                        "at least one hazard must be identified".into(),
                    ));
                }
                if permit.data.valid_from >= permit.data.valid_until {
                    return Err(ServiceError::Validation(
                        "validFrom must be before validUntil".into(),
                    ));
                }
                Ok(())
            })
    }

    /// Approval by someone other than the requester.
    pub fn approve_permit(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Permit>, ServiceError> {
        self.flow
            .transition::<Permit, _>(principal, id, "approve", note, None, |ctx, permit| {
                let approver = &ctx.principal().user_id;
                if *approver == permit.data.requested_by {
                    return Err(ServiceError::PermissionDenied(format!(
                        "{} cannot approve their own permit {}",
                        approver, permit.number
                    )));
                }
                permit.data.approved_by = Some(approver.clone());
                Ok(())
            })
    }

    pub fn reject_permit(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<Permit>, ServiceError> {
        let note = reason.clone();
        self.flow
            .transition::<Permit, _>(principal, id, "reject", Some(note.as_str()), None, |_, permit| {
                permit.data.rejection_reason = Some(reason);
                Ok(())
            })
    }

    /// APPROVED → ACTIVE, only inside the validity window.
    pub fn activate_permit(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Permit>, ServiceError> {
        self.flow
            .transition::<Permit, _>(principal, id, "activate", note, None, |_, permit| {
                if !permit.data.valid_at(Utc::now()) {
                    return Err(ServiceError::Validation(format!(
                        "permit {} is only valid from {} until {}",
                        permit.number, permit.data.valid_from, permit.data.valid_until
                    )));
                }
                Ok(())
            })
    }

    pub fn suspend_permit(
        &self,
        principal: &Principal,
        id: &str,
        reason: String,
    ) -> Result<Doc<Permit>, ServiceError> {
        let note = reason.clone();
        self.flow
            .transition::<Permit, _>(principal, id, "suspend", Some(note.as_str()), None, |_, permit| {
                permit.data.suspension_reason = Some(reason);
                Ok(())
            })
    }

    pub fn resume_permit(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Permit>, ServiceError> {
        self.flow
            .transition::<Permit, _>(principal, id, "resume", note, None, |_, permit| {
                if Utc::now() >= permit.data.valid_until {
                    return Err(ServiceError::Validation(format!(
                        "permit {} validity has elapsed",
                        permit.number
                    )));
                }
                permit.data.suspension_reason = None;
                Ok(())
            })
    }

    pub fn close_permit(
        &self,
        principal: &Principal,
        id: &str,
        notes: &str,
    ) -> Result<Doc<Permit>, ServiceError> {
        let notes = notes.trim();
        if notes.is_empty() {
            return Err(ServiceError::Validation("closing notes are required".into()));
        }
        self.flow
            .transition::<Permit, _>(principal, id, "close", Some(notes), None, |_, permit| {
                permit.data.closing_notes = Some(notes.to_string());
                Ok(())
            })
    }

    pub fn cancel_permit(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Permit>, ServiceError> {
        self.flow
            .transition::<Permit, _>(principal, id, "cancel", note, None, |_, _| Ok(()))
    }

    /// Expire every approved, active or suspended permit past `validUntil`.
    ///
    /// Runs as the system actor of each permit's company. Returns how many
    /// permits were expired.
    pub fn expire_permits(&self) -> Result<u32, ServiceError> {
        let now = Utc::now();
        let mut expired = 0u32;

        for permit in self.flow.expire_candidates::<Permit>(EXPIRABLE)? {
            if permit.data.valid_until > now {
                continue;
            }
            let system = Principal::system(&permit.company_id);
            match self.flow.transition::<Permit, _>(
                &system,
                &permit.id,
                "expire",
                Some("validity window elapsed"),
                None,
                |_, _| Ok(()),
            ) {
                Ok(_) => expired += 1,
                Err(ServiceError::Conflict(_)) | Err(ServiceError::InvalidTransition(_)) => {
                    warn!("permit {} changed during expiry scan, skipped", permit.number);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(expired)
    }

    // =======================================================================
    // LOTO executions
    // =======================================================================

    /// Lock every point of a work order. The work order must be open.
    pub fn create_loto(
        &self,
        principal: &Principal,
        mut data: LotoData,
    ) -> Result<Doc<Loto>, ServiceError> {
        data.zero_energy_verified = false;
        data.verified_by = None;
        data.verified_at = None;
        for point in &mut data.points {
            point.released_by = None;
            point.released_at = None;
        }
        let parent = Some(data.work_order_id.clone());

        self.flow
            .create_with::<Loto, _>(principal, data, parent, |ctx, loto| {
                let wo_id = loto.data.work_order_id.as_str();
                let wo = ctx.load::<WorkOrder>(wo_id).map_err(|e| match e {
                    ServiceError::NotFound(_) => {
                        ServiceError::Validation(format!("work order {wo_id} not found"))
                    }
                    other => other,
                })?;
                if wo.status.is_terminal() {
                    return Err(ServiceError::Validation(format!(
                        "work order {} is {}",
                        wo.number, wo.status
                    )));
                }
                Ok(())
            })
    }

    /// Record zero-energy verification.
    pub fn verify_loto(
        &self,
        principal: &Principal,
        id: &str,
        note: Option<&str>,
    ) -> Result<Doc<Loto>, ServiceError> {
        self.flow
            .transition::<Loto, _>(principal, id, "verify", note, None, |ctx, loto| {
                if loto.data.zero_energy_verified {
                    return Err(ServiceError::Validation(format!(
                        "{} is already verified",
                        loto.number
                    )));
                }
                loto.data.zero_energy_verified = true;
                loto.data.verified_by = Some(ctx.principal().user_id.clone());
                loto.data.verified_at = Some(now_rfc3339());
                Ok(())
            })
    }

    /// Release one point; the last release unlocks the execution.
    pub fn release_loto_point(
        &self,
        principal: &Principal,
        id: &str,
        point_id: &str,
    ) -> Result<Doc<Loto>, ServiceError> {
        let note = format!("released point {point_id}");
        self.flow
            .transition::<Loto, _>(principal, id, "release", Some(note.as_str()), None, |ctx, loto| {
                if !loto.data.zero_energy_verified {
                    return Err(ServiceError::Validation(format!(
                        "{} has no zero-energy verification",
                        loto.number
                    )));
                }
                let number = loto.number.clone();
                let point = loto
                    .data
                    .points
                    .iter_mut()
                    .find(|p| p.point_id == point_id)
                    .ok_or_else(|| {
                        ServiceError::Validation(format!("{number} has no point {point_id}"))
                    })?;
                if point.is_released() {
                    return Err(ServiceError::Validation(format!(
                        "point {point_id} of {number} is already released"
                    )));
                }
                point.released_by = Some(ctx.principal().user_id.clone());
                point.released_at = Some(now_rfc3339());

                loto.status = if loto.data.points.iter().all(|p| p.is_released()) {
                    LotoStatus::Unlocked
                } else {
                    LotoStatus::Partial
                };
                Ok(())
            })
    }
}
