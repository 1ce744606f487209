use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use docflow::{doc_state, Lifecycle, Rule};
use fabrica_core::ServiceError;

doc_state! {
    /// Lifecycle state of a lockout-tagout execution.
    ///
    /// Created with every point locked. Releasing points moves it to
    /// PARTIAL, releasing the last one to UNLOCKED.
    pub enum LotoStatus {
        Locked = "LOCKED",
        Partial = "PARTIAL",
        Unlocked = "UNLOCKED",
    }
    terminal = [Unlocked];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnergyType {
    Electrical,
    Mechanical,
    Hydraulic,
    Pneumatic,
    Thermal,
    Chemical,
}

/// One isolation point with its lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockPoint {
    pub point_id: String,
    #[serde(default)]
    pub description: String,
    pub energy_type: EnergyType,
    pub lock_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,
}

impl LockPoint {
    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotoData {
    pub work_order_id: String,
    pub points: Vec<LockPoint>,
    #[serde(default)]
    pub zero_energy_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<String>,
}

pub struct Loto;

impl Lifecycle for Loto {
    type State = LotoStatus;
    type Data = LotoData;

    const KIND: &'static str = "cmms.loto";
    const NUMBER_PREFIX: &'static str = "LOTO";
    const CREATE_PERMISSION: &'static str = "cmms:loto:create";
    const READ_PERMISSION: &'static str = "cmms:loto:read";
    const UPDATE_PERMISSION: &'static str = "cmms:loto:update";
    const INITIAL: LotoStatus = LotoStatus::Locked;
    // Points are fixed once locked.
    const EDITABLE: &'static [LotoStatus] = &[];
    const RULES: &'static [Rule<LotoStatus>] = &[
        Rule {
            action: "verify",
            from: &[LotoStatus::Locked],
            to: &[LotoStatus::Locked],
            permission: "cmms:loto:verify",
        },
        Rule {
            action: "release",
            from: &[LotoStatus::Locked, LotoStatus::Partial],
            to: &[LotoStatus::Partial, LotoStatus::Unlocked],
            permission: "cmms:loto:release",
        },
    ];

    fn prepare(data: &mut LotoData) -> Result<(), ServiceError> {
        if data.points.is_empty() {
            return Err(ServiceError::Validation("at least one lock point is required".into()));
        }
        let mut seen = HashSet::new();
        for point in &mut data.points {
            point.point_id = point.point_id.trim().to_string();
            if point.point_id.is_empty() {
                return Err(ServiceError::Validation("pointId is required".into()));
            }
            if point.lock_number.trim().is_empty() {
                return Err(ServiceError::Validation(format!(
                    "point {} has no lock number",
                    point.point_id
                )));
            }
            if !seen.insert(point.point_id.clone()) {
                return Err(ServiceError::Validation(format!(
                    "duplicate point {}",
                    point.point_id
                )));
            }
        }
        Ok(())
    }
}

/// Body for `@release`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub point_id: String,
}
