mod adjustment;
mod devolucion;

use serde::Deserialize;

pub use adjustment::{AdjustmentData, AdjustmentLine, AdjustmentStatus, StockAdjustment};
pub use devolucion::{Devolucion, DevolucionData, DevolucionStatus, ItemCondition, ReturnLine};

/// Query parameters for `GET /stock`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuery {
    #[serde(default)]
    pub warehouse_id: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// Query parameters for `GET /stock/moves`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovesQuery {
    pub item_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}
