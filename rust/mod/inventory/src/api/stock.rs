use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use fabrica_core::{Principal, ServiceError};

use crate::ledger::{StockLevel, StockMoveRecord};
use crate::model::{MovesQuery, StockQuery};
use crate::service::InventoryService;

pub fn router() -> Router<InventoryService> {
    Router::new()
        .route("/stock", get(stock_levels))
        .route("/stock/moves", get(stock_moves))
}

// ---------------------------------------------------------------------------
// GET /stock?warehouseId=&itemId=
// ---------------------------------------------------------------------------

async fn stock_levels(
    State(svc): State<InventoryService>,
    principal: Principal,
    Query(q): Query<StockQuery>,
) -> Result<Json<Vec<StockLevel>>, ServiceError> {
    let levels = svc.stock_levels(&principal, q.warehouse_id.as_deref(), q.item_id.as_deref())?;
    Ok(Json(levels))
}

// ---------------------------------------------------------------------------
// GET /stock/moves?itemId=&limit=
// ---------------------------------------------------------------------------

async fn stock_moves(
    State(svc): State<InventoryService>,
    principal: Principal,
    Query(q): Query<MovesQuery>,
) -> Result<Json<Vec<StockMoveRecord>>, ServiceError> {
    Ok(Json(svc.stock_moves(&principal, &q.item_id, q.limit)?))
}
