use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use fabrica_core::{Principal, ServiceError};

use crate::receivables::{CustomerBalance, LedgerEntry};
use crate::service::SalesService;

pub fn router() -> Router<SalesService> {
    Router::new()
        .route("/customers/{id}/balance", get(customer_balance))
        .route("/customers/{id}/ledger", get(customer_ledger))
}

#[derive(Debug, Deserialize)]
struct LedgerQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn customer_balance(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(customer_id): Path<String>,
) -> Result<Json<CustomerBalance>, ServiceError> {
    Ok(Json(svc.customer_balance(&principal, &customer_id)?))
}

async fn customer_ledger(
    State(svc): State<SalesService>,
    principal: Principal,
    Path(customer_id): Path<String>,
    Query(q): Query<LedgerQuery>,
) -> Result<Json<Vec<LedgerEntry>>, ServiceError> {
    Ok(Json(svc.customer_ledger(&principal, &customer_id, q.limit)?))
}
