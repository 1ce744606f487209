mod adjustments;
mod devoluciones;
mod stock;

use axum::Router;

use crate::service::InventoryService;

/// Build the complete inventory router.
///
/// Routes:
/// - `GET /stock`, `GET /stock/moves`
/// - `/adjustments`: create, list, get, patch, history, `@submit`,
///   `@approve`, `@reject`, `@cancel`
/// - `/devoluciones`: create, list, get, patch, history, `@submit`,
///   `@accept`, `@reject`, `@process`, `@cancel`
pub fn router(service: InventoryService) -> Router {
    Router::new()
        .merge(stock::router())
        .merge(adjustments::router())
        .merge(devoluciones::router())
        .with_state(service)
}
