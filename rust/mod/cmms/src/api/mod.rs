mod lotos;
mod permits;
mod work_orders;

use axum::Router;

use crate::service::CmmsService;

/// Build the complete CMMS router.
///
/// Routes:
/// - `/work-orders`: create, list, get, patch, history, `@start`, `@hold`,
///   `@complete`, `@cancel`
/// - `/permits`: create, list, get, patch, history, `@submit`, `@approve`,
///   `@reject`, `@activate`, `@suspend`, `@resume`, `@close`, `@cancel`
/// - `/lotos`: create, list, get, history, `@verify`, `@release`
pub fn router(service: CmmsService) -> Router {
    Router::new()
        .merge(work_orders::router())
        .merge(permits::router())
        .merge(lotos::router())
        .with_state(service)
}
