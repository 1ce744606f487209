mod customers;
mod invoices;

use axum::Router;

use crate::service::SalesService;

/// Build the sales router.
///
/// Routes:
/// - `/invoices`: create, list, get, patch, history, `@issue`, `@pay`,
///   `@void`, `@cancel`
/// - `GET /customers/{id}/balance`, `GET /customers/{id}/ledger`
pub fn router(service: SalesService) -> Router {
    Router::new()
        .merge(invoices::router())
        .merge(customers::router())
        .with_state(service)
}
