use axum::Router;

/// A business module that contributes HTTP routes.
///
/// Each module (auth, cmms, purchasing, ...) implements this trait to
/// register its endpoints. The server collects all modules and nests
/// their routes under `/{name}`.
pub trait Module: Send + Sync {
    /// Module name, used for logging and route prefixes.
    fn name(&self) -> &str;

    /// Return the module's routes, to be nested under `/{name}`.
    fn routes(&self) -> Router;

    /// Permission strings this module checks, for the permission catalog.
    fn permissions(&self) -> Vec<&'static str> {
        Vec::new()
    }
}
