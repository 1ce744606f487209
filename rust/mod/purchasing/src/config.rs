use serde::Deserialize;

/// Purchasing policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchasingConfig {
    /// Orders whose total exceeds this amount need `purchasing:order:approve_high`.
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold_cents: i64,
}

fn default_high_value_threshold() -> i64 {
    1_000_000
}

impl Default for PurchasingConfig {
    fn default() -> Self {
        Self {
            high_value_threshold_cents: default_high_value_threshold(),
        }
    }
}
