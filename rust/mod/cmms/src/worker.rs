use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::CmmsService;

/// Configuration for the background permit watchdog.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// How often to scan for permits past their validity (seconds).
    pub permit_expiry_interval: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            permit_expiry_interval: 60,
        }
    }
}

/// Start the permit expiry loop.
///
/// Every tick, approved, active and suspended permits whose `validUntil`
/// has passed move to EXPIRED under the system actor.
///
/// Returns a CancellationToken that stops the loop when cancelled.
pub fn start(service: CmmsService, config: WatchdogConfig) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let interval = Duration::from_secs(config.permit_expiry_interval.max(1));

    tokio::spawn(async move {
        info!("permit expiry watchdog started (interval={interval:?})");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("permit expiry watchdog stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    debug!("permit expiry scan");
                    match service.expire_permits() {
                        Ok(0) => {}
                        Ok(n) => info!("permit watchdog: expired {n} permits"),
                        Err(e) => error!("permit watchdog error: {e}"),
                    }
                }
            }
        }
    });

    cancel
}
