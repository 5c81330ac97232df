//! Expiry sweeper.
//!
//! Periodic background worker that releases past-due auto-release holds
//! through the same ledger entry points as interactive callers, so there is
//! exactly one code path for every state change.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ReservationSettings;
use crate::services::reservations::ReservationService;

/// Spawns the sweep loop for the given organizations.
///
/// The returned handle can be aborted on shutdown; a sweep pass that fails
/// is logged and retried at the next tick.
pub fn start_worker(
    service: ReservationService,
    organization_ids: Arc<Vec<Uuid>>,
    settings: ReservationSettings,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(settings.expiry_sweep_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = settings.expiry_sweep_interval_secs,
            organizations = organization_ids.len(),
            "Expiry sweeper started"
        );

        loop {
            ticker.tick().await;
            for organization_id in organization_ids.iter() {
                match service.sweep_expired(*organization_id, None).await {
                    Ok(expired) if !expired.is_empty() => {
                        info!(
                            organization_id = %organization_id,
                            expired_count = expired.len(),
                            "Expiry sweep released reservations"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(
                            organization_id = %organization_id,
                            error = %e,
                            "Expiry sweep failed"
                        );
                    }
                }
            }
        }
    })
}
