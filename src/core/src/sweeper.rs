use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stories::StoryLifecycle;

/// Run `sweep_expired` every `interval` until the task is aborted.
///
/// The first sweep happens one interval after spawn.
pub fn spawn_expiry_sweeper(lifecycle: Arc<StoryLifecycle>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await;
        loop {
            tick.tick().await;
            sweep_once(&lifecycle);
        }
    })
}

/// One sweep at the lifecycle clock's current time. Failures are logged.
pub fn sweep_once(lifecycle: &StoryLifecycle) -> usize {
    let now = lifecycle.now();
    match lifecycle.sweep_expired(now) {
        Ok(0) => {
            debug!(%now, "expiry sweep: nothing to deactivate");
            0
        }
        Ok(count) => {
            info!(%now, deactivated = count, "expiry sweep deactivated stories");
            count
        }
        Err(err) => {
            warn!(error = %err, "expiry sweep failed");
            0
        }
    }
}
