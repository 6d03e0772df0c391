//! Periodic eviction of expired rate-limit windows and cache entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Something holding time-bounded entries that can be pruned in place.
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drops every entry already expired at `now`, returning how many went away.
    fn sweep(&self, now: Instant) -> usize;

    /// Entries currently held, expired or not.
    fn len(&self) -> usize;
}

/// Sweeps every target once per `interval` for the life of the process.
///
/// The first sweep happens one full interval after start.
pub fn spawn_reaper(interval: Duration, targets: Vec<Arc<dyn Sweep>>) -> JoinHandle<()> {
    info!(
        "Starting reaper every {:?} over {} store(s)",
        interval,
        targets.len()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let now = Instant::now();
            for target in &targets {
                let removed = target.sweep(now);
                if removed > 0 {
                    debug!(
                        "Reaper removed {} expired {} entries ({} left)",
                        removed,
                        target.name(),
                        target.len()
                    );
                }
            }
        }
    })
}
