//! Optional Active Expiry
//!
//! Lazy expiry never reclaims a key that is never read again. When enabled
//! (`--active-expiry`), this sweeper runs as a local task on the server
//! thread and periodically removes expired entries.
//!
//! ## Adaptive Frequency
//!
//! If a sweep finds many expired keys, the next one comes sooner. If it finds
//! none, the sweeper backs off, bounded by `min_interval` and `max_interval`.
//!
//! The sweeper borrows the key space only for the duration of one synchronous
//! purge, so it interleaves with connection tasks like any other command.

use crate::storage::keyspace::SharedKeyspace;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Interval before the first sweep (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// Speed up when more than this fraction of keys had expired
    pub speedup_threshold: f64,

    /// Slow down when less than this fraction of keys had expired
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the sweeper.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the sweeper on the current `LocalSet`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a `tokio::task::LocalSet`.
    pub fn start(keyspace: SharedKeyspace, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::task::spawn_local(sweeper_loop(keyspace, config, shutdown_rx));
        info!("Active expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
        debug!("Active expiry sweeper stopped");
    }
}

/// Picks the next interval from how much of the key space just expired.
fn next_interval(
    config: &ExpiryConfig,
    current: Duration,
    expired: usize,
    scanned: usize,
) -> Duration {
    if scanned == 0 {
        return current;
    }
    let ratio = expired as f64 / scanned as f64;
    if ratio > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else if ratio < config.slowdown_threshold && expired == 0 {
        (current * 2).min(config.max_interval)
    } else {
        current
    }
}

async fn sweeper_loop(
    keyspace: SharedKeyspace,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
        }

        let (scanned, expired, remaining) = {
            let mut keyspace = keyspace.borrow_mut();
            let scanned = keyspace.len();
            let expired = keyspace.purge_expired();
            (scanned, expired, keyspace.len())
        };

        current_interval = next_interval(&config, current_interval, expired, scanned);

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = remaining,
                next_interval_ms = current_interval.as_millis() as u64,
                "Expired keys cleaned up"
            );
        } else {
            trace!(
                next_interval_ms = current_interval.as_millis() as u64,
                "Sweep found nothing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Keyspace, ManualClock, Value};
    use bytes::Bytes;
    use std::rc::Rc;
    use tokio::task::LocalSet;

    #[test]
    fn test_next_interval_adapts() {
        let config = ExpiryConfig::default();
        let base = config.base_interval;

        assert_eq!(next_interval(&config, base, 50, 100), base / 2);
        assert_eq!(next_interval(&config, base, 0, 100), base * 2);
        assert_eq!(next_interval(&config, base, 5, 100), base);
        assert_eq!(next_interval(&config, base, 0, 0), base);
        assert_eq!(
            next_interval(&config, config.min_interval, 100, 100),
            config.min_interval
        );
        assert_eq!(
            next_interval(&config, config.max_interval, 0, 100),
            config.max_interval
        );
    }

    fn manual_keyspace() -> (SharedKeyspace, ManualClock) {
        let clock = ManualClock::new(0);
        (Keyspace::with_clock(Rc::new(clock.clone())).into_shared(), clock)
    }

    fn fast_config() -> ExpiryConfig {
        ExpiryConfig {
            base_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_unread_keys() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (keyspace, clock) = manual_keyspace();
                {
                    let mut ks = keyspace.borrow_mut();
                    for i in 0..10 {
                        ks.put(Bytes::from(format!("key{}", i)), Value::text("v"), Some(20));
                    }
                    ks.put(Bytes::from("persistent"), Value::text("v"), None);
                }

                let _sweeper = ExpirySweeper::start(keyspace.clone(), fast_config());

                tokio::time::sleep(Duration::from_millis(50)).await;
                assert_eq!(keyspace.borrow().len(), 11);

                clock.advance(Duration::from_millis(20));
                tokio::time::sleep(Duration::from_secs(2)).await;

                let ks = keyspace.borrow();
                assert_eq!(ks.len(), 1);
                assert_eq!(ks.expired_total(), 10);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_drop() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (keyspace, clock) = manual_keyspace();
                {
                    let _sweeper = ExpirySweeper::start(keyspace.clone(), fast_config());
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }

                keyspace
                    .borrow_mut()
                    .put(Bytes::from("key"), Value::text("v"), Some(5));
                clock.advance(Duration::from_millis(10));
                tokio::time::sleep(Duration::from_secs(2)).await;

                // Still physically present: nobody swept and nobody read it.
                assert_eq!(keyspace.borrow().len(), 1);
                assert!(keyspace.borrow_mut().get_live(b"key").is_none());
            })
            .await;
    }
}
