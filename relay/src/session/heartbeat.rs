use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Liveness tracking for a single connection.
///
/// Ticks every `interval` so the session can ping the peer, and reports the peer
/// as dead once nothing has been received for `timeout`.
pub(super) struct Heartbeat {
    ticker: Interval,
    timeout: Duration,
    last_seen: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        // the first tick is due one period from now, not immediately
        let mut ticker = time::interval_at(now + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Heartbeat {
            ticker,
            timeout,
            last_seen: now,
        }
    }

    /// Any frame from the peer proves it is alive
    pub fn record_activity(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Wait for the next ping to be due
    ///
    /// # Cancel Safety
    ///
    /// Cancel-safe, a tick which is not awaited to completion is not consumed.
    pub async fn tick(&mut self) -> Instant {
        self.ticker.tick().await
    }

    /// The instant the peer counts as dead unless something arrives before it
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(60));

        let ticked_at = heartbeat.tick().await;

        assert_eq!(ticked_at - start, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_timeout_after_start() {
        let start = Instant::now();
        let heartbeat = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(45));

        time::sleep_until(heartbeat.deadline()).await;

        // not rounded up to the next tick
        assert_eq!(Instant::now() - start, Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_postpones_deadline() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(Duration::from_secs(30), Duration::from_secs(60));

        heartbeat.tick().await;
        heartbeat.record_activity();

        assert_eq!(heartbeat.deadline() - start, Duration::from_secs(90));
    }
}
