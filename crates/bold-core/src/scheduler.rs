//! Fixed-rate tick scheduler.
//!
//! Ticks fire at a fixed period starting immediately. A tick runs to
//! completion before the next is considered, and ticks missed while one
//! was running are skipped rather than bunched. The loop ends when a tick
//! returns [`TickOutcome::Stop`] or when [`Scheduler::stop`] is called.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// What the scheduler should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking.
    Continue,
    /// End the loop.
    Stop,
}

/// Cancels a running [`Scheduler`] from elsewhere.
#[derive(Debug, Clone)]
pub struct StopSignal(Arc<Notify>);

impl StopSignal {
    /// Ask the loop to end. The in-flight tick, if any, completes first.
    pub fn stop(&self) {
        self.0.notify_one();
    }
}

/// Handle to a running tick loop.
#[derive(Debug)]
pub struct Scheduler {
    stop: Arc<Notify>,
    handle: JoinHandle<u64>,
}

/// Shortest period the loop runs at; a zero timeslot is raised to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

impl Scheduler {
    /// Spawn the tick loop with period `period`.
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let cancel = Arc::clone(&stop);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(MIN_PERIOD));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut fired: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    () = cancel.notified() => {
                        debug!(fired, "Scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {}
                }
                fired = fired.saturating_add(1);
                if tick().await == TickOutcome::Stop {
                    debug!(fired, "Tick requested stop");
                    break;
                }
            }
            fired
        });
        Self { stop, handle }
    }

    /// A cloneable handle that can cancel the loop.
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal(Arc::clone(&self.stop))
    }

    /// Cancel the loop and wait for it to end. Returns the number of ticks
    /// fired. No tick fires after this returns.
    pub async fn stop(self) -> u64 {
        self.stop.notify_one();
        self.join().await
    }

    /// Wait for the loop to end on its own. Returns the number of ticks
    /// fired.
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(fired) => fired,
            Err(err) => {
                error!(error = %err, "Scheduler task failed");
                0
            }
        }
    }
}
