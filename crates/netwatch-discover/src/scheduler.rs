//! Rescan scheduling engine.
//!
//! Runs one cycle immediately, then one per interval, and serves on-demand
//! triggers in between. Cycles never overlap: the loop runs them inline, and
//! the trigger queue holds at most one pending request, so any number of
//! triggers during a cycle collapse into a single follow-up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

use crate::pipeline::CycleReport;

/// Something the scheduler can run once per cycle.
pub trait ScanCycle: Send + Sync + 'static {
    fn run_cycle(&self) -> impl Future<Output = CycleReport> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
}

/// Answer to an on-demand rescan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAck {
    /// The scheduler was idle; a cycle starts now.
    Queued,
    /// A cycle is running; one follow-up cycle is queued behind it.
    Pending,
    /// A follow-up was already queued; this request joins it.
    Coalesced,
    /// The scheduler is no longer running.
    Stopped,
}

/// Cloneable handle for requesting cycles and watching the scan state.
#[derive(Debug, Clone)]
pub struct RescanTrigger {
    requests: mpsc::Sender<()>,
    state: watch::Receiver<ScanState>,
}

impl RescanTrigger {
    pub fn trigger(&self) -> TriggerAck {
        match self.requests.try_send(()) {
            Ok(()) if self.state() == ScanState::Scanning => TriggerAck::Pending,
            Ok(()) => TriggerAck::Queued,
            Err(TrySendError::Full(())) => TriggerAck::Coalesced,
            Err(TrySendError::Closed(())) => TriggerAck::Stopped,
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ScanState> {
        self.state.clone()
    }
}

/// The scan loop. Stops once every [`RescanTrigger`] has been dropped.
pub struct RescanScheduler<P> {
    cycle: Arc<P>,
    interval: Duration,
    requests: mpsc::Receiver<()>,
    state: watch::Sender<ScanState>,
}

impl<P: ScanCycle> RescanScheduler<P> {
    pub fn new(cycle: Arc<P>, interval: Duration) -> (Self, RescanTrigger) {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(ScanState::Idle);

        let scheduler = Self {
            cycle,
            interval: interval.max(Duration::from_secs(1)),
            requests: request_rx,
            state: state_tx,
        };
        let trigger = RescanTrigger {
            requests: request_tx,
            state: state_rx,
        };
        (scheduler, trigger)
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("Scheduled rescan triggered");
                }
                request = self.requests.recv() => match request {
                    Some(()) => tracing::info!("On-demand rescan triggered"),
                    None => {
                        tracing::info!("All trigger handles dropped, scheduler stopping");
                        break;
                    }
                },
            }

            self.state.send_replace(ScanState::Scanning);
            let report = self.cycle.run_cycle().await;
            self.state.send_replace(ScanState::Idle);

            tracing::debug!(
                cycle_id = %report.cycle_id,
                devices = report.devices,
                "Scheduler cycle finished"
            );
            // Next scheduled cycle is one full interval after this one ends.
            ticker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use tokio::time::sleep;

    struct SlowCycle {
        duration: Duration,
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowCycle {
        fn new(duration: Duration) -> Self {
            Self {
                duration,
                runs: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl ScanCycle for SlowCycle {
        async fn run_cycle(&self) -> CycleReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            sleep(self.duration).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            CycleReport::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight() {
        let cycle = Arc::new(SlowCycle::new(Duration::from_secs(10)));
        let (scheduler, trigger) = RescanScheduler::new(cycle.clone(), Duration::from_secs(60));
        let task = tokio::spawn(scheduler.run());

        // Startup cycle runs immediately.
        let mut state = trigger.watch_state();
        state.wait_for(|s| *s == ScanState::Scanning).await.unwrap();
        assert_eq!(cycle.runs(), 1);

        assert_eq!(trigger.trigger(), TriggerAck::Pending);
        assert_eq!(trigger.trigger(), TriggerAck::Coalesced);
        assert_eq!(trigger.clone().trigger(), TriggerAck::Coalesced);

        // Startup cycle ends at t=10, the single follow-up at t=20.
        sleep(Duration::from_secs(25)).await;
        assert_eq!(cycle.runs(), 2);
        assert_eq!(cycle.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(trigger.state(), ScanState::Idle);

        // Next scheduled cycle: one interval after the follow-up ended.
        sleep(Duration::from_secs(50)).await;
        assert_eq!(cycle.runs(), 2);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(cycle.runs(), 3);

        drop(state);
        drop(trigger);
        task.await.unwrap();
        assert_eq!(cycle.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_trigger_is_queued() {
        let cycle = Arc::new(SlowCycle::new(Duration::from_secs(1)));
        let (scheduler, trigger) = RescanScheduler::new(cycle.clone(), Duration::from_secs(60));
        let task = tokio::spawn(scheduler.run());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(cycle.runs(), 1);
        assert_eq!(trigger.state(), ScanState::Idle);

        assert_eq!(trigger.trigger(), TriggerAck::Queued);
        sleep(Duration::from_secs(2)).await;
        assert_eq!(cycle.runs(), 2);

        drop(trigger);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_trigger_after_stop() {
        let cycle = Arc::new(SlowCycle::new(Duration::from_millis(1)));
        let (scheduler, trigger) = RescanScheduler::new(cycle, Duration::from_secs(60));
        drop(scheduler);
        assert_eq!(trigger.trigger(), TriggerAck::Stopped);
    }
}
