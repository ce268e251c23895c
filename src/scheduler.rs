//! Polling loop with a randomized inter-cycle delay
//!
//! The loop runs a cycle, picks a delay uniformly from a closed range, waits,
//! and repeats. It stops after a configured number of cycles, when a stop is
//! requested, or (optionally) on the first failed cycle. A cycle in progress
//! always runs to completion; a stop request only cuts the wait short.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::ScheduleConfig;
use crate::error::{GmailError, Result};

/// Closed range of whole seconds to wait between cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min_secs: u64,
    max_secs: u64,
}

impl DelayRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Result<Self> {
        if min_secs > max_secs {
            return Err(GmailError::ConfigError(format!(
                "Delay range minimum {}s exceeds maximum {}s",
                min_secs, max_secs
            )));
        }
        Ok(Self { min_secs, max_secs })
    }

    pub fn min_secs(&self) -> u64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> u64 {
        self.max_secs
    }

    /// Pick a delay uniformly, both bounds included
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_secs(rng.gen_range(self.min_secs..=self.max_secs))
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min_secs: 45,
            max_secs: 120,
        }
    }
}

/// Suspends the loop between cycles
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock sleeping via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Cloneable handle that asks a running scheduler to stop
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopState>,
}

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if nobody is waiting yet
        self.inner.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        if self.is_stopped() {
            return;
        }
        self.inner.notify.notified().await;
    }
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCycles,
    Requested,
}

/// Totals for a finished loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    /// Waits started between cycles
    pub waits: u64,
    pub last_delay: Option<Duration>,
    pub stop_reason: StopReason,
}

/// Runs cycles until a stop condition is met
pub struct Scheduler<S: Sleeper, R: Rng = StdRng> {
    delay_range: DelayRange,
    max_cycles: Option<u64>,
    stop_on_error: bool,
    sleeper: S,
    rng: R,
    stop: StopHandle,
}

impl<S: Sleeper> Scheduler<S, StdRng> {
    pub fn new(delay_range: DelayRange, sleeper: S) -> Self {
        Self {
            delay_range,
            max_cycles: None,
            stop_on_error: false,
            sleeper,
            rng: StdRng::from_entropy(),
            stop: StopHandle::new(),
        }
    }

    /// Build from the `[schedule]` config table
    pub fn from_config(config: &ScheduleConfig, sleeper: S) -> Result<Self> {
        let delay_range = DelayRange::new(config.min_delay_secs, config.max_delay_secs)?;
        Ok(Self::new(delay_range, sleeper)
            .max_cycles(config.max_cycles)
            .stop_on_error(config.stop_on_error))
    }
}

impl<S: Sleeper, R: Rng> Scheduler<S, R> {
    /// Replace the random source
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Scheduler<S, R2> {
        Scheduler {
            delay_range: self.delay_range,
            max_cycles: self.max_cycles,
            stop_on_error: self.stop_on_error,
            sleeper: self.sleeper,
            rng,
            stop: self.stop,
        }
    }

    pub fn max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn delay_range(&self) -> DelayRange {
        self.delay_range
    }

    /// Drive `cycle` until a stop condition is met
    ///
    /// `cycle` receives the 1-based cycle number. A failed cycle is logged
    /// and counted; with `stop_on_error` its error is returned instead.
    pub async fn run<T, F, Fut>(&mut self, mut cycle: F) -> Result<ScheduleSummary>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut summary = ScheduleSummary {
            cycles_run: 0,
            cycles_failed: 0,
            waits: 0,
            last_delay: None,
            stop_reason: StopReason::Requested,
        };

        loop {
            if self.stop.is_stopped() {
                return Ok(summary);
            }

            summary.cycles_run += 1;
            let cycles_run = summary.cycles_run;
            if let Err(e) = cycle(cycles_run).await {
                summary.cycles_failed += 1;
                if self.stop_on_error {
                    error!("Cycle {} failed, stopping: {}", cycles_run, e);
                    return Err(e);
                }
                if e.is_auth_failure() {
                    error!("Cycle {} could not authorize: {}", cycles_run, e);
                } else {
                    warn!("Cycle {} failed: {}", cycles_run, e);
                }
            }

            if let Some(max) = self.max_cycles {
                if cycles_run >= max {
                    info!("Completed {} cycles", cycles_run);
                    summary.stop_reason = StopReason::MaxCycles;
                    return Ok(summary);
                }
            }

            let delay = self.delay_range.sample(&mut self.rng);
            info!("Next check in {} seconds", delay.as_secs());
            summary.waits += 1;
            summary.last_delay = Some(delay);

            tokio::select! {
                _ = self.sleeper.sleep(delay) => {}
                _ = self.stop.stopped() => {
                    info!("Stop requested, leaving the polling loop");
                    return Ok(summary);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records requested sleeps and returns immediately
    #[derive(Default, Clone)]
    struct RecordingSleeper {
        slept: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    /// Never wakes; only a stop request can end the wait
    struct ForeverSleeper;

    #[async_trait]
    impl Sleeper for ForeverSleeper {
        async fn sleep(&self, _duration: Duration) {
            std::future::pending::<()>().await;
        }
    }

    #[test]
    fn test_delay_range_rejects_inverted_bounds() {
        assert!(DelayRange::new(120, 45).is_err());
        assert!(DelayRange::new(60, 60).is_ok());
    }

    #[test]
    fn test_default_delay_range() {
        let range = DelayRange::default();
        assert_eq!(range.min_secs(), 45);
        assert_eq!(range.max_secs(), 120);
    }

    #[test]
    fn test_sample_hits_both_bounds() {
        let range = DelayRange::new(1, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<u64> = (0..500).map(|_| range.sample(&mut rng).as_secs()).collect();

        assert!(samples.contains(&1));
        assert!(samples.contains(&3));
        assert!(samples.iter().all(|s| (1..=3).contains(s)));
    }

    proptest! {
        #[test]
        fn prop_default_delay_within_bounds(seed in any::<u64>()) {
            let range = DelayRange::default();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..50 {
                let secs = range.sample(&mut rng).as_secs();
                prop_assert!((45..=120).contains(&secs));
            }
        }
    }

    #[tokio::test]
    async fn test_runs_bounded_number_of_cycles() {
        let sleeper = RecordingSleeper::default();
        let slept = Arc::clone(&sleeper.slept);
        let mut scheduler = Scheduler::new(DelayRange::default(), sleeper)
            .with_rng(StdRng::seed_from_u64(1))
            .max_cycles(Some(3));

        let mut seen = Vec::new();
        let summary = scheduler
            .run(|n| {
                seen.push(n);
                async { Ok::<_, GmailError>(()) }
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(summary.cycles_run, 3);
        assert_eq!(summary.cycles_failed, 0);
        assert_eq!(summary.stop_reason, StopReason::MaxCycles);

        // No wait after the final cycle
        let slept = slept.lock().unwrap().clone();
        assert_eq!(slept.len(), 2);
        assert_eq!(summary.waits, 2);
        assert_eq!(summary.last_delay, slept.last().copied());
        for delay in slept {
            assert!(delay >= Duration::from_secs(45) && delay <= Duration::from_secs(120));
        }
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_stop_loop_by_default() {
        let mut scheduler = Scheduler::new(DelayRange::new(1, 1).unwrap(), RecordingSleeper::default())
            .max_cycles(Some(3));

        let summary = scheduler
            .run(|n| async move {
                if n == 1 {
                    Err(GmailError::AuthError("no token".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.cycles_run, 3);
        assert_eq!(summary.cycles_failed, 1);
    }

    #[tokio::test]
    async fn test_stop_on_error_returns_first_failure() {
        let sleeper = RecordingSleeper::default();
        let slept = Arc::clone(&sleeper.slept);
        let mut scheduler = Scheduler::new(DelayRange::new(1, 1).unwrap(), sleeper)
            .stop_on_error(true)
            .max_cycles(Some(5));

        let result = scheduler
            .run(|n| async move {
                if n == 2 {
                    Err(GmailError::ApiError("labels.list failed".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(GmailError::ApiError(_))));
        assert_eq!(slept.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_request_interrupts_wait() {
        let mut scheduler = Scheduler::new(DelayRange::default(), ForeverSleeper);
        let stop = scheduler.stop_handle();

        let summary = scheduler
            .run(|_| {
                let stop = stop.clone();
                async move {
                    stop.request_stop();
                    Ok::<_, GmailError>(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.cycles_run, 1);
        assert_eq!(summary.stop_reason, StopReason::Requested);
    }

    #[tokio::test]
    async fn test_stop_before_start_runs_nothing() {
        let mut scheduler = Scheduler::new(DelayRange::default(), RecordingSleeper::default());
        scheduler.stop_handle().request_stop();

        let summary = scheduler
            .run(|_| async { Ok::<_, GmailError>(()) })
            .await
            .unwrap();

        assert_eq!(summary.cycles_run, 0);
        assert_eq!(summary.stop_reason, StopReason::Requested);
    }

    #[test]
    fn test_from_config() {
        let config = ScheduleConfig {
            min_delay_secs: 10,
            max_delay_secs: 20,
            max_cycles: Some(2),
            stop_on_error: true,
        };
        let scheduler = Scheduler::from_config(&config, TokioSleeper).unwrap();
        assert_eq!(scheduler.delay_range(), DelayRange::new(10, 20).unwrap());
        assert_eq!(scheduler.max_cycles, Some(2));
        assert!(scheduler.stop_on_error);
    }
}
