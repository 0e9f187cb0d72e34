//! Periodic refresh loop and the debounce token used by the chart.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::logging::{log, obj, v_num, Domain, Level};

/// One unit of periodic work. The token is cancelled when the scheduler is
/// stopped or restarted while the cycle is still in flight.
#[async_trait]
pub trait RefreshTask: Send + 'static {
    async fn run_cycle(&mut self, cancel: &CancellationToken);
}

struct Running<T> {
    cancel: CancellationToken,
    handle: JoinHandle<T>,
}

/// Runs a `RefreshTask` immediately and then on every interval tick.
///
/// At most one loop is active: starting again cancels the previous loop and
/// any cycle it had in flight.
pub struct RefreshScheduler<T: RefreshTask> {
    interval: Duration,
    running: Option<Running<T>>,
}

impl<T: RefreshTask> RefreshScheduler<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.handle.is_finished())
    }

    pub fn start(&mut self, task: T) {
        if let Some(prev) = self.running.take() {
            prev.cancel.cancel();
            log(Level::Debug, Domain::Cycle, "scheduler_restarted", obj(&[]));
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(task, self.interval, cancel.clone()));
        log(
            Level::Info,
            Domain::Cycle,
            "scheduler_started",
            obj(&[("interval_secs", v_num(self.interval.as_secs_f64()))]),
        );
        self.running = Some(Running { cancel, handle });
    }

    /// Run `task` until `shutdown` resolves, then stop and hand the task back.
    pub async fn run_until<F: Future>(&mut self, task: T, shutdown: F) -> Option<T> {
        self.start(task);
        shutdown.await;
        self.stop().await
    }

    /// Cancel the loop and wait for it to hand the task back.
    pub async fn stop(&mut self) -> Option<T> {
        let running = self.running.take()?;
        running.cancel.cancel();
        match running.handle.await {
            Ok(task) => Some(task),
            Err(err) => {
                log(
                    Level::Error,
                    Domain::Cycle,
                    "scheduler_join_failed",
                    obj(&[("error", serde_json::json!(err.to_string()))]),
                );
                None
            }
        }
    }
}

impl<T: RefreshTask> Drop for RefreshScheduler<T> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

async fn run_loop<T: RefreshTask>(mut task: T, interval: Duration, cancel: CancellationToken) -> T {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let cycle = cancel.child_token();
        task.run_cycle(&cycle).await;
        if cancel.is_cancelled() {
            break;
        }
    }
    task
}

// =============================================================================
// Debounce
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceToken(u64);

/// Generation-counter debounce. Each `schedule` supersedes the previous
/// token; only the newest token may fire, and only once its quiet period has
/// elapsed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    generation: u64,
    pending: Option<(DebounceToken, Instant)>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            generation: 0,
            pending: None,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn schedule(&mut self, now: Instant) -> DebounceToken {
        self.generation += 1;
        let token = DebounceToken(self.generation);
        self.pending = Some((token, now + self.quiet));
        token
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_current(&self, token: DebounceToken) -> bool {
        self.pending.is_some_and(|(t, _)| t == token)
    }

    /// Token that is ready to fire at `now`, if any.
    pub fn due(&self, now: Instant) -> Option<DebounceToken> {
        self.pending
            .filter(|(_, deadline)| now >= *deadline)
            .map(|(token, _)| token)
    }

    /// Consume `token` if it is current and due.
    pub fn fire(&mut self, token: DebounceToken, now: Instant) -> bool {
        if self.due(now) == Some(token) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{timed, FetchError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Counter {
        ticks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RefreshTask for Counter {
        async fn run_cycle(&mut self, _cancel: &CancellationToken) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_immediately_then_every_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut sched = RefreshScheduler::new(Duration::from_secs(60));
        sched.start(Counter { ticks: ticks.clone() });
        tokio::time::sleep(Duration::from_secs(125)).await;
        assert!(sched.is_running());
        assert!(sched.stop().await.is_some());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(!sched.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_loop() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut sched = RefreshScheduler::new(Duration::from_secs(60));
        sched.start(Counter { ticks: first.clone() });
        tokio::time::sleep(Duration::from_secs(1)).await;
        sched.start(Counter { ticks: second.clone() });
        tokio::time::sleep(Duration::from_secs(200)).await;
        sched.stop().await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut sched = RefreshScheduler::new(Duration::from_secs(60));
        let shutdown = tokio::time::sleep(Duration::from_secs(90));
        let task = sched.run_until(Counter { ticks: ticks.clone() }, shutdown).await;
        assert!(task.is_some());
        assert!(!sched.is_running());
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    struct Hanging {
        seen: Arc<Mutex<Vec<FetchError>>>,
    }

    #[async_trait]
    impl RefreshTask for Hanging {
        async fn run_cycle(&mut self, cancel: &CancellationToken) {
            let res = timed(
                std::future::pending::<Result<(), FetchError>>(),
                Duration::from_secs(3600),
                cancel,
            )
            .await;
            if let Err(err) = res {
                self.seen.lock().unwrap().push(err);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_cycle() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sched = RefreshScheduler::new(Duration::from_secs(60));
        sched.start(Hanging { seen: seen.clone() });
        tokio::time::sleep(Duration::from_secs(5)).await;
        sched.stop().await;
        assert_eq!(*seen.lock().unwrap(), vec![FetchError::Cancelled]);
    }

    #[test]
    fn test_debounce_supersedes_and_fires_once() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(200));
        let a = d.schedule(t0);
        let b = d.schedule(t0 + Duration::from_millis(100));
        assert!(!d.is_current(a));
        assert!(d.is_current(b));
        // a is superseded even once its own deadline has passed
        assert!(!d.fire(a, t0 + Duration::from_millis(250)));
        assert_eq!(d.due(t0 + Duration::from_millis(250)), None);
        assert!(d.fire(b, t0 + Duration::from_millis(300)));
        assert!(!d.fire(b, t0 + Duration::from_millis(400)));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_debounce_clear() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(200));
        let a = d.schedule(t0);
        d.clear();
        assert!(!d.fire(a, t0 + Duration::from_secs(1)));
    }
}
