//! Task-parallel worker pool
//!
//! One pattern's full pipeline is the unit of work; patterns are independent,
//! so tasks fan out across a bounded set of worker threads and results come
//! back in submission order. An optional rate limit caps task *starts* per
//! fixed window, for backends that sit on shared or license-limited tools.
//! No shared mutable state crosses worker boundaries; all aggregation happens
//! after the pool drains.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};
use tracing::{info, warn};

/// Cooperative cancellation flag, shared between the dispatcher and anything
/// holding a subprocess open. Once set it never clears.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed window length for the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    PerSecond,
    PerMinute,
    PerHour,
}

impl RateWindow {
    fn length(self) -> Duration {
        match self {
            RateWindow::PerSecond => Duration::from_secs(1),
            RateWindow::PerMinute => Duration::from_secs(60),
            RateWindow::PerHour => Duration::from_secs(60 * 60),
        }
    }
}

/// At most `max_starts` task dispatches per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub max_starts: u32,
    pub window: RateWindow,
}

/// Window accounting for the dispatcher. When the quota is exhausted the
/// dispatcher sleeps out the remainder of the window; this is the only
/// intentional sleep in the orchestration layer.
struct RateGate {
    limit: Option<RateLimit>,
    window_began: Instant,
    remaining: u32,
}

impl RateGate {
    fn new(limit: Option<RateLimit>) -> Self {
        Self {
            limit,
            window_began: Instant::now(),
            remaining: limit.map(|l| l.max_starts).unwrap_or(0),
        }
    }

    fn admit(&mut self) {
        let Some(limit) = self.limit else {
            return;
        };
        if self.remaining == 0 {
            let elapsed = self.window_began.elapsed();
            let window = limit.window.length();
            if elapsed < window {
                let remaining_time = window - elapsed;
                info!(?remaining_time, "rate limit reached, sleeping out window");
                std::thread::sleep(remaining_time);
            }
            self.window_began = Instant::now();
            self.remaining = limit.max_starts;
        }
        self.remaining -= 1;
    }
}

/// Number of workers to use for CPU-bound work.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Run `work` over `tasks` on `n_workers` threads and return results in
/// submission order. A task that panics yields `None` in its slot; once
/// `cancel` is set no further tasks are dispatched and undispatched slots
/// stay `None`.
pub fn map<T, R, F>(
    tasks: Vec<T>,
    n_workers: usize,
    rate_limit: Option<RateLimit>,
    cancel: &CancelToken,
    work: F,
) -> Vec<Option<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let n_tasks = tasks.len();
    let n_workers = n_workers.max(1).min(n_tasks.max(1));
    let mut results: Vec<Option<R>> = Vec::with_capacity(n_tasks);
    results.resize_with(n_tasks, || None);
    if n_tasks == 0 {
        return results;
    }

    // Rendezvous dispatch channel: the dispatcher hands over a task only when
    // a worker is ready, so the rate limit meters actual starts.
    let (task_tx, task_rx) = bounded::<(usize, T)>(0);
    let (result_tx, result_rx) = unbounded::<(usize, Option<R>)>();

    std::thread::scope(|scope| {
        for _ in 0..n_workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                for (index, task) in task_rx.iter() {
                    let outcome =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| work(task)));
                    let result = match outcome {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!(task = index, "worker task panicked");
                            None
                        }
                    };
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(task_rx);
        drop(result_tx);

        let mut gate = RateGate::new(rate_limit);
        let mut dispatched = 0usize;
        for (index, task) in tasks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    dispatched,
                    total = n_tasks,
                    "cancellation requested, not dispatching further tasks"
                );
                break;
            }
            gate.admit();
            if task_tx.send((index, task)).is_err() {
                break;
            }
            dispatched += 1;
        }
        drop(task_tx);

        for (index, result) in result_rx.iter() {
            results[index] = result;
        }
    });

    results
}
