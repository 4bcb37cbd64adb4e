//! Keeps one worker thread alive per slot. A worker that returns, fails or
//! panics is replaced straight away with the next generation of its slot.
//! A slot that keeps dying within a second of starting has its replacements
//! held back with a growing delay.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::metrics::WORKER_RESTARTS;
use crate::worker::WorkerId;

/// Body of a worker thread. Runs until the worker stops.
pub type WorkerMain = Arc<dyn Fn(WorkerId) -> anyhow::Result<()> + Send + Sync>;

/// A run shorter than this counts towards the slot's fast-exit streak.
pub const FAST_EXIT: Duration = Duration::from_secs(1);

/// Fast exits tolerated in a row before replacements are delayed.
pub const FAST_EXIT_GRACE: u32 = 3;

const MIN_RESTART_DELAY: Duration = Duration::from_millis(100);
const MAX_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Delay before the replacement starts, given the slot's fast-exit streak.
pub fn restart_delay(streak: u32) -> Duration {
    if streak <= FAST_EXIT_GRACE {
        return Duration::ZERO;
    }
    let doublings = (streak - FAST_EXIT_GRACE - 1).min(16);
    MIN_RESTART_DELAY
        .saturating_mul(1 << doublings)
        .min(MAX_RESTART_DELAY)
}

#[derive(Debug)]
struct WorkerExit {
    id: WorkerId,
    panicked: bool,
    ran_for: Duration,
}

// Reports the exit from inside the worker thread, during unwinding too.
struct ExitNotice {
    id: WorkerId,
    started: Instant,
    tx: mpsc::UnboundedSender<WorkerExit>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerExit {
            id: self.id,
            panicked: std::thread::panicking(),
            ran_for: self.started.elapsed(),
        });
    }
}

pub struct Supervisor {
    slots: usize,
    worker_main: WorkerMain,
}

impl Supervisor {
    pub fn new(slots: usize, worker_main: WorkerMain) -> Self {
        Self {
            slots: slots.max(1),
            worker_main,
        }
    }

    /// Spawn every slot and respawn exits until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel();
        let mut streaks = vec![0u32; self.slots];
        for slot in 0..self.slots {
            self.spawn(WorkerId::new(slot), Duration::ZERO, exit_tx.clone())?;
        }
        info!(workers = self.slots, "supervisor started");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("supervisor shutting down");
                    return Ok(());
                }
                Some(exit) = exit_rx.recv() => {
                    WORKER_RESTARTS.inc();
                    let streak = &mut streaks[exit.id.slot];
                    *streak = if exit.ran_for < FAST_EXIT {
                        streak.saturating_add(1)
                    } else {
                        0
                    };
                    let delay = restart_delay(*streak);
                    let next = exit.id.respawned();
                    warn!(
                        worker = %exit.id,
                        panicked = exit.panicked,
                        replacement = %next,
                        delay_ms = delay.as_millis() as u64,
                        "worker exited, respawning"
                    );
                    self.spawn(next, delay, exit_tx.clone())?;
                }
            }
        }
    }

    fn spawn(
        &self,
        id: WorkerId,
        delay: Duration,
        tx: mpsc::UnboundedSender<WorkerExit>,
    ) -> std::io::Result<()> {
        let worker_main = Arc::clone(&self.worker_main);
        std::thread::Builder::new()
            .name(format!("impact-{id}"))
            .spawn(move || {
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                let _notice = ExitNotice {
                    id,
                    started: Instant::now(),
                    tx,
                };
                match worker_main(id) {
                    Ok(()) => info!(worker = %id, "worker stopped"),
                    Err(e) => error!(worker = %id, error = ?e, "worker failed"),
                }
            })?;
        Ok(())
    }
}
