//! Timer-driven world sweeps.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use grandline_core::world::{SweepKind, Sweeper};

/// One background task per sweep kind, stopped together.
#[derive(Debug)]
pub struct SweepScheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(SweepKind, JoinHandle<()>)>,
}

impl SweepScheduler {
    /// Spawn a task per sweep kind on the current runtime. The first run of
    /// each kind happens one full interval after start.
    #[must_use]
    pub fn start(sweeper: &Sweeper) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let tasks = SweepKind::ALL
            .into_iter()
            .map(|kind| {
                let task = tokio::spawn(run_loop(sweeper.clone(), kind, rx.clone()));
                (kind, task)
            })
            .collect();
        info!("sweep scheduler started");
        Self { shutdown, tasks }
    }

    /// Number of running sweep tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Signal every task and wait for them to finish. A sweep in progress
    /// finishes its current record batch first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for (kind, task) in self.tasks {
            if let Err(e) = task.await {
                warn!(kind = %kind, error = %e, "sweep task ended abnormally");
            }
        }
        info!("sweep scheduler stopped");
    }
}

async fn run_loop(sweeper: Sweeper, kind: SweepKind, mut shutdown: watch::Receiver<bool>) {
    let period = kind.interval(sweeper.config());
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut rng = StdRng::from_entropy();
    debug!(kind = %kind, period_secs = period.as_secs(), "sweep loop running");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = tokio::select! {
                    report = sweeper.run_cooperative(kind, &mut rng) => report,
                    _ = shutdown.changed() => break,
                };
                if let Some(reason) = report.aborted {
                    warn!(kind = %kind, reason = %reason, "sweep aborted");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!(kind = %kind, "sweep loop exiting");
}
