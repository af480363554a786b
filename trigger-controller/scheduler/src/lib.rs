//! Gateway Trigger Scheduler
//!
//! Turns a stream of dirty notifications into a bounded rate of generator
//! runs. Notifications are debounced, with a hard cap on how long a burst can
//! postpone a run; at most one generation runs at a time, and each runs under
//! a deadline. A successful run's references are diffed against the previous
//! run's and committed to the reference index, which the scheduler alone
//! writes. Failed runs are retried with exponential back-off.
//!
//! The scheduler publishes its [`State`], the latest artifact, and the latest
//! surfaced failure on watch channels.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backoff;
mod metrics;
mod state;


pub use self::{backoff::ExponentialBackoff, metrics::SchedulerMetrics, state::State};

use self::state::Machine;
use gateway_trigger_k8s_index::{Delta, DirtySignal, IndexCommitter, IndexUnderflow, References};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
    time::{self, Instant},
};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Clone, Debug)]
pub struct Config {
    pub debounce: Duration,
    /// The longest a dirty period may last before a generation is forced.
    pub max_delay: Duration,
    pub generate_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Consecutive failures after which the error is surfaced.
    pub failure_threshold: u32,
    pub shutdown_grace: Duration,
}

/// Produces a configuration artifact and the references it was built from.
#[async_trait::async_trait]
pub trait Generate: Send + Sync + 'static {
    type Artifact: Send + Sync + 'static;

    async fn generate(&self) -> anyhow::Result<Generation<Self::Artifact>>;
}

/// The output of a successful generation.
#[derive(Clone, Debug)]
pub struct Generation<A> {
    pub artifact: A,
    /// Every owner in the emission, with each referent it pulled in.
    pub references: References,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generation failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("generation cancelled")]
    Cancelled,
}

/// A generator failure that has persisted past the failure threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub consecutive: u32,
    pub error: String,
}

/// Signals the scheduler. Cheap to clone; held by dispatchers.
#[derive(Clone, Debug)]
pub struct Handle {
    tx: mpsc::UnboundedSender<Signal>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Signal {
    Dirty,
    Cancel,
}

pub struct Scheduler<G: Generate, C> {
    config: Config,
    generator: Arc<G>,
    committer: C,
    metrics: SchedulerMetrics,
    rx: mpsc::UnboundedReceiver<Signal>,
    states: watch::Sender<State>,
    artifacts: watch::Sender<Option<Arc<G::Artifact>>>,
    failures: watch::Sender<Option<Failure>>,
}

type Task<A> = JoinHandle<Result<Generation<A>, GenerateError>>;

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            generate_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
            failure_threshold: 5,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

// === impl Handle ===

impl Handle {
    pub fn mark_dirty(&self) {
        let _ = self.tx.send(Signal::Dirty);
    }

    /// Aborts a pending debounce. If a generation is running, it is rerun
    /// once it completes.
    pub fn cancel(&self) {
        let _ = self.tx.send(Signal::Cancel);
    }
}

impl DirtySignal for Handle {
    fn mark_dirty(&self) {
        Handle::mark_dirty(self)
    }
}

// === impl Scheduler ===

impl<G, C> Scheduler<G, C>
where
    G: Generate,
    C: IndexCommitter,
{
    pub fn new(
        config: Config,
        generator: G,
        committer: C,
        metrics: SchedulerMetrics,
    ) -> (Self, Handle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (states, _) = watch::channel(State::Dirty);
        let (artifacts, _) = watch::channel(None);
        let (failures, _) = watch::channel(None);
        let scheduler = Self {
            config,
            generator: Arc::new(generator),
            committer,
            metrics,
            rx,
            states,
            artifacts,
            failures,
        };
        (scheduler, Handle { tx })
    }

    pub fn states(&self) -> watch::Receiver<State> {
        self.states.subscribe()
    }

    pub fn artifacts(&self) -> watch::Receiver<Option<Arc<G::Artifact>>> {
        self.artifacts.subscribe()
    }

    /// Publishes the latest failure once the failure threshold is reached;
    /// cleared by the next success.
    pub fn failures(&self) -> watch::Receiver<Option<Failure>> {
        self.failures.subscribe()
    }

    /// Runs the control loop until shutdown.
    ///
    /// Only an index underflow ends the loop early; it indicates that the
    /// generator reported references inconsistent with its previous run.
    pub async fn run(self, drain: drain::Watch) -> Result<(), IndexUnderflow> {
        self.run_inner(drain)
            .instrument(info_span!("scheduler"))
            .await
    }

    async fn run_inner(mut self, drain: drain::Watch) -> Result<(), IndexUnderflow> {
        let mut machine = Machine::new(&self.config, Instant::now());
        let mut previous = References::default();
        let mut task: Option<(Task<G::Artifact>, Instant)> = None;
        let mut signals_open = true;

        let shutdown = drain.signaled();
        tokio::pin!(shutdown);

        loop {
            self.publish_state(machine.state());
            let deadline = machine.deadline();

            tokio::select! {
                biased;

                release = &mut shutdown => {
                    let drained = self.drain(&mut machine, &mut previous, task.take());
                    return release.release_after(drained).await;
                }

                res = join(&mut task) => {
                    let started = task.take().map(|(_, started)| started);
                    let elapsed = started.map_or(Duration::ZERO, |s| s.elapsed());
                    let res = res.unwrap_or_else(|e| Err(joined(e)));
                    self.complete(&mut machine, &mut previous, res, elapsed)?;
                }

                signal = self.rx.recv(), if signals_open => match signal {
                    Some(Signal::Dirty) => machine.dirty(Instant::now()),
                    Some(Signal::Cancel) => {
                        debug!(state = %machine.state(), "cancelled");
                        machine.cancel();
                    }
                    None => {
                        debug!("all handles dropped");
                        signals_open = false;
                    }
                },

                () = sleep_until(deadline) => {
                    let now = Instant::now();
                    let waited = machine.launch(now);
                    self.metrics.launched(waited);
                    debug!(?waited, "generating");
                    task = Some((self.spawn(), now));
                }
            }
        }
    }

    /// Runs the generator on its own task so that the deadline is enforced
    /// even when the generator blocks its thread. A generation that misses
    /// the deadline is aborted and its late result discarded.
    fn spawn(&self) -> Task<G::Artifact> {
        let generator = self.generator.clone();
        let timeout = self.config.generate_timeout;
        tokio::spawn(
            async move {
                let mut generation =
                    tokio::spawn(async move { generator.generate().await }.in_current_span());
                match time::timeout(timeout, &mut generation).await {
                    Ok(Ok(res)) => res.map_err(GenerateError::Failed),
                    Ok(Err(error)) => Err(joined(error)),
                    Err(_) => {
                        generation.abort();
                        Err(GenerateError::TimedOut(timeout))
                    }
                }
            }
            .in_current_span(),
        )
    }

    fn complete(
        &mut self,
        machine: &mut Machine,
        previous: &mut References,
        res: Result<Generation<G::Artifact>, GenerateError>,
        elapsed: Duration,
    ) -> Result<(), IndexUnderflow> {
        match res {
            Ok(Generation {
                artifact,
                references,
            }) => {
                let delta = Delta::between(previous, &references);
                let snapshot = self.committer.commit(&delta)?;
                *previous = references;
                machine.succeeded(Instant::now());
                self.metrics.completed("success", elapsed, 0);
                info!(
                    generation = snapshot.generation(),
                    ?elapsed,
                    "generated configuration"
                );
                self.artifacts.send_replace(Some(Arc::new(artifact)));
                self.failures.send_if_modified(|f| f.take().is_some());
            }

            Err(error) => {
                let result = match error {
                    GenerateError::TimedOut(_) => "timeout",
                    _ => "failure",
                };
                let delay = machine.failed(Instant::now());
                let failures = machine.failures();
                self.metrics.completed(result, elapsed, failures);
                if failures >= self.config.failure_threshold {
                    error!(%error, failures, ?delay, "generation keeps failing");
                    self.failures.send_replace(Some(Failure {
                        consecutive: failures,
                        error: error.to_string(),
                    }));
                } else {
                    warn!(%error, failures, ?delay, "generation failed; retrying");
                }
            }
        }
        Ok(())
    }

    /// Waits up to the grace period for an in-flight generation.
    async fn drain(
        mut self,
        machine: &mut Machine,
        previous: &mut References,
        task: Option<(Task<G::Artifact>, Instant)>,
    ) -> Result<(), IndexUnderflow> {
        let Some((mut task, started)) = task else {
            debug!("shutting down");
            return Ok(());
        };

        info!(grace = ?self.config.shutdown_grace, "draining generation");
        match time::timeout(self.config.shutdown_grace, &mut task).await {
            Ok(res) => {
                let res = res.unwrap_or_else(|e| Err(joined(e)));
                self.complete(machine, previous, res, started.elapsed())?;
            }
            Err(_) => {
                task.abort();
                machine.abandoned();
                debug!(error = %GenerateError::Cancelled, "abandoned generation");
            }
        }
        self.publish_state(machine.state());
        Ok(())
    }

    fn publish_state(&self, state: State) {
        self.states.send_if_modified(|s| {
            if *s == state {
                return false;
            }
            *s = state;
            true
        });
    }
}

async fn join<A>(
    task: &mut Option<(Task<A>, Instant)>,
) -> Result<Result<Generation<A>, GenerateError>, JoinError> {
    match task {
        Some((task, _)) => task.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn joined(error: JoinError) -> GenerateError {
    if error.is_cancelled() {
        GenerateError::Cancelled
    } else {
        GenerateError::Failed(anyhow::anyhow!("generator panicked: {error}"))
    }
}
