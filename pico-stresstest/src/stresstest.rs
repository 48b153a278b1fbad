//! Drive a [`Workload`] against a remote container API, phase by phase.

use std::time::{Duration, Instant};

use anyhow::Result;
use futures::StreamExt;
use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchTracker, ContainerRecord, DuplicateIdentifier};
use crate::http::{HttpRemote, Outcome};
use crate::report::{PhaseMetrics, Reporter};
use crate::sampler::Sampler;
use crate::workload::{Action, Phase, SamplePolicy, Selection, Workload, container_name};

/// How a phase of the run ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PhaseStatus {
    /// Every planned operation was issued and finished.
    Completed,
    /// The phase could not be planned and issued no operations.
    Aborted(String),
    /// Cancellation stopped the phase before all operations were issued.
    Interrupted,
    /// Cancellation happened before the phase started.
    Skipped,
}

/// Results of one phase.
#[derive(Debug)]
pub struct PhaseSummary {
    /// The action performed in this phase.
    pub action: Action,
    /// How the phase ended.
    pub status: PhaseStatus,
    /// The containers that operations were issued for, in issuance order.
    pub targets: Vec<String>,
    /// Counters and latencies of the issued operations.
    pub metrics: PhaseMetrics,
}

impl PhaseSummary {
    fn empty(action: Action, status: PhaseStatus) -> Self {
        Self {
            action,
            status,
            targets: Vec::new(),
            metrics: PhaseMetrics::default(),
        }
    }
}

/// Results of a whole run.
#[derive(Debug)]
pub struct RunSummary {
    /// All phases, starting with the creation phase.
    pub phases: Vec<PhaseSummary>,
    /// Containers left in the batch after the run, in creation order.
    pub remaining: Vec<String>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl RunSummary {
    /// Returns the first phase performing `action`.
    pub fn phase(&self, action: Action) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.action == action)
    }

    /// Phases that were aborted because they could not be planned.
    pub fn aborted(&self) -> impl Iterator<Item = &PhaseSummary> {
        self.phases
            .iter()
            .filter(|p| matches!(p.status, PhaseStatus::Aborted(_)))
    }

    /// Returns `true` if all configured phases ran to completion.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self
                .phases
                .iter()
                .all(|p| p.status == PhaseStatus::Completed)
    }
}

/// Runs the given workload against the remote.
///
/// The run creates the configured number of containers and then executes the remaining phases
/// in order. Failed operations are reported and counted, but never stop a phase. Once `cancel`
/// fires, no further operations are issued; operations already in flight finish and the
/// remaining phases are skipped.
///
/// Returns an error only if the batch invariants are violated.
pub async fn run(
    remote: HttpRemote,
    workload: Workload,
    reporter: Reporter,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    tracing::info!(
        remote = remote.base_url(),
        count = workload.count,
        images = ?workload.images,
        concurrency = workload.concurrency,
        seed = workload.seed,
        "starting stresstest"
    );

    let batch = BatchTracker::new();
    let mut driver = Driver {
        sampler: Sampler::seeded(workload.seed),
        policy: workload.sample_policy,
        executor: Executor {
            remote: &remote,
            batch: &batch,
            reporter,
            cancel: &cancel,
            concurrency: workload.concurrency,
        },
    };

    let mut phases = Vec::with_capacity(workload.phases.len() + 1);
    phases.push(driver.create(workload.count, &workload.images).await?);
    tracing::info!(containers = batch.len(), "finished creating containers");

    if let Some(settle) = workload.settle.filter(|_| !workload.phases.is_empty()) {
        tracing::info!(?settle, "waiting for containers to settle");
        tokio::select! {
            _ = tokio::time::sleep(settle) => {}
            _ = cancel.cancelled() => {}
        }
    }

    for phase in &workload.phases {
        if cancel.is_cancelled() {
            phases.push(PhaseSummary::empty(phase.action, PhaseStatus::Skipped));
        } else {
            phases.push(driver.act(phase).await?);
        }
    }

    let summary = RunSummary {
        phases,
        remaining: batch.all(),
        cancelled: cancel.is_cancelled(),
    };
    driver.executor.reporter.summary(&summary);

    Ok(summary)
}

/// A finished operation: its target, outcome and latency.
type Issued = (ContainerRecord, Outcome, Duration);

/// Plans phases and hands their targets to the [`Executor`].
struct Driver<'a> {
    sampler: Sampler,
    policy: SamplePolicy,
    executor: Executor<'a>,
}

impl Driver<'_> {
    /// Creates `count` containers, each from a randomly chosen image.
    ///
    /// Records are derived one at a time as the previous ones are issued, so a cancelled run
    /// never materializes the full plan.
    async fn create(&mut self, count: usize, images: &[String]) -> Result<PhaseSummary> {
        if count > 0 && images.is_empty() {
            anyhow::bail!("no images to create containers from");
        }

        let sampler = &mut self.sampler;
        let plan = (0..count).map_while(move |index| {
            let image = sampler.choose(images)?;
            Some(ContainerRecord::new(container_name(image, index), image))
        });

        self.executor.execute(Action::Create, plan, count).await
    }

    /// Plans and executes a phase acting on containers in the batch.
    async fn act(&mut self, phase: &Phase) -> Result<PhaseSummary> {
        // The snapshot is taken once, containers added later are not eligible.
        let population = self.executor.batch.records();

        let targets = match phase.selection {
            Selection::All => population,
            Selection::Sample(k) => {
                let k = match self.policy {
                    SamplePolicy::Strict => k,
                    SamplePolicy::Clamp => k.min(population.len()),
                };
                match self.sampler.sample(&population, k) {
                    Ok(sample) => sample,
                    Err(err) => {
                        tracing::error!(
                            error = &err as &dyn std::error::Error,
                            action = %phase.action,
                            "aborting phase"
                        );
                        let status = PhaseStatus::Aborted(err.to_string());
                        return Ok(PhaseSummary::empty(phase.action, status));
                    }
                }
            }
        };

        let planned = targets.len();
        self.executor.execute(phase.action, targets, planned).await
    }
}

/// Issues operations against the remote and reports their results.
struct Executor<'a> {
    remote: &'a HttpRemote,
    batch: &'a BatchTracker,
    reporter: Reporter,
    cancel: &'a CancellationToken,
    concurrency: usize,
}

impl Executor<'_> {
    /// Issues `action` for every target, with at most `concurrency` operations in flight.
    ///
    /// Results are reported in the order operations were issued. `targets` is consumed lazily
    /// and is expected to yield `planned` records.
    async fn execute<I>(
        &mut self,
        action: Action,
        targets: I,
        planned: usize,
    ) -> Result<PhaseSummary>
    where
        I: IntoIterator<Item = ContainerRecord>,
    {
        self.reporter.phase(action, planned);

        let phase_start = Instant::now();
        let mut metrics = PhaseMetrics::default();
        let mut issued = Vec::new();

        let remote = self.remote;
        let batch = self.batch;
        let cancel = self.cancel;

        let mut results = futures::stream::iter(targets)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|record| {
                // Creating a container reserves its name, even if the request fails later.
                let reserved = match action {
                    Action::Create => batch.record(record.clone()),
                    _ => Ok(()),
                };
                if let Err(err) = reserved {
                    return Either::Left(future::ready(Err::<Issued, _>(err)));
                }

                Either::Right(async move {
                    let start = Instant::now();
                    let outcome = perform(remote, action, &record).await;
                    Ok::<_, DuplicateIdentifier>((record, outcome, start.elapsed()))
                })
            })
            .buffered(self.concurrency);

        while let Some(result) = results.next().await {
            let (record, outcome, elapsed) = result?;

            self.reporter.report(action, &record.name, &outcome);
            if action == Action::Delete && outcome.is_success() {
                batch.remove(&record.name);
            }

            metrics.record(&outcome, elapsed);
            issued.push(record.name);
        }

        metrics.elapsed = phase_start.elapsed();
        let status = if issued.len() < planned {
            tracing::warn!(%action, issued = issued.len(), planned, "phase interrupted");
            PhaseStatus::Interrupted
        } else {
            PhaseStatus::Completed
        };

        Ok(PhaseSummary {
            action,
            status,
            targets: issued,
            metrics,
        })
    }
}

async fn perform(remote: &HttpRemote, action: Action, record: &ContainerRecord) -> Outcome {
    let name = record.name.as_str();
    match action {
        Action::Create => remote.create(name, &record.image).await,
        Action::Restart => remote.restart(name).await,
        Action::Stop => remote.stop(name).await,
        Action::Start => remote.start(name).await,
        Action::FetchLogs => remote.fetch_logs(name).await,
        Action::Delete => remote.delete(name).await,
    }
}
