//! A module for defining a [`Workload`] that is run against a container orchestration API.

use std::fmt;
use std::time::Duration;

/// The image used when no candidates are configured.
pub const DEFAULT_IMAGE: &str = "nginx:alpine";

/// The number of containers created when no count is configured.
pub const DEFAULT_COUNT: usize = 50;

/// An operation that can be performed against a container.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    /// Create a new container from an image.
    Create,
    /// Restart a container.
    Restart,
    /// Stop a container.
    Stop,
    /// Start a stopped container.
    Start,
    /// Fetch the logs of a container.
    FetchLogs,
    /// Delete a container.
    Delete,
}

impl Action {
    /// The label used for this action in reports.
    pub fn label(self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Restart => "RESTART",
            Action::Stop => "STOP",
            Action::Start => "START",
            Action::FetchLogs => "FETCH LOGS",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which containers of the batch a phase acts on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Selection {
    /// Every container in the batch at the start of the phase.
    All,
    /// A uniformly random sample of the given size.
    Sample(usize),
}

/// One phase following the initial creation of containers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Phase {
    /// The action applied to each selected container.
    pub action: Action,
    /// The containers to act on.
    pub selection: Selection,
}

/// How to treat sample sizes exceeding the batch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SamplePolicy {
    /// Abort the phase with an error.
    #[default]
    Strict,
    /// Shrink the sample to the size of the batch.
    Clamp,
}

/// Errors when building a [`Workload`].
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// No candidate images were given.
    #[error("at least one image is required")]
    NoImages,
    /// An image reference was empty or consisted only of whitespace.
    #[error("invalid image reference `{0}`")]
    InvalidImage(String),
    /// The concurrency was set to zero.
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
}

/// Derives the name of the `index`-th container created from `image`.
///
/// Characters that are not allowed in container names are replaced by `-`, so `nginx:alpine`
/// becomes `nginx-alpine-0` for the first container.
pub fn container_name(image: &str, index: usize) -> String {
    let prefix: String = image
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .collect();

    format!("{prefix}-{index}")
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    count: usize,
    images: Vec<String>,
    seed: u64,
    concurrency: usize,
    settle: Option<Duration>,
    sample_policy: SamplePolicy,

    restart: Option<usize>,
    stop: Option<usize>,
    start: Option<usize>,
    fetch_logs: Option<usize>,
    delete: Option<Selection>,
}

impl WorkloadBuilder {
    /// The number of containers to create.
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// The images to choose from when creating containers.
    ///
    /// Each container picks one of the images uniformly at random.
    pub fn images<I, S>(mut self, images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.images = images.into_iter().map(Into::into).collect();
        self
    }

    /// The seed of the random source driving image choice and sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The maximum number of requests in flight within a phase.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// A pause between creating containers and acting on them.
    pub fn settle(mut self, settle: Option<Duration>) -> Self {
        self.settle = settle;
        self
    }

    /// How to treat sample sizes larger than the batch.
    pub fn sample_policy(mut self, policy: SamplePolicy) -> Self {
        self.sample_policy = policy;
        self
    }

    /// Restarts a random sample of `k` containers.
    pub fn restart(mut self, k: usize) -> Self {
        self.restart = Some(k);
        self
    }

    /// Stops a random sample of `k` containers.
    pub fn stop(mut self, k: usize) -> Self {
        self.stop = Some(k);
        self
    }

    /// Starts a random sample of `k` containers.
    pub fn start(mut self, k: usize) -> Self {
        self.start = Some(k);
        self
    }

    /// Fetches logs of a random sample of `k` containers.
    pub fn fetch_logs(mut self, k: usize) -> Self {
        self.fetch_logs = Some(k);
        self
    }

    /// Deletes the selected containers at the end of the run.
    pub fn delete(mut self, selection: Selection) -> Self {
        self.delete = Some(selection);
        self
    }

    /// Creates the workload instance.
    pub fn build(self) -> Result<Workload, WorkloadError> {
        if self.images.is_empty() {
            return Err(WorkloadError::NoImages);
        }
        if let Some(image) = self.images.iter().find(|i| i.trim().is_empty()) {
            return Err(WorkloadError::InvalidImage(image.clone()));
        }
        if self.concurrency == 0 {
            return Err(WorkloadError::ZeroConcurrency);
        }

        let sampled = [
            (Action::Restart, self.restart),
            (Action::Stop, self.stop),
            (Action::Start, self.start),
            (Action::FetchLogs, self.fetch_logs),
        ];
        let mut phases: Vec<_> = sampled
            .into_iter()
            .filter_map(|(action, k)| {
                k.map(|k| Phase {
                    action,
                    selection: Selection::Sample(k),
                })
            })
            .collect();

        if let Some(selection) = self.delete {
            phases.push(Phase {
                action: Action::Delete,
                selection,
            });
        }

        Ok(Workload {
            count: self.count,
            images: self.images,
            seed: self.seed,
            concurrency: self.concurrency,
            settle: self.settle,
            sample_policy: self.sample_policy,
            phases,
        })
    }
}

/// Description of a stresstest run against a container orchestration API.
///
/// A run always starts by creating [`count`](WorkloadBuilder::count) containers, followed by the
/// configured [`Phase`]s in a fixed order: restart, stop, start, fetch logs and finally delete.
#[derive(Clone, Debug)]
pub struct Workload {
    pub(crate) count: usize,
    pub(crate) images: Vec<String>,
    pub(crate) seed: u64,
    pub(crate) concurrency: usize,
    pub(crate) settle: Option<Duration>,
    pub(crate) sample_policy: SamplePolicy,
    pub(crate) phases: Vec<Phase>,
}

impl Workload {
    /// Constructs a new workload builder.
    ///
    /// Without further configuration, the workload creates [`DEFAULT_COUNT`] containers from
    /// [`DEFAULT_IMAGE`] one at a time and does nothing else.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            count: DEFAULT_COUNT,
            images: vec![DEFAULT_IMAGE.to_owned()],
            seed: rand::random(),
            concurrency: 1,
            settle: None,
            sample_policy: SamplePolicy::Strict,

            restart: None,
            stop: None,
            start: None,
            fetch_logs: None,
            delete: None,
        }
    }

    /// The phases following container creation, in execution order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// The seed of the random source.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
