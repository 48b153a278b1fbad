use std::time::Duration;

use argh::FromArgs;
use pico_stresstest::workload::{
    DEFAULT_COUNT, DEFAULT_IMAGE, SamplePolicy, Selection, Workload, WorkloadError,
};

/// Stresstester for the container orchestration API
#[derive(Debug, FromArgs)]
pub struct Args {
    /// address of the API in HOST:PORT form
    #[argh(positional)]
    pub address: String,

    /// number of containers to create
    #[argh(option, short = 'n', default = "DEFAULT_COUNT")]
    pub count: usize,

    /// candidate image to create containers from, can be repeated
    #[argh(option, short = 'i')]
    pub image: Vec<String>,

    /// restart a random sample of this many containers
    #[argh(option)]
    pub restart: Option<usize>,

    /// stop a random sample of this many containers
    #[argh(option)]
    pub stop: Option<usize>,

    /// start a random sample of this many containers
    #[argh(option)]
    pub start: Option<usize>,

    /// fetch logs of a random sample of this many containers
    #[argh(option)]
    pub logs: Option<usize>,

    /// delete all containers at the end of the run
    #[argh(switch)]
    pub delete: bool,

    /// delete a random sample of this many containers at the end of the run
    #[argh(option)]
    pub delete_sample: Option<usize>,

    /// pause between creating containers and acting on them, such as `10s`
    #[argh(option, from_str_fn(parse_duration))]
    pub settle: Option<Duration>,

    /// maximum number of requests in flight within a phase
    #[argh(option, default = "1")]
    pub concurrency: usize,

    /// timeout for each request, such as `5s`
    #[argh(option, from_str_fn(parse_duration))]
    pub timeout: Option<Duration>,

    /// seed for the random source
    #[argh(option)]
    pub seed: Option<u64>,

    /// shrink sample sizes to the batch instead of aborting the phase
    #[argh(switch)]
    pub clamp: bool,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

/// Errors in the combination of command line arguments.
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("--delete and --delete-sample are mutually exclusive")]
    ConflictingDelete,
    #[error(transparent)]
    Workload(#[from] WorkloadError),
}

impl Args {
    /// Builds the workload described by the arguments.
    pub fn workload(&self) -> Result<Workload, ArgsError> {
        let images = if self.image.is_empty() {
            vec![DEFAULT_IMAGE.to_owned()]
        } else {
            self.image.clone()
        };

        let policy = if self.clamp {
            SamplePolicy::Clamp
        } else {
            SamplePolicy::Strict
        };

        let mut builder = Workload::builder()
            .count(self.count)
            .images(images)
            .concurrency(self.concurrency)
            .settle(self.settle)
            .sample_policy(policy);

        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        if let Some(k) = self.restart {
            builder = builder.restart(k);
        }
        if let Some(k) = self.stop {
            builder = builder.stop(k);
        }
        if let Some(k) = self.start {
            builder = builder.start(k);
        }
        if let Some(k) = self.logs {
            builder = builder.fetch_logs(k);
        }

        builder = match (self.delete, self.delete_sample) {
            (true, Some(_)) => return Err(ArgsError::ConflictingDelete),
            (true, None) => builder.delete(Selection::All),
            (false, Some(k)) => builder.delete(Selection::Sample(k)),
            (false, None) => builder,
        };

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use pico_stresstest::workload::Action;

    use super::*;

    fn parse(args: &[&str]) -> Result<Args, argh::EarlyExit> {
        Args::from_args(&["pico-stresstest"], args)
    }

    #[test]
    fn address_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn defaults() {
        let args = parse(&["127.0.0.1:8080"]).unwrap();
        assert_eq!(args.address, "127.0.0.1:8080");
        assert_eq!(args.count, DEFAULT_COUNT);
        assert_eq!(args.concurrency, 1);
        assert_eq!(args.timeout, None);

        let workload = args.workload().unwrap();
        assert!(workload.phases().is_empty());
    }

    #[test]
    fn configures_phases() {
        let args = parse(&[
            "localhost:9000",
            "-n",
            "10",
            "-i",
            "nginx:alpine",
            "-i",
            "redis:7",
            "--restart",
            "4",
            "--logs",
            "2",
            "--delete",
            "--settle",
            "10s",
            "--timeout",
            "500ms",
            "--seed",
            "17",
        ])
        .unwrap();

        assert_eq!(args.image, ["nginx:alpine", "redis:7"]);
        assert_eq!(args.settle, Some(Duration::from_secs(10)));
        assert_eq!(args.timeout, Some(Duration::from_millis(500)));

        let workload = args.workload().unwrap();
        assert_eq!(workload.seed(), 17);

        let phases: Vec<_> = workload
            .phases()
            .iter()
            .map(|p| (p.action, p.selection))
            .collect();
        assert_eq!(
            phases,
            [
                (Action::Restart, Selection::Sample(4)),
                (Action::FetchLogs, Selection::Sample(2)),
                (Action::Delete, Selection::All),
            ]
        );
    }

    #[test]
    fn rejects_conflicting_delete() {
        let args = parse(&["localhost:9000", "--delete", "--delete-sample", "3"]).unwrap();
        assert!(matches!(args.workload(), Err(ArgsError::ConflictingDelete)));
    }

    #[test]
    fn rejects_bad_duration() {
        assert!(parse(&["localhost:9000", "--timeout", "soon"]).is_err());
    }
}
