//! This is a stresstest library which runs randomized workloads against a container
//! orchestration API.
//!
//! A [`Workload`] always starts by creating a batch of containers from a set of candidate images.
//! It can then be followed by phases that restart, stop, start or fetch logs of uniformly sampled
//! subsets of the batch, and finally by deleting the batch.
//!
//! Every operation is reported with its status code or transport failure as soon as it finishes.
//! Failed operations never stop a run; see [`run`] for details.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod batch;
pub mod http;
pub mod report;
pub mod sampler;
pub mod stresstest;
pub mod workload;

pub use crate::stresstest::{RunSummary, run};
pub use crate::workload::Workload;
