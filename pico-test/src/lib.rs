//! Test utilities for the container stresstest.
//!
//! This crate provides utilities to facilitate integration testing of the stresstest against a
//! fake container API. See the modules for all available utilities.

pub mod server;
pub mod tracing;
