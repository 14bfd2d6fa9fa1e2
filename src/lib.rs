//! End-to-end conformance checks for a cluster's metrics pipeline.
//!
//! The [`retry`] module holds the bounded retry engine every check polls with; the rest
//! of the crate drives the cluster ([`cluster`], [`workload`]) and asserts on the
//! telemetry it reports ([`metrics`], [`checks`]).

pub mod checks;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod workload;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::ProbeError;
