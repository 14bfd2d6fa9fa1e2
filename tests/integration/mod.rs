//! End-to-end tests of the probe against a mocked cluster.
//!
//! - **session**: HTTP transport, headers and status handling
//! - **checks**: running registered checks over real HTTP
//! - **config**: configuration files and the command line entry point

pub mod checks;
pub mod config;
pub mod session;
