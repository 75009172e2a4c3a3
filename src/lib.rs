//! vellum — a versioned snapshot store for collaborative architecture graphs.
//!
//! Projects evolve as an append-only ledger of full snapshots. Candidate
//! graphs (hand-drawn or machine-generated) go through structured conflict
//! detection before merging; disagreements on typed facts block the merge and
//! come back as data, while everything additive or insignificant merges
//! last-write-wins. Modules add a review workflow on top, and every mutation
//! leaves an audit entry.
//!
//! The primary interface is the `vellum` binary; the library surface exists
//! for embedding and for integration tests.

pub mod audit;
pub mod config;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod resolve;
pub mod store;
pub mod telemetry;
pub mod workflow;

pub use error::VellumError;
