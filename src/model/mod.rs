//! vellum data model — pure domain types and functions, no I/O.

pub mod conflict;
pub mod diff;
pub mod graph;
pub mod merge;
pub mod module;
pub mod snapshot;
pub mod types;
