//! Offline caching layer for the folio art-portfolio site.
//!
//! [`worker`] holds the caching engine: namespaces, request classification,
//! the per-class strategies and the versioned worker lifecycle. [`infra`]
//! puts it behind an HTTP caching proxy backed by `reqwest`.

pub mod application;
pub mod config;
pub mod infra;
pub mod worker;
