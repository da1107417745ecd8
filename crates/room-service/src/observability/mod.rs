//! Observability for the room service.
//!
//! Provides metrics definitions recorded through the `metrics` facade and
//! exported by the Prometheus recorder installed in `main`.

pub mod metrics;
