//! Bounded worker pools.
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`](manager::WorkerPool): submission and
//!   graceful shutdown.
//! - [`worker`] - the per-worker receive loop and the [`JobHandler`](worker::JobHandler)
//!   trait jobs are executed through.

pub mod manager;
pub mod worker;
