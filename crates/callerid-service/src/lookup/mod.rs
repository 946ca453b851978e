//! Number and photo lookup jobs.
//!
//! ## Structure
//!
//! - [`request`] - jobs queued on the pools and the [`LookupOutcome`](request::LookupOutcome)
//!   of a number lookup.
//! - [`coordinator`] - the number lookup pipeline run by the lookup pool.
//! - [`inflight`] - coalescing of concurrent remote lookups.
//! - [`image`] - photo retrieval run by the image pool.

pub mod coordinator;
pub mod image;
pub mod inflight;
pub mod request;
