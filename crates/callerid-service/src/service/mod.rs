//! Service entry point and result delivery.
//!
//! ## Structure
//!
//! - [`handler`] - [`PhoneNumberService`](handler::PhoneNumberService) and the
//!   [`Capabilities`](handler::Capabilities) it is built from.
//! - [`dispatcher`] - single-consumer delivery of results to listeners.

pub mod dispatcher;
pub mod handler;
