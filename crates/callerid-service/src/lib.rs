#![doc = include_str!("../README.md")]

pub mod config;
pub mod lookup;
pub mod pool;
pub mod service;
pub mod telemetry;


pub use callerid_core;
pub use config::ServiceConfig;
pub use lookup::request::LookupOutcome;
pub use service::{
    dispatcher::{DispatchLoop, ResultDispatcher},
    handler::{Capabilities, PhoneNumberService},
};
