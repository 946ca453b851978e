#![doc = include_str!("../README.md")]

mod decode;
mod error;
mod listener;
mod memory;
mod model;
mod number;
mod ports;

pub use crate::decode::*;
pub use crate::error::*;
pub use crate::listener::*;
pub use crate::memory::*;
pub use crate::model::*;
pub use crate::number::*;
pub use crate::ports::*;
