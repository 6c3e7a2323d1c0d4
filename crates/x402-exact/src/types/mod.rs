//! Core types used across the crate.

mod amount;
mod common;
mod header;

pub use amount::*;
pub use common::*;
pub use header::*;
