//! SteadyRec Common Library
//!
//! Shared types exchanged between the recorder core and its front ends,
//! plus platform log directory resolution.

pub mod logging;
pub mod types;

pub use types::*;
