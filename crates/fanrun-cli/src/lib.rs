//! fanrun CLI library
//!
//! Input loading and result rendering for the `fanrun` binary.

pub mod input;
pub mod output;
