// Thin re-export module: block types and structural validation are in
// `blockchain/core`.

pub mod core;
pub use core::*;
