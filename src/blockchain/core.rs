// Block types and stateless block validation live in separate submodules.
pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
