// Thin re-export module: block sealing, chain management and integrity rules
// live in their own submodules.

pub mod block;
pub mod chain;
pub mod validation;

pub use block::*;
pub use chain::*;
pub use validation::*;
