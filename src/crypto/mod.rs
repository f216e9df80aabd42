//! The crypto module wraps the hashing and signing primitives the chain is
//! built from.
//!
//! The idea here is that specific algorithms are wrapped in descriptive
//! interfaces ([Hash], [SignKeypair]) that allow high-level use without
//! needing to know the details of the algorithms underneath. This allows
//! expansion of the primitives used without building new interfaces around
//! them.

mod hash;
mod sign;

pub use hash::*;
pub use sign::*;
