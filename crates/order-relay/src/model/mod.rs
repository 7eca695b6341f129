//! # Domain Model
//!
//! Work items carried over the broker, and the acknowledgments returned to
//! producers.

pub mod lookup;
pub mod order;

pub use lookup::*;
pub use order::*;
