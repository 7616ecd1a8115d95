//! Heuristics module.
//!
//! Construction and improvement heuristics used for warm starts and for
//! checking exact tours.

pub mod construction;
pub mod local_search;

pub use construction::*;
pub use local_search::*;
