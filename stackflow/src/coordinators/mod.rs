//! Coordinators built on the pipeline engine.
//!
//! - [`router`]: route navigation over a nested worker chain
//! - [`panels`]: overlay panels stacked per context

pub mod panels;
pub mod router;
