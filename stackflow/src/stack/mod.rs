//! Stack containers used for sequencing and bookkeeping.
//!
//! This module provides:
//! - [`Stack`], an ordered LIFO container with containment, ordered deletion
//!   and merge operations
//! - [`ExclusiveStack`], a stack that holds each element at most once and
//!   moves re-pushed elements to the top

mod exclusive;
mod lifo;

pub use exclusive::ExclusiveStack;
pub use lifo::Stack;
