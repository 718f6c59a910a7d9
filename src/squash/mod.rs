//! Squashing: collapsing a run of layer tars into one (C4).
//!
//! [`engine`] holds the four-pass merge itself; this module just
//! re-exports its public surface and the shared member representation.

pub mod engine;

pub use engine::{squash_layers, SquashOutput};
