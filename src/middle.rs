//! The middle layer: the abstract contract the front-end IR lowers
//! against. Unlike a conventional "middle IR" this isn't a data
//! structure — the sequence of trait calls a callable's `emit` makes
//! against an [`emitter::Emitter`] *is* the IR, only materialized into
//! data once it reaches a concrete back end.

pub mod emitter;

pub use emitter::{Emitter, Label};
