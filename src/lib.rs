//! General Basic → URCL compiler, as a library.  See `src/bin` for the
//! executable that drives it.

pub mod back;
pub mod common;
pub mod driver;
pub mod front;
pub mod middle;
