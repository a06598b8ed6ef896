//! Process pipeline execution.
//!
//! A [`Pipeline`] is a list of stages joined by pipes, with an optional input
//! file for the first stage and output file for the last one. [`run`] wires
//! the descriptors, forks one process per stage and reaps all of them before
//! returning a [`Job`] describing how each stage ended.
//!
//! The `parser`, `builtin`, `history` and `global` modules make up the small
//! interactive shell shipped as the `pipewright` binary.

pub mod builtin;
pub mod error;
pub mod eval;
pub mod global;
pub mod history;
pub mod job;
pub mod parser;
pub mod redirect;
pub mod spawn;
pub mod stdio;
pub mod types;

pub use error::{Error, Result};
pub use eval::run;
pub use job::{Classification, Job};
pub use types::*;
