//! R-loop grammar engine.
//!
//! This crate learns a probabilistic grammar over symbol-encoded DNA windows
//! and uses it to rank candidate R-loop intervals:
//! - Grammar training on encoded words (three-state linear automaton)
//! - Scoring and normalization of candidate words
//! - Merging of symbol dictionaries built from different data sets
//! - Internal utilities for I/O and path handling

/// Grammar alphabet, trainer, scorer and dictionary merger.
pub mod model;

/// Explicit per-run configuration (plasmid, width, padding, run, seed).
pub mod config;

/// Error taxonomy shared by every operation.
pub mod error;

/// I/O utilities (file loading, atomic writes, path helpers).
///
/// Not exposed
pub(crate) mod io;

pub use config::RunConfig;
pub use error::{GrammarError, Result};
