//! Top-level module for the R-loop grammar engine.
//!
//! This module provides:
//! - The grammar alphabet (`Symbol`, `Token`) and encoded words (`EncodedWord`)
//! - The grammar trainer (`GrammarTrainer`) and its output (`ProbabilityTable`)
//! - The language scorer (`LanguageScorer`)
//! - Symbol dictionaries and their merger (`SymbolDictionary`, `DictionaryMerger`)

/// The 8 symbol classes, their two families and the indexed markers.
pub mod symbol;

/// Encoded words, their segments and the `label: word` file reader.
pub mod word;

/// Smoothed transition counters.
pub mod counts;

/// Production-rule probability table and its JSON document.
pub mod table;

/// Grammar training.
///
/// Counts transitions over a corpus in parallel and normalizes them into a
/// `ProbabilityTable`, optionally cached as a binary snapshot.
pub mod trainer;

/// Candidate scoring and normalization over a candidate set.
pub mod scorer;

/// Region buckets, symbol dictionaries and evidence weight tables.
pub mod dictionary;

/// Dictionary merging with deterministic or stochastic tie resolution.
pub mod merger;

pub use dictionary::{RegionBucket, SymbolDictionary, WeightTable};
pub use merger::{ConflictPolicy, DictionaryMerger, MergeOutcome, MergeReport};
pub use scorer::{LanguageScorer, ScoreReport};
pub use symbol::{Family, Symbol, Token};
pub use table::ProbabilityTable;
pub use trainer::GrammarTrainer;
pub use word::{EncodedWord, Segment};
