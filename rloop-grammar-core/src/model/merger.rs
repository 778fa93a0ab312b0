use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};
use super::dictionary::{RegionBucket, SymbolDictionary, SymbolMap, WeightTable};
use super::symbol::Symbol;

/// How a tie between symbols claiming the same k-mer is broken.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
	/// Fixed precedence table over pairs of symbol classes.
	#[default]
	Deterministic,
	/// Uniform draw among the tied symbols.
	Stochastic,
}

impl FromStr for ConflictPolicy {
	type Err = GrammarError;

	fn from_str(name: &str) -> Result<Self> {
		match name.to_ascii_lowercase().as_str() {
			"deterministic" => Ok(ConflictPolicy::Deterministic),
			"stochastic" => Ok(ConflictPolicy::Stochastic),
			_ => Err(GrammarError::InvalidPolicy(name.to_owned())),
		}
	}
}

impl fmt::Display for ConflictPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictPolicy::Deterministic => f.write_str("deterministic"),
			ConflictPolicy::Stochastic => f.write_str("stochastic"),
		}
	}
}

/// Precedence table for two tied symbol classes of the same family.
///
/// The Ψ rules mirror the Φ rules class by class. Returns `None` for pairs
/// outside the table (identical or cross-family symbols).
pub fn resolve_pair(first: Symbol, second: Symbol) -> Option<Symbol> {
	use Symbol::*;

	let pair = if first <= second { (first, second) } else { (second, first) };
	match pair {
		(Sigma, SigmaHat) => Some(Delta),
		(Sigma, Delta) => Some(Sigma),
		(SigmaHat, Delta) => Some(SigmaHat),
		(Sigma, Gamma) => Some(Sigma),
		(SigmaHat, Gamma) => Some(SigmaHat),
		(Gamma, Delta) => Some(Delta),

		(Tau, TauHat) => Some(Beta),
		(Tau, Beta) => Some(Tau),
		(TauHat, Beta) => Some(TauHat),
		(Tau, Rho) => Some(Tau),
		(TauHat, Rho) => Some(TauHat),
		(Rho, Beta) => Some(Beta),

		_ => None,
	}
}

/// Tie resolutions decided during one merge, keyed by `(bucket, k-mer)`.
///
/// A k-mer is resolved once per bucket: later encounters of the same tie,
/// while scanning the other tied symbols, find the entry and do not draw
/// again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelocationLedger {
	entries: BTreeMap<(RegionBucket, String), Symbol>,
}

impl RelocationLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, bucket: RegionBucket, kmer: &str) -> Option<Symbol> {
		self.entries.get(&(bucket, kmer.to_owned())).copied()
	}

	/// Records the resolution of `kmer`. Returns `false`, leaving the ledger
	/// unchanged, if it was already resolved in `bucket`.
	pub fn record(&mut self, bucket: RegionBucket, kmer: &str, symbol: Symbol) -> bool {
		match self.entries.entry((bucket, kmer.to_owned())) {
			Entry::Occupied(_) => false,
			Entry::Vacant(entry) => {
				entry.insert(symbol);
				true
			}
		}
	}

	/// Resolutions of `bucket`, in k-mer order.
	pub fn relocations(&self, bucket: RegionBucket) -> impl Iterator<Item = (&str, Symbol)> + '_ {
		self.entries
			.iter()
			.filter(move |((entry_bucket, _), _)| *entry_bucket == bucket)
			.map(|((_, kmer), symbol)| (kmer.as_str(), *symbol))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// What a merge decided, for logging and auditing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
	/// Number of times each resolution was applied, keyed `{A, B} -> C`.
	pub rules: BTreeMap<String, usize>,
	/// Ties resolved by the conflict policy.
	pub relocations: usize,
	/// Claims dropped because the other dictionary had more evidence.
	pub dominance_drops: usize,
}

impl MergeReport {
	fn absorb(&mut self, other: MergeReport) {
		for (rule, count) in other.rules {
			*self.rules.entry(rule).or_default() += count;
		}
		self.relocations += other.relocations;
		self.dominance_drops += other.dominance_drops;
	}
}

/// A merged dictionary with its weights and report.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeOutcome {
	pub dictionary: SymbolDictionary,
	pub weights: WeightTable,
	pub report: MergeReport,
}

/// Combines symbol dictionaries built from different data sets.
///
/// # Responsibilities
/// - Take the union of the k-mers both dictionaries assign to each symbol
/// - Give contested k-mers to the dictionary with more evidence
/// - Break evidence ties with the [`ConflictPolicy`]
/// - Keep the larger of the two evidence weights of each surviving k-mer
///
/// # Invariants
/// - in the merged dictionary a k-mer appears under at most one symbol per
///   bucket
/// - given the same seed, the stochastic policy reproduces the same merge
pub struct DictionaryMerger {
	policy: ConflictPolicy,
	rng: StdRng,
}

impl DictionaryMerger {
	/// Creates a merger whose stochastic draws are seeded with `seed`.
	pub fn new(policy: ConflictPolicy, seed: u64) -> Self {
		Self { policy, rng: StdRng::seed_from_u64(seed) }
	}

	pub fn policy(&self) -> ConflictPolicy {
		self.policy
	}

	/// Merges `(first, first_weights)` with `(second, second_weights)`.
	///
	/// # Errors
	/// `AmbiguousConflict` under the deterministic policy when a tie involves
	/// anything other than two same-family symbols.
	pub fn merge(
		&mut self,
		first: &SymbolDictionary,
		first_weights: &WeightTable,
		second: &SymbolDictionary,
		second_weights: &WeightTable,
	) -> Result<MergeOutcome> {
		let mut ledger = RelocationLedger::new();
		let mut report = MergeReport::default();
		let mut dictionary = SymbolDictionary::new();
		let mut weights = WeightTable::new();

		for bucket in RegionBucket::ALL {
			let merged = self.merge_bucket(
				bucket,
				(first.bucket(bucket), first_weights),
				(second.bucket(bucket), second_weights),
				&mut ledger,
				&mut report,
			)?;

			for kmers in merged.values() {
				for kmer in kmers {
					let weight = match (
						first_weights.bucket_weight(bucket, kmer),
						second_weights.bucket_weight(bucket, kmer),
					) {
						(Some(a), Some(b)) => a.max(b),
						(Some(weight), None) | (None, Some(weight)) => weight,
						(None, None) => 0.0,
					};
					weights.set_bucket_weight(bucket, kmer, weight);
				}
			}
			*dictionary.bucket_mut(bucket) = merged;
		}

		info!(
			"Merged dictionaries ({} policy): {} assignments, {} relocations, {} dominance drops",
			self.policy,
			dictionary.len(),
			report.relocations,
			report.dominance_drops
		);

		Ok(MergeOutcome { dictionary, weights, report })
	}

	/// Folds `inputs` left to right, merging the running result with each
	/// next pair. One random generator is used for the whole fold.
	pub fn merge_all(&mut self, inputs: &[(SymbolDictionary, WeightTable)]) -> Result<MergeOutcome> {
		let Some(((dictionary, weights), rest)) = inputs.split_first() else {
			return Ok(MergeOutcome {
				dictionary: SymbolDictionary::new(),
				weights: WeightTable::new(),
				report: MergeReport::default(),
			});
		};

		let mut outcome = MergeOutcome {
			dictionary: dictionary.clone(),
			weights: weights.clone(),
			report: MergeReport::default(),
		};
		for (next_dictionary, next_weights) in rest {
			let step = self.merge(&outcome.dictionary, &outcome.weights, next_dictionary, next_weights)?;
			outcome.dictionary = step.dictionary;
			outcome.weights = step.weights;
			outcome.report.absorb(step.report);
		}

		Ok(outcome)
	}

	fn merge_bucket(
		&mut self,
		bucket: RegionBucket,
		(first, first_weights): (&SymbolMap, &WeightTable),
		(second, second_weights): (&SymbolMap, &WeightTable),
		ledger: &mut RelocationLedger,
		report: &mut MergeReport,
	) -> Result<SymbolMap> {
		let symbols: BTreeSet<Symbol> = first.keys().chain(second.keys()).copied().collect();
		let mut merged = SymbolMap::new();

		for symbol in symbols {
			let mut union: BTreeSet<String> = first
				.get(&symbol)
				.into_iter()
				.chain(second.get(&symbol))
				.flatten()
				.cloned()
				.collect();

			let kmers: Vec<String> = union.iter().cloned().collect();
			for kmer in kmers {
				let first_weight = first_weights.bucket_weight(bucket, &kmer).unwrap_or(0.0);
				let second_weight = second_weights.bucket_weight(bucket, &kmer).unwrap_or(0.0);

				let mut candidates = BTreeSet::from([symbol]);
				let mut outweighed = false;
				for (other, claimed) in first {
					if *other == symbol || !claimed.contains(&kmer) {
						continue;
					}
					if first_weight > second_weight {
						outweighed = true;
					} else if first_weight == second_weight {
						candidates.insert(*other);
					}
				}
				for (other, claimed) in second {
					if *other == symbol || !claimed.contains(&kmer) {
						continue;
					}
					if first_weight < second_weight {
						outweighed = true;
					} else if first_weight == second_weight {
						candidates.insert(*other);
					}
				}

				if outweighed {
					union.remove(&kmer);
					report.dominance_drops += 1;
					continue;
				}
				if candidates.len() > 1 {
					union.remove(&kmer);
					if ledger.get(bucket, &kmer).is_none() {
						let chosen = self.resolve(&kmer, &candidates, report)?;
						ledger.record(bucket, &kmer, chosen);
						report.relocations += 1;
						debug!("{}: '{}' tied between {} -> {}", bucket, kmer, symbol_set(&candidates), chosen);
					}
				}
			}

			merged.insert(symbol, union);
		}

		for (kmer, symbol) in ledger.relocations(bucket) {
			merged.entry(symbol).or_default().insert(kmer.to_owned());
		}

		// An input listing a k-mer under several symbols leaves it claimed twice
		// when the other input outweighs it without listing it.
		let mut owners: BTreeMap<String, BTreeSet<Symbol>> = BTreeMap::new();
		for (symbol, kmers) in &merged {
			for kmer in kmers {
				owners.entry(kmer.clone()).or_default().insert(*symbol);
			}
		}
		for (kmer, candidates) in owners.into_iter().filter(|(_, symbols)| symbols.len() > 1) {
			let chosen = match ledger.get(bucket, &kmer) {
				Some(symbol) => symbol,
				None => {
					let chosen = self.resolve(&kmer, &candidates, report)?;
					ledger.record(bucket, &kmer, chosen);
					report.relocations += 1;
					debug!("{}: '{}' claimed by {} -> {}", bucket, kmer, symbol_set(&candidates), chosen);
					chosen
				}
			};
			for symbol in &candidates {
				if let Some(kmers) = merged.get_mut(symbol) {
					kmers.remove(&kmer);
				}
			}
			merged.entry(chosen).or_default().insert(kmer);
		}
		merged.retain(|_, kmers| !kmers.is_empty());

		Ok(merged)
	}

	fn resolve(&mut self, kmer: &str, candidates: &BTreeSet<Symbol>, report: &mut MergeReport) -> Result<Symbol> {
		let chosen = match self.policy {
			ConflictPolicy::Deterministic => {
				let ambiguous = || GrammarError::AmbiguousConflict {
					kmer: kmer.to_owned(),
					symbols: symbol_set(candidates),
				};
				let pair: Vec<Symbol> = candidates.iter().copied().collect();
				match pair.as_slice() {
					[first, second] => resolve_pair(*first, *second).ok_or_else(ambiguous)?,
					_ => return Err(ambiguous()),
				}
			}
			ConflictPolicy::Stochastic => {
				let choices: Vec<Symbol> = candidates.iter().copied().collect();
				choices[self.rng.random_range(0..choices.len())]
			}
		};

		*report.rules.entry(format!("{} -> {}", symbol_set(candidates), chosen)).or_default() += 1;
		Ok(chosen)
	}
}

/// Merges two dictionaries with a fresh merger.
pub fn merge(
	first: &SymbolDictionary,
	first_weights: &WeightTable,
	second: &SymbolDictionary,
	second_weights: &WeightTable,
	policy: ConflictPolicy,
	seed: u64,
) -> Result<(SymbolDictionary, WeightTable)> {
	let outcome = DictionaryMerger::new(policy, seed).merge(first, first_weights, second, second_weights)?;
	Ok((outcome.dictionary, outcome.weights))
}

fn symbol_set(symbols: &BTreeSet<Symbol>) -> String {
	let names: Vec<String> = symbols.iter().map(Symbol::to_string).collect();
	format!("{{{}}}", names.join(", "))
}
