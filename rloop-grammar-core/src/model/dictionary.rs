use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::{read_json, write_json};
use super::symbol::Symbol;

/// Weight value marking a k-mer absent from the background sequence.
pub const ABSENT_WEIGHT: f64 = -1.0;

/// Positional context a k-mer assignment is scoped to.
///
/// Regions 2 and 3 share one bucket; their weights stay separate in the
/// [`WeightTable`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionBucket {
	#[serde(rename = "region1")]
	Region1,
	#[serde(rename = "region2_3")]
	Region2_3,
	#[serde(rename = "region4")]
	Region4,
}

impl RegionBucket {
	pub const ALL: [RegionBucket; 3] = [RegionBucket::Region1, RegionBucket::Region2_3, RegionBucket::Region4];

	pub fn name(self) -> &'static str {
		match self {
			RegionBucket::Region1 => "region1",
			RegionBucket::Region2_3 => "region2_3",
			RegionBucket::Region4 => "region4",
		}
	}
}

impl fmt::Display for RegionBucket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// K-mers grouped by grammar symbol, per region bucket.
pub type SymbolMap = BTreeMap<Symbol, BTreeSet<String>>;

/// Assignment of k-mers to grammar symbols, per region bucket.
///
/// Serialized as `{"region1": {"SIGMA": ["AAAA", ...], ...}, "region2_3": ...,
/// "region4": ...}`. Missing buckets read as empty.
///
/// # Invariants
/// - after a merge, a k-mer appears under at most one symbol per bucket
///   (see [`SymbolDictionary::duplicate_assignments`])
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SymbolDictionary {
	#[serde(default)]
	region1: SymbolMap,
	#[serde(default)]
	region2_3: SymbolMap,
	#[serde(default)]
	region4: SymbolMap,
}

/// A k-mer listed under several symbols of the same bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateAssignment {
	pub bucket: RegionBucket,
	pub kmer: String,
	pub symbols: Vec<Symbol>,
}

impl SymbolDictionary {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn bucket(&self, bucket: RegionBucket) -> &SymbolMap {
		match bucket {
			RegionBucket::Region1 => &self.region1,
			RegionBucket::Region2_3 => &self.region2_3,
			RegionBucket::Region4 => &self.region4,
		}
	}

	pub(crate) fn bucket_mut(&mut self, bucket: RegionBucket) -> &mut SymbolMap {
		match bucket {
			RegionBucket::Region1 => &mut self.region1,
			RegionBucket::Region2_3 => &mut self.region2_3,
			RegionBucket::Region4 => &mut self.region4,
		}
	}

	/// Lists `kmer` under `symbol` in `bucket`.
	pub fn insert(&mut self, bucket: RegionBucket, symbol: Symbol, kmer: &str) {
		self.bucket_mut(bucket).entry(symbol).or_default().insert(kmer.to_owned());
	}

	/// K-mers listed under `symbol` in `bucket`.
	pub fn kmers(&self, bucket: RegionBucket, symbol: Symbol) -> Option<&BTreeSet<String>> {
		self.bucket(bucket).get(&symbol)
	}

	/// Symbols listing `kmer` in `bucket`, in symbol order.
	pub fn symbols_of(&self, bucket: RegionBucket, kmer: &str) -> Vec<Symbol> {
		self.bucket(bucket)
			.iter()
			.filter(|(_, kmers)| kmers.contains(kmer))
			.map(|(symbol, _)| *symbol)
			.collect()
	}

	/// Number of (symbol, k-mer) assignments across all buckets.
	pub fn len(&self) -> usize {
		RegionBucket::ALL
			.iter()
			.map(|bucket| self.bucket(*bucket).values().map(BTreeSet::len).sum::<usize>())
			.sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// K-mers assigned to the same symbol, in the same bucket, by both
	/// dictionaries. Symbols sharing no k-mer are left out.
	pub fn intersect_symbols(&self, other: &Self) -> Self {
		let mut intersection = Self::new();

		for bucket in RegionBucket::ALL {
			for (symbol, kmers) in self.bucket(bucket) {
				let Some(other_kmers) = other.kmers(bucket, *symbol) else {
					continue;
				};
				let shared: BTreeSet<String> = kmers.intersection(other_kmers).cloned().collect();
				if !shared.is_empty() {
					intersection.bucket_mut(bucket).insert(*symbol, shared);
				}
			}
		}

		intersection
	}

	/// Every k-mer listed under more than one symbol of a bucket.
	pub fn duplicate_assignments(&self) -> Vec<DuplicateAssignment> {
		let mut duplicates = Vec::new();

		for bucket in RegionBucket::ALL {
			let mut owners: BTreeMap<&str, Vec<Symbol>> = BTreeMap::new();
			for (symbol, kmers) in self.bucket(bucket) {
				for kmer in kmers {
					owners.entry(kmer.as_str()).or_default().push(*symbol);
				}
			}

			duplicates.extend(
				owners
					.into_iter()
					.filter(|(_, symbols)| symbols.len() > 1)
					.map(|(kmer, symbols)| DuplicateAssignment { bucket, kmer: kmer.to_owned(), symbols }),
			);
		}

		duplicates
	}

	/// Reads a dictionary JSON document.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		read_json(path)
	}

	/// Writes the dictionary as a JSON document, atomically.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		write_json(path, self)
	}
}

/// Evidence weight of each k-mer, per region.
///
/// A weight is the relative enrichment of a k-mer in observed R-loops against
/// the background. Negative values (the [`ABSENT_WEIGHT`] sentinel) mean the
/// k-mer is absent from the background and never count as a weight.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WeightTable {
	#[serde(default)]
	pub r1: BTreeMap<String, f64>,
	#[serde(default)]
	pub r2: BTreeMap<String, f64>,
	#[serde(default)]
	pub r3: BTreeMap<String, f64>,
	#[serde(default)]
	pub r4: BTreeMap<String, f64>,
}

impl WeightTable {
	pub fn new() -> Self {
		Self::default()
	}

	fn regions(&self, bucket: RegionBucket) -> Vec<&BTreeMap<String, f64>> {
		match bucket {
			RegionBucket::Region1 => vec![&self.r1],
			RegionBucket::Region2_3 => vec![&self.r2, &self.r3],
			RegionBucket::Region4 => vec![&self.r4],
		}
	}

	fn regions_mut(&mut self, bucket: RegionBucket) -> Vec<&mut BTreeMap<String, f64>> {
		match bucket {
			RegionBucket::Region1 => vec![&mut self.r1],
			RegionBucket::Region2_3 => vec![&mut self.r2, &mut self.r3],
			RegionBucket::Region4 => vec![&mut self.r4],
		}
	}

	/// Effective weight of `kmer` in `bucket`.
	///
	/// `r1` for region 1, `max(r2, r3)` for regions 2-3 and `r4` for region 4.
	/// Absent entries and sentinels are skipped; `None` if nothing is left.
	pub fn bucket_weight(&self, bucket: RegionBucket, kmer: &str) -> Option<f64> {
		self.regions(bucket)
			.into_iter()
			.filter_map(|region| region.get(kmer).copied())
			.filter(|weight| *weight >= 0.0)
			.reduce(f64::max)
	}

	/// Writes `weight` into every region of `bucket` (both `r2` and `r3` for
	/// regions 2-3).
	pub fn set_bucket_weight(&mut self, bucket: RegionBucket, kmer: &str, weight: f64) {
		for region in self.regions_mut(bucket) {
			region.insert(kmer.to_owned(), weight);
		}
	}

	/// Reads a weight table JSON document (`{"r1": {...}, ..., "r4": {...}}`).
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		read_json(path)
	}

	/// Writes the table as a JSON document, atomically.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		write_json(path, self)
	}
}
