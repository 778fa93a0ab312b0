use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use super::word::{Segment, Segments};

/// Pseudo-count added to every transition before normalization.
pub const SMOOTHING: u64 = 1;

/// Transition counts of one automaton segment.
///
/// Counts are indexed by the class index of the segment's symbol family:
/// - `interior[c]`: transitions from class `c` back into the same segment
/// - `boundary[c]`: transitions from class `c` out of the segment
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentCounts {
	interior: [u64; 4],
	boundary: [u64; 4],
}

impl SegmentCounts {
	pub(crate) fn from_arrays(interior: [u64; 4], boundary: [u64; 4]) -> Self {
		Self { interior, boundary }
	}

	pub fn interior(&self, symbol: Symbol) -> u64 {
		self.interior[symbol.class_index()]
	}

	pub fn boundary(&self, symbol: Symbol) -> u64 {
		self.boundary[symbol.class_index()]
	}

	/// Sum of every interior and boundary count, the segment's shared
	/// normalization denominator.
	pub fn total(&self) -> u64 {
		self.interior.iter().chain(self.boundary.iter()).sum()
	}

	fn record(&mut self, segments: &Segments, segment: Segment) {
		for symbol in segments.interior(segment) {
			self.interior[symbol.class_index()] += 1;
		}
		self.boundary[segments.boundary(segment).class_index()] += 1;
	}

	fn merge(&mut self, other: &Self) {
		for class in 0..4 {
			self.interior[class] += other.interior[class];
			self.boundary[class] += other.boundary[class];
		}
	}

	fn smoothed(&self, smoothing: u64) -> Self {
		Self {
			interior: self.interior.map(|count| count + smoothing),
			boundary: self.boundary.map(|count| count + smoothing),
		}
	}
}

/// Transition counts accumulated over a training corpus.
///
/// Counts start at zero so that partial counts built in parallel can be
/// merged by plain addition. Smoothing is applied once, on the merged result.
///
/// # Invariants
/// - every observed word contributes exactly one boundary count per segment
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GrammarCounts {
	segments: [SegmentCounts; 3],
	words: u64,
}

impl GrammarCounts {
	pub fn new() -> Self {
		Self::default()
	}

	pub(crate) fn from_parts(segments: [SegmentCounts; 3], words: u64) -> Self {
		Self { segments, words }
	}

	/// Records the transitions of one validated word.
	pub fn observe(&mut self, segments: &Segments) {
		for segment in Segment::ALL {
			self.segments[segment.index()].record(segments, segment);
		}
		self.words += 1;
	}

	/// Adds the counts of `other` into this one.
	///
	/// Intended for combining partial counts built on separate chunks of a
	/// corpus; the result does not depend on the merge order.
	pub fn merge(&mut self, other: &Self) {
		for segment in Segment::ALL {
			self.segments[segment.index()].merge(&other.segments[segment.index()]);
		}
		self.words += other.words;
	}

	/// Returns a copy with `smoothing` added to every transition count.
	pub fn smoothed(&self, smoothing: u64) -> Self {
		Self {
			segments: self.segments.map(|counts| counts.smoothed(smoothing)),
			words: self.words,
		}
	}

	pub fn segment(&self, segment: Segment) -> &SegmentCounts {
		&self.segments[segment.index()]
	}

	/// Number of words observed.
	pub fn words(&self) -> u64 {
		self.words
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::word::EncodedWord;

	fn observe(counts: &mut GrammarCounts, text: &str) {
		let segments = EncodedWord::parse(text).unwrap().segments(4).unwrap();
		counts.observe(&segments);
	}

	#[test]
	fn test_observe_counts_interior_and_boundary() {
		let mut counts = GrammarCounts::new();
		observe(&mut counts, "σσγα1τρρω2δσ");

		let s = counts.segment(Segment::S);
		assert_eq!(s.interior(Symbol::Sigma), 2);
		assert_eq!(s.boundary(Symbol::Gamma), 1);
		assert_eq!(s.total(), 3);

		let r = counts.segment(Segment::R);
		assert_eq!(r.interior(Symbol::Tau), 1);
		assert_eq!(r.interior(Symbol::Rho), 1);
		assert_eq!(r.boundary(Symbol::Rho), 1);

		let q = counts.segment(Segment::Q);
		assert_eq!(q.interior(Symbol::Delta), 1);
		assert_eq!(q.boundary(Symbol::Sigma), 1);
		assert_eq!(counts.words(), 1);
	}

	#[test]
	fn test_merge_equals_sequential_observation() {
		let words = ["σα0τω0σ", "γδα1ρβω3σ^", "σ^α2τ^τω1γγ"];

		let mut sequential = GrammarCounts::new();
		for word in words {
			observe(&mut sequential, word);
		}

		let mut left = GrammarCounts::new();
		observe(&mut left, words[0]);
		let mut right = GrammarCounts::new();
		observe(&mut right, words[1]);
		observe(&mut right, words[2]);
		left.merge(&right);

		assert_eq!(left, sequential);
	}

	#[test]
	fn test_smoothing_floors_every_class() {
		let counts = GrammarCounts::new().smoothed(SMOOTHING);
		for segment in Segment::ALL {
			for symbol in segment.family().symbols() {
				assert_eq!(counts.segment(segment).interior(symbol), 1);
				assert_eq!(counts.segment(segment).boundary(symbol), 1);
			}
			assert_eq!(counts.segment(segment).total(), 8);
		}
	}
}
