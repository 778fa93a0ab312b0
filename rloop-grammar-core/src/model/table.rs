use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};
use crate::io::{read_json, read_snapshot, write_json, write_snapshot};
use super::counts::{GrammarCounts, SegmentCounts};
use super::symbol::Symbol;
use super::word::Segment;

/// Kind of a transition out of a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
	/// The symbol is followed by another symbol of the same segment.
	Interior,
	/// The symbol is the last of its segment (crossing a marker or ending
	/// the word).
	Boundary,
}

/// Name of a transition in the counts section of a probability document.
///
/// `S_sigma_S`, `S_sigma_alpha_R`, `R_tau_R`, `R_tau_omega_Q`, `Q_sigma_Q`,
/// `Q_sigma_end`, ...
pub fn count_key(segment: Segment, kind: TransitionKind, symbol: Symbol) -> String {
	let state = segment.prefix();
	let name = symbol.transition_name();
	match (kind, segment) {
		(TransitionKind::Interior, _) => format!("{state}_{name}_{state}"),
		(TransitionKind::Boundary, Segment::S) => format!("S_{name}_alpha_R"),
		(TransitionKind::Boundary, Segment::R) => format!("R_{name}_omega_Q"),
		(TransitionKind::Boundary, Segment::Q) => format!("Q_{name}_end"),
	}
}

/// Name of a transition in the probabilities section of a probability
/// document.
///
/// Indexed boundaries (S and R) carry an extra `i` part inserted after the
/// third `_`-separated part of the count key, which yields `S_sigma_alpha_i_R`
/// but `S_sigma_hat_i_alpha_R`. Existing documents use this exact scheme.
pub fn probability_key(segment: Segment, kind: TransitionKind, symbol: Symbol) -> String {
	let key = count_key(segment, kind, symbol);
	if kind == TransitionKind::Interior || !segment.has_indexed_boundary() {
		return key;
	}

	let mut parts: Vec<&str> = key.split('_').collect();
	parts.insert(3, "i");
	parts.join("_")
}

/// Normalized probabilities of one segment, indexed by class index.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
struct SegmentProbabilities {
	interior: [f64; 4],
	/// Per marker sub-position for the S and R segments.
	boundary: [f64; 4],
}

/// Production-rule probabilities of the three-state grammar automaton.
///
/// Built once per training corpus and read-only afterwards.
///
/// # Invariants
/// - for every segment, the interior probabilities plus the boundary
///   probabilities (times `width` for S and R) sum to 1
/// - `counts` are the smoothed counts the probabilities were derived from
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProbabilityTable {
	width: usize,
	segments: [SegmentProbabilities; 3],
	counts: GrammarCounts,
}

/// JSON shape of a trained grammar: raw smoothed counts and normalized
/// probabilities per segment, keyed by transition name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProbabilityDocument {
	#[serde(rename = "S_probabilities_counts")]
	pub s_counts: BTreeMap<String, u64>,
	#[serde(rename = "R_probabilities_counts")]
	pub r_counts: BTreeMap<String, u64>,
	#[serde(rename = "Q_probabilities_counts")]
	pub q_counts: BTreeMap<String, u64>,
	#[serde(rename = "S_probabilities")]
	pub s_probabilities: BTreeMap<String, f64>,
	#[serde(rename = "R_probabilities")]
	pub r_probabilities: BTreeMap<String, f64>,
	#[serde(rename = "Q_probabilities")]
	pub q_probabilities: BTreeMap<String, f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width: Option<usize>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub words: Option<u64>,
}

impl ProbabilityDocument {
	fn counts(&self, segment: Segment) -> &BTreeMap<String, u64> {
		match segment {
			Segment::S => &self.s_counts,
			Segment::R => &self.r_counts,
			Segment::Q => &self.q_counts,
		}
	}

	fn counts_mut(&mut self, segment: Segment) -> &mut BTreeMap<String, u64> {
		match segment {
			Segment::S => &mut self.s_counts,
			Segment::R => &mut self.r_counts,
			Segment::Q => &mut self.q_counts,
		}
	}

	fn probabilities(&self, segment: Segment) -> &BTreeMap<String, f64> {
		match segment {
			Segment::S => &self.s_probabilities,
			Segment::R => &self.r_probabilities,
			Segment::Q => &self.q_probabilities,
		}
	}

	fn probabilities_mut(&mut self, segment: Segment) -> &mut BTreeMap<String, f64> {
		match segment {
			Segment::S => &mut self.s_probabilities,
			Segment::R => &mut self.r_probabilities,
			Segment::Q => &mut self.q_probabilities,
		}
	}
}

impl ProbabilityTable {
	/// Normalizes smoothed counts into a probability table.
	///
	/// Each segment is normalized jointly: interior and boundary counts share
	/// the segment total as denominator. S and R boundary probabilities are
	/// further divided by `width`, spreading the mass evenly over the marker
	/// sub-positions.
	pub(crate) fn from_counts(counts: GrammarCounts, width: usize) -> Result<Self> {
		if width == 0 {
			return Err(GrammarError::InvalidWidth(width));
		}

		let mut segments = [SegmentProbabilities { interior: [0.0; 4], boundary: [0.0; 4] }; 3];
		for segment in Segment::ALL {
			let segment_counts = counts.segment(segment);
			let total = segment_counts.total();
			if total == 0 {
				return Err(GrammarError::InvalidTable(format!(
					"segment {} has no counts to normalize",
					segment.prefix()
				)));
			}

			let total = total as f64;
			let spread = if segment.has_indexed_boundary() { width as f64 } else { 1.0 };
			let probabilities = &mut segments[segment.index()];
			for symbol in segment.family().symbols() {
				let class = symbol.class_index();
				probabilities.interior[class] = segment_counts.interior(symbol) as f64 / total;
				probabilities.boundary[class] = segment_counts.boundary(symbol) as f64 / total / spread;
			}
		}

		Ok(Self { width, segments, counts })
	}

	pub fn width(&self) -> usize {
		self.width
	}

	/// The smoothed counts behind the probabilities.
	pub fn counts(&self) -> &GrammarCounts {
		&self.counts
	}

	/// Probability of staying in `segment` after `symbol`.
	pub fn interior(&self, segment: Segment, symbol: Symbol) -> f64 {
		self.segments[segment.index()].interior[symbol.class_index()]
	}

	/// Probability of leaving `segment` after `symbol`.
	///
	/// For S and R this is the probability of one indexed marker variant.
	pub fn boundary(&self, segment: Segment, symbol: Symbol) -> f64 {
		self.segments[segment.index()].boundary[symbol.class_index()]
	}

	/// Entry-wise mean of two tables trained with the same width.
	///
	/// Used for hybrid models trained on two corpora encoded with a merged
	/// dictionary. Only probabilities are averaged; the counts of `self` are
	/// kept as they are, so the pseudo-counts are not added twice.
	///
	/// # Errors
	/// `WidthMismatch` if the widths differ.
	pub fn average(&self, other: &Self) -> Result<Self> {
		if self.width != other.width {
			return Err(GrammarError::WidthMismatch { table: self.width, requested: other.width });
		}

		let mut segments = self.segments;
		for (mine, theirs) in segments.iter_mut().zip(other.segments.iter()) {
			for class in 0..4 {
				mine.interior[class] = (mine.interior[class] + theirs.interior[class]) / 2.0;
				mine.boundary[class] = (mine.boundary[class] + theirs.boundary[class]) / 2.0;
			}
		}

		Ok(Self { width: self.width, segments, counts: self.counts.clone() })
	}

	/// Converts the table into its JSON document shape.
	pub fn to_document(&self) -> ProbabilityDocument {
		let mut document = ProbabilityDocument {
			s_counts: BTreeMap::new(),
			r_counts: BTreeMap::new(),
			q_counts: BTreeMap::new(),
			s_probabilities: BTreeMap::new(),
			r_probabilities: BTreeMap::new(),
			q_probabilities: BTreeMap::new(),
			width: Some(self.width),
			words: Some(self.counts.words()),
		};

		for segment in Segment::ALL {
			let counts = self.counts.segment(segment);
			for symbol in segment.family().symbols() {
				for kind in [TransitionKind::Interior, TransitionKind::Boundary] {
					let (count, probability) = match kind {
						TransitionKind::Interior => (counts.interior(symbol), self.interior(segment, symbol)),
						TransitionKind::Boundary => (counts.boundary(symbol), self.boundary(segment, symbol)),
					};
					document.counts_mut(segment).insert(count_key(segment, kind, symbol), count);
					document.probabilities_mut(segment).insert(probability_key(segment, kind, symbol), probability);
				}
			}
		}

		document
	}

	/// Rebuilds a table from its JSON document shape.
	///
	/// `width` may be omitted when the document records it.
	///
	/// # Errors
	/// - `InvalidTable` if a transition is missing, a probability lies outside
	///   `[0, 1]`, or no width is known
	/// - `WidthMismatch` if `width` contradicts the document
	pub fn from_document(document: &ProbabilityDocument, width: Option<usize>) -> Result<Self> {
		let width = match (width, document.width) {
			(Some(requested), Some(table)) if requested != table => {
				return Err(GrammarError::WidthMismatch { table, requested });
			}
			(Some(width), _) | (None, Some(width)) => width,
			(None, None) => {
				return Err(GrammarError::InvalidTable("document does not record its width".to_owned()));
			}
		};
		if width == 0 {
			return Err(GrammarError::InvalidWidth(width));
		}

		let mut segments = [SegmentProbabilities { interior: [0.0; 4], boundary: [0.0; 4] }; 3];
		let mut segment_counts = [SegmentCounts::default(); 3];

		for segment in Segment::ALL {
			let mut interior_counts = [0; 4];
			let mut boundary_counts = [0; 4];
			for symbol in segment.family().symbols() {
				let class = symbol.class_index();
				interior_counts[class] = Self::lookup_count(document, segment, TransitionKind::Interior, symbol)?;
				boundary_counts[class] = Self::lookup_count(document, segment, TransitionKind::Boundary, symbol)?;
				segments[segment.index()].interior[class] =
					Self::lookup_probability(document, segment, TransitionKind::Interior, symbol)?;
				segments[segment.index()].boundary[class] =
					Self::lookup_probability(document, segment, TransitionKind::Boundary, symbol)?;
			}
			segment_counts[segment.index()] = SegmentCounts::from_arrays(interior_counts, boundary_counts);
		}

		let counts = GrammarCounts::from_parts(segment_counts, document.words.unwrap_or(0));
		Ok(Self { width, segments, counts })
	}

	fn lookup_count(document: &ProbabilityDocument, segment: Segment, kind: TransitionKind, symbol: Symbol) -> Result<u64> {
		let key = count_key(segment, kind, symbol);
		document
			.counts(segment)
			.get(&key)
			.copied()
			.ok_or_else(|| GrammarError::InvalidTable(format!("missing count '{}'", key)))
	}

	fn lookup_probability(document: &ProbabilityDocument, segment: Segment, kind: TransitionKind, symbol: Symbol) -> Result<f64> {
		let key = probability_key(segment, kind, symbol);
		let probability = document
			.probabilities(segment)
			.get(&key)
			.copied()
			.ok_or_else(|| GrammarError::InvalidTable(format!("missing probability '{}'", key)))?;

		if !(0.0..=1.0).contains(&probability) {
			return Err(GrammarError::InvalidTable(format!(
				"probability '{}' = {} outside [0, 1]",
				key, probability
			)));
		}
		Ok(probability)
	}

	/// Writes the table as a JSON probability document, atomically.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		write_json(path, &self.to_document())
	}

	/// Reads a JSON probability document.
	pub fn load<P: AsRef<Path>>(path: P, width: Option<usize>) -> Result<Self> {
		let document: ProbabilityDocument = read_json(path)?;
		Self::from_document(&document, width)
	}

	pub(crate) fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		write_snapshot(path, self)
	}

	pub(crate) fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Self> {
		read_snapshot(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::counts::SMOOTHING;
	use crate::model::word::EncodedWord;

	fn table(words: &[&str], width: usize) -> ProbabilityTable {
		let mut counts = GrammarCounts::new();
		for word in words {
			counts.observe(&EncodedWord::parse(word).unwrap().segments(width).unwrap());
		}
		ProbabilityTable::from_counts(counts.smoothed(SMOOTHING), width).unwrap()
	}

	#[test]
	fn test_keys_follow_document_scheme() {
		assert_eq!(count_key(Segment::S, TransitionKind::Interior, Symbol::Sigma), "S_sigma_S");
		assert_eq!(count_key(Segment::S, TransitionKind::Boundary, Symbol::SigmaHat), "S_sigma_hat_alpha_R");
		assert_eq!(probability_key(Segment::S, TransitionKind::Boundary, Symbol::Sigma), "S_sigma_alpha_i_R");
		assert_eq!(probability_key(Segment::S, TransitionKind::Boundary, Symbol::SigmaHat), "S_sigma_hat_i_alpha_R");
		assert_eq!(probability_key(Segment::R, TransitionKind::Boundary, Symbol::Rho), "R_rho_omega_i_Q");
		assert_eq!(probability_key(Segment::R, TransitionKind::Boundary, Symbol::TauHat), "R_tau_hat_i_omega_Q");
		assert_eq!(probability_key(Segment::Q, TransitionKind::Boundary, Symbol::Delta), "Q_delta_end");
		assert_eq!(probability_key(Segment::Q, TransitionKind::Interior, Symbol::Gamma), "Q_gamma_Q");
	}

	#[test]
	fn test_segments_normalize_to_one_before_width_division() {
		let width = 4;
		let table = table(&["σσγα1τρρω2δσ", "δα0βω3γ", "σ^γα3τ^τω0σσ"], width);

		for segment in Segment::ALL {
			let spread = if segment.has_indexed_boundary() { width as f64 } else { 1.0 };
			let total: f64 = segment
				.family()
				.symbols()
				.iter()
				.map(|symbol| table.interior(segment, *symbol) + table.boundary(segment, *symbol) * spread)
				.sum();
			assert!((total - 1.0).abs() < 1e-12, "segment {:?} sums to {}", segment, total);
		}
	}

	#[test]
	fn test_boundary_is_divided_by_width_except_q() {
		let table = table(&["σα0τω0σ"], 5);
		let counts = table.counts();

		let s_total = counts.segment(Segment::S).total() as f64;
		let expected = counts.segment(Segment::S).boundary(Symbol::Sigma) as f64 / s_total / 5.0;
		assert!((table.boundary(Segment::S, Symbol::Sigma) - expected).abs() < 1e-15);

		let q_total = counts.segment(Segment::Q).total() as f64;
		let expected = counts.segment(Segment::Q).boundary(Symbol::Sigma) as f64 / q_total;
		assert!((table.boundary(Segment::Q, Symbol::Sigma) - expected).abs() < 1e-15);
	}

	#[test]
	fn test_document_round_trip() {
		let table = table(&["σσγα1τρρω2δσ", "δα0βω3γ"], 4);
		let document = table.to_document();

		assert_eq!(document.s_counts.len(), 8);
		assert_eq!(document.q_probabilities.len(), 8);
		assert!(document.s_probabilities.contains_key("S_sigma_hat_i_alpha_R"));

		let back = ProbabilityTable::from_document(&document, None).unwrap();
		assert_eq!(back, table);
	}

	#[test]
	fn test_document_without_width_needs_caller_width() {
		let table = table(&["σα0τω0σ"], 3);
		let mut document = table.to_document();
		document.width = None;

		assert!(matches!(
			ProbabilityTable::from_document(&document, None),
			Err(GrammarError::InvalidTable(_))
		));
		assert_eq!(ProbabilityTable::from_document(&document, Some(3)).unwrap().width(), 3);
		assert!(matches!(
			ProbabilityTable::from_document(&table.to_document(), Some(4)),
			Err(GrammarError::WidthMismatch { table: 3, requested: 4 })
		));
	}

	#[test]
	fn test_document_missing_transition_is_rejected() {
		let mut document = table(&["σα0τω0σ"], 2).to_document();
		document.r_probabilities.remove("R_beta_omega_i_Q");

		match ProbabilityTable::from_document(&document, None) {
			Err(GrammarError::InvalidTable(message)) => assert!(message.contains("R_beta_omega_i_Q")),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_average_takes_mean_and_keeps_first_counts() {
		let first = table(&["σα0τω0σ"], 2);
		let second = table(&["δα1ρω1γ", "δα1ρω1γ"], 2);
		let average = first.average(&second).unwrap();

		for segment in Segment::ALL {
			for symbol in segment.family().symbols() {
				let expected = (first.interior(segment, symbol) + second.interior(segment, symbol)) / 2.0;
				assert!((average.interior(segment, symbol) - expected).abs() < 1e-15);
			}
		}
		assert_eq!(average.counts(), first.counts());
		assert_eq!(average.counts().segment(Segment::R).interior(Symbol::Rho), SMOOTHING);

		let other_width = table(&["σα0τω0σ"], 3);
		assert!(matches!(first.average(&other_width), Err(GrammarError::WidthMismatch { .. })));
	}
}
