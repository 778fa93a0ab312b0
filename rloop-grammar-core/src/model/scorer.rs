use std::io::Write;
use std::path::Path;

use log::{debug, info};

use crate::error::{GrammarError, Result};
use crate::io::write_atomic;
use super::table::ProbabilityTable;
use super::word::{read_word_file, EncodedWord, Segment};

/// Raw and normalized scores of a candidate set.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreReport {
	/// Natural log of each candidate's unnormalized probability, in input
	/// order (`-inf` for a zero probability).
	pub log_raw: Vec<f64>,
	/// Natural log of the partition function.
	pub log_partition: f64,
	/// Unnormalized probability of each candidate, in input order. May
	/// underflow to zero for long candidates.
	pub raw: Vec<f64>,
	/// Sum of `raw`, same caveat.
	pub partition: f64,
	/// Normalized probability of each candidate, in input order.
	pub probabilities: Vec<f64>,
}

/// Scores candidate words against a trained [`ProbabilityTable`].
///
/// # Responsibilities
/// - Compute the production-rule likelihood of each candidate word
/// - Normalize the likelihoods over the candidate set
///
/// # Invariants
/// - output has one entry per candidate, in input order
/// - normalized probabilities sum to 1
///
/// # Notes
/// - Likelihoods are accumulated as log-probabilities and normalized with
///   log-sum-exp, so long candidates do not underflow to zero.
pub struct LanguageScorer<'a> {
	table: &'a ProbabilityTable,
}

impl<'a> LanguageScorer<'a> {
	/// Creates a scorer for candidates encoded with `width`-long markers.
	///
	/// # Errors
	/// `WidthMismatch` if the table was trained with another width.
	pub fn new(table: &'a ProbabilityTable, width: usize) -> Result<Self> {
		if table.width() != width {
			return Err(GrammarError::WidthMismatch { table: table.width(), requested: width });
		}
		Ok(Self { table })
	}

	/// Natural log of the unnormalized probability of one candidate.
	///
	/// Sum, over the S, R and Q segments, of the log boundary probability of
	/// the segment's last symbol and the log interior probabilities of the
	/// others. The marker sub-indices do not enter the sum.
	pub fn log_probability(&self, word: &EncodedWord) -> Result<f64> {
		let segments = word.segments(self.table.width())?;

		let mut log_probability = 0.0;
		for segment in Segment::ALL {
			log_probability += self.table.boundary(segment, segments.boundary(segment)).ln();
			for symbol in segments.interior(segment) {
				log_probability += self.table.interior(segment, *symbol).ln();
			}
		}

		Ok(log_probability)
	}

	/// Unnormalized probability of one candidate.
	pub fn raw_probability(&self, word: &EncodedWord) -> Result<f64> {
		Ok(self.log_probability(word)?.exp())
	}

	/// Scores `candidates` and keeps the intermediate values.
	///
	/// # Errors
	/// - `MalformedWord` for the first malformed candidate
	/// - `DegenerateModel` if every candidate scores zero (or there are none)
	pub fn score_report(&self, candidates: &[EncodedWord]) -> Result<ScoreReport> {
		let log_raw = candidates
			.iter()
			.map(|word| self.log_probability(word))
			.collect::<Result<Vec<f64>>>()?;

		let max = log_raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
		if !max.is_finite() {
			return Err(GrammarError::DegenerateModel { candidates: candidates.len() });
		}

		let scaled: Vec<f64> = log_raw.iter().map(|log_probability| (log_probability - max).exp()).collect();
		let scaled_sum: f64 = scaled.iter().sum();
		let log_partition = max + scaled_sum.ln();
		info!("Log partition function over {} candidates: {}", candidates.len(), log_partition);

		let probabilities = scaled.iter().map(|probability| probability / scaled_sum).collect();
		let raw: Vec<f64> = log_raw.iter().map(|log_probability| log_probability.exp()).collect();
		Ok(ScoreReport {
			partition: log_partition.exp(),
			log_raw,
			log_partition,
			raw,
			probabilities,
		})
	}

	/// Normalized probability of each candidate, in input order.
	pub fn score(&self, candidates: &[EncodedWord]) -> Result<Vec<f64>> {
		Ok(self.score_report(candidates)?.probabilities)
	}

	/// Reads a `label: word` candidate file and scores it in file order.
	pub fn score_file<P: AsRef<Path>>(&self, words_path: P) -> Result<ScoreReport> {
		let candidates = read_word_file(&words_path)?;
		debug!("Read {} candidates from {}", candidates.len(), words_path.as_ref().display());
		self.score_report(&candidates)
	}
}

/// Normalized probability of each candidate under `table`, in input order.
pub fn score(table: &ProbabilityTable, candidates: &[EncodedWord], width: usize) -> Result<Vec<f64>> {
	LanguageScorer::new(table, width)?.score(candidates)
}

/// Writes one probability per line, atomically.
pub fn write_probabilities<P: AsRef<Path>>(path: P, probabilities: &[f64]) -> Result<()> {
	write_atomic(path, |writer| {
		for probability in probabilities {
			writeln!(writer, "{}", probability)?;
		}
		Ok(())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::symbol::Symbol;
	use crate::model::trainer::train;

	fn words(texts: &[&str]) -> Vec<EncodedWord> {
		texts.iter().map(|text| EncodedWord::parse(text).unwrap()).collect()
	}

	fn trained(width: usize) -> ProbabilityTable {
		train(&words(&["σσγα1τττω2δσ", "δα0βτω3γ", "σ^γα3τ^τω0σσ"]), width).unwrap()
	}

	#[test]
	fn test_probabilities_sum_to_one_in_input_order() {
		let table = trained(4);
		let candidates = words(&["σα0τω0σ", "γγδα1ββω2σ^", "σα3τ^ω1δδγ"]);
		let scorer = LanguageScorer::new(&table, 4).unwrap();

		let report = scorer.score_report(&candidates).unwrap();
		assert_eq!(report.probabilities.len(), candidates.len());

		let total: f64 = report.probabilities.iter().sum();
		assert!((total - 1.0).abs() < 1e-12);

		for (index, candidate) in candidates.iter().enumerate() {
			let raw = scorer.raw_probability(candidate).unwrap();
			assert_eq!(report.raw[index], raw);
			assert!((report.probabilities[index] - raw / report.partition).abs() < 1e-12);
		}
	}

	#[test]
	fn test_raw_probability_is_product_of_transitions() {
		let table = trained(4);
		let scorer = LanguageScorer::new(&table, 4).unwrap();
		let raw = scorer.raw_probability(&EncodedWord::parse("σγα2τω1δσ").unwrap()).unwrap();

		let expected = table.interior(Segment::S, Symbol::Sigma)
			* table.boundary(Segment::S, Symbol::Gamma)
			* table.boundary(Segment::R, Symbol::Tau)
			* table.interior(Segment::Q, Symbol::Delta)
			* table.boundary(Segment::Q, Symbol::Sigma);
		assert!((raw - expected).abs() <= expected * 1e-12);
	}

	#[test]
	fn test_marker_index_does_not_change_score() {
		let table = trained(4);
		let scorer = LanguageScorer::new(&table, 4).unwrap();
		let first = scorer.raw_probability(&EncodedWord::parse("σα0τω0σ").unwrap()).unwrap();
		let second = scorer.raw_probability(&EncodedWord::parse("σα3τω2σ").unwrap()).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn test_unobserved_class_scores_positive() {
		// No ρ anywhere in the training corpus.
		let table = trained(4);
		let scorer = LanguageScorer::new(&table, 4).unwrap();
		let raw = scorer.raw_probability(&EncodedWord::parse("σα0ρρω1σ").unwrap()).unwrap();
		assert!(raw > 0.0);
	}

	#[test]
	fn test_long_candidates_do_not_underflow() {
		let table = trained(4);
		let scorer = LanguageScorer::new(&table, 4).unwrap();
		let candidates = words(&[
			format!("{}α0τω0σ", "σ".repeat(1000)).as_str(),
			format!("{}α0τω0σ", "σ".repeat(1001)).as_str(),
		]);

		let report = scorer.score_report(&candidates).unwrap();
		assert_eq!(report.raw, vec![0.0, 0.0]);
		assert!(report.log_raw.iter().all(|log_probability| log_probability.is_finite()));

		// The longer word has one more σ → σ transition.
		let ratio = table.interior(Segment::S, Symbol::Sigma);
		assert!((report.probabilities[0] - 1.0 / (1.0 + ratio)).abs() < 1e-9);
		assert!((report.probabilities[1] - ratio / (1.0 + ratio)).abs() < 1e-9);
	}

	#[test]
	fn test_width_mismatch_is_rejected() {
		let table = trained(4);
		assert!(matches!(
			score(&table, &words(&["σα0τω0σ"]), 3),
			Err(GrammarError::WidthMismatch { table: 4, requested: 3 })
		));
	}

	#[test]
	fn test_zero_partition_is_degenerate() {
		let mut document = train(&words(&["σα0τω1σ", "γα1ρω0δ"]), 2).unwrap().to_document();
		document.s_probabilities.insert("S_sigma_alpha_i_R".to_owned(), 0.0);
		let table = ProbabilityTable::from_document(&document, None).unwrap();

		assert!(matches!(
			score(&table, &words(&["σα0τω0σ", "σσα1τω1γ"]), 2),
			Err(GrammarError::DegenerateModel { candidates: 2 })
		));
		assert!(matches!(score(&table, &[], 2), Err(GrammarError::DegenerateModel { candidates: 0 })));
	}

	#[test]
	fn test_malformed_candidate_is_fatal() {
		let table = trained(4);
		assert!(matches!(
			score(&table, &words(&["σα0τω0σ", "στω0σ"]), 4),
			Err(GrammarError::MalformedWord { .. })
		));
	}

	#[test]
	fn test_write_probabilities_one_per_line() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("scores.txt");
		write_probabilities(&path, &[0.25, 0.75]).unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "0.25\n0.75\n");
	}
}
