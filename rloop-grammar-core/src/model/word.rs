use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};
use crate::io::read_file;
use super::symbol::{tokenize, Family, Symbol, Token};

/// The three states of the linear grammar automaton.
///
/// - `S`: before the loop (Φ symbols), left through `α`
/// - `R`: inside the loop (Ψ symbols), left through `ω`
/// - `Q`: after the loop (Φ symbols), left through the end of the word
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
	S,
	R,
	Q,
}

impl Segment {
	pub const ALL: [Segment; 3] = [Segment::S, Segment::R, Segment::Q];

	pub fn family(self) -> Family {
		match self {
			Segment::S | Segment::Q => Family::Phi,
			Segment::R => Family::Psi,
		}
	}

	/// Whether the segment's boundary transition is shared by `width`
	/// marker sub-positions.
	pub fn has_indexed_boundary(self) -> bool {
		!matches!(self, Segment::Q)
	}

	pub(crate) fn index(self) -> usize {
		match self {
			Segment::S => 0,
			Segment::R => 1,
			Segment::Q => 2,
		}
	}

	pub(crate) fn prefix(self) -> &'static str {
		match self {
			Segment::S => "S",
			Segment::R => "R",
			Segment::Q => "Q",
		}
	}
}

/// A symbol word in canonical reading order:
/// `S-segment* α_i R-segment* ω_j Q-segment*`.
///
/// An `EncodedWord` is the raw token sequence produced by the word encoder.
/// Its shape is only checked by [`EncodedWord::segments`], so the trainer and
/// the scorer are the ones that reject malformed words.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EncodedWord {
	label: Option<String>,
	tokens: Vec<Token>,
}

impl EncodedWord {
	pub fn new(tokens: Vec<Token>) -> Self {
		Self { label: None, tokens }
	}

	pub fn with_label(label: &str, tokens: Vec<Token>) -> Self {
		Self { label: Some(label.to_owned()), tokens }
	}

	pub fn label(&self) -> Option<&str> {
		self.label.as_deref()
	}

	pub fn tokens(&self) -> &[Token] {
		&self.tokens
	}

	/// Parses a word written in canonical reading order.
	pub fn parse(text: &str) -> Result<Self> {
		Ok(Self::new(tokenize(text)?))
	}

	/// Parses a word as rendered by the word encoder.
	///
	/// The encoder writes words right-to-left (Q-segment first), so the
	/// textual token order is reversed to obtain the canonical order.
	pub fn parse_rendered(text: &str) -> Result<Self> {
		let mut tokens = tokenize(text)?;
		tokens.reverse();
		Ok(Self::new(tokens))
	}

	/// Renders the word the way the word encoder writes it (right-to-left).
	pub fn render(&self) -> String {
		self.tokens.iter().rev().map(|token| token.to_string()).collect()
	}

	/// Splits the word into its three segments.
	///
	/// # Errors
	/// `MalformedWord` unless the word has exactly one `α` followed later by
	/// exactly one `ω`, marker indices in `[0, width)`, non-empty segments,
	/// Φ symbols in the S and Q segments and Ψ symbols in the R segment.
	pub fn segments(&self, width: usize) -> Result<Segments> {
		let label = self.label();
		let mut parts: [Vec<Symbol>; 3] = [Vec::new(), Vec::new(), Vec::new()];
		let mut alpha = None;
		let mut omega = None;
		let mut current = Segment::S;

		for token in &self.tokens {
			match *token {
				Token::Symbol(symbol) => {
					if symbol.family() != current.family() {
						return Err(GrammarError::malformed(
							label,
							format!("symbol {} cannot appear in the {} segment", symbol, current.prefix()),
						));
					}
					parts[current.index()].push(symbol);
				}
				Token::Alpha(index) => {
					if alpha.is_some() {
						return Err(GrammarError::malformed(label, "more than one alpha marker"));
					}
					if omega.is_some() {
						return Err(GrammarError::malformed(label, "alpha marker after omega marker"));
					}
					Self::check_index(label, 'α', index, width)?;
					alpha = Some(index);
					current = Segment::R;
				}
				Token::Omega(index) => {
					if omega.is_some() {
						return Err(GrammarError::malformed(label, "more than one omega marker"));
					}
					if alpha.is_none() {
						return Err(GrammarError::malformed(label, "omega marker before alpha marker"));
					}
					Self::check_index(label, 'ω', index, width)?;
					omega = Some(index);
					current = Segment::Q;
				}
			}
		}

		let alpha = alpha.ok_or_else(|| GrammarError::malformed(label, "missing alpha marker"))?;
		let omega = omega.ok_or_else(|| GrammarError::malformed(label, "missing omega marker"))?;

		for segment in Segment::ALL {
			if parts[segment.index()].is_empty() {
				return Err(GrammarError::malformed(
					label,
					format!("empty {} segment", segment.prefix()),
				));
			}
		}

		let [s, r, q] = parts;
		Ok(Segments { s, alpha, r, omega, q })
	}

	fn check_index(label: Option<&str>, marker: char, index: usize, width: usize) -> Result<()> {
		if index >= width {
			return Err(GrammarError::malformed(
				label,
				format!("marker {}{} outside [0, {})", marker, index, width),
			));
		}
		Ok(())
	}
}

impl fmt::Display for EncodedWord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for token in &self.tokens {
			write!(f, "{}", token)?;
		}
		Ok(())
	}
}

/// A validated word, split at its markers.
///
/// # Invariants
/// - `s` and `q` hold only Φ symbols, `r` only Ψ symbols
/// - no segment is empty
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segments {
	s: Vec<Symbol>,
	alpha: usize,
	r: Vec<Symbol>,
	omega: usize,
	q: Vec<Symbol>,
}

impl Segments {
	pub fn symbols(&self, segment: Segment) -> &[Symbol] {
		match segment {
			Segment::S => &self.s,
			Segment::R => &self.r,
			Segment::Q => &self.q,
		}
	}

	/// Symbols whose transition stays in the segment (all but the last).
	pub fn interior(&self, segment: Segment) -> &[Symbol] {
		let symbols = self.symbols(segment);
		&symbols[..symbols.len() - 1]
	}

	/// The symbol whose transition leaves the segment.
	pub fn boundary(&self, segment: Segment) -> Symbol {
		let symbols = self.symbols(segment);
		symbols[symbols.len() - 1]
	}

	pub fn alpha_index(&self) -> usize {
		self.alpha
	}

	pub fn omega_index(&self) -> usize {
		self.omega
	}
}

/// Reads a `label: word` file produced by the word encoder.
///
/// - Blank lines are skipped; line order is preserved.
/// - The text before the first `:` is kept as the label.
/// - Lines without `:` are read as unlabelled words.
///
/// # Errors
/// `UnknownSymbol` with the 1-based line number of the offending line.
pub fn read_word_file<P: AsRef<Path>>(path: P) -> Result<Vec<EncodedWord>> {
	let mut words = Vec::new();

	for (number, line) in read_file(path)?.iter().enumerate() {
		if line.trim().is_empty() {
			continue;
		}

		let (label, text) = match line.split_once(':') {
			Some((label, text)) => (Some(label.trim()), text),
			None => (None, line.as_str()),
		};

		let mut word = EncodedWord::parse_rendered(text).map_err(|err| match err {
			GrammarError::UnknownSymbol { token, .. } => GrammarError::UnknownSymbol { token, line: Some(number + 1) },
			other => other,
		})?;
		word.label = label.map(str::to_owned);
		words.push(word);
	}

	Ok(words)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn word(text: &str) -> EncodedWord {
		EncodedWord::parse(text).unwrap()
	}

	#[test]
	fn test_segments_split_at_markers() {
		let segments = word("σγδα2τρβω0σ^σ").segments(4).unwrap();
		assert_eq!(segments.symbols(Segment::S), &[Symbol::Sigma, Symbol::Gamma, Symbol::Delta]);
		assert_eq!(segments.interior(Segment::S), &[Symbol::Sigma, Symbol::Gamma]);
		assert_eq!(segments.boundary(Segment::S), Symbol::Delta);
		assert_eq!(segments.boundary(Segment::R), Symbol::Beta);
		assert_eq!(segments.interior(Segment::Q), &[Symbol::SigmaHat]);
		assert_eq!(segments.boundary(Segment::Q), Symbol::Sigma);
		assert_eq!(segments.alpha_index(), 2);
		assert_eq!(segments.omega_index(), 0);
	}

	#[test]
	fn test_single_symbol_segments_have_no_interior() {
		let segments = word("σα0τω0δ").segments(1).unwrap();
		for segment in Segment::ALL {
			assert!(segments.interior(segment).is_empty());
		}
	}

	#[test]
	fn test_malformed_words() {
		let cases = [
			"σγτρω0σ",      // no alpha
			"σα0τρσ",       // no omega
			"σω0τα0σ",      // omega first
			"σα0τα1ρω0σ",   // two alphas
			"σα0τω0ω1σ",    // two omegas
			"α0τω0σ",       // empty S
			"σα0ω0σ",       // empty R
			"σα0τω0",       // empty Q
			"σα0σω0σ",      // Φ symbol inside the loop
			"σα0τω0ρ",      // Ψ symbol after the loop
			"σα4τω0σ",      // index out of range
		];
		for case in cases {
			match word(case).segments(4) {
				Err(GrammarError::MalformedWord { .. }) => {}
				other => panic!("{} should be malformed, got {:?}", case, other),
			}
		}
	}

	#[test]
	fn test_render_reverses_canonical_order() {
		let w = word("σγα1τ^ρω3δ");
		assert_eq!(w.render(), "δω3ρτ^α1γσ");
		assert_eq!(EncodedWord::parse_rendered(&w.render()).unwrap(), w);
	}

	#[test]
	fn test_read_word_file_keeps_order_and_labels() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("words.txt");
		std::fs::write(&path, "first: δω0ρα1σ\n\nsecond: γω1τα0σ^\nγω1τα0σ\n").unwrap();

		let words = read_word_file(&path).unwrap();
		assert_eq!(words.len(), 3);
		assert_eq!(words[0].label(), Some("first"));
		assert_eq!(words[1].label(), Some("second"));
		assert_eq!(words[2].label(), None);
		assert_eq!(words[0].to_string(), "σα1ρω0δ");
	}

	#[test]
	fn test_read_word_file_reports_line_of_unknown_symbol() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("words.txt");
		std::fs::write(&path, "a: δω0ρα1σ\nb: δω0xα1σ\n").unwrap();

		match read_word_file(&path) {
			Err(GrammarError::UnknownSymbol { token, line }) => {
				assert_eq!(token, "x");
				assert_eq!(line, Some(2));
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}
}
