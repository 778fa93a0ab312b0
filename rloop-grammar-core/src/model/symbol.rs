use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};

/// The two disjoint families of grammar symbols.
///
/// - `Phi` labels windows outside the loop (the S and Q segments).
/// - `Psi` labels windows inside the loop (the R segment).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
	Phi,
	Psi,
}

impl Family {
	/// Symbols of this family, ordered by class index.
	pub fn symbols(self) -> [Symbol; 4] {
		match self {
			Family::Phi => [Symbol::Sigma, Symbol::SigmaHat, Symbol::Gamma, Symbol::Delta],
			Family::Psi => [Symbol::Tau, Symbol::TauHat, Symbol::Rho, Symbol::Beta],
		}
	}
}

/// One of the 8 grammar symbol classes.
///
/// A single bijection ties every rendering of a symbol together:
///
/// | symbol | Greek | ASCII | dictionary | transition  |
/// |--------|-------|-------|------------|-------------|
/// | σ      | `σ`   | `s`   | `SIGMA`    | `sigma`     |
/// | σ̂      | `σ^`  | `h`   | `SIGMA^`   | `sigma_hat` |
/// | γ      | `γ`   | `g`   | `GAMMA`    | `gamma`     |
/// | δ      | `δ`   | `d`   | `DELTA`    | `delta`     |
/// | τ      | `τ`   | `t`   | `TAU`      | `tau`       |
/// | τ̂      | `τ^`  | `T`   | `TAU^`     | `tau_hat`   |
/// | ρ      | `ρ`   | `R`   | `RHO`      | `rho`       |
/// | β      | `β`   | `B`   | `BETA`     | `beta`      |
///
/// The derived ordering (declaration order) fixes the iteration order of
/// dictionaries and therefore the draw order of seeded merges.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
	#[serde(rename = "SIGMA")]
	Sigma,
	#[serde(rename = "SIGMA^")]
	SigmaHat,
	#[serde(rename = "GAMMA")]
	Gamma,
	#[serde(rename = "DELTA")]
	Delta,
	#[serde(rename = "TAU")]
	Tau,
	#[serde(rename = "TAU^")]
	TauHat,
	#[serde(rename = "RHO")]
	Rho,
	#[serde(rename = "BETA")]
	Beta,
}

impl Symbol {
	pub const ALL: [Symbol; 8] = [
		Symbol::Sigma,
		Symbol::SigmaHat,
		Symbol::Gamma,
		Symbol::Delta,
		Symbol::Tau,
		Symbol::TauHat,
		Symbol::Rho,
		Symbol::Beta,
	];

	pub fn family(self) -> Family {
		match self {
			Symbol::Sigma | Symbol::SigmaHat | Symbol::Gamma | Symbol::Delta => Family::Phi,
			Symbol::Tau | Symbol::TauHat | Symbol::Rho | Symbol::Beta => Family::Psi,
		}
	}

	/// Position of the symbol inside its family, in `0..4`.
	pub fn class_index(self) -> usize {
		match self {
			Symbol::Sigma | Symbol::Tau => 0,
			Symbol::SigmaHat | Symbol::TauHat => 1,
			Symbol::Gamma | Symbol::Rho => 2,
			Symbol::Delta | Symbol::Beta => 3,
		}
	}

	pub fn greek(self) -> &'static str {
		match self {
			Symbol::Sigma => "σ",
			Symbol::SigmaHat => "σ^",
			Symbol::Gamma => "γ",
			Symbol::Delta => "δ",
			Symbol::Tau => "τ",
			Symbol::TauHat => "τ^",
			Symbol::Rho => "ρ",
			Symbol::Beta => "β",
		}
	}

	pub fn ascii(self) -> char {
		match self {
			Symbol::Sigma => 's',
			Symbol::SigmaHat => 'h',
			Symbol::Gamma => 'g',
			Symbol::Delta => 'd',
			Symbol::Tau => 't',
			Symbol::TauHat => 'T',
			Symbol::Rho => 'R',
			Symbol::Beta => 'B',
		}
	}

	/// Name used by dictionary documents (`SIGMA`, `SIGMA^`, ...).
	pub fn dictionary_name(self) -> &'static str {
		match self {
			Symbol::Sigma => "SIGMA",
			Symbol::SigmaHat => "SIGMA^",
			Symbol::Gamma => "GAMMA",
			Symbol::Delta => "DELTA",
			Symbol::Tau => "TAU",
			Symbol::TauHat => "TAU^",
			Symbol::Rho => "RHO",
			Symbol::Beta => "BETA",
		}
	}

	/// Name used inside transition keys of probability documents.
	pub fn transition_name(self) -> &'static str {
		match self {
			Symbol::Sigma => "sigma",
			Symbol::SigmaHat => "sigma_hat",
			Symbol::Gamma => "gamma",
			Symbol::Delta => "delta",
			Symbol::Tau => "tau",
			Symbol::TauHat => "tau_hat",
			Symbol::Rho => "rho",
			Symbol::Beta => "beta",
		}
	}

	fn from_ascii(c: char) -> Option<Symbol> {
		Symbol::ALL.into_iter().find(|symbol| symbol.ascii() == c)
	}
}

impl fmt::Display for Symbol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.greek())
	}
}

/// One item of an encoded word: a grammar symbol or an indexed marker.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Token {
	Symbol(Symbol),
	/// Entry into the loop, with its sub-position index.
	Alpha(usize),
	/// Exit from the loop, with its sub-position index.
	Omega(usize),
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Token::Symbol(symbol) => write!(f, "{}", symbol),
			Token::Alpha(index) => write!(f, "α{}", index),
			Token::Omega(index) => write!(f, "ω{}", index),
		}
	}
}

const COMBINING_CIRCUMFLEX: char = '\u{0302}';

/// Splits rendered text into tokens, in textual order.
///
/// Accepts the Greek rendering (`σ`, `σ^` or `σ̂`, `α3`, ...) and the ASCII
/// codes (`s`, `h`, `O3`, ...). Whitespace is ignored.
///
/// # Errors
/// `UnknownSymbol` for any other character, or for a marker without index.
pub fn tokenize(text: &str) -> Result<Vec<Token>> {
	let mut tokens = Vec::new();
	let mut chars = text.chars().peekable();

	while let Some(c) = chars.next() {
		let token = match c {
			c if c.is_whitespace() => continue,
			'σ' => Token::Symbol(hatted(&mut chars, Symbol::Sigma, Symbol::SigmaHat)),
			'τ' => Token::Symbol(hatted(&mut chars, Symbol::Tau, Symbol::TauHat)),
			'γ' => Token::Symbol(Symbol::Gamma),
			'δ' => Token::Symbol(Symbol::Delta),
			'ρ' => Token::Symbol(Symbol::Rho),
			'β' => Token::Symbol(Symbol::Beta),
			'α' | 'O' => Token::Alpha(marker_index(&mut chars, c)?),
			'ω' | 'o' => Token::Omega(marker_index(&mut chars, c)?),
			c => match Symbol::from_ascii(c) {
				Some(symbol) => Token::Symbol(symbol),
				None => {
					return Err(GrammarError::UnknownSymbol { token: c.to_string(), line: None });
				}
			},
		};
		tokens.push(token);
	}

	Ok(tokens)
}

fn hatted(chars: &mut Peekable<Chars<'_>>, plain: Symbol, hat: Symbol) -> Symbol {
	match chars.peek() {
		Some(&'^') | Some(&COMBINING_CIRCUMFLEX) => {
			chars.next();
			hat
		}
		_ => plain,
	}
}

fn marker_index(chars: &mut Peekable<Chars<'_>>, marker: char) -> Result<usize> {
	let mut digits = String::new();
	while let Some(c) = chars.peek() {
		if !c.is_ascii_digit() {
			break;
		}
		digits.push(*c);
		chars.next();
	}

	digits.parse::<usize>().map_err(|_| GrammarError::UnknownSymbol {
		token: format!("{}{}", marker, digits),
		line: None,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_families_partition_the_alphabet() {
		for family in [Family::Phi, Family::Psi] {
			for (index, symbol) in family.symbols().into_iter().enumerate() {
				assert_eq!(symbol.family(), family);
				assert_eq!(symbol.class_index(), index);
			}
		}
	}

	#[test]
	fn test_renderings_are_bijective() {
		for symbol in Symbol::ALL {
			assert_eq!(Symbol::from_ascii(symbol.ascii()), Some(symbol));
			assert_eq!(tokenize(symbol.greek()).unwrap(), vec![Token::Symbol(symbol)]);
		}
		let ascii: std::collections::HashSet<char> = Symbol::ALL.iter().map(|s| s.ascii()).collect();
		assert_eq!(ascii.len(), 8);
	}

	#[test]
	fn test_tokenize_greek_with_hats_and_markers() {
		let tokens = tokenize("γσ^ω12τ̂ρα0δ").unwrap();
		assert_eq!(
			tokens,
			vec![
				Token::Symbol(Symbol::Gamma),
				Token::Symbol(Symbol::SigmaHat),
				Token::Omega(12),
				Token::Symbol(Symbol::TauHat),
				Token::Symbol(Symbol::Rho),
				Token::Alpha(0),
				Token::Symbol(Symbol::Delta),
			]
		);
	}

	#[test]
	fn test_tokenize_ascii() {
		let tokens = tokenize("sh o1 tTRB O2 gd").unwrap();
		assert_eq!(tokens.len(), 10);
		assert_eq!(tokens[2], Token::Omega(1));
		assert_eq!(tokens[3], Token::Symbol(Symbol::Tau));
		assert_eq!(tokens[4], Token::Symbol(Symbol::TauHat));
		assert_eq!(tokens[7], Token::Alpha(2));
	}

	#[test]
	fn test_tokenize_rejects_unknown_and_bare_markers() {
		match tokenize("σx") {
			Err(GrammarError::UnknownSymbol { token, .. }) => assert_eq!(token, "x"),
			other => panic!("unexpected result: {:?}", other),
		}
		match tokenize("σασ") {
			Err(GrammarError::UnknownSymbol { token, .. }) => assert_eq!(token, "α"),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_dictionary_names_match_serde() {
		for symbol in Symbol::ALL {
			let json = serde_json::to_string(&symbol).unwrap();
			assert_eq!(json, format!("\"{}\"", symbol.dictionary_name()));
		}
	}
}
