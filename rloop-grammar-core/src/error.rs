use thiserror::Error;

/// Errors raised by the grammar trainer, the language scorer and the
/// dictionary merger.
///
/// Every variant is fatal to the operation that raises it. Nothing in this
/// crate retries: the errors describe malformed upstream data or a degenerate
/// model, not transient conditions.
#[derive(Error, Debug)]
pub enum GrammarError {
	/// A word without exactly one `α` before exactly one `ω`, or with an empty
	/// or wrongly-typed segment.
	#[error("malformed word{}: {reason}", label_suffix(.label))]
	MalformedWord { label: Option<String>, reason: String },

	/// Text that is not one of the 8 symbol classes or an indexed marker.
	#[error("unknown symbol '{token}'{}", line_suffix(.line))]
	UnknownSymbol { token: String, line: Option<usize> },

	/// Training was requested on a corpus with no words.
	#[error("cannot train a grammar on an empty corpus")]
	EmptyCorpus,

	/// Every candidate scored to zero, the partition function vanished.
	#[error("partition function is zero over {candidates} candidates")]
	DegenerateModel { candidates: usize },

	/// A tie between symbol classes the precedence table cannot resolve.
	#[error("ambiguous conflict on k-mer '{kmer}' between {symbols}")]
	AmbiguousConflict { kmer: String, symbols: String },

	#[error("width must be >= 1, got {0}")]
	InvalidWidth(usize),

	#[error("width mismatch: table trained with width {table}, asked for width {requested}")]
	WidthMismatch { table: usize, requested: usize },

	/// A probability document missing a transition or carrying a bad value.
	#[error("invalid probability table: {0}")]
	InvalidTable(String),

	#[error("unsupported conflict policy '{0}' (expected 'deterministic' or 'stochastic')")]
	InvalidPolicy(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Snapshot(#[from] postcard::Error),
}

pub type Result<T> = std::result::Result<T, GrammarError>;

fn label_suffix(label: &Option<String>) -> String {
	match label {
		Some(label) => format!(" '{}'", label),
		None => String::new(),
	}
}

fn line_suffix(line: &Option<usize>) -> String {
	match line {
		Some(line) => format!(" at line {}", line),
		None => String::new(),
	}
}

impl GrammarError {
	pub(crate) fn malformed(label: Option<&str>, reason: impl Into<String>) -> Self {
		GrammarError::MalformedWord {
			label: label.map(str::to_owned),
			reason: reason.into(),
		}
	}
}
