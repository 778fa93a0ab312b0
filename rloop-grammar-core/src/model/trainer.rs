use std::path::Path;
use std::sync::mpsc;
use std::thread;

use log::{debug, info};

use crate::error::{GrammarError, Result};
use crate::io::build_output_path;
use super::counts::{GrammarCounts, SMOOTHING};
use super::table::ProbabilityTable;
use super::word::{read_word_file, EncodedWord};

/// Chunks per worker when splitting a corpus.
const CHUNK_FACTOR: usize = 8;

/// Learns production-rule probabilities from a corpus of encoded words.
///
/// # Responsibilities
/// - Validate every training word (exactly one `α` before one `ω`)
/// - Count interior and boundary transitions per segment, in parallel
/// - Apply Laplace smoothing and normalize into a [`ProbabilityTable`]
///
/// # Notes
/// - Counting is split into chunks handled by scoped threads; partial counts
///   come back over a channel and are merged. The result is identical to a
///   sequential pass.
#[derive(Clone, Debug)]
pub struct GrammarTrainer {
	width: usize,
	smoothing: u64,
	workers: usize,
}

impl GrammarTrainer {
	/// Creates a trainer for words whose markers carry indices in
	/// `[0, width)`.
	///
	/// # Errors
	/// `InvalidWidth` if `width == 0`.
	pub fn new(width: usize) -> Result<Self> {
		if width == 0 {
			return Err(GrammarError::InvalidWidth(width));
		}
		Ok(Self { width, smoothing: SMOOTHING, workers: 0 })
	}

	/// Overrides the Laplace pseudo-count (default 1).
	pub fn with_smoothing(mut self, smoothing: u64) -> Self {
		self.smoothing = smoothing;
		self
	}

	/// Sets the number of counting threads; `0` uses every available core.
	pub fn with_workers(mut self, workers: usize) -> Self {
		self.workers = workers;
		self
	}

	pub fn width(&self) -> usize {
		self.width
	}

	/// Trains a probability table on `corpus`.
	///
	/// # Errors
	/// - `EmptyCorpus` if `corpus` has no words
	/// - `MalformedWord` for the first malformed word in corpus order
	pub fn train(&self, corpus: &[EncodedWord]) -> Result<ProbabilityTable> {
		let counts = self.count(corpus)?;
		info!("Trained grammar on {} words (width {})", counts.words(), self.width);
		ProbabilityTable::from_counts(counts.smoothed(self.smoothing), self.width)
	}

	/// Counts the transitions of `corpus`, without smoothing.
	pub fn count(&self, corpus: &[EncodedWord]) -> Result<GrammarCounts> {
		if corpus.is_empty() {
			return Err(GrammarError::EmptyCorpus);
		}

		let workers = match self.workers {
			0 => num_cpus::get(),
			workers => workers,
		};
		if workers == 1 {
			return count_chunk(corpus, self.width);
		}

		let chunks = workers * CHUNK_FACTOR;
		let chunk_size = corpus.len().div_ceil(chunks);
		let width = self.width;

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for (index, chunk) in corpus.chunks(chunk_size).enumerate() {
				let tx = tx.clone();
				scope.spawn(move || {
					// The receiver outlives the scope, sending cannot fail.
					let _ = tx.send((index, count_chunk(chunk, width)));
				});
			}
		});
		drop(tx);

		// Merge in chunk order so the reported error is the earliest one.
		let mut partials: Vec<(usize, Result<GrammarCounts>)> = rx.iter().collect();
		partials.sort_by_key(|(index, _)| *index);

		let mut counts = GrammarCounts::new();
		for (index, partial) in partials {
			let partial = partial?;
			debug!("Merging counts of chunk {} ({} words)", index, partial.words());
			counts.merge(&partial);
		}

		Ok(counts)
	}

	/// Reads a `label: word` file and trains on its words.
	pub fn train_file<P: AsRef<Path>>(&self, words_path: P) -> Result<ProbabilityTable> {
		let corpus = read_word_file(&words_path)?;
		info!("Read {} training words from {}", corpus.len(), words_path.as_ref().display());
		self.train(&corpus)
	}

	/// Loads the table from the binary snapshot next to `words_path` when it
	/// is up to date, otherwise trains on the file and rewrites the snapshot.
	///
	/// - The snapshot lives at `words_path` with the `bin` extension.
	/// - It is reused only if it is newer than the word file and was trained
	///   with the same width.
	pub fn train_or_load<P: AsRef<Path>>(&self, words_path: P) -> Result<ProbabilityTable> {
		let snapshot_path = build_output_path(&words_path, "bin")?;

		if Self::snapshot_is_fresh(&words_path, &snapshot_path)? {
			let table = ProbabilityTable::load_snapshot(&snapshot_path)?;
			if table.width() == self.width {
				debug!("Loaded grammar snapshot {}", snapshot_path.display());
				return Ok(table);
			}
			debug!("Snapshot {} has width {}, retraining", snapshot_path.display(), table.width());
		}

		let table = self.train_file(&words_path)?;
		table.save_snapshot(&snapshot_path)?;
		Ok(table)
	}

	fn snapshot_is_fresh<P: AsRef<Path>, Q: AsRef<Path>>(words_path: P, snapshot_path: Q) -> Result<bool> {
		let snapshot_path = snapshot_path.as_ref();
		if !snapshot_path.exists() {
			return Ok(false);
		}
		let words_modified = std::fs::metadata(words_path)?.modified()?;
		let snapshot_modified = std::fs::metadata(snapshot_path)?.modified()?;
		Ok(snapshot_modified >= words_modified)
	}
}

/// Trains a probability table with the default smoothing and every core.
pub fn train(corpus: &[EncodedWord], width: usize) -> Result<ProbabilityTable> {
	GrammarTrainer::new(width)?.train(corpus)
}

fn count_chunk(words: &[EncodedWord], width: usize) -> Result<GrammarCounts> {
	let mut counts = GrammarCounts::new();
	for word in words {
		counts.observe(&word.segments(width)?);
	}
	Ok(counts)
}
