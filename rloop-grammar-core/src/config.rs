use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, Result};
use crate::io::{read_json, write_json};
use crate::model::merger::ConflictPolicy;

/// Explicit parameters of one run.
///
/// A run is one (plasmid, padding, width, run number) combination. The
/// configuration is saved next to the run's output so that its results,
/// including stochastic merges, can be reproduced.
///
/// # Invariants
/// - `width >= 1`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunConfig {
	pub plasmid: String,
	pub width: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub padding: Option<usize>,
	#[serde(default)]
	pub run_number: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub seed: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub policy: Option<ConflictPolicy>,
}

impl RunConfig {
	/// # Errors
	/// `InvalidWidth` if `width == 0`.
	pub fn new(plasmid: &str, width: usize) -> Result<Self> {
		if width == 0 {
			return Err(GrammarError::InvalidWidth(width));
		}
		Ok(Self {
			plasmid: plasmid.to_owned(),
			width,
			padding: None,
			run_number: 0,
			seed: None,
			policy: None,
		})
	}

	pub fn with_padding(mut self, padding: usize) -> Self {
		self.padding = Some(padding);
		self
	}

	pub fn with_run_number(mut self, run_number: usize) -> Self {
		self.run_number = run_number;
		self
	}

	pub fn with_seed(mut self, seed: u64) -> Self {
		self.seed = Some(seed);
		self
	}

	pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
		self.policy = Some(policy);
		self
	}

	/// Returns the configured seed, drawing and recording a fresh one when
	/// none is set.
	pub fn resolve_seed(&mut self) -> u64 {
		*self.seed.get_or_insert_with(|| rand::rng().random())
	}

	/// `<plasmid>_p<padding>_w<width>_<run>`, without the padding part when
	/// no padding is set.
	pub fn run_label(&self) -> String {
		match self.padding {
			Some(padding) => format!("{}_p{}_w{}_{}", self.plasmid, padding, self.width, self.run_number),
			None => format!("{}_w{}_{}", self.plasmid, self.width, self.run_number),
		}
	}

	/// Where the configuration of the run writing `output` is saved:
	/// `<output stem>.run.json` in the same directory.
	pub fn path_for<P: AsRef<Path>>(output: P) -> Result<PathBuf> {
		let output = output.as_ref();
		let stem = output
			.file_stem()
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Output path has no filename"))?;
		Ok(output.with_file_name(format!("{}.run.json", stem.to_string_lossy())))
	}

	/// Writes the configuration as JSON, atomically.
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		write_json(path, self)
	}

	/// Reads a configuration written by [`RunConfig::save`].
	///
	/// # Errors
	/// `InvalidWidth` if the stored width is 0.
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		let config: Self = read_json(path)?;
		if config.width == 0 {
			return Err(GrammarError::InvalidWidth(config.width));
		}
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_zero_width_is_rejected() {
		assert!(matches!(RunConfig::new("pFC53", 0), Err(GrammarError::InvalidWidth(0))));
	}

	#[test]
	fn test_run_label() {
		let config = RunConfig::new("pFC53", 4).unwrap().with_run_number(2);
		assert_eq!(config.run_label(), "pFC53_w4_2");
		assert_eq!(config.with_padding(500).run_label(), "pFC53_p500_w4_2");
	}

	#[test]
	fn test_resolve_seed_is_recorded() {
		let mut config = RunConfig::new("pFC8", 3).unwrap();
		let seed = config.resolve_seed();
		assert_eq!(config.seed, Some(seed));
		assert_eq!(config.resolve_seed(), seed);

		let mut fixed = RunConfig::new("pFC8", 3).unwrap().with_seed(17);
		assert_eq!(fixed.resolve_seed(), 17);
	}

	#[test]
	fn test_path_for_sits_next_to_output() {
		let path = RunConfig::path_for("runs/pFC53_w4_scores.txt").unwrap();
		assert_eq!(path, PathBuf::from("runs/pFC53_w4_scores.run.json"));
	}

	#[test]
	fn test_save_and_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("merge.run.json");
		let config = RunConfig::new("union", 4)
			.unwrap()
			.with_padding(1000)
			.with_seed(99)
			.with_policy(ConflictPolicy::Stochastic);

		config.save(&path).unwrap();
		let text = std::fs::read_to_string(&path).unwrap();
		assert!(text.contains("\"policy\": \"stochastic\""));
		assert_eq!(RunConfig::load(&path).unwrap(), config);
	}
}
