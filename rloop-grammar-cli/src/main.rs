use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rloop_grammar_core::RunConfig;
use rloop_grammar_core::model::merger::{ConflictPolicy, DictionaryMerger};
use rloop_grammar_core::model::scorer::{write_probabilities, LanguageScorer};
use rloop_grammar_core::model::{GrammarTrainer, ProbabilityTable, SymbolDictionary, WeightTable};

#[derive(Parser)]
#[command(name = "rloop-grammar")]
#[command(version)]
#[command(about = "Train, score and merge R-loop grammars", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

/// Parameters identifying the run, saved next to its output.
#[derive(Args)]
struct RunArgs {
	/// K-mer length (marker indices lie in [0, width))
	#[arg(short, long)]
	width: usize,

	/// Plasmid (or data set) identifier
	#[arg(long, default_value = "plasmid")]
	plasmid: String,

	/// Padding around the R-loop boundaries, in bases
	#[arg(long)]
	padding: Option<usize>,

	/// Run number
	#[arg(long, default_value = "0")]
	run: usize,
}

impl RunArgs {
	fn config(&self) -> Result<RunConfig, Box<dyn std::error::Error>> {
		let mut config = RunConfig::new(&self.plasmid, self.width)?.with_run_number(self.run);
		if let Some(padding) = self.padding {
			config = config.with_padding(padding);
		}
		Ok(config)
	}
}

/// Tie resolution of `merge`.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
	/// Precedence table over pairs of symbol classes
	Deterministic,
	/// Seeded uniform draw among the tied symbols
	Stochastic,
}

impl From<PolicyArg> for ConflictPolicy {
	fn from(policy: PolicyArg) -> Self {
		match policy {
			PolicyArg::Deterministic => ConflictPolicy::Deterministic,
			PolicyArg::Stochastic => ConflictPolicy::Stochastic,
		}
	}
}

#[derive(Subcommand)]
enum Commands {
	/// Train a probability table on a `label: word` file
	Train {
		/// Training words
		#[arg(short = 'i', long)]
		words: PathBuf,

		/// Output probability document (JSON)
		#[arg(short, long)]
		output: PathBuf,

		/// Number of counting threads (0 = all available cores)
		#[arg(short = 't', long, default_value = "0")]
		threads: usize,

		/// Ignore and overwrite the binary snapshot next to the words
		#[arg(long, default_value = "false")]
		retrain: bool,

		#[command(flatten)]
		run: RunArgs,
	},

	/// Score candidate words against a probability table
	Score {
		/// Probability document produced by `train` or `average`
		#[arg(short = 'p', long)]
		table: PathBuf,

		/// Candidate words, in candidate order
		#[arg(short = 'i', long)]
		words: PathBuf,

		/// Output file, one probability per line
		#[arg(short, long)]
		output: PathBuf,

		#[command(flatten)]
		run: RunArgs,
	},

	/// Merge two or more dictionaries with their weight tables
	Merge {
		/// Dictionary JSON files, in merge order
		#[arg(short, long = "dictionary", num_args = 2.., required = true)]
		dictionaries: Vec<PathBuf>,

		/// Weight table JSON files, one per dictionary
		#[arg(short = 'x', long = "weights", num_args = 2.., required = true)]
		weights: Vec<PathBuf>,

		/// Tie resolution
		#[arg(long, value_enum, default_value_t = PolicyArg::Deterministic)]
		policy: PolicyArg,

		/// Seed for the stochastic policy (drawn and saved when omitted)
		#[arg(long)]
		seed: Option<u64>,

		/// Output merged dictionary
		#[arg(short, long)]
		output: PathBuf,

		/// Output merged weight table
		#[arg(long)]
		weights_output: PathBuf,

		#[command(flatten)]
		run: RunArgs,
	},

	/// Average two probability tables of the same width
	Average {
		#[arg(long)]
		first: PathBuf,

		#[arg(long)]
		second: PathBuf,

		#[arg(short, long)]
		output: PathBuf,

		#[command(flatten)]
		run: RunArgs,
	},

	/// K-mers assigned to the same symbol by two dictionaries
	Intersect {
		#[arg(long)]
		first: PathBuf,

		#[arg(long)]
		second: PathBuf,

		#[arg(short, long)]
		output: PathBuf,

		#[command(flatten)]
		run: RunArgs,
	},
}

/// A file to write and the function writing it.
type Artifact<'a> = (PathBuf, Box<dyn FnOnce(&Path) -> rloop_grammar_core::Result<()> + 'a>);

/// Writes `artifacts` in order. If one fails, the ones already written are
/// removed, so a failed command leaves no output behind.
fn write_artifacts(artifacts: Vec<Artifact<'_>>) -> Result<(), Box<dyn std::error::Error>> {
	let mut written: Vec<PathBuf> = Vec::new();

	for (path, write) in artifacts {
		if let Err(err) = write(&path) {
			for path in &written {
				if let Err(remove_err) = fs::remove_file(path) {
					warn!("Could not remove {}: {}", path.display(), remove_err);
				}
			}
			return Err(err.into());
		}
		written.push(path);
	}

	Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let cli = Cli::parse();

	match cli.command {
		Commands::Train { words, output, threads, retrain, run } => {
			let config = run.config()?;
			let trainer = GrammarTrainer::new(config.width)?.with_workers(threads);
			let table = if retrain { trainer.train_file(&words)? } else { trainer.train_or_load(&words)? };

			write_artifacts(vec![
				(RunConfig::path_for(&output)?, Box::new(|path: &Path| config.save(path))),
				(output.clone(), Box::new(|path: &Path| table.save(path))),
			])?;
			info!("{}: probability table written to {}", config.run_label(), output.display());
		}

		Commands::Score { table, words, output, run } => {
			let config = run.config()?;
			let table = ProbabilityTable::load(&table, Some(config.width))?;
			let report = LanguageScorer::new(&table, config.width)?.score_file(&words)?;

			write_artifacts(vec![
				(RunConfig::path_for(&output)?, Box::new(|path: &Path| config.save(path))),
				(output.clone(), Box::new(|path: &Path| write_probabilities(path, &report.probabilities))),
			])?;
			info!("{}: {} probabilities written to {}", config.run_label(), report.probabilities.len(), output.display());
		}

		Commands::Merge { dictionaries, weights, policy, seed, output, weights_output, run } => {
			if dictionaries.len() != weights.len() {
				return Err(format!(
					"{} dictionaries but {} weight tables",
					dictionaries.len(),
					weights.len()
				)
				.into());
			}

			let policy = ConflictPolicy::from(policy);
			let mut config = run.config()?.with_policy(policy);
			if let Some(seed) = seed {
				config = config.with_seed(seed);
			}
			let seed = config.resolve_seed();

			let mut inputs = Vec::with_capacity(dictionaries.len());
			for (dictionary, weight_table) in dictionaries.iter().zip(&weights) {
				inputs.push((SymbolDictionary::load(dictionary)?, WeightTable::load(weight_table)?));
			}

			let outcome = DictionaryMerger::new(policy, seed).merge_all(&inputs)?;
			write_artifacts(vec![
				(weights_output.clone(), Box::new(|path: &Path| outcome.weights.save(path))),
				(RunConfig::path_for(&output)?, Box::new(|path: &Path| config.save(path))),
				(output.clone(), Box::new(|path: &Path| outcome.dictionary.save(path))),
			])?;

			for (rule, count) in &outcome.report.rules {
				info!("{}: {}", rule, count);
			}
			info!("{}: merged dictionary written to {}", config.run_label(), output.display());
		}

		Commands::Average { first, second, output, run } => {
			let config = run.config()?;
			let first = ProbabilityTable::load(&first, Some(config.width))?;
			let second = ProbabilityTable::load(&second, Some(config.width))?;
			let average = first.average(&second)?;

			write_artifacts(vec![
				(RunConfig::path_for(&output)?, Box::new(|path: &Path| config.save(path))),
				(output.clone(), Box::new(|path: &Path| average.save(path))),
			])?;
			info!("{}: averaged table written to {}", config.run_label(), output.display());
		}

		Commands::Intersect { first, second, output, run } => {
			let config = run.config()?;
			let intersection = SymbolDictionary::load(&first)?.intersect_symbols(&SymbolDictionary::load(&second)?);

			write_artifacts(vec![
				(RunConfig::path_for(&output)?, Box::new(|path: &Path| config.save(path))),
				(output.clone(), Box::new(|path: &Path| intersection.save(path))),
			])?;
			info!("{}: {} shared assignments written to {}", config.run_label(), intersection.len(), output.display());
		}
	}

	Ok(())
}
