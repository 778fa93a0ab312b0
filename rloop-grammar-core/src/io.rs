use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::Result;

/// Reads a text file and returns all its lines as a `Vec<String>`.
///
/// - Reads the entire file into memory
/// - Splits on `\n` / `\r\n`
pub(crate) fn read_file<P: AsRef<Path>>(filename: P) -> io::Result<Vec<String>> {
	let mut contents = String::new();
	File::open(filename)?.read_to_string(&mut contents)?;
	Ok(contents.lines().map(str::to_owned).collect())
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `runs/words.txt` + `"bin"` → `runs/words.bin`
pub(crate) fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Writes a file atomically.
///
/// The content is produced into a temporary file created in the destination
/// directory, then renamed onto `path`. A failing `write` leaves no partial
/// artifact behind.
pub(crate) fn write_atomic<P, F>(path: P, write: F) -> Result<()>
where
	P: AsRef<Path>,
	F: FnOnce(&mut BufWriter<&NamedTempFile>) -> Result<()>,
{
	let path = path.as_ref();
	let parent = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	std::fs::create_dir_all(parent)?;

	let temp_file = NamedTempFile::new_in(parent)?;
	{
		let mut writer = BufWriter::new(&temp_file);
		write(&mut writer)?;
		writer.flush()?;
	}
	temp_file.persist(path).map_err(|err| err.error)?;
	Ok(())
}

/// Serializes `value` as pretty-printed JSON into `path`, atomically.
pub(crate) fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
	write_atomic(path, |writer| {
		serde_json::to_writer_pretty(&mut *writer, value)?;
		writer.write_all(b"\n")?;
		Ok(())
	})
}

pub(crate) fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
	let reader = BufReader::new(File::open(path)?);
	Ok(serde_json::from_reader(reader)?)
}

/// Writes a compact `postcard` snapshot of `value` into `path`, atomically.
pub(crate) fn write_snapshot<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
	let bytes = postcard::to_stdvec(value)?;
	write_atomic(path, |writer| {
		writer.write_all(&bytes)?;
		Ok(())
	})
}

pub(crate) fn read_snapshot<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
	let bytes = std::fs::read(path)?;
	Ok(postcard::from_bytes(&bytes)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	#[test]
	fn test_build_output_path_swaps_extension() {
		let path = build_output_path("runs/pfc53_w4_words.txt", "bin").unwrap();
		assert_eq!(path, PathBuf::from("runs/pfc53_w4_words.bin"));
	}

	#[test]
	fn test_json_round_trip_through_atomic_write() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nested").join("weights.json");

		let mut value = BTreeMap::new();
		value.insert("AAAA".to_owned(), 0.5);
		write_json(&path, &value).unwrap();

		let back: BTreeMap<String, f64> = read_json(&path).unwrap();
		assert_eq!(back, value);
	}

	#[test]
	fn test_failed_write_leaves_no_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.txt");

		let result = write_atomic(&path, |writer| {
			writer.write_all(b"partial")?;
			Err(crate::error::GrammarError::EmptyCorpus)
		});

		assert!(result.is_err());
		assert!(!path.exists());
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}
}
