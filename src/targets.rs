//! Turns command-line paths into conversion targets.

use std::{
	ffi::OsStr,
	fs,
	path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extension given to every generated file.
pub const OUTPUT_EXTENSION: &str = "go";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	/// Standard input, converted to standard output
	Stdio,
	File {
		source: PathBuf,
		output: PathBuf,
	},
}

impl Target {
	pub fn for_source(source: PathBuf) -> Self {
		let output = source.with_extension(OUTPUT_EXTENSION);
		Self::File { source, output }
	}

	/// Where the input comes from, for diagnostics.
	pub fn source_path(&self) -> &Path {
		match self {
			Self::Stdio => Path::new("-"),
			Self::File { source, .. } => source,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
	#[error("error getting file info from {}: {message}", .path.display())]
	Stat {
		path: PathBuf,
		message: String,
	},
	#[error("wrong extension {found:?} for file {}; need .{expected}", .path.display())]
	WrongExtension {
		path: PathBuf,
		found: String,
		expected: String,
	},
	#[error("error walking {}: {message}", .path.display())]
	Walk {
		path: PathBuf,
		message: String,
	},
}

/// Expands one command-line argument.
///
/// `-` is stdin. A file must carry `extension`; a directory is walked recursively, picking up
/// files that carry it and skipping anything hidden.
pub fn expand(arg: &str, extension: &str) -> Vec<Result<Target, TargetError>> {
	if arg == "-" {
		return vec![Ok(Target::Stdio)];
	}

	let path = Path::new(arg);
	let meta = match fs::metadata(path) {
		Ok(m) => m,
		Err(e) => return vec![Err(TargetError::Stat {
			path: path.to_owned(),
			message: e.to_string(),
		})],
	};

	if !meta.is_dir() {
		if !has_extension(path, extension) {
			return vec![Err(TargetError::WrongExtension {
				path: path.to_owned(),
				found: path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default(),
				expected: extension.to_owned(),
			})];
		}
		return vec![Ok(Target::for_source(path.to_owned()))];
	}

	WalkDir::new(path)
		.sort_by_file_name()
		.into_iter()
		// the root itself may well be hidden (`.`, temp dirs); only prune below it
		.filter_entry(|e| e.depth() == 0 || !is_hidden(e))
		.filter_map(|entry| match entry {
			Ok(e) if e.file_type().is_file() && has_extension(e.path(), extension)
				=> Some(Ok(Target::for_source(e.into_path()))),
			Ok(_) => None,
			Err(e) => Some(Err(TargetError::Walk {
				path: e.path().unwrap_or(path).to_owned(),
				message: e.to_string(),
			})),
		})
		.collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
	path.extension() == Some(OsStr::new(extension))
}

// Dot entries hold VCS metadata, editor swap files and backups, never sources meant for
// generation; converting them would scatter stray `.go` files next to them.
fn is_hidden(entry: &DirEntry) -> bool {
	entry.file_name().to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}
