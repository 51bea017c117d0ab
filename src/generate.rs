//! Runs the converter over targets: files in, generated files out.

use std::{
	fs,
	io,
	path::{Path, PathBuf},
};

use gof_core::{ConvertError, ConvertOptions, Report};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::targets::{Target, TargetError};

/// First line of every generated file.
pub const BANNER: &str = "//Auto generated by gof; DO NOT EDIT\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
	#[error("{0}")]
	Target(#[from] TargetError),
	#[error("error opening file {}: {message}", .path.display())]
	Open {
		path: PathBuf,
		message: String,
	},
	#[error("error creating file {}: {message}", .path.display())]
	Create {
		path: PathBuf,
		message: String,
	},
	#[error("error converting {}: {error}", .path.display())]
	Convert {
		path: PathBuf,
		error: ConvertError,
	},
}

/// What to do with the remaining targets once one has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
	/// Stop at the first failure
	#[default]
	Abort,
	/// Convert everything that can be converted, then report
	Continue,
}

#[derive(Debug, Default)]
pub struct Summary {
	pub converted: usize,
	pub failures: Vec<GenerateError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
	pub banner: bool,
	pub options: ConvertOptions,
}

impl Default for Generator {
	fn default() -> Self {
		Self {
			banner: true,
			options: ConvertOptions::default(),
		}
	}
}

impl Generator {
	/// Converts a single target. A generated file that could not be completed is removed, and
	/// nothing reaches stdout unless the whole conversion succeeded.
	pub fn generate(&self, target: &Target) -> Result<Report, GenerateError> {
		let (source, output) = match target {
			Target::Stdio => {
				return self.staged(io::stdin().lock(), io::stdout().lock(), target.source_path());
			},
			Target::File { source, output } => (source, output),
		};

		let input = fs::File::open(source).map_err(|e| GenerateError::Open {
			path: source.clone(),
			message: e.to_string(),
		})?;
		let output_file = fs::File::create(output).map_err(|e| GenerateError::Create {
			path: output.clone(),
			message: e.to_string(),
		})?;

		let result = self.convert(input, output_file, source);
		if result.is_err() {
			match fs::remove_file(output) {
				Ok(()) => debug!(output = %output.display(), "removed incomplete output"),
				Err(e) => warn!(output = %output.display(), "could not remove incomplete output: {}", e),
			}
		}
		result
	}

	/// Converts into memory and only then copies the result to `sink`.
	fn staged<R, W>(&self, input: R, mut sink: W, source: &Path) -> Result<Report, GenerateError>
	where R: io::Read, W: io::Write {
		let mut buf = Vec::new();
		let report = self.convert(input, &mut buf, source)?;
		sink.write_all(&buf)
			.and_then(|()| sink.flush())
			.map_err(|e| GenerateError::Convert {
				path: source.to_owned(),
				error: ConvertError::Write(e.to_string()),
			})?;
		Ok(report)
	}

	fn convert<R, W>(&self, input: R, mut output: W, source: &Path) -> Result<Report, GenerateError>
	where R: io::Read, W: io::Write {
		let convert_error = |error| GenerateError::Convert { path: source.to_owned(), error };

		if self.banner {
			output.write_all(BANNER.as_bytes())
				.map_err(|e| convert_error(ConvertError::Write(e.to_string())))?;
		}
		gof_core::convert_with(input, output, self.options).map_err(convert_error)
	}
}

/// Generates every target in order, applying `policy` to failures. Each failure is logged as it
/// happens and kept in the summary.
pub fn run_all<I>(generator: &Generator, targets: I, policy: FailurePolicy) -> Summary
where I: IntoIterator<Item = Result<Target, TargetError>> {
	let mut summary = Summary::default();

	for target in targets {
		let result = target.map_err(GenerateError::from).and_then(|target| {
			let report = generator.generate(&target)?;
			log_report(&target, &report);
			Ok(report)
		});

		if let Err(e) = result {
			error!("{}", e);
			summary.failures.push(e);
			if policy == FailurePolicy::Abort {
				break;
			}
			continue;
		}
		summary.converted += 1;
	}

	summary
}

fn log_report(target: &Target, report: &Report) {
	let source = target.source_path().display();
	if let Some(open) = report.unterminated {
		warn!(source = %source, "input ended early: {}", open);
	}
	match target {
		Target::File { output, .. } => info!(
			source = %source,
			output = %output.display(),
			format_strings = report.format_strings,
			arguments = report.arguments,
			"generated"),
		Target::Stdio => debug!(
			format_strings = report.format_strings,
			arguments = report.arguments,
			"converted stdin"),
	}
}
