use std::borrow::Cow;

use gof_core::{ConvertError, ConvertOptions};
use gumdrop::Options;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub mod generate;
pub mod targets;

use generate::{FailurePolicy, GenerateError, Generator};
use targets::{TargetError, OUTPUT_EXTENSION};

#[derive(Debug, Options)]
struct Args {

	#[options(free, help = "files or directories to convert ('-' converts stdin to stdout)")]
	paths: Vec<String>,

	#[options(help = "source file extension to look for", meta = "EXT", default = "gof")]
	extension: String,

	#[options(no_short, help = "do not write the generated-code banner")]
	no_banner: bool,

	#[options(help = "keep converting the remaining files after a failure")]
	keep_going: bool,

	#[options(help = "reject sources that end inside a literal or block comment")]
	strict: bool,

	#[options(help = "log conversion details")]
	verbose: bool,

	#[options(help = "show this help")]
	help: bool,
}

impl Args {
	fn print_usage_and_exit(process_name: &str) -> ! {
		eprintln!("Usage: {} [OPTIONS] PATH...\n", process_name);
		eprintln!("Converts .gof sources into .go files next to them.\n");
		eprintln!("{}", Args::usage());
		std::process::exit(ExitCode::Success.into());
	}
}

#[repr(i32)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ExitCode {
	Success = 0,
	IoError = 2,
	CliArgError = 3,
	InvalidData = 4,
}

impl From<ExitCode> for i32 {
	fn from(src: ExitCode) -> Self {
		src as i32
	}
}

impl From<&GenerateError> for ExitCode {
	fn from(e: &GenerateError) -> Self {
		match e {
			GenerateError::Target(TargetError::WrongExtension { .. }) => ExitCode::CliArgError,
			GenerateError::Target(_)
			| GenerateError::Open { .. }
			| GenerateError::Create { .. } => ExitCode::IoError,
			GenerateError::Convert { error, .. } => match error {
				ConvertError::Read(_) | ConvertError::Write(_) => ExitCode::IoError,
				ConvertError::InvalidUtf8 { .. } | ConvertError::Unterminated(_) => ExitCode::InvalidData,
			},
		}
	}
}


trait HelpExt: Eq + PartialEq<str> {
	fn is_help(&self) -> bool {
		["help", "-h", "--help", "-help"].into_iter().any(|help| self == help)
	}
}
impl HelpExt for str {}


fn main() {
	let (process, args_str) = {
		let mut iter = std::env::args();
		let process = iter.next().map(Cow::Owned).unwrap_or(
			Cow::Borrowed(env!("CARGO_PKG_NAME"))
		);
		(process, iter.collect::<Vec<_>>())
	};
	if matches!(*args_str, [ref s] if s.is_help()) {
		Args::print_usage_and_exit(&process);
	}
	let args = match Args::parse_args_default(&args_str) {
		Ok(a) if a.help => Args::print_usage_and_exit(&process),
		Ok(a) => a,
		Err(e) => {
			eprintln!("argument error: {}", e);
			eprintln!("run `{} help` for usage guidelines", process);
			std::process::exit(ExitCode::CliArgError.into());
		}
	};

	let extension = args.extension.trim_start_matches('.').to_owned();
	if args.paths.is_empty() {
		eprintln!("argument error: specify at least one file or directory with .{} files to convert",
			extension);
		std::process::exit(ExitCode::CliArgError.into());
	}
	if extension.is_empty() || extension == OUTPUT_EXTENSION {
		eprintln!("argument error: source extension must be non-empty and not .{}", OUTPUT_EXTENSION);
		std::process::exit(ExitCode::CliArgError.into());
	}

	init_logging(args.verbose);

	let generator = Generator {
		banner: !args.no_banner,
		options: ConvertOptions { strict: args.strict },
	};
	let policy = match args.keep_going {
		true => FailurePolicy::Continue,
		false => FailurePolicy::Abort,
	};
	let targets = args.paths.iter()
		.flat_map(|path| targets::expand(path, &extension));

	let summary = generate::run_all(&generator, targets, policy);

	if summary.converted == 0 && summary.failures.is_empty() {
		warn!("no .{} files found", extension);
	}

	std::process::exit(match summary.failures.first() {
		Some(e) => ExitCode::from(e).into(),
		None => ExitCode::Success.into(),
	});
}

/// Logs go to stderr, so `-` can stream converted code on stdout. `RUST_LOG` overrides the
/// default filter.
fn init_logging(verbose: bool) {
	let default_filter = match verbose {
		true => "gof=debug,gof_core=debug",
		false => "gof=info",
	};
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| EnvFilter::new(default_filter)))
		.with_writer(std::io::stderr)
		.with_target(false)
		.without_time()
		.init();
}
