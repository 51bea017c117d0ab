//! Desugars interpolated string literals in Go source.
//!
//! `$"x={x}, y={y}"` becomes `"x=, y=", x, y`: the braces come out of the literal and their
//! contents are appended as trailing arguments, ready for a variadic formatting call. Everything
//! else (code, ordinary literals, comments) is copied through unchanged.
//!
//! The work is done in a single pass by [`Converter`], a small state machine over a character
//! stream (see [`LexState`]). Expressions are opaque text; the first `}` ends one, so braces
//! cannot nest inside an interpolation.

use std::io;

pub mod state;
pub mod support;
mod convert;

pub use convert::{Converter, ConvertError, ConvertOptions, Report, Unterminated};
pub use state::LexState;
pub use support::{CharDecoder, NextChar};

/// Converts UTF-8 text from `input` into `output`.
///
/// Unterminated literals at the end of input are tolerated; check [`Report::unterminated`].
pub fn convert<R: io::Read, W: io::Write>(input: R, output: W) -> Result<Report, ConvertError> {
	convert_with(input, output, ConvertOptions::default())
}

pub fn convert_with<R: io::Read, W: io::Write>(input: R, output: W, options: ConvertOptions)
-> Result<Report, ConvertError> {
	Converter::with_options(CharDecoder::new(input), output, options).run()
}

/// Converts an in-memory source.
pub fn convert_str(src: &str) -> Result<String, ConvertError> {
	let mut out = Vec::with_capacity(src.len());
	Converter::new(src.chars(), &mut out).run()?;
	String::from_utf8(out).map_err(|e| ConvertError::Write(e.to_string()))
}
