//! The desugaring state machine.
//!
//! Each [`LexState`] has one method here that owns the input until it sees its way out, then
//! names the next state (or `None` once the input is exhausted). [`Converter::run`] is the only
//! place transitions happen.

use std::convert::Infallible;
use std::io::{self, BufWriter, Write as _};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
	state::{LexState, PendingMarker},
	support::{DecodeError, HexArray, NextChar, Utf8Seq},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
	#[error("read error: {0}")]
	Read(String),
	#[error("invalid UTF-8 sequence {} at byte {}", HexArray(.bytes), .start_pos)]
	InvalidUtf8 {
		start_pos: u64,
		bytes: Utf8Seq,
	},
	#[error("write error: {0}")]
	Write(String),
	#[error("{0}")]
	Unterminated(Unterminated),
}

impl From<DecodeError> for ConvertError {
	fn from(e: DecodeError) -> Self {
		match e {
			DecodeError::Io(msg) => Self::Read(msg),
			DecodeError::InvalidUtf8 { start_pos, bytes } => Self::InvalidUtf8 { start_pos, bytes },
		}
	}
}

impl From<Infallible> for ConvertError {
	fn from(e: Infallible) -> Self {
		match e {}
	}
}

fn write_error(e: io::Error) -> ConvertError {
	ConvertError::Write(e.to_string())
}

/// A literal or comment that was still open when the input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unterminated {construct} starting on line {line}")]
pub struct Unterminated {
	pub construct: LexState,
	/// 1-based line of the opening delimiter
	pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertOptions {
	/// Fail with [`ConvertError::Unterminated`] instead of stopping quietly when the input ends
	/// inside a literal or block comment.
	pub strict: bool,
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Report {
	/// Number of `$"…"` literals desugared
	pub format_strings: usize,
	/// Number of `{…}` expressions moved into argument lists
	pub arguments: usize,
	/// Number of input lines; a final line without a newline still counts
	pub lines: u32,
	/// What was left open at end of input, in lenient mode
	pub unterminated: Option<Unterminated>,
}

type Step = Result<Option<LexState>, ConvertError>;

/// A single-use converter from one character source to one byte sink.
pub struct Converter<I, O: io::Write> {
	input: I,
	output: BufWriter<O>,
	options: ConvertOptions,
	line: u32,
	opened_on: u32,
	last: Option<char>,
	report: Report,
}

static_assertions::assert_impl_all!(
	Converter<crate::support::CharDecoder<std::fs::File>, std::fs::File>: Send);

impl<I, O> Converter<I, O>
where I: NextChar, ConvertError: From<I::Error>, O: io::Write {
	pub fn new(input: I, output: O) -> Self {
		Self::with_options(input, output, ConvertOptions::default())
	}

	pub fn with_options(input: I, output: O, options: ConvertOptions) -> Self {
		Self {
			input,
			output: BufWriter::new(output),
			options,
			line: 1,
			opened_on: 1,
			last: None,
			report: Report::default(),
		}
	}

	/// Drains the input, writing the converted text, and flushes the output once at the end.
	///
	/// On failure the output still held in the buffer is dropped. Input longer than the buffer
	/// may already have written its converted prefix to the sink; callers that need all or
	/// nothing must stage the output themselves.
	pub fn run(mut self) -> Result<Report, ConvertError> {
		if let Err(e) = self.drive() {
			// discard rather than flush-on-drop
			let _ = self.output.into_parts();
			return Err(e);
		}

		self.output.flush().map_err(write_error)?;
		self.report.lines = match self.last {
			Some(ch) if ch != '\n' => self.line,
			_ => self.line - 1,
		};
		debug!(
			format_strings = self.report.format_strings,
			arguments = self.report.arguments,
			lines = self.report.lines,
			"conversion finished");
		Ok(self.report)
	}

	fn drive(&mut self) -> Result<(), ConvertError> {
		let mut state = LexState::Code;
		loop {
			let next = match state {
				LexState::Code => self.code(),
				LexState::StringLiteral => self.quoted('"'),
				LexState::MultilineStringLiteral => self.raw_string(),
				LexState::RuneLiteral => self.quoted('\''),
				LexState::LineComment => self.line_comment(),
				LexState::BlockComment => self.block_comment(),
				LexState::FormatString => self.format_string(),
			}?;

			match next {
				Some(next) => {
					trace!(from = %state, to = %next, line = self.line, "transition");
					self.opened_on = self.line;
					state = next;
				},
				None => break,
			}
		}

		if state.needs_closing() {
			let open = Unterminated { construct: state, line: self.opened_on };
			if self.options.strict {
				return Err(ConvertError::Unterminated(open));
			}
			debug!(%open, "input ended early");
			self.report.unterminated = Some(open);
		}
		Ok(())
	}

	fn read(&mut self) -> Result<Option<char>, ConvertError> {
		let ch = self.input.next_char()?;
		if ch == Some('\n') {
			self.line += 1;
		}
		if ch.is_some() {
			self.last = ch;
		}
		Ok(ch)
	}

	fn put(&mut self, ch: char) -> Result<(), ConvertError> {
		let mut utf8_buf = [0u8; 4];
		self.put_str(ch.encode_utf8(&mut utf8_buf))
	}

	fn put_str(&mut self, s: &str) -> Result<(), ConvertError> {
		self.output.write_all(s.as_bytes()).map_err(write_error)
	}

	fn put_marker(&mut self, marker: PendingMarker) -> Result<(), ConvertError> {
		match marker.as_char() {
			Some(ch) => self.put(ch),
			None => Ok(()),
		}
	}

	fn code(&mut self) -> Step {
		let mut pending = PendingMarker::None;

		while let Some(ch) = self.read()? {
			let next = match (ch, pending) {
				// marker consumed: `$` is dropped, `/` is rewritten by the comment state
				('"', PendingMarker::Dollar) => LexState::FormatString,
				('/', PendingMarker::Slash) => LexState::LineComment,
				('*', PendingMarker::Slash) => LexState::BlockComment,

				('/', _) | ('$', _) => {
					self.put_marker(pending)?;
					pending = if ch == '/' { PendingMarker::Slash } else { PendingMarker::Dollar };
					continue;
				},

				(_, _) => {
					self.put_marker(pending)?;
					pending = PendingMarker::None;
					match ch {
						'"' => LexState::StringLiteral,
						'`' => LexState::MultilineStringLiteral,
						'\'' => LexState::RuneLiteral,
						_ => {
							self.put(ch)?;
							continue;
						},
					}
				},
			};
			return Ok(Some(next));
		}

		self.put_marker(pending)?;
		Ok(None)
	}

	/// String and rune literals. A backslash is held until the next character, and both are
	/// written together, so `\\` and an escaped delimiter never end the literal.
	fn quoted(&mut self, delim: char) -> Step {
		self.put(delim)?;
		let mut escaped = false;

		while let Some(ch) = self.read()? {
			match (ch, escaped) {
				('\\', false) => escaped = true,
				(_, true) => {
					self.put('\\')?;
					self.put(ch)?;
					escaped = false;
				},
				_ if ch == delim => {
					self.put(ch)?;
					return Ok(Some(LexState::Code));
				},
				_ => self.put(ch)?,
			}
		}

		if escaped {
			self.put('\\')?;
		}
		Ok(None)
	}

	fn raw_string(&mut self) -> Step {
		self.put('`')?;
		while let Some(ch) = self.read()? {
			self.put(ch)?;
			if ch == '`' {
				return Ok(Some(LexState::Code));
			}
		}
		Ok(None)
	}

	fn line_comment(&mut self) -> Step {
		self.put_str("//")?;
		while let Some(ch) = self.read()? {
			self.put(ch)?;
			if ch == '\n' {
				return Ok(Some(LexState::Code));
			}
		}
		Ok(None)
	}

	fn block_comment(&mut self) -> Step {
		self.put_str("/*")?;
		// the opener's `*` doesn't count: `/*/` is still open
		let mut after_star = false;
		while let Some(ch) = self.read()? {
			self.put(ch)?;
			if ch == '/' && after_star {
				return Ok(Some(LexState::Code));
			}
			after_star = ch == '*';
		}
		Ok(None)
	}

	/// `$"a{x}b{y}"` becomes `"ab", x, y`.
	fn format_string(&mut self) -> Step {
		self.put('"')?;
		let mut expressions: Vec<String> = Vec::new();
		let mut escaped = false;

		while let Some(ch) = self.read()? {
			match (ch, escaped) {
				('\\', false) => escaped = true,
				('{' | '}', true) => {
					self.put(ch)?;
					escaped = false;
				},
				(_, true) => {
					self.put('\\')?;
					self.put(ch)?;
					escaped = false;
				},
				('{', false) => match self.capture_expression()? {
					Some(expr) => expressions.push(expr),
					None => return Ok(None),
				},
				('"', false) => {
					self.put('"')?;
					for expr in &expressions {
						self.put_str(", ")?;
						self.put_str(expr)?;
					}
					self.report.format_strings += 1;
					self.report.arguments += expressions.len();
					return Ok(Some(LexState::Code));
				},
				_ => self.put(ch)?,
			}
		}

		if escaped {
			self.put('\\')?;
		}
		Ok(None)
	}

	/// Everything up to the next `}`, verbatim. No nesting, no escapes.
	fn capture_expression(&mut self) -> Result<Option<String>, ConvertError> {
		let mut expr = String::new();
		while let Some(ch) = self.read()? {
			if ch == '}' {
				return Ok(Some(expr));
			}
			expr.push(ch);
		}
		Ok(None)
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	use crate::support::CharDecoder;

	#[test]
	fn plain_code() {
		for src in [
			"package main\n\nfunc main() {}\n",
			"x := a * b - c",
			"p := *ptr",
			"if a/b > 1 { return }",
			"cost$ := 1",
			"a $ b",
			"x /",
			"y $",
		] {
			assert_output(src, src);
		}
	}

	#[test]
	fn stale_markers() {
		assert_output("a$/b", "a$/b");
		assert_output("a$*b", "a$*b");
		assert_output("a/$b", "a/$b");
		assert_output("$$\"x\"", "$\"x\"");
		assert_output("$//c\n", "$//c\n");
		assert_output("x/\"s\"", "x/\"s\"");
		assert_output("$'r'", "$'r'");
		assert_output("$`r`", "$`r`");
	}

	#[test]
	fn string_literals() {
		assert_output("s := \"abc\"", "s := \"abc\"");
		assert_output("\"a\\\"b\"", "\"a\\\"b\"");
		assert_output("\"a\\\\b\"", "\"a\\\\b\"");
		assert_output("\"a\\\\\" + x", "\"a\\\\\" + x");
		assert_output("\"tab\\tnl\\n\"", "\"tab\\tnl\\n\"");
		assert_output("\"{x} // not a comment\"", "\"{x} // not a comment\"");
		assert_output("\"$\\\"{x}\\\"\"", "\"$\\\"{x}\\\"\"");
	}

	#[test]
	fn rune_literals() {
		assert_output("'a'", "'a'");
		assert_output("'\\''", "'\\''");
		assert_output("'\\\\'", "'\\\\'");
		assert_output("'\"' + x", "'\"' + x");
	}

	#[test]
	fn raw_strings() {
		assert_output("`a\"b'c`", "`a\"b'c`");
		assert_output("`C:\\path\\`", "`C:\\path\\`");
		assert_output("`{x}\n$\"{y}\"`", "`{x}\n$\"{y}\"`");
	}

	#[test]
	fn comments() {
		assert_output("// line {not interpolated}\n", "// line {not interpolated}\n");
		assert_output("/* block */", "/* block */");
		assert_output("/* a * b / c **/x", "/* a * b / c **/x");
		assert_output("/*/ still open */y", "/*/ still open */y");
		assert_output("a/*b*/c", "a/*b*/c");
		assert_output("// $\"{x}\"\nz := $\"{x}\"", "// $\"{x}\"\nz := \"\", x");
		assert_output("/* \"quoted */ x", "/* \"quoted */ x");
	}

	#[test]
	fn format_strings() {
		assert_output("$\"x={x}\"", "\"x=\", x");
		assert_output("$\"{a}-{b}\"", "\"-\", a, b");
		assert_output("$\"no args\"", "\"no args\"");
		assert_output(
			"fmt.Printf($\"%d apples for %s\\n{n}{who}\")",
			"fmt.Printf(\"%d apples for %s\\n\", n, who)");
		assert_output("$\"h\u{e9}llo %v{\u{540d}\u{524d}}\"", "\"h\u{e9}llo %v\", \u{540d}\u{524d}");
	}

	#[test]
	fn format_string_escapes() {
		assert_output("$\"\\{a\\}\"", "\"{a}\"");
		assert_output("$\"a\\\"b{c}\"", "\"a\\\"b\", c");
		assert_output("$\"\\\\{c}\"", "\"\\\\\", c");
		assert_output("$\"\\t{c}\"", "\"\\t\", c");
		assert_output("$\"a}b\"", "\"a}b\"");
	}

	#[test]
	fn expressions_are_opaque() {
		assert_output("$\"%v{m[\"k\"]}\"", "\"%v\", m[\"k\"]");
		assert_output("$\"%v{'\\''}\"", "\"%v\", '\\''");
		assert_output("$\"%v{ a + b }\"", "\"%v\",  a + b ");
	}

	#[test]
	fn expression_capture_does_not_nest() {
		assert_output("$\"{f(struct{}{})}\"", "\")}\", f(struct{, ");
	}

	#[test]
	fn adjacent_constructs() {
		assert_output(
			"a := $\"{x}\" + \"y\" // c\nb := '$'",
			"a := \"\", x + \"y\" // c\nb := '$'");
		assert_output("f($\"{a}\", $\"{b}\")", "f(\"\", a, \"\", b)");
	}

	#[test]
	fn truncated() {
		assert_output("\"abc", "\"abc");
		assert_output("\"ab\\", "\"ab\\");
		assert_output("'a", "'a");
		assert_output("`abc", "`abc");
		assert_output("/* abc", "/* abc");
		assert_output("// abc", "// abc");
		assert_output("$\"abc", "\"abc");
		assert_output("$\"abc{x", "\"abc");
	}

	#[test]
	fn report_counts() {
		let report = run("a\n$\"{x}{y}\"\n$\"z\"\n", ConvertOptions::default()).unwrap().1;
		assert_eq!(Report {
			format_strings: 2,
			arguments: 2,
			lines: 3,
			unterminated: None,
		}, report);
	}

	#[test]
	fn line_count() {
		for (src, lines) in [
			("", 0),
			("\n", 1),
			("a", 1),
			("a\nb", 2),
			("a\nb\n", 2),
			("a\nb\nc\n", 3),
			("`\n\n", 2),
		] {
			let report = run(src, ConvertOptions::default()).unwrap().1;
			assert_eq!(lines, report.lines, "src: {:?}", src);
		}
	}

	#[test]
	fn lenient_reports_unterminated() {
		for (src, construct, line) in [
			("a\nb\n\"xyz", LexState::StringLiteral, 3),
			("'", LexState::RuneLiteral, 1),
			("`\n\n", LexState::MultilineStringLiteral, 1),
			("x\n/* never\nclosed", LexState::BlockComment, 2),
			("\n$\"{x", LexState::FormatString, 2),
		] {
			let report = run(src, ConvertOptions::default()).unwrap().1;
			assert_eq!(Some(Unterminated { construct, line }), report.unterminated, "src: {:?}", src);
		}
	}

	#[test]
	fn strict_rejects_unterminated() {
		let strict = ConvertOptions { strict: true };
		assert_eq!(
			Err(ConvertError::Unterminated(Unterminated { construct: LexState::BlockComment, line: 2 })),
			run("x\n/* never", strict));
		assert_eq!(
			"unterminated block comment starting on line 2",
			run("x\n/* never", strict).unwrap_err().to_string());
	}

	#[test]
	fn strict_accepts_closed_input() {
		let strict = ConvertOptions { strict: true };
		assert_eq!("\"\", x // done", run("$\"{x}\" // done", strict).unwrap().0);
	}

	#[test]
	fn from_bytes() {
		let mut out = Vec::new();
		let report = crate::convert("v := $\"{x}\"".as_bytes(), &mut out).unwrap();
		assert_eq!(b"v := \"\", x", &*out);
		assert_eq!(1, report.arguments);
	}

	#[test]
	fn invalid_utf8() {
		let mut out = Vec::new();
		let err = crate::convert(&b"ok \xff"[..], &mut out).unwrap_err();
		assert_eq!(ConvertError::InvalidUtf8 { start_pos: 3, bytes: [0xff].into_iter().collect() }, err);
		assert!(out.is_empty(), "partial output leaked: {:?}", out);
	}

	#[test]
	fn invalid_utf8_past_the_output_buffer() {
		let mut src = vec![b'x'; 20_000];
		src.push(0xff);

		let mut out = Vec::new();
		let err = crate::convert(&src[..], &mut out).unwrap_err();

		assert_eq!(ConvertError::InvalidUtf8 { start_pos: 20_000, bytes: [0xff].into_iter().collect() }, err);
		assert!(out.len() < 20_000, "whole input reached the sink");
		assert!(out.iter().all(|&b| b == b'x'));
	}

	#[test]
	fn read_failure_discards_output() {
		struct Unplugged<'a>(&'a [u8]);

		impl<'a> io::Read for Unplugged<'a> {
			fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
				if self.0.is_empty() {
					return Err(io::Error::new(io::ErrorKind::Other, "unplugged"));
				}
				io::Read::read(&mut self.0, buf)
			}
		}

		let mut out = Vec::new();
		let result = Converter::new(CharDecoder::new(Unplugged(b"abc")), &mut out).run();
		assert_eq!(Err(ConvertError::Read("unplugged".into())), result);
		assert!(out.is_empty());
	}

	#[test]
	fn write_failure() {
		struct Full;

		impl io::Write for Full {
			fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
				Err(io::Error::new(io::ErrorKind::Other, "device full"))
			}

			fn flush(&mut self) -> io::Result<()> {
				Ok(())
			}
		}

		let result = Converter::new("x := 1".chars(), Full).run();
		assert_eq!(Err(ConvertError::Write("device full".into())), result);
	}

	fn run(src: &str, options: ConvertOptions) -> Result<(String, Report), ConvertError> {
		let mut out = Vec::new();
		let report = Converter::with_options(src.chars(), &mut out, options).run()?;
		Ok((String::from_utf8(out).unwrap(), report))
	}

	#[track_caller]
	fn assert_output(input: &str, output: &str) {
		let got = crate::convert_str(input).unwrap();

		if got != output {
			panic!("conversion failed\n\ninput:   `{}`\nexpected `{}`\nbut got: `{}`\n",
				input.escape_debug(), output.escape_debug(), got.escape_debug());
		}
	}
}
