//! Lexical state shared by every part of the converter.

use std::fmt;

/// Which lexical construct currently owns the incoming characters.
///
/// The machine has no stack: every state other than [`LexState::Code`] hands control back to
/// `Code` when it closes, and is only ever entered from `Code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexState {
	/// Plain host-language code, outside any literal or comment
	#[default]
	Code,

	/// Inside a `"…"` literal
	StringLiteral,

	/// Inside a `` `…` `` raw literal; no escapes apply
	MultilineStringLiteral,

	/// Inside a `'…'` literal
	RuneLiteral,

	/// After `//`, up to the end of the line
	LineComment,

	/// Between `/*` and `*/`
	BlockComment,

	/// Inside a `$"…"` interpolated literal
	FormatString,
}

impl LexState {
	/// Human-readable name of the construct, for diagnostics.
	pub fn describe(self) -> &'static str {
		match self {
			Self::Code => "code",
			Self::StringLiteral => "string literal",
			Self::MultilineStringLiteral => "raw string literal",
			Self::RuneLiteral => "rune literal",
			Self::LineComment => "line comment",
			Self::BlockComment => "block comment",
			Self::FormatString => "format string",
		}
	}

	/// Whether running out of input in this state leaves something open that needed closing.
	///
	/// Line comments end at end-of-line *or* end of input, so they never count.
	pub fn needs_closing(self) -> bool {
		!matches!(self, Self::Code | Self::LineComment)
	}
}

impl fmt::Display for LexState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.describe())
	}
}

/// One-character lookback for the two-character triggers `//`, `/*` and `$"`.
///
/// A marker is held back from the output until the next character decides what it was. A bare
/// `*` never needs holding, since it can only *finish* a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingMarker {
	/// Previous character was not held back
	#[default]
	None,

	/// Previous character was `/`
	Slash,

	/// Previous character was `$`
	Dollar,
}

impl PendingMarker {
	/// The held-back character, if any.
	pub fn as_char(self) -> Option<char> {
		match self {
			Self::None => None,
			Self::Slash => Some('/'),
			Self::Dollar => Some('$'),
		}
	}
}
