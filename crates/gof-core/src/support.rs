use core::fmt;
use std::{convert::Infallible, fmt::Write, io};

mod char_decode;
pub use char_decode::{CharDecoder, DecodeError, Utf8Seq};

/// A read-once source of Unicode scalar values.
///
/// `Ok(None)` is end of input; it must be distinguishable from a failure, which is reported
/// through `Self::Error`.
pub trait NextChar {
	type Error;
	fn next_char(&mut self) -> Result<Option<char>, Self::Error>;
}

impl<'a> NextChar for std::str::Chars<'a> {
	type Error = Infallible;

	fn next_char(&mut self) -> Result<Option<char>, Self::Error> {
		Ok(self.next())
	}
}

impl<R: io::Read> NextChar for CharDecoder<R> {
	type Error = DecodeError;

	fn next_char(&mut self) -> Result<Option<char>, Self::Error> {
		self.read_next()
	}
}

impl<'a, T: NextChar + ?Sized> NextChar for &'a mut T {
	type Error = T::Error;

	fn next_char(&mut self) -> Result<Option<char>, Self::Error> {
		(**self).next_char()
	}
}


pub(crate) struct HexArray<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for HexArray<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_char('[')?;
		let mut show_comma = false;
		for &b in self.0 {
			if show_comma {
				f.write_str(", ")?;
			}
			show_comma = true;
			write!(f, "{:02x}", b)?;
		}
		f.write_char(']')
	}
}

impl<'a> fmt::Display for HexArray<'a> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		<Self as fmt::Debug>::fmt(self, f)
	}
}
