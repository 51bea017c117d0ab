#![allow(clippy::unusual_byte_groupings)]
//! UTF-8 decoding over byte streams.

use std::{
	io,
	num::NonZeroUsize,
	ops::ControlFlow,
};

use arrayvec::ArrayVec;
use nonzero_ext::nonzero;
use thiserror::Error;

use super::HexArray;

/// The bytes of a single UTF-8 sequence (or the start of one).
pub type Utf8Seq = ArrayVec<u8, 4>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	#[error("io error: {0}")]
	Io(String),
	#[error("invalid UTF-8 sequence {} at byte {}", HexArray(.bytes), .start_pos)]
	InvalidUtf8 {
		start_pos: u64,
		bytes: Utf8Seq,
	},
}

impl From<io::Error> for DecodeError {
	fn from(e: io::Error) -> Self {
		Self::Io(e.to_string())
	}
}

/// Decodes UTF-8 from a byte stream, one `char` at a time.
///
/// Bytes are read into a fixed buffer; a sequence split across two reads is moved to the front
/// of the buffer and completed by the next one. Malformed input is an error, never replaced.
#[derive(Debug)]
pub struct CharDecoder<R> {
	src: R,
	buf: Box<[u8]>,
	// undecoded bytes are `buf[start..end]`
	start: usize,
	end: usize,
	last_read_pos: u64,
}

impl<R: io::Read> CharDecoder<R> {
	pub const DEFAULT_CAPACITY: NonZeroUsize = nonzero!(1usize << 16);

	/// Constructs a new decoder with the default buffer capacity.
	#[inline]
	pub fn new(src: R) -> Self {
		Self::with_capacity(src, Self::DEFAULT_CAPACITY)
	}

	/// Constructs a new decoder with a specific buffer capacity.
	///
	/// The buffer will always be at least 4 bytes in size, so any one sequence fits.
	pub fn with_capacity(src: R, capacity: NonZeroUsize) -> Self {
		let capacity = capacity.max(nonzero!(4usize));
		Self {
			src,
			buf: vec![0u8; capacity.get()].into_boxed_slice(),
			start: 0,
			end: 0,
			last_read_pos: 0,
		}
	}

	/// Number of bytes decoded so far.
	pub fn position(&self) -> u64 {
		self.last_read_pos
	}

	pub fn into_inner(self) -> R {
		self.src
	}

	/// Reads the next scalar value from the source.
	pub fn read_next(&mut self) -> Result<Option<char>, DecodeError> {
		loop {
			if let Some(c) = self.try_next_char()? {
				return Ok(Some(c));
			}

			match self.fill_buf()? {
				ControlFlow::Break(()) if self.drain_len() == 0
					=> return Ok(None), // stream is done
				ControlFlow::Break(()) => return Err(self.utf8_error(self.drain_len())),
				ControlFlow::Continue(()) => continue,
			}
		}
	}

	fn utf8_error(&self, len: usize) -> DecodeError {
		DecodeError::InvalidUtf8 {
			start_pos: self.last_read_pos,
			bytes: self.buf[self.start..self.end].iter().copied().take(len.min(4)).collect(),
		}
	}

	fn try_next_char(&mut self) -> Result<Option<char>, DecodeError> {
		let pending = &self.buf[self.start..self.end];
		let lead = match pending.first().copied() {
			Some(c) => c,
			None => return Ok(None),
		};

		let char8_len = match lead {
			0x00..=0x7f => 1usize, // ASCII
			0b110_00000..=0b110_11111 => 2,
			0b1110_0000..=0b1110_1111 => 3,
			0b11110_000..=0b11110_111 => 4,
			_ => return Err(self.utf8_error(1)),
		};

		if char8_len > pending.len() {
			// more read data needed
			return Ok(None);
		}

		let ch = std::str::from_utf8(&pending[..char8_len])
			.ok()
			.and_then(|s| s.chars().next())
			.ok_or_else(|| self.utf8_error(char8_len))?;

		self.start += char8_len;
		self.last_read_pos += char8_len as u64;
		Ok(Some(ch))
	}

	fn fill_buf(&mut self) -> Result<ControlFlow<()>, DecodeError> {
		// at most 3 bytes of an unfinished sequence remain; keep them at the front
		let rem_len = self.drain_len();
		self.buf.copy_within(self.start..self.end, 0);
		self.start = 0;
		self.end = rem_len;

		let read_size = loop {
			match self.src.read(&mut self.buf[rem_len..]) {
				Ok(n) => break n,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			}
		};
		debug_assert!(read_size <= self.buf.len() - rem_len);
		self.end += read_size;

		Ok(match read_size {
			0 => ControlFlow::Break(()),
			_ => ControlFlow::Continue(()),
		})
	}

	#[inline(always)]
	fn drain_len(&self) -> usize {
		self.end - self.start
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	#[test]
	fn empty() {
		check(b"", "", None);
	}

	#[test]
	fn simple() {
		check(b"one", "one", None);
	}

	#[test]
	fn non_ascii() {
		check("fianc\u{00e9}e".as_bytes(), "fianc\u{00e9}e", None);
	}

	#[test]
	fn multi_iter_no_utf8_split() {
		check(b"MULTIread", "MULTIread", Some(3));
	}

	#[test]
	fn stupidly_small_buffer() {
		for size in 1..=3 {
			check("fun\u{00a9}tion \u{1fbc0}".as_bytes(), "fun\u{00a9}tion \u{1fbc0}", Some(size));
		}
	}

	#[test]
	fn multi_iter_utf8_split() {
		// 3 bytes a piece, split across 4-byte reads
		check("\u{2401}\u{2402}\u{2403}\u{2404}".as_bytes(), "\u{2401}\u{2402}\u{2403}\u{2404}", Some(4));
	}

	#[test]
	fn catch_trailing_failures() {
		check_err(b"ABC\xe0", invalid(3, &[0xe0]), None);
	}

	#[test]
	fn catch_bad_lead_byte() {
		check_err(b"ok\x80", invalid(2, &[0x80]), None);
	}

	#[test]
	fn catch_bad_continuation() {
		check_err(b"\xe2\x28\xa1", invalid(0, &[0xe2, 0x28, 0xa1]), Some(2));
	}

	#[test]
	fn error_display() {
		assert_eq!("invalid UTF-8 sequence [e2, 28] at byte 7", invalid(7, &[0xe2, 0x28]).to_string());
	}

	#[test]
	fn retries_interrupted_reads() {
		struct Flaky<'a> {
			interrupt_next: bool,
			inner: &'a [u8],
		}

		impl<'a> io::Read for Flaky<'a> {
			fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
				let flip = !self.interrupt_next;
				if std::mem::replace(&mut self.interrupt_next, flip) {
					return Err(io::ErrorKind::Interrupted.into());
				}
				io::Read::read(&mut self.inner, buf)
			}
		}

		let flaky = Flaky { interrupt_next: true, inner: "h\u{e9}llo".as_bytes() };
		let mut sut = CharDecoder::with_capacity(flaky, nonzero!(4usize));
		assert_eq!(Ok("h\u{e9}llo".to_owned()), drain(&mut sut));
	}

	#[test]
	fn surfaces_io_errors() {
		struct Broken;

		impl io::Read for Broken {
			fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
				Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
			}
		}

		let mut sut = CharDecoder::new(Broken);
		assert_eq!(Err(DecodeError::Io("disk on fire".into())), sut.read_next());
	}

	#[test]
	fn tracks_position() {
		let mut sut = CharDecoder::new("a\u{e9}".as_bytes());
		sut.read_next().unwrap();
		sut.read_next().unwrap();
		assert_eq!(3, sut.position());
	}

	fn invalid(start_pos: u64, bytes: &[u8]) -> DecodeError {
		DecodeError::InvalidUtf8 {
			start_pos,
			bytes: bytes.iter().copied().collect(),
		}
	}

	fn check(input: &[u8], output: &str, buf_size: Option<usize>) {
		assert_eq!(Ok(output.to_owned()), check_impl(input, buf_size));
	}

	fn check_err(input: &[u8], output: DecodeError, buf_size: Option<usize>) {
		assert_eq!(Err(output), check_impl(input, buf_size));
	}

	fn check_impl(input: &[u8], buf_size: Option<usize>) -> Result<String, DecodeError> {
		let capacity = buf_size.and_then(NonZeroUsize::new)
			.unwrap_or(CharDecoder::<&[u8]>::DEFAULT_CAPACITY);
		let mut sut = CharDecoder::with_capacity(io::Cursor::new(input), capacity);
		drain(&mut sut)
	}

	fn drain<R: io::Read>(sut: &mut CharDecoder<R>) -> Result<String, DecodeError> {
		let mut out = String::new();
		while let Some(ch) = sut.read_next()? {
			out.push(ch);
		}
		Ok(out)
	}
}
