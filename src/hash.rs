use std::{
	cmp::Ordering,
	fmt::{self, Display},
	ops::{BitAnd, BitOr, BitXor, Not},
	str::FromStr,
};

use bitvec::prelude::*;
use rand::Rng;

use crate::{Error, Result};

/// Number of 16-bit words in a [Hash256].
pub const NUM_WORDS: usize = 16;

/// Number of bits in a [Hash256].
pub const NUM_BITS: usize = NUM_WORDS * 16;

/// Number of hex characters in the text form of a [Hash256].
pub const HEX_LEN: usize = NUM_WORDS * 4;

/// 256-bit PDQ hash stored as 16 words, word 15 being most significant.
///
/// The type is `Copy`, so the algebraic operators always produce new values.
/// In-place mutation ([Hash256::set_bit], [Hash256::flip_bit],
/// [Hash256::clear]) only ever touches the binding it is called on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash256 {
	words: [u16; NUM_WORDS],
}

impl Hash256 {
	/// All-zero hash.
	pub const fn new() -> Self {
		Self {
			words: [0; NUM_WORDS],
		}
	}

	/// Build a hash from its words, least significant first.
	pub const fn from_words(words: [u16; NUM_WORDS]) -> Self {
		Self { words }
	}

	/// Words of the hash, least significant first.
	pub fn words(&self) -> [u16; NUM_WORDS] {
		self.words
	}

	/// Reset every bit to zero.
	pub fn clear(&mut self) {
		self.words = [0; NUM_WORDS];
	}

	/// Set every bit to one.
	pub fn set_all(&mut self) {
		self.words = [0xFFFF; NUM_WORDS];
	}

	/// Set bit `k mod 256`.
	pub fn set_bit(&mut self, k: usize) {
		self.words[(k & 255) >> 4] |= 1 << (k & 15);
	}

	/// Toggle bit `k mod 256`.
	pub fn flip_bit(&mut self, k: usize) {
		self.words[(k & 255) >> 4] ^= 1 << (k & 15);
	}

	/// Copy of this hash with bit `k mod 256` set.
	pub fn with_bit(mut self, k: usize) -> Self {
		self.set_bit(k);
		self
	}

	/// Whether bit `k mod 256` is set.
	pub fn bit(&self, k: usize) -> bool {
		self.words[(k & 255) >> 4] & (1 << (k & 15)) != 0
	}

	/// Bit view of the hash. Index `k` addresses the same bit as [Hash256::set_bit].
	pub fn bits(&self) -> BitArray<[u16; NUM_WORDS], Lsb0> {
		BitArray::new(self.words)
	}

	/// Number of set bits.
	pub fn hamming_norm(&self) -> u32 {
		self.words.iter().map(|w| w.count_ones()).sum()
	}

	/// Number of bits that differ between the two hashes.
	pub fn hamming_distance(&self, other: &Hash256) -> u32 {
		self.words
			.iter()
			.zip(other.words.iter())
			.map(|(a, b)| (a ^ b).count_ones())
			.sum()
	}

	/// Equivalent to `self.hamming_distance(other) <= max_distance`, but stops
	/// as soon as the running count exceeds `max_distance`.
	pub fn hamming_distance_le(&self, other: &Hash256, max_distance: u32) -> bool {
		let mut distance = 0;

		for (a, b) in self.words.iter().zip(other.words.iter()) {
			distance += (a ^ b).count_ones();

			if distance > max_distance {
				return false;
			}
		}

		true
	}

	/// Flip `num_bits` randomly chosen bits, with replacement.
	///
	/// Positions are drawn independently from all 256 bits, so a later draw may
	/// flip an earlier one back. At most `num_bits` bits end up different.
	pub fn fuzz<R>(&self, rng: &mut R, num_bits: usize) -> Self
	where
		R: Rng + ?Sized,
	{
		let mut fuzzed = *self;

		for _ in 0..num_bits {
			fuzzed.flip_bit(rng.gen_range(0..NUM_BITS));
		}

		fuzzed
	}

	/// Lowercase hex form, most significant word first.
	pub fn to_hex(&self) -> String {
		let bytes: Vec<u8> = self
			.words
			.iter()
			.rev()
			.flat_map(|w| w.to_be_bytes())
			.collect();

		hex::encode(bytes)
	}

	/// Parse the 64 character hex form produced by [Hash256::to_hex]. Case-insensitive.
	pub fn from_hex(value: &str) -> Result<Self> {
		let length = value.chars().count();
		if length != HEX_LEN {
			return Err(Error::HashLength(length));
		}

		if let Some((index, c)) = value.chars().enumerate().find(|(_, c)| !c.is_ascii_hexdigit()) {
			return Err(hex::FromHexError::InvalidHexCharacter { c, index }.into());
		}

		let mut bytes = [0u8; NUM_WORDS * 2];
		hex::decode_to_slice(value, &mut bytes)?;

		let mut words = [0u16; NUM_WORDS];
		for (i, pair) in bytes.chunks_exact(2).enumerate() {
			words[NUM_WORDS - 1 - i] = u16::from_be_bytes([pair[0], pair[1]]);
		}

		Ok(Self { words })
	}

	/// Human readable bit dump: one line per word, most significant word and bit first.
	pub fn dump_bits(&self) -> String {
		self.words
			.iter()
			.rev()
			.map(|word| {
				(0..16)
					.rev()
					.map(|j| if word & (1 << j) != 0 { "1" } else { "0" })
					.collect::<Vec<_>>()
					.join(" ")
			})
			.collect::<Vec<_>>()
			.join("\n")
	}
}

impl Ord for Hash256 {
	/// Big-endian numeric order: word 15 is compared first.
	fn cmp(&self, other: &Self) -> Ordering {
		self.words.iter().rev().cmp(other.words.iter().rev())
	}
}

impl PartialOrd for Hash256 {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl BitXor for Hash256 {
	type Output = Hash256;

	fn bitxor(self, rhs: Self) -> Self::Output {
		let mut words = self.words;
		words.iter_mut().zip(rhs.words).for_each(|(w, r)| *w ^= r);
		Self { words }
	}
}

impl BitAnd for Hash256 {
	type Output = Hash256;

	fn bitand(self, rhs: Self) -> Self::Output {
		let mut words = self.words;
		words.iter_mut().zip(rhs.words).for_each(|(w, r)| *w &= r);
		Self { words }
	}
}

impl BitOr for Hash256 {
	type Output = Hash256;

	fn bitor(self, rhs: Self) -> Self::Output {
		let mut words = self.words;
		words.iter_mut().zip(rhs.words).for_each(|(w, r)| *w |= r);
		Self { words }
	}
}

impl Not for Hash256 {
	type Output = Hash256;

	fn not(self) -> Self::Output {
		Self {
			words: self.words.map(|w| !w),
		}
	}
}

impl Display for Hash256 {
	/// Formats the hash in hexadecimal notation.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl FromStr for Hash256 {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_hex(s)
	}
}
