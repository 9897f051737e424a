// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Bit-addressable memory backed by whole bytes.
//!
//! Bit `i` is bit `7 - i % 8` of byte `i / 8`, so bit ranges read as
//! big-endian numbers in the same order they are written out by
//! [`Memory::to_encoded`].

use std::{fmt, mem, str::FromStr};

use base64::{
    alphabet,
    engine::{
        general_purpose::{GeneralPurpose, GeneralPurposeConfig},
        DecodePaddingMode,
    },
    Engine,
};
use num_traits::{PrimInt, Unsigned};
use thiserror::Error;

use crate::{
    arch::{Word, BYTE_BITS, WORD_BITS},
    radix::{Radix, RadixError},
};

/// URL-safe alphabet, no padding on output, padding tolerated on input.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("attempt to access {length} bits at bit {start}, outside of memory bounds ({size} bits)")]
    OutOfBounds {
        start: usize,
        length: usize,
        size: usize,
    },
    #[error("a {length}-bit field does not fit in a {capacity}-bit integer")]
    FieldTooWide { length: usize, capacity: usize },
    #[error("{value} does not fit in {length} bits")]
    ValueTooWide { value: u128, length: usize },
    #[error("`{character}` at position {position} is not a bit")]
    InvalidBit { character: char, position: usize },
    #[error("`{digits}` is larger than a byte")]
    ByteOverflow { digits: String },
    #[error(transparent)]
    Radix(#[from] RadixError),
    #[error("invalid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

/// How a memory image is written out as text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// One zero-padded byte per line.
    Radix(Radix),
    /// Padding-free URL-safe base64.
    Base64Url,
}

impl Default for Encoding {
    fn default() -> Self {
        Self::Radix(Radix::Binary)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radix(radix) => radix.fmt(f),
            Self::Base64Url => "base64url".fmt(f),
        }
    }
}

impl FromStr for Encoding {
    type Err = RadixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base64" | "base64url" => Ok(Self::Base64Url),
            _ => s.parse().map(Self::Radix),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Creates an empty [`Memory`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`Memory`] of `bytes` zero bytes.
    pub fn zeroed(bytes: usize) -> Self {
        Self {
            bytes: vec![0; bytes],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Reads a memory image written by [`Memory::to_encoded`].
    ///
    /// In a radix encoding every character that is not a digit of the radix
    /// is skipped, so dumps may carry whitespace and separators. Digits are
    /// taken [`Radix::digits_per_byte`] at a time; a shorter final group is
    /// read as the number it spells.
    pub fn from_encoded(text: &str, encoding: Encoding) -> MemoryResult<Self> {
        let bytes = match encoding {
            Encoding::Base64Url => BASE64URL.decode(text.trim())?,
            Encoding::Radix(radix) => {
                let digits: Vec<char> =
                    text.chars().filter(|&c| radix.is_digit(c)).collect();
                digits
                    .chunks(radix.digits_per_byte())
                    .map(|group| {
                        let group: String = group.iter().collect();
                        let value = radix.parse_digits(&group)?;
                        u8::try_from(value).map_err(|_| {
                            MemoryError::ByteOverflow { digits: group }
                        })
                    })
                    .collect::<MemoryResult<Vec<u8>>>()?
            }
        };
        Ok(Self::from_bytes(bytes))
    }

    /// Writes this memory out as text, the inverse of
    /// [`Memory::from_encoded`].
    pub fn to_encoded(&self, encoding: Encoding) -> String {
        match encoding {
            Encoding::Base64Url => BASE64URL.encode(&self.bytes),
            Encoding::Radix(radix) => self
                .bytes
                .iter()
                .map(|&byte| radix.format_byte(byte))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn len_bits(&self) -> usize {
        self.bytes.len() * BYTE_BITS
    }

    pub fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Copies out the bits `start..start + length`.
    pub fn get_bits(&self, start: usize, length: usize) -> MemoryResult<Vec<bool>> {
        self.check_range(start, length)?;
        Ok((start..start + length).map(|i| self.bit(i)).collect())
    }

    pub fn get_bits_as_string(
        &self,
        start: usize,
        length: usize,
    ) -> MemoryResult<String> {
        self.check_range(start, length)?;
        Ok((start..start + length)
            .map(|i| if self.bit(i) { '1' } else { '0' })
            .collect())
    }

    /// Reads the bits `start..start + length` as a big-endian unsigned
    /// number.
    pub fn get_bits_as_number<T: PrimInt + Unsigned>(
        &self,
        start: usize,
        length: usize,
    ) -> MemoryResult<T> {
        let capacity = bits_of::<T>();
        if length > capacity {
            return Err(MemoryError::FieldTooWide { length, capacity });
        }
        self.check_range(start, length)?;
        Ok((start..start + length).fold(T::zero(), |value, i| {
            let bit = if self.bit(i) { T::one() } else { T::zero() };
            (value << 1) | bit
        }))
    }

    pub fn set_bits(&mut self, start: usize, bits: &[bool]) -> MemoryResult<()> {
        self.check_range(start, bits.len())?;
        for (offset, &bit) in bits.iter().enumerate() {
            self.set_bit(start + offset, bit);
        }
        Ok(())
    }

    /// Writes a string of `0`s and `1`s. Nothing is written if any character
    /// is not a bit.
    pub fn set_bits_from_string(
        &mut self,
        start: usize,
        bits: &str,
    ) -> MemoryResult<()> {
        let bits = bits
            .chars()
            .enumerate()
            .map(|(position, character)| match character {
                '0' => Ok(false),
                '1' => Ok(true),
                _ => Err(MemoryError::InvalidBit {
                    character,
                    position,
                }),
            })
            .collect::<MemoryResult<Vec<bool>>>()?;
        self.set_bits(start, &bits)
    }

    /// Writes `value` as a big-endian unsigned number zero-padded to
    /// `length` bits.
    pub fn set_bits_from_number<T: PrimInt + Unsigned>(
        &mut self,
        start: usize,
        length: usize,
        value: T,
    ) -> MemoryResult<()> {
        let capacity = bits_of::<T>();
        if length < capacity && (value >> length) != T::zero() {
            return Err(MemoryError::ValueTooWide {
                value: value.to_u128().unwrap_or(u128::MAX),
                length,
            });
        }
        self.check_range(start, length)?;
        for offset in 0..length {
            let shift = length - 1 - offset;
            let bit = shift < capacity && (value >> shift) & T::one() == T::one();
            self.set_bit(start + offset, bit);
        }
        Ok(())
    }

    /// Reads the big-endian word stored at `address`.
    pub fn read_word(&self, address: usize) -> MemoryResult<Word> {
        self.get_bits_as_number(self.bit_address(address, WORD_BITS)?, WORD_BITS)
    }

    /// Stores `word` big-endian at `address`.
    pub fn write_word(&mut self, address: usize, word: Word) -> MemoryResult<()> {
        let start = self.bit_address(address, WORD_BITS)?;
        self.set_bits_from_number(start, WORD_BITS, word)
    }

    pub fn read_byte(&self, address: usize) -> MemoryResult<u8> {
        self.get_bits_as_number(self.bit_address(address, BYTE_BITS)?, BYTE_BITS)
    }

    pub fn write_byte(&mut self, address: usize, byte: u8) -> MemoryResult<()> {
        let start = self.bit_address(address, BYTE_BITS)?;
        self.set_bits_from_number(start, BYTE_BITS, byte)
    }

    fn bit_address(&self, address: usize, length: usize) -> MemoryResult<usize> {
        address
            .checked_mul(BYTE_BITS)
            .ok_or(MemoryError::OutOfBounds {
                start: usize::MAX,
                length,
                size: self.len_bits(),
            })
    }

    fn check_range(&self, start: usize, length: usize) -> MemoryResult<()> {
        match start.checked_add(length) {
            Some(end) if end <= self.len_bits() => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                start,
                length,
                size: self.len_bits(),
            }),
        }
    }

    fn bit(&self, index: usize) -> bool {
        self.bytes[index / BYTE_BITS] & mask(index) != 0
    }

    fn set_bit(&mut self, index: usize, bit: bool) {
        let byte = &mut self.bytes[index / BYTE_BITS];
        if bit {
            *byte |= mask(index);
        } else {
            *byte &= !mask(index);
        }
    }
}

const fn mask(index: usize) -> u8 {
    0x80 >> (index % BYTE_BITS)
}

fn bits_of<T>() -> usize {
    mem::size_of::<T>() * BYTE_BITS
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Hex dump, sixteen bytes per line.
impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (line, chunk) in self.bytes.chunks(16).enumerate() {
            if line > 0 {
                writeln!(f)?;
            }
            write!(f, "{:04X}:", line * 16)?;
            for byte in chunk {
                write!(f, " {byte:02X}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Encoding, Memory, MemoryError};
    use crate::radix::Radix;

    fn sample() -> Memory {
        Memory::from_bytes(vec![0x48, 0x01, 0xFF, 0x00, 0x7A])
    }

    #[test]
    fn radix_encodings_round_trip() {
        let memory = sample();
        for radix in Radix::ALL {
            let text = memory.to_encoded(Encoding::Radix(radix));
            assert_eq!(
                Ok(memory.clone()),
                Memory::from_encoded(&text, Encoding::Radix(radix)),
                "{radix}"
            );
        }
    }

    #[test]
    fn base64url_round_trips_without_padding() {
        let memory = Memory::from_bytes(vec![72, 1]);
        let text = memory.to_encoded(Encoding::Base64Url);
        assert_eq!("SAE", text);
        assert_eq!(Ok(memory.clone()), Memory::from_encoded(&text, Encoding::Base64Url));
        assert_eq!(Ok(memory), Memory::from_encoded("SAE=", Encoding::Base64Url));

        let awkward = Memory::from_bytes(vec![0xFB, 0xFF]);
        assert_eq!("-_8", awkward.to_encoded(Encoding::Base64Url));
    }

    #[test]
    fn writes_one_padded_byte_per_line() {
        let memory = Memory::from_bytes(vec![72, 1]);
        assert_eq!(
            "01001000\n00000001",
            memory.to_encoded(Encoding::Radix(Radix::Binary))
        );
        assert_eq!("072\n001", memory.to_encoded(Encoding::Radix(Radix::Decimal)));
        assert_eq!("48\n01", memory.to_encoded(Encoding::Radix(Radix::Hexadecimal)));
    }

    #[test]
    fn skips_non_digits_when_reading_text() {
        let memory = Memory::from_encoded(
            "0100 1000 | header\n0000_0001\n",
            Encoding::Radix(Radix::Binary),
        )
        .unwrap();
        assert_eq!(&[0x48, 0x01], memory.as_bytes());

        let hex = Memory::from_encoded("ff, 0a;", Encoding::Radix(Radix::Hexadecimal))
            .unwrap();
        assert_eq!(&[0xFF, 0x0A], hex.as_bytes());
    }

    #[test]
    fn reads_short_final_group_as_its_value() {
        let memory =
            Memory::from_encoded("11111111 101", Encoding::Radix(Radix::Binary))
                .unwrap();
        assert_eq!(&[0xFF, 0b101], memory.as_bytes());
        assert!(Memory::from_encoded("", Encoding::Radix(Radix::Decimal))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejects_decimal_bytes_above_255() {
        assert_eq!(
            Err(MemoryError::ByteOverflow {
                digits: "256".into()
            }),
            Memory::from_encoded("255 256", Encoding::Radix(Radix::Decimal))
        );
    }

    #[test]
    fn reads_bit_ranges() {
        let memory = sample();
        assert_eq!(72u32, memory.get_bits_as_number(0, 8).unwrap());
        assert_eq!(1u32, memory.get_bits_as_number(8, 8).unwrap());
        assert_eq!("0100", memory.get_bits_as_string(0, 4).unwrap());
        assert_eq!(
            vec![true, false, false, false],
            memory.get_bits(4, 4).unwrap()
        );
        // straddles a byte boundary
        assert_eq!(0b1000_0000_0001u16, memory.get_bits_as_number(4, 12).unwrap());
        assert_eq!(0, memory.get_bits_as_number::<u8>(0, 0).unwrap());
    }

    #[test]
    fn rejects_out_of_bounds_access() {
        let mut memory = Memory::zeroed(1);
        assert_eq!(
            Err(MemoryError::OutOfBounds {
                start: 1,
                length: 8,
                size: 8
            }),
            memory.get_bits(1, 8)
        );
        assert!(memory.get_bits(usize::MAX, 2).is_err());
        assert!(memory.set_bits(7, &[true, true]).is_err());
        assert_eq!(&[0], memory.as_bytes());
        assert!(memory.read_word(0).is_err());
        assert!(Memory::new().get_bits(0, 1).is_err());
    }

    #[test]
    fn writes_bit_ranges_in_place() {
        let mut memory = Memory::zeroed(2);
        memory.set_bits(0, &[true, false, true]).unwrap();
        assert_eq!(0b1010_0000, memory.as_bytes()[0]);

        memory.set_bits_from_string(4, "1111").unwrap();
        assert_eq!(0b1010_1111, memory.as_bytes()[0]);

        memory.set_bits_from_number(6, 6, 0b100001u8).unwrap();
        assert_eq!(&[0b1010_1110, 0b0001_0000], memory.as_bytes());

        memory.set_bits_from_number(0, 16, 0u64).unwrap();
        assert_eq!(&[0, 0], memory.as_bytes());
    }

    #[test]
    fn pads_numbers_wider_than_their_type() {
        let mut memory = Memory::from_bytes(vec![0xFF, 0xFF]);
        memory.set_bits_from_number(0, 16, 3u8).unwrap();
        assert_eq!(&[0x00, 0x03], memory.as_bytes());
    }

    #[test]
    fn rejects_numbers_that_do_not_fit() {
        let mut memory = Memory::zeroed(2);
        assert_eq!(
            Err(MemoryError::ValueTooWide {
                value: 300,
                length: 8
            }),
            memory.set_bits_from_number(0, 8, 300u16)
        );
        assert_eq!(
            Err(MemoryError::FieldTooWide {
                length: 9,
                capacity: 8
            }),
            memory.get_bits_as_number::<u8>(0, 9)
        );
    }

    #[test]
    fn rejects_non_bit_characters_without_writing() {
        let mut memory = Memory::zeroed(1);
        assert_eq!(
            Err(MemoryError::InvalidBit {
                character: '2',
                position: 2
            }),
            memory.set_bits_from_string(0, "112")
        );
        assert_eq!(&[0], memory.as_bytes());
    }

    #[test]
    fn words_are_big_endian() {
        let mut memory = Memory::zeroed(4);
        memory.write_word(1, 0x1234).unwrap();
        assert_eq!(&[0x00, 0x12, 0x34, 0x00], memory.as_bytes());
        assert_eq!(Ok(0x1234), memory.read_word(1));
        assert_eq!(Ok(0x34), memory.read_byte(2));
        memory.write_byte(3, 0xAB).unwrap();
        assert_eq!(Ok(0x34AB), memory.read_word(2));
    }

    #[test]
    fn dumps_hex_lines() {
        let memory = Memory::from_bytes((0..18).collect());
        assert_eq!(
            "0000: 00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F\n0010: 10 11",
            memory.to_string()
        );
    }

    #[test]
    fn parses_encoding_names() {
        assert_eq!(Ok(Encoding::Base64Url), "base64url".parse());
        assert_eq!(Ok(Encoding::Radix(Radix::Decimal)), "10".parse());
    }
}
