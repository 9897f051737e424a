// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Digit-string conversion for the radixes a memory image can be written in.

use std::{fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadixError {
    #[error("`{digits}` is not a base-{base} number")]
    InvalidDigits { digits: String, base: u32 },
    #[error("unknown radix `{0}`: expected 2, 10 or 16")]
    Unknown(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Radix {
    Binary,
    Decimal,
    Hexadecimal,
}

impl Radix {
    pub const ALL: [Radix; 3] =
        [Radix::Binary, Radix::Decimal, Radix::Hexadecimal];

    pub const fn base(&self) -> u32 {
        match self {
            Self::Binary => 2,
            Self::Decimal => 10,
            Self::Hexadecimal => 16,
        }
    }

    /// Digits needed for any byte, i.e. `ceil(log_base(256))`.
    pub const fn digits_per_byte(&self) -> usize {
        match self {
            Self::Binary => 8,
            Self::Decimal => 3,
            Self::Hexadecimal => 2,
        }
    }

    /// Value of `c` as a digit of this radix. Hex digits are accepted in
    /// either case.
    pub fn digit_value(&self, c: char) -> Option<u8> {
        c.to_digit(self.base()).map(|digit| digit as u8)
    }

    pub fn is_digit(&self, c: char) -> bool {
        self.digit_value(c).is_some()
    }

    /// Renders `byte` zero-padded to [`Self::digits_per_byte`] digits.
    pub fn format_byte(&self, byte: u8) -> String {
        match self {
            Self::Binary => format!("{byte:08b}"),
            Self::Decimal => format!("{byte:03}"),
            Self::Hexadecimal => format!("{byte:02X}"),
        }
    }

    pub fn parse_digits(&self, digits: &str) -> Result<u32, RadixError> {
        let invalid = || RadixError::InvalidDigits {
            digits: digits.to_string(),
            base: self.base(),
        };
        if digits.is_empty() || !digits.chars().all(|c| self.is_digit(c)) {
            return Err(invalid());
        }
        u32::from_str_radix(digits, self.base()).map_err(|_| invalid())
    }
}

impl fmt::Display for Radix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => "binary",
            Self::Decimal => "decimal",
            Self::Hexadecimal => "hexadecimal",
        }
        .fmt(f)
    }
}

impl FromStr for Radix {
    type Err = RadixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "2" | "bin" | "binary" => Ok(Self::Binary),
            "10" | "dec" | "decimal" => Ok(Self::Decimal),
            "16" | "hex" | "hexadecimal" => Ok(Self::Hexadecimal),
            _ => Err(RadixError::Unknown(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Radix, RadixError};

    #[test]
    fn digits_per_byte_is_enough_for_255() {
        for radix in Radix::ALL {
            let needed = radix.format_byte(u8::MAX).len();
            assert_eq!(needed, radix.digits_per_byte());
            let fewer = (radix.base() as u64).pow(needed as u32 - 1);
            assert!(fewer < 256, "{radix} could use fewer digits");
        }
    }

    #[test]
    fn every_byte_round_trips() {
        for radix in Radix::ALL {
            for byte in 0..=u8::MAX {
                let digits = radix.format_byte(byte);
                assert_eq!(Ok(byte as u32), radix.parse_digits(&digits));
            }
        }
    }

    #[test]
    fn formats_with_padding() {
        assert_eq!("00000101", Radix::Binary.format_byte(5));
        assert_eq!("072", Radix::Decimal.format_byte(72));
        assert_eq!("0A", Radix::Hexadecimal.format_byte(10));
    }

    #[test]
    fn hex_digits_ignore_case() {
        assert_eq!(Some(0xb), Radix::Hexadecimal.digit_value('b'));
        assert_eq!(Some(0xb), Radix::Hexadecimal.digit_value('B'));
        assert_eq!(None, Radix::Decimal.digit_value('b'));
        assert_eq!(None, Radix::Binary.digit_value('2'));
    }

    #[test]
    fn rejects_foreign_digits() {
        assert!(matches!(
            Radix::Binary.parse_digits("0120"),
            Err(RadixError::InvalidDigits { base: 2, .. })
        ));
        assert!(Radix::Decimal.parse_digits("").is_err());
    }

    #[test]
    fn parses_names() {
        assert_eq!(Ok(Radix::Hexadecimal), "HEX".parse());
        assert_eq!(Ok(Radix::Binary), "2".parse());
        assert_eq!(Err(RadixError::Unknown("8".into())), "8".parse::<Radix>());
    }
}
