// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use static_assertions::{const_assert, const_assert_eq};

/// Contents of a register.
pub type Word = u16;

/// Byte address carried in an instruction's 16-bit operand field.
pub type Address = u16;

pub const BYTE_BITS: usize = 8;
pub const WORD_BITS: usize = Word::BITS as usize;
pub const WORD_BYTES: usize = WORD_BITS / BYTE_BITS;
const_assert_eq!(WORD_BITS, Address::BITS as usize);
const_assert_eq!(WORD_BYTES, 2);

pub const OPCODE_BITS: usize = 4;
pub const REGISTER_BITS: usize = 2;
pub const MODE_BITS: usize = 2;

// Instruction byte, most significant bit first:
//
//   +--------+------+------+
//   | opcode | reg  | mode |   followed by a big-endian 16-bit operand
//   | 4 bits | 2    | 2    |   when the mode is immediate or direct
//   +--------+------+------+
const_assert_eq!(OPCODE_BITS + REGISTER_BITS + MODE_BITS, BYTE_BITS);

pub const REGISTER_COUNT: usize = 3;
const_assert!(REGISTER_COUNT < 1 << REGISTER_BITS);

/// Size of an instruction without an operand field.
pub const SHORT_INSTRUCTION_BYTES: usize = 1;
/// Size of an instruction followed by a 16-bit operand.
pub const LONG_INSTRUCTION_BYTES: usize = SHORT_INSTRUCTION_BYTES + WORD_BYTES;
/// Size of a raw `mem` data slot.
pub const DATA_BYTES: usize = 1;
