// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Assembly source grammar.
//!
//! ```text
//! ; comment to end of line
//! @loop: add R1, #1     ; binary: mnemonic, register, optional comma, argument
//!        jmz R2, @done  ; arguments: R0 | #imm | address | @label
//!        jmp @loop      ; unary: jmp <argument> | not <register> | mem <byte>
//! @done  halt           ; nullary: nop | halt
//! ```
//!
//! Mnemonics and register names ignore case.

use std::fmt;

use log::debug;
use machine::op::{AddressingMode, Opcode, Register};
use paste::paste;

use crate::{
    error::{AssemblyError, AssemblyResult},
    parse::{
        all, any_no_case, either, line_comment, many, matches, matches_as,
        no_case, optional, take_while1, ParseResult, Parser,
    },
};

const COMMENT: char = ';';
const LABEL: char = '@';
const LABEL_SUFFIX: char = ':';
const IMMEDIATE: char = '#';
const SEPARATOR: char = ',';

/// An instruction argument as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// `R0`: the accumulator's value.
    Accumulator,
    /// `#value`.
    Immediate(u64),
    /// A bare byte address.
    Direct(u64),
    /// `@name`, to become a direct address.
    Label(String),
}

/// Anything that knows which addressing mode it encodes as.
pub trait Operand {
    fn mode(&self) -> AddressingMode;
}

impl Operand for Argument {
    fn mode(&self) -> AddressingMode {
        match self {
            Self::Accumulator => AddressingMode::Accumulator,
            Self::Immediate(_) => AddressingMode::Immediate,
            Self::Direct(_) | Self::Label(_) => AddressingMode::Direct,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulator => Register::ACCUMULATOR.fmt(f),
            Self::Immediate(value) => write!(f, "{IMMEDIATE}{value}"),
            Self::Direct(address) => address.fmt(f),
            Self::Label(name) => write!(f, "{LABEL}{name}"),
        }
    }
}

/// The shape of one instruction, generic over its argument type so that
/// label references can be ruled out after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape<A> {
    Nullary {
        opcode: Opcode,
    },
    Unary {
        opcode: Opcode,
        register: Option<Register>,
        argument: Option<A>,
    },
    Binary {
        opcode: Opcode,
        register: Register,
        argument: A,
    },
    /// `mem`: one raw byte, no opcode.
    Data {
        value: u64,
    },
}

impl<A> Shape<A> {
    /// Opcode, register and argument of an instruction with an instruction
    /// byte; `None` for raw data.
    pub fn framing(&self) -> Option<(Opcode, Register, Option<&A>)> {
        match self {
            Self::Nullary { opcode } => Some((*opcode, Register::ACCUMULATOR, None)),
            Self::Unary {
                opcode,
                register,
                argument,
            } => Some((
                *opcode,
                register.unwrap_or(Register::ACCUMULATOR),
                argument.as_ref(),
            )),
            Self::Binary {
                opcode,
                register,
                argument,
            } => Some((*opcode, *register, Some(argument))),
            Self::Data { .. } => None,
        }
    }

    pub fn try_map_argument<B, E>(
        self,
        f: impl FnOnce(A) -> Result<B, E>,
    ) -> Result<Shape<B>, E> {
        Ok(match self {
            Self::Nullary { opcode } => Shape::Nullary { opcode },
            Self::Unary {
                opcode,
                register,
                argument,
            } => Shape::Unary {
                opcode,
                register,
                argument: argument.map(f).transpose()?,
            },
            Self::Binary {
                opcode,
                register,
                argument,
            } => Shape::Binary {
                opcode,
                register,
                argument: f(argument)?,
            },
            Self::Data { value } => Shape::Data { value },
        })
    }
}

impl<A: Operand> Shape<A> {
    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        match self.framing() {
            None => machine::arch::DATA_BYTES,
            Some((_, _, argument)) => argument
                .map_or(AddressingMode::Accumulator, Operand::mode)
                .instruction_size(),
        }
    }
}

impl<A: fmt::Display> fmt::Display for Shape<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nullary { opcode } => opcode.fmt(f),
            Self::Unary {
                opcode,
                register,
                argument,
            } => {
                opcode.fmt(f)?;
                if let Some(register) = register {
                    write!(f, " {register}")?;
                }
                if let Some(argument) = argument {
                    write!(f, " {argument}")?;
                }
                Ok(())
            }
            Self::Binary {
                opcode,
                register,
                argument,
            } => write!(f, "{opcode} {register}{SEPARATOR} {argument}"),
            Self::Data { value } => write!(f, "mem {value}"),
        }
    }
}

/// One parsed instruction and the labels attached to its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub labels: Vec<String>,
    pub shape: Shape<Argument>,
}

/// Parses a whole program. Anything the grammar cannot consume is an
/// [`AssemblyError::Parse`].
pub fn parse_program(source: &str) -> AssemblyResult<Vec<Statement>> {
    match program().parse(source) {
        ParseResult::Parsed { value, unparsed } if unparsed.is_empty() => {
            debug!("parsed {} statements", value.len());
            Ok(value)
        }
        result => Err(parse_error(source, result.unparsed())),
    }
}

fn parse_error(source: &str, unparsed: &str) -> AssemblyError {
    let consumed = &source[..source.len() - unparsed.len()];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rsplit('\n')
        .next()
        .map_or(0, |line| line.chars().count())
        + 1;
    let near = unparsed.lines().next().unwrap_or_default().trim_end();
    AssemblyError::Parse {
        line,
        column,
        near: near.to_string(),
    }
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whitespace and comments; at least one of either.
fn ignored<'a>() -> impl Parser<'a, ()> {
    many(either((
        matches(take_while1(char::is_whitespace)),
        matches(line_comment(COMMENT)),
    )))
    .map_parsed(|_| ())
}

/// Decimal digits that fit in a `u64`.
fn decimal<'a>() -> impl Parser<'a, u64> {
    let digits = matches(take_while1(|c: char| c.is_ascii_digit()));
    move |input: &'a str| match digits.parse(input) {
        ParseResult::Parsed { value, unparsed } => match value.parse::<u64>() {
            Ok(number) => ParseResult::parsed(number, unparsed),
            Err(_) => ParseResult::failed(input),
        },
        ParseResult::Failed { unparsed } => ParseResult::failed(unparsed),
    }
}

fn label<'a>() -> impl Parser<'a, String> {
    all((matches(LABEL), matches(take_while1(is_word))))
        .map_parsed(|(_, name)| name.to_string())
}

fn label_definition<'a>() -> impl Parser<'a, String> {
    all((label(), optional(matches(LABEL_SUFFIX)), optional(ignored())))
        .map_parsed(|(name, _, _)| name)
}

fn register<'a>() -> impl Parser<'a, Register> {
    either((
        matches_as(no_case("r0"), Register::R0),
        matches_as(no_case("r1"), Register::R1),
        matches_as(no_case("r2"), Register::R2),
    ))
}

fn argument<'a>() -> impl Parser<'a, Argument> {
    either((
        matches_as(no_case("r0"), Argument::Accumulator),
        all((matches(IMMEDIATE), decimal()))
            .map_parsed(|(_, value)| Argument::Immediate(value)),
        decimal().map_parsed(Argument::Direct),
        label().map_parsed(Argument::Label),
    ))
}

fn nullary<'a>() -> impl Parser<'a, Shape<Argument>> {
    either((
        matches_as(any_no_case(&["nop", "noop", "no-op"]), Opcode::Nop),
        matches_as(any_no_case(&["halt", "hlt"]), Opcode::Halt),
    ))
    .map_parsed(|opcode| Shape::<Argument>::Nullary { opcode })
}

fn unary<'a>() -> impl Parser<'a, Shape<Argument>> {
    either((
        all((matches(any_no_case(&["mem", "memory"])), ignored(), decimal()))
            .map_parsed(|(_, _, value)| Shape::<Argument>::Data { value }),
        all((matches(any_no_case(&["jmp", "jump"])), ignored(), argument()))
            .map_parsed(|(_, _, argument)| Shape::Unary {
                opcode: Opcode::Jump,
                register: None,
                argument: Some(argument),
            }),
        all((matches(no_case("not")), ignored(), register())).map_parsed(
            |(_, _, register)| Shape::Unary {
                opcode: Opcode::Not,
                register: Some(register),
                argument: None,
            },
        ),
    ))
}

macro_rules! binary_mnemonics {
    ($($opcode:ident: [$($spelling:literal),+];)*) => {
        paste! {
            $(
                fn [<$opcode:snake _mnemonic>]<'a>() -> impl Parser<'a, Opcode> {
                    matches_as(any_no_case(&[$($spelling),+]), Opcode::$opcode)
                }
            )*

            fn binary_mnemonic<'a>() -> impl Parser<'a, Opcode> {
                either(($([<$opcode:snake _mnemonic>](),)*))
            }
        }
    };
}

binary_mnemonics! {
    JumpIfZero: ["jmz", "jumpifzero"];
    Load: ["load", "lod"];
    Store: ["store", "stor", "sto"];
    Add: ["add"];
    Subtract: ["sub", "subtract"];
    Multiply: ["mul", "multiply"];
    Divide: ["div", "divide"];
    And: ["and"];
    Or: ["or"];
    EqualsZero: ["cpz", "equalszero"];
    LessThanZero: ["cpl", "lessthanzero"];
}

/// A comma with optional surrounding whitespace, or just whitespace.
fn separator<'a>() -> impl Parser<'a, ()> {
    either((
        all((optional(ignored()), matches(SEPARATOR), optional(ignored())))
            .map_parsed(|_| ()),
        ignored(),
    ))
}

fn binary<'a>() -> impl Parser<'a, Shape<Argument>> {
    all((binary_mnemonic(), ignored(), register(), separator(), argument()))
        .map_parsed(|(opcode, _, register, _, argument)| Shape::Binary {
            opcode,
            register,
            argument,
        })
}

fn instruction<'a>() -> impl Parser<'a, Statement> {
    all((
        optional(many(label_definition())),
        either((nullary(), unary(), binary())),
    ))
    .map_parsed(|(labels, shape)| Statement {
        labels: labels.unwrap_or_default(),
        shape,
    })
}

fn program<'a>() -> impl Parser<'a, Vec<Statement>> {
    all((
        optional(ignored()),
        optional(instruction()),
        optional(many(all((ignored(), instruction())))),
        optional(ignored()),
    ))
    .map_parsed(|(_, first, rest, _)| {
        first
            .into_iter()
            .chain(rest.into_iter().flatten().map(|(_, statement)| statement))
            .collect::<Vec<_>>()
    })
}
