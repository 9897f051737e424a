// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use machine::memory::MemoryError;
use thiserror::Error;

/// Errors that can occur while assembling a program.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// The grammar did not match the whole source.
    #[error("failed to parse assembly at {line}:{column} starting from: {near}")]
    Parse {
        line: usize,
        column: usize,
        /// The rest of the line where parsing stopped.
        near: String,
    },
    #[error("label @{label} is defined more than once")]
    DuplicateLabel { label: String },
    #[error("reference to undefined label @{label}")]
    UndefinedLabel { label: String },
    #[error("store @ {address} uses invalid immediate addressing mode")]
    ImmediateStore { address: usize },
    #[error("operand {value} @ {address} does not fit in 16 bits")]
    OperandTooWide { value: u64, address: usize },
    #[error("mem {value} @ {address} does not fit in a byte")]
    DataTooWide { value: u64, address: usize },
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub type AssemblyResult<T> = Result<T, AssemblyError>;
