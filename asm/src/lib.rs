// Copyright (C) 2024 Ethan Uppal. All rights reserved.

#![forbid(unsafe_code)]

pub mod assemble;
pub mod error;
pub mod grammar;
pub mod parse;

pub use assemble::{assemble, assemble_with, AssemblerConfig, Assembly};
pub use error::AssemblyError;
