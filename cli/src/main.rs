// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use asm::{assemble_with, AssemblerConfig};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, LevelFilter};
use machine::{
    memory::{Encoding, Memory},
    vm::VM,
};
use simple_logger::SimpleLogger;

#[derive(Parser, Debug)]
#[command(version, about = "Assembler and virtual machine for the minicomp computer")]
struct Cli {
    /// More logging: -v info, -vv debug, -vvv trace.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assembles a source file into an encoded memory image.
    Assemble {
        source: PathBuf,
        /// Where to write the image; standard output if omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// binary, decimal, hex or base64url.
        #[arg(short, long, default_value_t)]
        format: Encoding,
        /// Pad the image with zeroed bytes up to this size.
        #[arg(long)]
        memory_bytes: Option<usize>,
        /// Print the address of every instruction to standard error.
        #[arg(long)]
        listing: bool,
    },
    /// Runs an encoded memory image, or a source file with `--source`,
    /// until it halts.
    Run {
        file: PathBuf,
        #[arg(short, long, default_value_t)]
        format: Encoding,
        /// Treat the file as assembly source.
        #[arg(long)]
        source: bool,
        /// With `--source`, the size of the assembled image.
        #[arg(long, requires = "source")]
        memory_bytes: Option<usize>,
        /// Give up after this many instructions.
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print the final memory in this encoding.
        #[arg(long)]
        dump: Option<Encoding>,
    },
    /// Re-encodes a memory image, or shows it as a hex dump.
    Dump {
        file: PathBuf,
        #[arg(long, default_value_t)]
        from: Encoding,
        /// Shows a hex dump if omitted.
        #[arg(long)]
        to: Option<Encoding>,
    },
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
}

fn assemble_file(
    path: &Path,
    memory_bytes: Option<usize>,
    listing: bool,
) -> anyhow::Result<Memory> {
    let source = read(path)?;
    let assembly = assemble_with(&source, &AssemblerConfig { memory_bytes })
        .with_context(|| format!("failed to assemble {}", path.display()))?;
    if listing {
        eprint!("{assembly}");
    }
    info!(
        "assembled {} into {} bytes",
        path.display(),
        assembly.memory().len_bytes()
    );
    Ok(assembly.into_memory())
}

fn load(path: &Path, encoding: Encoding) -> anyhow::Result<Memory> {
    Memory::from_encoded(&read(path)?, encoding).with_context(|| {
        format!("failed to decode {} as {encoding}", path.display())
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    SimpleLogger::new().with_level(level).init()?;

    match cli.command {
        Command::Assemble {
            source,
            output,
            format,
            memory_bytes,
            listing,
        } => {
            let memory = assemble_file(&source, memory_bytes, listing)?;
            let mut text = memory.to_encoded(format);
            text.push('\n');
            match output {
                Some(output) => fs::write(&output, text).with_context(|| {
                    format!("failed to write {}", output.display())
                })?,
                None => print!("{text}"),
            }
        }
        Command::Run {
            file,
            format,
            source,
            memory_bytes,
            max_steps,
            dump,
        } => {
            let memory = if source {
                assemble_file(&file, memory_bytes, false)?
            } else {
                load(&file, format)?
            };
            let mut vm = VM::new(memory);
            let summary = vm
                .run(max_steps)
                .with_context(|| format!("{} stopped at pc {}", file.display(), vm.pc()))?;
            let [r0, r1, r2] = vm.registers();
            println!(
                "halted after {} steps at pc {}: R0={r0} R1={r1} R2={r2}",
                summary.steps,
                vm.pc()
            );
            if let Some(encoding) = dump {
                println!("{}", vm.memory().to_encoded(encoding));
            }
        }
        Command::Dump { file, from, to } => {
            let memory = load(&file, from)?;
            match to {
                Some(encoding) => println!("{}", memory.to_encoded(encoding)),
                None => println!("{memory}"),
            }
        }
    }

    Ok(())
}
