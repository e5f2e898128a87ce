pub mod vm;

use std::path::Path;

use thiserror::Error;

pub use vm::bytecode::{BytecodeError, ListingEntry, Program, ProgramBuilder, BYTECODE_EXTENSION};
pub use vm::compiler::{compile, CompileError, Compiler};
pub use vm::machine::{run, Direction, RuntimeError, VmConfig, TAPE_LEN, VM};
pub use vm::opcodes::Instruction;

/// Loading, compiling or running a program failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Compile `source` and run it on a fresh default VM.
pub fn run_source(source: &[u8]) -> Result<Vec<u8>, Error> {
    let program = compile(source)?;
    Ok(run(&program)?)
}

/// Build a program from file contents. Paths ending in `.bfc` are loaded
/// as bytecode; anything else is compiled as source, whatever its bytes.
pub fn load_program(path: &Path, data: &[u8]) -> Result<Program, Error> {
    let is_bytecode = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case(BYTECODE_EXTENSION));
    if is_bytecode {
        Ok(Program::deserialize(data)?)
    } else {
        Ok(compile(data)?)
    }
}
