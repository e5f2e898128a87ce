//! Bytecode compiler: source bytes → Program
//!
//! One left-to-right pass over the source. Every `[` emits a JumpIfZero
//! with a placeholder target and records its address; the matching `]`
//! emits a Jump back to that address and backpatches the JumpIfZero to
//! land just past the Jump.

use thiserror::Error;
use tracing::debug;

use super::bytecode::{Program, ProgramBuilder};
use super::opcodes::Instruction;

/// Structural errors found while compiling. Offsets are source byte offsets.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unmatched ']' at offset {offset}")]
    UnmatchedClose { offset: usize },
    #[error("unterminated loop: '[' at offset {offset} is never closed")]
    UnterminatedLoop { offset: usize },
}

/// An open loop awaiting its `]`
#[derive(Debug, Clone, Copy)]
struct OpenLoop {
    addr: usize,
    offset: usize,
}

pub struct Compiler {
    builder: ProgramBuilder,
    open_loops: Vec<OpenLoop>,
    loop_count: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            builder: ProgramBuilder::new(),
            open_loops: Vec::new(),
            loop_count: 0,
        }
    }

    pub fn compile(mut self, source: &[u8]) -> Result<Program, CompileError> {
        for (offset, &byte) in source.iter().enumerate() {
            match byte {
                b'+' => self.emit(Instruction::Increment),
                b'-' => self.emit(Instruction::Decrement),
                b'>' => self.emit(Instruction::MoveRight),
                b'<' => self.emit(Instruction::MoveLeft),
                b'.' => self.emit(Instruction::Output),
                b'[' => self.open_loop(offset),
                b']' => self.close_loop(offset)?,
                _ => {}
            }
        }

        if let Some(innermost) = self.open_loops.last() {
            return Err(CompileError::UnterminatedLoop { offset: innermost.offset });
        }

        let program = self.builder.finish();
        debug!(
            source_bytes = source.len(),
            instructions = program.len(),
            loops = self.loop_count,
            "compiled program"
        );
        Ok(program)
    }

    fn emit(&mut self, inst: Instruction) {
        self.builder.emit(inst);
    }

    fn open_loop(&mut self, offset: usize) {
        // Placeholder target; patched when the matching `]` arrives.
        let addr = self.builder.emit(Instruction::JumpIfZero(0));
        self.open_loops.push(OpenLoop { addr, offset });
    }

    fn close_loop(&mut self, offset: usize) -> Result<(), CompileError> {
        let open = self
            .open_loops
            .pop()
            .ok_or(CompileError::UnmatchedClose { offset })?;
        self.builder.emit(Instruction::Jump(open.addr));
        let after_loop = self.builder.current_offset();
        self.builder.patch_jump_if_zero(open.addr, after_loop);
        self.loop_count += 1;
        Ok(())
    }
}

/// Compile `source` with a fresh compiler.
pub fn compile(source: &[u8]) -> Result<Program, CompileError> {
    Compiler::new().compile(source)
}
