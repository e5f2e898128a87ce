//! brainvm virtual machine: flat fetch-decode-execute over a byte tape
//!
//! - Instructions are Copy; jump targets are absolute, so loop re-entry is
//!   just an `ip` store and nesting depth never reaches the call stack
//! - The tape is a boxed slice sized once at construction
//! - Cell arithmetic wraps modulo 256; pointer movement is bounds checked
//!   at the moment it happens

use std::io::{self, Write};

use thiserror::Error;
use tracing::{debug, trace};

use super::bytecode::Program;
use super::opcodes::Instruction;

/// Canonical tape length
pub const TAPE_LEN: usize = 30_000;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(
        "data pointer out of bounds at instruction {ip}: \
         {direction} from cell {from} on a {tape_len}-cell tape"
    )]
    OutOfBounds {
        ip: usize,
        from: usize,
        direction: Direction,
        tape_len: usize,
    },
    #[error("step limit of {limit} instructions exceeded at instruction {ip}")]
    StepLimitExceeded { limit: u64, ip: usize },
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// Direction of an attempted data pointer move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Run configuration. The default is the canonical machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    pub tape_len: usize,
    /// Caller-side budget; `None` runs until the program ends.
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            tape_len: TAPE_LEN,
            max_steps: None,
        }
    }
}

/// The tape virtual machine. One instance per run.
pub struct VM {
    program: Program,
    tape: Box<[u8]>,
    ip: usize,
    dp: usize,
    steps: u64,
    max_steps: Option<u64>,
}

impl VM {
    pub fn new(program: Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: Program, config: VmConfig) -> Self {
        Self {
            program,
            // The current cell must always exist.
            tape: vec![0u8; config.tape_len.max(1)].into_boxed_slice(),
            ip: 0,
            dp: 0,
            steps: 0,
            max_steps: config.max_steps,
        }
    }

    /// Run to completion, collecting the output bytes.
    pub fn run(&mut self) -> Result<Vec<u8>, RuntimeError> {
        let mut output = Vec::new();
        self.run_with_output(&mut output)?;
        Ok(output)
    }

    /// Run to completion, writing each Output byte to `out` as it is produced.
    pub fn run_with_output<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
    ) -> Result<(), RuntimeError> {
        debug!(
            instructions = self.program.len(),
            tape_len = self.tape.len(),
            "run started"
        );

        while self.ip < self.program.len() {
            if let Some(limit) = self.max_steps {
                if self.steps >= limit {
                    return Err(RuntimeError::StepLimitExceeded { limit, ip: self.ip });
                }
            }

            let inst = self.program.instructions()[self.ip];
            trace!(ip = self.ip, dp = self.dp, %inst, "dispatch");
            self.dispatch(inst, out)?;
            self.steps += 1;
        }

        debug!(steps = self.steps, dp = self.dp, "run finished");
        Ok(())
    }

    // ── Instruction dispatch ─────────────────────────────────────────

    fn dispatch<W: Write + ?Sized>(
        &mut self,
        inst: Instruction,
        out: &mut W,
    ) -> Result<(), RuntimeError> {
        match inst {
            Instruction::Increment => {
                self.tape[self.dp] = self.tape[self.dp].wrapping_add(1);
                self.ip += 1;
            }
            Instruction::Decrement => {
                self.tape[self.dp] = self.tape[self.dp].wrapping_sub(1);
                self.ip += 1;
            }
            Instruction::MoveRight => {
                if self.dp + 1 >= self.tape.len() {
                    return Err(self.out_of_bounds(Direction::Right));
                }
                self.dp += 1;
                self.ip += 1;
            }
            Instruction::MoveLeft => {
                if self.dp == 0 {
                    return Err(self.out_of_bounds(Direction::Left));
                }
                self.dp -= 1;
                self.ip += 1;
            }
            Instruction::Output => {
                out.write_all(&[self.tape[self.dp]])?;
                self.ip += 1;
            }
            Instruction::Jump(target) => {
                self.ip = target;
            }
            Instruction::JumpIfZero(target) => {
                if self.tape[self.dp] == 0 {
                    self.ip = target;
                } else {
                    self.ip += 1;
                }
            }
        }
        Ok(())
    }

    fn out_of_bounds(&self, direction: Direction) -> RuntimeError {
        RuntimeError::OutOfBounds {
            ip: self.ip,
            from: self.dp,
            direction,
            tape_len: self.tape.len(),
        }
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn tape(&self) -> &[u8] {
        &self.tape
    }

    pub fn data_pointer(&self) -> usize {
        self.dp
    }

    pub fn instruction_pointer(&self) -> usize {
        self.ip
    }

    /// Instructions executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Run `program` on a fresh default VM.
pub fn run(program: &Program) -> Result<Vec<u8>, RuntimeError> {
    VM::new(program.clone()).run()
}
