//! brainvm instruction set

use std::fmt;

/// Bytecode instructions for the tape VM.
///
/// Instructions are Copy so the dispatch loop can fetch them by value.
/// Jump targets are absolute instruction indices into the owning program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ── Cell arithmetic ──────────────────────────────────────────────
    /// tape[dp] += 1, wrapping
    Increment,
    /// tape[dp] -= 1, wrapping
    Decrement,

    // ── Data pointer ─────────────────────────────────────────────────
    MoveRight,
    MoveLeft,

    // ── I/O ──────────────────────────────────────────────────────────
    /// Append tape[dp] to the output stream
    Output,

    // ── Control Flow ─────────────────────────────────────────────────
    /// Unconditional absolute jump
    Jump(usize),
    /// Jump if tape[dp] == 0, otherwise fall through
    JumpIfZero(usize),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Increment => "INCREMENT",
            Instruction::Decrement => "DECREMENT",
            Instruction::MoveRight => "MOVE_RIGHT",
            Instruction::MoveLeft => "MOVE_LEFT",
            Instruction::Output => "OUTPUT",
            Instruction::Jump(_) => "JUMP",
            Instruction::JumpIfZero(_) => "JUMP_IF_ZERO",
        }
    }

    /// Jump target, for the two jump variants.
    pub fn target(&self) -> Option<usize> {
        match *self {
            Instruction::Jump(t) | Instruction::JumpIfZero(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.target() {
            Some(t) => write!(f, "{} {}", self.mnemonic(), t),
            None => write!(f, "{}", self.mnemonic()),
        }
    }
}
