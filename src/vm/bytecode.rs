//! brainvm program representation and the `.bfc` bytecode format
//!
//! A `Program` is only ever produced frozen: the compiler assembles it in a
//! `ProgramBuilder`, where the single backpatch write is allowed, and calls
//! `finish` once every loop is closed.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::opcodes::Instruction;

/// A compiled, immutable instruction sequence
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    code: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn get(&self, addr: usize) -> Option<Instruction> {
        self.code.get(addr).copied()
    }

    /// One entry per instruction, in address order.
    pub fn listing(&self) -> Vec<ListingEntry> {
        self.code
            .iter()
            .enumerate()
            .map(|(addr, inst)| ListingEntry {
                addr,
                op: inst.mnemonic(),
                target: inst.target(),
            })
            .collect()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (addr, inst) in self.code.iter().enumerate() {
            writeln!(f, "{:>5}  {}", addr, inst)?;
        }
        Ok(())
    }
}

/// A single disassembled instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    pub addr: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<usize>,
}

// ── Builder ──────────────────────────────────────────────────────────────

/// A program under construction
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: Vec<Instruction>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next emitted instruction will occupy
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, inst: Instruction) -> usize {
        let idx = self.code.len();
        self.code.push(inst);
        idx
    }

    /// Write the real target into the JumpIfZero at `idx`.
    pub(crate) fn patch_jump_if_zero(&mut self, idx: usize, target: usize) {
        match &mut self.code[idx] {
            Instruction::JumpIfZero(t) => *t = target,
            other => unreachable!("backpatch at {} hit {}, not JUMP_IF_ZERO", idx, other),
        }
    }

    pub fn finish(self) -> Program {
        Program { code: self.code }
    }
}

// ── Binary serialization ─────────────────────────────────────────────────

/// File extension that marks a path as compiled bytecode
pub const BYTECODE_EXTENSION: &str = "bfc";

const MAGIC: &[u8; 4] = b"BFVC";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 5;
const DIGEST_LEN: usize = 32;

const OP_INCREMENT: u8 = 0x01;
const OP_DECREMENT: u8 = 0x02;
const OP_MOVE_RIGHT: u8 = 0x03;
const OP_MOVE_LEFT: u8 = 0x04;
const OP_OUTPUT: u8 = 0x05;
const OP_JUMP: u8 = 0x10;
const OP_JUMP_IF_ZERO: u8 = 0x11;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("file too small to be bytecode ({0} bytes)")]
    TooSmall(usize),
    #[error("invalid magic number, not a .bfc file")]
    BadMagic,
    #[error("unsupported bytecode version: {0}")]
    UnsupportedVersion(u8),
    #[error("bytecode digest mismatch, file is corrupt")]
    DigestMismatch,
    #[error("unexpected end of bytecode at byte {0}")]
    Truncated(usize),
    #[error("unknown opcode 0x{op:02x} at byte {pos}")]
    UnknownOpcode { op: u8, pos: usize },
    #[error("jump at {addr} targets {target}, past the end of a {len}-instruction program")]
    TargetOutOfRange { addr: usize, target: usize, len: usize },
    #[error("{0} trailing bytes after instruction stream")]
    TrailingBytes(usize),
    #[error("program too large for bytecode: {0} instructions")]
    TooLarge(usize),
}

impl Program {
    /// Encode as `.bfc`. Every jump target must lie within `0..=len`, so
    /// whatever is written here loads back through `deserialize`.
    pub fn serialize(&self) -> Result<Vec<u8>, BytecodeError> {
        let len = self.code.len();
        let count = u32::try_from(len).map_err(|_| BytecodeError::TooLarge(len))?;
        check_targets(&self.code)?;
        let mut buf = Vec::with_capacity(HEADER_LEN + 4 + self.code.len() + DIGEST_LEN);

        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        write_u32(&mut buf, count);
        for inst in &self.code {
            serialize_instruction(&mut buf, inst);
        }

        let digest = Sha256::digest(&buf);
        buf.extend_from_slice(&digest);

        debug!(instructions = self.code.len(), bytes = buf.len(), "serialized program");
        Ok(buf)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, BytecodeError> {
        if data.len() < HEADER_LEN {
            return Err(BytecodeError::TooSmall(data.len()));
        }
        if !data.starts_with(MAGIC) {
            return Err(BytecodeError::BadMagic);
        }
        let version = data[4];
        if version != VERSION {
            return Err(BytecodeError::UnsupportedVersion(version));
        }
        if data.len() < HEADER_LEN + 4 + DIGEST_LEN {
            return Err(BytecodeError::Truncated(data.len()));
        }

        let (body, stored) = data.split_at(data.len() - DIGEST_LEN);
        if Sha256::digest(body).as_slice() != stored {
            return Err(BytecodeError::DigestMismatch);
        }

        let mut pos = HEADER_LEN;
        let count = read_u32(body, &mut pos)? as usize;
        let mut code = Vec::with_capacity(count.min(body.len()));
        for _ in 0..count {
            code.push(deserialize_instruction(body, &mut pos)?);
        }
        if pos != body.len() {
            return Err(BytecodeError::TrailingBytes(body.len() - pos));
        }

        check_targets(&code)?;

        debug!(instructions = count, bytes = data.len(), "loaded bytecode");
        Ok(Program { code })
    }
}

// ── Serialization helpers ────────────────────────────────────────────────

/// A target equal to the length is a jump straight to termination.
fn check_targets(code: &[Instruction]) -> Result<(), BytecodeError> {
    let len = code.len();
    for (addr, inst) in code.iter().enumerate() {
        if let Some(target) = inst.target() {
            if target > len {
                return Err(BytecodeError::TargetOutOfRange { addr, target, len });
            }
        }
    }
    Ok(())
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn serialize_instruction(buf: &mut Vec<u8>, inst: &Instruction) {
    match *inst {
        Instruction::Increment => buf.push(OP_INCREMENT),
        Instruction::Decrement => buf.push(OP_DECREMENT),
        Instruction::MoveRight => buf.push(OP_MOVE_RIGHT),
        Instruction::MoveLeft => buf.push(OP_MOVE_LEFT),
        Instruction::Output => buf.push(OP_OUTPUT),
        // Targets were checked against the count, which fits in u32.
        Instruction::Jump(t) => {
            buf.push(OP_JUMP);
            write_u32(buf, t as u32);
        }
        Instruction::JumpIfZero(t) => {
            buf.push(OP_JUMP_IF_ZERO);
            write_u32(buf, t as u32);
        }
    }
}

// ── Deserialization helpers ──────────────────────────────────────────────

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, BytecodeError> {
    if *pos + 4 > data.len() {
        return Err(BytecodeError::Truncated(*pos));
    }
    let v = u32::from_le_bytes([data[*pos], data[*pos + 1], data[*pos + 2], data[*pos + 3]]);
    *pos += 4;
    Ok(v)
}

fn deserialize_instruction(data: &[u8], pos: &mut usize) -> Result<Instruction, BytecodeError> {
    let op = *data.get(*pos).ok_or(BytecodeError::Truncated(*pos))?;
    let at = *pos;
    *pos += 1;
    match op {
        OP_INCREMENT => Ok(Instruction::Increment),
        OP_DECREMENT => Ok(Instruction::Decrement),
        OP_MOVE_RIGHT => Ok(Instruction::MoveRight),
        OP_MOVE_LEFT => Ok(Instruction::MoveLeft),
        OP_OUTPUT => Ok(Instruction::Output),
        OP_JUMP => Ok(Instruction::Jump(read_u32(data, pos)? as usize)),
        OP_JUMP_IF_ZERO => Ok(Instruction::JumpIfZero(read_u32(data, pos)? as usize)),
        _ => Err(BytecodeError::UnknownOpcode { op, pos: at }),
    }
}
