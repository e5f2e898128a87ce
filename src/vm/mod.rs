//! brainvm virtual machine
//!
//! Single-pass backpatching compiler and a flat tape VM.

pub mod opcodes;
pub mod bytecode;
pub mod compiler;
pub mod machine;
