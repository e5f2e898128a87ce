//! Bytecode tests -- .bfc save/load and rejection of damaged files

use std::path::Path;

use sha2::{Digest, Sha256};

use brainvm::vm::bytecode::{BytecodeError, Program, ProgramBuilder};
use brainvm::vm::compiler::compile;
use brainvm::vm::machine::run;
use brainvm::vm::opcodes::Instruction;
use brainvm::{load_program, Error};

// ── Helpers ──────────────────────────────────────────────────────

const HELLO: &str = "+[-[<<[+[--->]-[<<<]]]>>>-]>-.---.>..>.<<<<-.<+.>>>>>.>.<<.<-.";

fn bytes_of(source: &str) -> Vec<u8> {
    compile(source.as_bytes()).unwrap().serialize().unwrap()
}

/// Replace the trailing digest so only the body is under test.
fn reseal(mut data: Vec<u8>) -> Vec<u8> {
    let body_len = data.len() - 32;
    let digest = Sha256::digest(&data[..body_len]);
    data[body_len..].copy_from_slice(&digest);
    data
}

/// Hand-assemble a sealed file from raw code bytes.
fn assemble(count: u32, code: &[u8]) -> Vec<u8> {
    let mut data = b"BFVC\x01".to_vec();
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(code);
    data.extend_from_slice(&[0u8; 32]);
    reseal(data)
}

// ── 1. Layout ────────────────────────────────────────────────────

#[test]
fn empty_program_layout() {
    let data = Program::default().serialize().unwrap();
    assert_eq!(data.len(), 5 + 4 + 32);
    assert_eq!(&data[..5], b"BFVC\x01");
    assert_eq!(&data[5..9], &[0, 0, 0, 0]);
}

#[test]
fn loop_encoding() {
    let data = bytes_of("[-]");
    assert_eq!(
        &data[5..data.len() - 32],
        &[3, 0, 0, 0, 0x11, 3, 0, 0, 0, 0x02, 0x10, 0, 0, 0, 0]
    );
}

#[test]
fn serialize_rejects_target_past_end() {
    let mut builder = ProgramBuilder::new();
    builder.emit(Instruction::Jump(5));
    assert_eq!(
        builder.finish().serialize(),
        Err(BytecodeError::TargetOutOfRange { addr: 0, target: 5, len: 1 })
    );
}

#[test]
fn serialize_rejects_target_beyond_u32() {
    let mut builder = ProgramBuilder::new();
    builder.emit(Instruction::Increment);
    builder.emit(Instruction::JumpIfZero(usize::MAX));
    assert_eq!(
        builder.finish().serialize(),
        Err(BytecodeError::TargetOutOfRange { addr: 1, target: usize::MAX, len: 2 })
    );
}

// ── 2. Loading ───────────────────────────────────────────────────

#[test]
fn loaded_program_matches_and_runs() {
    let original = compile(HELLO.as_bytes()).unwrap();
    let loaded = Program::deserialize(&original.serialize().unwrap()).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(run(&loaded).unwrap(), b"hello world");
}

#[test]
fn jump_to_end_is_accepted() {
    let mut builder = ProgramBuilder::new();
    builder.emit(Instruction::Jump(1));
    let program = builder.finish();
    let loaded = Program::deserialize(&program.serialize().unwrap()).unwrap();
    assert_eq!(loaded.get(0), Some(Instruction::Jump(1)));
    assert!(run(&loaded).unwrap().is_empty());
}

// ── 3. Rejection ─────────────────────────────────────────────────

#[test]
fn rejects_short_file() {
    assert_eq!(Program::deserialize(b"BFV"), Err(BytecodeError::TooSmall(3)));
}

#[test]
fn rejects_bad_magic() {
    assert_eq!(Program::deserialize(b"+++++[-]."), Err(BytecodeError::BadMagic));
}

#[test]
fn rejects_unknown_version() {
    let mut data = bytes_of("+");
    data[4] = 9;
    assert_eq!(Program::deserialize(&data), Err(BytecodeError::UnsupportedVersion(9)));
}

#[test]
fn rejects_missing_digest() {
    assert_eq!(Program::deserialize(b"BFVC\x01\x00\x00\x00\x00"), Err(BytecodeError::Truncated(9)));
}

#[test]
fn rejects_any_flipped_byte_after_header() {
    let data = bytes_of(HELLO);
    for i in 5..data.len() {
        let mut damaged = data.clone();
        damaged[i] ^= 0x40;
        assert_eq!(
            Program::deserialize(&damaged),
            Err(BytecodeError::DigestMismatch),
            "flip at byte {} was accepted",
            i
        );
    }
}

#[test]
fn rejects_unknown_opcode() {
    let data = assemble(2, &[0x01, 0x7f]);
    assert_eq!(
        Program::deserialize(&data),
        Err(BytecodeError::UnknownOpcode { op: 0x7f, pos: 10 })
    );
}

#[test]
fn rejects_truncated_jump() {
    let data = assemble(1, &[0x10, 0x00, 0x00]);
    assert_eq!(Program::deserialize(&data), Err(BytecodeError::Truncated(10)));
}

#[test]
fn rejects_count_larger_than_stream() {
    let data = assemble(3, &[0x01, 0x02]);
    assert_eq!(Program::deserialize(&data), Err(BytecodeError::Truncated(11)));
}

#[test]
fn rejects_trailing_bytes() {
    let data = assemble(1, &[0x01, 0x01, 0x01]);
    assert_eq!(Program::deserialize(&data), Err(BytecodeError::TrailingBytes(2)));
}

#[test]
fn rejects_target_past_end() {
    let data = assemble(2, &[0x11, 0x05, 0x00, 0x00, 0x00, 0x05]);
    assert_eq!(
        Program::deserialize(&data),
        Err(BytecodeError::TargetOutOfRange { addr: 0, target: 5, len: 2 })
    );
}

// ── 4. Choosing source or bytecode ───────────────────────────────

#[test]
fn source_starting_with_magic_is_compiled() {
    let program = load_program(Path::new("greet.bf"), b"BFVC says hi\n+++.").unwrap();
    assert_eq!(run(&program).unwrap(), vec![3]);
}

#[test]
fn bfc_extension_loads_bytecode() {
    let data = bytes_of(HELLO);
    let program = load_program(Path::new("out/hello.bfc"), &data).unwrap();
    assert_eq!(run(&program).unwrap(), b"hello world");

    let upper = load_program(Path::new("HELLO.BFC"), &data).unwrap();
    assert_eq!(upper, program);
}

#[test]
fn bfc_extension_with_source_is_bytecode_error() {
    let result = load_program(Path::new("prog.bfc"), b"+++++[-].");
    assert!(matches!(result, Err(Error::Bytecode(BytecodeError::BadMagic))));
}

#[test]
fn source_path_reports_compile_errors() {
    let result = load_program(Path::new("prog.b"), b"+[");
    assert!(matches!(result, Err(Error::Compile(_))));
}
