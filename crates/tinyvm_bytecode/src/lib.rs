//! Opcode table, instruction codec, and disassembly for tinyvm.
//!
//! This crate provides:
//! - [`OPCODE_TABLE`] / [`resolve`] - The fixed, dense opcode table
//! - [`Instruction`] - Typed instructions with wire and text encodings
//! - [`Bytecode`] - Encoded instruction streams, patching, and disassembly
//! - [`Program`] - An instruction stream plus its constant pool
//!
//! Everything that produces or consumes bytecode (assemblers, the
//! interpreter, disassemblers, debuggers) goes through this crate so the
//! encoding stays identical on both sides.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bytecode;
pub mod instruction;
pub mod opcode;
pub mod program;

pub use bytecode::{Bytecode, Instructions};
pub use instruction::Instruction;
pub use opcode::{
    OPCODE_COUNT, OPCODE_TABLE, OPERAND_WIDTH, Opcode, OpcodeDescriptor, OperandKind, resolve,
};
pub use program::Program;
