//! tinyvm - Stack-based, object-capable bytecode virtual machine
//!
//! This crate re-exports all layers of the tinyvm system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: tinyvm_runtime    - Program images, host builtins, CLI
//! Layer 2: tinyvm_vm         - Stack & frames, object model, natives, dispatch
//! Layer 1: tinyvm_bytecode   - Opcode table, instruction codec, disassembly
//! Layer 0: tinyvm_foundation - Core types (Value, ObjectRef, ClassId, Error)
//! ```

pub use tinyvm_bytecode as bytecode;
pub use tinyvm_foundation as foundation;
pub use tinyvm_runtime as runtime;
pub use tinyvm_vm as vm;
