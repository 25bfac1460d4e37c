//! Operand stack, call frames, object model, native trampoline, and
//! dispatch loop for tinyvm.
//!
//! This crate provides:
//! - [`Stack`] / [`Frame`] - The shared operand stack and its locals windows
//! - [`ClassRegistry`] - Immutable class descriptors with ancestor closures
//! - [`Heap`] / [`ArenaHeap`] - Instance storage behind opaque references
//! - [`NativeRegistry`] - Host functions reachable through `call_native`
//! - [`Vm`] - The fetch-decode-execute loop
//!
//! # Calling convention
//!
//! The caller pushes arguments and executes `call <target>`. The callee
//! opens its locals window with `enter`, reserves locals with `alloc`, reads
//! arguments at negative offsets and locals at non-negative offsets, and
//! finishes with `return <n>`, where `n` counts the arguments and locals to
//! reclaim beneath the return value.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancel;
pub mod class;
pub mod config;
pub mod heap;
pub mod native;
pub mod stack;
pub mod vm;

pub use cancel::CancelToken;
pub use class::{ClassDescriptor, ClassRegistry, ClassRegistryBuilder};
pub use config::VmConfig;
pub use heap::{ArenaHeap, Heap, ObjectInstance};
pub use native::{NativeFn, NativeRegistry, NativeResult};
pub use stack::{Frame, Stack};
pub use vm::{Outcome, Step, Vm};
