//! Core values, object handles, and the fault taxonomy for tinyvm.
//!
//! This crate provides:
//! - [`Value`] - The tagged datum stored on the operand stack and in object fields
//! - [`ObjectRef`] - Opaque handles to heap-owned object instances
//! - [`ClassId`] / [`NativeId`] - Identifiers shared by bytecode and registries
//! - [`Error`] - The fault taxonomy with execution context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod value;

pub use error::{
    DecodeFault, Error, ErrorContext, ErrorKind, FrameFault, NativeFault, ObjectFault, Result,
    StackFault,
};
pub use ids::{ClassId, NativeId, ObjectRef};
pub use value::Value;
