//! Program images, host builtins, and CLI for tinyvm.
//!
//! This crate provides:
//! - [`ProgramImage`] - Serializable programs with their class tables
//! - [`builtins`] - `Int`, `String`, `Bool`, and object builtins at fixed ids
//! - [`Session`] - A loaded program plus the registries it runs against
//! - The `tinyvm` binary (`run` and `disasm` subcommands)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod builtins;
pub mod image;
pub mod session;

pub use builtins::{OutputBuffer, PrintSink, builtin_natives, register_builtins, stdout_sink};
pub use image::{
    ClassEntry, FORMAT_VERSION, ProgramImage, from_bytes, load_from_file, save_to_file, to_bytes,
};
pub use session::Session;
