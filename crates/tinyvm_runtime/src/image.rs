//! Program images and their `MessagePack` encoding.
//!
//! An image bundles everything a VM needs besides host natives: the class
//! table, the constant pool, the entry position, and the raw instruction
//! stream. Images are the interchange format between whatever produces
//! bytecode and the `tinyvm` binary.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tinyvm_bytecode::{Bytecode, Program};
use tinyvm_foundation::{ClassId, Error, ErrorKind, Result, Value};
use tinyvm_vm::{ClassDescriptor, ClassRegistry};

/// Current image format version.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized form of a [`ClassDescriptor`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    /// Class id.
    pub id: ClassId,
    /// Class name.
    pub name: String,
    /// Number of fields.
    pub field_count: u32,
    /// Optional parent class.
    pub parent: Option<ClassId>,
}

impl From<&ClassDescriptor> for ClassEntry {
    fn from(descriptor: &ClassDescriptor) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name.clone(),
            field_count: descriptor.field_count,
            parent: descriptor.parent,
        }
    }
}

impl From<ClassEntry> for ClassDescriptor {
    fn from(entry: ClassEntry) -> Self {
        let descriptor = ClassDescriptor::new(entry.id, entry.name, entry.field_count);
        match entry.parent {
            Some(parent) => descriptor.with_parent(parent),
            None => descriptor,
        }
    }
}

/// A self-contained, serializable program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramImage {
    /// Format version, checked on load.
    pub version: u32,
    /// Class table.
    pub classes: Vec<ClassEntry>,
    /// Constant pool.
    pub constants: Vec<Value>,
    /// Entry position.
    pub entry: usize,
    /// Encoded instruction stream.
    pub code: Vec<u8>,
}

impl ProgramImage {
    /// Captures a program and its class table.
    #[must_use]
    pub fn new(program: &Program, classes: &ClassRegistry) -> Self {
        Self {
            version: FORMAT_VERSION,
            classes: classes.iter().map(ClassEntry::from).collect(),
            constants: program.constants.clone(),
            entry: program.entry,
            code: program.code.as_bytes().to_vec(),
        }
    }

    /// Splits the image into a runnable program and a validated class table.
    ///
    /// # Errors
    ///
    /// Returns an error if the class table is invalid.
    pub fn into_parts(self) -> Result<(Program, ClassRegistry)> {
        let classes = ClassRegistry::builder()
            .classes(self.classes.into_iter().map(ClassDescriptor::from))
            .build()?;
        let program =
            Program::new(Bytecode::from_bytes(self.code), self.constants).with_entry(self.entry);
        Ok((program, classes))
    }
}

fn serialization_error(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::Serialization(e.to_string()))
}

/// Serializes an image to bytes using `MessagePack` format.
///
/// Uses named serialization to preserve struct field names.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(image: &ProgramImage) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(image).map_err(serialization_error)
}

/// Deserializes an image from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails or the format version is not
/// [`FORMAT_VERSION`].
pub fn from_bytes(bytes: &[u8]) -> Result<ProgramImage> {
    let image: ProgramImage = rmp_serde::from_slice(bytes).map_err(serialization_error)?;
    if image.version != FORMAT_VERSION {
        return Err(serialization_error(format!(
            "unsupported image version {} (expected {FORMAT_VERSION})",
            image.version
        )));
    }
    Ok(image)
}

/// Saves an image to a file using `MessagePack` format.
///
/// Creates the file if it doesn't exist, or overwrites it if it does.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to,
/// or if serialization fails.
pub fn save_to_file<P: AsRef<Path>>(image: &ProgramImage, path: P) -> Result<()> {
    let path = path.as_ref();
    let io_error = |action: &str, e: std::io::Error| {
        Error::new(ErrorKind::Io(format!(
            "failed to {action} '{}': {e}",
            path.display()
        )))
    };

    let bytes = to_bytes(image)?;
    let file = File::create(path).map_err(|e| io_error("create file", e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&bytes)
        .map_err(|e| io_error("write to file", e))?;
    writer.flush().map_err(|e| io_error("flush file", e))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved image");
    Ok(())
}

/// Loads an image from a `MessagePack` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or if deserialization fails.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<ProgramImage> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to open file '{}': {e}",
            path.display()
        )))
    })?;

    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).map_err(|e| {
        Error::new(ErrorKind::Io(format!(
            "failed to read file '{}': {e}",
            path.display()
        )))
    })?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "loaded image");
    from_bytes(&bytes)
}
