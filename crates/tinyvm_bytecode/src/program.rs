//! Executable programs: code plus constant pool.

use tinyvm_foundation::{DecodeFault, Value};

use crate::bytecode::Bytecode;

/// An instruction stream together with the constants it references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    /// The instruction stream.
    pub code: Bytecode,
    /// Constant pool indexed by `const` operands.
    pub constants: Vec<Value>,
    /// Position execution starts at.
    pub entry: usize,
}

impl Program {
    /// Creates a program starting at position 0.
    #[must_use]
    pub fn new(code: Bytecode, constants: Vec<Value>) -> Self {
        Self {
            code,
            constants,
            entry: 0,
        }
    }

    /// Sets the entry position.
    #[must_use]
    pub fn with_entry(mut self, entry: usize) -> Self {
        self.entry = entry;
        self
    }

    /// Looks up a constant.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeFault::ConstantOutOfRange`] if the pool has no such entry.
    pub fn constant(&self, index: u32) -> Result<&Value, DecodeFault> {
        self.constants
            .get(index as usize)
            .ok_or(DecodeFault::ConstantOutOfRange {
                index,
                len: self.constants.len(),
            })
    }

    /// Adds a constant to the pool, reusing an equal entry if present.
    ///
    /// Returns `None` when the pool is full and `value` is new.
    pub fn intern_constant(&mut self, value: Value) -> Option<u32> {
        if let Some(existing) = self.constants.iter().position(|c| *c == value) {
            return u32::try_from(existing).ok();
        }
        let index = u32::try_from(self.constants.len()).ok()?;
        self.constants.push(value);
        Some(index)
    }
}
