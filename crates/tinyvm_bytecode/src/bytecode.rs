//! Encoded instruction streams.

use std::fmt::Write as _;

use tinyvm_foundation::DecodeFault;

use crate::instruction::Instruction;

/// A flat, encoded instruction stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bytecode {
    code: Vec<u8>,
}

impl Bytecode {
    /// Creates an empty instruction stream.
    #[must_use]
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Wraps already-encoded bytes. The bytes are not validated.
    #[must_use]
    pub fn from_bytes(code: Vec<u8>) -> Self {
        Self { code }
    }

    /// Encodes a sequence of instructions.
    #[must_use]
    pub fn from_instructions<I: IntoIterator<Item = Instruction>>(instructions: I) -> Self {
        let mut bc = Self::new();
        for instruction in instructions {
            bc.emit(instruction);
        }
        bc
    }

    /// Parses a listing with one instruction per line.
    ///
    /// Blank lines and `#` comments are skipped. A leading `<offset>:` prefix,
    /// as written by [`Bytecode::disassemble`], is ignored.
    ///
    /// # Errors
    ///
    /// Returns the first [`DecodeFault`] raised by a line that does not parse.
    pub fn from_listing(listing: &str) -> Result<Self, DecodeFault> {
        let mut bc = Self::new();
        for line in listing.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let line = match line.split_once(':') {
                Some((prefix, rest))
                    if !prefix.trim().is_empty()
                        && prefix.trim().chars().all(|c| c.is_ascii_digit()) =>
                {
                    rest.trim()
                }
                _ => line,
            };
            if line.is_empty() {
                continue;
            }
            bc.emit(line.parse()?);
        }
        Ok(bc)
    }

    /// Appends an instruction and returns its position.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let at = self.code.len();
        instruction.encode_into(&mut self.code);
        at
    }

    /// Returns the position the next instruction will be emitted at.
    #[must_use]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Returns the length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// Consumes the stream and returns its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    /// Decodes the instruction at `pc`.
    ///
    /// # Errors
    ///
    /// See [`Instruction::decode`].
    pub fn decode_at(&self, pc: usize) -> Result<(Instruction, usize), DecodeFault> {
        Instruction::decode(&self.code, pc)
    }

    /// Iterates over `(position, instruction)` pairs in stream order.
    ///
    /// Iteration stops after the first decode fault, which is yielded.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            code: &self.code,
            pc: 0,
            failed: false,
        }
    }

    /// Re-targets the jump at `at` so that it lands on `target`.
    ///
    /// # Panics
    /// Panics if the instruction at `at` is not a jump, or if the distance
    /// does not fit an `i32`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn patch_jump(&mut self, at: usize, target: usize) {
        let (instruction, next) = self
            .decode_at(at)
            .unwrap_or_else(|e| panic!("Cannot patch undecodable instruction at {at}: {e}"));
        let offset = i32::try_from(target as i64 - next as i64)
            .unwrap_or_else(|_| panic!("Jump from {at} to {target} does not fit an i32"));
        let patched = match instruction {
            Instruction::Jump(_) => Instruction::Jump(offset),
            Instruction::JumpIf(_) => Instruction::JumpIf(offset),
            Instruction::JumpIfNot(_) => Instruction::JumpIfNot(offset),
            other => panic!("Cannot patch non-jump instruction: {other}"),
        };
        self.overwrite(at, patched);
    }

    /// Re-targets the call at `at` to the method entry `target`.
    ///
    /// # Panics
    /// Panics if the instruction at `at` is not a `call`, or if `target`
    /// does not fit a `u32`.
    pub fn patch_call(&mut self, at: usize, target: usize) {
        let target = u32::try_from(target)
            .unwrap_or_else(|_| panic!("Call target {target} does not fit a u32"));
        match self.decode_at(at) {
            Ok((Instruction::Call(_), _)) => self.overwrite(at, Instruction::Call(target)),
            Ok((other, _)) => panic!("Cannot patch non-call instruction: {other}"),
            Err(e) => panic!("Cannot patch undecodable instruction at {at}: {e}"),
        }
    }

    fn overwrite(&mut self, at: usize, instruction: Instruction) {
        let mut encoded = Vec::with_capacity(instruction.encoded_len());
        instruction.encode_into(&mut encoded);
        self.code[at..at + encoded.len()].copy_from_slice(&encoded);
    }

    /// Renders one line per instruction, each prefixed by its position.
    ///
    /// # Errors
    ///
    /// Returns the first [`DecodeFault`] encountered.
    pub fn disassemble(&self) -> Result<String, DecodeFault> {
        let mut out = String::new();
        for item in self.instructions() {
            let (pc, instruction) = item?;
            let _ = writeln!(out, "{pc:>6}: {instruction}");
        }
        Ok(out)
    }
}

/// Iterator over the instructions of a [`Bytecode`].
pub struct Instructions<'a> {
    code: &'a [u8],
    pc: usize,
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = Result<(usize, Instruction), DecodeFault>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc >= self.code.len() {
            return None;
        }
        match Instruction::decode(self.code, self.pc) {
            Ok((instruction, next)) => {
                let at = self.pc;
                self.pc = next;
                Some(Ok((at, instruction)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
