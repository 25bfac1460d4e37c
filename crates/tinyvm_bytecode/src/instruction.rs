//! Decoded instructions and their wire encoding.
//!
//! Each instruction is one opcode byte followed, for arity-1 opcodes, by a
//! four-byte little-endian operand. Jump offsets and local offsets are
//! two's-complement `i32`; every other operand is a `u32`.

use std::fmt;
use std::str::FromStr;

use tinyvm_foundation::{ClassId, DecodeFault, NativeId};

use crate::opcode::{OPERAND_WIDTH, Opcode, OperandKind, resolve};

/// A single decoded instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// Stop execution.
    Halt,
    /// Push a constant from the constant pool.
    Const(u32),
    /// Call the method whose entry is at this absolute byte position.
    Call(u32),
    /// Call a host function.
    CallNative(NativeId),
    /// Method prologue: the locals window starts at the current stack top.
    Enter,
    /// Return the top of stack, reclaiming this many argument and local slots.
    Return(u32),
    /// Allocate an instance: `[] -> [ref]`
    New(ClassId),
    /// Discard the top of stack.
    Pop,
    /// Reserve local slots initialized to `Nothing`.
    Alloc(u32),
    /// Push a local slot (negative offsets address arguments).
    Load(i32),
    /// Pop into a local slot (negative offsets address arguments).
    Store(i32),
    /// Read a field: `[ref] -> [value]`
    LoadField(u32),
    /// Write a field: `[value, ref] -> []`
    StoreField(u32),
    /// `[o, a1 .. an] -> [a1 .. an, o]`
    Roll(u32),
    /// Unconditional relative jump.
    Jump(i32),
    /// Pop a condition and jump if it is truthy.
    JumpIf(i32),
    /// Pop a condition and jump if it is falsy.
    JumpIfNot(i32),
    /// Class membership test: `[ref] -> [ref, bool]`
    IsInstance(ClassId),
}

impl Instruction {
    /// Returns the opcode of this instruction.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Halt => Opcode::Halt,
            Self::Const(_) => Opcode::Const,
            Self::Call(_) => Opcode::Call,
            Self::CallNative(_) => Opcode::CallNative,
            Self::Enter => Opcode::Enter,
            Self::Return(_) => Opcode::Return,
            Self::New(_) => Opcode::New,
            Self::Pop => Opcode::Pop,
            Self::Alloc(_) => Opcode::Alloc,
            Self::Load(_) => Opcode::Load,
            Self::Store(_) => Opcode::Store,
            Self::LoadField(_) => Opcode::LoadField,
            Self::StoreField(_) => Opcode::StoreField,
            Self::Roll(_) => Opcode::Roll,
            Self::Jump(_) => Opcode::Jump,
            Self::JumpIf(_) => Opcode::JumpIf,
            Self::JumpIfNot(_) => Opcode::JumpIfNot,
            Self::IsInstance(_) => Opcode::IsInstance,
        }
    }

    /// Returns the raw operand bits, or `None` for arity-0 instructions.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn operand_bits(&self) -> Option<u32> {
        match *self {
            Self::Halt | Self::Enter | Self::Pop => None,
            Self::Const(n)
            | Self::Call(n)
            | Self::Return(n)
            | Self::Alloc(n)
            | Self::LoadField(n)
            | Self::StoreField(n)
            | Self::Roll(n) => Some(n),
            Self::CallNative(id) => Some(id.0),
            Self::New(id) | Self::IsInstance(id) => Some(id.0),
            Self::Load(n)
            | Self::Store(n)
            | Self::Jump(n)
            | Self::JumpIf(n)
            | Self::JumpIfNot(n) => Some(n as u32),
        }
    }

    /// Builds an instruction from an opcode and its raw operand bits.
    ///
    /// The bits are ignored for arity-0 opcodes.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn from_parts(opcode: Opcode, bits: u32) -> Self {
        match opcode {
            Opcode::Halt => Self::Halt,
            Opcode::Const => Self::Const(bits),
            Opcode::Call => Self::Call(bits),
            Opcode::CallNative => Self::CallNative(NativeId(bits)),
            Opcode::Enter => Self::Enter,
            Opcode::Return => Self::Return(bits),
            Opcode::New => Self::New(ClassId(bits)),
            Opcode::Pop => Self::Pop,
            Opcode::Alloc => Self::Alloc(bits),
            Opcode::Load => Self::Load(bits as i32),
            Opcode::Store => Self::Store(bits as i32),
            Opcode::LoadField => Self::LoadField(bits),
            Opcode::StoreField => Self::StoreField(bits),
            Opcode::Roll => Self::Roll(bits),
            Opcode::Jump => Self::Jump(bits as i32),
            Opcode::JumpIf => Self::JumpIf(bits as i32),
            Opcode::JumpIfNot => Self::JumpIfNot(bits as i32),
            Opcode::IsInstance => Self::IsInstance(ClassId(bits)),
        }
    }

    /// Returns the encoded size in bytes.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        match self.operand_bits() {
            Some(_) => 1 + OPERAND_WIDTH,
            None => 1,
        }
    }

    /// Appends the encoded instruction to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().id());
        if let Some(bits) = self.operand_bits() {
            out.extend_from_slice(&bits.to_le_bytes());
        }
    }

    /// Decodes the instruction starting at `pc`.
    ///
    /// Returns the instruction and the position just past it.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeFault`] if `pc` is outside `code`, the opcode is
    /// unknown, or the operand is truncated.
    pub fn decode(code: &[u8], pc: usize) -> Result<(Self, usize), DecodeFault> {
        let &id = code.get(pc).ok_or(DecodeFault::PcOutOfBounds {
            pc,
            len: code.len(),
        })?;
        let descriptor = resolve(id)?;
        let operand_start = pc + 1;

        if descriptor.arity() == 0 {
            return Ok((Self::from_parts(descriptor.opcode, 0), operand_start));
        }

        let end = operand_start + OPERAND_WIDTH;
        let bytes = code
            .get(operand_start..end)
            .ok_or(DecodeFault::TruncatedOperand {
                pc,
                needed: OPERAND_WIDTH,
                available: code.len().saturating_sub(operand_start),
            })?;
        let bits = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Ok((Self::from_parts(descriptor.opcode, bits), end))
    }

    /// Returns the net operand stack depth change, when it is static.
    ///
    /// `call`, `return`, and `call_native` depend on runtime state (the
    /// callee, the reclaim count against the frame, the native's arity) and
    /// return `None`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn stack_effect(&self) -> Option<isize> {
        match *self {
            Self::Call(_) | Self::Return(_) | Self::CallNative(_) => None,
            Self::Halt
            | Self::Enter
            | Self::LoadField(_)
            | Self::Roll(_)
            | Self::Jump(_) => Some(0),
            Self::Const(_) | Self::New(_) | Self::Load(_) | Self::IsInstance(_) => Some(1),
            Self::Pop | Self::Store(_) | Self::JumpIf(_) | Self::JumpIfNot(_) => Some(-1),
            Self::StoreField(_) => Some(-2),
            Self::Alloc(n) => Some(n as isize),
        }
    }

    /// Returns true for instructions that set the program counter explicitly.
    #[must_use]
    pub const fn is_control_transfer(&self) -> bool {
        matches!(
            self,
            Self::Jump(_) | Self::JumpIf(_) | Self::JumpIfNot(_) | Self::Call(_) | Self::Return(_)
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = self.opcode().mnemonic();
        match *self {
            Self::Halt | Self::Enter | Self::Pop => write!(f, "{mnemonic}"),
            Self::Load(n) | Self::Store(n) | Self::Jump(n) | Self::JumpIf(n) | Self::JumpIfNot(n) => {
                write!(f, "{mnemonic} {n}")
            }
            _ => match self.operand_bits() {
                Some(bits) => write!(f, "{mnemonic} {bits}"),
                None => write!(f, "{mnemonic}"),
            },
        }
    }
}

impl FromStr for Instruction {
    type Err = DecodeFault;

    /// Parses `<mnemonic>` or `<mnemonic> <operand>`.
    #[allow(clippy::cast_sign_loss)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let mnemonic = parts
            .next()
            .ok_or_else(|| DecodeFault::UnknownMnemonic(String::new()))?;
        let opcode = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| DecodeFault::UnknownMnemonic(mnemonic.to_string()))?;
        let descriptor = opcode.descriptor();
        let operand = parts.next();

        if let Some(extra) = parts.next() {
            return Err(DecodeFault::MalformedOperand {
                mnemonic: descriptor.mnemonic,
                message: format!("unexpected token '{extra}'"),
            });
        }

        let bits = match (descriptor.operand, operand) {
            (OperandKind::None, None) => 0,
            (OperandKind::None, Some(text)) => {
                return Err(DecodeFault::MalformedOperand {
                    mnemonic: descriptor.mnemonic,
                    message: format!("takes no operand, got '{text}'"),
                });
            }
            (_, None) => {
                return Err(DecodeFault::MalformedOperand {
                    mnemonic: descriptor.mnemonic,
                    message: "missing operand".to_string(),
                });
            }
            (kind, Some(text)) if kind.is_signed() => text
                .parse::<i32>()
                .map(|n| n as u32)
                .map_err(|e| DecodeFault::MalformedOperand {
                    mnemonic: descriptor.mnemonic,
                    message: format!("'{text}': {e}"),
                })?,
            (_, Some(text)) => text
                .parse::<u32>()
                .map_err(|e| DecodeFault::MalformedOperand {
                    mnemonic: descriptor.mnemonic,
                    message: format!("'{text}': {e}"),
                })?,
        };

        Ok(Self::from_parts(opcode, bits))
    }
}
