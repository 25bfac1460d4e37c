//! The opcode table.
//!
//! Opcode ids are fixed and contiguous. New operations may only be appended;
//! existing ids never change, since assemblers, disassemblers, and the
//! interpreter all index the same table.

#![allow(clippy::doc_markdown)]

use tinyvm_foundation::DecodeFault;

/// Operation selector, one byte in the instruction stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Stops the processor.
    Halt = 0,
    /// Push constant; constant-pool index follows.
    Const = 1,
    /// Call an interpreted method.
    Call = 2,
    /// Trampoline to a native function.
    CallNative = 3,
    /// Prologue of a called method.
    Enter = 4,
    /// Return from method, reclaiming arguments and locals.
    Return = 5,
    /// Allocate a new object instance.
    New = 6,
    /// Discard top of stack.
    Pop = 7,
    /// Allocate stack space for locals.
    Alloc = 8,
    /// Load (push) a local variable onto the stack.
    Load = 9,
    /// Store (pop) top of stack to a local variable.
    Store = 10,
    /// Load from object field.
    LoadField = 11,
    /// Store to object field.
    StoreField = 12,
    /// `[obj arg1 ... argn] -> [arg1 ... argn obj]`
    Roll = 13,
    /// Unconditional relative jump.
    Jump = 14,
    /// Conditional relative jump, if true.
    JumpIf = 15,
    /// Conditional relative jump, if false.
    JumpIfNot = 16,
    /// Test membership in class (for typecase).
    IsInstance = 17,
}

/// What an instruction's operand means.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand.
    None,
    /// Index into the constant pool.
    ConstIndex,
    /// Absolute byte position of a method entry.
    CallTarget,
    /// Id in the native registry.
    NativeId,
    /// Argument and local slots to reclaim.
    ReclaimCount,
    /// Id in the class registry.
    ClassId,
    /// Local slots to reserve.
    SlotCount,
    /// Signed slot offset from the locals base.
    LocalOffset,
    /// Field slot of an instance.
    FieldOffset,
    /// Values to roll over.
    RollDepth,
    /// Signed byte offset from the end of the instruction.
    JumpOffset,
}

impl OperandKind {
    /// Returns true if the operand is encoded as a signed integer.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::LocalOffset | Self::JumpOffset)
    }
}

/// One entry of the opcode table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpcodeDescriptor {
    /// The operation.
    pub opcode: Opcode,
    /// Assembly mnemonic.
    pub mnemonic: &'static str,
    /// Meaning of the operand, if any.
    pub operand: OperandKind,
    /// One-line description.
    pub summary: &'static str,
}

impl OpcodeDescriptor {
    /// Number of operands following the opcode (0 or 1).
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self.operand {
            OperandKind::None => 0,
            _ => 1,
        }
    }
}

/// Width of an encoded operand in bytes.
pub const OPERAND_WIDTH: usize = 4;

/// Number of entries in the opcode table.
pub const OPCODE_COUNT: usize = 18;

const fn entry(
    opcode: Opcode,
    mnemonic: &'static str,
    operand: OperandKind,
    summary: &'static str,
) -> OpcodeDescriptor {
    OpcodeDescriptor {
        opcode,
        mnemonic,
        operand,
        summary,
    }
}

/// The opcode table, indexed by opcode id.
pub static OPCODE_TABLE: [OpcodeDescriptor; OPCODE_COUNT] = [
    entry(Opcode::Halt, "halt", OperandKind::None, "Stops the processor."),
    entry(
        Opcode::Const,
        "const",
        OperandKind::ConstIndex,
        "Push constant; constant value follows",
    ),
    entry(
        Opcode::Call,
        "call",
        OperandKind::CallTarget,
        "Call an interpreted method",
    ),
    entry(
        Opcode::CallNative,
        "call_native",
        OperandKind::NativeId,
        "Trampoline to native method",
    ),
    entry(
        Opcode::Enter,
        "enter",
        OperandKind::None,
        "Prologue of called method",
    ),
    entry(
        Opcode::Return,
        "return",
        OperandKind::ReclaimCount,
        "Return from method, reclaiming locals",
    ),
    entry(
        Opcode::New,
        "new",
        OperandKind::ClassId,
        "Allocate a new object instance",
    ),
    entry(Opcode::Pop, "pop", OperandKind::None, "Discard top of stack"),
    entry(
        Opcode::Alloc,
        "alloc",
        OperandKind::SlotCount,
        "Allocate stack space for locals",
    ),
    entry(
        Opcode::Load,
        "load",
        OperandKind::LocalOffset,
        "Load (push) a local variable onto stack",
    ),
    entry(
        Opcode::Store,
        "store",
        OperandKind::LocalOffset,
        "Store (pop) top of stack to local variable",
    ),
    entry(
        Opcode::LoadField,
        "load_field",
        OperandKind::FieldOffset,
        "Load from object field",
    ),
    entry(
        Opcode::StoreField,
        "store_field",
        OperandKind::FieldOffset,
        "Store to object field",
    ),
    entry(
        Opcode::Roll,
        "roll",
        OperandKind::RollDepth,
        "[obj arg1 ... argn] -> [arg1 ... argn obj]",
    ),
    entry(
        Opcode::Jump,
        "jump",
        OperandKind::JumpOffset,
        "Unconditional relative jump",
    ),
    entry(
        Opcode::JumpIf,
        "jump_if",
        OperandKind::JumpOffset,
        "Conditional relative jump, if true",
    ),
    entry(
        Opcode::JumpIfNot,
        "jump_ifnot",
        OperandKind::JumpOffset,
        "Conditional relative jump, if false",
    ),
    entry(
        Opcode::IsInstance,
        "is_instance",
        OperandKind::ClassId,
        "Test membership in class (for typecase)",
    ),
];

/// Resolves an opcode id to its table entry.
///
/// # Errors
///
/// Returns [`DecodeFault::UnknownOpcode`] if the id is outside the table.
pub fn resolve(id: u8) -> Result<&'static OpcodeDescriptor, DecodeFault> {
    OPCODE_TABLE
        .get(usize::from(id))
        .ok_or(DecodeFault::UnknownOpcode(id))
}

impl Opcode {
    /// Returns the opcode id.
    #[must_use]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Returns this opcode's table entry.
    #[must_use]
    pub fn descriptor(self) -> &'static OpcodeDescriptor {
        &OPCODE_TABLE[self as usize]
    }

    /// Returns the assembly mnemonic.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.descriptor().mnemonic
    }

    /// Looks up an opcode by mnemonic.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        OPCODE_TABLE
            .iter()
            .find(|d| d.mnemonic == mnemonic)
            .map(|d| d.opcode)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeFault;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        resolve(id).map(|d| d.opcode)
    }
}
