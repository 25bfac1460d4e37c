//! Integration tests for the opcode table

use tinyvm_bytecode::{OPCODE_COUNT, OPCODE_TABLE, Opcode, OperandKind, resolve};
use tinyvm_foundation::DecodeFault;

#[test]
fn table_is_dense_and_ordered() {
    assert_eq!(OPCODE_TABLE.len(), OPCODE_COUNT);
    for (id, descriptor) in OPCODE_TABLE.iter().enumerate() {
        assert_eq!(usize::from(descriptor.opcode.id()), id);
    }
}

#[test]
fn mnemonics_are_unique() {
    let mut mnemonics: Vec<_> = OPCODE_TABLE.iter().map(|d| d.mnemonic).collect();
    mnemonics.sort_unstable();
    mnemonics.dedup();
    assert_eq!(mnemonics.len(), OPCODE_COUNT);
}

#[test]
fn resolve_rejects_ids_past_the_table() {
    assert_eq!(resolve(0).unwrap().opcode, Opcode::Halt);
    assert_eq!(resolve(17).unwrap().opcode, Opcode::IsInstance);
    assert_eq!(resolve(18), Err(DecodeFault::UnknownOpcode(18)));
    assert_eq!(resolve(255), Err(DecodeFault::UnknownOpcode(255)));
}

#[test]
fn operand_kinds() {
    assert_eq!(Opcode::Const.descriptor().operand, OperandKind::ConstIndex);
    assert_eq!(Opcode::Call.descriptor().operand, OperandKind::CallTarget);
    assert_eq!(Opcode::Load.descriptor().operand, OperandKind::LocalOffset);
    assert_eq!(Opcode::JumpIfNot.descriptor().operand, OperandKind::JumpOffset);

    assert!(OperandKind::LocalOffset.is_signed());
    assert!(OperandKind::JumpOffset.is_signed());
    assert!(!OperandKind::ClassId.is_signed());
}

#[test]
fn only_halt_enter_and_pop_take_no_operand() {
    let nullary: Vec<_> = OPCODE_TABLE
        .iter()
        .filter(|d| d.arity() == 0)
        .map(|d| d.opcode)
        .collect();
    assert_eq!(nullary, vec![Opcode::Halt, Opcode::Enter, Opcode::Pop]);
}
