//! Integration tests for the instruction wire format

use proptest::prelude::*;
use tinyvm_bytecode::{Bytecode, Instruction, Program};
use tinyvm_foundation::{ClassId, DecodeFault, NativeId, Value};

// =============================================================================
// Layout
// =============================================================================

#[test]
fn operands_are_four_bytes_little_endian() {
    let code = Bytecode::from_instructions([
        Instruction::Const(0x0102_0304),
        Instruction::Jump(-2),
        Instruction::Halt,
    ]);

    assert_eq!(
        code.as_bytes(),
        &[1, 0x04, 0x03, 0x02, 0x01, 14, 0xFE, 0xFF, 0xFF, 0xFF, 0]
    );
}

#[test]
fn emit_returns_positions() {
    let mut code = Bytecode::new();
    assert_eq!(code.emit(Instruction::Enter), 0);
    assert_eq!(code.emit(Instruction::Alloc(2)), 1);
    assert_eq!(code.emit(Instruction::Pop), 6);
    assert_eq!(code.position(), 7);
    assert_eq!(code.len(), 7);
}

#[test]
fn decode_walks_the_stream() {
    let code = Bytecode::from_instructions([
        Instruction::New(ClassId(2)),
        Instruction::CallNative(NativeId(5)),
        Instruction::Store(-1),
    ]);

    let positions: Vec<_> = code.instructions().map(Result::unwrap).collect();
    assert_eq!(
        positions,
        vec![
            (0, Instruction::New(ClassId(2))),
            (5, Instruction::CallNative(NativeId(5))),
            (10, Instruction::Store(-1)),
        ]
    );
}

// =============================================================================
// Faults
// =============================================================================

#[test]
fn unknown_opcode() {
    let code = Bytecode::from_bytes(vec![7, 99]);
    assert_eq!(code.decode_at(1), Err(DecodeFault::UnknownOpcode(99)));
}

#[test]
fn truncated_operand() {
    let code = Bytecode::from_bytes(vec![0, 1, 0, 0]);
    assert_eq!(
        code.decode_at(1),
        Err(DecodeFault::TruncatedOperand {
            pc: 1,
            needed: 4,
            available: 2
        })
    );
}

#[test]
fn decode_past_end() {
    let code = Bytecode::from_instructions([Instruction::Halt]);
    assert_eq!(
        code.decode_at(1),
        Err(DecodeFault::PcOutOfBounds { pc: 1, len: 1 })
    );
}

#[test]
fn iteration_stops_after_first_fault() {
    let code = Bytecode::from_bytes(vec![7, 200, 7, 7]);
    let items: Vec<_> = code.instructions().collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1], Err(DecodeFault::UnknownOpcode(200)));
}

// =============================================================================
// Patching
// =============================================================================

#[test]
fn forward_jump_patching() {
    let mut code = Bytecode::new();
    let jump = code.emit(Instruction::JumpIfNot(0));
    code.emit(Instruction::Pop);
    let target = code.emit(Instruction::Halt);

    code.patch_jump(jump, target);

    assert_eq!(code.decode_at(jump).unwrap().0, Instruction::JumpIfNot(1));
}

#[test]
fn backward_jump_patching() {
    let mut code = Bytecode::new();
    let top = code.emit(Instruction::Pop);
    let jump = code.emit(Instruction::Jump(0));

    code.patch_jump(jump, top);

    assert_eq!(code.decode_at(jump).unwrap().0, Instruction::Jump(-6));
}

#[test]
fn call_patching_is_absolute() {
    let mut code = Bytecode::new();
    let call = code.emit(Instruction::Call(0));
    code.emit(Instruction::Halt);
    let method = code.emit(Instruction::Enter);

    code.patch_call(call, method);

    assert_eq!(code.decode_at(call).unwrap().0, Instruction::Call(6));
}

#[test]
#[should_panic(expected = "non-jump")]
fn patching_a_non_jump_panics() {
    let mut code = Bytecode::from_instructions([Instruction::Pop, Instruction::Halt]);
    code.patch_jump(0, 1);
}

// =============================================================================
// Programs
// =============================================================================

#[test]
fn constants_are_interned() {
    let mut program = Program::default();
    assert_eq!(program.intern_constant(Value::Int(1)), Some(0));
    assert_eq!(program.intern_constant(Value::from("a")), Some(1));
    assert_eq!(program.intern_constant(Value::Int(1)), Some(0));
    assert_eq!(program.constants.len(), 2);
}

#[test]
fn constant_lookup() {
    let program = Program::new(Bytecode::new(), vec![Value::Int(9)]).with_entry(0);
    assert_eq!(program.constant(0), Ok(&Value::Int(9)));
    assert_eq!(
        program.constant(1),
        Err(DecodeFault::ConstantOutOfRange { index: 1, len: 1 })
    );
}

// =============================================================================
// Property Tests
// =============================================================================

fn arb_instruction() -> impl Strategy<Value = Instruction> {
    prop_oneof![
        Just(Instruction::Halt),
        Just(Instruction::Enter),
        Just(Instruction::Pop),
        any::<u32>().prop_map(Instruction::Const),
        any::<u32>().prop_map(Instruction::Call),
        any::<u32>().prop_map(|n| Instruction::CallNative(NativeId(n))),
        any::<u32>().prop_map(Instruction::Return),
        any::<u32>().prop_map(|n| Instruction::New(ClassId(n))),
        any::<u32>().prop_map(Instruction::Alloc),
        any::<i32>().prop_map(Instruction::Load),
        any::<i32>().prop_map(Instruction::Store),
        any::<u32>().prop_map(Instruction::LoadField),
        any::<u32>().prop_map(Instruction::StoreField),
        any::<u32>().prop_map(Instruction::Roll),
        any::<i32>().prop_map(Instruction::Jump),
        any::<i32>().prop_map(Instruction::JumpIf),
        any::<i32>().prop_map(Instruction::JumpIfNot),
        any::<u32>().prop_map(|n| Instruction::IsInstance(ClassId(n))),
    ]
}

proptest! {
    #[test]
    fn streams_decode_to_what_was_emitted(
        instructions in prop::collection::vec(arb_instruction(), 0..64)
    ) {
        let code = Bytecode::from_instructions(instructions.iter().copied());
        let decoded: Vec<_> = code
            .instructions()
            .map(|item| item.map(|(_, instruction)| instruction))
            .collect::<Result<_, _>>()
            .unwrap();
        prop_assert_eq!(decoded, instructions);
    }

    #[test]
    fn decoding_arbitrary_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let code = Bytecode::from_bytes(bytes);
        for item in code.instructions() {
            let _ = item;
        }
    }
}
