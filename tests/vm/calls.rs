//! Integration tests for the calling convention

use tinyvm_bytecode::{Bytecode, Instruction, Program};
use tinyvm_foundation::{ErrorKind, FrameFault, Value};
use tinyvm_vm::VmConfig;

use crate::{LESS, MUL, SUB, assemble, classes, vm, vm_with};

/// `fact(n)`, recursive. The method starts at 11.
const FACTORIAL: &str = "
    0: const 0
    5: call 11
   10: halt
   # fact(n)
   11: enter
   12: load -1
   17: const 1
   22: call_native 2
   27: jump_ifnot 10
   32: const 2
   37: return 1
   # n * fact(n - 1)
   42: load -1
   47: load -1
   52: const 2
   57: call_native 0
   62: call 11
   67: call_native 1
   72: return 1
";

fn factorial(n: i64) -> Program {
    assemble(FACTORIAL, vec![Value::Int(n), Value::Int(2), Value::Int(1)])
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn recursive_factorial() {
    let mut vm = vm(classes([]));

    vm.run(&factorial(5)).unwrap();

    assert_eq!(vm.stack().values(), &[Value::Int(120)]);
    assert_eq!(vm.frame_depth(), 1);
}

#[test]
fn factorial_base_case() {
    let mut vm = vm(classes([]));

    let outcome = vm.run(&factorial(1)).unwrap();

    assert_eq!(vm.top(), Some(&Value::Int(1)));
    assert_eq!(outcome.halted_at, 10);
}

#[test]
fn recursion_depth_is_bounded() {
    let mut vm = vm_with(classes([]), VmConfig::default().with_max_frames(4));

    let err = vm.run(&factorial(10)).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Frame(FrameFault::DepthExceeded { limit: 4 })
    ));
    let context = err.context.unwrap();
    assert_eq!(context.pc, Some(62));
    assert_eq!(context.frame_depth, Some(4));
    assert_eq!(context.stack, vec![67, 67, 10]);
}

// =============================================================================
// Arguments and locals
// =============================================================================

/// `swap_sub(a, b) = b - a` using one local and writes to the argument slots.
#[test]
fn arguments_are_writable_slots() {
    let mut code = Bytecode::new();
    code.emit(Instruction::Const(0));
    code.emit(Instruction::Const(1));
    let call = code.emit(Instruction::Call(0));
    code.emit(Instruction::Halt);

    let method = code.emit(Instruction::Enter);
    code.emit(Instruction::Alloc(1));
    code.emit(Instruction::Load(-2));
    code.emit(Instruction::Store(0));
    code.emit(Instruction::Load(-1));
    code.emit(Instruction::Store(-2));
    code.emit(Instruction::Load(0));
    code.emit(Instruction::Store(-1));
    code.emit(Instruction::Load(-2));
    code.emit(Instruction::Load(-1));
    code.emit(Instruction::CallNative(SUB));
    code.emit(Instruction::Return(3));
    code.patch_call(call, method);

    let program = Program::new(code, vec![Value::Int(10), Value::Int(3)]);
    let mut vm = vm(classes([]));

    vm.run(&program).unwrap();

    // a = 10, b = 3: after the swap the method computes 3 - 10.
    assert_eq!(vm.stack().values(), &[Value::Int(-7)]);
}

#[test]
fn locals_start_as_nothing() {
    let program = assemble(
        "
        call 6
        halt
        enter
        alloc 3
        load 2
        return 3
        ",
        vec![],
    );
    let mut vm = vm(classes([]));

    vm.run(&program).unwrap();

    assert_eq!(vm.stack().values(), &[Value::Nothing]);
}

#[test]
fn outer_frame_may_use_locals() {
    let program = assemble(
        "
         0: alloc 1
         5: const 0
        10: store 0
        # while i < 4
        15: load 0
        20: const 1
        25: call_native 2
        30: jump_ifnot 25
        # i = i + 1
        35: load 0
        40: const 2
        45: call_native 3
        50: store 0
        55: jump -45
        60: load 0
        65: halt
        ",
        vec![Value::Int(0), Value::Int(4), Value::Int(1)],
    );
    let mut vm = vm(classes([]));

    let outcome = vm.run(&program).unwrap();

    assert_eq!(vm.stack().values(), &[Value::Int(4), Value::Int(4)]);
    assert_eq!(outcome.halted_at, 65);
}

#[test]
fn return_cannot_reclaim_beyond_its_frame() {
    let program = assemble(
        "
        const 0
        call 11
        halt
        enter
        const 0
        return 2
        ",
        vec![Value::Int(1)],
    );
    let mut vm = vm(classes([]));

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Frame(FrameFault::ReturnBeyondFrame {
            requested: 2,
            available: 1
        })
    ));
    assert_eq!(vm.frame_depth(), 2);
}

#[test]
fn natives_consume_their_arguments() {
    let program = Program::new(
        Bytecode::from_instructions([
            Instruction::Const(0),
            Instruction::Const(1),
            Instruction::CallNative(MUL),
            Instruction::Const(0),
            Instruction::CallNative(LESS),
            Instruction::Halt,
        ]),
        vec![Value::Int(6), Value::Int(7)],
    );
    let mut vm = vm(classes([]));

    vm.run(&program).unwrap();

    // 42 < 6
    assert_eq!(vm.stack().values(), &[Value::Bool(false)]);
}
