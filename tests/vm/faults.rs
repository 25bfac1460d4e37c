//! Integration tests for faults, limits, and cancellation

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tinyvm_bytecode::{Bytecode, Instruction, Program};
use tinyvm_foundation::{DecodeFault, ErrorKind, NativeFault, ObjectFault, StackFault, Value};
use tinyvm_vm::{CancelToken, Step, Vm, VmConfig};

use crate::{ADD, assemble, classes, natives, vm, vm_with};

/// `jump -5` at 0 loops forever.
fn spin() -> Program {
    Program::new(Bytecode::from_instructions([Instruction::Jump(-5)]), vec![])
}

// =============================================================================
// Fault reporting
// =============================================================================

#[test]
fn fault_inside_a_call_reports_the_call_chain() {
    let program = assemble(
        "
         0: call 6
         5: halt
        # outer
         6: enter
         7: call 17
        12: return 0
        # inner: adds a string to an int
        17: enter
        18: const 0
        23: const 1
        28: call_native 3
        33: return 0
        ",
        vec![Value::Int(1), Value::from("x")],
    );
    let mut vm = vm(classes([]));

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Native(NativeFault::Failed { ref name, .. }) if name == "add"
    ));
    let context = err.context.as_ref().unwrap();
    assert_eq!(context.pc, Some(28));
    assert_eq!(context.instruction.as_deref(), Some("call_native 3"));
    assert_eq!(context.frame_depth, Some(3));
    assert_eq!(context.stack, vec![12, 5]);

    // The machine stays where it stopped.
    assert_eq!(vm.pc(), 28);
    assert_eq!(vm.frame_depth(), 3);
    assert_eq!(vm.stack().values(), &[Value::Int(1), Value::from("x")]);
}

#[test]
fn decode_faults_carry_no_instruction() {
    let program = Program::new(Bytecode::from_bytes(vec![4, 42]), vec![]);
    let mut vm = vm(classes([]));

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Decode(DecodeFault::UnknownOpcode(42))
    ));
    let context = err.context.unwrap();
    assert_eq!(context.pc, Some(1));
    assert_eq!(context.instruction, None);
}

#[test]
fn pop_cannot_reach_arguments() {
    let program = assemble(
        "
        const 0
        call 11
        halt
        enter
        pop
        ",
        vec![Value::Int(1)],
    );
    let mut vm = vm(classes([]));

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Stack(StackFault::Underflow {
            needed: 1,
            available: 0
        })
    ));
    assert_eq!(vm.stack().values(), &[Value::Int(1)]);
}

#[test]
fn field_access_on_nothing() {
    let program = assemble("alloc 1\nload 0\nload_field 0", vec![]);
    let mut vm = vm(classes([]));

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Object(ObjectFault::NullReference)
    ));
    assert_eq!(err.pc(), Some(10));
}

// =============================================================================
// Stepping
// =============================================================================

#[test]
fn step_then_resume() {
    let program = Program::new(
        Bytecode::from_instructions([
            Instruction::Const(0),
            Instruction::Const(0),
            Instruction::CallNative(ADD),
            Instruction::Halt,
        ]),
        vec![Value::Int(21)],
    );
    let mut vm = vm(classes([]));

    vm.start(&program);
    assert_eq!(vm.step(&program).unwrap(), Step::Continue);
    assert_eq!(vm.pc(), 5);
    assert_eq!(vm.stack().len(), 1);

    let outcome = vm.resume(&program).unwrap();
    assert_eq!(outcome.steps, 4);
    assert_eq!(outcome.halted_at, 15);
    assert_eq!(vm.top(), Some(&Value::Int(42)));

    // Halted machines stay halted until restarted.
    assert!(vm.is_halted());
    assert_eq!(vm.step(&program).unwrap(), Step::Halted);
    assert_eq!(vm.steps(), 4);
}

// =============================================================================
// Limits
// =============================================================================

#[test]
fn step_limit_stops_runaway_loops() {
    let mut vm = vm_with(classes([]), VmConfig::default().with_max_steps(Some(1_000)));

    let err = vm.run(&spin()).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::StepLimitExceeded { limit: 1_000 }
    ));
    assert_eq!(vm.steps(), 1_000);
}

#[test]
fn sandboxed_stack_limit() {
    // Pushes forever: const 0 then jump back.
    let program = assemble("const 0\njump -10", vec![Value::Nothing]);
    let config = VmConfig::sandboxed();
    let limit = config.max_stack;
    let mut vm = vm_with(classes([]), config);

    let err = vm.run(&program).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Stack(StackFault::Overflow { limit: l }) if l == limit
    ));
    assert_eq!(vm.stack().len(), limit);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn cancel_from_another_thread() {
    let token = CancelToken::new();
    let mut vm = Vm::new(classes([]), natives()).with_cancel_token(token.clone());

    let runner = thread::spawn(move || {
        vm.run(&spin())
    });
    thread::sleep(Duration::from_millis(20));
    token.cancel();

    let err = runner.join().unwrap().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Cancelled));
    assert_eq!(err.pc(), Some(0));
}

#[test]
fn machines_share_one_program() {
    let program = Arc::new(assemble(
        "
         0: alloc 1
         5: const 0
        10: store 0
        15: load 0
        20: const 1
        25: call_native 3
        30: store 0
        35: jump -25
        ",
        vec![Value::Int(0), Value::Int(1)],
    ));
    let classes = classes([]);
    let natives = natives();

    let handles: Vec<_> = (1..=4u64)
        .map(|n| {
            let program = Arc::clone(&program);
            let mut vm = Vm::with_config(
                Arc::clone(&classes),
                Arc::clone(&natives),
                VmConfig::default().with_max_steps(Some(3 + 5 * n)),
            );
            thread::spawn(move || {
                let _ = vm.run(&program);
                vm.stack().values().to_vec()
            })
        })
        .collect();

    for (n, handle) in (1..=4).zip(handles) {
        assert_eq!(handle.join().unwrap(), vec![Value::Int(n)]);
    }
}
