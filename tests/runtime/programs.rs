//! End-to-end programs against the builtin natives

use tinyvm_bytecode::{Bytecode, Instruction, Program};
use tinyvm_foundation::{ClassId, ErrorKind, NativeFault, Value};
use tinyvm_runtime::builtins::{
    BOOL_PRINT, INT_DIV, INT_LESS, INT_MULT, INT_PRINT, INT_SUB, OBJ_EQUALS, STRING_EQUALS,
    STRING_PLUS, STRING_PRINT,
};
use tinyvm_runtime::{OutputBuffer, Session, builtin_natives};
use tinyvm_vm::{ClassDescriptor, ClassRegistry, Heap, VmConfig};

use Instruction::{
    Alloc, Call, CallNative, Const, Enter, Halt, IsInstance, Jump, JumpIfNot, Load, LoadField,
    New, Pop, Return, Store, StoreField,
};

const SHAPE: ClassId = ClassId(0);
const RECT: ClassId = ClassId(1);
const SQUARE: ClassId = ClassId(2);

fn shapes() -> ClassRegistry {
    ClassRegistry::builder()
        .class(ClassDescriptor::new(SHAPE, "Shape", 0))
        .class(ClassDescriptor::new(RECT, "Rect", 2).with_parent(SHAPE))
        .class(ClassDescriptor::new(SQUARE, "Square", 1).with_parent(SHAPE))
        .build()
        .unwrap()
}

fn session(code: Bytecode, constants: Vec<Value>, classes: ClassRegistry) -> (Session, OutputBuffer) {
    let output = OutputBuffer::new();
    let natives = builtin_natives(&output.sink());
    (
        Session::new(Program::new(code, constants), classes, natives),
        output,
    )
}

// =============================================================================
// Printing
// =============================================================================

#[test]
fn hello_world() {
    let code = Bytecode::from_instructions([Const(0), CallNative(STRING_PRINT), Pop, Halt]);
    let (session, output) = session(code, vec![Value::from("Hello, world!")], shapes());

    let outcome = session.run().unwrap();

    assert_eq!(output.lines(), vec!["Hello, world!"]);
    assert_eq!(outcome.steps, 4);
}

#[test]
fn string_builtins() {
    let code = Bytecode::from_instructions([
        Const(0),
        Const(1),
        CallNative(STRING_PLUS),
        CallNative(STRING_PRINT),
        Pop,
        Const(0),
        Const(0),
        CallNative(STRING_EQUALS),
        CallNative(BOOL_PRINT),
        Pop,
        Halt,
    ]);
    let (session, output) = session(code, vec![Value::from("foo"), Value::from("bar")], shapes());

    session.run().unwrap();

    assert_eq!(output.lines(), vec!["foobar", "true"]);
}

#[test]
fn object_identity_builtin() {
    let code = Bytecode::from_instructions([
        Alloc(1),
        New(SHAPE),
        Store(0),
        Load(0),
        Load(0),
        CallNative(OBJ_EQUALS),
        CallNative(BOOL_PRINT),
        Pop,
        Load(0),
        New(SHAPE),
        CallNative(OBJ_EQUALS),
        CallNative(BOOL_PRINT),
        Pop,
        Halt,
    ]);
    let (session, output) = session(code, vec![], shapes());

    session.run().unwrap();

    assert_eq!(output.lines(), vec!["true", "false"]);
}

// =============================================================================
// Control flow
// =============================================================================

#[test]
fn countdown() {
    let mut code = Bytecode::new();
    code.emit(Alloc(1));
    code.emit(Const(0));
    code.emit(Store(0));
    let top = code.emit(Const(1));
    code.emit(Load(0));
    code.emit(CallNative(INT_LESS));
    let exit = code.emit(JumpIfNot(0));
    code.emit(Load(0));
    code.emit(CallNative(INT_PRINT));
    code.emit(Pop);
    code.emit(Load(0));
    code.emit(Const(2));
    code.emit(CallNative(INT_SUB));
    code.emit(Store(0));
    let back = code.emit(Jump(0));
    let end = code.emit(Halt);
    code.patch_jump(exit, end);
    code.patch_jump(back, top);

    let constants = vec![Value::Int(3), Value::Int(0), Value::Int(1)];
    let (session, output) = session(code, constants, shapes());

    let mut vm = session.vm();
    let outcome = session.execute(&mut vm).unwrap();

    assert_eq!(output.lines(), vec!["3", "2", "1"]);
    assert_eq!(outcome.halted_at, end);
    assert_eq!(vm.stack().values(), &[Value::Int(0)]);
}

/// `area(shape)` dispatching on the receiver's class, called on a square
/// and a rectangle.
#[test]
fn typecase_dispatch() {
    let mut code = Bytecode::new();
    code.emit(Alloc(1));
    code.emit(New(SQUARE));
    code.emit(Store(0));
    code.emit(Const(0));
    code.emit(Load(0));
    code.emit(StoreField(0));
    code.emit(Load(0));
    let first_call = code.emit(Call(0));
    code.emit(CallNative(INT_PRINT));
    code.emit(Pop);

    code.emit(New(RECT));
    code.emit(Store(0));
    code.emit(Const(1));
    code.emit(Load(0));
    code.emit(StoreField(0));
    code.emit(Const(2));
    code.emit(Load(0));
    code.emit(StoreField(1));
    code.emit(Load(0));
    let second_call = code.emit(Call(0));
    code.emit(CallNative(INT_PRINT));
    code.emit(Pop);
    code.emit(Halt);

    // area(shape)
    let area = code.emit(Enter);
    code.emit(Load(-1));
    code.emit(IsInstance(SQUARE));
    let not_square = code.emit(JumpIfNot(0));
    code.emit(LoadField(0));
    code.emit(Load(-1));
    code.emit(LoadField(0));
    code.emit(CallNative(INT_MULT));
    code.emit(Return(1));
    let rect = code.emit(LoadField(0));
    code.emit(Load(-1));
    code.emit(LoadField(1));
    code.emit(CallNative(INT_MULT));
    code.emit(Return(1));

    code.patch_call(first_call, area);
    code.patch_call(second_call, area);
    code.patch_jump(not_square, rect);

    let constants = vec![Value::Int(3), Value::Int(4), Value::Int(5)];
    let (session, output) = session(code, constants, shapes());

    let mut vm = session.vm();
    session.execute(&mut vm).unwrap();

    assert_eq!(output.lines(), vec!["9", "20"]);
    assert_eq!(vm.heap().instance_count(), 2);
    assert_eq!(vm.frame_depth(), 1);
}

// =============================================================================
// Faults
// =============================================================================

#[test]
fn division_by_zero_stops_the_program() {
    let code = Bytecode::from_instructions([
        Const(0),
        CallNative(INT_PRINT),
        Pop,
        Const(0),
        Const(1),
        CallNative(INT_DIV),
        CallNative(INT_PRINT),
        Halt,
    ]);
    let (session, output) = session(code, vec![Value::Int(7), Value::Int(0)], shapes());

    let mut vm = session.vm();
    let err = session.execute(&mut vm).unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::Native(NativeFault::Failed { ref name, .. }) if name == "Int:div"
    ));
    assert_eq!(err.pc(), Some(21));
    assert_eq!(output.lines(), vec!["7"]);
    assert_eq!(vm.stack().values(), &[Value::Int(7), Value::Int(0)]);
}

#[test]
fn printing_the_wrong_kind_fails() {
    let code = Bytecode::from_instructions([Const(0), CallNative(INT_PRINT)]);
    let (session, output) = session(code, vec![Value::from("7")], shapes());

    let err = session.run().unwrap_err();

    assert!(matches!(err.kind, ErrorKind::Native(NativeFault::Failed { .. })));
    assert!(output.lines().is_empty());
}

#[test]
fn sessions_apply_their_config() {
    let mut code = Bytecode::new();
    let top = code.emit(Const(0));
    code.emit(CallNative(INT_PRINT));
    code.emit(Pop);
    let back = code.emit(Jump(0));
    code.patch_jump(back, top);

    let (session, output) = session(code, vec![Value::Int(1)], shapes());
    let session = session.with_config(VmConfig::default().with_max_steps(Some(8)));

    let err = session.run().unwrap_err();

    assert!(matches!(err.kind, ErrorKind::StepLimitExceeded { limit: 8 }));
    assert_eq!(output.lines().len(), 2);
}

// =============================================================================
// Disassembly
// =============================================================================

#[test]
fn disassembly_names_natives_and_classes() {
    let code = Bytecode::from_instructions([
        Const(0),
        CallNative(STRING_PRINT),
        New(SQUARE),
        IsInstance(SHAPE),
        Halt,
    ]);
    let (session, _) = session(code, vec![Value::from("hi")], shapes());

    let text = session.disassemble().unwrap();

    assert!(text.contains("Rect#1 (2 fields) < 0"));
    assert!(text.contains("const 0  ; Str(\"hi\")"));
    assert!(text.contains("call_native 9  ; String:print"));
    assert!(text.contains("new 2  ; Square"));
    assert!(text.contains("is_instance 0  ; Shape"));
}
