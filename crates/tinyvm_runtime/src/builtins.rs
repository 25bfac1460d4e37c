//! Builtin methods for `Int`, `String`, `Bool`, and object receivers.
//!
//! Each builtin is a native at a fixed id. The receiver is pushed first,
//! so for `a - b` the stack holds `[.., a, b]` before `call_native`. Every
//! builtin returns exactly one value; the print builtins return `Nothing`.

use std::sync::{Arc, Mutex, PoisonError};

use tinyvm_foundation::{NativeId, Value};
use tinyvm_vm::{NativeFn, NativeRegistry, NativeResult};

/// `Int:plus`
pub const INT_PLUS: NativeId = NativeId(0);
/// `Int:sub`
pub const INT_SUB: NativeId = NativeId(1);
/// `Int:mult`
pub const INT_MULT: NativeId = NativeId(2);
/// `Int:div`
pub const INT_DIV: NativeId = NativeId(3);
/// `Int:less`
pub const INT_LESS: NativeId = NativeId(4);
/// `Int:equals`
pub const INT_EQUALS: NativeId = NativeId(5);
/// `Int:print`
pub const INT_PRINT: NativeId = NativeId(6);
/// `String:plus`
pub const STRING_PLUS: NativeId = NativeId(7);
/// `String:equals`
pub const STRING_EQUALS: NativeId = NativeId(8);
/// `String:print`
pub const STRING_PRINT: NativeId = NativeId(9);
/// `Bool:print`
pub const BOOL_PRINT: NativeId = NativeId(10);
/// `Obj:equals`
pub const OBJ_EQUALS: NativeId = NativeId(11);

/// Qualified names of the builtins, indexed by native id.
pub const BUILTIN_NAMES: [&str; 12] = [
    "Int:plus",
    "Int:sub",
    "Int:mult",
    "Int:div",
    "Int:less",
    "Int:equals",
    "Int:print",
    "String:plus",
    "String:equals",
    "String:print",
    "Bool:print",
    "Obj:equals",
];

/// Looks up a builtin id by qualified name, e.g. `"Int:plus"`.
#[must_use]
pub fn builtin_id(name: &str) -> Option<NativeId> {
    BUILTIN_NAMES
        .iter()
        .position(|&n| n == name)
        .and_then(|i| u32::try_from(i).ok())
        .map(NativeId)
}

/// Looks up the qualified name of a builtin id.
#[must_use]
pub fn builtin_name(id: NativeId) -> Option<&'static str> {
    BUILTIN_NAMES.get(id.index() as usize).copied()
}

/// Where the print builtins write.
pub type PrintSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A sink that writes each line to stdout.
#[must_use]
pub fn stdout_sink() -> PrintSink {
    Arc::new(|line| println!("{line}"))
}

/// Collects printed lines in memory.
#[derive(Clone, Debug, Default)]
pub struct OutputBuffer {
    lines: Arc<Mutex<Vec<String>>>,
}

impl OutputBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink appending to this buffer.
    #[must_use]
    pub fn sink(&self) -> PrintSink {
        let lines = Arc::clone(&self.lines);
        Arc::new(move |line| {
            lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_string());
        })
    }

    /// Lines printed so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns the lines printed so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn ints(name: &str, args: &[Value]) -> Result<(i64, i64), String> {
    match args {
        [Value::Int(a), Value::Int(b)] => Ok((*a, *b)),
        [a, b] => Err(format!(
            "{name} expects (int, int), got ({}, {})",
            a.kind_name(),
            b.kind_name()
        )),
        _ => Err(format!("{name} expects 2 arguments, got {}", args.len())),
    }
}

fn int_op(name: &'static str, op: fn(i64, i64) -> Option<i64>) -> NativeFn {
    NativeFn::new(name, 2, 1, move |args| {
        let (a, b) = ints(name, args)?;
        op(a, b)
            .map(|n| vec![Value::Int(n)])
            .ok_or_else(|| format!("{name}: arithmetic error on {a} and {b}"))
    })
}

fn int_cmp(name: &'static str, op: fn(&i64, &i64) -> bool) -> NativeFn {
    NativeFn::new(name, 2, 1, move |args| {
        let (a, b) = ints(name, args)?;
        Ok(vec![Value::Bool(op(&a, &b))])
    })
}

fn printer(name: &'static str, kind: &'static str, sink: PrintSink) -> NativeFn {
    NativeFn::new(name, 1, 1, move |args| -> NativeResult {
        match args {
            [value] if value.kind_name() == kind => {
                sink(&value.to_string());
                Ok(vec![Value::Nothing])
            }
            [value] => Err(format!("{name} expects {kind}, got {}", value.kind_name())),
            _ => Err(format!("{name} expects 1 argument, got {}", args.len())),
        }
    })
}

/// Registers every builtin, sending printed output to `sink`.
pub fn register_builtins(registry: &mut NativeRegistry, sink: &PrintSink) {
    registry.register(INT_PLUS, int_op("Int:plus", i64::checked_add));
    registry.register(INT_SUB, int_op("Int:sub", i64::checked_sub));
    registry.register(INT_MULT, int_op("Int:mult", i64::checked_mul));
    registry.register(INT_DIV, int_op("Int:div", i64::checked_div));
    registry.register(INT_LESS, int_cmp("Int:less", i64::lt));
    registry.register(INT_EQUALS, int_cmp("Int:equals", i64::eq));
    registry.register(INT_PRINT, printer("Int:print", "int", Arc::clone(sink)));

    registry.register(
        STRING_PLUS,
        NativeFn::new("String:plus", 2, 1, |args| match args {
            [Value::Str(a), Value::Str(b)] => Ok(vec![Value::from(format!("{a}{b}"))]),
            _ => Err("String:plus expects (string, string)".to_string()),
        }),
    );
    registry.register(
        STRING_EQUALS,
        NativeFn::new("String:equals", 2, 1, |args| match args {
            [Value::Str(a), Value::Str(b)] => Ok(vec![Value::Bool(a == b)]),
            _ => Err("String:equals expects (string, string)".to_string()),
        }),
    );
    registry.register(
        STRING_PRINT,
        printer("String:print", "string", Arc::clone(sink)),
    );
    registry.register(BOOL_PRINT, printer("Bool:print", "bool", Arc::clone(sink)));

    // Identity, with Nothing equal only to itself.
    registry.register(
        OBJ_EQUALS,
        NativeFn::new("Obj:equals", 2, 1, |args| match args {
            [a @ (Value::Ref(_) | Value::Nothing), b @ (Value::Ref(_) | Value::Nothing)] => {
                Ok(vec![Value::Bool(a == b)])
            }
            _ => Err("Obj:equals expects object references".to_string()),
        }),
    );

    tracing::debug!(natives = registry.len(), "registered builtins");
}

/// A registry holding only the builtins.
#[must_use]
pub fn builtin_natives(sink: &PrintSink) -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    register_builtins(&mut registry, sink);
    registry
}
