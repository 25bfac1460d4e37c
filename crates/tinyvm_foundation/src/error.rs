//! Fault taxonomy for tinyvm.
//!
//! Uses `thiserror` for ergonomic error definition with rich context. Every
//! runtime fault aborts the current run; the host decides what happens next.

use std::fmt;

use thiserror::Error;

use crate::ids::{ClassId, NativeId, ObjectRef};

/// Result type alias using the tinyvm [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for tinyvm operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a stack underflow fault.
    #[must_use]
    pub fn stack_underflow(needed: usize, available: usize) -> Self {
        StackFault::Underflow { needed, available }.into()
    }

    /// Creates a stack overflow fault.
    #[must_use]
    pub fn stack_overflow(limit: usize) -> Self {
        StackFault::Overflow { limit }.into()
    }

    /// Creates a null reference fault.
    #[must_use]
    pub fn null_reference() -> Self {
        ObjectFault::NullReference.into()
    }

    /// Creates an unknown class fault.
    #[must_use]
    pub fn unknown_class(id: ClassId) -> Self {
        ObjectFault::UnknownClassId(id).into()
    }

    /// Creates an unregistered native fault.
    #[must_use]
    pub fn unregistered_native(id: NativeId) -> Self {
        NativeFault::Unregistered(id).into()
    }

    /// Creates a class table construction error.
    #[must_use]
    pub fn invalid_class_table(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidClassTable(message.into()))
    }

    /// Returns true if this error was raised by the bytecode decoder.
    #[must_use]
    pub const fn is_decode_fault(&self) -> bool {
        matches!(self.kind, ErrorKind::Decode(_))
    }

    /// Returns the program counter of the faulting instruction, if known.
    #[must_use]
    pub fn pc(&self) -> Option<usize> {
        self.context.as_ref().and_then(|ctx| ctx.pc)
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The instruction stream could not be decoded.
    #[error("decode fault: {0}")]
    Decode(DecodeFault),

    /// An operand stack precondition was violated.
    #[error("stack fault: {0}")]
    Stack(StackFault),

    /// A call frame precondition was violated.
    #[error("frame fault: {0}")]
    Frame(FrameFault),

    /// An object model precondition was violated.
    #[error("object fault: {0}")]
    Object(ObjectFault),

    /// A native function could not be invoked or failed.
    #[error("native fault: {0}")]
    Native(NativeFault),

    /// The host requested cancellation.
    #[error("execution cancelled")]
    Cancelled,

    /// The configured step limit was reached.
    #[error("step limit ({limit}) exceeded")]
    StepLimitExceeded {
        /// The configured limit.
        limit: u64,
    },

    /// A class table could not be built.
    #[error("invalid class table: {0}")]
    InvalidClassTable(String),

    /// A program image could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O operation failed.
    #[error("io error: {0}")]
    Io(String),
}

/// Faults raised while decoding the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFault {
    /// Opcode byte outside the opcode table.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// The stream ended in the middle of an operand.
    #[error("truncated operand at {pc}: needed {needed} bytes, {available} available")]
    TruncatedOperand {
        /// Position of the instruction.
        pc: usize,
        /// Operand width in bytes.
        needed: usize,
        /// Bytes left in the stream.
        available: usize,
    },

    /// The program counter left the instruction stream.
    #[error("program counter {pc} outside code of length {len}")]
    PcOutOfBounds {
        /// The offending position.
        pc: usize,
        /// Length of the code.
        len: usize,
    },

    /// A relative jump computed a negative or overflowing target.
    #[error("jump from {from} by {offset} is out of range")]
    JumpOutOfRange {
        /// Position after the jump instruction.
        from: usize,
        /// The relative offset.
        offset: i32,
    },

    /// A `const` operand named a missing constant-pool entry.
    #[error("constant index {index} outside pool of {len}")]
    ConstantOutOfRange {
        /// The requested index.
        index: u32,
        /// Size of the constant pool.
        len: usize,
    },

    /// A textual instruction named no known mnemonic.
    #[error("unknown mnemonic '{0}'")]
    UnknownMnemonic(String),

    /// A textual instruction had a missing, extra, or unparsable operand.
    #[error("malformed operand for {mnemonic}: {message}")]
    MalformedOperand {
        /// Mnemonic of the instruction.
        mnemonic: &'static str,
        /// What was wrong.
        message: String,
    },
}

/// Faults raised by operand stack bounds checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackFault {
    /// Not enough values above the current frame's floor.
    #[error("stack underflow: needed {needed}, {available} available")]
    Underflow {
        /// Values the operation needed.
        needed: usize,
        /// Values available to the current frame.
        available: usize,
    },

    /// The configured stack limit was exceeded.
    #[error("stack overflow: limit of {limit} slots")]
    Overflow {
        /// The configured limit.
        limit: usize,
    },
}

/// Faults raised by call frame management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameFault {
    /// `return` executed in the outermost frame.
    #[error("return with no caller frame")]
    NoCallerFrame,

    /// `load`/`store` addressed a slot outside the current window.
    #[error("local offset {offset} outside window ({arguments} arguments, {locals} locals)")]
    LocalOutOfWindow {
        /// The requested offset relative to the locals base.
        offset: i32,
        /// Argument slots beneath the locals base.
        arguments: usize,
        /// Allocated local slots.
        locals: usize,
    },

    /// `return` tried to reclaim more slots than the frame owns.
    #[error("return reclaiming {requested} slots, frame owns {available}")]
    ReturnBeyondFrame {
        /// Slots named by the instruction.
        requested: usize,
        /// Slots the frame owns.
        available: usize,
    },

    /// `alloc` executed while temporaries sat above the locals window.
    #[error("alloc with {temporaries} temporaries above the locals window")]
    AllocNotAtWindowTop {
        /// Values between the window top and the stack top.
        temporaries: usize,
    },

    /// The configured frame depth was exceeded.
    #[error("call depth limit of {limit} exceeded")]
    DepthExceeded {
        /// The configured limit.
        limit: usize,
    },
}

/// Faults raised by the object model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectFault {
    /// No class descriptor with this id.
    #[error("unknown class id {0}")]
    UnknownClassId(ClassId),

    /// Field offset not below the class field count.
    #[error("field offset {offset} out of range for class {class} with {field_count} fields")]
    FieldOffsetOutOfRange {
        /// Class of the instance.
        class: ClassId,
        /// The requested offset.
        offset: u32,
        /// Fields declared by the class.
        field_count: u32,
    },

    /// The reference operand was `Nothing`.
    #[error("null reference")]
    NullReference,

    /// The reference operand was some other kind of value.
    #[error("expected object reference, got {0}")]
    NotAReference(&'static str),

    /// The heap does not know this reference.
    #[error("dangling reference {0:?}")]
    DanglingReference(ObjectRef),

    /// The heap cannot issue another handle.
    #[error("heap exhausted after {0} instances")]
    HeapExhausted(usize),
}

/// Faults raised by the native trampoline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeFault {
    /// No function registered under this id.
    #[error("unregistered native id {0}")]
    Unregistered(NativeId),

    /// The host callable reported a failure.
    #[error("native {name} failed: {message}")]
    Failed {
        /// Registered name of the native.
        name: String,
        /// Failure reported by the host.
        message: String,
    },

    /// The host callable returned the wrong number of results.
    #[error("native {name} declared {declared} results, returned {actual}")]
    ReturnArityMismatch {
        /// Registered name of the native.
        name: String,
        /// Declared return arity.
        declared: usize,
        /// Results actually returned.
        actual: usize,
    },
}

impl From<DecodeFault> for Error {
    fn from(fault: DecodeFault) -> Self {
        Self::new(ErrorKind::Decode(fault))
    }
}

impl From<StackFault> for Error {
    fn from(fault: StackFault) -> Self {
        Self::new(ErrorKind::Stack(fault))
    }
}

impl From<FrameFault> for Error {
    fn from(fault: FrameFault) -> Self {
        Self::new(ErrorKind::Frame(fault))
    }
}

impl From<ObjectFault> for Error {
    fn from(fault: ObjectFault) -> Self {
        Self::new(ErrorKind::Object(fault))
    }
}

impl From<NativeFault> for Error {
    fn from(fault: NativeFault) -> Self {
        Self::new(ErrorKind::Native(fault))
    }
}

/// Where in the instruction stream an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Position of the faulting instruction.
    pub pc: Option<usize>,
    /// Disassembly of the faulting instruction.
    pub instruction: Option<String>,
    /// Number of active frames, the outermost included.
    pub frame_depth: Option<usize>,
    /// Return addresses of the active calls, innermost first.
    pub stack: Vec<usize>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the program counter.
    #[must_use]
    pub fn with_pc(mut self, pc: usize) -> Self {
        self.pc = Some(pc);
        self
    }

    /// Sets the instruction text.
    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Sets the frame depth.
    #[must_use]
    pub fn with_frame_depth(mut self, depth: usize) -> Self {
        self.frame_depth = Some(depth);
        self
    }

    /// Adds a return address.
    #[must_use]
    pub fn with_return_address(mut self, address: usize) -> Self {
        self.stack.push(address);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pc) = self.pc {
            write!(f, "at {pc}")?;
            if let Some(instruction) = &self.instruction {
                write!(f, " ({instruction})")?;
            }
        }
        if let Some(depth) = self.frame_depth {
            write!(f, " depth {depth}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for address in &self.stack {
                writeln!(f, "  called from {address}")?;
            }
        }
        Ok(())
    }
}
