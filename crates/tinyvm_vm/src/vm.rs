//! The fetch-decode-execute loop.
//!
//! The VM is the only component that knows the program counter. Each cycle
//! decodes one [`Instruction`], advances the counter past it, and runs the
//! matching arm of an exhaustive `match`. Handlers validate before they
//! mutate, so a faulting instruction leaves no partial effect behind.
//!
//! # Sharing
//!
//! [`ClassRegistry`] and [`NativeRegistry`] are built once and shared by
//! `Arc` across any number of VMs, one per thread if desired. Everything a
//! run mutates (stack, frames, heap) is owned by the VM itself.
//!
//! # Termination
//!
//! A run ends when `halt` executes, when the counter lands exactly on the
//! end of the code, or when a fault occurs. Cancellation and the step limit
//! are checked before every fetch and surface as errors.

#![allow(clippy::cast_possible_wrap)]


use std::sync::Arc;

use tinyvm_bytecode::{Instruction, Program};
use tinyvm_foundation::{
    ClassId, DecodeFault, Error, ErrorContext, ErrorKind, NativeId, ObjectFault, ObjectRef,
    Result, Value,
};
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::class::{ClassRegistry, check_field};
use crate::config::VmConfig;
use crate::heap::{ArenaHeap, Heap};
use crate::native::NativeRegistry;
use crate::stack::Stack;

/// Result of executing one instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// More instructions follow.
    Continue,
    /// The program finished.
    Halted,
}

/// Summary of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Instructions executed.
    pub steps: u64,
    /// Program counter when execution stopped.
    pub halted_at: usize,
}

/// A bytecode interpreter instance.
pub struct Vm<H: Heap = ArenaHeap> {
    stack: Stack,
    heap: H,
    classes: Arc<ClassRegistry>,
    natives: Arc<NativeRegistry>,
    config: VmConfig,
    cancel: CancelToken,
    pc: usize,
    steps: u64,
    halted: bool,
}

impl Vm<ArenaHeap> {
    /// Creates a VM with the default configuration and an empty arena heap.
    #[must_use]
    pub fn new(classes: Arc<ClassRegistry>, natives: Arc<NativeRegistry>) -> Self {
        Self::with_config(classes, natives, VmConfig::default())
    }

    /// Creates a VM with the given configuration and an empty arena heap.
    #[must_use]
    pub fn with_config(
        classes: Arc<ClassRegistry>,
        natives: Arc<NativeRegistry>,
        config: VmConfig,
    ) -> Self {
        Self::with_heap(classes, natives, config, ArenaHeap::new())
    }
}

impl<H: Heap> Vm<H> {
    /// Creates a VM over a host-supplied heap.
    #[must_use]
    pub fn with_heap(
        classes: Arc<ClassRegistry>,
        natives: Arc<NativeRegistry>,
        config: VmConfig,
        heap: H,
    ) -> Self {
        Self {
            stack: Stack::new(
                config.max_stack,
                config.max_frames,
                config.initial_stack_capacity,
            ),
            heap,
            classes,
            natives,
            config,
            cancel: CancelToken::new(),
            pc: 0,
            steps: 0,
            halted: false,
        }
    }

    /// Replaces the cancellation token, so hosts can create it up front.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The operand stack.
    #[must_use]
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// The top value, if any.
    #[must_use]
    pub fn top(&self) -> Option<&Value> {
        self.stack.values().last()
    }

    /// Number of active frames, the outermost included.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.stack.frame_depth()
    }

    /// The heap.
    #[must_use]
    pub fn heap(&self) -> &H {
        &self.heap
    }

    /// The heap, mutably.
    pub fn heap_mut(&mut self) -> &mut H {
        &mut self.heap
    }

    /// The class registry.
    #[must_use]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Position of the next instruction.
    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Instructions executed since the last [`start`](Self::start).
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns true once the current run has finished.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// A handle that cancels this VM from any thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Resets the stack and frames and positions the counter at the entry.
    ///
    /// The heap is left alone; its lifetime is the host's business.
    pub fn start(&mut self, program: &Program) {
        self.stack.reset();
        self.pc = program.entry;
        self.steps = 0;
        self.halted = false;
    }

    /// Runs `program` from its entry until it halts.
    ///
    /// # Errors
    ///
    /// Returns the first fault, annotated with the faulting position.
    pub fn run(&mut self, program: &Program) -> Result<Outcome> {
        self.start(program);
        self.resume(program)
    }

    /// Continues a started run until it halts.
    ///
    /// # Errors
    ///
    /// Returns the first fault, annotated with the faulting position.
    pub fn resume(&mut self, program: &Program) -> Result<Outcome> {
        while self.step(program)? == Step::Continue {}
        Ok(Outcome {
            steps: self.steps,
            halted_at: self.pc,
        })
    }

    /// Executes a single instruction.
    ///
    /// # Errors
    ///
    /// Returns a fault if the host cancelled, the step limit was reached, or
    /// the instruction could not be decoded or executed.
    pub fn step(&mut self, program: &Program) -> Result<Step> {
        if self.halted {
            return Ok(Step::Halted);
        }
        let pc = self.pc;
        // Running off the end halts without a fetch.
        if pc == program.code.len() {
            self.halted = true;
            return Ok(Step::Halted);
        }
        if self.cancel.is_cancelled() {
            return Err(self.annotate(Error::new(ErrorKind::Cancelled), pc, None));
        }
        if let Some(limit) = self.config.max_steps {
            if self.steps >= limit {
                return Err(self.annotate(
                    Error::new(ErrorKind::StepLimitExceeded { limit }),
                    pc,
                    None,
                ));
            }
        }
        let (instruction, next) = program
            .code
            .decode_at(pc)
            .map_err(|fault| self.annotate(fault.into(), pc, None))?;
        trace!(
            target: "tinyvm::dispatch",
            pc,
            %instruction,
            depth = self.stack.frame_depth(),
            stack = self.stack.len(),
            "dispatch"
        );

        self.steps += 1;
        self.pc = next;
        match self.execute(program, instruction, next) {
            Ok(step) => {
                if step == Step::Halted {
                    self.pc = pc;
                    self.halted = true;
                    debug!(pc, steps = self.steps, "halt");
                }
                Ok(step)
            }
            Err(err) => {
                // Faults report the faulting instruction, not the advanced counter.
                self.pc = pc;
                let err = self.annotate(err, pc, Some(instruction));
                debug!(pc, %instruction, error = %err, "fault");
                Err(err)
            }
        }
    }

    fn annotate(&self, err: Error, pc: usize, instruction: Option<Instruction>) -> Error {
        let mut context = ErrorContext::new()
            .with_pc(pc)
            .with_frame_depth(self.stack.frame_depth());
        if let Some(instruction) = instruction {
            context = context.with_instruction(instruction.to_string());
        }
        for address in self.stack.return_addresses() {
            context = context.with_return_address(address);
        }
        err.with_context(context)
    }

    fn execute(&mut self, program: &Program, instruction: Instruction, next: usize) -> Result<Step> {
        match instruction {
            Instruction::Halt => return Ok(Step::Halted),

            Instruction::Const(index) => {
                let value = program.constant(index)?.clone();
                self.stack.push(value)?;
            }

            Instruction::Pop => {
                self.stack.pop()?;
            }

            Instruction::Roll(n) => self.stack.roll(n as usize)?,

            // Frames
            Instruction::Call(target) => {
                self.stack.call(next)?;
                self.pc = target as usize;
                debug!(
                    callee = target,
                    return_address = next,
                    depth = self.stack.frame_depth(),
                    "call"
                );
            }
            Instruction::Enter => self.stack.enter(),
            Instruction::Alloc(n) => self.stack.alloc(n as usize)?,
            Instruction::Return(n) => {
                self.pc = self.stack.ret(n as usize)?;
                debug!(
                    reclaimed = n,
                    resume = self.pc,
                    depth = self.stack.frame_depth(),
                    "return"
                );
            }
            Instruction::Load(offset) => {
                let value = self.stack.load(offset)?.clone();
                self.stack.push(value)?;
            }
            Instruction::Store(offset) => self.stack.store(offset)?,

            // Objects
            Instruction::New(class) => self.new_instance(class)?,
            Instruction::LoadField(offset) => self.load_field(offset)?,
            Instruction::StoreField(offset) => self.store_field(offset)?,
            Instruction::IsInstance(class) => self.is_instance(class)?,

            // Branches
            Instruction::Jump(offset) => {
                self.pc = jump_target(program, next, offset)?;
            }
            Instruction::JumpIf(offset) => {
                let target = jump_target(program, next, offset)?;
                if self.stack.pop()?.is_truthy() {
                    self.pc = target;
                }
            }
            Instruction::JumpIfNot(offset) => {
                let target = jump_target(program, next, offset)?;
                if !self.stack.pop()?.is_truthy() {
                    self.pc = target;
                }
            }

            Instruction::CallNative(id) => self.call_native(id)?,
        }
        Ok(Step::Continue)
    }

    fn new_instance(&mut self, class: ClassId) -> Result<()> {
        let descriptor = self.classes.descriptor(class)?;
        self.stack.ensure_room(1)?;
        let reference = self.heap.allocate(descriptor)?;
        self.stack.push(Value::Ref(reference))
    }

    /// Resolves `reference` and bounds-checks `offset` against its class.
    fn field_slot(&self, reference: ObjectRef, offset: u32) -> Result<()> {
        let class = self.heap.class_of(reference)?;
        let descriptor = self.classes.descriptor(class)?;
        check_field(descriptor, offset)
    }

    fn load_field(&mut self, offset: u32) -> Result<()> {
        let reference = object_operand(self.stack.peek()?)?;
        self.field_slot(reference, offset)?;
        let value = self.heap.fields(reference)?[offset as usize].clone();
        self.stack.pop()?;
        self.stack.push(value)
    }

    // Stack before: [.., value, objref].
    fn store_field(&mut self, offset: u32) -> Result<()> {
        let reference = object_operand(self.stack.peek()?)?;
        self.stack.peek_at(1)?;
        self.field_slot(reference, offset)?;
        self.stack.pop()?;
        let value = self.stack.pop()?;
        let instance = self
            .heap
            .instance_mut(reference)
            .ok_or(ObjectFault::DanglingReference(reference))?;
        instance.fields[offset as usize] = value;
        Ok(())
    }

    fn is_instance(&mut self, class: ClassId) -> Result<()> {
        let reference = object_operand(self.stack.peek()?)?;
        self.classes.descriptor(class)?;
        let actual = self.heap.class_of(reference)?;
        let result = self.classes.is_subclass(actual, class);
        self.stack.push(Value::Bool(result))
    }

    fn call_native(&mut self, id: NativeId) -> Result<()> {
        let native = self.natives.get(id)?;
        let results = native.call(self.stack.peek_n(native.arity)?)?;
        debug!(
            native = %native.name,
            id = id.index(),
            arity = native.arity,
            returns = results.len(),
            "native"
        );
        self.stack
            .ensure_room(results.len().saturating_sub(native.arity))?;
        self.stack.pop_n(native.arity)?;
        for value in results {
            self.stack.push(value)?;
        }
        Ok(())
    }
}

fn object_operand(value: &Value) -> Result<ObjectRef> {
    match value {
        Value::Ref(reference) => Ok(*reference),
        Value::Nothing => Err(Error::null_reference()),
        other => Err(ObjectFault::NotAReference(other.kind_name()).into()),
    }
}

fn jump_target(program: &Program, from: usize, offset: i32) -> Result<usize> {
    from.checked_add_signed(offset as isize)
        .filter(|&target| target <= program.code.len())
        .ok_or_else(|| DecodeFault::JumpOutOfRange { from, offset }.into())
}
