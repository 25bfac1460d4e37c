//! A loaded program together with the registries it runs against.
//!
//! A [`Session`] owns the shared, immutable state (program, class table,
//! natives) and hands out fresh [`Vm`]s over it. Any number of VMs may run
//! the same session concurrently.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use tinyvm_bytecode::{Instruction, Program};
use tinyvm_foundation::{Error, Result};
use tinyvm_vm::{ClassRegistry, NativeRegistry, Outcome, Vm, VmConfig};

use crate::builtins::{PrintSink, builtin_name, builtin_natives};
use crate::image::{ProgramImage, load_from_file};

/// Shared execution state for one program.
#[derive(Clone, Debug)]
pub struct Session {
    program: Arc<Program>,
    classes: Arc<ClassRegistry>,
    natives: Arc<NativeRegistry>,
    config: VmConfig,
}

impl Session {
    /// Creates a session from parts.
    #[must_use]
    pub fn new(program: Program, classes: ClassRegistry, natives: NativeRegistry) -> Self {
        Self {
            program: Arc::new(program),
            classes: Arc::new(classes),
            natives: Arc::new(natives),
            config: VmConfig::default(),
        }
    }

    /// Creates a session from an image, with the builtins printing to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image's class table is invalid.
    pub fn from_image(image: ProgramImage, sink: &PrintSink) -> Result<Self> {
        let (program, classes) = image.into_parts()?;
        Ok(Self::new(program, classes, builtin_natives(sink)))
    }

    /// Loads an image file, with the builtins printing to `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded, or if its
    /// class table is invalid.
    pub fn load<P: AsRef<Path>>(path: P, sink: &PrintSink) -> Result<Self> {
        Self::from_image(load_from_file(path)?, sink)
    }

    /// Sets the configuration used for new VMs.
    #[must_use]
    pub fn with_config(mut self, config: VmConfig) -> Self {
        self.config = config;
        self
    }

    /// The program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The class table.
    #[must_use]
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// The natives.
    #[must_use]
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// The configuration used for new VMs.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Creates a VM sharing this session's registries.
    #[must_use]
    pub fn vm(&self) -> Vm {
        Vm::with_config(
            Arc::clone(&self.classes),
            Arc::clone(&self.natives),
            self.config.clone(),
        )
    }

    /// Runs the program on `vm` from its entry.
    ///
    /// The VM stays inspectable afterwards, fault or not.
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped the program.
    pub fn execute(&self, vm: &mut Vm) -> Result<Outcome> {
        let outcome = vm.run(&self.program);
        match &outcome {
            Ok(outcome) => tracing::debug!(
                steps = outcome.steps,
                halted_at = outcome.halted_at,
                "program finished"
            ),
            Err(err) => tracing::debug!(error = %err, steps = vm.steps(), "program faulted"),
        }
        outcome
    }

    /// Runs the program on a fresh VM.
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped the program.
    pub fn run(&self) -> Result<Outcome> {
        self.execute(&mut self.vm())
    }

    /// Renders the class table, constant pool, and annotated code.
    ///
    /// # Errors
    ///
    /// Returns the first decode fault in the code.
    pub fn disassemble(&self) -> Result<String> {
        let mut out = String::new();

        let _ = writeln!(out, "classes:");
        for class in self.classes.iter() {
            let _ = writeln!(out, "  {class}");
        }

        let _ = writeln!(out, "constants:");
        for (index, value) in self.program.constants.iter().enumerate() {
            let _ = writeln!(out, "  {index:>4}: {value:?}");
        }

        let _ = writeln!(out, "code (entry {}):", self.program.entry);
        for item in self.program.code.instructions() {
            let (pc, instruction) = item.map_err(Error::from)?;
            let _ = write!(out, "{pc:>6}: {instruction}");
            if let Some(note) = self.annotation(instruction) {
                let _ = write!(out, "  ; {note}");
            }
            out.push('\n');
        }

        Ok(out)
    }

    fn annotation(&self, instruction: Instruction) -> Option<String> {
        match instruction {
            Instruction::CallNative(id) => self
                .natives
                .get(id)
                .ok()
                .map(|native| native.name.clone())
                .or_else(|| builtin_name(id).map(str::to_string)),
            Instruction::New(class) | Instruction::IsInstance(class) => {
                self.classes.get(class).map(|c| c.name.clone())
            }
            Instruction::Const(index) => self
                .program
                .constants
                .get(index as usize)
                .map(|value| format!("{value:?}")),
            _ => None,
        }
    }
}
