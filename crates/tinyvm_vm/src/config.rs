//! Host-configurable limits for a VM instance.

/// Configuration for a VM instance.
///
/// Controls resource limits. Exceeding a limit is a fault, never a process
/// abort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmConfig {
    /// Maximum number of values on the operand stack.
    pub max_stack: usize,

    /// Maximum number of active frames, the outermost included.
    pub max_frames: usize,

    /// Maximum number of instructions per run (`None` = unbounded).
    pub max_steps: Option<u64>,

    /// Stack capacity reserved up front.
    pub initial_stack_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_stack: 65_536,
            max_frames: 1_024,
            max_steps: None,
            initial_stack_capacity: 256,
        }
    }
}

impl VmConfig {
    /// Creates a configuration without stack, frame, or step limits.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_stack: usize::MAX,
            max_frames: usize::MAX,
            max_steps: None,
            ..Self::default()
        }
    }

    /// Creates a tight configuration for running untrusted bytecode.
    #[must_use]
    pub fn sandboxed() -> Self {
        Self {
            max_stack: 4_096,
            max_frames: 64,
            max_steps: Some(1_000_000),
            initial_stack_capacity: 64,
        }
    }

    /// Builder method to set the stack limit.
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Builder method to set the frame limit.
    #[must_use]
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Builder method to set the step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Builder method to set the initial stack capacity.
    #[must_use]
    pub fn with_initial_stack_capacity(mut self, capacity: usize) -> Self {
        self.initial_stack_capacity = capacity;
        self
    }
}
