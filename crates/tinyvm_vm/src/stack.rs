//! The shared operand stack and its call frames.
//!
//! All active calls share one growable `Vec<Value>`. A [`Frame`] holds
//! integer offsets into it, never references, so the buffer may reallocate
//! freely. Every bounds check that keeps one frame out of another frame's
//! slots lives here.
//!
//! Layout of the innermost frame (bottom to top):
//!
//! ```text
//! [ caller slots | arguments          | locals            | temporaries ]
//!                ^ floor              ^ locals_base        ^ window_top  ^ len
//! ```
//!
//! `pop`/`peek`/`roll` only reach temporaries. `load`/`store` reach
//! arguments (negative offsets) and locals (non-negative offsets).

use tinyvm_foundation::{Error, FrameFault, Result, Value};

/// Bookkeeping for one active call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Lowest slot this frame may address, the caller's window top at call time.
    pub floor: usize,
    /// Where this frame's locals begin.
    pub locals_base: usize,
    /// Number of locals reserved by `alloc`.
    pub locals_len: usize,
    /// Position to resume in the caller; `None` for the outermost frame.
    pub return_address: Option<usize>,
}

impl Frame {
    /// First slot above the locals window.
    #[must_use]
    pub const fn window_top(&self) -> usize {
        self.locals_base + self.locals_len
    }

    /// Number of argument slots beneath the locals base.
    #[must_use]
    pub const fn arguments(&self) -> usize {
        self.locals_base - self.floor
    }
}

/// Operand stack plus the frame stack paralleling active calls.
///
/// The last element of `frames` is the current frame; the element before it
/// is its caller. The outermost frame is never popped.
#[derive(Clone, Debug)]
pub struct Stack {
    values: Vec<Value>,
    frames: Vec<Frame>,
    max_values: usize,
    max_frames: usize,
}

impl Default for Stack {
    fn default() -> Self {
        Self::new(usize::MAX, usize::MAX, 0)
    }
}

impl Stack {
    /// Creates an empty stack with the given limits.
    #[must_use]
    pub fn new(max_values: usize, max_frames: usize, capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity.min(max_values)),
            frames: vec![Frame::default()],
            max_values,
            max_frames,
        }
    }

    /// Drops every value and every frame except a fresh outermost one.
    pub fn reset(&mut self) {
        self.values.clear();
        self.frames.clear();
        self.frames.push(Frame::default());
    }

    /// All values, bottom first.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Total number of values across all frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values are on the stack.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The current frame.
    #[must_use]
    pub fn frame(&self) -> &Frame {
        // The outermost frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Number of active frames, the outermost included.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Return addresses of the active calls, innermost first.
    pub fn return_addresses(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.iter().rev().filter_map(|f| f.return_address)
    }

    /// Temporaries above the current locals window.
    #[must_use]
    pub fn available(&self) -> usize {
        self.values.len() - self.frame().window_top()
    }

    fn require(&self, needed: usize) -> Result<()> {
        let available = self.available();
        if available < needed {
            return Err(Error::stack_underflow(needed, available));
        }
        Ok(())
    }

    /// Fails unless `n` more values fit under the limit.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Overflow` if the limit would be exceeded.
    pub fn ensure_room(&self, n: usize) -> Result<()> {
        if self.values.len().saturating_add(n) > self.max_values {
            return Err(Error::stack_overflow(self.max_values));
        }
        Ok(())
    }

    /// Pushes a value.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Overflow` at the configured limit.
    pub fn push(&mut self, value: Value) -> Result<()> {
        self.ensure_room(1)?;
        self.values.push(value);
        Ok(())
    }

    /// Pops the top temporary.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if only locals or arguments remain.
    pub fn pop(&mut self) -> Result<Value> {
        self.require(1)?;
        self.values
            .pop()
            .ok_or_else(|| Error::stack_underflow(1, 0))
    }

    /// Pops `n` temporaries, returned bottom first.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if fewer than `n` temporaries exist.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>> {
        self.require(n)?;
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    /// The top `n` temporaries, bottom first, without popping them.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if fewer than `n` temporaries exist.
    pub fn peek_n(&self, n: usize) -> Result<&[Value]> {
        self.require(n)?;
        Ok(&self.values[self.values.len() - n..])
    }

    /// The top temporary.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if there is none.
    pub fn peek(&self) -> Result<&Value> {
        self.peek_at(0)
    }

    /// The temporary `depth` positions below the top.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if there are not enough temporaries.
    pub fn peek_at(&self, depth: usize) -> Result<&Value> {
        self.require(depth + 1)?;
        Ok(&self.values[self.values.len() - 1 - depth])
    }

    /// Moves the value `n + 1` positions below the top to the top.
    ///
    /// `[.., O, A1, .., An]` becomes `[.., A1, .., An, O]`.
    ///
    /// # Errors
    ///
    /// Returns `StackFault::Underflow` if fewer than `n + 1` temporaries exist.
    pub fn roll(&mut self, n: usize) -> Result<()> {
        let span = n.saturating_add(1);
        self.require(span)?;
        let at = self.values.len() - span;
        self.values[at..].rotate_left(1);
        Ok(())
    }

    /// Opens the locals window at the current top.
    pub fn enter(&mut self) {
        let top = self.values.len();
        let frame = self.frame_mut();
        frame.locals_base = top;
        frame.locals_len = 0;
    }

    /// Extends the locals window by `n` slots set to [`Value::Nothing`].
    ///
    /// # Errors
    ///
    /// Returns [`FrameFault::AllocNotAtWindowTop`] if temporaries sit above the
    /// window, or `StackFault::Overflow` at the configured limit.
    pub fn alloc(&mut self, n: usize) -> Result<()> {
        let temporaries = self.available();
        if temporaries != 0 {
            return Err(FrameFault::AllocNotAtWindowTop { temporaries }.into());
        }
        self.ensure_room(n)?;
        let len = self.values.len() + n;
        self.values.resize(len, Value::Nothing);
        self.frame_mut().locals_len += n;
        Ok(())
    }

    fn slot(&self, offset: i32) -> Result<usize> {
        let frame = self.frame();
        let out_of_window = || {
            Error::from(FrameFault::LocalOutOfWindow {
                offset,
                arguments: frame.arguments(),
                locals: frame.locals_len,
            })
        };
        let slot = frame
            .locals_base
            .checked_add_signed(offset as isize)
            .ok_or_else(out_of_window)?;
        if slot < frame.floor || slot >= frame.window_top() {
            return Err(out_of_window());
        }
        Ok(slot)
    }

    /// Reads the argument or local at `offset` from the locals base.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFault::LocalOutOfWindow`] outside the current window.
    pub fn load(&self, offset: i32) -> Result<&Value> {
        let slot = self.slot(offset)?;
        Ok(&self.values[slot])
    }

    /// Pops the top temporary into the argument or local at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFault::LocalOutOfWindow`] outside the current window or
    /// `StackFault::Underflow` if there is nothing to store. The stack is
    /// untouched on failure.
    pub fn store(&mut self, offset: i32) -> Result<()> {
        let slot = self.slot(offset)?;
        let value = self.pop()?;
        self.values[slot] = value;
        Ok(())
    }

    /// Pushes a frame for a call returning to `return_address`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFault::DepthExceeded`] at the configured frame limit.
    pub fn call(&mut self, return_address: usize) -> Result<()> {
        if self.frames.len() >= self.max_frames {
            return Err(FrameFault::DepthExceeded {
                limit: self.max_frames,
            }
            .into());
        }
        let floor = self.frame().window_top();
        let top = self.values.len();
        self.frames.push(Frame {
            floor,
            locals_base: top,
            locals_len: 0,
            return_address: Some(return_address),
        });
        Ok(())
    }

    /// Returns from the current frame, reclaiming `n` slots beneath the
    /// return value, and yields the caller's resume position.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFault::NoCallerFrame`] in the outermost frame,
    /// `StackFault::Underflow` without a return value, or
    /// [`FrameFault::ReturnBeyondFrame`] if `n` reaches into the caller.
    pub fn ret(&mut self, n: usize) -> Result<usize> {
        let frame = *self.frame();
        let Some(return_address) = frame.return_address else {
            return Err(FrameFault::NoCallerFrame.into());
        };
        self.require(1)?;
        let owned = self.values.len() - 1 - frame.floor;
        if n > owned {
            return Err(FrameFault::ReturnBeyondFrame {
                requested: n,
                available: owned,
            }
            .into());
        }

        let value = self.pop()?;
        let len = self.values.len() - n;
        self.values.truncate(len);
        self.frames.pop();
        self.values.push(value);
        Ok(return_address)
    }
}
