//! Native trampoline: host functions reachable through `call_native`.
//!
//! Hosts register every native before execution begins. The registry is
//! then shared read-only, like the class registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tinyvm_foundation::{Error, NativeFault, NativeId, Result, Value};

/// What a host callable returns: its results, or a failure message.
pub type NativeResult = std::result::Result<Vec<Value>, String>;

type NativeCallable = dyn Fn(&[Value]) -> NativeResult + Send + Sync;

/// A host function with a fixed argument and return arity.
#[derive(Clone)]
pub struct NativeFn {
    /// Name used in diagnostics.
    pub name: String,
    /// Values consumed from the stack.
    pub arity: usize,
    /// Values pushed back.
    pub returns: usize,
    func: Arc<NativeCallable>,
}

impl NativeFn {
    /// Wraps a host callable.
    pub fn new<F>(name: impl Into<String>, arity: usize, returns: usize, func: F) -> Self
    where
        F: Fn(&[Value]) -> NativeResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            returns,
            func: Arc::new(func),
        }
    }

    /// Invokes the callable with exactly `arity` arguments, bottom first.
    ///
    /// # Errors
    ///
    /// Returns [`NativeFault::Failed`] if the callable reports a failure and
    /// [`NativeFault::ReturnArityMismatch`] if it returns the wrong number of
    /// results.
    pub fn call(&self, args: &[Value]) -> Result<Vec<Value>> {
        let results = (self.func)(args).map_err(|message| NativeFault::Failed {
            name: self.name.clone(),
            message,
        })?;
        if results.len() != self.returns {
            return Err(NativeFault::ReturnArityMismatch {
                name: self.name.clone(),
                declared: self.returns,
                actual: results.len(),
            }
            .into());
        }
        Ok(results)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Mapping from native id to host function.
#[derive(Clone, Debug, Default)]
pub struct NativeRegistry {
    natives: HashMap<NativeId, NativeFn>,
}

impl NativeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native, replacing any previous entry with the same id.
    pub fn register(&mut self, id: NativeId, native: NativeFn) -> Option<NativeFn> {
        self.natives.insert(id, native)
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, id: NativeId, native: NativeFn) -> Self {
        self.register(id, native);
        self
    }

    /// Looks up a native.
    ///
    /// # Errors
    ///
    /// Returns [`NativeFault::Unregistered`] if nothing is registered under `id`.
    pub fn get(&self, id: NativeId) -> Result<&NativeFn> {
        self.natives
            .get(&id)
            .ok_or_else(|| Error::unregistered_native(id))
    }

    /// Number of registered natives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.natives.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }

    /// Iterates over registered natives in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (NativeId, &NativeFn)> {
        let mut entries: Vec<_> = self.natives.iter().map(|(&id, f)| (id, f)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter()
    }
}
