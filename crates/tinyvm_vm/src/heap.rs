//! Instance storage behind opaque references.
//!
//! The VM only allocates instances and reads or writes their field slots;
//! reclamation is left to the [`Heap`] implementation. [`ArenaHeap`] never
//! frees, which is enough for programs that run to completion.

use std::sync::atomic::{AtomicU32, Ordering};

use tinyvm_foundation::{ClassId, ObjectFault, ObjectRef, Result, Value};

use crate::class::ClassDescriptor;

/// One allocated object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInstance {
    /// Class the instance was created from.
    pub class: ClassId,
    /// Field slots, one per declared field.
    pub fields: Box<[Value]>,
}

/// Storage for object instances.
pub trait Heap {
    /// Allocates an instance with every field set to [`Value::Nothing`].
    ///
    /// # Errors
    ///
    /// Returns [`ObjectFault::HeapExhausted`] if no handle can be issued.
    fn allocate(&mut self, class: &ClassDescriptor) -> Result<ObjectRef>;

    /// Looks up an instance.
    fn instance(&self, reference: ObjectRef) -> Option<&ObjectInstance>;

    /// Looks up an instance for writing.
    fn instance_mut(&mut self, reference: ObjectRef) -> Option<&mut ObjectInstance>;

    /// Number of live instances.
    fn instance_count(&self) -> usize;

    /// Class of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectFault::DanglingReference`] for unknown references.
    fn class_of(&self, reference: ObjectRef) -> Result<ClassId> {
        self.instance(reference)
            .map(|instance| instance.class)
            .ok_or_else(|| ObjectFault::DanglingReference(reference).into())
    }

    /// Field slots of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectFault::DanglingReference`] for unknown references.
    fn fields(&self, reference: ObjectRef) -> Result<&[Value]> {
        self.instance(reference)
            .map(|instance| &*instance.fields)
            .ok_or_else(|| ObjectFault::DanglingReference(reference).into())
    }
}

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(1);

/// Append-only heap; references are indices tagged with the heap's generation.
///
/// References from a different `ArenaHeap` never resolve here.
#[derive(Clone, Debug)]
pub struct ArenaHeap {
    instances: Vec<ObjectInstance>,
    generation: u32,
}

impl Default for ArenaHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaHeap {
    /// Creates an empty heap with a fresh generation tag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Drops every instance and retires all outstanding references.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    }

    fn index(&self, reference: ObjectRef) -> Option<usize> {
        (reference.generation == self.generation).then_some(reference.index as usize)
    }
}

impl Heap for ArenaHeap {
    fn allocate(&mut self, class: &ClassDescriptor) -> Result<ObjectRef> {
        let count = self.instances.len();
        let index = u32::try_from(count).map_err(|_| ObjectFault::HeapExhausted(count))?;
        self.instances.push(ObjectInstance {
            class: class.id,
            fields: vec![Value::Nothing; class.field_count as usize].into_boxed_slice(),
        });
        Ok(ObjectRef::new(index, self.generation))
    }

    fn instance(&self, reference: ObjectRef) -> Option<&ObjectInstance> {
        self.index(reference).and_then(|i| self.instances.get(i))
    }

    fn instance_mut(&mut self, reference: ObjectRef) -> Option<&mut ObjectInstance> {
        self.index(reference).and_then(|i| self.instances.get_mut(i))
    }

    fn instance_count(&self) -> usize {
        self.instances.len()
    }
}
