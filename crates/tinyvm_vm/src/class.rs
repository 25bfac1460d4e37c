//! Class descriptors and the immutable class registry.
//!
//! The registry is built once, before any VM runs, and shared read-only
//! (behind an `Arc`) by every VM instance. Each class's ancestor closure is
//! computed at build time so `is_instance` is a set lookup.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tinyvm_foundation::{ClassId, Error, ObjectFault, Result};

/// Static metadata describing an instance's shape and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// The class id referenced by `new` and `is_instance` operands.
    pub id: ClassId,
    /// Human-readable name, used in diagnostics only.
    pub name: String,
    /// Number of field slots in every instance.
    pub field_count: u32,
    /// Optional single parent.
    pub parent: Option<ClassId>,
}

impl ClassDescriptor {
    /// Creates a root class.
    #[must_use]
    pub fn new(id: ClassId, name: impl Into<String>, field_count: u32) -> Self {
        Self {
            id,
            name: name.into(),
            field_count,
            parent: None,
        }
    }

    /// Sets the parent class.
    #[must_use]
    pub fn with_parent(mut self, parent: ClassId) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl fmt::Display for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({} fields)", self.name, self.id, self.field_count)?;
        if let Some(parent) = self.parent {
            write!(f, " < {parent}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct ClassEntry {
    descriptor: ClassDescriptor,
    /// Parent chain, nearest first.
    ancestors: Vec<ClassId>,
    /// The class itself plus every ancestor.
    closure: HashSet<ClassId>,
}

/// Immutable mapping from class id to descriptor.
#[derive(Clone, Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<ClassId, ClassEntry>,
}

impl ClassRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> ClassRegistryBuilder {
        ClassRegistryBuilder::default()
    }

    /// Looks up a class.
    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(&id).map(|entry| &entry.descriptor)
    }

    /// Looks up a class, faulting if absent.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectFault::UnknownClassId`] if no class has this id.
    pub fn descriptor(&self, id: ClassId) -> Result<&ClassDescriptor> {
        self.get(id).ok_or_else(|| Error::unknown_class(id))
    }

    /// Returns true if `class` is `ancestor` or inherits from it.
    ///
    /// Unknown ids are never subclasses of anything.
    #[must_use]
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.classes
            .get(&class)
            .is_some_and(|entry| entry.closure.contains(&ancestor))
    }

    /// Parent chain of a class, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: ClassId) -> &[ClassId] {
        self.classes
            .get(&id)
            .map_or(&[], |entry| entry.ancestors.as_slice())
    }

    /// Number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if no classes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterates over descriptors in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        let mut descriptors: Vec<_> = self.classes.values().map(|e| &e.descriptor).collect();
        descriptors.sort_by_key(|d| d.id);
        descriptors.into_iter()
    }
}

/// Collects descriptors and validates them into a [`ClassRegistry`].
#[derive(Clone, Debug, Default)]
pub struct ClassRegistryBuilder {
    descriptors: Vec<ClassDescriptor>,
}

impl ClassRegistryBuilder {
    /// Adds a class.
    #[must_use]
    pub fn class(mut self, descriptor: ClassDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Adds several classes.
    #[must_use]
    pub fn classes(mut self, descriptors: impl IntoIterator<Item = ClassDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Validates the descriptors and computes ancestor closures.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidClassTable`](tinyvm_foundation::ErrorKind)
    /// for duplicate ids, parents that are not registered, or inheritance
    /// cycles.
    pub fn build(self) -> Result<ClassRegistry> {
        let mut by_id: HashMap<ClassId, ClassDescriptor> = HashMap::new();
        for descriptor in self.descriptors {
            let id = descriptor.id;
            if by_id.insert(id, descriptor).is_some() {
                return Err(Error::invalid_class_table(format!("duplicate class id {id}")));
            }
        }

        let mut classes = HashMap::with_capacity(by_id.len());
        for (&id, descriptor) in &by_id {
            let mut ancestors = Vec::new();
            let mut closure = HashSet::from([id]);
            let mut cursor = descriptor.parent;
            while let Some(parent) = cursor {
                if !closure.insert(parent) {
                    return Err(Error::invalid_class_table(format!(
                        "inheritance cycle through class {id}"
                    )));
                }
                let Some(parent_descriptor) = by_id.get(&parent) else {
                    return Err(Error::invalid_class_table(format!(
                        "class {id} names unknown ancestor {parent}"
                    )));
                };
                ancestors.push(parent);
                cursor = parent_descriptor.parent;
            }
            classes.insert(
                id,
                ClassEntry {
                    descriptor: descriptor.clone(),
                    ancestors,
                    closure,
                },
            );
        }

        tracing::debug!(classes = classes.len(), "built class registry");
        Ok(ClassRegistry { classes })
    }
}

/// Convenience check used by field access.
pub(crate) fn check_field(descriptor: &ClassDescriptor, offset: u32) -> Result<()> {
    if offset >= descriptor.field_count {
        return Err(ObjectFault::FieldOffsetOutOfRange {
            class: descriptor.id,
            offset,
            field_count: descriptor.field_count,
        }
        .into());
    }
    Ok(())
}
