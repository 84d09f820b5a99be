//! Stable identities for classes, methods and fields.
//!
//! Every entity in the program model is addressed by a value identity rather than a
//! pointer: classes by fully-qualified name, methods by owner + name + descriptor,
//! fields by owner + name + type. Identities are cheap to clone (shared string
//! storage), totally ordered and hashable, so they can key the side tables that
//! passes exchange, and every deterministic merge in the pipeline sorts by them.

use std::fmt;
use std::sync::Arc;

/// Identity of a class: its fully-qualified name.
///
/// `ClassId` is the key of the owning [`Program`](crate::model::Program) container and
/// the target of all type-level references (supertype, implements, instantiation,
/// type checks). Ordering is lexicographic on the name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(Arc<str>);

impl ClassId {
    /// Creates a class identity from a fully-qualified name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        ClassId(Arc::from(name.as_ref()))
    }

    /// Returns the fully-qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        ClassId::new(name)
    }
}

/// A method signature: name plus descriptor, without the owning class.
///
/// Signatures are what virtual dispatch selects on. Two methods on different classes
/// with equal signatures participate in the same override relation whenever their
/// owners are related in the hierarchy.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodSig {
    /// Method name.
    pub name: Arc<str>,
    /// Method descriptor, e.g. `(I)V`.
    pub descriptor: Arc<str>,
}

impl MethodSig {
    /// Creates a signature from a name and descriptor.
    #[must_use]
    pub fn new(name: impl AsRef<str>, descriptor: impl AsRef<str>) -> Self {
        MethodSig {
            name: Arc::from(name.as_ref()),
            descriptor: Arc::from(descriptor.as_ref()),
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

impl fmt::Debug for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodSig({}{})", self.name, self.descriptor)
    }
}

/// Identity of a method: owning class, name and descriptor.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId {
    /// The declaring class.
    pub owner: ClassId,
    /// Method name.
    pub name: Arc<str>,
    /// Method descriptor, e.g. `(I)V`.
    pub descriptor: Arc<str>,
}

impl MethodId {
    /// Creates a method identity.
    #[must_use]
    pub fn new(owner: ClassId, name: impl AsRef<str>, descriptor: impl AsRef<str>) -> Self {
        MethodId {
            owner,
            name: Arc::from(name.as_ref()),
            descriptor: Arc::from(descriptor.as_ref()),
        }
    }

    /// Returns the name + descriptor signature of this method.
    #[must_use]
    pub fn sig(&self) -> MethodSig {
        MethodSig {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    /// Returns the same signature under a different owner.
    #[must_use]
    pub fn with_owner(&self, owner: ClassId) -> Self {
        MethodId {
            owner,
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    /// Returns the same owner and descriptor under a different name.
    #[must_use]
    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        MethodId {
            owner: self.owner.clone(),
            name: Arc::from(name.as_ref()),
            descriptor: self.descriptor.clone(),
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

impl fmt::Debug for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodId({}.{}{})", self.owner, self.name, self.descriptor)
    }
}

/// Identity of a field: owning class, name and value type.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldId {
    /// The declaring class.
    pub owner: ClassId,
    /// Field name.
    pub name: Arc<str>,
    /// Field value type, e.g. `I` or `Ljava/lang/String;`.
    pub type_name: Arc<str>,
}

impl FieldId {
    /// Creates a field identity.
    #[must_use]
    pub fn new(owner: ClassId, name: impl AsRef<str>, type_name: impl AsRef<str>) -> Self {
        FieldId {
            owner,
            name: Arc::from(name.as_ref()),
            type_name: Arc::from(type_name.as_ref()),
        }
    }

    /// Returns the same field under a different owner.
    #[must_use]
    pub fn with_owner(&self, owner: ClassId) -> Self {
        FieldId {
            owner,
            name: self.name.clone(),
            type_name: self.type_name.clone(),
        }
    }

    /// Returns the same owner and type under a different name.
    #[must_use]
    pub fn with_name(&self, name: impl AsRef<str>) -> Self {
        FieldId {
            owner: self.owner.clone(),
            name: Arc::from(name.as_ref()),
            type_name: self.type_name.clone(),
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.owner, self.name, self.type_name)
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldId({}.{}:{})", self.owner, self.name, self.type_name)
    }
}

/// Identity of any program entity.
///
/// Used wherever passes need a uniform key: directive targets, live sets, event
/// records, removal reports. The ordering (classes, then methods, then fields,
/// each internally ordered) is relied on for deterministic accumulator merges.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum ItemId {
    /// A class.
    Class(ClassId),
    /// A method.
    Method(MethodId),
    /// A field.
    Field(FieldId),
}

impl ItemId {
    /// Returns the class this item belongs to (the class itself for class items).
    #[must_use]
    pub fn owner(&self) -> &ClassId {
        match self {
            ItemId::Class(id) => id,
            ItemId::Method(id) => &id.owner,
            ItemId::Field(id) => &id.owner,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Class(id) => write!(f, "{id}"),
            ItemId::Method(id) => write!(f, "{id}"),
            ItemId::Field(id) => write!(f, "{id}"),
        }
    }
}

impl From<ClassId> for ItemId {
    fn from(id: ClassId) -> Self {
        ItemId::Class(id)
    }
}

impl From<MethodId> for ItemId {
    fn from(id: MethodId) -> Self {
        ItemId::Method(id)
    }
}

impl From<FieldId> for ItemId {
    fn from(id: FieldId) -> Self {
        ItemId::Field(id)
    }
}
