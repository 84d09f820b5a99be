//! Class, method and field definitions.
//!
//! Definitions are plain values owned by the [`Program`](crate::model::Program)
//! container. They are never mutated in place once committed; passes clone a
//! definition, edit the clone and commit a new program snapshot.

use strum::Display;

use crate::directives::DirectiveSet;
use crate::model::{ClassId, FieldId, Instruction, MethodId, MethodSig};

/// The kind of a class definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ClassKind {
    /// A concrete or abstract class.
    Class,
    /// An interface.
    Interface,
    /// An enum type.
    Enum,
    /// An annotation type.
    Annotation,
}

/// Member and class visibility.
///
/// Ordered from most to least restrictive so merged entities can take the wider
/// of two visibilities.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    /// Visible only inside the declaring class.
    Private,
    /// Visible inside the declaring package.
    Package,
    /// Visible to subclasses.
    Protected,
    /// Visible everywhere.
    Public,
}

impl Visibility {
    /// Returns the wider (less restrictive) of two visibilities.
    #[must_use]
    pub fn widest(self, other: Visibility) -> Visibility {
        self.max(other)
    }
}

/// The kind of a method definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MethodKind {
    /// An instance method participating in dispatch (unless private).
    Virtual,
    /// A static method.
    Static,
    /// An instance constructor.
    Constructor,
    /// An abstract instance method; never has a body.
    Abstract,
}

/// The kind of a field definition.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FieldKind {
    /// A per-instance field.
    Instance,
    /// A static field.
    Static,
}

/// A method body: a linear sequence of logical instructions over a local frame.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodBody {
    /// Total number of local slots, parameters included.
    pub locals: u32,
    /// Number of leading parameter slots (receiver included for instance methods).
    pub params: u32,
    /// The instruction sequence; the final instruction is the sole terminator.
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Creates a body from a frame layout and instruction sequence.
    #[must_use]
    pub fn new(params: u32, locals: u32, instructions: Vec<Instruction>) -> Self {
        MethodBody {
            locals,
            params,
            instructions,
        }
    }
}

/// A method definition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodDef {
    /// Identity: owner, name, descriptor.
    pub id: MethodId,
    /// Dispatch kind.
    pub kind: MethodKind,
    /// Visibility.
    pub visibility: Visibility,
    /// Constraints attached to this method.
    pub directives: DirectiveSet,
    /// The body; absent for abstract and external-stub methods.
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Creates a method definition.
    #[must_use]
    pub fn new(
        id: MethodId,
        kind: MethodKind,
        visibility: Visibility,
        body: Option<MethodBody>,
    ) -> Self {
        MethodDef {
            id,
            kind,
            visibility,
            directives: DirectiveSet::empty(),
            body,
        }
    }

    /// Returns the name + descriptor signature.
    #[must_use]
    pub fn sig(&self) -> MethodSig {
        self.id.sig()
    }

    /// Estimated code size: the instruction count of the body.
    ///
    /// This is the metric the inliner's budget policy consumes.
    #[must_use]
    pub fn code_size(&self) -> usize {
        self.body.as_ref().map_or(0, |b| b.instructions.len())
    }

    /// Returns `true` if this method participates in virtual dispatch: an
    /// instance method that is neither private, a constructor, nor static.
    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        matches!(self.kind, MethodKind::Virtual | MethodKind::Abstract)
            && self.visibility != Visibility::Private
    }
}

/// A field definition.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldDef {
    /// Identity: owner, name, type.
    pub id: FieldId,
    /// Static or per-instance.
    pub kind: FieldKind,
    /// Visibility.
    pub visibility: Visibility,
    /// Constraints attached to this field.
    pub directives: DirectiveSet,
}

impl FieldDef {
    /// Creates a field definition.
    #[must_use]
    pub fn new(id: FieldId, kind: FieldKind, visibility: Visibility) -> Self {
        FieldDef {
            id,
            kind,
            visibility,
            directives: DirectiveSet::empty(),
        }
    }
}

/// A class definition: identity, hierarchy edges, ordered members, constraints.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClassDef {
    /// Identity: the fully-qualified name.
    pub id: ClassId,
    /// Class kind.
    pub kind: ClassKind,
    /// Visibility.
    pub visibility: Visibility,
    /// The direct superclass, if any. `None` for hierarchy roots.
    pub superclass: Option<ClassId>,
    /// Implemented interfaces in declaration order.
    pub interfaces: Vec<ClassId>,
    /// Declared fields in declaration order.
    pub fields: Vec<FieldDef>,
    /// Declared methods in declaration order.
    pub methods: Vec<MethodDef>,
    /// Constraints attached to this class.
    pub directives: DirectiveSet,
}

impl ClassDef {
    /// Creates an empty class definition.
    #[must_use]
    pub fn new(id: ClassId, kind: ClassKind, visibility: Visibility) -> Self {
        ClassDef {
            id,
            kind,
            visibility,
            superclass: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            directives: DirectiveSet::empty(),
        }
    }

    /// Returns `true` for interface definitions.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Looks up a declared method by signature.
    #[must_use]
    pub fn method(&self, sig: &MethodSig) -> Option<&MethodDef> {
        self.methods.iter().find(|m| &m.sig() == sig)
    }

    /// Looks up a declared method by signature, mutably.
    pub fn method_mut(&mut self, sig: &MethodSig) -> Option<&mut MethodDef> {
        self.methods.iter_mut().find(|m| &m.sig() == sig)
    }

    /// Looks up a declared field by name and type.
    #[must_use]
    pub fn field(&self, name: &str, type_name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| &*f.id.name == name && &*f.id.type_name == type_name)
    }

    /// Iterates the default methods of an interface: instance methods with bodies.
    ///
    /// Yields nothing for non-interface classes.
    pub fn default_methods(&self) -> impl Iterator<Item = &MethodDef> {
        let is_interface = self.is_interface();
        self.methods.iter().filter(move |m| {
            is_interface && m.kind == MethodKind::Virtual && m.body.is_some()
        })
    }

    /// Iterates the declared constructors.
    pub fn constructors(&self) -> impl Iterator<Item = &MethodDef> {
        self.methods
            .iter()
            .filter(|m| m.kind == MethodKind::Constructor)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassDef, ClassKind, FieldDef, FieldKind, MethodBody, MethodDef, MethodKind, Visibility};
    use crate::model::{ClassId, FieldId, Instruction, MethodId, MethodSig};

    fn empty_body() -> MethodBody {
        MethodBody::new(0, 0, vec![Instruction::Return { value: None }])
    }

    #[test]
    fn test_visibility_widest() {
        assert_eq!(
            Visibility::Private.widest(Visibility::Public),
            Visibility::Public
        );
        assert_eq!(
            Visibility::Protected.widest(Visibility::Package),
            Visibility::Protected
        );
    }

    #[test]
    fn test_method_lookup_by_sig() {
        let class_id = ClassId::new("A");
        let mut class = ClassDef::new(class_id.clone(), ClassKind::Class, Visibility::Public);
        class.methods.push(MethodDef::new(
            MethodId::new(class_id.clone(), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(empty_body()),
        ));
        assert!(class.method(&MethodSig::new("m", "()V")).is_some());
        assert!(class.method(&MethodSig::new("m", "(I)V")).is_none());
    }

    #[test]
    fn test_default_methods_only_on_interfaces() {
        let id = ClassId::new("I");
        let mut iface = ClassDef::new(id.clone(), ClassKind::Interface, Visibility::Public);
        iface.methods.push(MethodDef::new(
            MethodId::new(id.clone(), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(empty_body()),
        ));
        iface.methods.push(MethodDef::new(
            MethodId::new(id.clone(), "n", "()V"),
            MethodKind::Abstract,
            Visibility::Public,
            None,
        ));
        assert_eq!(iface.default_methods().count(), 1);

        let mut class = ClassDef::new(ClassId::new("C"), ClassKind::Class, Visibility::Public);
        class.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("C"), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(empty_body()),
        ));
        assert_eq!(class.default_methods().count(), 0);
    }

    #[test]
    fn test_dispatch_participation() {
        let id = ClassId::new("A");
        let public = MethodDef::new(
            MethodId::new(id.clone(), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(empty_body()),
        );
        let private = MethodDef::new(
            MethodId::new(id.clone(), "p", "()V"),
            MethodKind::Virtual,
            Visibility::Private,
            Some(empty_body()),
        );
        let ctor = MethodDef::new(
            MethodId::new(id.clone(), "<init>", "()V"),
            MethodKind::Constructor,
            Visibility::Public,
            Some(empty_body()),
        );
        assert!(public.is_dispatched());
        assert!(!private.is_dispatched());
        assert!(!ctor.is_dispatched());
    }

    #[test]
    fn test_field_lookup() {
        let id = ClassId::new("A");
        let mut class = ClassDef::new(id.clone(), ClassKind::Class, Visibility::Public);
        class
            .fields
            .push(FieldDef::new(FieldId::new(id, "f", "I"), FieldKind::Instance, Visibility::Private));
        assert!(class.field("f", "I").is_some());
        assert!(class.field("f", "J").is_none());
    }
}
