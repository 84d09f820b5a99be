//! The logical instruction model for method bodies.
//!
//! Bodies are linear sequences of register-style instructions referencing other
//! program entities by identity, never by raw offsets. Control flow is not modeled:
//! a well-formed body carries exactly one trailing terminator ([`Instruction::Return`]
//! or [`Instruction::Throw`]). This keeps body substitution (inlining) and reference
//! rewriting (merging, rebinding, renaming) purely structural.
//!
//! Every invoke and field access carries two targets: the *static* target as written,
//! and the *resolved* target selected by member lookup. The two diverge whenever
//! shaking or merging removes intermediate declarations; the member rebinder is the
//! pass that re-canonicalizes the resolved side.

use std::fmt;
use std::sync::Arc;

use strum::Display;

use crate::model::{ClassId, FieldId, MethodId};

/// A local variable slot within a method frame.
///
/// Parameters occupy the leading slots (slot 0 is the receiver for instance
/// methods); the remaining slots are scratch. Inlining shifts a callee's slots
/// above the caller's frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Local(pub u32);

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Debug for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A constant operand.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ConstValue {
    /// The null reference.
    Null,
    /// An integer constant (all integral widths share one representation).
    Int(i64),
    /// A string constant.
    Str(Arc<str>),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => f.write_str("null"),
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// The dispatch mode of an invoke instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InvokeKind {
    /// Virtual dispatch through a class method.
    Virtual,
    /// Virtual dispatch through an interface method.
    Interface,
    /// Static invocation, no receiver.
    Static,
    /// Direct (non-dispatched) invocation: constructors, private methods,
    /// explicit super calls.
    Direct,
}

impl InvokeKind {
    /// Returns `true` if this invoke selects its target from the runtime receiver
    /// type rather than the static reference.
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Virtual | Self::Interface)
    }

    /// Returns `true` if this invoke carries a receiver argument in slot 0.
    #[must_use]
    pub const fn has_receiver(&self) -> bool {
        !matches!(self, Self::Static)
    }
}

/// Resolution state of a reference.
///
/// `Unresolved` references have not been through the member rebinder yet.
/// `External` references point outside the closed world and are opaque to every
/// transformation: never inlined into, never merged, never renamed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Resolution<T> {
    /// Not yet resolved by the rebinder.
    Unresolved,
    /// Resolved to a declaration owned by the program.
    Internal(T),
    /// Resolved to an unknown library symbol outside the program.
    External,
}

impl<T> Resolution<T> {
    /// Returns the internal declaration, if this reference has one.
    #[must_use]
    pub fn internal(&self) -> Option<&T> {
        match self {
            Resolution::Internal(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `true` for references into the external world.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Resolution::External)
    }
}

/// A method reference: the target as written plus its resolved declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodRef {
    /// The static target, exactly as the reference was written.
    pub target: MethodId,
    /// The declaration actually selected by member lookup.
    pub resolution: Resolution<MethodId>,
}

impl MethodRef {
    /// Creates an unresolved reference to the given static target.
    #[must_use]
    pub fn new(target: MethodId) -> Self {
        MethodRef {
            target,
            resolution: Resolution::Unresolved,
        }
    }

    /// Returns the resolved declaration if present, the static target otherwise.
    #[must_use]
    pub fn effective(&self) -> &MethodId {
        self.resolution.internal().unwrap_or(&self.target)
    }
}

/// A field reference: the target as written plus its resolved declaration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldRef {
    /// The static target, exactly as the reference was written.
    pub target: FieldId,
    /// The declaration actually selected by member lookup.
    pub resolution: Resolution<FieldId>,
}

impl FieldRef {
    /// Creates an unresolved reference to the given static target.
    #[must_use]
    pub fn new(target: FieldId) -> Self {
        FieldRef {
            target,
            resolution: Resolution::Unresolved,
        }
    }

    /// Returns the resolved declaration if present, the static target otherwise.
    #[must_use]
    pub fn effective(&self) -> &FieldId {
        self.resolution.internal().unwrap_or(&self.target)
    }
}

/// A single logical instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    /// Load a constant into a local.
    Const {
        /// Destination slot.
        dest: Local,
        /// The constant value.
        value: ConstValue,
    },
    /// Copy one local into another.
    Move {
        /// Destination slot.
        dest: Local,
        /// Source slot.
        src: Local,
    },
    /// Allocate a new instance of a class (constructor invoked separately).
    NewInstance {
        /// Destination slot for the fresh reference.
        dest: Local,
        /// The instantiated class.
        class: ClassId,
    },
    /// Invoke a method.
    Invoke {
        /// Dispatch mode.
        kind: InvokeKind,
        /// The invoked method.
        method: MethodRef,
        /// Argument slots, receiver first for instance invokes.
        args: Vec<Local>,
        /// Destination slot for the return value, absent for `void` targets.
        dest: Option<Local>,
    },
    /// Read a field.
    GetField {
        /// The accessed field.
        field: FieldRef,
        /// Receiver slot; absent for static fields.
        object: Option<Local>,
        /// Destination slot.
        dest: Local,
    },
    /// Write a field.
    PutField {
        /// The accessed field.
        field: FieldRef,
        /// Receiver slot; absent for static fields.
        object: Option<Local>,
        /// Source slot for the stored value.
        value: Local,
    },
    /// Runtime type test.
    InstanceOf {
        /// Destination slot for the boolean result.
        dest: Local,
        /// Tested reference.
        object: Local,
        /// Tested-against class.
        class: ClassId,
    },
    /// Runtime checked cast.
    CheckCast {
        /// Cast reference.
        object: Local,
        /// Target class.
        class: ClassId,
    },
    /// Observe the runtime class of a reference.
    GetClass {
        /// Destination slot for the class value.
        dest: Local,
        /// Observed reference.
        object: Local,
    },
    /// Explicit null check, synthesized by the inliner to preserve the receiver
    /// null-check timing of an eliminated instance call.
    NullCheck {
        /// Checked reference.
        object: Local,
    },
    /// Return from the method. Terminator.
    Return {
        /// Returned slot, absent for `void` methods.
        value: Option<Local>,
    },
    /// Throw the given reference. Terminator.
    Throw {
        /// Thrown reference.
        exception: Local,
    },
}

impl Instruction {
    /// Returns `true` if this instruction ends a body.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(self, Instruction::Return { .. } | Instruction::Throw { .. })
    }

    /// Returns the class identity this instruction references at type level, if any.
    #[must_use]
    pub fn class_reference(&self) -> Option<&ClassId> {
        match self {
            Instruction::NewInstance { class, .. }
            | Instruction::InstanceOf { class, .. }
            | Instruction::CheckCast { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Returns the method reference of an invoke, if this is one.
    #[must_use]
    pub fn method_ref(&self) -> Option<&MethodRef> {
        match self {
            Instruction::Invoke { method, .. } => Some(method),
            _ => None,
        }
    }

    /// Returns the field reference of a field access, if this is one.
    #[must_use]
    pub fn field_ref(&self) -> Option<&FieldRef> {
        match self {
            Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
                Some(field)
            }
            _ => None,
        }
    }

    /// Rewrites every local slot through the given mapping.
    pub fn remap_locals(&mut self, mut map: impl FnMut(Local) -> Local) {
        match self {
            Instruction::Const { dest, .. } => *dest = map(*dest),
            Instruction::Move { dest, src } => {
                *dest = map(*dest);
                *src = map(*src);
            }
            Instruction::NewInstance { dest, .. } => *dest = map(*dest),
            Instruction::Invoke { args, dest, .. } => {
                for arg in args.iter_mut() {
                    *arg = map(*arg);
                }
                if let Some(d) = dest {
                    *d = map(*d);
                }
            }
            Instruction::GetField { object, dest, .. } => {
                if let Some(o) = object {
                    *o = map(*o);
                }
                *dest = map(*dest);
            }
            Instruction::PutField { object, value, .. } => {
                if let Some(o) = object {
                    *o = map(*o);
                }
                *value = map(*value);
            }
            Instruction::InstanceOf { dest, object, .. } => {
                *dest = map(*dest);
                *object = map(*object);
            }
            Instruction::CheckCast { object, .. } => *object = map(*object),
            Instruction::GetClass { dest, object } => {
                *dest = map(*dest);
                *object = map(*object);
            }
            Instruction::NullCheck { object } => *object = map(*object),
            Instruction::Return { value } => {
                if let Some(v) = value {
                    *v = map(*v);
                }
            }
            Instruction::Throw { exception } => *exception = map(*exception),
        }
    }

    /// Rewrites every class identity occurring in this instruction, including the
    /// owners inside method and field references.
    pub fn retarget_class(&mut self, rewrite: &impl Fn(&ClassId) -> Option<ClassId>) {
        let remap_class = |class: &mut ClassId| {
            if let Some(new) = rewrite(class) {
                *class = new;
            }
        };
        match self {
            Instruction::NewInstance { class, .. }
            | Instruction::InstanceOf { class, .. }
            | Instruction::CheckCast { class, .. } => remap_class(class),
            Instruction::Invoke { method, .. } => {
                if let Some(new) = rewrite(&method.target.owner) {
                    method.target = method.target.with_owner(new);
                }
                if let Resolution::Internal(resolved) = &mut method.resolution {
                    if let Some(new) = rewrite(&resolved.owner) {
                        *resolved = resolved.with_owner(new);
                    }
                }
            }
            Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
                if let Some(new) = rewrite(&field.target.owner) {
                    field.target = field.target.with_owner(new);
                }
                if let Resolution::Internal(resolved) = &mut field.resolution {
                    if let Some(new) = rewrite(&resolved.owner) {
                        *resolved = resolved.with_owner(new);
                    }
                }
            }
            _ => {}
        }
    }
}
