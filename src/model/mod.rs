//! The program model: classes, members, bodies, references and the owning
//! container.
//!
//! Everything downstream of the parser collaborator lives in terms of this
//! model. Entities are addressed by value identities ([`ClassId`], [`MethodId`],
//! [`FieldId`]), bodies are linear logical instruction sequences, and the
//! [`Program`] container owns every definition, validating the global invariants
//! on each committed revision. Auxiliary relations (rename maps, merge origins,
//! live sets) are side tables keyed by identity, never structural back-pointers,
//! so the model stays a simple owned tree.

mod class;
mod descriptor;
mod dispatch;
mod identity;
mod instruction;
mod program;

pub use class::{ClassDef, ClassKind, FieldDef, FieldKind, MethodBody, MethodDef, MethodKind, Visibility};
pub use descriptor::{param_count, prepend_receiver, returns_value};
pub use dispatch::{dispatch_targets, verify_preserved, DispatchSnapshot, DispatchTargets};
pub use identity::{ClassId, FieldId, ItemId, MethodId, MethodSig};
pub use instruction::{
    ConstValue, FieldRef, Instruction, InvokeKind, Local, MethodRef, Resolution,
};
pub use program::{Program, ProgramBuilder};
