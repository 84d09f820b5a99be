//! # classforge Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! from the classforge library. Import this module to get quick access to the
//! essential types for building, shrinking and rewriting class programs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all classforge operations
pub use crate::Error;

/// The result type used throughout classforge
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Entity identities
pub use crate::model::{ClassId, FieldId, ItemId, MethodId, MethodSig};

/// Class, member and body definitions
pub use crate::model::{
    ClassDef, ClassKind, FieldDef, FieldKind, MethodBody, MethodDef, MethodKind, Visibility,
};

/// The logical instruction set
pub use crate::model::{ConstValue, FieldRef, Instruction, InvokeKind, Local, MethodRef, Resolution};

/// The owning program container
pub use crate::model::{Program, ProgramBuilder};

// ================================================================================================
// Directives
// ================================================================================================

/// External preservation directives
pub use crate::directives::{Constraint, Directive, DirectiveAction, DirectiveSet};

// ================================================================================================
// Pipeline
// ================================================================================================

/// The pipeline driver and its configuration
pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineResult};

/// Inliner code-size limits
pub use crate::inlining::InlineBudget;

/// Non-fatal pass decision log
pub use crate::pipeline::{Event, EventKind, EventLog};

/// Rename map handed to the mapping-file writer
pub use crate::naming::RenameMap;

/// Removal report handed to the reporting collaborator
pub use crate::reachability::RemovalReport;
