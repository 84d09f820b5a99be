// Copyright 2026 The classforge contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # classforge
//!
//! A closed-world class-program shrinker and optimizer. Given a fixed,
//! non-extensible set of compiled classes plus a set of external preservation
//! directives, `classforge` computes the minimal reachable subset of the
//! program and rewrites what remains — inlining call sites, merging class
//! hierarchies, rebinding member references, renaming symbols and desugaring
//! interface default methods — while guaranteeing the rewritten program is
//! behaviorally equivalent to the original for all reachable executions.
//!
//! ## Architecture
//!
//! - [`model`] - The program model: identities, classes, members, logical
//!   instruction bodies, and the owning [`model::Program`] container that
//!   validates global invariants on every committed snapshot
//! - [`directives`] - Preservation directives and their resolution onto
//!   program entities
//! - [`reachability`] - The closed-world reachability fixed point (tree
//!   shaking) with its removal report
//! - [`rebinding`] - Member rebinding: canonicalizing every reference's
//!   resolved target under standard lookup rules
//! - [`inlining`] - Budget- and safety-constrained call-site inlining
//! - [`merging`] - Vertical and horizontal class merging with
//!   dispatch-preserving rewriting
//! - [`desugar`] - Interface default- and static-method desugaring via
//!   synthesized companion classes
//! - [`naming`] - Compact symbol renaming and the rename map
//! - [`emulation`] - A deterministic execution simulator used as the
//!   behavior-preservation oracle in tests
//! - [`pipeline`] - The driver iterating the rewrite triad to a fixed point
//!
//! ## Quick Start
//!
//! Programs enter through the builder API (normally fed by an external
//! bytecode-parsing collaborator) and leave as a transformed snapshot plus a
//! rename map and removal report:
//!
//! ```rust
//! use classforge::directives::{Constraint, Directive};
//! use classforge::model::{
//!     ClassDef, ClassId, ClassKind, Instruction, MethodBody, MethodDef, MethodId, MethodKind,
//!     Program, Visibility,
//! };
//! use classforge::pipeline::Pipeline;
//!
//! let mut builder = Program::builder();
//! let main_id = ClassId::new("app/Main");
//! let mut main = ClassDef::new(main_id.clone(), ClassKind::Class, Visibility::Public);
//! main.methods.push(MethodDef::new(
//!     MethodId::new(main_id, "entry", "()V"),
//!     MethodKind::Static,
//!     Visibility::Public,
//!     Some(MethodBody::new(0, 0, vec![Instruction::Return { value: None }])),
//! ));
//! builder.add_class(main);
//! let program = builder.commit()?;
//!
//! let roots = [Directive::forbid(
//!     MethodId::new(ClassId::new("app/Main"), "entry", "()V"),
//!     Constraint::Root,
//! )];
//! let result = Pipeline::default().run(&program, &roots)?;
//! assert!(result.rename_map.is_injective());
//! # Ok::<(), classforge::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Fatal conditions
//! (unknown directive targets, broken references after a transformation,
//! unresolved default-method diamonds) abort the pipeline with no transformed
//! output. Per-candidate pass decisions — a call site that is not inlined, a
//! class pair that is not merged — are recorded values in the
//! [`pipeline::EventLog`], never errors.

#[macro_use]
pub(crate) mod error;

/// Preservation directives and their resolution onto program entities.
pub mod directives;

/// Interface default- and static-method desugaring.
pub mod desugar;

/// Deterministic execution simulation over the logical instruction model.
pub mod emulation;

/// Call-site inlining.
pub mod inlining;

/// Vertical and horizontal class merging.
pub mod merging;

/// The program model and its owning container.
pub mod model;

/// Symbol renaming and the rename map.
pub mod naming;

/// The transformation pipeline driver.
pub mod pipeline;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Closed-world reachability analysis (tree shaking).
pub mod reachability;

/// Member rebinding.
pub mod rebinding;

/// `classforge` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. Used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `classforge` Error type
///
/// The main error type for all operations in this crate. Fatal pipeline
/// conditions only; pass-through decisions are values, not errors.
pub use error::Error;
