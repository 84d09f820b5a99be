//! Dispatch snapshots: the semantic-preservation oracle.
//!
//! Deep inheritance and virtual dispatch are represented as an explicit
//! resolved-target set per receiver type at each call site, so dispatch-safety
//! reasoning becomes a set comparison that needs no execution. A pass captures a
//! snapshot before and after transforming, supplies the identity rewrites it
//! performed, and [`verify_preserved`] checks that no call site gained or lost a
//! possible target. A mismatch is an unsound transformation and aborts the
//! pipeline.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ClassId, Instruction, MethodId, MethodSig, Program};
use crate::Result;

/// The set of declarations a dispatched call site can select from.
pub type DispatchTargets = BTreeSet<MethodId>;

/// Resolved-target sets for every dispatched call site in a program, keyed by
/// the site's static receiver type and invoked signature.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    sites: BTreeMap<(ClassId, MethodSig), DispatchTargets>,
}

impl DispatchSnapshot {
    /// Captures the snapshot of a committed program.
    ///
    /// Only call sites whose static receiver type is inside the model are
    /// recorded; dispatch through external receivers is opaque by definition.
    #[must_use]
    pub fn capture(program: &Program) -> Self {
        let mut sites = BTreeMap::new();
        for method in program.methods() {
            let Some(body) = &method.body else { continue };
            for instr in &body.instructions {
                let Instruction::Invoke { kind, method: mref, .. } = instr else {
                    continue;
                };
                if !kind.is_dispatched() {
                    continue;
                }
                let receiver = mref.target.owner.clone();
                if program.class(&receiver).is_none() {
                    continue;
                }
                let sig = mref.target.sig();
                sites
                    .entry((receiver.clone(), sig.clone()))
                    .or_insert_with(|| dispatch_targets(program, &receiver, &sig));
            }
        }
        DispatchSnapshot { sites }
    }

    /// Returns the recorded target set for a call-site key.
    #[must_use]
    pub fn targets(&self, receiver: &ClassId, sig: &MethodSig) -> Option<&DispatchTargets> {
        self.sites.get(&(receiver.clone(), sig.clone()))
    }

    /// Returns the number of recorded call-site keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Returns `true` if no dispatched call site was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Computes the resolvable virtual targets for receivers of a static type.
///
/// Walks the receiver type and every transitive subtype in the model and
/// resolves the signature from each non-interface subtype under standard lookup,
/// collecting the distinct declarations that dispatch could select.
#[must_use]
pub fn dispatch_targets(program: &Program, receiver: &ClassId, sig: &MethodSig) -> DispatchTargets {
    let mut targets = BTreeSet::new();
    for subtype in program.self_and_subtypes(receiver) {
        let Some(class) = program.class(&subtype) else {
            continue;
        };
        if class.is_interface() && &subtype != receiver {
            // Instances are never exactly of an interface type; subinterfaces
            // contribute through their implementors.
            continue;
        }
        if let Some(resolved) = program.lookup_method(&subtype, sig).internal() {
            if program.method(resolved).is_some_and(super::MethodDef::is_dispatched) {
                targets.insert(resolved.clone());
            }
        }
    }
    targets
}

/// Verifies that a transformation preserved every call site's target set.
///
/// `class_map` and `method_map` are the identity rewrites the pass performed
/// (merged classes, relocated methods). The pre-transformation snapshot is
/// translated through them and compared against the post-transformation
/// snapshot. Call-site keys that vanished entirely (the invoke was inlined away
/// or became dead) are skipped: the invariant is restricted to call sites that
/// still exist.
///
/// # Errors
///
/// Returns [`Error::BrokenReference`](crate::Error::BrokenReference) naming the
/// first diverging call site.
pub fn verify_preserved(
    before: &DispatchSnapshot,
    after: &DispatchSnapshot,
    class_map: &BTreeMap<ClassId, ClassId>,
    method_map: &BTreeMap<MethodId, MethodId>,
) -> Result<()> {
    let translate_class =
        |id: &ClassId| -> ClassId { class_map.get(id).cloned().unwrap_or_else(|| id.clone()) };
    let translate_method = |id: &MethodId| -> MethodId {
        method_map.get(id).cloned().unwrap_or_else(|| {
            let owner = translate_class(&id.owner);
            id.with_owner(owner)
        })
    };

    for ((receiver, sig), targets) in &before.sites {
        let key = (translate_class(receiver), sig.clone());
        let Some(after_targets) = after.sites.get(&key) else {
            continue;
        };
        let translated: DispatchTargets = targets.iter().map(translate_method).collect();
        if &translated != after_targets {
            return Err(broken!(
                "dispatch for {}.{} changed: {:?} -> {:?}",
                key.0,
                sig,
                translated,
                after_targets
            ));
        }
    }
    Ok(())
}
