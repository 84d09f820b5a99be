//! The owning program container and its commit-time validation.
//!
//! A [`Program`] is the sole owner of all class definitions. It is immutable once
//! committed: passes obtain a [`ProgramBuilder`] snapshot, edit it, and commit a
//! fresh `Program`. Committing enforces the global invariants every pass relies
//! on: unique identities, an acyclic hierarchy, closed-world references (every
//! referenced class is defined or explicitly external) and well-formed linear
//! bodies. A pass therefore either produces a sound snapshot or fails loudly.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::model::{
    ClassDef, ClassId, FieldDef, FieldId, Instruction, MethodDef, MethodId, MethodSig, Resolution,
};
use crate::{Error, Result};

/// An immutable, committed program snapshot.
///
/// Classes are keyed by identity in sorted order; every iteration over the
/// container is deterministic.
#[derive(Clone, Debug)]
pub struct Program {
    classes: BTreeMap<ClassId, Arc<ClassDef>>,
    externals: BTreeSet<ClassId>,
}

impl Program {
    /// Creates an empty builder.
    #[must_use]
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder {
            classes: BTreeMap::new(),
            externals: BTreeSet::new(),
            duplicates: Vec::new(),
        }
    }

    /// Clones this snapshot into a builder for the next revision.
    #[must_use]
    pub fn to_builder(&self) -> ProgramBuilder {
        ProgramBuilder {
            classes: self
                .classes
                .iter()
                .map(|(id, def)| (id.clone(), (**def).clone()))
                .collect(),
            externals: self.externals.clone(),
            duplicates: Vec::new(),
        }
    }

    /// Looks up a class definition by identity.
    #[must_use]
    pub fn class(&self, id: &ClassId) -> Option<&ClassDef> {
        self.classes.get(id).map(|def| &**def)
    }

    /// Iterates all class definitions in identity order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.classes.values().map(|def| &**def)
    }

    /// Returns all class identities in sorted order.
    #[must_use]
    pub fn class_ids(&self) -> Vec<ClassId> {
        self.classes.keys().cloned().collect()
    }

    /// Returns the number of class definitions.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the identity is declared external (outside the closed
    /// world).
    #[must_use]
    pub fn is_external(&self, id: &ClassId) -> bool {
        self.externals.contains(id)
    }

    /// Returns the declared external class identities in sorted order.
    pub fn externals(&self) -> impl Iterator<Item = &ClassId> {
        self.externals.iter()
    }

    /// Looks up an exact method declaration.
    #[must_use]
    pub fn method(&self, id: &MethodId) -> Option<&MethodDef> {
        self.class(&id.owner)?.method(&id.sig())
    }

    /// Looks up an exact field declaration.
    #[must_use]
    pub fn field(&self, id: &FieldId) -> Option<&FieldDef> {
        self.class(&id.owner)?.field(&id.name, &id.type_name)
    }

    /// Iterates all method definitions in (class, declaration) order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.classes().flat_map(|class| class.methods.iter())
    }

    /// Returns the superclass chain starting at (and including) `id`.
    ///
    /// Stops at hierarchy roots and external supertypes; cycle-safe.
    #[must_use]
    pub fn superclass_chain(&self, id: &ClassId) -> Vec<ClassId> {
        let mut chain = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = Some(id.clone());
        while let Some(class_id) = current {
            if !seen.insert(class_id.clone()) {
                break;
            }
            current = self.class(&class_id).and_then(|c| c.superclass.clone());
            chain.push(class_id);
        }
        chain
    }

    /// Returns the deterministic member-resolution order for a class: the direct
    /// superclass chain first, then interfaces in declaration order, depth-first.
    #[must_use]
    pub fn resolution_order(&self, id: &ClassId) -> Vec<ClassId> {
        let chain = self.superclass_chain(id);
        let mut order = chain.clone();
        let mut seen: BTreeSet<ClassId> = chain.iter().cloned().collect();
        for class_id in &chain {
            if let Some(class) = self.class(class_id) {
                for iface in &class.interfaces {
                    self.push_interfaces(iface, &mut order, &mut seen);
                }
            }
        }
        order
    }

    fn push_interfaces(&self, id: &ClassId, order: &mut Vec<ClassId>, seen: &mut BTreeSet<ClassId>) {
        if !seen.insert(id.clone()) {
            return;
        }
        order.push(id.clone());
        if let Some(class) = self.class(id) {
            for iface in &class.interfaces {
                self.push_interfaces(iface, order, seen);
            }
        }
    }

    /// Resolves a method signature from a starting class under the standard
    /// lookup rules.
    ///
    /// Walks the resolution order and returns the first declaring class's
    /// declaration. A walk that escapes the model through an external class
    /// resolves [`Resolution::External`]; a walk that exhausts the model without
    /// a declaration is [`Resolution::Unresolved`].
    #[must_use]
    pub fn lookup_method(&self, from: &ClassId, sig: &MethodSig) -> Resolution<MethodId> {
        let mut crossed_external = false;
        for class_id in self.resolution_order(from) {
            match self.class(&class_id) {
                Some(class) => {
                    if class.method(sig).is_some() {
                        return Resolution::Internal(MethodId::new(
                            class_id,
                            sig.name.clone(),
                            sig.descriptor.clone(),
                        ));
                    }
                }
                None => crossed_external = true,
            }
        }
        if crossed_external || self.class(from).is_none() {
            Resolution::External
        } else {
            Resolution::Unresolved
        }
    }

    /// Resolves a field reference from a starting class under the standard
    /// lookup rules.
    #[must_use]
    pub fn lookup_field(&self, from: &ClassId, name: &str, type_name: &str) -> Resolution<FieldId> {
        let mut crossed_external = false;
        for class_id in self.resolution_order(from) {
            match self.class(&class_id) {
                Some(class) => {
                    if class.field(name, type_name).is_some() {
                        return Resolution::Internal(FieldId::new(class_id, name, type_name));
                    }
                }
                None => crossed_external = true,
            }
        }
        if crossed_external || self.class(from).is_none() {
            Resolution::External
        } else {
            Resolution::Unresolved
        }
    }

    /// Builds the subtype map: superclass → direct subclasses, interface →
    /// direct implementors and subinterfaces.
    #[must_use]
    pub fn subtype_map(&self) -> BTreeMap<ClassId, Vec<ClassId>> {
        let mut map: BTreeMap<ClassId, Vec<ClassId>> = BTreeMap::new();
        for class in self.classes() {
            if let Some(superclass) = &class.superclass {
                map.entry(superclass.clone()).or_default().push(class.id.clone());
            }
            for iface in &class.interfaces {
                map.entry(iface.clone()).or_default().push(class.id.clone());
            }
        }
        map
    }

    /// Returns `id` plus all transitive subtypes present in the model.
    #[must_use]
    pub fn self_and_subtypes(&self, id: &ClassId) -> Vec<ClassId> {
        let map = self.subtype_map();
        let mut result = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(subtypes) = map.get(&current) {
                queue.extend(subtypes.iter().cloned());
            }
            result.push(current);
        }
        result
    }

    /// Returns `true` if `candidate` is `ancestor` or a transitive subtype of it.
    #[must_use]
    pub fn is_subtype(&self, candidate: &ClassId, ancestor: &ClassId) -> bool {
        if candidate == ancestor {
            return true;
        }
        self.resolution_order(candidate).contains(ancestor)
    }
}

/// A mutable program revision under construction.
///
/// The builder performs no validation itself; [`ProgramBuilder::commit`] runs the
/// full invariant suite and either yields a sound [`Program`] or an error.
#[derive(Debug)]
pub struct ProgramBuilder {
    classes: BTreeMap<ClassId, ClassDef>,
    externals: BTreeSet<ClassId>,
    duplicates: Vec<ClassId>,
}

impl ProgramBuilder {
    /// Adds a class definition to the revision.
    pub fn add_class(&mut self, class: ClassDef) -> &mut Self {
        let id = class.id.clone();
        if self.classes.insert(id.clone(), class).is_some() {
            self.duplicates.push(id);
        }
        self
    }

    /// Declares a class identity as external: a known library symbol outside the
    /// closed world, live and opaque to every transformation.
    pub fn declare_external(&mut self, id: ClassId) -> &mut Self {
        self.externals.insert(id);
        self
    }

    /// Returns `true` if the revision defines the class.
    #[must_use]
    pub fn contains_class(&self, id: &ClassId) -> bool {
        self.classes.contains_key(id)
    }

    /// Returns a mutable reference to a class under construction.
    pub fn class_mut(&mut self, id: &ClassId) -> Option<&mut ClassDef> {
        self.classes.get_mut(id)
    }

    /// Removes a class from the revision, returning its definition.
    pub fn remove_class(&mut self, id: &ClassId) -> Option<ClassDef> {
        self.classes.remove(id)
    }

    /// Returns all class identities currently in the revision, sorted.
    #[must_use]
    pub fn class_ids(&self) -> Vec<ClassId> {
        self.classes.keys().cloned().collect()
    }

    /// Validates the revision and commits it as an immutable snapshot.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateClass`] if two definitions shared one identity
    /// - [`Error::CyclicHierarchy`] if the supertype/implements graph has a cycle
    /// - [`Error::UnknownReference`] if a reference names a class that is neither
    ///   defined nor declared external
    /// - [`Error::BrokenReference`] if a resolved reference points at a
    ///   declaration that does not exist (an upstream pass defect)
    /// - [`Error::MalformedBody`] if a body violates the linear-body rules
    pub fn commit(self) -> Result<Program> {
        if let Some(id) = self.duplicates.first() {
            return Err(Error::DuplicateClass(id.clone()));
        }

        let program = Program {
            classes: self
                .classes
                .into_iter()
                .map(|(id, def)| (id, Arc::new(def)))
                .collect(),
            externals: self.externals,
        };

        program.check_acyclic()?;
        program.check_references()?;
        program.check_bodies()?;
        Ok(program)
    }
}

impl Program {
    /// Verifies the supertype/implements graph is acyclic.
    fn check_acyclic(&self) -> Result<()> {
        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state: BTreeMap<&ClassId, u8> = BTreeMap::new();
        for id in self.classes.keys() {
            self.visit_acyclic(id, &mut state)?;
        }
        Ok(())
    }

    fn visit_acyclic<'a>(&'a self, id: &'a ClassId, state: &mut BTreeMap<&'a ClassId, u8>) -> Result<()> {
        match state.get(id) {
            Some(1) => return Err(Error::CyclicHierarchy(id.clone())),
            Some(2) => return Ok(()),
            _ => {}
        }
        let Some(class) = self.classes.get(id) else {
            return Ok(()); // external edge, nothing to follow
        };
        state.insert(id, 1);
        if let Some(superclass) = &class.superclass {
            self.visit_acyclic(superclass, state)?;
        }
        for iface in &class.interfaces {
            self.visit_acyclic(iface, state)?;
        }
        state.insert(id, 2);
        Ok(())
    }

    /// Verifies the closed world: every referenced class is defined or external,
    /// and every resolved reference points at a real declaration.
    fn check_references(&self) -> Result<()> {
        let known = |id: &ClassId| self.classes.contains_key(id) || self.externals.contains(id);

        for class in self.classes() {
            if let Some(superclass) = &class.superclass {
                if !known(superclass) {
                    return Err(Error::UnknownReference(format!(
                        "superclass {superclass} of {}",
                        class.id
                    )));
                }
            }
            for iface in &class.interfaces {
                if !known(iface) {
                    return Err(Error::UnknownReference(format!(
                        "interface {iface} of {}",
                        class.id
                    )));
                }
            }
            for method in &class.methods {
                let Some(body) = &method.body else { continue };
                for instr in &body.instructions {
                    if let Some(class_ref) = instr.class_reference() {
                        if !known(class_ref) {
                            return Err(Error::UnknownReference(format!(
                                "type reference {class_ref} in {}",
                                method.id
                            )));
                        }
                    }
                    if let Some(method_ref) = instr.method_ref() {
                        if !known(&method_ref.target.owner) {
                            return Err(Error::UnknownReference(format!(
                                "invoke target {} in {}",
                                method_ref.target, method.id
                            )));
                        }
                        if let Resolution::Internal(resolved) = &method_ref.resolution {
                            if self.method(resolved).is_none() {
                                return Err(broken!(
                                    "resolved invoke target {resolved} in {} has no declaration",
                                    method.id
                                ));
                            }
                        }
                    }
                    if let Some(field_ref) = instr.field_ref() {
                        if !known(&field_ref.target.owner) {
                            return Err(Error::UnknownReference(format!(
                                "field target {} in {}",
                                field_ref.target, method.id
                            )));
                        }
                        if let Resolution::Internal(resolved) = &field_ref.resolution {
                            if self.field(resolved).is_none() {
                                return Err(broken!(
                                    "resolved field target {resolved} in {} has no declaration",
                                    method.id
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Verifies the linear-body rules for every method that carries a body.
    fn check_bodies(&self) -> Result<()> {
        for class in self.classes() {
            for method in &class.methods {
                let Some(body) = &method.body else { continue };
                let malformed = |message: String| Error::MalformedBody {
                    method: method.id.clone(),
                    message,
                };

                if body.params > body.locals {
                    return Err(malformed(format!(
                        "{} parameter slots exceed frame size {}",
                        body.params, body.locals
                    )));
                }
                match body.instructions.last() {
                    Some(last) if last.is_terminator() => {}
                    _ => return Err(malformed("body does not end in a terminator".into())),
                }
                for (index, instr) in body.instructions.iter().enumerate() {
                    if instr.is_terminator() && index + 1 != body.instructions.len() {
                        return Err(malformed(format!(
                            "terminator at index {index} is not the final instruction"
                        )));
                    }
                    let mut out_of_range = None;
                    instr.remap_locals_check(body.locals, &mut out_of_range);
                    if let Some(slot) = out_of_range {
                        return Err(malformed(format!(
                            "instruction {index} uses slot v{slot} outside frame of {}",
                            body.locals
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Instruction {
    /// Records the first local slot at or above `frame`, if any.
    fn remap_locals_check(&self, frame: u32, out_of_range: &mut Option<u32>) {
        let mut probe = self.clone();
        probe.remap_locals(|local| {
            if local.0 >= frame && out_of_range.is_none() {
                *out_of_range = Some(local.0);
            }
            local
        });
    }
}
