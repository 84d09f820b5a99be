//! Vertical class merging: collapsing a subclass into its superclass.
//!
//! A superclass with exactly one live subclass can be collapsed when no live
//! code can tell the two identities apart: the superclass is never directly
//! instantiated, no live type check names either class, and no directive pins
//! or protects either side. The subclass's members move into the survivor;
//! overriding bodies win over shadowed ones, superclass constructors become
//! private direct methods, and the subclass's explicit constructor chain is
//! retargeted at them.

use std::collections::{BTreeMap, BTreeSet};

use crate::merging::{
    commit_rewritten, fresh_method_name, MergeDecline, MergePass, MergeUnit, TypeObservations,
};
use crate::model::{
    ClassDef, ClassId, ClassKind, MethodDef, MethodId, MethodKind, MethodSig, Program, Visibility,
};
use crate::Result;

/// Runs one vertical merging pass.
///
/// Candidates are processed in identity order; a class participates in at most
/// one merge per pass, and chains collapse across pipeline iterations.
///
/// # Errors
///
/// Returns an error only if the rewritten revision fails to commit.
pub fn run_vertical_pass(program: &Program) -> Result<MergePass> {
    let observations = TypeObservations::scan(program);

    let mut merged = Vec::new();
    let mut rejected = Vec::new();
    let mut class_map: BTreeMap<ClassId, ClassId> = BTreeMap::new();
    let mut method_map: BTreeMap<MethodId, MethodId> = BTreeMap::new();
    let mut touched: BTreeSet<ClassId> = BTreeSet::new();
    let mut replacements: BTreeMap<ClassId, ClassDef> = BTreeMap::new();

    for superclass in program.classes() {
        if superclass.kind != ClassKind::Class || touched.contains(&superclass.id) {
            continue;
        }
        let Some(subclass) = sole_subclass(program, &superclass.id) else {
            continue;
        };
        if touched.contains(&subclass.id) {
            continue;
        }

        match check_pair(superclass, subclass, &observations) {
            Some(reason) => {
                rejected.push((superclass.id.clone(), subclass.id.clone(), reason));
            }
            None => {
                let merged_def =
                    collapse(superclass, subclass, &mut method_map);
                class_map.insert(subclass.id.clone(), superclass.id.clone());
                touched.insert(superclass.id.clone());
                touched.insert(subclass.id.clone());
                merged.push(MergeUnit {
                    eliminated: subclass.id.clone(),
                    survivor: superclass.id.clone(),
                });
                replacements.insert(superclass.id.clone(), merged_def);
            }
        }
    }

    let program = commit_rewritten(program, &replacements, &class_map, &method_map)?;
    Ok(MergePass {
        program,
        merged,
        rejected,
        class_map,
        method_map,
    })
}

/// Returns the single live direct subclass of `id`, if there is exactly one.
fn sole_subclass<'p>(program: &'p Program, id: &ClassId) -> Option<&'p ClassDef> {
    let mut found = None;
    for class in program.classes() {
        if class.superclass.as_ref() == Some(id) && class.kind == ClassKind::Class {
            if found.is_some() {
                return None;
            }
            found = Some(class);
        }
    }
    found
}

/// Checks the safety conditions for a candidate pair; `None` means mergeable.
fn check_pair(
    superclass: &ClassDef,
    subclass: &ClassDef,
    observations: &TypeObservations,
) -> Option<MergeDecline> {
    if superclass.directives.blocks_vertical_merging()
        || subclass.directives.blocks_vertical_merging()
    {
        return Some(MergeDecline::DirectiveBlocked);
    }
    if observations.distinguishes(&superclass.id, &subclass.id) {
        return Some(MergeDecline::TypeObserved);
    }
    if observations.instantiated.contains(&superclass.id) {
        return Some(MergeDecline::SuperInstantiated);
    }

    for field in &subclass.fields {
        if superclass.field(&field.id.name, &field.id.type_name).is_some() {
            return Some(MergeDecline::MemberCollision);
        }
    }

    for method in &subclass.methods {
        let Some(shadowed) = superclass.method(&method.sig()) else {
            continue;
        };
        let overriding = method.is_dispatched() && shadowed.is_dispatched();
        if overriding {
            // The shadowed body is discarded; a directive-protected override
            // cannot be.
            if shadowed.directives.blocks_merging() {
                return Some(MergeDecline::ProtectedOverride);
            }
        } else if !(method.kind == MethodKind::Constructor
            && shadowed.kind == MethodKind::Constructor)
        {
            return Some(MergeDecline::MemberCollision);
        }
    }
    None
}

/// Builds the surviving class definition and records the method relocations.
fn collapse(
    superclass: &ClassDef,
    subclass: &ClassDef,
    method_map: &mut BTreeMap<MethodId, MethodId>,
) -> ClassDef {
    let survivor_id = superclass.id.clone();
    let mut used_names: BTreeSet<String> = superclass
        .methods
        .iter()
        .chain(subclass.methods.iter())
        .map(|m| m.id.name.to_string())
        .collect();

    let overridden: BTreeMap<MethodSig, &MethodDef> = subclass
        .methods
        .iter()
        .filter(|m| m.is_dispatched())
        .map(|m| (m.sig(), m))
        .collect();

    let mut methods: Vec<MethodDef> = Vec::with_capacity(
        superclass.methods.len() + subclass.methods.len(),
    );

    for method in &superclass.methods {
        if method.kind == MethodKind::Constructor {
            // The superclass constructor survives as a private direct method;
            // the subclass's explicit super call is retargeted at it.
            let helper_name = fresh_method_name("init$", &used_names);
            used_names.insert(helper_name.clone());
            let helper_id = MethodId::new(survivor_id.clone(), &helper_name, &*method.id.descriptor);
            method_map.insert(method.id.clone(), helper_id.clone());
            let mut helper = method.clone();
            helper.id = helper_id;
            helper.kind = MethodKind::Virtual;
            helper.visibility = Visibility::Private;
            methods.push(helper);
            continue;
        }
        if let Some(winner) = overridden.get(&method.sig()) {
            if winner.is_dispatched() && method.is_dispatched() {
                // The more-derived body wins; its definition lands when the
                // subclass methods are moved below.
                continue;
            }
        }
        methods.push(method.clone());
    }

    for method in &subclass.methods {
        let new_id = method.id.with_owner(survivor_id.clone());
        method_map.insert(method.id.clone(), new_id.clone());
        let mut moved = method.clone();
        moved.id = new_id;
        if let Some(shadowed) = superclass.method(&method.sig()) {
            if shadowed.is_dispatched() && method.is_dispatched() {
                moved.directives |= shadowed.directives;
            }
        }
        methods.push(moved);
    }

    let mut fields = superclass.fields.clone();
    for field in &subclass.fields {
        let mut moved = field.clone();
        moved.id = field.id.with_owner(survivor_id.clone());
        fields.push(moved);
    }

    let mut interfaces = superclass.interfaces.clone();
    for iface in &subclass.interfaces {
        if !interfaces.contains(iface) {
            interfaces.push(iface.clone());
        }
    }

    ClassDef {
        id: survivor_id,
        kind: superclass.kind,
        visibility: superclass.visibility.widest(subclass.visibility),
        superclass: superclass.superclass.clone(),
        interfaces,
        fields,
        methods,
        directives: superclass.directives | subclass.directives,
    }
}
