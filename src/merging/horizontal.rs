//! Horizontal class merging: combining sibling classes.
//!
//! Leaf classes under the same superclass with identical interface sets are
//! grouped; within a group the first class in identity order absorbs the
//! others, gaining a synthesized integer discriminator field so constructors
//! record which original class an instance came from. A pair merges only when
//! no live code could distinguish the siblings (no type observations) and
//! their member identities are disjoint; colliding pairs are rejected, not
//! trampolined.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    ClassDef, ClassId, ClassKind, ConstValue, FieldDef, FieldId, FieldKind, FieldRef, Instruction,
    Local, MethodId, MethodKind, Program, Resolution, Visibility,
};
use crate::merging::{
    commit_rewritten, fresh_method_name, MergeDecline, MergePass, MergeUnit, TypeObservations,
};
use crate::Result;

/// Runs one horizontal merging pass.
///
/// # Errors
///
/// Returns an error only if the rewritten revision fails to commit.
pub fn run_horizontal_pass(program: &Program) -> Result<MergePass> {
    let observations = TypeObservations::scan(program);
    let groups = sibling_groups(program);

    let mut merged = Vec::new();
    let mut rejected = Vec::new();
    let mut class_map: BTreeMap<ClassId, ClassId> = BTreeMap::new();
    let mut method_map: BTreeMap<MethodId, MethodId> = BTreeMap::new();
    let mut replacements: BTreeMap<ClassId, ClassDef> = BTreeMap::new();

    for group in groups {
        let mut members = group.into_iter();
        let Some(survivor_id) = members.next() else {
            continue;
        };
        let Some(survivor) = program.class(&survivor_id) else {
            continue;
        };

        let mut combined = survivor.clone();
        // New constructor identity → origin tag, for discriminator stores.
        let mut ctor_tags: BTreeMap<MethodId, i64> = BTreeMap::new();
        let mut next_tag = 1i64;

        for candidate_id in members {
            let Some(candidate) = program.class(&candidate_id) else {
                continue;
            };
            match check_pair(&combined, candidate, &observations) {
                Some(reason) => {
                    rejected.push((survivor_id.clone(), candidate_id.clone(), reason));
                }
                None => {
                    absorb(&mut combined, candidate, next_tag, &mut method_map, &mut ctor_tags);
                    class_map.insert(candidate_id.clone(), survivor_id.clone());
                    merged.push(MergeUnit {
                        eliminated: candidate_id,
                        survivor: survivor_id.clone(),
                    });
                    next_tag += 1;
                }
            }
        }

        if next_tag > 1 {
            install_discriminator(&mut combined, &ctor_tags);
            replacements.insert(survivor_id, combined);
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

/// Groups mergeable siblings: leaf plain classes sharing superclass and
/// interface set, in identity order.
fn sibling_groups(program: &Program) -> Vec<Vec<ClassId>> {
    let mut has_subclasses: BTreeSet<&ClassId> = BTreeSet::new();
    for class in program.classes() {
        if let Some(superclass) = &class.superclass {
            has_subclasses.insert(superclass);
        }
    }

    let mut groups: BTreeMap<(Option<ClassId>, Vec<ClassId>), Vec<ClassId>> = BTreeMap::new();
    for class in program.classes() {
        if class.kind != ClassKind::Class || has_subclasses.contains(&class.id) {
            continue;
        }
        // Only instance-carrying classes merge horizontally; the discriminator
        // scheme rides on constructors.
        if class.constructors().next().is_none() {
            continue;
        }
        let mut interfaces = class.interfaces.clone();
        interfaces.sort();
        groups
            .entry((class.superclass.clone(), interfaces))
            .or_default()
            .push(class.id.clone());
    }

    groups.into_values().filter(|group| group.len() > 1).collect()
}

/// Checks the safety conditions for absorbing `candidate` into the (already
/// partially combined) survivor; `None` means mergeable.
fn check_pair(
    combined: &ClassDef,
    candidate: &ClassDef,
    observations: &TypeObservations,
) -> Option<MergeDecline> {
    if combined.directives.blocks_merging() || candidate.directives.blocks_merging() {
        return Some(MergeDecline::DirectiveBlocked);
    }
    if observations.distinguishes(&combined.id, &candidate.id) {
        return Some(MergeDecline::TypeObserved);
    }
    for field in &candidate.fields {
        if combined.field(&field.id.name, &field.id.type_name).is_some() {
            return Some(MergeDecline::MemberCollision);
        }
    }
    for method in &candidate.methods {
        let Some(existing) = combined.method(&method.sig()) else {
            continue;
        };
        let both_constructors = method.kind == MethodKind::Constructor
            && existing.kind == MethodKind::Constructor;
        if !both_constructors {
            // No dispatch trampolines are synthesized; colliding signatures
            // reject the pair outright.
            return Some(MergeDecline::MemberCollision);
        }
    }
    None
}

/// Moves the candidate's members into the combined definition.
fn absorb(
    combined: &mut ClassDef,
    candidate: &ClassDef,
    tag: i64,
    method_map: &mut BTreeMap<MethodId, MethodId>,
    ctor_tags: &mut BTreeMap<MethodId, i64>,
) {
    let survivor_id = combined.id.clone();
    let mut used_names: BTreeSet<String> = combined
        .methods
        .iter()
        .map(|m| m.id.name.to_string())
        .collect();

    for field in &candidate.fields {
        let mut moved = field.clone();
        moved.id = field.id.with_owner(survivor_id.clone());
        combined.fields.push(moved);
    }

    for method in &candidate.methods {
        let mut moved = method.clone();
        if method.kind == MethodKind::Constructor {
            let stem = format!("<init>${tag}");
            let name = fresh_method_name(&stem, &used_names);
            used_names.insert(name.clone());
            moved.id = MethodId::new(survivor_id.clone(), &name, &*method.id.descriptor);
            ctor_tags.insert(moved.id.clone(), tag);
        } else {
            moved.id = method.id.with_owner(survivor_id.clone());
        }
        method_map.insert(method.id.clone(), moved.id.clone());
        combined.methods.push(moved);
    }

    combined.directives |= candidate.directives;
    combined.visibility = combined.visibility.widest(candidate.visibility);
}

/// Adds the discriminator field and makes every constructor store its origin
/// tag into it. Constructors not recorded in `ctor_tags` are the survivor's
/// own and store tag zero.
fn install_discriminator(combined: &mut ClassDef, ctor_tags: &BTreeMap<MethodId, i64>) {
    let used_fields: BTreeSet<&str> =
        combined.fields.iter().map(|f| &*f.id.name).collect();
    let mut name = String::from("$class");
    let mut counter = 1usize;
    while used_fields.contains(name.as_str()) {
        name = format!("$class{counter}");
        counter += 1;
    }

    let field_id = FieldId::new(combined.id.clone(), &name, "I");
    combined.fields.push(FieldDef::new(
        field_id.clone(),
        FieldKind::Instance,
        Visibility::Package,
    ));

    for method in &mut combined.methods {
        if method.kind != MethodKind::Constructor {
            continue;
        }
        let tag = ctor_tags.get(&method.id).copied().unwrap_or(0);
        let Some(body) = &mut method.body else { continue };

        let tmp = Local(body.locals);
        body.locals += 1;
        let store_at = body.instructions.len().saturating_sub(1);
        body.instructions.insert(
            store_at,
            Instruction::Const {
                dest: tmp,
                value: ConstValue::Int(tag),
            },
        );
        body.instructions.insert(
            store_at + 1,
            Instruction::PutField {
                field: FieldRef {
                    target: field_id.clone(),
                    resolution: Resolution::Internal(field_id.clone()),
                },
                object: Some(Local(0)),
                value: tmp,
            },
        );
    }
}
