//! Symbol renaming: compact names and the rename map.
//!
//! Live entities without a `no-rename` (or pinning) directive receive compact
//! generated names in deterministic identity order. Virtual methods rename as
//! override groups: declarations connected through the live hierarchy by one
//! signature move to one new name together, so dispatch keeps selecting the
//! same bodies. A group touching a kept entity or escaping into an external
//! supertype keeps its source name. Constructors always keep their names.
//!
//! The result is a total map over live entities, injective on its targets,
//! handed to the external mapping-file writer.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    ClassDef, ClassId, FieldId, FieldRef, Instruction, MethodDef, MethodId, MethodRef, MethodKind,
    Program, Resolution,
};
use crate::Result;

/// The old → new identity map produced by renaming.
///
/// Total over the live program: entities that kept their identity map to
/// themselves, so the external mapping-file writer sees every survivor.
#[derive(Clone, Debug, Default)]
pub struct RenameMap {
    /// Class renames.
    pub classes: BTreeMap<ClassId, ClassId>,
    /// Method renames.
    pub methods: BTreeMap<MethodId, MethodId>,
    /// Field renames.
    pub fields: BTreeMap<FieldId, FieldId>,
}

impl RenameMap {
    /// Returns `true` if no two distinct entities received the same new
    /// identity.
    #[must_use]
    pub fn is_injective(&self) -> bool {
        let classes: BTreeSet<&ClassId> = self.classes.values().collect();
        let methods: BTreeSet<&MethodId> = self.methods.values().collect();
        let fields: BTreeSet<&FieldId> = self.fields.values().collect();
        classes.len() == self.classes.len()
            && methods.len() == self.methods.len()
            && fields.len() == self.fields.len()
    }

    /// Total number of map entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The identity map over a program: every live entity maps to itself.
    ///
    /// Used when renaming is disabled so downstream consumers still receive a
    /// total map.
    #[must_use]
    pub fn identity(program: &Program) -> Self {
        let mut map = RenameMap::default();
        for class in program.classes() {
            map.classes.insert(class.id.clone(), class.id.clone());
            for method in &class.methods {
                map.methods.insert(method.id.clone(), method.id.clone());
            }
            for field in &class.fields {
                map.fields.insert(field.id.clone(), field.id.clone());
            }
        }
        map
    }
}

/// The outcome of the renaming pass.
#[derive(Clone, Debug)]
pub struct RenamePass {
    /// The committed snapshot under new identities.
    pub program: Program,
    /// The total, injective rename map.
    pub map: RenameMap,
}

/// Deterministic compact-name generator: `a`..`z`, `aa`, `ab`, ...
struct NameGenerator {
    next: usize,
    reserved: BTreeSet<String>,
}

impl NameGenerator {
    fn new(reserved: BTreeSet<String>) -> Self {
        NameGenerator { next: 0, reserved }
    }

    fn fresh(&mut self) -> String {
        loop {
            let name = Self::encode(self.next);
            self.next += 1;
            if !self.reserved.contains(&name) {
                self.reserved.insert(name.clone());
                return name;
            }
        }
    }

    fn encode(mut n: usize) -> String {
        let mut name = String::new();
        loop {
            name.insert(0, (b'a' + (n % 26) as u8) as char);
            n /= 26;
            if n == 0 {
                return name;
            }
            n -= 1;
        }
    }
}

/// Runs the renaming pass.
///
/// # Errors
///
/// Returns an error only if the renamed revision fails to commit.
pub fn rename(program: &Program) -> Result<RenamePass> {
    let class_names = assign_class_names(program);
    let (method_names, field_names) = assign_member_names(program);

    // Total identity maps with rewritten owners, names and descriptors.
    let rewrite_desc = |descriptor: &str| rewrite_descriptor(descriptor, &class_names);
    let mut map = RenameMap::default();
    for class in program.classes() {
        let new_owner = class_names[&class.id].clone();
        map.classes.insert(class.id.clone(), new_owner.clone());
        for method in &class.methods {
            let name = method_names
                .get(&method.id)
                .cloned()
                .unwrap_or_else(|| method.id.name.to_string());
            map.methods.insert(
                method.id.clone(),
                MethodId::new(new_owner.clone(), name, rewrite_desc(&method.id.descriptor)),
            );
        }
        for field in &class.fields {
            let name = field_names
                .get(&field.id)
                .cloned()
                .unwrap_or_else(|| field.id.name.to_string());
            map.fields.insert(
                field.id.clone(),
                FieldId::new(new_owner.clone(), name, rewrite_desc(&field.id.type_name)),
            );
        }
    }

    let program = apply(program, &map, &class_names)?;
    Ok(RenamePass { program, map })
}

/// Assigns new class names in identity order, skipping kept and external
/// names.
fn assign_class_names(program: &Program) -> BTreeMap<ClassId, ClassId> {
    let mut reserved: BTreeSet<String> = program
        .externals()
        .map(|id| id.as_str().to_string())
        .collect();
    for class in program.classes() {
        if class.directives.blocks_renaming() {
            reserved.insert(class.id.as_str().to_string());
        }
    }

    let mut generator = NameGenerator::new(reserved);
    let mut names = BTreeMap::new();
    for class in program.classes() {
        let new = if class.directives.blocks_renaming() {
            class.id.clone()
        } else {
            ClassId::new(generator.fresh())
        };
        names.insert(class.id.clone(), new);
    }
    names
}

/// Assigns new simple names for methods (per override group) and fields.
fn assign_member_names(
    program: &Program,
) -> (BTreeMap<MethodId, String>, BTreeMap<FieldId, String>) {
    // Union-find over dispatched declarations connected by override relations.
    let mut parent: BTreeMap<MethodId, MethodId> = BTreeMap::new();
    for method in program.methods() {
        parent.insert(method.id.clone(), method.id.clone());
    }

    for class in program.classes() {
        for method in &class.methods {
            if !method.is_dispatched() {
                continue;
            }
            // The nearest declaration above this one joins the same group.
            for ancestor in program.resolution_order(&class.id).into_iter().skip(1) {
                let Some(ancestor_class) = program.class(&ancestor) else {
                    continue;
                };
                if let Some(above) = ancestor_class.method(&method.sig()) {
                    if above.is_dispatched() {
                        union(&mut parent, &method.id, &above.id);
                        break;
                    }
                }
            }
        }
    }

    // A group freezes if any member is kept or its owner's hierarchy escapes
    // into the external world.
    let mut frozen: BTreeSet<MethodId> = BTreeSet::new();
    for class in program.classes() {
        let escapes = program
            .resolution_order(&class.id)
            .iter()
            .any(|entry| program.class(entry).is_none());
        for method in &class.methods {
            if !method.is_dispatched() {
                continue;
            }
            if method.directives.blocks_renaming() || escapes {
                let root = find(&mut parent, &method.id);
                frozen.insert(root);
            }
        }
    }

    let reserved: BTreeSet<String> = program
        .methods()
        .filter(|m| {
            m.directives.blocks_renaming()
                || m.kind == MethodKind::Constructor
                || frozen.contains(&find_ref(&parent, &m.id))
        })
        .map(|m| m.id.name.to_string())
        .collect();

    let mut generator = NameGenerator::new(reserved);
    let mut group_names: BTreeMap<MethodId, String> = BTreeMap::new();
    let mut method_names: BTreeMap<MethodId, String> = BTreeMap::new();

    for class in program.classes() {
        for method in &class.methods {
            if method.kind == MethodKind::Constructor || method.directives.blocks_renaming() {
                continue;
            }
            if method.is_dispatched() {
                let root = find(&mut parent, &method.id);
                if frozen.contains(&root) {
                    continue;
                }
                let name = group_names
                    .entry(root)
                    .or_insert_with(|| generator.fresh())
                    .clone();
                method_names.insert(method.id.clone(), name);
            } else {
                method_names.insert(method.id.clone(), generator.fresh());
            }
        }
    }

    let field_reserved: BTreeSet<String> = program
        .classes()
        .flat_map(|c| c.fields.iter())
        .filter(|f| f.directives.blocks_renaming())
        .map(|f| f.id.name.to_string())
        .collect();
    let mut field_generator = NameGenerator::new(field_reserved);
    let mut field_names: BTreeMap<FieldId, String> = BTreeMap::new();
    for class in program.classes() {
        for field in &class.fields {
            if field.directives.blocks_renaming() {
                continue;
            }
            field_names.insert(field.id.clone(), field_generator.fresh());
        }
    }

    (method_names, field_names)
}

fn find(parent: &mut BTreeMap<MethodId, MethodId>, id: &MethodId) -> MethodId {
    let mut current = id.clone();
    loop {
        let next = parent[&current].clone();
        if next == current {
            // Path compression for the queried entry.
            parent.insert(id.clone(), current.clone());
            return current;
        }
        current = next;
    }
}

/// Read-only find for contexts where the map cannot be borrowed mutably.
fn find_ref(parent: &BTreeMap<MethodId, MethodId>, id: &MethodId) -> MethodId {
    let mut current = id.clone();
    loop {
        let next = parent[&current].clone();
        if next == current {
            return current;
        }
        current = next;
    }
}

fn union(parent: &mut BTreeMap<MethodId, MethodId>, a: &MethodId, b: &MethodId) {
    let root_a = find(parent, a);
    let root_b = find(parent, b);
    if root_a != root_b {
        // Deterministic orientation: the smaller identity becomes the root.
        if root_a < root_b {
            parent.insert(root_b, root_a);
        } else {
            parent.insert(root_a, root_b);
        }
    }
}

/// Rewrites `L<name>;` occurrences in a descriptor through the class map.
fn rewrite_descriptor(descriptor: &str, class_names: &BTreeMap<ClassId, ClassId>) -> String {
    let mut result = descriptor.to_string();
    for (old, new) in class_names {
        if old != new {
            let from = format!("L{old};");
            let to = format!("L{new};");
            result = result.replace(&from, &to);
        }
    }
    result
}

/// Rebuilds the program under the new identities.
fn apply(
    program: &Program,
    map: &RenameMap,
    class_names: &BTreeMap<ClassId, ClassId>,
) -> Result<Program> {
    let translate_class =
        |id: &ClassId| class_names.get(id).cloned().unwrap_or_else(|| id.clone());
    let translate_method_ref = |mref: &MethodRef| -> MethodRef {
        let new_resolution = match &mref.resolution {
            Resolution::Internal(resolved) => Resolution::Internal(
                map.methods.get(resolved).cloned().unwrap_or_else(|| resolved.clone()),
            ),
            other => other.clone(),
        };
        // The written target follows its resolved declaration's new name.
        let new_target = match &mref.resolution {
            Resolution::Internal(resolved) => {
                let renamed = map.methods.get(resolved);
                MethodId::new(
                    translate_class(&mref.target.owner),
                    renamed.map_or_else(|| mref.target.name.to_string(), |r| r.name.to_string()),
                    renamed.map_or_else(
                        || rewrite_descriptor(&mref.target.descriptor, class_names),
                        |r| r.descriptor.to_string(),
                    ),
                )
            }
            _ => MethodId::new(
                translate_class(&mref.target.owner),
                &*mref.target.name,
                rewrite_descriptor(&mref.target.descriptor, class_names),
            ),
        };
        MethodRef {
            target: new_target,
            resolution: new_resolution,
        }
    };
    let translate_field_ref = |fref: &FieldRef| -> FieldRef {
        let new_resolution = match &fref.resolution {
            Resolution::Internal(resolved) => Resolution::Internal(
                map.fields.get(resolved).cloned().unwrap_or_else(|| resolved.clone()),
            ),
            other => other.clone(),
        };
        let new_target = match &fref.resolution {
            Resolution::Internal(resolved) => {
                let renamed = map.fields.get(resolved);
                FieldId::new(
                    translate_class(&fref.target.owner),
                    renamed.map_or_else(|| fref.target.name.to_string(), |r| r.name.to_string()),
                    renamed.map_or_else(
                        || rewrite_descriptor(&fref.target.type_name, class_names),
                        |r| r.type_name.to_string(),
                    ),
                )
            }
            _ => FieldId::new(
                translate_class(&fref.target.owner),
                &*fref.target.name,
                rewrite_descriptor(&fref.target.type_name, class_names),
            ),
        };
        FieldRef {
            target: new_target,
            resolution: new_resolution,
        }
    };

    let mut builder = Program::builder();
    for external in program.externals() {
        builder.declare_external(external.clone());
    }

    for class in program.classes() {
        let mut renamed = ClassDef::new(
            translate_class(&class.id),
            class.kind,
            class.visibility,
        );
        renamed.superclass = class.superclass.as_ref().map(&translate_class);
        renamed.interfaces = class.interfaces.iter().map(&translate_class).collect();
        renamed.directives = class.directives;

        for field in &class.fields {
            let mut moved = field.clone();
            moved.id = map.fields.get(&field.id).cloned().unwrap_or_else(|| field.id.clone());
            renamed.fields.push(moved);
        }

        for method in &class.methods {
            let mut moved: MethodDef = method.clone();
            moved.id = map.methods.get(&method.id).cloned().unwrap_or_else(|| method.id.clone());
            if let Some(body) = &mut moved.body {
                for instr in &mut body.instructions {
                    match instr {
                        Instruction::Invoke { method: mref, .. } => {
                            *mref = translate_method_ref(mref);
                        }
                        Instruction::GetField { field, .. }
                        | Instruction::PutField { field, .. } => {
                            *field = translate_field_ref(field);
                        }
                        Instruction::NewInstance { class, .. }
                        | Instruction::InstanceOf { class, .. }
                        | Instruction::CheckCast { class, .. } => {
                            *class = translate_class(class);
                        }
                        _ => {}
                    }
                }
            }
            renamed.methods.push(moved);
        }

        builder.add_class(renamed);
    }
    builder.commit()
}
