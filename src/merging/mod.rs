//! Class merging: vertical (subclass into superclass) and horizontal (sibling)
//! strategies.
//!
//! Both strategies share one correctness argument: a merge must preserve the
//! set of resolvable virtual targets for every receiver type observed anywhere
//! in the model, and must never collide field identities. Candidates that
//! cannot be proven safe from static facts alone are rejected per pair, and the
//! rejection is a recorded decision, never an error.
//!
//! A committed merge rewrites every reference to the eliminated identity,
//! unions the directive sets of combined entities, and reports its identity
//! rewrites so the pipeline can rebind references and check dispatch
//! preservation before any subsequent pass runs.

mod horizontal;
mod vertical;

use std::collections::{BTreeMap, BTreeSet};

pub use horizontal::run_horizontal_pass;
pub use vertical::run_vertical_pass;

use strum::Display;

use crate::model::{ClassDef, ClassId, Instruction, MethodId, Program, Resolution};

/// Why a merge candidate pair was rejected.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MergeDecline {
    /// One side carries a `no-merge`, `no-vertical-merge` or pinning directive.
    DirectiveBlocked,
    /// A live type observation (instance-of, checked cast or class-object read)
    /// could distinguish the two identities.
    TypeObserved,
    /// The classes declare colliding member identities.
    MemberCollision,
    /// The superclass is directly instantiated by live code, so its instances
    /// are observably distinct from the subclass's.
    SuperInstantiated,
    /// A directive-protected override would have to be discarded.
    ProtectedOverride,
}

/// One committed merge: the eliminated class and its surviving host.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MergeUnit {
    /// The identity removed from the model.
    pub eliminated: ClassId,
    /// The identity that absorbed it.
    pub survivor: ClassId,
}

/// The outcome of one merging pass.
#[derive(Clone, Debug)]
pub struct MergePass {
    /// The committed snapshot after merging.
    pub program: Program,
    /// Merges that were committed.
    pub merged: Vec<MergeUnit>,
    /// Candidate pairs that were rejected, with reasons.
    pub rejected: Vec<(ClassId, ClassId, MergeDecline)>,
    /// Eliminated class → survivor, for reference rewriting and verification.
    pub class_map: BTreeMap<ClassId, ClassId>,
    /// Relocated method identities, for reference rewriting and verification.
    pub method_map: BTreeMap<MethodId, MethodId>,
}

impl MergePass {
    /// Returns `true` if the pass committed at least one merge.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.merged.is_empty()
    }
}

/// Live type observations that gate merging.
#[derive(Clone, Debug, Default)]
pub(crate) struct TypeObservations {
    /// Classes named by a live `instanceof` or checked cast.
    pub checked: BTreeSet<ClassId>,
    /// Classes directly instantiated by live code.
    pub instantiated: BTreeSet<ClassId>,
    /// Whether any live class-object read exists. Without per-slot type
    /// inference the receiver of a class-object read cannot be attributed, so
    /// one live read conservatively blocks every merge.
    pub observes_class_objects: bool,
}

impl TypeObservations {
    /// Scans every live body once.
    pub(crate) fn scan(program: &Program) -> Self {
        let mut observations = TypeObservations::default();
        for method in program.methods() {
            let Some(body) = &method.body else { continue };
            for instr in &body.instructions {
                match instr {
                    Instruction::InstanceOf { class, .. }
                    | Instruction::CheckCast { class, .. } => {
                        observations.checked.insert(class.clone());
                    }
                    Instruction::NewInstance { class, .. } => {
                        observations.instantiated.insert(class.clone());
                    }
                    Instruction::GetClass { .. } => {
                        observations.observes_class_objects = true;
                    }
                    _ => {}
                }
            }
        }
        observations
    }

    /// Returns `true` if merging away either of the two identities could change
    /// the result of a live type observation.
    pub(crate) fn distinguishes(&self, a: &ClassId, b: &ClassId) -> bool {
        self.observes_class_objects || self.checked.contains(a) || self.checked.contains(b)
    }
}

/// Rewrites every reference in a set of class definitions through the merge
/// maps: exact method relocations first, then owner rewrites for everything
/// else (hierarchy edges, type references, field owners, resolutions).
pub(crate) fn rewrite_references(
    classes: &mut [ClassDef],
    class_map: &BTreeMap<ClassId, ClassId>,
    method_map: &BTreeMap<MethodId, MethodId>,
) {
    let class_rewrite = |id: &ClassId| class_map.get(id).cloned();
    for class in classes.iter_mut() {
        if let Some(superclass) = &class.superclass {
            if let Some(new) = class_map.get(superclass) {
                class.superclass = Some(new.clone());
            }
        }
        for iface in &mut class.interfaces {
            if let Some(new) = class_map.get(iface) {
                *iface = new.clone();
            }
        }
        for method in &mut class.methods {
            let Some(body) = &mut method.body else { continue };
            for instr in &mut body.instructions {
                if let Instruction::Invoke { method: mref, .. } = instr {
                    if let Some(new) = method_map.get(&mref.target) {
                        mref.target = new.clone();
                    }
                    if let Resolution::Internal(resolved) = &mut mref.resolution {
                        if let Some(new) = method_map.get(resolved) {
                            *resolved = new.clone();
                        }
                    }
                }
                instr.retarget_class(&class_rewrite);
            }
        }
    }
}

/// Assembles a post-merge class set from a snapshot: eliminated classes drop
/// out, survivors take their merged definitions, every reference is rewritten
/// through the merge maps, and the revision is committed.
pub(crate) fn commit_rewritten(
    program: &Program,
    replacements: &BTreeMap<ClassId, ClassDef>,
    class_map: &BTreeMap<ClassId, ClassId>,
    method_map: &BTreeMap<MethodId, MethodId>,
) -> crate::Result<Program> {
    let mut classes: Vec<ClassDef> = Vec::with_capacity(program.class_count());
    for class in program.classes() {
        if class_map.contains_key(&class.id) {
            continue; // eliminated
        }
        match replacements.get(&class.id) {
            Some(replacement) => classes.push(replacement.clone()),
            None => classes.push(class.clone()),
        }
    }
    rewrite_references(&mut classes, class_map, method_map);

    let mut builder = Program::builder();
    for external in program.externals() {
        builder.declare_external(external.clone());
    }
    for class in classes {
        builder.add_class(class);
    }
    builder.commit()
}

/// Picks a method name not yet used in the given name set, starting from a
/// stem and appending a counter as needed.
pub(crate) fn fresh_method_name(stem: &str, used: &BTreeSet<String>) -> String {
    if !used.contains(stem) {
        return stem.to_string();
    }
    let mut counter = 1usize;
    loop {
        let candidate = format!("{stem}{counter}");
        if !used.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}
