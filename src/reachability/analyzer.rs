//! The closed-world reachability fixed point.
//!
//! A worklist traversal over entity identities. Seeds are the directive roots
//! (explicit roots and pinned entities); each popped entity contributes the
//! references it makes, including virtual dispatch targets on all *currently
//! live* subtypes of each call site's static receiver type. Dispatched call
//! sites are re-examined whenever a new receiver subtype becomes live, so the
//! traversal converges to the same fixed point regardless of discovery order.
//!
//! Reference enumeration per method is read-only and embarrassingly parallel;
//! each round fans out over the newly live methods with rayon and merges the
//! results through an identity-ordered map, so the committed result is
//! deterministic no matter how the workers interleave.

use std::collections::{BTreeSet, VecDeque};

use crossbeam_skiplist::SkipMap;
use rayon::prelude::*;

use crate::model::{
    ClassId, Instruction, InvokeKind, ItemId, MethodDef, MethodId, MethodSig, Program,
};
use crate::reachability::{LiveSet, RemovalReport, ShakeOutcome};
use crate::Result;

/// One reference contributed by a live entity.
#[derive(Clone, Debug)]
enum Edge {
    /// A class must be live (type reference, owner of a used member).
    Type(ClassId),
    /// A resolved method declaration must be live.
    Method(MethodId),
    /// A resolved field declaration must be live.
    Field(FieldEdge),
    /// A dispatched call site: static receiver type plus invoked signature.
    VirtualSite(ClassId, MethodSig),
}

type FieldEdge = crate::model::FieldId;

/// Computes the live subset of a program and prunes everything else.
///
/// Directive-pinned entities are always live even if unreferenced. External
/// targets are treated as live and opaque. Re-running the shake on its own
/// output is a no-op.
///
/// # Errors
///
/// Returns an error only if the pruned revision fails to commit, which would
/// indicate a defect in the analyzer itself.
pub fn shake(program: &Program) -> Result<ShakeOutcome> {
    let mut analyzer = Analyzer::new(program);
    analyzer.seed();
    analyzer.run();
    analyzer.finish()
}

struct Analyzer<'p> {
    program: &'p Program,
    live: LiveSet,
    /// Recorded dispatched call sites, re-examined as receivers appear.
    virtual_sites: BTreeSet<(ClassId, MethodSig)>,
    queue: VecDeque<ItemId>,
}

impl<'p> Analyzer<'p> {
    fn new(program: &'p Program) -> Self {
        Analyzer {
            program,
            live: LiveSet::default(),
            virtual_sites: BTreeSet::new(),
            queue: VecDeque::new(),
        }
    }

    /// Seeds the worklist with every directive root and pinned entity.
    fn seed(&mut self) {
        for class in self.program.classes() {
            if class.directives.is_reachability_seed() {
                self.queue.push_back(ItemId::Class(class.id.clone()));
            }
            for method in &class.methods {
                if method.directives.is_reachability_seed() {
                    self.queue.push_back(ItemId::Method(method.id.clone()));
                }
            }
            for field in &class.fields {
                if field.directives.is_reachability_seed() {
                    self.queue.push_back(ItemId::Field(field.id.clone()));
                }
            }
        }
    }

    /// Runs rounds until the fixed point: drain the frontier, enumerate the new
    /// methods' references in parallel, apply the edges in identity order.
    fn run(&mut self) {
        while !self.queue.is_empty() {
            let mut frontier: Vec<ItemId> = self.queue.drain(..).collect();
            frontier.sort();
            frontier.dedup();

            let mut new_methods: Vec<&MethodDef> = Vec::new();
            for item in frontier {
                match item {
                    ItemId::Class(id) => self.mark_class(&id),
                    ItemId::Method(id) => {
                        if self.live.methods.insert(id.clone()) {
                            self.enqueue_class(&id.owner);
                            if let Some(def) = self.program.method(&id) {
                                new_methods.push(def);
                            }
                        }
                    }
                    ItemId::Field(id) => {
                        if self.live.fields.insert(id.clone()) {
                            self.enqueue_class(&id.owner);
                        }
                    }
                }
            }

            // Fan the per-method reference enumeration out over the frontier;
            // the skip map keys results by method identity so the merge below
            // is deterministic regardless of worker interleaving.
            let enumerated: SkipMap<MethodId, Vec<Edge>> = SkipMap::new();
            let program = self.program;
            new_methods.par_iter().for_each(|&method| {
                let edges = enumerate(program, method);
                enumerated.insert(method.id.clone(), edges);
            });

            for entry in enumerated.iter() {
                let caller = entry.key();
                for edge in entry.value() {
                    self.apply(caller, edge);
                }
            }
        }
    }

    fn apply(&mut self, caller: &MethodId, edge: &Edge) {
        match edge {
            Edge::Type(class) => self.enqueue_class(class),
            Edge::Method(callee) => {
                self.live.call_edges.insert((caller.clone(), callee.clone()));
                if !self.live.methods.contains(callee) {
                    self.queue.push_back(ItemId::Method(callee.clone()));
                }
            }
            Edge::Field(field) => {
                self.live.field_edges.insert((caller.clone(), field.clone()));
                if !self.live.fields.contains(field) {
                    self.queue.push_back(ItemId::Field(field.clone()));
                }
            }
            Edge::VirtualSite(receiver, sig) => {
                self.enqueue_class(receiver);
                if self.virtual_sites.insert((receiver.clone(), sig.clone())) {
                    // Resolve the new site against every receiver subtype that
                    // is already live; later subtypes re-examine on marking.
                    let live_classes: Vec<ClassId> = self.live.classes.iter().cloned().collect();
                    for class in live_classes {
                        if self.program.is_subtype(&class, receiver) {
                            self.enqueue_dispatch_target(&class, sig);
                        }
                    }
                }
            }
        }
    }

    /// Marks a class live: its hierarchy becomes live and every recorded
    /// dispatched site whose receiver it subtypes is re-examined against it.
    fn mark_class(&mut self, id: &ClassId) {
        if !self.live.classes.insert(id.clone()) {
            return;
        }
        let Some(class) = self.program.class(id) else {
            return; // external, opaque
        };
        if let Some(superclass) = &class.superclass {
            self.enqueue_class(superclass);
        }
        for iface in &class.interfaces {
            self.enqueue_class(iface);
        }

        let sites: Vec<(ClassId, MethodSig)> = self
            .virtual_sites
            .iter()
            .filter(|(receiver, _)| self.program.is_subtype(id, receiver))
            .cloned()
            .collect();
        for (_, sig) in sites {
            self.enqueue_dispatch_target(id, &sig);
        }
    }

    fn enqueue_dispatch_target(&mut self, class: &ClassId, sig: &MethodSig) {
        if let Some(target) = self.program.lookup_method(class, sig).internal() {
            if !self.live.methods.contains(target) {
                self.queue.push_back(ItemId::Method(target.clone()));
            }
        }
        // Every default provider in the receiver's interface closure stays
        // live, not just the one lookup order happens to select first: which
        // provider wins (or whether the program is ambiguous) is decided by
        // the desugarer, and pruning a provider here would decide it by
        // lookup order instead.
        for entry in self.program.resolution_order(class) {
            let Some(entry_class) = self.program.class(&entry) else {
                continue;
            };
            if !entry_class.is_interface() {
                continue;
            }
            if let Some(provider) = entry_class.method(sig) {
                if provider.body.is_some() && !self.live.methods.contains(&provider.id) {
                    self.queue.push_back(ItemId::Method(provider.id.clone()));
                }
            }
        }
    }

    fn enqueue_class(&mut self, id: &ClassId) {
        if self.program.class(id).is_some() && !self.live.classes.contains(id) {
            self.queue.push_back(ItemId::Class(id.clone()));
        }
    }

    /// Prunes everything unreached and commits the new snapshot.
    fn finish(mut self) -> Result<ShakeOutcome> {
        self.repair_danglers();

        let mut builder = Program::builder();
        for external in self.program.externals() {
            builder.declare_external(external.clone());
        }
        for class in self.program.classes() {
            if !self.live.class_live(&class.id) {
                continue;
            }
            let mut kept = class.clone();
            kept.methods.retain(|m| self.live.method_live(&m.id));
            kept.fields.retain(|f| self.live.field_live(&f.id));
            builder.add_class(kept);
        }

        let removed = RemovalReport::diff(self.program, &self.live);
        let program = builder.commit()?;
        Ok(ShakeOutcome {
            program,
            live: self.live,
            removed,
        })
    }

    /// Conservative bias: if pruning would leave a live entity holding a
    /// dangling reference, the target is implicitly kept instead of removed.
    ///
    /// The traversal marks every target of a live method, so this loop is
    /// normally a no-op; it exists so that pruning can never trade soundness
    /// for minimality.
    fn repair_danglers(&mut self) {
        loop {
            let mut implicit: Vec<ItemId> = Vec::new();
            for method_id in &self.live.methods {
                let Some(method) = self.program.method(method_id) else {
                    continue;
                };
                let Some(body) = &method.body else { continue };
                for instr in &body.instructions {
                    if let Some(mref) = instr.method_ref() {
                        if let Some(resolved) = mref.resolution.internal() {
                            if !self.live.methods.contains(resolved)
                                && self.program.method(resolved).is_some()
                            {
                                implicit.push(ItemId::Method(resolved.clone()));
                            }
                        }
                    }
                    if let Some(fref) = instr.field_ref() {
                        if let Some(resolved) = fref.resolution.internal() {
                            if !self.live.fields.contains(resolved)
                                && self.program.field(resolved).is_some()
                            {
                                implicit.push(ItemId::Field(resolved.clone()));
                            }
                        }
                    }
                }
            }
            if implicit.is_empty() {
                break;
            }
            self.queue.extend(implicit);
            self.run();
        }
    }
}

/// Enumerates the references one method body makes, fully resolved.
///
/// Read-only against the committed snapshot, so safe to run from any worker.
/// Unresolvable references into the model are treated as opaque rather than
/// fatal: reachability is conservative, and the rebinder is the pass that turns
/// genuine inconsistencies into hard errors.
fn enumerate(program: &Program, method: &MethodDef) -> Vec<Edge> {
    let mut edges = Vec::new();
    let Some(body) = &method.body else {
        return edges;
    };
    for instr in &body.instructions {
        if let Some(class) = instr.class_reference() {
            edges.push(Edge::Type(class.clone()));
        }
        match instr {
            Instruction::Invoke { kind, method: mref, .. } => {
                edges.push(Edge::Type(mref.target.owner.clone()));
                let sig = mref.target.sig();
                match kind {
                    InvokeKind::Static | InvokeKind::Direct => {
                        if let Some(resolved) =
                            program.lookup_method(&mref.target.owner, &sig).internal()
                        {
                            edges.push(Edge::Method(resolved.clone()));
                        }
                    }
                    InvokeKind::Virtual | InvokeKind::Interface => {
                        edges.push(Edge::VirtualSite(mref.target.owner.clone(), sig.clone()));
                        if let Some(declared) =
                            program.lookup_method(&mref.target.owner, &sig).internal()
                        {
                            edges.push(Edge::Method(declared.clone()));
                        }
                    }
                }
            }
            Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
                edges.push(Edge::Type(field.target.owner.clone()));
                if let Some(resolved) = program
                    .lookup_field(&field.target.owner, &field.target.name, &field.target.type_name)
                    .internal()
                {
                    edges.push(Edge::Field(resolved.clone()));
                }
            }
            _ => {}
        }
    }
    edges
}
