//! Results of the reachability fixed point.

use std::collections::BTreeSet;

use crate::model::{ClassId, FieldId, MethodId, Program};

/// The live subset of a program plus the conservative reference-edge sets the
/// rewrite passes consume.
#[derive(Clone, Debug, Default)]
pub struct LiveSet {
    /// Live class identities.
    pub classes: BTreeSet<ClassId>,
    /// Live method identities.
    pub methods: BTreeSet<MethodId>,
    /// Live field identities.
    pub fields: BTreeSet<FieldId>,
    /// Conservative call edges: caller → resolved callee.
    pub call_edges: BTreeSet<(MethodId, MethodId)>,
    /// Conservative field-access edges: accessor → resolved field.
    pub field_edges: BTreeSet<(MethodId, FieldId)>,
}

impl LiveSet {
    /// Returns `true` if the class was reached.
    #[must_use]
    pub fn class_live(&self, id: &ClassId) -> bool {
        self.classes.contains(id)
    }

    /// Returns `true` if the method was reached.
    #[must_use]
    pub fn method_live(&self, id: &MethodId) -> bool {
        self.methods.contains(id)
    }

    /// Returns `true` if the field was reached.
    #[must_use]
    pub fn field_live(&self, id: &FieldId) -> bool {
        self.fields.contains(id)
    }
}

/// Identities pruned by the analyzer, for the external reporting collaborator.
///
/// All three lists are sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Removed classes.
    pub classes: Vec<ClassId>,
    /// Removed methods (including methods of removed classes).
    pub methods: Vec<MethodId>,
    /// Removed fields (including fields of removed classes).
    pub fields: Vec<FieldId>,
}

impl RemovalReport {
    /// Computes the report as the difference between a program and its live set.
    #[must_use]
    pub fn diff(program: &Program, live: &LiveSet) -> Self {
        let mut report = RemovalReport::default();
        for class in program.classes() {
            let class_live = live.class_live(&class.id);
            if !class_live {
                report.classes.push(class.id.clone());
            }
            for method in &class.methods {
                if !class_live || !live.method_live(&method.id) {
                    report.methods.push(method.id.clone());
                }
            }
            for field in &class.fields {
                if !class_live || !live.field_live(&field.id) {
                    report.fields.push(field.id.clone());
                }
            }
        }
        report
    }

    /// Returns `true` if nothing was removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.methods.is_empty() && self.fields.is_empty()
    }

    /// Total number of removed identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len()
    }
}

/// The committed outcome of a shake: the pruned program, what survived, and
/// what was removed.
#[derive(Clone, Debug)]
pub struct ShakeOutcome {
    /// The pruned program snapshot.
    pub program: Program,
    /// The live subset and edge sets.
    pub live: LiveSet,
    /// The identities that were pruned.
    pub removed: RemovalReport,
}
