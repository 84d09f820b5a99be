//! Call-site inlining.
//!
//! A call site is a candidate only when it resolves to exactly one statically
//! determinable target: a static or direct call, or a dispatched call whose
//! receiver hierarchy contributes a single live implementation. Candidates are
//! then filtered by directives, recursion and the code-size budget. Declining a
//! site is a normal pass decision, recorded for diagnostics and never an error.
//!
//! Substitution binds parameters by value into fresh slots above the caller's
//! frame and synthesizes an explicit receiver null check for instance targets,
//! so argument evaluation order and null-check timing survive verbatim. After a
//! successful inline the enclosing method's cached metrics are invalidated and
//! the method is left alone until the next pipeline iteration rather than
//! patched incrementally.

use dashmap::DashMap;
use rayon::prelude::*;
use strum::Display;

use crate::model::{
    dispatch_targets, Instruction, InvokeKind, Local, MethodBody, MethodDef, MethodId, MethodKind,
    Program, Resolution,
};
use crate::Result;

/// Why a candidate call site was not inlined.
///
/// These are pass-through decisions, not failures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum InlineDecline {
    /// Dispatch could select more than one live implementation.
    VirtualAmbiguous,
    /// The single target carries a `no-inline` (or pinning) directive.
    DirectiveBlocked,
    /// The target is the caller itself or calls straight back into it.
    Recursive,
    /// The substitution would exceed the configured code-size budget.
    BudgetExceeded,
    /// The target is a constructor; constructor chains are never flattened.
    Constructor,
    /// The single target has no body to substitute.
    NoBody,
}

/// The decision taken at one call site.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum InlineOutcome {
    /// The callee body was substituted at the site.
    Inlined,
    /// The site was left alone for the stated reason.
    Declined(InlineDecline),
}

/// Code-size limits for the inliner.
#[derive(Clone, Copy, Debug)]
pub struct InlineBudget {
    /// Maximum instruction-count growth a single substitution may cost.
    pub instruction_budget: usize,
    /// Maximum size a method may grow to through inlining.
    pub max_method_size: usize,
}

impl Default for InlineBudget {
    fn default() -> Self {
        InlineBudget {
            instruction_budget: 24,
            max_method_size: 2048,
        }
    }
}

/// The outcome of one inlining pass over the whole program.
#[derive(Clone, Debug)]
pub struct InlinePass {
    /// The committed snapshot after substitution.
    pub program: Program,
    /// Number of call sites inlined.
    pub inlined: usize,
    /// Per-site decisions: enclosing method, static target, outcome.
    pub decisions: Vec<(MethodId, MethodId, InlineOutcome)>,
}

impl InlinePass {
    /// Returns `true` if the pass substituted at least one body.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.inlined > 0
    }
}

/// Verdict of candidate classification, before substitution.
enum Verdict {
    /// Inline this resolved target.
    Inline(MethodId),
    /// Not a candidate at all (external or unresolvable target).
    Skip,
    /// A candidate that was declined.
    Decline(InlineDecline),
}

/// Runs one inlining pass.
///
/// Callee bodies and dispatch facts are read from the committed input snapshot;
/// each method is rewritten at most once per pass and revisited on the next
/// pipeline iteration, keeping correctness independent of in-pass ordering.
///
/// # Errors
///
/// Returns an error only if the rewritten revision fails to commit.
pub fn run_inline_pass(program: &Program, budget: &InlineBudget) -> Result<InlinePass> {
    // Per-method size metrics, computed in parallel over the snapshot.
    let sizes: DashMap<MethodId, usize> = DashMap::new();
    let methods: Vec<&MethodDef> = program.methods().collect();
    methods.par_iter().for_each(|method| {
        sizes.insert(method.id.clone(), method.code_size());
    });

    let mut builder = program.to_builder();
    let mut inlined = 0usize;
    let mut decisions = Vec::new();

    for class_id in program.class_ids() {
        let Some(class) = program.class(&class_id) else {
            continue;
        };
        for method in &class.methods {
            let Some(body) = &method.body else { continue };

            let mut replacement: Option<MethodBody> = None;
            for (index, instr) in body.instructions.iter().enumerate() {
                let Instruction::Invoke { kind, method: mref, args, dest } = instr else {
                    continue;
                };
                let verdict = classify(program, method, *kind, mref, args, &sizes, budget);
                match verdict {
                    Verdict::Skip => {}
                    Verdict::Decline(reason) => {
                        decisions.push((
                            method.id.clone(),
                            mref.target.clone(),
                            InlineOutcome::Declined(reason),
                        ));
                    }
                    Verdict::Inline(target_id) => {
                        let Some(callee_body) =
                            program.method(&target_id).and_then(|m| m.body.as_ref())
                        else {
                            continue;
                        };
                        replacement =
                            Some(substitute(body, index, callee_body, *kind, args, *dest));
                        decisions.push((
                            method.id.clone(),
                            mref.target.clone(),
                            InlineOutcome::Inlined,
                        ));
                        inlined += 1;
                        break;
                    }
                }
            }

            if let Some(new_body) = replacement {
                // Invalidate the cached metric; the method is not revisited
                // until the next pipeline iteration.
                sizes.insert(method.id.clone(), new_body.instructions.len());
                if let Some(slot) = builder
                    .class_mut(&class_id)
                    .and_then(|c| c.method_mut(&method.sig()))
                {
                    slot.body = Some(new_body);
                }
            }
        }
    }

    let program = builder.commit()?;
    Ok(InlinePass {
        program,
        inlined,
        decisions,
    })
}

/// Classifies one call site against the candidate rules.
fn classify(
    program: &Program,
    caller: &MethodDef,
    kind: InvokeKind,
    mref: &crate::model::MethodRef,
    args: &[Local],
    sizes: &DashMap<MethodId, usize>,
    budget: &InlineBudget,
) -> Verdict {
    let sig = mref.target.sig();

    // Rule 1: exactly one statically determinable target.
    let target_id = match kind {
        InvokeKind::Static | InvokeKind::Direct => {
            match program.lookup_method(&mref.target.owner, &sig) {
                Resolution::Internal(id) => id,
                Resolution::External | Resolution::Unresolved => return Verdict::Skip,
            }
        }
        InvokeKind::Virtual | InvokeKind::Interface => {
            let mut targets = dispatch_targets(program, &mref.target.owner, &sig).into_iter();
            match (targets.next(), targets.next()) {
                (Some(single), None) => single,
                (None, _) => return Verdict::Skip,
                _ => return Verdict::Decline(InlineDecline::VirtualAmbiguous),
            }
        }
    };

    let Some(target) = program.method(&target_id) else {
        return Verdict::Skip;
    };
    if target.kind == MethodKind::Constructor {
        return Verdict::Decline(InlineDecline::Constructor);
    }
    let Some(target_body) = &target.body else {
        return Verdict::Decline(InlineDecline::NoBody);
    };
    if args.len() != target_body.params as usize {
        return Verdict::Skip;
    }

    // Rule 2: directives.
    if target.directives.blocks_inlining() {
        return Verdict::Decline(InlineDecline::DirectiveBlocked);
    }

    // Rule 3: no self-recursion through this site, direct or one-hop mutual
    // (the in-progress stack here is caller → target).
    if target_id == caller.id || calls_back_into(program, target, &caller.id) {
        return Verdict::Decline(InlineDecline::Recursive);
    }

    // Rule 4: code-size budget.
    let callee_size = sizes
        .get(&target_id)
        .map_or_else(|| target.code_size(), |entry| *entry.value());
    let null_check = usize::from(kind.has_receiver());
    let growth = (callee_size + args.len() + null_check).saturating_sub(1);
    let caller_size = sizes
        .get(&caller.id)
        .map_or_else(|| caller.code_size(), |entry| *entry.value());
    if growth > budget.instruction_budget || caller_size + growth > budget.max_method_size {
        return Verdict::Decline(InlineDecline::BudgetExceeded);
    }

    Verdict::Inline(target_id)
}

/// Returns `true` if the callee invokes the caller back, which would expand
/// without bound under repeated substitution.
fn calls_back_into(program: &Program, callee: &MethodDef, caller: &MethodId) -> bool {
    let Some(body) = &callee.body else {
        return false;
    };
    body.instructions.iter().any(|instr| {
        instr.method_ref().is_some_and(|mref| {
            let sig = mref.target.sig();
            if mref.target == *caller {
                return true;
            }
            program
                .lookup_method(&mref.target.owner, &sig)
                .internal()
                .is_some_and(|resolved| resolved == caller)
        })
    })
}

/// Substitutes the callee body at the call site.
///
/// Callee slots are shifted above the caller frame, parameters are bound by
/// value with explicit moves (receiver first), and the trailing return becomes
/// a move into the call-site destination.
fn substitute(
    caller: &MethodBody,
    index: usize,
    callee_body: &MethodBody,
    kind: InvokeKind,
    args: &[Local],
    dest: Option<Local>,
) -> MethodBody {
    let base = caller.locals;

    let mut instructions = Vec::with_capacity(
        caller.instructions.len() + callee_body.instructions.len() + args.len() + 1,
    );
    instructions.extend_from_slice(&caller.instructions[..index]);

    if kind.has_receiver() {
        instructions.push(Instruction::NullCheck { object: args[0] });
    }
    for (param, arg) in args.iter().enumerate() {
        instructions.push(Instruction::Move {
            dest: Local(base + param as u32),
            src: *arg,
        });
    }

    for instr in &callee_body.instructions {
        match instr {
            Instruction::Return { value } => {
                if let (Some(dest), Some(value)) = (dest, value) {
                    instructions.push(Instruction::Move {
                        dest,
                        src: Local(value.0 + base),
                    });
                }
            }
            other => {
                let mut shifted = other.clone();
                shifted.remap_locals(|local| Local(local.0 + base));
                instructions.push(shifted);
            }
        }
    }

    instructions.extend_from_slice(&caller.instructions[index + 1..]);

    MethodBody {
        locals: caller.locals + callee_body.locals,
        params: caller.params,
        instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::{run_inline_pass, InlineBudget, InlineDecline, InlineOutcome};
    use crate::directives::DirectiveSet;
    use crate::model::{
        ClassDef, ClassId, ClassKind, ConstValue, Instruction, InvokeKind, Local, MethodBody,
        MethodDef, MethodId, MethodRef, MethodKind, Program, Visibility,
    };

    fn ret() -> Instruction {
        Instruction::Return { value: None }
    }

    /// Caller.run invokes Callee.answer statically; answer returns the
    /// constant 42.
    fn call_fixture(callee_directives: DirectiveSet) -> Program {
        let mut builder = Program::builder();

        let mut callee = ClassDef::new(ClassId::new("Callee"), ClassKind::Class, Visibility::Public);
        let mut answer = MethodDef::new(
            MethodId::new(ClassId::new("Callee"), "answer", "()I"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                1,
                vec![
                    Instruction::Const {
                        dest: Local(0),
                        value: ConstValue::Int(42),
                    },
                    Instruction::Return { value: Some(Local(0)) },
                ],
            )),
        );
        answer.directives = callee_directives;
        callee.methods.push(answer);

        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "()I"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                1,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef::new(MethodId::new(
                            ClassId::new("Callee"),
                            "answer",
                            "()I",
                        )),
                        args: vec![],
                        dest: Some(Local(0)),
                    },
                    Instruction::Return { value: Some(Local(0)) },
                ],
            )),
        ));

        builder.add_class(callee);
        builder.add_class(caller);
        builder.commit().unwrap()
    }

    #[test]
    fn test_static_call_inlined() {
        let program = call_fixture(DirectiveSet::empty());
        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 1);

        let caller = pass.program.class(&ClassId::new("Caller")).unwrap();
        let body = caller.methods[0].body.as_ref().unwrap();
        // The invoke is gone; the constant load now happens in the caller.
        assert!(body
            .instructions
            .iter()
            .all(|i| !matches!(i, Instruction::Invoke { .. })));
        assert!(body
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Const { value: ConstValue::Int(42), .. })));
    }

    #[test]
    fn test_no_inline_directive_respected() {
        let program = call_fixture(DirectiveSet::NO_INLINE);
        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 0);
        assert!(pass.decisions.iter().any(|(_, _, outcome)| matches!(
            outcome,
            InlineOutcome::Declined(InlineDecline::DirectiveBlocked)
        )));
    }

    #[test]
    fn test_budget_exceeded_declined() {
        let program = call_fixture(DirectiveSet::empty());
        let budget = InlineBudget {
            instruction_budget: 0,
            max_method_size: 2048,
        };
        let pass = run_inline_pass(&program, &budget).unwrap();
        assert_eq!(pass.inlined, 0);
        assert!(pass.decisions.iter().any(|(_, _, outcome)| matches!(
            outcome,
            InlineOutcome::Declined(InlineDecline::BudgetExceeded)
        )));
    }

    #[test]
    fn test_recursive_call_declined() {
        let mut builder = Program::builder();
        let mut class = ClassDef::new(ClassId::new("Loop"), ClassKind::Class, Visibility::Public);
        class.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Loop"), "spin", "()V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                0,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef::new(MethodId::new(ClassId::new("Loop"), "spin", "()V")),
                        args: vec![],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));
        builder.add_class(class);
        let program = builder.commit().unwrap();

        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 0);
        assert!(pass.decisions.iter().any(|(_, _, outcome)| matches!(
            outcome,
            InlineOutcome::Declined(InlineDecline::Recursive)
        )));
    }

    #[test]
    fn test_mutual_recursion_declined() {
        let mut builder = Program::builder();
        let mut class = ClassDef::new(ClassId::new("Pair"), ClassKind::Class, Visibility::Public);
        for (name, other) in [("ping", "pong"), ("pong", "ping")] {
            class.methods.push(MethodDef::new(
                MethodId::new(ClassId::new("Pair"), name, "()V"),
                MethodKind::Static,
                Visibility::Public,
                Some(MethodBody::new(
                    0,
                    0,
                    vec![
                        Instruction::Invoke {
                            kind: InvokeKind::Static,
                            method: MethodRef::new(MethodId::new(
                                ClassId::new("Pair"),
                                other,
                                "()V",
                            )),
                            args: vec![],
                            dest: None,
                        },
                        ret(),
                    ],
                )),
            ));
        }
        builder.add_class(class);
        let program = builder.commit().unwrap();

        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 0);
        assert!(pass.decisions.iter().all(|(_, _, outcome)| matches!(
            outcome,
            InlineOutcome::Declined(InlineDecline::Recursive)
        )));
    }

    #[test]
    fn test_virtual_ambiguous_declined() {
        let mut builder = Program::builder();

        let mut base = ClassDef::new(ClassId::new("Base"), ClassKind::Class, Visibility::Public);
        base.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Base"), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(1, 1, vec![ret()])),
        ));
        let mut sub = ClassDef::new(ClassId::new("Sub"), ClassKind::Class, Visibility::Public);
        sub.superclass = Some(ClassId::new("Base"));
        sub.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Sub"), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(1, 1, vec![ret()])),
        ));

        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "(LBase;)V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                1,
                1,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Virtual,
                        method: MethodRef::new(MethodId::new(ClassId::new("Base"), "m", "()V")),
                        args: vec![Local(0)],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));

        builder.add_class(base);
        builder.add_class(sub);
        builder.add_class(caller);
        let program = builder.commit().unwrap();

        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 0);
        assert!(pass.decisions.iter().any(|(_, _, outcome)| matches!(
            outcome,
            InlineOutcome::Declined(InlineDecline::VirtualAmbiguous)
        )));
    }

    #[test]
    fn test_instance_inline_synthesizes_null_check() {
        let mut builder = Program::builder();

        let mut target = ClassDef::new(ClassId::new("Target"), ClassKind::Class, Visibility::Public);
        target.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Target"), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(1, 1, vec![ret()])),
        ));

        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "(LTarget;)V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                1,
                1,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Virtual,
                        method: MethodRef::new(MethodId::new(ClassId::new("Target"), "m", "()V")),
                        args: vec![Local(0)],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));

        builder.add_class(target);
        builder.add_class(caller);
        let program = builder.commit().unwrap();

        let pass = run_inline_pass(&program, &InlineBudget::default()).unwrap();
        assert_eq!(pass.inlined, 1);

        let class = pass.program.class(&ClassId::new("Caller")).unwrap();
        let body = class.methods[0].body.as_ref().unwrap();
        assert!(matches!(
            body.instructions[0],
            Instruction::NullCheck { object: Local(0) }
        ));
    }
}
