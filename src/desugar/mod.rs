//! Interface default- and static-method desugaring.
//!
//! For targets without native default-method dispatch, every interface that
//! carries method bodies gets a synthesized companion class: default bodies
//! become static companion methods taking the receiver as an explicit leading
//! parameter, static interface methods move over unchanged, and the interface
//! keeps only abstract declarations. Every live implementing class that does
//! not override a default signature gains a forwarding method that invokes the
//! companion, so dispatch still lands on a concrete declaration everywhere.
//!
//! A diamond — two unrelated interfaces defaulting the same signature with no
//! override on the implementing class — is a static ambiguity and fails hard,
//! mirroring language-level rules. A provider on a subinterface of another
//! provider is more specific and wins silently.

use std::collections::BTreeMap;

use crate::model::{
    param_count, prepend_receiver, returns_value, ClassDef, ClassId, ClassKind, Instruction,
    InvokeKind, Local, MethodBody, MethodDef, MethodId, MethodRef, MethodKind, MethodSig, Program,
    Resolution, Visibility,
};
use crate::{Error, Result};

/// Suffix of synthesized companion class identities.
const COMPANION_SUFFIX: &str = "$-CC";

/// The outcome of the desugaring pass.
#[derive(Clone, Debug)]
pub struct DesugarPass {
    /// The committed snapshot after rewriting.
    pub program: Program,
    /// Synthesized companion classes.
    pub companions: Vec<ClassId>,
    /// Synthesized forwarding methods.
    pub forwarders: Vec<MethodId>,
    /// Relocated bodies: interface method → companion static method.
    pub method_map: BTreeMap<MethodId, MethodId>,
}

impl DesugarPass {
    /// Returns `true` if the pass rewrote anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.companions.is_empty() || !self.forwarders.is_empty()
    }
}

/// Runs the desugaring pass.
///
/// # Errors
///
/// Returns [`Error::AmbiguousDefaultMethod`] for an unresolved diamond, or a
/// broken-reference error if the rewritten program fails its own dispatch
/// check.
pub fn desugar(program: &Program) -> Result<DesugarPass> {
    let mut builder = program.to_builder();
    let mut companions = Vec::new();
    let mut forwarders = Vec::new();
    let mut method_map: BTreeMap<MethodId, MethodId> = BTreeMap::new();

    // Synthesize one companion per interface carrying bodies; strip the
    // bodies from the interface itself.
    for class in program.classes() {
        if !class.is_interface() {
            continue;
        }
        let movable: Vec<&MethodDef> = class
            .methods
            .iter()
            .filter(|m| m.body.is_some() && matches!(m.kind, MethodKind::Virtual | MethodKind::Static))
            .collect();
        if movable.is_empty() {
            continue;
        }

        let companion_id = ClassId::new(format!("{}{COMPANION_SUFFIX}", class.id));
        let mut companion = ClassDef::new(companion_id.clone(), ClassKind::Class, class.visibility);

        for method in movable {
            let companion_method_id = match method.kind {
                MethodKind::Virtual => MethodId::new(
                    companion_id.clone(),
                    &*method.id.name,
                    prepend_receiver(&method.id.descriptor, class.id.as_str()),
                ),
                _ => method.id.with_owner(companion_id.clone()),
            };
            // A default body already addresses the receiver as slot 0, which
            // is exactly the static companion's leading parameter.
            let mut moved = method.clone();
            moved.id = companion_method_id.clone();
            moved.kind = MethodKind::Static;
            moved.visibility = Visibility::Public;
            method_map.insert(method.id.clone(), companion_method_id);
            companion.methods.push(moved);
        }

        let iface = builder
            .class_mut(&class.id)
            .ok_or_else(|| broken!("interface {} missing from revision", class.id))?;
        iface.methods.retain(|m| !(m.kind == MethodKind::Static && m.body.is_some()));
        for method in &mut iface.methods {
            if method.kind == MethodKind::Virtual && method.body.is_some() {
                method.kind = MethodKind::Abstract;
                method.body = None;
            }
        }

        companions.push(companion_id);
        builder.add_class(companion);
    }

    // Forwarders: every live implementing class without its own override gets
    // a concrete declaration resolving to the companion body.
    for class in program.classes() {
        if class.kind != ClassKind::Class {
            continue;
        }
        let needed = inherited_defaults(program, &class.id)?;
        for (sig, provider) in needed {
            let Some(companion_target) = method_map.get(&provider).cloned() else {
                continue;
            };
            let forwarder_id =
                MethodId::new(class.id.clone(), &*sig.name, &*sig.descriptor);
            let params = 1 + param_count(&sig.descriptor);
            let has_result = returns_value(&sig.descriptor);
            let locals = params + u32::from(has_result);
            let dest = has_result.then(|| Local(params));

            let body = MethodBody::new(
                params,
                locals,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef {
                            target: companion_target.clone(),
                            resolution: Resolution::Internal(companion_target),
                        },
                        args: (0..params).map(Local).collect(),
                        dest,
                    },
                    Instruction::Return { value: dest },
                ],
            );

            let target = builder
                .class_mut(&class.id)
                .ok_or_else(|| broken!("class {} missing from revision", class.id))?;
            target.methods.push(MethodDef::new(
                forwarder_id.clone(),
                MethodKind::Virtual,
                Visibility::Public,
                Some(body),
            ));
            forwarders.push(forwarder_id);
        }
    }

    // Static interface call sites retarget to the companion.
    for class_id in builder.class_ids() {
        let Some(class) = builder.class_mut(&class_id) else {
            continue;
        };
        for method in &mut class.methods {
            let Some(body) = &mut method.body else { continue };
            for instr in &mut body.instructions {
                let Instruction::Invoke { kind: InvokeKind::Static, method: mref, .. } = instr
                else {
                    continue;
                };
                if let Some(new_target) = method_map.get(&mref.target) {
                    mref.target = new_target.clone();
                    mref.resolution = Resolution::Internal(new_target.clone());
                }
            }
        }
    }

    let program = builder.commit()?;
    verify_concrete_defaults(&program, &forwarders)?;
    Ok(DesugarPass {
        program,
        companions,
        forwarders,
        method_map,
    })
}

/// Computes the default-method signatures a class inherits without overriding,
/// mapped to their single most-specific provider declaration.
///
/// # Errors
///
/// Returns [`Error::AmbiguousDefaultMethod`] if two unrelated providers remain
/// for one signature.
fn inherited_defaults(
    program: &Program,
    class_id: &ClassId,
) -> Result<BTreeMap<MethodSig, MethodId>> {
    // Default providers per signature across the interface closure.
    let mut providers: BTreeMap<MethodSig, Vec<MethodId>> = BTreeMap::new();
    for entry in program.resolution_order(class_id) {
        let Some(entry_class) = program.class(&entry) else {
            continue;
        };
        if !entry_class.is_interface() {
            continue;
        }
        for method in entry_class.default_methods() {
            providers.entry(method.sig()).or_default().push(method.id.clone());
        }
    }

    let chain_declares = |sig: &MethodSig| {
        program.superclass_chain(class_id).iter().any(|link| {
            program
                .class(link)
                .is_some_and(|c| !c.is_interface() && c.method(sig).is_some())
        })
    };

    let mut needed = BTreeMap::new();
    for (sig, mut candidates) in providers {
        if chain_declares(&sig) {
            continue;
        }
        // Drop providers shadowed by a more specific subinterface provider.
        let all = candidates.clone();
        candidates.retain(|candidate| {
            !all.iter().any(|other| {
                other != candidate && program.is_subtype(&other.owner, &candidate.owner)
            })
        });
        match candidates.as_slice() {
            [] => {}
            [single] => {
                needed.insert(sig, single.clone());
            }
            [first, second, ..] => {
                return Err(Error::AmbiguousDefaultMethod {
                    class: class_id.clone(),
                    signature: sig,
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
    }
    Ok(needed)
}

/// Post-condition: every synthesized forwarder resolves to a concrete body.
fn verify_concrete_defaults(program: &Program, forwarders: &[MethodId]) -> Result<()> {
    for forwarder in forwarders {
        let concrete = program
            .method(forwarder)
            .and_then(|m| m.body.as_ref())
            .is_some();
        if !concrete {
            return Err(broken!("forwarder {forwarder} lost its body"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{desugar, COMPANION_SUFFIX};
    use crate::model::{
        ClassDef, ClassId, ClassKind, Instruction, InvokeKind, Local, MethodBody, MethodDef,
        MethodId, MethodRef, MethodKind, MethodSig, Program, Visibility,
    };
    use crate::Error;

    fn ret() -> Instruction {
        Instruction::Return { value: None }
    }

    fn default_method(owner: &str, name: &str) -> MethodDef {
        MethodDef::new(
            MethodId::new(ClassId::new(owner), name, "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(1, 1, vec![ret()])),
        )
    }

    /// Interface with one default method plus an implementor without override.
    fn default_fixture() -> Program {
        let mut iface = ClassDef::new(ClassId::new("Greeter"), ClassKind::Interface, Visibility::Public);
        iface.methods.push(default_method("Greeter", "greet"));

        let mut impl_class = ClassDef::new(ClassId::new("Plain"), ClassKind::Class, Visibility::Public);
        impl_class.interfaces.push(ClassId::new("Greeter"));

        let mut builder = Program::builder();
        builder.add_class(iface);
        builder.add_class(impl_class);
        builder.commit().unwrap()
    }

    #[test]
    fn test_companion_synthesized_and_interface_stripped() {
        let program = default_fixture();
        let pass = desugar(&program).unwrap();

        let companion_id = ClassId::new(format!("Greeter{COMPANION_SUFFIX}"));
        assert!(pass.companions.contains(&companion_id));
        let companion = pass.program.class(&companion_id).unwrap();
        let moved = companion
            .method(&MethodSig::new("greet", "(LGreeter;)V"))
            .unwrap();
        assert_eq!(moved.kind, MethodKind::Static);
        assert!(moved.body.is_some());

        let iface = pass.program.class(&ClassId::new("Greeter")).unwrap();
        let decl = iface.method(&MethodSig::new("greet", "()V")).unwrap();
        assert_eq!(decl.kind, MethodKind::Abstract);
        assert!(decl.body.is_none());
    }

    #[test]
    fn test_forwarder_synthesized_on_implementor() {
        let program = default_fixture();
        let pass = desugar(&program).unwrap();

        let plain = pass.program.class(&ClassId::new("Plain")).unwrap();
        let forwarder = plain.method(&MethodSig::new("greet", "()V")).unwrap();
        let body = forwarder.body.as_ref().unwrap();
        let Instruction::Invoke { kind, method, args, .. } = &body.instructions[0] else {
            panic!("expected companion invoke");
        };
        assert_eq!(*kind, InvokeKind::Static);
        assert_eq!(
            method.target,
            MethodId::new(
                ClassId::new(format!("Greeter{COMPANION_SUFFIX}")),
                "greet",
                "(LGreeter;)V"
            )
        );
        assert_eq!(args, &vec![Local(0)]);
    }

    #[test]
    fn test_existing_override_not_forwarded() {
        let mut program_builder = default_fixture().to_builder();
        let plain = program_builder.class_mut(&ClassId::new("Plain")).unwrap();
        plain.methods.push(default_method("Plain", "greet"));
        let program = program_builder.commit().unwrap();

        let pass = desugar(&program).unwrap();
        assert!(pass.forwarders.is_empty());
        let plain = pass.program.class(&ClassId::new("Plain")).unwrap();
        // Still exactly one declaration: the class's own.
        assert_eq!(
            plain
                .methods
                .iter()
                .filter(|m| m.sig() == MethodSig::new("greet", "()V"))
                .count(),
            1
        );
    }

    #[test]
    fn test_diamond_conflict_is_fatal() {
        let mut left = ClassDef::new(ClassId::new("Left"), ClassKind::Interface, Visibility::Public);
        left.methods.push(default_method("Left", "pick"));
        let mut right = ClassDef::new(ClassId::new("Right"), ClassKind::Interface, Visibility::Public);
        right.methods.push(default_method("Right", "pick"));

        let mut both = ClassDef::new(ClassId::new("Both"), ClassKind::Class, Visibility::Public);
        both.interfaces.push(ClassId::new("Left"));
        both.interfaces.push(ClassId::new("Right"));

        let mut builder = Program::builder();
        builder.add_class(left);
        builder.add_class(right);
        builder.add_class(both);
        let program = builder.commit().unwrap();

        let err = desugar(&program).unwrap_err();
        let Error::AmbiguousDefaultMethod { class, signature, .. } = err else {
            panic!("expected ambiguity error, got {err}");
        };
        assert_eq!(class, ClassId::new("Both"));
        assert_eq!(signature, MethodSig::new("pick", "()V"));
    }

    #[test]
    fn test_diamond_with_override_is_allowed() {
        let mut left = ClassDef::new(ClassId::new("Left"), ClassKind::Interface, Visibility::Public);
        left.methods.push(default_method("Left", "pick"));
        let mut right = ClassDef::new(ClassId::new("Right"), ClassKind::Interface, Visibility::Public);
        right.methods.push(default_method("Right", "pick"));

        let mut both = ClassDef::new(ClassId::new("Both"), ClassKind::Class, Visibility::Public);
        both.interfaces.push(ClassId::new("Left"));
        both.interfaces.push(ClassId::new("Right"));
        both.methods.push(default_method("Both", "pick"));

        let mut builder = Program::builder();
        builder.add_class(left);
        builder.add_class(right);
        builder.add_class(both);
        let program = builder.commit().unwrap();

        assert!(desugar(&program).is_ok());
    }

    #[test]
    fn test_subinterface_provider_wins() {
        let mut base = ClassDef::new(ClassId::new("Base"), ClassKind::Interface, Visibility::Public);
        base.methods.push(default_method("Base", "pick"));
        let mut derived =
            ClassDef::new(ClassId::new("Derived"), ClassKind::Interface, Visibility::Public);
        derived.interfaces.push(ClassId::new("Base"));
        derived.methods.push(default_method("Derived", "pick"));

        let mut impl_class = ClassDef::new(ClassId::new("Impl"), ClassKind::Class, Visibility::Public);
        impl_class.interfaces.push(ClassId::new("Derived"));

        let mut builder = Program::builder();
        builder.add_class(base);
        builder.add_class(derived);
        builder.add_class(impl_class);
        let program = builder.commit().unwrap();

        let pass = desugar(&program).unwrap();
        let impl_class = pass.program.class(&ClassId::new("Impl")).unwrap();
        let forwarder = impl_class.method(&MethodSig::new("pick", "()V")).unwrap();
        let body = forwarder.body.as_ref().unwrap();
        let Instruction::Invoke { method, .. } = &body.instructions[0] else {
            panic!("expected companion invoke");
        };
        assert_eq!(
            method.target.owner,
            ClassId::new(format!("Derived{COMPANION_SUFFIX}"))
        );
    }

    #[test]
    fn test_static_interface_method_moved_and_call_sites_rewritten() {
        let mut iface = ClassDef::new(ClassId::new("Util"), ClassKind::Interface, Visibility::Public);
        iface.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Util"), "zero", "()I"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                1,
                vec![
                    Instruction::Const {
                        dest: Local(0),
                        value: crate::model::ConstValue::Int(0),
                    },
                    Instruction::Return { value: Some(Local(0)) },
                ],
            )),
        ));

        let mut user = ClassDef::new(ClassId::new("User"), ClassKind::Class, Visibility::Public);
        user.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("User"), "run", "()I"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                1,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef::new(MethodId::new(ClassId::new("Util"), "zero", "()I")),
                        args: vec![],
                        dest: Some(Local(0)),
                    },
                    Instruction::Return { value: Some(Local(0)) },
                ],
            )),
        ));

        let mut builder = Program::builder();
        builder.add_class(iface);
        builder.add_class(user);
        let program = builder.commit().unwrap();

        let pass = desugar(&program).unwrap();
        let iface = pass.program.class(&ClassId::new("Util")).unwrap();
        assert!(iface.method(&MethodSig::new("zero", "()I")).is_none());

        let user = pass.program.class(&ClassId::new("User")).unwrap();
        let body = user.methods[0].body.as_ref().unwrap();
        let Instruction::Invoke { method, .. } = &body.instructions[0] else {
            panic!("expected invoke");
        };
        assert_eq!(
            method.target.owner,
            ClassId::new(format!("Util{COMPANION_SUFFIX}"))
        );
    }
}
