//! Member rebinding: canonicalizing every reference's resolved target.
//!
//! Each invoke and field access carries the static target it was written
//! against and the declaration that member lookup actually selects. Shaking,
//! merging and desugaring all change which declaration a pre-existing reference
//! resolves to, so this pass runs after any of them: it recomputes the lookup
//! (declaring class, then the superclass chain, then interfaces in declaration
//! order depth-first) and rewrites the resolved side of every reference.
//!
//! A reference that no longer resolves is not a pass decision, it is a defect
//! in whatever ran before; the pass aborts the pipeline with a broken-reference
//! error rather than tolerate an unsound model.

use crate::model::{Instruction, MethodId, Program, Resolution};
use crate::Result;

/// The outcome of a rebinding pass.
#[derive(Clone, Debug)]
pub struct Rebound {
    /// The committed snapshot with canonical resolutions.
    pub program: Program,
    /// Number of references whose resolution changed.
    pub rewritten: usize,
}

impl Rebound {
    /// Returns `true` if any resolution changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.rewritten > 0
    }
}

/// Recomputes the resolved target of every reference in the program.
///
/// # Errors
///
/// Returns [`Error::BrokenReference`](crate::Error::BrokenReference) if a
/// reference into the model has no resolving declaration, which indicates an
/// upstream transformation removed a declaration without rewriting its
/// references.
pub fn rebind(program: &Program) -> Result<Rebound> {
    let mut rewritten = 0usize;
    let mut builder = program.to_builder();

    for class_id in program.class_ids() {
        // Collect the rewrites for this class against the immutable snapshot,
        // then apply them to the builder copy.
        let class = program
            .class(&class_id)
            .ok_or_else(|| broken!("class {class_id} vanished during rebinding"))?;

        let mut rebound_methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            let mut method = method.clone();
            if let Some(body) = &mut method.body {
                for instr in &mut body.instructions {
                    rewritten += rebind_instruction(program, &method.id, instr)?;
                }
            }
            rebound_methods.push(method);
        }

        let target = builder
            .class_mut(&class_id)
            .ok_or_else(|| broken!("class {class_id} missing from rebinding revision"))?;
        target.methods = rebound_methods;
    }

    let program = builder.commit()?;
    Ok(Rebound { program, rewritten })
}

/// Rebinds one instruction; returns 1 if its resolution changed.
fn rebind_instruction(
    program: &Program,
    context: &MethodId,
    instr: &mut Instruction,
) -> Result<usize> {
    match instr {
        Instruction::Invoke { method, .. } => {
            let resolution = program.lookup_method(&method.target.owner, &method.target.sig());
            if let Resolution::Unresolved = resolution {
                return Err(broken!(
                    "invoke target {} in {context} has no resolving declaration",
                    method.target
                ));
            }
            if method.resolution != resolution {
                method.resolution = resolution;
                return Ok(1);
            }
            Ok(0)
        }
        Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
            let resolution = program.lookup_field(
                &field.target.owner,
                &field.target.name,
                &field.target.type_name,
            );
            if let Resolution::Unresolved = resolution {
                return Err(broken!(
                    "field target {} in {context} has no resolving declaration",
                    field.target
                ));
            }
            if field.resolution != resolution {
                field.resolution = resolution;
                return Ok(1);
            }
            Ok(0)
        }
        _ => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::rebind;
    use crate::model::{
        ClassDef, ClassId, ClassKind, FieldDef, FieldId, FieldKind, Instruction, InvokeKind, Local,
        MethodBody, MethodDef, MethodId, MethodRef, MethodKind, Program, Resolution, Visibility,
    };
    use crate::Error;

    fn ret() -> Instruction {
        Instruction::Return { value: None }
    }

    #[test]
    fn test_invoke_rebinds_to_superclass_declaration() {
        let mut builder = Program::builder();

        let mut base = ClassDef::new(ClassId::new("Base"), ClassKind::Class, Visibility::Public);
        base.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Base"), "m", "()V"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(1, 1, vec![ret()])),
        ));

        let mut derived = ClassDef::new(ClassId::new("Derived"), ClassKind::Class, Visibility::Public);
        derived.superclass = Some(ClassId::new("Base"));

        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "(LDerived;)V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                1,
                1,
                vec![
                    // Written against Derived, declared on Base.
                    Instruction::Invoke {
                        kind: InvokeKind::Virtual,
                        method: MethodRef::new(MethodId::new(ClassId::new("Derived"), "m", "()V")),
                        args: vec![Local(0)],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));

        builder.add_class(base);
        builder.add_class(derived);
        builder.add_class(caller);
        let program = builder.commit().unwrap();

        let rebound = rebind(&program).unwrap();
        assert_eq!(rebound.rewritten, 1);

        let class = rebound.program.class(&ClassId::new("Caller")).unwrap();
        let body = class.methods[0].body.as_ref().unwrap();
        let Instruction::Invoke { method, .. } = &body.instructions[0] else {
            panic!("expected invoke");
        };
        assert_eq!(
            method.resolution,
            Resolution::Internal(MethodId::new(ClassId::new("Base"), "m", "()V"))
        );
    }

    #[test]
    fn test_missing_declaration_is_fatal() {
        let mut builder = Program::builder();
        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "()V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                0,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef::new(MethodId::new(ClassId::new("Caller"), "gone", "()V")),
                        args: vec![],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));
        builder.add_class(caller);
        let program = builder.commit().unwrap();

        assert!(matches!(
            rebind(&program),
            Err(Error::BrokenReference { .. })
        ));
    }

    #[test]
    fn test_external_reference_stays_opaque() {
        let mut builder = Program::builder();
        let mut caller = ClassDef::new(ClassId::new("Caller"), ClassKind::Class, Visibility::Public);
        caller.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Caller"), "run", "()V"),
            MethodKind::Static,
            Visibility::Public,
            Some(MethodBody::new(
                0,
                0,
                vec![
                    Instruction::Invoke {
                        kind: InvokeKind::Static,
                        method: MethodRef::new(MethodId::new(
                            ClassId::new("lib/Console"),
                            "println",
                            "(Ljava/lang/String;)V",
                        )),
                        args: vec![],
                        dest: None,
                    },
                    ret(),
                ],
            )),
        ));
        builder.add_class(caller);
        builder.declare_external(ClassId::new("lib/Console"));
        let program = builder.commit().unwrap();

        let rebound = rebind(&program).unwrap();
        let class = rebound.program.class(&ClassId::new("Caller")).unwrap();
        let body = class.methods[0].body.as_ref().unwrap();
        let Instruction::Invoke { method, .. } = &body.instructions[0] else {
            panic!("expected invoke");
        };
        assert_eq!(method.resolution, Resolution::External);
    }

    #[test]
    fn test_field_rebinds_to_declaring_class() {
        let mut builder = Program::builder();

        let mut base = ClassDef::new(ClassId::new("Base"), ClassKind::Class, Visibility::Public);
        base.fields.push(FieldDef::new(
            FieldId::new(ClassId::new("Base"), "count", "I"),
            FieldKind::Instance,
            Visibility::Protected,
        ));

        let mut derived = ClassDef::new(ClassId::new("Derived"), ClassKind::Class, Visibility::Public);
        derived.superclass = Some(ClassId::new("Base"));
        derived.methods.push(MethodDef::new(
            MethodId::new(ClassId::new("Derived"), "get", "()I"),
            MethodKind::Virtual,
            Visibility::Public,
            Some(MethodBody::new(
                1,
                2,
                vec![
                    Instruction::GetField {
                        field: crate::model::FieldRef::new(FieldId::new(
                            ClassId::new("Derived"),
                            "count",
                            "I",
                        )),
                        object: Some(Local(0)),
                        dest: Local(1),
                    },
                    Instruction::Return { value: Some(Local(1)) },
                ],
            )),
        ));

        builder.add_class(base);
        builder.add_class(derived);
        let program = builder.commit().unwrap();

        let rebound = rebind(&program).unwrap();
        let class = rebound.program.class(&ClassId::new("Derived")).unwrap();
        let body = class.methods[0].body.as_ref().unwrap();
        let Instruction::GetField { field, .. } = &body.instructions[0] else {
            panic!("expected getfield");
        };
        assert_eq!(
            field.resolution,
            Resolution::Internal(FieldId::new(ClassId::new("Base"), "count", "I"))
        );
    }
}
