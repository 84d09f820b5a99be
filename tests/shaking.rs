//! Reachability shaking through the public pipeline surface.

mod common;

use classforge::prelude::*;
use classforge::reachability::shake;
use common::*;

/// Main.entry uses Used; Unused and a dead method on Used are unreferenced.
fn shaking_program() -> Program {
    let mut builder = Program::builder();

    let mut main = class("Main");
    main.methods.push(static_method(
        "Main",
        "entry",
        "()V",
        0,
        vec![invoke_static("Used", "helper", "()V", vec![], None), ret()],
    ));

    let mut used = class("Used");
    used.methods.push(static_method("Used", "helper", "()V", 0, vec![ret()]));
    used.methods.push(static_method("Used", "dead", "()V", 0, vec![ret()]));

    let mut unused = class("Unused");
    unused.methods.push(static_method("Unused", "dead", "()V", 0, vec![ret()]));

    builder.add_class(main);
    builder.add_class(used);
    builder.add_class(unused);
    builder.commit().unwrap()
}

#[test]
fn unreferenced_entities_are_removed() {
    let program = shaking_program();
    let result = Pipeline::new(PipelineConfig {
        enable_renaming: false,
        ..PipelineConfig::default()
    })
    .run(&program, &[root_of("Main", "entry", "()V")])
    .unwrap();

    assert!(result.program.class(&ClassId::new("Main")).is_some());
    assert!(result.program.class(&ClassId::new("Unused")).is_none());
    assert!(result.removed.classes.contains(&ClassId::new("Unused")));
    assert!(result
        .removed
        .methods
        .contains(&MethodId::new(ClassId::new("Used"), "dead", "()V")));
}

#[test]
fn removal_report_matches_model_difference() {
    let program = shaking_program();

    // Stamp the root directive, then shake directly.
    let resolved = classforge::directives::resolve(&program, &[root_of("Main", "entry", "()V")])
        .unwrap();
    let outcome = shake(&resolved).unwrap();

    for class in program.classes() {
        let kept = outcome.program.class(&class.id).is_some();
        let reported_removed = outcome.removed.classes.contains(&class.id);
        assert_ne!(kept, reported_removed, "class {} double-counted", class.id);
    }
}

#[test]
fn shake_is_idempotent_on_its_own_output() {
    let program = shaking_program();
    let resolved = classforge::directives::resolve(&program, &[root_of("Main", "entry", "()V")])
        .unwrap();

    let first = shake(&resolved).unwrap();
    let second = shake(&first.program).unwrap();
    assert!(second.removed.is_empty());
    assert_eq!(first.program.class_ids(), second.program.class_ids());
}

#[test]
fn pinned_class_survives_without_references() {
    let mut builder = Program::builder();
    let mut main = class("Main");
    main.methods.push(static_method("Main", "entry", "()V", 0, vec![ret()]));
    builder.add_class(main);
    builder.add_class(class("Island"));
    let program = builder.commit().unwrap();

    let directives = [
        root_of("Main", "entry", "()V"),
        Directive::forbid(ClassId::new("Island"), Constraint::Pinned),
    ];
    let result = Pipeline::new(PipelineConfig {
        enable_renaming: false,
        ..PipelineConfig::default()
    })
    .run(&program, &directives)
    .unwrap();

    assert!(result.program.class(&ClassId::new("Island")).is_some());
}

#[test]
fn virtual_dispatch_keeps_overrides_of_live_subtypes() {
    let mut builder = Program::builder();

    let mut base = class("Base");
    base.methods.push(virtual_method("Base", "work", "()V", 1, vec![ret()]));
    let mut sub = class("Sub");
    sub.superclass = Some(ClassId::new("Base"));
    sub.methods.push(virtual_method("Sub", "work", "()V", 1, vec![ret()]));
    sub.methods.push(constructor("Sub", 1, vec![ret()]));

    let mut main = class("Main");
    main.methods.push(static_method(
        "Main",
        "entry",
        "()V",
        1,
        vec![
            Instruction::NewInstance {
                dest: Local(0),
                class: ClassId::new("Sub"),
            },
            invoke_direct("Sub", "<init>", "()V", vec![Local(0)]),
            invoke_virtual("Base", "work", "()V", vec![Local(0)], None),
            ret(),
        ],
    ));

    builder.add_class(base);
    builder.add_class(sub);
    builder.add_class(main);
    let program = builder.commit().unwrap();

    let resolved = classforge::directives::resolve(&program, &[root_of("Main", "entry", "()V")])
        .unwrap();
    let outcome = shake(&resolved).unwrap();

    assert!(outcome
        .live
        .method_live(&MethodId::new(ClassId::new("Sub"), "work", "()V")));
    assert!(outcome
        .live
        .method_live(&MethodId::new(ClassId::new("Base"), "work", "()V")));
}
