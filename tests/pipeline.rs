//! Full-pipeline properties: fixed point, dispatch preservation, rename-map
//! totality and directive monotonicity.

mod common;

use classforge::model::dispatch_targets;
use classforge::prelude::*;
use common::*;

/// A small application: an interface with a default method, a two-class
/// hierarchy behind it, a helper worth inlining and a dead class.
fn application() -> Program {
    let mut builder = Program::builder();

    let mut greeter = interface("Greeter");
    greeter.methods.push(MethodDef::new(
        MethodId::new(ClassId::new("Greeter"), "greet", "()V"),
        MethodKind::Virtual,
        Visibility::Public,
        Some(MethodBody::new(
            1,
            2,
            vec![str_const(Local(1), "hi"), println(Local(1)), ret()],
        )),
    ));

    let mut base = class("Base");
    base.interfaces.push(ClassId::new("Greeter"));
    base.methods.push(constructor("Base", 1, vec![ret()]));
    base.methods.push(virtual_method("Base", "work", "()V", 1, vec![ret()]));

    let mut sub = class("Sub");
    sub.superclass = Some(ClassId::new("Base"));
    sub.methods.push(constructor(
        "Sub",
        1,
        vec![invoke_direct("Base", "<init>", "()V", vec![Local(0)]), ret()],
    ));
    sub.methods.push(virtual_method("Sub", "work", "()V", 1, vec![ret()]));

    let mut helper = class("Helper");
    helper.methods.push(static_method(
        "Helper",
        "text",
        "()Ljava/lang/String;",
        1,
        vec![
            str_const(Local(0), "from-helper"),
            Instruction::Return { value: Some(Local(0)) },
        ],
    ));

    let mut main = class("Main");
    main.methods.push(static_method(
        "Main",
        "entry",
        "()V",
        3,
        vec![
            Instruction::NewInstance {
                dest: Local(0),
                class: ClassId::new("Sub"),
            },
            invoke_direct("Sub", "<init>", "()V", vec![Local(0)]),
            invoke_virtual("Base", "work", "()V", vec![Local(0)], None),
            Instruction::Invoke {
                kind: InvokeKind::Interface,
                method: MethodRef::new(MethodId::new(ClassId::new("Greeter"), "greet", "()V")),
                args: vec![Local(0)],
                dest: None,
            },
            invoke_static("Helper", "text", "()Ljava/lang/String;", vec![], Some(Local(1))),
            println(Local(1)),
            ret(),
        ],
    ));

    builder.add_class(greeter);
    builder.add_class(base);
    builder.add_class(sub);
    builder.add_class(helper);
    builder.add_class(main);
    builder.add_class(class("Dead"));
    builder.declare_external(ClassId::new(CONSOLE));
    builder.commit().unwrap()
}

#[test]
fn full_run_converges_within_the_iteration_bound() {
    let program = application();
    let result = Pipeline::default()
        .run(&program, &[root_of("Main", "entry", "()V")])
        .unwrap();
    assert!(result.iterations <= 10);
    assert!(result.removed.classes.contains(&ClassId::new("Dead")));
}

#[test]
fn dispatch_sets_survive_the_whole_run() {
    let program = application();

    // Resolvable targets for the polymorphic call, captured before.
    let before = dispatch_targets(
        &program,
        &ClassId::new("Base"),
        &MethodSig::new("work", "()V"),
    );
    assert_eq!(before.len(), 2);

    // Renaming and merging off so identities can be compared directly; the
    // merge passes' translated preservation is covered by their own suite.
    let result = Pipeline::new(PipelineConfig {
        enable_renaming: false,
        enable_vertical_merging: false,
        enable_horizontal_merging: false,
        ..PipelineConfig::default()
    })
    .run(&program, &[root_of("Main", "entry", "()V")])
    .unwrap();

    let after = dispatch_targets(
        &result.program,
        &ClassId::new("Base"),
        &MethodSig::new("work", "()V"),
    );
    assert_eq!(before, after);
}

#[test]
fn rename_map_is_total_and_injective_over_live_entities() {
    let program = application();
    let result = Pipeline::default()
        .run(&program, &[root_of("Main", "entry", "()V")])
        .unwrap();

    assert!(result.rename_map.is_injective());

    // Totality: every new identity in the map names a declaration in the
    // output program, and every output declaration is a map target.
    for new_class in result.rename_map.classes.values() {
        assert!(result.program.class(new_class).is_some());
    }
    for class in result.program.classes() {
        assert!(
            result.rename_map.classes.values().any(|c| c == &class.id),
            "class {} missing from the rename map",
            class.id
        );
        for method in &class.methods {
            assert!(
                result.rename_map.methods.values().any(|m| m == &method.id),
                "method {} missing from the rename map",
                method.id
            );
        }
    }
}

#[test]
fn no_rename_entities_keep_their_names() {
    let program = application();
    let directives = [
        root_of("Main", "entry", "()V"),
        Directive::forbid(ClassId::new("Main"), Constraint::NoRename),
    ];
    let result = Pipeline::default().run(&program, &directives).unwrap();

    assert!(result.program.class(&ClassId::new("Main")).is_some());
    // Class-level no-rename propagated to the entry method.
    let main = result.program.class(&ClassId::new("Main")).unwrap();
    assert!(main
        .methods
        .iter()
        .any(|m| &*m.id.name == "entry"));
}

#[test]
fn events_record_inline_and_merge_decisions() {
    let program = application();
    let result = Pipeline::new(PipelineConfig {
        enable_renaming: false,
        ..PipelineConfig::default()
    })
    .run(&program, &[root_of("Main", "entry", "()V")])
    .unwrap();

    // The helper call is inlined; the polymorphic work call is declined.
    assert!(result.events.count_of(EventKind::Inlined) >= 1);
    assert!(result.events.count_of(EventKind::NotInlined) >= 1);

    let snapshot = result.events.snapshot();
    assert!(!snapshot.is_empty());
    // Deterministic ordering: kinds ascend.
    for window in snapshot.windows(2) {
        assert!(window[0].kind <= window[1].kind);
    }
}
