//! Shared fixture builders for the integration suites.
//!
//! Fixtures are tiny modeled programs built through the public builder API,
//! the same way the external parser collaborator would feed the pipeline.
#![allow(dead_code)]

use classforge::prelude::*;

/// The external print sink every fixture observes through.
pub const CONSOLE: &str = "lib/Console";

pub fn ret() -> Instruction {
    Instruction::Return { value: None }
}

pub fn class(name: &str) -> ClassDef {
    ClassDef::new(ClassId::new(name), ClassKind::Class, Visibility::Public)
}

pub fn interface(name: &str) -> ClassDef {
    ClassDef::new(ClassId::new(name), ClassKind::Interface, Visibility::Public)
}

pub fn static_method(owner: &str, name: &str, descriptor: &str, locals: u32, instructions: Vec<Instruction>) -> MethodDef {
    MethodDef::new(
        MethodId::new(ClassId::new(owner), name, descriptor),
        MethodKind::Static,
        Visibility::Public,
        Some(MethodBody::new(0, locals, instructions)),
    )
}

pub fn virtual_method(owner: &str, name: &str, descriptor: &str, locals: u32, instructions: Vec<Instruction>) -> MethodDef {
    MethodDef::new(
        MethodId::new(ClassId::new(owner), name, descriptor),
        MethodKind::Virtual,
        Visibility::Public,
        Some(MethodBody::new(1, locals, instructions)),
    )
}

pub fn constructor(owner: &str, locals: u32, instructions: Vec<Instruction>) -> MethodDef {
    MethodDef::new(
        MethodId::new(ClassId::new(owner), "<init>", "()V"),
        MethodKind::Constructor,
        Visibility::Public,
        Some(MethodBody::new(1, locals, instructions)),
    )
}

pub fn invoke_static(owner: &str, name: &str, descriptor: &str, args: Vec<Local>, dest: Option<Local>) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Static,
        method: MethodRef::new(MethodId::new(ClassId::new(owner), name, descriptor)),
        args,
        dest,
    }
}

pub fn invoke_virtual(owner: &str, name: &str, descriptor: &str, args: Vec<Local>, dest: Option<Local>) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Virtual,
        method: MethodRef::new(MethodId::new(ClassId::new(owner), name, descriptor)),
        args,
        dest,
    }
}

pub fn invoke_direct(owner: &str, name: &str, descriptor: &str, args: Vec<Local>) -> Instruction {
    Instruction::Invoke {
        kind: InvokeKind::Direct,
        method: MethodRef::new(MethodId::new(ClassId::new(owner), name, descriptor)),
        args,
        dest: None,
    }
}

/// `lib/Console.println(<arg>)`, the observable output of every fixture.
pub fn println(arg: Local) -> Instruction {
    invoke_static(CONSOLE, "println", "(Ljava/lang/String;)V", vec![arg], None)
}

pub fn str_const(dest: Local, value: &str) -> Instruction {
    Instruction::Const {
        dest,
        value: ConstValue::Str(value.into()),
    }
}

/// Marks a static method as the program entry point.
pub fn root_of(owner: &str, name: &str, descriptor: &str) -> Directive {
    Directive::forbid(
        MethodId::new(ClassId::new(owner), name, descriptor),
        Constraint::Root,
    )
}
