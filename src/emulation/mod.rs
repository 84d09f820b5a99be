//! Deterministic execution simulation over the logical instruction model.
//!
//! Behavior preservation is a property of the pipeline, so it needs an oracle:
//! this module evaluates a modeled program from an entry method and records its
//! observable output, without any real runtime. Observability is defined at the
//! closed-world boundary: every invoke that resolves to an external class is a
//! sink, and the rendered call with its argument values is appended to the
//! output transcript. Running the same fixture before and after a
//! transformation and comparing transcripts decides equivalence.
//!
//! The simulator is bounded by an instruction budget and treats runtime faults
//! (null receivers, failed casts, missing bodies) as simulation errors, never
//! as pipeline errors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{
    ClassId, ConstValue, FieldId, FieldRef, Instruction, InvokeKind, MethodId, Program, Resolution,
};
use crate::{Error, Result};

/// A runtime value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Value {
    /// The null reference.
    Null,
    /// An integer.
    Int(i64),
    /// A string.
    Str(Arc<str>),
    /// A heap reference.
    Object(usize),
    /// A class object, as produced by a class-object read.
    Class(ClassId),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Object(idx) => write!(f, "@{idx}"),
            Value::Class(id) => write!(f, "class {id}"),
        }
    }
}

/// One allocated instance.
#[derive(Clone, Debug)]
struct HeapObject {
    class: ClassId,
    fields: BTreeMap<FieldId, Value>,
}

/// Runs a static entry method with no arguments and returns the transcript of
/// external calls.
///
/// # Errors
///
/// Returns [`Error::Simulation`] on runtime faults or when the instruction
/// budget runs out.
pub fn simulate(program: &Program, entry: &MethodId, fuel: u64) -> Result<Vec<String>> {
    let mut machine = Machine {
        program,
        heap: Vec::new(),
        statics: BTreeMap::new(),
        output: Vec::new(),
        fuel,
    };
    machine.call(entry, Vec::new())?;
    Ok(machine.output)
}

struct Machine<'p> {
    program: &'p Program,
    heap: Vec<HeapObject>,
    statics: BTreeMap<FieldId, Value>,
    output: Vec<String>,
    fuel: u64,
}

impl Machine<'_> {
    fn call(&mut self, method_id: &MethodId, args: Vec<Value>) -> Result<Option<Value>> {
        let Some(method) = self.program.method(method_id) else {
            return Err(Error::Simulation(format!("no declaration for {method_id}")));
        };
        let Some(body) = &method.body else {
            return Err(Error::Simulation(format!("{method_id} has no body")));
        };

        let mut frame = vec![Value::Null; body.locals as usize];
        for (slot, value) in args.into_iter().enumerate() {
            frame[slot] = value;
        }

        for instr in &body.instructions {
            if self.fuel == 0 {
                return Err(Error::Simulation("instruction budget exhausted".into()));
            }
            self.fuel -= 1;

            match instr {
                Instruction::Const { dest, value } => {
                    frame[dest.0 as usize] = match value {
                        ConstValue::Null => Value::Null,
                        ConstValue::Int(v) => Value::Int(*v),
                        ConstValue::Str(s) => Value::Str(s.clone()),
                    };
                }
                Instruction::Move { dest, src } => {
                    frame[dest.0 as usize] = frame[src.0 as usize].clone();
                }
                Instruction::NewInstance { dest, class } => {
                    self.heap.push(HeapObject {
                        class: class.clone(),
                        fields: BTreeMap::new(),
                    });
                    frame[dest.0 as usize] = Value::Object(self.heap.len() - 1);
                }
                Instruction::Invoke { kind, method: mref, args, dest } => {
                    let argv: Vec<Value> =
                        args.iter().map(|a| frame[a.0 as usize].clone()).collect();
                    let result = self.invoke(*kind, mref, argv)?;
                    if let Some(dest) = dest {
                        frame[dest.0 as usize] = result.unwrap_or(Value::Null);
                    }
                }
                Instruction::GetField { field, object, dest } => {
                    frame[dest.0 as usize] = self.get_field(field, object.map(|o| frame[o.0 as usize].clone()))?;
                }
                Instruction::PutField { field, object, value } => {
                    let stored = frame[value.0 as usize].clone();
                    self.put_field(field, object.map(|o| frame[o.0 as usize].clone()), stored)?;
                }
                Instruction::InstanceOf { dest, object, class } => {
                    let result = match &frame[object.0 as usize] {
                        Value::Object(idx) => {
                            i64::from(self.program.is_subtype(&self.heap[*idx].class, class))
                        }
                        _ => 0,
                    };
                    frame[dest.0 as usize] = Value::Int(result);
                }
                Instruction::CheckCast { object, class } => {
                    if let Value::Object(idx) = &frame[object.0 as usize] {
                        let runtime = &self.heap[*idx].class;
                        if !self.program.is_subtype(runtime, class) {
                            return Err(Error::Simulation(format!(
                                "cannot cast {runtime} to {class}"
                            )));
                        }
                    }
                }
                Instruction::GetClass { dest, object } => {
                    let Value::Object(idx) = &frame[object.0 as usize] else {
                        return Err(Error::Simulation("class read on null receiver".into()));
                    };
                    frame[dest.0 as usize] = Value::Class(self.heap[*idx].class.clone());
                }
                Instruction::NullCheck { object } => {
                    if frame[object.0 as usize] == Value::Null {
                        return Err(Error::Simulation("null receiver".into()));
                    }
                }
                Instruction::Return { value } => {
                    return Ok(value.map(|v| frame[v.0 as usize].clone()));
                }
                Instruction::Throw { .. } => {
                    return Err(Error::Simulation(format!("{method_id} threw")));
                }
            }
        }
        Ok(None)
    }

    /// Resolves and executes one invoke under static semantics: direct and
    /// static calls resolve from the written owner, dispatched calls from the
    /// receiver's runtime class. External targets are observable sinks.
    fn invoke(
        &mut self,
        kind: InvokeKind,
        mref: &crate::model::MethodRef,
        argv: Vec<Value>,
    ) -> Result<Option<Value>> {
        let sig = mref.target.sig();
        let start = match kind {
            InvokeKind::Static | InvokeKind::Direct => mref.target.owner.clone(),
            InvokeKind::Virtual | InvokeKind::Interface => {
                match argv.first() {
                    Some(Value::Object(idx)) => self.heap[*idx].class.clone(),
                    Some(Value::Null) | None => {
                        return Err(Error::Simulation(format!(
                            "null receiver for {}",
                            mref.target
                        )));
                    }
                    Some(other) => {
                        return Err(Error::Simulation(format!(
                            "non-reference receiver {other} for {}",
                            mref.target
                        )));
                    }
                }
            }
        };

        match self.program.lookup_method(&start, &sig) {
            Resolution::Internal(target) => self.call(&target, argv),
            Resolution::External => {
                let rendered: Vec<String> = argv.iter().map(ToString::to_string).collect();
                self.output.push(format!(
                    "{}.{}({})",
                    mref.target.owner,
                    mref.target.name,
                    rendered.join(", ")
                ));
                Ok(Some(Value::Null))
            }
            Resolution::Unresolved => Err(Error::Simulation(format!(
                "{} does not resolve from {start}",
                mref.target
            ))),
        }
    }

    fn get_field(&mut self, field: &FieldRef, receiver: Option<Value>) -> Result<Value> {
        let id = self.resolve_field(field)?;
        match receiver {
            None => Ok(self
                .statics
                .get(&id)
                .cloned()
                .unwrap_or_else(|| default_value(&id))),
            Some(Value::Object(idx)) => Ok(self.heap[idx]
                .fields
                .get(&id)
                .cloned()
                .unwrap_or_else(|| default_value(&id))),
            Some(Value::Null) => Err(Error::Simulation(format!("field read on null: {id}"))),
            Some(other) => Err(Error::Simulation(format!(
                "field read on non-reference {other}"
            ))),
        }
    }

    fn put_field(&mut self, field: &FieldRef, receiver: Option<Value>, value: Value) -> Result<()> {
        let id = self.resolve_field(field)?;
        match receiver {
            None => {
                self.statics.insert(id, value);
                Ok(())
            }
            Some(Value::Object(idx)) => {
                self.heap[idx].fields.insert(id, value);
                Ok(())
            }
            Some(Value::Null) => Err(Error::Simulation(format!("field write on null: {id}"))),
            Some(other) => Err(Error::Simulation(format!(
                "field write on non-reference {other}"
            ))),
        }
    }

    fn resolve_field(&self, field: &FieldRef) -> Result<FieldId> {
        match self.program.lookup_field(
            &field.target.owner,
            &field.target.name,
            &field.target.type_name,
        ) {
            Resolution::Internal(id) => Ok(id),
            Resolution::External => Ok(field.target.clone()),
            Resolution::Unresolved => Err(Error::Simulation(format!(
                "field {} does not resolve",
                field.target
            ))),
        }
    }
}

/// Default value for an uninitialized field slot.
fn default_value(id: &FieldId) -> Value {
    match &*id.type_name {
        "I" | "J" | "Z" | "B" | "S" | "C" => Value::Int(0),
        _ => Value::Null,
    }
}
