// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode interpreter.

use super::{NativeFn, Result, Value, VmError};
use crate::assembly::{Module, trampoline};
use crate::compiler::bytecode::{Instruction, OpCode};
use crate::options::VmOptions;
use crate::types::{ARRAY_PAYLOAD_FIELD, PrimitiveKind, Type};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Instructions executed, trampoline included
    pub steps: u64,
    /// Value left above the exit slot, if any
    pub value: Option<Value>,
}

/// Default value of a slot of type `ty`.
pub(crate) fn default_for_type(ty: &Type) -> Value {
    match ty {
        Type::Array(element) => Value::array(element.id(), element.size(), Vec::new()),
        other => default_for_kind(other.kind()),
    }
}

fn default_for_kind(kind: PrimitiveKind) -> Value {
    match kind {
        PrimitiveKind::Boolean => Value::Boolean(false),
        PrimitiveKind::Byte | PrimitiveKind::Int16 | PrimitiveKind::Int32 | PrimitiveKind::Int64 => {
            Value::Int(0)
        }
        PrimitiveKind::Single | PrimitiveKind::Double => Value::Double(0.0),
        PrimitiveKind::String => Value::string(""),
        PrimitiveKind::Array => Value::array(Type::Empty.id(), 0, Vec::new()),
        PrimitiveKind::Struct | PrimitiveKind::Empty => Value::Empty,
    }
}

/// A call frame. The trampoline runs in a frame with no function.
struct Frame {
    function: Option<usize>,
    ip: usize,
    locals: Vec<Value>,
    stack_base: usize,
}

/// A stack machine bound to one module.
pub struct Machine<'m> {
    module: &'m Module,
    functions: FxHashMap<u32, usize>,
    boot: [Instruction; 3],
    natives: Vec<NativeFn>,
    globals: Vec<Value>,
    max_steps: u64,
    stack: Vec<Value>,
    frames: Vec<Frame>,
}

impl<'m> Machine<'m> {
    /// Creates a machine with no natives and no globals.
    pub fn new(module: &'m Module, options: &VmOptions) -> Self {
        Self {
            module,
            functions: module
                .functions
                .iter()
                .enumerate()
                .map(|(index, f)| (f.id, index))
                .collect(),
            boot: trampoline(module.entry_point),
            natives: Vec::new(),
            globals: Vec::new(),
            max_steps: options.max_steps,
            stack: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Replaces the native table.
    pub fn with_natives(mut self, natives: Vec<NativeFn>) -> Self {
        self.natives = natives;
        self
    }

    /// Appends one native; its index is the number of natives before it.
    pub fn with_native(
        mut self,
        native: impl FnMut(&[Value]) -> Result<Option<Value>> + 'static,
    ) -> Self {
        self.natives.push(Box::new(native));
        self
    }

    /// Sets the initial global values.
    pub fn with_globals(mut self, globals: Vec<Value>) -> Self {
        self.globals = globals;
        self
    }

    /// Current global values.
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Runs the module from its trampoline until `Halt`.
    pub fn run(&mut self) -> Result<Outcome> {
        self.stack.clear();
        self.frames.clear();
        self.frames.push(Frame {
            function: None,
            ip: 0,
            locals: Vec::new(),
            stack_base: 0,
        });
        debug!(module = %self.module.name, entry = self.module.entry_point, "run started");

        let mut steps = 0u64;
        loop {
            steps += 1;
            if steps > self.max_steps {
                return Err(VmError::StepLimit(self.max_steps));
            }
            let (instruction, at) = self.fetch()?;
            trace!(at, %instruction, depth = self.frames.len(), "step");
            if instruction.opcode == OpCode::Halt {
                let value = if self.stack.len() > 1 { self.stack.pop() } else { None };
                debug!(steps, "run finished");
                return Ok(Outcome { steps, value });
            }
            self.execute(instruction, at)?;
        }
    }

    fn fetch(&mut self) -> Result<(Instruction, usize)> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| VmError::StackUnderflow("frames".to_string()))?;
        let at = frame.ip;
        let function = frame.function;
        let code = match function {
            None => &self.boot[..],
            Some(index) => &self.module.functions[index].code[..],
        };
        let Some(&instruction) = code.get(at) else {
            return Err(VmError::FellOffEnd(self.function_name(function)));
        };
        frame.ip += 1;
        Ok((instruction, at))
    }

    fn function_name(&self, function: Option<usize>) -> String {
        match function {
            None => "<trampoline>".to_string(),
            Some(index) => self.module.functions[index].name.clone(),
        }
    }

    fn frame(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::StackUnderflow("frames".to_string()))
    }

    // ========================================================================
    // Stack
    // ========================================================================

    fn pop(&mut self, op: OpCode) -> Result<Value> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() <= base {
            return Err(VmError::StackUnderflow(op.name().to_string()));
        }
        self.stack
            .pop()
            .ok_or_else(|| VmError::StackUnderflow(op.name().to_string()))
    }

    fn pop_n(&mut self, n: usize, op: OpCode) -> Result<Vec<Value>> {
        let base = self.frames.last().map_or(0, |f| f.stack_base);
        if self.stack.len() < base + n {
            return Err(VmError::StackUnderflow(op.name().to_string()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn pop_double(&mut self, op: OpCode) -> Result<f64> {
        let value = self.pop(op)?;
        value.as_double().ok_or(VmError::TypeMismatch {
            op: op.name(),
            expected: "number",
            found: value.type_name(),
        })
    }

    fn pop_bool(&mut self, op: OpCode) -> Result<bool> {
        let value = self.pop(op)?;
        value.as_bool().ok_or(VmError::TypeMismatch {
            op: op.name(),
            expected: "boolean",
            found: value.type_name(),
        })
    }

    fn pop_int(&mut self, op: OpCode) -> Result<i64> {
        match self.pop(op)? {
            Value::Int(i) => Ok(i),
            other => Err(VmError::TypeMismatch {
                op: op.name(),
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    fn default_for_id(&self, id: i64) -> Result<Value> {
        let def = u32::try_from(id)
            .ok()
            .and_then(|id| self.module.type_def(id))
            .ok_or(VmError::UnknownEntry { what: "type", index: id })?;
        Ok(default_for_kind(def.kind))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute(&mut self, instruction: Instruction, at: usize) -> Result<()> {
        let op = instruction.opcode;
        let a = instruction.a();
        let b = instruction.b();
        match op {
            OpCode::Nop | OpCode::Halt => {}

            OpCode::LoadConst => {
                let constant = usize::try_from(a)
                    .ok()
                    .and_then(|id| self.module.constants.get(id))
                    .ok_or(VmError::UnknownEntry {
                        what: "constant",
                        index: a.into(),
                    })?;
                self.stack.push(Value::from(constant));
            }
            OpCode::LoadLocal => {
                let value = usize::try_from(a)
                    .ok()
                    .and_then(|slot| self.frames.last()?.locals.get(slot).cloned())
                    .ok_or(VmError::UnknownEntry {
                        what: "local",
                        index: a.into(),
                    })?;
                self.stack.push(value);
            }
            OpCode::StoreLocal => {
                let value = self.pop(op)?;
                let index = usize::try_from(a).map_err(|_| unknown("local", a))?;
                let slot = self
                    .frame()?
                    .locals
                    .get_mut(index)
                    .ok_or_else(|| unknown("local", a))?;
                *slot = value;
            }
            OpCode::LoadGlobal => {
                let value = usize::try_from(a)
                    .ok()
                    .and_then(|index| self.globals.get(index).cloned())
                    .ok_or(VmError::UnknownEntry {
                        what: "global",
                        index: a.into(),
                    })?;
                self.stack.push(value);
            }
            OpCode::StoreGlobal => {
                let value = self.pop(op)?;
                let index = usize::try_from(a).map_err(|_| unknown("global", a))?;
                let global = self
                    .globals
                    .get_mut(index)
                    .ok_or_else(|| unknown("global", a))?;
                *global = value;
            }
            OpCode::PushInt => self.stack.push(Value::Int(a.into())),
            OpCode::PushDefault => {
                let value = self.default_for_id(a.into())?;
                self.stack.push(value);
            }
            OpCode::Pop => {
                self.pop(op)?;
            }
            OpCode::Dup => {
                let value = self.pop(op)?;
                self.stack.push(value.clone());
                self.stack.push(value);
            }

            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod => {
                let rhs = self.pop_double(op)?;
                let lhs = self.pop_double(op)?;
                let result = match op {
                    OpCode::Add => lhs + rhs,
                    OpCode::Sub => lhs - rhs,
                    OpCode::Mul => lhs * rhs,
                    OpCode::Div => lhs / rhs,
                    _ => lhs % rhs,
                };
                self.stack.push(Value::Double(result));
            }
            OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge => {
                let rhs = self.pop_double(op)?;
                let lhs = self.pop_double(op)?;
                let result = match op {
                    OpCode::Lt => lhs < rhs,
                    OpCode::Gt => lhs > rhs,
                    OpCode::Le => lhs <= rhs,
                    _ => lhs >= rhs,
                };
                self.stack.push(Value::Boolean(result));
            }
            OpCode::Eq => {
                let rhs = self.pop(op)?;
                let lhs = self.pop(op)?;
                for side in [&lhs, &rhs] {
                    if matches!(side, Value::Array(_) | Value::Address { .. }) {
                        return Err(VmError::TypeMismatch {
                            op: op.name(),
                            expected: "scalar",
                            found: side.type_name(),
                        });
                    }
                }
                self.stack.push(Value::Boolean(lhs == rhs));
            }
            OpCode::And | OpCode::Or => {
                let rhs = self.pop_bool(op)?;
                let lhs = self.pop_bool(op)?;
                let result = if op == OpCode::And { lhs && rhs } else { lhs || rhs };
                self.stack.push(Value::Boolean(result));
            }

            OpCode::ToInt => {
                let value = self.pop_double(op)?;
                self.stack.push(Value::Int(value.trunc() as i64));
            }
            OpCode::IMul => {
                let rhs = self.pop_int(op)?;
                let lhs = self.pop_int(op)?;
                self.stack.push(Value::Int(lhs.wrapping_mul(rhs)));
            }
            OpCode::IAdd => {
                let rhs = self.pop_int(op)?;
                let result = match self.pop(op)? {
                    Value::Int(lhs) => Value::Int(lhs.wrapping_add(rhs)),
                    Value::Array(array) => Value::Address { array, offset: rhs },
                    Value::Address { array, offset } => Value::Address {
                        array,
                        offset: offset + rhs,
                    },
                    other => {
                        return Err(VmError::TypeMismatch {
                            op: op.name(),
                            expected: "integer or array",
                            found: other.type_name(),
                        });
                    }
                };
                self.stack.push(result);
            }

            OpCode::NewArray => {
                let count = usize::try_from(a).map_err(|_| VmError::UnknownEntry {
                    what: "array length",
                    index: a.into(),
                })?;
                let elements = self.pop_n(count, op)?;
                let stride = u32::try_from(b)
                    .ok()
                    .and_then(|id| self.module.type_def(id))
                    .map(|def| def.size)
                    .ok_or(VmError::UnknownEntry {
                        what: "type",
                        index: b.into(),
                    })?;
                self.stack.push(Value::array(b as u32, stride, elements));
            }
            OpCode::Length => match self.pop(op)? {
                Value::Array(array) => {
                    let len = array.borrow().elements.len();
                    self.stack.push(Value::Double(len as f64));
                }
                other => {
                    return Err(VmError::TypeMismatch {
                        op: op.name(),
                        expected: "array",
                        found: other.type_name(),
                    });
                }
            },
            OpCode::GetField => {
                let address = self.pop(op)?;
                let (array, index) = element(op, address, a, b)?;
                let value = array.borrow().elements[index].clone();
                self.stack.push(value);
            }
            OpCode::SetField => {
                let value = self.pop(op)?;
                let address = self.pop(op)?;
                let (array, index) = element(op, address, a, b)?;
                array.borrow_mut().elements[index] = value.clone();
                self.stack.push(value);
            }

            OpCode::Jump => self.jump(at, a)?,
            OpCode::JumpIfFalse => {
                if !self.pop_bool(op)? {
                    self.jump(at, a)?;
                }
            }
            OpCode::JumpIfTrue => {
                if self.pop_bool(op)? {
                    self.jump(at, a)?;
                }
            }

            OpCode::Call => self.call(a, b)?,
            OpCode::CallNative => {
                let argc = usize::try_from(b).unwrap_or(usize::MAX);
                let args = self.pop_n(argc, op)?;
                let index = usize::try_from(a).map_err(|_| unknown("native", a))?;
                let native = self
                    .natives
                    .get_mut(index)
                    .ok_or_else(|| unknown("native", a))?;
                if let Some(result) = native(&args)? {
                    self.stack.push(result);
                }
            }
            OpCode::Ret => self.ret(a)?,
        }
        Ok(())
    }

    fn jump(&mut self, at: usize, delta: i32) -> Result<()> {
        let target = usize::try_from(at as i64 + i64::from(delta)).map_err(|_| {
            VmError::UnknownEntry {
                what: "jump target",
                index: at as i64 + i64::from(delta),
            }
        })?;
        self.frame()?.ip = target;
        Ok(())
    }

    fn call(&mut self, id: i32, argc: i32) -> Result<()> {
        let module = self.module;
        let index = u32::try_from(id)
            .ok()
            .and_then(|id| self.functions.get(&id).copied())
            .ok_or(VmError::UnknownEntry {
                what: "function",
                index: id.into(),
            })?;
        let function = &module.functions[index];
        let argc = usize::try_from(argc).unwrap_or(usize::MAX);
        if argc != function.param_count as usize {
            return Err(VmError::ArityMismatch {
                function: function.name.clone(),
                expected: function.param_count as usize,
                found: argc,
            });
        }
        let mut locals = self.pop_n(argc, OpCode::Call)?;
        for slot in function.variables.iter().skip(argc) {
            locals.push(self.default_for_id(slot.type_id.into())?);
        }
        self.frames.push(Frame {
            function: Some(index),
            ip: 0,
            locals,
            stack_base: self.stack.len(),
        });
        Ok(())
    }

    fn ret(&mut self, count: i32) -> Result<()> {
        let value = if count == 1 {
            Some(self.pop(OpCode::Ret)?)
        } else {
            None
        };
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::StackUnderflow(OpCode::Ret.name().to_string()))?;
        let Some(index) = frame.function else {
            return Err(VmError::StackUnderflow(OpCode::Ret.name().to_string()));
        };
        let function = &self.module.functions[index];
        if value.is_none() && function.return_type != Type::Empty.id() {
            return Err(VmError::MissingReturnValue(function.name.clone()));
        }
        self.stack.truncate(frame.stack_base);
        self.stack.extend(value);
        Ok(())
    }
}

fn unknown(what: &'static str, index: i32) -> VmError {
    VmError::UnknownEntry {
        what,
        index: index.into(),
    }
}

/// Resolves an address operand to an array and element index.
fn element(op: OpCode, address: Value, field: i32, stride: i32) -> Result<(super::ArrayRef, usize)> {
    if field != ARRAY_PAYLOAD_FIELD as i32 {
        return Err(VmError::UnknownEntry {
            what: "field",
            index: field.into(),
        });
    }
    let (array, offset) = match address {
        Value::Address { array, offset } => (array, offset),
        Value::Array(array) => (array, 0),
        other => {
            return Err(VmError::TypeMismatch {
                op: op.name(),
                expected: "address",
                found: other.type_name(),
            });
        }
    };
    if stride <= 0 || offset % i64::from(stride) != 0 {
        return Err(VmError::Misaligned { offset, stride });
    }
    let index = offset / i64::from(stride);
    let len = array.borrow().elements.len();
    match usize::try_from(index) {
        Ok(i) if i < len => Ok((array, i)),
        _ => Err(VmError::IndexOutOfBounds { index, len }),
    }
}
