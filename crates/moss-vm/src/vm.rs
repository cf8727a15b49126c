//! The Moss virtual machine: a fetch-decode-execute loop over the
//! compiled instruction stream.
//!
//! The operand stack is a fixed-size array with `sp` pointing at the
//! next free slot. Popping only moves `sp` down, so the value just
//! above the live top stays readable; drivers use that slot to report
//! the result of an expression-statement program.

use std::collections::HashMap;
use std::rc::Rc;

use moss_bytecode::{read_u16, Opcode};
use moss_compiler::Bytecode;
use moss_object::{CompiledFunction, HashPair, Object};
use moss_syntax::error::{error, Error, Result};

use crate::frame::Frame;

/// Operand stack capacity; exceeding it is a fatal error.
pub const STACK_SIZE: usize = 2048;
/// Number of global binding slots, matching the 16-bit operand range.
pub const GLOBALS_SIZE: usize = 65536;
/// Call depth limit.
pub const MAX_FRAMES: usize = 1024;

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    /// Next free stack slot; the top of the stack is `stack[sp - 1]`.
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_globals_store(bytecode, vec![Object::Null; GLOBALS_SIZE])
    }

    /// Build a VM around an existing globals array. The REPL threads
    /// the same array through every submission.
    pub fn new_with_globals_store(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        // The bottom frame wraps the top-level instructions as if they
        // were a zero-argument function body.
        let main = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
        });
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main));
        Self {
            constants: bytecode.constants,
            stack: vec![Object::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Hand the globals array back for the next REPL submission.
    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The live top of the stack, if any.
    pub fn stack_top(&self) -> Option<&Object> {
        if self.sp == 0 {
            None
        } else {
            Some(&self.stack[self.sp - 1])
        }
    }

    /// The value most recently popped off the stack. The slot at `sp`
    /// is kept intact exactly for this read.
    pub fn last_popped_stack_elem(&self) -> &Object {
        &self.stack[self.sp]
    }

    /// Execute to completion or to the first error. The VM is not
    /// reusable after an error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            // Pre-increment the instruction pointer, then fetch.
            let (op_byte, ip, func) = {
                let Some(frame) = self.frames.last_mut() else {
                    break;
                };
                frame.ip += 1;
                let ip = frame.ip as usize;
                let func = Rc::clone(&frame.func);
                if ip >= func.instructions.len() {
                    break;
                }
                (func.instructions[ip], ip, func)
            };
            let op = Opcode::from_u8(op_byte)
                .ok_or_else(|| Error::new(format!("opcode {} undefined", op_byte)))?;
            let ins = &func.instructions;

            match op {
                Opcode::Constant => {
                    let idx = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    let constant = self
                        .constants
                        .get(idx)
                        .cloned()
                        .ok_or_else(|| Error::new(format!("constant {} out of range", idx)))?;
                    self.push(constant)?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }
                Opcode::True => self.push(Object::Boolean(true))?,
                Opcode::False => self.push(Object::Boolean(false))?,
                Opcode::Null => self.push(Object::Null)?,
                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(op)?;
                }
                Opcode::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Object::Integer(value) => {
                            self.push(Object::Integer(value.wrapping_neg()))?
                        }
                        other => {
                            return error(format!(
                                "unsupported type for negation: {}",
                                other.type_name()
                            ));
                        }
                    }
                }
                Opcode::Bang => {
                    let operand = self.pop()?;
                    let negated = matches!(operand, Object::Boolean(false) | Object::Null);
                    self.push(Object::Boolean(negated))?;
                }
                Opcode::Jump => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip = target - 1;
                }
                Opcode::JumpNotTruthy => {
                    let target = read_u16(&ins[ip + 1..]) as i64;
                    self.current_frame_mut().ip += 2;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target - 1;
                    }
                }
                Opcode::GetGlobal => {
                    let slot = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.push(self.globals[slot].clone())?;
                }
                Opcode::SetGlobal => {
                    let slot = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    self.globals[slot] = self.pop()?;
                }
                Opcode::Array => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    if count > self.sp {
                        return error("stack underflow");
                    }
                    // Copying the slice restores source order without
                    // popping one by one.
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Object::Array(Rc::new(elements)))?;
                }
                Opcode::Hash => {
                    let count = read_u16(&ins[ip + 1..]) as usize;
                    self.current_frame_mut().ip += 2;
                    if count > self.sp {
                        return error("stack underflow");
                    }
                    let start = self.sp - count;
                    let mut pairs = HashMap::with_capacity(count / 2);
                    for i in (start..self.sp).step_by(2) {
                        let key = self.stack[i].clone();
                        let value = self.stack[i + 1].clone();
                        let hash_key = key.hash_key().ok_or_else(|| {
                            Error::new(format!("unusable as hash key: {}", key.type_name()))
                        })?;
                        pairs.insert(hash_key, HashPair { key, value });
                    }
                    self.sp = start;
                    self.push(Object::Hash(Rc::new(pairs)))?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }
                Opcode::Call => {
                    if self.sp == 0 {
                        return error("stack underflow");
                    }
                    // The callee stays on the stack underneath the new
                    // frame; ReturnValue cleans it up.
                    let callee = match &self.stack[self.sp - 1] {
                        Object::CompiledFunction(func) => Rc::clone(func),
                        other => {
                            return error(format!(
                                "calling non-function: {}",
                                other.type_name()
                            ));
                        }
                    };
                    self.push_frame(Frame::new(callee))?;
                }
                Opcode::ReturnValue => {
                    let return_value = self.pop()?;
                    self.frames.pop();
                    if self.frames.is_empty() {
                        // Top-level return: the value is already in the
                        // last-popped slot; the program is done.
                        break;
                    }
                    self.pop()?; // the callee reference
                    self.push(return_value)?;
                }
            }
        }
        Ok(())
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("frame stack is never empty during dispatch")
    }

    fn push_frame(&mut self, frame: Frame) -> Result<()> {
        if self.frames.len() >= MAX_FRAMES {
            return error("frame overflow");
        }
        self.frames.push(frame);
        Ok(())
    }

    fn push(&mut self, obj: Object) -> Result<()> {
        if self.sp >= STACK_SIZE {
            return error("stack overflow");
        }
        self.stack[self.sp] = obj;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object> {
        if self.sp == 0 {
            return error("stack underflow");
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                let result = match op {
                    Opcode::Add => l.wrapping_add(*r),
                    Opcode::Sub => l.wrapping_sub(*r),
                    Opcode::Mul => l.wrapping_mul(*r),
                    Opcode::Div => {
                        if *r == 0 {
                            return error("division by zero");
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("not a binary arithmetic opcode: {:?}", op),
                };
                self.push(Object::Integer(result))
            }
            (Object::Str(l), Object::Str(r)) if op == Opcode::Add => {
                self.push(Object::Str(Rc::new(format!("{}{}", l, r))))
            }
            _ => error(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        if let (Object::Integer(l), Object::Integer(r)) = (&left, &right) {
            let result = match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                _ => unreachable!("not a comparison opcode: {:?}", op),
            };
            return self.push(Object::Boolean(result));
        }
        // Identity is sound here: booleans and null behave as
        // singletons, and cross-type values are unequal by definition.
        match op {
            Opcode::Equal => {
                let eq = left.identity_eq(&right);
                self.push(Object::Boolean(eq))
            }
            Opcode::NotEqual => {
                let eq = left.identity_eq(&right);
                self.push(Object::Boolean(!eq))
            }
            _ => error(format!(
                "unsupported types for binary operation: {} {}",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn execute_index_expression(&mut self, left: Object, index: Object) -> Result<()> {
        match (&left, &index) {
            (Object::Array(elements), Object::Integer(i)) => {
                let max = elements.len() as i64 - 1;
                if *i < 0 || *i > max {
                    self.push(Object::Null)
                } else {
                    self.push(elements[*i as usize].clone())
                }
            }
            (Object::Hash(pairs), _) => {
                let key = index.hash_key().ok_or_else(|| {
                    Error::new(format!("unusable as hash key: {}", index.type_name()))
                })?;
                match pairs.get(&key) {
                    Some(pair) => self.push(pair.value.clone()),
                    None => self.push(Object::Null),
                }
            }
            _ => error(format!(
                "index operator not supported: {}",
                left.type_name()
            )),
        }
    }
}
