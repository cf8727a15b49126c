//! Bytecode compiler: lowers the AST into an instruction stream plus a
//! constants pool.

use std::rc::Rc;

use moss_bytecode::{make, Instructions, Opcode};
use moss_object::{CompiledFunction, Object};
use moss_syntax::ast::*;
use moss_syntax::error::{error, Error, Result};

use crate::symbol_table::SymbolTable;

/// The compiler's output: the instruction stream and the constants it
/// references.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

/// One entry of the two-slot emission window.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

pub struct Compiler {
    instructions: Instructions,
    constants: Vec<Object>,
    // Window over the last two emitted instructions; consulted for the
    // if-expression Pop fixup.
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
    symbol_table: SymbolTable,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::new_with_state(SymbolTable::new(), Vec::new())
    }

    /// Resume with a symbol table and constants pool carried over from
    /// an earlier compilation. The REPL uses this so slot assignments
    /// and constant indices stay valid across submissions.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        Self {
            instructions: Instructions::new(),
            constants,
            last_instruction: None,
            previous_instruction: None,
            symbol_table,
        }
    }

    /// Hand the persistent state back to the caller.
    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        (self.symbol_table, self.constants)
    }

    /// Compile a program, appending to the instruction stream.
    /// Repeated calls append (REPL mode).
    pub fn compile(&mut self, program: &Program) -> Result<()> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Snapshot the current instruction stream and constants pool.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
            }
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                self.emit(Opcode::SetGlobal, &[symbol.index]);
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<()> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::IntegerLiteral(value) => {
                let idx = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::Constant, &[idx]);
            }
            Expression::StringLiteral(value) => {
                let idx = self.add_constant(Object::Str(Rc::new(value.clone())));
                self.emit(Opcode::Constant, &[idx]);
            }
            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expression::Prefix { op, right } => {
                self.compile_expression(right)?;
                match op {
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
            }
            Expression::Infix { op, left, right } => {
                // There is no less-than opcode: compile the operands in
                // reverse and emit GreaterThan instead.
                if *op == InfixOp::Lt {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match op {
                    InfixOp::Add => self.emit(Opcode::Add, &[]),
                    InfixOp::Sub => self.emit(Opcode::Sub, &[]),
                    InfixOp::Mul => self.emit(Opcode::Mul, &[]),
                    InfixOp::Div => self.emit(Opcode::Div, &[]),
                    InfixOp::Gt => self.emit(Opcode::GreaterThan, &[]),
                    InfixOp::Eq => self.emit(Opcode::Equal, &[]),
                    InfixOp::NotEq => self.emit(Opcode::NotEqual, &[]),
                    InfixOp::Lt => unreachable!("handled above"),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                // Operand rewritten once the end of the consequence is
                // known.
                let jump_not_truthy_pos = self.emit(Opcode::JumpNotTruthy, &[0xFFFF]);

                self.compile_block(consequence)?;
                // The enclosing statement pops the whole if-expression;
                // the branch value must survive until then.
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }

                let jump_pos = self.emit(Opcode::Jump, &[0xFFFF]);
                self.change_operand(jump_not_truthy_pos, self.instructions.len())?;

                match alternative {
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                    Some(alt) => {
                        self.compile_block(alt)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }
                self.change_operand(jump_pos, self.instructions.len())?;
            }
            Expression::Identifier(name) => {
                let Some(symbol) = self.symbol_table.resolve(name) else {
                    return error(format!("undefined variable {}", name));
                };
                self.emit(Opcode::GetGlobal, &[symbol.index]);
            }
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            Expression::HashLiteral(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
            Expression::FunctionLiteral { parameters, body } => {
                if !parameters.is_empty() {
                    return error("functions with parameters are not supported by the compiler yet");
                }
                let saved_instructions = std::mem::take(&mut self.instructions);
                let saved_last = self.last_instruction.take();
                let saved_previous = self.previous_instruction.take();

                self.compile_block(body)?;
                // Guarantee the body ends by returning a value: an
                // implicit trailing expression keeps its value, a
                // valueless body returns null.
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                    self.emit(Opcode::ReturnValue, &[]);
                } else if !self.last_instruction_is(Opcode::ReturnValue) {
                    self.emit(Opcode::Null, &[]);
                    self.emit(Opcode::ReturnValue, &[]);
                }

                let instructions = std::mem::replace(&mut self.instructions, saved_instructions);
                self.last_instruction = saved_last;
                self.previous_instruction = saved_previous;

                let idx =
                    self.add_constant(Object::CompiledFunction(Rc::new(CompiledFunction {
                        instructions,
                    })));
                self.emit(Opcode::Constant, &[idx]);
            }
            Expression::Call {
                function,
                arguments,
            } => {
                if !arguments.is_empty() {
                    return error("call arguments are not supported by the compiler yet");
                }
                self.compile_expression(function)?;
                self.emit(Opcode::Call, &[]);
            }
        }
        Ok(())
    }

    /// Append the constant and return its pool index.
    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(obj);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let ins = make(op, operands);
        let pos = self.add_instruction(&ins);
        self.set_last_instruction(op, pos);
        pos
    }

    fn add_instruction(&mut self, ins: &[u8]) -> usize {
        let pos = self.instructions.len();
        self.instructions.extend_from_slice(ins);
        pos
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        self.previous_instruction = self
            .last_instruction
            .replace(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        self.last_instruction.map_or(false, |ins| ins.opcode == op)
    }

    /// Truncate the stream to drop the last instruction and promote
    /// `previous` into the `last` slot.
    fn remove_last_pop(&mut self) {
        if let Some(last) = self.last_instruction {
            self.instructions.truncate(last.position);
            self.last_instruction = self.previous_instruction.take();
        }
    }

    /// Overwrite the instruction at `pos` in place. Only valid when the
    /// replacement has the same width as the original.
    fn replace_instruction(&mut self, pos: usize, new_instruction: &[u8]) {
        self.instructions[pos..pos + new_instruction.len()].copy_from_slice(new_instruction);
    }

    /// Rewrite the operand of the (jump) instruction at `op_pos`. Safe
    /// because every back-patched opcode carries a single 2-byte
    /// operand.
    fn change_operand(&mut self, op_pos: usize, operand: usize) -> Result<()> {
        let op = Opcode::from_u8(self.instructions[op_pos])
            .ok_or_else(|| Error::new(format!("cannot patch undefined opcode at {}", op_pos)))?;
        let new_instruction = make(op, &[operand]);
        self.replace_instruction(op_pos, &new_instruction);
        Ok(())
    }
}
