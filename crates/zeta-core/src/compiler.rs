//! Bytecode compiler: AST → flat instruction stream.
//!
//! The compiler owns a stack of compilation scopes (one per function
//! literal being compiled) and keeps the symbol-table chain in lockstep
//! with it. Forward jumps are emitted with a placeholder operand, recorded,
//! and patched once the branch body's extent is known; the last two emitted
//! instructions are tracked per scope so statement-level `OpPop`s can be
//! removed or rewritten at expression/function boundaries.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{BlockStatement, Expression, Program, Statement};
use crate::builtins;
use crate::code::{make, Opcode};
use crate::object::{CompiledFunction, Instructions, Object};
use crate::symbol::{Symbol, SymbolScope, SymbolTable};

/// The compiled form of a program: a flat instruction stream plus the
/// constant pool it indexes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    prev_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Object>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Compiler {
    pub fn new() -> Self {
        let mut table = SymbolTable::new();
        for (index, builtin) in builtins::REGISTRY.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table: table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Resume compilation with a symbol table and constant pool threaded
    /// from an earlier run (the REPL's persistent state).
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        let mut compiler = Compiler::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), String> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// The compiled result so far: the top-level instruction buffer and the
    /// constant pool. Plain bytecode — obfuscation is a separate finalize
    /// step (`codec::encrypt_bytecode`).
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Tear down the compiler, handing back the symbol table for the next
    /// REPL line.
    pub fn into_symbol_table(self) -> SymbolTable {
        self.symbol_table
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), String> {
        match statement {
            Statement::Let { name, value } => {
                // Define before compiling the value so `let f = fn() { f() }`
                // can resolve `f` inside its own body.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::OpSetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::OpSetLocal, &[symbol.index]),
                };
                Ok(())
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(Opcode::OpReturnValue, &[]);
                Ok(())
            }
            Statement::Expression { expression } => {
                self.compile_expression(expression)?;
                self.emit(Opcode::OpPop, &[]);
                Ok(())
            }
        }
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), String> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), String> {
        match expression {
            Expression::IntegerLiteral(value) => {
                let index = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::OpConstant, &[index]);
            }
            Expression::StringLiteral(value) => {
                let index = self.add_constant(Object::Str(value.clone()));
                self.emit(Opcode::OpConstant, &[index]);
            }
            Expression::Boolean(value) => {
                if *value {
                    self.emit(Opcode::OpTrue, &[]);
                } else {
                    self.emit(Opcode::OpFalse, &[]);
                }
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "-" => self.emit(Opcode::OpMinus, &[]),
                    "!" => self.emit(Opcode::OpBang, &[]),
                    other => return Err(format!("unknown operator {}", other)),
                };
            }
            Expression::Infix {
                operator,
                left,
                right,
            } => {
                // `a < b` compiles as `b > a`: swap the operands and reuse
                // the single greater-than opcode.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::OpGreater, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator.as_str() {
                    "+" => self.emit(Opcode::OpAdd, &[]),
                    "-" => self.emit(Opcode::OpSub, &[]),
                    "*" => self.emit(Opcode::OpMul, &[]),
                    "/" | "\\" => self.emit(Opcode::OpDiv, &[]),
                    ">" => self.emit(Opcode::OpGreater, &[]),
                    "==" => self.emit(Opcode::OpEqual, &[]),
                    "!=" => self.emit(Opcode::OpUnEqual, &[]),
                    other => return Err(format!("unknown operator {}", other)),
                };
            }
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                // Placeholder operand, patched once the consequence ends.
                let jump_false_position = self.emit(Opcode::OpJumpFalse, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::OpPop) {
                    self.remove_last_pop();
                }

                let jump_position = self.emit(Opcode::OpJump, &[9999]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_false_position, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::OpNull, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::OpPop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump_position, after_alternative);
            }
            Expression::ArrayLiteral(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::OpArray, &[elements.len()]);
            }
            Expression::HashLiteral(pairs) => {
                // Sort by the rendered key expression so the constant pool
                // layout is deterministic across runs.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::OpHash, &[pairs.len() * 2]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::OpIndex, &[]);
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| format!("undefined variable: {}", name))?;
                self.load_symbol(&symbol);
            }
            Expression::FunctionLiteral {
                parameters,
                body,
                name,
            } => {
                self.enter_scope();

                if !name.is_empty() {
                    self.symbol_table.define_function_name(name);
                }
                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                // A body ending in a statement-expression leaves its value
                // on the stack: turn the trailing pop into the return.
                if self.last_instruction_is(Opcode::OpPop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Opcode::OpReturnValue) {
                    self.emit(Opcode::OpReturn, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                // Load each captured value in the enclosing scope, right
                // before the closure that consumes them.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = Object::CompiledFunction(Rc::new(CompiledFunction {
                    instructions,
                    num_locals,
                    num_params: parameters.len(),
                }));
                let fn_index = self.add_constant(function);
                self.emit(Opcode::OpClosure, &[fn_index, free_symbols.len()]);
            }
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::OpCall, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::OpGetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::OpGetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::OpGetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::OpGetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::OpCurrentClosure, &[]),
        };
    }

    fn add_constant(&mut self, object: Object) -> usize {
        self.constants.push(object);
        self.constants.len() - 1
    }

    /// Emit an instruction into the current scope and return its byte
    /// position, recording it as the last-emitted instruction.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.add_instruction(instruction);
        self.set_last_instruction(op, position);
        position
    }

    fn add_instruction(&mut self, instruction: Vec<u8>) -> usize {
        let position = self.current_instructions().len();
        self.scopes[self.scope_index]
            .instructions
            .extend(instruction);
        position
    }

    fn set_last_instruction(&mut self, opcode: Opcode, position: usize) {
        let scope = &mut self.scopes[self.scope_index];
        scope.prev_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        if self.current_instructions().is_empty() {
            return false;
        }
        matches!(
            self.scopes[self.scope_index].last_instruction,
            Some(last) if last.opcode == opcode
        )
    }

    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        let last = scope.last_instruction.expect("no instruction to remove");
        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.prev_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let position = {
            let scope = &mut self.scopes[self.scope_index];
            let last = scope
                .last_instruction
                .as_mut()
                .expect("no instruction to replace");
            last.opcode = Opcode::OpReturnValue;
            last.position
        };
        let replacement = make(Opcode::OpReturnValue, &[]);
        self.replace_instruction(position, &replacement);
    }

    fn replace_instruction(&mut self, position: usize, replacement: &[u8]) {
        let instructions = &mut self.scopes[self.scope_index].instructions;
        instructions[position..position + replacement.len()].copy_from_slice(replacement);
    }

    /// Rewrite the operand of the (jump) instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let opcode = Opcode::from_byte(self.current_instructions()[position])
            .expect("patching a non-instruction byte");
        let replacement = make(opcode, &[operand]);
        self.replace_instruction(position, &replacement);
    }

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("compilation scope underflow");
        self.scope_index -= 1;
        let table = std::mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().expect("left the global symbol scope");
        scope.instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}
