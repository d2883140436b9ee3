//! Stack-based virtual machine.
//!
//! One VM drives one program from start to finish: a value stack, a global
//! slot array, and a stack of call frames, each frame holding a closure, an
//! instruction pointer, and a base pointer marking the start of the
//! callee's locals. Arguments occupy the first `num_params` local slots.
//!
//! The instruction stream stays obfuscated at rest; each opcode byte and
//! operand window is unmasked on the fly (`codec::mask_byte` keyed by the
//! top-level instruction length). Values are re-encrypted on push and
//! decrypted on pop, so the live stack holds `Encrypted` variants for the
//! encryptable kinds.

use std::rc::Rc;

use tracing::warn;

use crate::builtins;
use crate::code::{self, Opcode};
use crate::codec;
use crate::compiler::Bytecode;
use crate::object::{Closure, CompiledFunction, HashKey, HashPair, Instructions, Object};

/// Value stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Global slot capacity.
pub const GLOBAL_SIZE: usize = 65536;
/// Call frame capacity.
pub const MAX_FRAMES: usize = 1024;

/// Per-activation state: the executing closure, the instruction pointer,
/// and the base pointer into the value stack.
struct Frame {
    closure: Rc<Closure>,
    /// Index of the next unread instruction byte.
    ip: usize,
    /// First stack slot of this activation's locals.
    bp: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, bp: usize) -> Self {
        Frame { closure, ip: 0, bp }
    }

    fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }
}

pub struct Vm {
    constants: Vec<Object>,
    stack: Vec<Object>,
    /// Index of the next free stack slot; top of stack is `sp - 1`.
    sp: usize,
    globals: Vec<Object>,
    frames: Vec<Frame>,
    /// Length of the top-level instruction stream — the per-program salt
    /// for the obfuscation codec.
    inslen: usize,
}

impl Vm {
    /// Build a VM around finalized (codec-obfuscated) bytecode.
    pub fn new(bytecode: Bytecode) -> Self {
        let inslen = bytecode.instructions.len();
        let main_fn = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_fn,
            free: Vec::new(),
        });

        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame::new(main_closure, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Object::Null; STACK_SIZE],
            sp: 0,
            globals: vec![Object::Null; GLOBAL_SIZE],
            frames,
            inslen,
        }
    }

    /// Build a VM that reuses an existing global store (REPL state
    /// threading). The store must have `GLOBAL_SIZE` slots.
    pub fn with_global_store(bytecode: Bytecode, globals: Vec<Object>) -> Self {
        let mut vm = Vm::new(bytecode);
        vm.globals = globals;
        vm
    }

    /// Hand the global store back for the next REPL line.
    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    /// The value most recently popped off the stack — the result of the
    /// last expression statement once `run` finishes.
    pub fn last_popped(&self) -> Object {
        let object = &self.stack[self.sp];
        codec::decrypt_object(object, self.inslen).unwrap_or_else(|| object.clone())
    }

    pub fn run(&mut self) -> Result<(), String> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let frame_index = self.frames.len() - 1;
            let func = Rc::clone(&self.frames[frame_index].closure.func);
            let ins = &func.instructions;
            let ip = self.frames[frame_index].ip;

            let op_byte = codec::mask_byte(ins[ip], self.inslen);
            let op = Opcode::from_byte(op_byte)
                .ok_or_else(|| format!("opcode {} undefined", op_byte))?;
            self.frames[frame_index].ip = ip + 1;

            match op {
                Opcode::OpConstant => {
                    let index = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                Opcode::OpPop => {
                    self.pop()?;
                }
                Opcode::OpAdd | Opcode::OpSub | Opcode::OpMul | Opcode::OpDiv => {
                    self.exec_binary_operation(op)?;
                }
                Opcode::OpTrue => self.push(Object::Boolean(true))?,
                Opcode::OpFalse => self.push(Object::Boolean(false))?,
                Opcode::OpEqual | Opcode::OpUnEqual | Opcode::OpGreater => {
                    self.exec_comparison(op)?;
                }
                Opcode::OpMinus => self.exec_minus_operation()?,
                Opcode::OpBang => self.exec_bang_operation()?,
                Opcode::OpJump => {
                    let target = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip = target;
                }
                Opcode::OpJumpFalse => {
                    let target = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    let condition = self.pop()?;
                    if !is_truthy(&condition) {
                        self.frames[frame_index].ip = target;
                    }
                }
                Opcode::OpNull => self.push(Object::Null)?,
                Opcode::OpSetGlobal => {
                    let index = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    self.globals[index] = self.pop()?;
                }
                Opcode::OpGetGlobal => {
                    let index = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                Opcode::OpSetLocal => {
                    let index = code::read_u8_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 1;
                    let bp = self.frames[frame_index].bp;
                    let object = self.pop()?;
                    // Locals rest encrypted, like everything else on the
                    // stack.
                    self.stack[bp + index] =
                        codec::encrypt_object(&object, self.inslen).unwrap_or(object);
                }
                Opcode::OpGetLocal => {
                    let index = code::read_u8_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 1;
                    let bp = self.frames[frame_index].bp;
                    let value = self.stack[bp + index].clone();
                    self.push(value)?;
                }
                Opcode::OpGetBuiltin => {
                    let index = code::read_u8_masked(&ins[ip + 1..], self.inslen);
                    self.frames[frame_index].ip += 1;
                    if index as usize >= builtins::REGISTRY.len() {
                        return Err(format!("builtin {} undefined", index));
                    }
                    self.push(Object::Builtin(index))?;
                }
                Opcode::OpGetFree => {
                    let index = code::read_u8_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 1;
                    let value = self.frames[frame_index].closure.free[index].clone();
                    self.push(value)?;
                }
                Opcode::OpCurrentClosure => {
                    let closure = Rc::clone(&self.frames[frame_index].closure);
                    self.push(Object::Closure(closure))?;
                }
                Opcode::OpArray => {
                    let count = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    let array = self.build_array(self.sp - count, self.sp);
                    self.sp -= count;
                    self.push(array)?;
                }
                Opcode::OpHash => {
                    let count = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 2;
                    let hash = self.build_hash(self.sp - count, self.sp)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Opcode::OpIndex => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.exec_index_operation(left, index)?;
                }
                Opcode::OpCall => {
                    let argc = code::read_u8_masked(&ins[ip + 1..], self.inslen) as usize;
                    self.frames[frame_index].ip += 1;
                    self.execute_call(argc)?;
                }
                Opcode::OpReturnValue => {
                    let return_value = self.pop()?;
                    let frame = self.pop_frame()?;
                    self.sp = frame.bp - 1;
                    self.push(return_value)?;
                }
                Opcode::OpReturn => {
                    let frame = self.pop_frame()?;
                    self.sp = frame.bp - 1;
                    self.push(Object::Null)?;
                }
                Opcode::OpClosure => {
                    let const_index = code::read_u16_masked(&ins[ip + 1..], self.inslen) as usize;
                    let num_free = code::read_u8_masked(&ins[ip + 3..], self.inslen) as usize;
                    self.frames[frame_index].ip += 3;
                    self.push_closure(const_index, num_free)?;
                }
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack empty")
    }

    fn pop_frame(&mut self) -> Result<Frame, String> {
        if self.frames.len() == 1 {
            return Err("return outside of a function".to_string());
        }
        Ok(self.frames.pop().expect("frame stack empty"))
    }

    fn push(&mut self, object: Object) -> Result<(), String> {
        if self.sp >= STACK_SIZE {
            return Err("stack overflow".to_string());
        }
        let object = codec::encrypt_object(&object, self.inslen).unwrap_or(object);
        self.stack[self.sp] = object;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, String> {
        if self.sp == 0 {
            return Err("stack underflow".to_string());
        }
        let object = &self.stack[self.sp - 1];
        let object = codec::decrypt_object(object, self.inslen).unwrap_or_else(|| object.clone());
        self.sp -= 1;
        Ok(object)
    }

    fn execute_call(&mut self, argc: usize) -> Result<(), String> {
        if self.sp < argc + 1 {
            return Err("stack underflow".to_string());
        }
        let callee_slot = self.sp - 1 - argc;
        let callee = match &self.stack[callee_slot] {
            Object::Closure(_) | Object::Builtin(_) => self.stack[callee_slot].clone(),
            other => {
                // The original runtime falls back to the bottom of the
                // stack when the callee slot is not callable.
                warn!(
                    slot_type = other.type_name(),
                    "callee slot is not callable, falling back to the bottom of the stack"
                );
                self.stack[0].clone()
            }
        };

        match callee {
            Object::Closure(closure) => self.call_closure(closure, argc),
            Object::Builtin(index) => self.call_builtin(index, argc),
            _ => Err("calling non-function and non-built-in".to_string()),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> Result<(), String> {
        if argc != closure.func.num_params {
            return Err(format!(
                "wrong number of arguments. want={}, got={}",
                closure.func.num_params, argc
            ));
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err("stack overflow".to_string());
        }

        let bp = self.sp - argc;
        let num_locals = closure.func.num_locals;
        if bp + num_locals > STACK_SIZE {
            return Err("stack overflow".to_string());
        }
        self.frames.push(Frame::new(closure, bp));
        self.sp = bp + num_locals;
        Ok(())
    }

    fn call_builtin(&mut self, index: u8, argc: usize) -> Result<(), String> {
        let mut args = Vec::with_capacity(argc);
        for slot in self.sp - argc..self.sp {
            let object = &self.stack[slot];
            args.push(codec::decrypt_object(object, self.inslen).unwrap_or_else(|| object.clone()));
        }

        let result = (builtins::REGISTRY[index as usize].func)(&args);

        // Drop the arguments and the callee slot.
        self.sp = self.sp - argc - 1;

        match result {
            Some(object) => self.push(object),
            None => self.push(Object::Null),
        }
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), String> {
        let constant = self.constants[const_index].clone();
        let Object::CompiledFunction(func) = constant else {
            return Err(format!("not a function: {:?}", constant));
        };

        let mut free = Vec::with_capacity(num_free);
        for slot in self.sp - num_free..self.sp {
            free.push(self.stack[slot].clone());
        }
        self.sp -= num_free;

        self.push(Object::Closure(Rc::new(Closure { func, free })))
    }

    fn exec_binary_operation(&mut self, op: Opcode) -> Result<(), String> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Object::Integer(lval), Object::Integer(rval)) => {
                let result = match op {
                    Opcode::OpAdd => lval.wrapping_add(*rval),
                    Opcode::OpSub => lval.wrapping_sub(*rval),
                    Opcode::OpMul => lval.wrapping_mul(*rval),
                    Opcode::OpDiv => {
                        if *rval == 0 {
                            return Err("division by zero".to_string());
                        }
                        lval.wrapping_div(*rval)
                    }
                    _ => return Err(format!("Unknown integer operator: {}", op.name())),
                };
                self.push(Object::Integer(result))
            }
            (Object::Str(lval), Object::Str(rval)) => {
                if op != Opcode::OpAdd {
                    return Err(format!("Unknown string operator: {}", op.name()));
                }
                self.push(Object::Str(format!("{}{}", lval, rval)))
            }
            _ => Err(format!(
                "Unsupported types for binary operation: {}, {}",
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn exec_comparison(&mut self, op: Opcode) -> Result<(), String> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Object::Integer(lval), Object::Integer(rval)) = (&left, &right) {
            let result = match op {
                Opcode::OpEqual => lval == rval,
                Opcode::OpUnEqual => lval != rval,
                Opcode::OpGreater => lval > rval,
                _ => return Err(format!("unknown operator: {}", op.name())),
            };
            return self.push(Object::Boolean(result));
        }

        match op {
            Opcode::OpEqual => self.push(Object::Boolean(left.inspect() == right.inspect())),
            Opcode::OpUnEqual => self.push(Object::Boolean(left.inspect() != right.inspect())),
            _ => Err(format!(
                "unknown operator: {} ({} {})",
                op.name(),
                left.type_name(),
                right.type_name()
            )),
        }
    }

    fn exec_bang_operation(&mut self) -> Result<(), String> {
        let operand = self.pop()?;
        let result = match operand {
            Object::Boolean(value) => !value,
            Object::Null => true,
            _ => false,
        };
        self.push(Object::Boolean(result))
    }

    fn exec_minus_operation(&mut self) -> Result<(), String> {
        let operand = self.pop()?;
        match operand {
            Object::Integer(value) => self.push(Object::Integer(value.wrapping_neg())),
            other => Err(format!(
                "unsupported object type for negation: {}",
                other.type_name()
            )),
        }
    }

    fn exec_index_operation(&mut self, left: Object, index: Object) -> Result<(), String> {
        match (&left, &index) {
            (Object::Array(elements), Object::Integer(i)) => {
                let element = lookup_negative_aware(elements.len(), *i)
                    .and_then(|idx| elements.get(idx).cloned());
                self.push(element.unwrap_or(Object::Null))
            }
            (Object::Str(value), Object::Integer(i)) => {
                let bytes = value.as_bytes();
                let element = lookup_negative_aware(bytes.len(), *i)
                    .and_then(|idx| bytes.get(idx).copied())
                    .map(|byte| Object::Str((byte as char).to_string()));
                self.push(element.unwrap_or(Object::Null))
            }
            (Object::Hash(pairs), _) => {
                let key = HashKey::from_object(&index)
                    .ok_or_else(|| format!("unusable as hash key: {}", index.type_name()))?;
                let value = pairs.get(&key).map(|pair| pair.value.clone());
                self.push(value.unwrap_or(Object::Null))
            }
            _ => Err(format!(
                "index operator not supported: {}",
                left.type_name()
            )),
        }
    }

    fn build_array(&self, start: usize, end: usize) -> Object {
        let mut elements = Vec::with_capacity(end - start);
        for slot in start..end {
            let object = &self.stack[slot];
            elements
                .push(codec::decrypt_object(object, self.inslen).unwrap_or_else(|| object.clone()));
        }
        Object::Array(Rc::new(elements))
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, String> {
        let mut pairs = std::collections::HashMap::new();
        for slot in (start..end).step_by(2) {
            let key = &self.stack[slot];
            let key = codec::decrypt_object(key, self.inslen).unwrap_or_else(|| key.clone());
            let value = &self.stack[slot + 1];
            let value = codec::decrypt_object(value, self.inslen).unwrap_or_else(|| value.clone());

            let hash_key = HashKey::from_object(&key)
                .ok_or_else(|| format!("unusable as a hashkey: {}", key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Object::Hash(Rc::new(pairs)))
    }
}

/// Resolve an index against a length: negative indices count from the end,
/// anything out of range is `None` (the VM pushes Null).
fn lookup_negative_aware(len: usize, index: i64) -> Option<usize> {
    let resolved = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    if resolved < 0 || resolved >= len as i64 {
        None
    } else {
        Some(resolved as usize)
    }
}

fn is_truthy(object: &Object) -> bool {
    match object {
        Object::Boolean(value) => *value,
        Object::Null => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::Parser;

    fn run(input: &str) -> Object {
        try_run(input).unwrap_or_else(|e| panic!("vm error for {:?}: {}", input, e))
    }

    fn try_run(input: &str) -> Result<Object, String> {
        let mut parser = Parser::from_source(input);
        let program = parser.parse_program();
        assert!(parser.errors().is_empty(), "parse errors: {:?}", parser.errors());

        let mut compiler = Compiler::new();
        compiler.compile(&program).map_err(|e| format!("compiler error: {}", e))?;

        let bytecode = codec::encrypt_bytecode(compiler.bytecode());
        let mut vm = Vm::new(bytecode);
        vm.run()?;
        Ok(vm.last_popped())
    }

    fn int(value: i64) -> Object {
        Object::Integer(value)
    }

    #[test]
    fn test_integer_arithmetic() {
        let cases = [
            ("1", 1),
            ("2", 2),
            ("1 + 2", 3),
            ("1 - 2", -1),
            ("4 / 2", 2),
            ("50 / 2 * 2 + 10 - 5", 55),
            ("5 * (2 + 10)", 60),
            ("-5", -5),
            ("-50 + 100 + -50", 0),
            ("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), int(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_boolean_expressions() {
        let cases = [
            ("true", true),
            ("false", false),
            ("1 < 2", true),
            ("1 > 2", false),
            ("1 == 1", true),
            ("1 != 1", false),
            ("true == true", true),
            ("true != false", true),
            ("(1 < 2) == true", true),
            ("!true", false),
            ("!!true", true),
            ("!5", false),
            ("!null", true),
        ];
        for (input, expected) in cases {
            // `null` is not a literal; express it through a missed if-arm.
            let source = input.replace("null", "if (false) { 1 }");
            assert_eq!(
                run(&source),
                Object::Boolean(expected),
                "input: {}",
                input
            );
        }
    }

    #[test]
    fn test_conditionals() {
        let cases = [
            ("if (true) { 10 }", int(10)),
            ("if (true) { 10 } else { 20 }", int(10)),
            ("if (false) { 10 } else { 20 }", int(20)),
            ("if (1) { 10 }", int(10)),
            ("if (1 < 2) { 10 } else { 20 }", int(10)),
            ("if (false) { 10 }", Object::Null),
            ("if ((if (false) { 10 })) { 10 } else { 20 }", int(20)),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_global_let_statements() {
        let cases = [
            ("let one = 1; one", 1),
            ("let one = 1; let two = 2; one + two", 3),
            ("let one = 1; let two = one + one; one + two", 3),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), int(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_string_expressions() {
        assert_eq!(run(r#""zeta""#), Object::Str("zeta".into()));
        assert_eq!(run(r#""ze" + "ta""#), Object::Str("zeta".into()));
        assert_eq!(
            run(r#""ze" + "ta" + " lang""#),
            Object::Str("zeta lang".into())
        );
    }

    #[test]
    fn test_array_literals() {
        assert_eq!(run("[]"), Object::Array(Rc::new(vec![])));
        assert_eq!(
            run("[1, 2, 3]"),
            Object::Array(Rc::new(vec![int(1), int(2), int(3)]))
        );
        assert_eq!(
            run("[1 + 2, 3 * 4, 5 + 6]"),
            Object::Array(Rc::new(vec![int(3), int(12), int(11)]))
        );
    }

    #[test]
    fn test_hash_literals() {
        match run("{1: 2, 2: 3}") {
            Object::Hash(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs.get(&HashKey::Integer(1)).unwrap().value, int(2));
                assert_eq!(pairs.get(&HashKey::Integer(2)).unwrap().value, int(3));
            }
            other => panic!("expected hash, got {:?}", other),
        }
    }

    #[test]
    fn test_index_expressions() {
        let cases = [
            ("[1, 2, 3][1]", int(2)),
            ("[[1, 1, 1]][0][0]", int(1)),
            ("[][0]", Object::Null),
            ("[1, 2, 3][99]", Object::Null),
            // Negative indices count from the end.
            ("[1, 2, 3][-1]", int(3)),
            ("[1, 2, 3][-3]", int(1)),
            ("[1, 2, 3][-4]", Object::Null),
            (r#"{"a": 1, "b": 2}["a"]"#, int(1)),
            (r#"{"a": 1}["missing"]"#, Object::Null),
            ("{1: 1, 2: 2}[2]", int(2)),
            (r#""zeta"[0]"#, Object::Str("z".into())),
            (r#""zeta"[-1]"#, Object::Str("a".into())),
            (r#""zeta"[9]"#, Object::Null),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_calling_functions() {
        let cases = [
            ("let fivePlusTen = fn() { 5 + 10; }; fivePlusTen();", 15),
            ("let one = fn() { 1; }; let two = fn() { 2; }; one() + two()", 3),
            (
                "let a = fn() { 1 }; let b = fn() { a() + 1 }; let c = fn() { b() + 1 }; c();",
                3,
            ),
            ("let earlyExit = fn() { return 99; 100; }; earlyExit();", 99),
            (
                "let identity = fn(a) { a; }; identity(4);",
                4,
            ),
            ("let sum = fn(a, b) { a + b; }; sum(1, 2);", 3),
            (
                "let sum = fn(a, b) { let c = a + b; c; }; sum(1, 2) + sum(3, 4);",
                10,
            ),
            (
                "let globalNum = 10;
                 let sum = fn(a, b) { let c = a + b; c + globalNum; };
                 sum(1, 2) + globalNum;",
                23,
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), int(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_functions_without_return_value_push_null() {
        let cases = [
            "let noReturn = fn() { }; noReturn();",
            "let noReturn = fn() { }; let noReturnTwo = fn() { noReturn(); }; noReturn(); noReturnTwo();",
        ];
        for input in cases {
            assert_eq!(run(input), Object::Null, "input: {}", input);
        }
    }

    #[test]
    fn test_first_class_functions() {
        let input = "
            let returnsOneReturner = fn() { let returnsOne = fn() { 1; }; returnsOne; };
            returnsOneReturner()();";
        assert_eq!(run(input), int(1));
    }

    #[test]
    fn test_closures() {
        let cases = [
            (
                "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
                99,
            ),
            (
                "let makeAdder = fn(a) { fn(b) { a + b } }; let addTwo = makeAdder(2); addTwo(3);",
                5,
            ),
            (
                "let counter = fn(a) { fn(b) { fn(c) { a + b + c } } }; counter(1)(2)(3);",
                6,
            ),
            (
                "let newAdderOuter = fn(a, b) {
                     let c = a + b;
                     fn(d) { let e = d + c; fn(f) { e + f; }; };
                 };
                 let newAdderInner = newAdderOuter(1, 2);
                 let adder = newAdderInner(3);
                 adder(8);",
                14,
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), int(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_recursive_functions() {
        let cases = [
            (
                "let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                 countDown(1);",
                0,
            ),
            (
                "let fib = fn(n){ if (n < 2) { n } else { fib(n-1) + fib(n-2) } }; fib(10);",
                55,
            ),
            (
                // Recursion through a wrapper still resolves through
                // OpCurrentClosure inside the recursive body.
                "let wrapper = fn() {
                     let countDown = fn(x) { if (x == 0) { return 0; } else { countDown(x - 1); } };
                     countDown(1);
                 };
                 wrapper();",
                0,
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), int(expected), "input: {}", input);
        }
    }

    #[test]
    fn test_builtin_functions() {
        let cases = [
            (r#"len("")"#, int(0)),
            (r#"len("four")"#, int(4)),
            ("len([1, 2, 3])", int(3)),
            (r#"len({"a": 1})"#, int(1)),
            ("first([1, 2, 3])", int(1)),
            ("first([])", Object::Null),
            ("last([1, 2, 3])", int(3)),
            (
                "rest([1, 2, 3])",
                Object::Array(Rc::new(vec![int(2), int(3)])),
            ),
            (
                "push([1], 2)",
                Object::Array(Rc::new(vec![int(1), int(2)])),
            ),
            ("pop([1, 2])", Object::Array(Rc::new(vec![int(1)]))),
            (
                // push is non-mutating: both arrays keep their own length.
                "let a = [1, 2, 3]; let b = push(a, 4); len(a) + len(b);",
                int(7),
            ),
            (
                r#"len(1)"#,
                Object::Error("argument to `len` not supported, got INTEGER".into()),
            ),
            (
                r#"len("one", "two")"#,
                Object::Error("wrong number of arguments. got=2, want=1".into()),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(run(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_vm_errors() {
        let cases = [
            ("5 + true;", "Unsupported types for binary operation: INTEGER, BOOLEAN"),
            ("-true", "unsupported object type for negation: BOOLEAN"),
            ("1 / 0", "division by zero"),
            (
                "fn() { 1; }(1);",
                "wrong number of arguments. want=0, got=1",
            ),
            ("{[1]: 2}", "unusable as a hashkey: ARRAY"),
            ("{1: 2}[[]]", "unusable as hash key: ARRAY"),
        ];
        for (input, expected) in cases {
            let err = try_run(input).unwrap_err();
            assert_eq!(err, expected, "input: {}", input);
        }
    }

    #[test]
    fn test_deep_recursion_overflows_frames() {
        let input = "let f = fn() { f(); }; f();";
        let err = try_run(input).unwrap_err();
        assert_eq!(err, "stack overflow");
    }

    #[test]
    fn test_stack_holds_encrypted_values_at_rest() {
        let mut parser = Parser::from_source("let x = 5; x;");
        let program = parser.parse_program();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        let bytecode = codec::encrypt_bytecode(compiler.bytecode());
        let mut vm = Vm::new(bytecode);
        vm.run().unwrap();
        // The slot just above the stack pointer still holds the last
        // popped value, encrypted at rest.
        assert!(matches!(vm.stack[vm.sp], Object::Encrypted { .. }));
        assert_eq!(vm.last_popped(), int(5));
    }
}
