//! The bytecode dispatch loop (`spec.md` §4.5/§4.6, C6).
//!
//! A stack-based VM: a fixed-capacity `Value` stack and a fixed-depth call
//! frame stack. Locals resolve by frame-pointer-relative slot for runtime
//! speed; closures additionally capture by name through an `Environment`
//! chain (`spec.md` §9's hybrid-resolution redesign). Safepoints — where
//! the collector is allowed to run a nursery collection — sit at every
//! back-edge (`Op::Loop`), call, and return, matching `spec.md` §4.8.4.

use crate::chunk::{Chunk, Op};
use crate::error::RuntimeError;
use crate::gc::Heap;
use crate::registry::ModuleRegistry;
use seq_core::{
    ArrayObj, EnvironmentObj, FunctionKind, FunctionObj, GcRef, MapKey, MapObj, Obj,
    StructInstanceObj, Value,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

pub const STACK_CAPACITY: usize = 4096;
pub const MAX_CALL_DEPTH: usize = 512;

/// The `Value` stack. Fixed capacity: `spec.md` §4.6 treats overflow as a
/// `RuntimeError`, not a growable `Vec`'s panic.
struct Stack {
    values: Vec<Value>,
}

impl Stack {
    fn new() -> Self {
        Stack { values: Vec::with_capacity(STACK_CAPACITY) }
    }

    fn push(&mut self, v: Value, file: &str, line: u32) -> Result<(), RuntimeError> {
        if self.values.len() >= STACK_CAPACITY {
            return Err(RuntimeError::StackOverflow { file: file.into(), line });
        }
        self.values.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.values.pop().expect("interpreter popped an empty stack")
    }

    fn peek(&self, back: usize) -> Value {
        self.values[self.values.len() - 1 - back]
    }

    fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn get(&self, idx: usize) -> Value {
        self.values[idx]
    }

    fn set(&mut self, idx: usize, v: Value) {
        self.values[idx] = v;
    }
}

/// One activation record. `fp` is the index into the value stack where this
/// frame's locals begin (`spec.md` §4.5).
struct CallFrame {
    chunk: Arc<Chunk>,
    ip: usize,
    fp: usize,
    /// Present only for closures, whose free variables resolve by name
    /// through the captured `Environment` chain rather than by slot.
    closure_env: Option<GcRef>,
}

/// Interprets one chunk at a time, sharing heap/globals/registry with every
/// other strand spawned from the same `Runtime` (`spec.md` §4.9).
pub struct Interpreter {
    stack: Stack,
    frames: Vec<CallFrame>,
    pub globals: GcRef,
    pub heap: Arc<Heap>,
    pub modules: Arc<ModuleRegistry>,
    pub strands: Arc<crate::future::StrandRegistry>,
    chunks: Rc<Vec<Arc<Chunk>>>,
}

impl Interpreter {
    pub fn new(
        globals: GcRef,
        heap: Arc<Heap>,
        modules: Arc<ModuleRegistry>,
        chunks: Rc<Vec<Arc<Chunk>>>,
    ) -> Self {
        Self::with_strands(globals, heap, modules, chunks, Arc::new(crate::future::StrandRegistry::new()))
    }

    /// Like `new`, but shares `strands` with the caller rather than starting
    /// a fresh registry — used when spawning the worker `Interpreter` for an
    /// `ASYNC_CALL` strand, so `Runtime::shutdown` actually waits on it
    /// (`spec.md` C11).
    pub fn with_strands(
        globals: GcRef,
        heap: Arc<Heap>,
        modules: Arc<ModuleRegistry>,
        chunks: Rc<Vec<Arc<Chunk>>>,
        strands: Arc<crate::future::StrandRegistry>,
    ) -> Self {
        Interpreter {
            stack: Stack::new(),
            frames: Vec::new(),
            globals,
            heap,
            modules,
            strands,
            chunks,
        }
    }

    /// Run `chunk` as a fresh top-level call. Returns the value left on the
    /// stack by `Op::Return`/`Op::Halt`.
    pub fn run(&mut self, chunk: Arc<Chunk>) -> Result<Value, RuntimeError> {
        self.frames.push(CallFrame { chunk, ip: 0, fp: 0, closure_env: None });
        self.dispatch()
    }

    fn current_frame(&self) -> &CallFrame {
        self.frames.last().expect("dispatch with no active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("dispatch with no active frame");
        let b = frame.chunk.code()[frame.ip];
        frame.ip += 1;
        b
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn current_line(&self) -> u32 {
        let frame = self.current_frame();
        frame.chunk.line_for_offset(frame.ip.saturating_sub(1))
    }

    fn err_loc(&self) -> (Box<str>, u32) {
        (self.current_frame().chunk.file.clone(), self.current_line())
    }

    /// Roots for the collector: everything on the value stack, every
    /// frame's closure environment, and the global environment. Called at
    /// every safepoint when a nursery collection is due.
    fn collect_roots(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.stack.values.clone();
        for frame in &self.frames {
            if let Some(env) = frame.closure_env {
                roots.push(Value::Obj(env));
            }
        }
        roots.push(Value::Obj(self.globals));
        roots
    }

    /// A safepoint: if the nursery has crossed its threshold, collect now.
    /// Placed at back-edges, calls, and returns (`spec.md` §4.8.4) so no
    /// instruction sequence can run unboundedly long without ever reaching
    /// one — the tightest case is a loop body with no calls, which still
    /// hits `Op::Loop` every iteration.
    fn safepoint(&self) {
        if self.heap.should_collect_nursery() {
            let roots = self.collect_roots();
            self.heap.collect_nursery(roots.iter());
        }
    }

    fn dispatch(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let byte = self.read_byte();
            let op = Op::try_from(byte).expect("compiler never emits an invalid opcode byte");
            match op {
                Op::Const => {
                    let idx = self.read_u16();
                    let v = self.current_frame().chunk.constant(idx);
                    let (file, line) = self.err_loc();
                    self.stack.push(v, &file, line)?;
                }
                Op::Nil => {
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Nil, &file, line)?;
                }
                Op::True => {
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(true), &file, line)?;
                }
                Op::False => {
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(false), &file, line)?;
                }
                Op::Pop => {
                    self.stack.pop();
                }
                Op::Dup => {
                    let v = self.stack.peek(0);
                    let (file, line) = self.err_loc();
                    self.stack.push(v, &file, line)?;
                }

                Op::GetLocal => {
                    let slot = self.read_u16() as usize;
                    let fp = self.current_frame().fp;
                    let v = self.stack.get(fp + slot);
                    let (file, line) = self.err_loc();
                    self.stack.push(v, &file, line)?;
                }
                Op::SetLocal => {
                    let slot = self.read_u16() as usize;
                    let fp = self.current_frame().fp;
                    let v = self.stack.peek(0);
                    self.stack.set(fp + slot, v);
                }
                Op::GetGlobal => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let v = self
                        .globals
                        .as_environment()
                        .expect("globals is always an Environment")
                        .get(&name)
                        .ok_or_else(|| {
                            let (file, line) = self.err_loc();
                            RuntimeError::UndefinedVariable { file, line, name: name.clone().into() }
                        })?;
                    let (file, line) = self.err_loc();
                    self.stack.push(v, &file, line)?;
                }
                Op::SetGlobal | Op::DefineGlobal => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let v = self.stack.peek(0);
                    self.globals
                        .as_environment()
                        .expect("globals is always an Environment")
                        .define(&name, v);
                }
                Op::GetUpvalue => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let env = self.current_frame().closure_env.expect("GetUpvalue outside a closure");
                    let v = env.as_environment().unwrap().get(&name).ok_or_else(|| {
                        let (file, line) = self.err_loc();
                        RuntimeError::UndefinedVariable { file, line, name: name.clone().into() }
                    })?;
                    let (file, line) = self.err_loc();
                    self.stack.push(v, &file, line)?;
                }
                Op::SetUpvalue => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let env = self.current_frame().closure_env.expect("SetUpvalue outside a closure");
                    let v = self.stack.peek(0);
                    if env.as_environment().unwrap().set(&name, v) {
                        self.heap.write_barrier(env, v);
                    }
                }
                Op::DefineUpvalue => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let env = self.current_frame().closure_env.expect("DefineUpvalue outside a closure");
                    let v = self.stack.peek(0);
                    env.as_environment().unwrap().define(&name, v);
                    self.heap.write_barrier(env, v);
                }

                Op::Add => self.binary_add()?,
                Op::Sub => self.binary_numeric(|a, b| a - b, |a, b| a - b)?,
                Op::Mul => self.binary_numeric(|a, b| a * b, |a, b| a * b)?,
                Op::Div => self.binary_divide()?,
                Op::Mod => self.binary_mod()?,
                Op::AddInt => {
                    let b = self.stack.pop().as_int().expect("AddInt operand not int");
                    let a = self.stack.pop().as_int().expect("AddInt operand not int");
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Int(a + b), &file, line)?;
                }
                Op::SubInt => {
                    let b = self.stack.pop().as_int().expect("SubInt operand not int");
                    let a = self.stack.pop().as_int().expect("SubInt operand not int");
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Int(a - b), &file, line)?;
                }
                Op::MulInt => {
                    let b = self.stack.pop().as_int().expect("MulInt operand not int");
                    let a = self.stack.pop().as_int().expect("MulInt operand not int");
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Int(a * b), &file, line)?;
                }
                Op::DivInt => {
                    let b = self.stack.pop().as_int().expect("DivInt operand not int");
                    let a = self.stack.pop().as_int().expect("DivInt operand not int");
                    let (file, line) = self.err_loc();
                    if b == 0 {
                        return Err(RuntimeError::DivisionByZero { file, line });
                    }
                    self.stack.push(Value::Int(a / b), &file, line)?;
                }
                Op::IncLocal => {
                    let slot = self.read_u16() as usize;
                    let fp = self.current_frame().fp;
                    if let Value::Int(i) = self.stack.get(fp + slot) {
                        self.stack.set(fp + slot, Value::Int(i + 1));
                    }
                }
                Op::DecLocal => {
                    let slot = self.read_u16() as usize;
                    let fp = self.current_frame().fp;
                    if let Value::Int(i) = self.stack.get(fp + slot) {
                        self.stack.set(fp + slot, Value::Int(i - 1));
                    }
                }
                Op::Neg => {
                    let v = self.stack.pop();
                    let (file, line) = self.err_loc();
                    let negated = match v {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(RuntimeError::TypeMismatch {
                                file: file.clone(),
                                line,
                                expected: "int or float".into(),
                                got: other.type_name().into(),
                            })
                        }
                    };
                    self.stack.push(negated, &file, line)?;
                }
                Op::Not => {
                    let v = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(!v.is_truthy()), &file, line)?;
                }
                Op::Eq => {
                    let b = self.stack.pop();
                    let a = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(a == b), &file, line)?;
                }
                Op::NotEq => {
                    let b = self.stack.pop();
                    let a = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(a != b), &file, line)?;
                }
                Op::Less => self.compare(|o| o == std::cmp::Ordering::Less)?,
                Op::LessEq => self.compare(|o| o != std::cmp::Ordering::Greater)?,
                Op::Greater => self.compare(|o| o == std::cmp::Ordering::Greater)?,
                Op::GreaterEq => self.compare(|o| o != std::cmp::Ordering::Less)?,
                Op::And => {
                    let b = self.stack.pop();
                    let a = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(a.is_truthy() && b.is_truthy()), &file, line)?;
                }
                Op::Or => {
                    let b = self.stack.pop();
                    let a = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Bool(a.is_truthy() || b.is_truthy()), &file, line)?;
                }

                Op::NewArray => {
                    let count = self.read_u16() as usize;
                    let mut items = Vec::with_capacity(count);
                    for _ in 0..count {
                        items.push(self.stack.pop());
                    }
                    items.reverse();
                    let mut arr = ArrayObj::new();
                    for item in items {
                        arr.push(item);
                    }
                    let r = self.heap.alloc(Obj::Array(RefCell::new(arr)));
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Obj(r), &file, line)?;
                }
                Op::NewMap => {
                    let count = self.read_u16() as usize;
                    let mut pairs = Vec::with_capacity(count);
                    for _ in 0..count {
                        let v = self.stack.pop();
                        let k = self.stack.pop();
                        pairs.push((k, v));
                    }
                    let mut map = MapObj::new();
                    for (k, v) in pairs.into_iter().rev() {
                        let key = MapKey::from_value(&k).ok_or_else(|| {
                            let (file, line) = self.err_loc();
                            RuntimeError::TypeMismatch {
                                file,
                                line,
                                expected: "int or string key".into(),
                                got: k.type_name().into(),
                            }
                        })?;
                        map.set(key, v);
                    }
                    let r = self.heap.alloc(Obj::Map(RefCell::new(map)));
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Obj(r), &file, line)?;
                }
                Op::Index => {
                    let index = self.stack.pop();
                    let target = self.stack.pop();
                    let (file, line) = self.err_loc();
                    let result = self.index_get(target, index, &file, line)?;
                    self.stack.push(result, &file, line)?;
                }
                Op::SetIndex => {
                    let value = self.stack.pop();
                    let index = self.stack.pop();
                    let target = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.index_set(target, index, value, &file, line)?;
                    self.stack.push(value, &file, line)?;
                }
                Op::GetField => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let target = self.stack.pop();
                    let (file, line) = self.err_loc();
                    let v = self.field_get(target, &name, &file, line)?;
                    self.stack.push(v, &file, line)?;
                }
                Op::SetField => {
                    let idx = self.read_u16();
                    let name = self.constant_name(idx)?;
                    let value = self.stack.pop();
                    let target = self.stack.pop();
                    let (file, line) = self.err_loc();
                    self.field_set(target, &name, value, &file, line)?;
                    self.stack.push(value, &file, line)?;
                }

                Op::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().unwrap().ip += offset;
                }
                Op::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if !self.stack.peek(0).is_truthy() {
                        self.frames.last_mut().unwrap().ip += offset;
                    }
                }
                Op::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().unwrap().ip -= offset;
                    self.safepoint();
                }

                Op::Call => {
                    let argc = self.read_byte() as usize;
                    self.call_value(argc)?;
                    self.safepoint();
                }
                Op::AsyncCall => {
                    let argc = self.read_byte() as usize;
                    let result = self.async_call_value(argc)?;
                    let (file, line) = self.err_loc();
                    self.stack.push(result, &file, line)?;
                }
                Op::Await => {
                    let v = self.stack.pop();
                    let (file, line) = self.err_loc();
                    let result = match v {
                        Value::Obj(r) if r.as_future().is_some() => {
                            crate::future::await_future(r.as_future().unwrap())
                        }
                        // Awaiting a non-Future is a passthrough (spec.md §9
                        // open question, resolved: return the value as-is).
                        other => other,
                    };
                    self.stack.push(result, &file, line)?;
                }
                Op::Return => {
                    let result = self.stack.pop();
                    let frame = self.frames.pop().expect("Return with no active frame");
                    self.stack.truncate(frame.fp);
                    if self.frames.is_empty() {
                        return Ok(result);
                    }
                    let (file, line) = self.err_loc();
                    self.stack.push(result, &file, line)?;
                    self.safepoint();
                }
                Op::Halt => {
                    let result = if self.stack.len() > 0 { self.stack.pop() } else { Value::Nil };
                    return Ok(result);
                }

                Op::MakeClosure => {
                    let chunk_idx = self.read_u16();
                    let name_idx = self.read_u16();
                    let arity = self.read_byte();
                    let is_async = self.read_byte() != 0;
                    let name = self.constant_name(name_idx)?;
                    let parent_env = self.current_frame().closure_env;
                    let env = self.heap.alloc(Obj::Environment(EnvironmentObj::new(parent_env)));
                    let func = self.heap.alloc(Obj::Function(FunctionObj {
                        name: name.into_boxed_str(),
                        arity,
                        is_variadic: false,
                        is_async,
                        kind: FunctionKind::Bytecode { chunk_id: chunk_idx as u32 },
                        closure_env: Some(env),
                    }));
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Obj(func), &file, line)?;
                }
                Op::MakeStruct => {
                    let def_idx = self.read_u16();
                    let field_count = self.read_u16() as usize;
                    let def_name = self.constant_name(def_idx)?;
                    let def = self
                        .globals
                        .as_environment()
                        .unwrap()
                        .get(&def_name)
                        .and_then(|v| match v {
                            Value::Obj(r) if r.as_struct_def().is_some() => Some(r),
                            _ => None,
                        })
                        .ok_or_else(|| {
                            let (file, line) = self.err_loc();
                            RuntimeError::UndefinedVariable { file, line, name: def_name.clone().into() }
                        })?;
                    let mut fields = Vec::with_capacity(field_count);
                    for _ in 0..field_count {
                        fields.push(self.stack.pop());
                    }
                    fields.reverse();
                    let instance = self.heap.alloc(Obj::StructInstance(RefCell::new(StructInstanceObj {
                        def,
                        fields,
                    })));
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Obj(instance), &file, line)?;
                }

                Op::MakeStructDef => {
                    let name_idx = self.read_u16();
                    let field_count = self.read_u16() as usize;
                    let name = self.constant_name(name_idx)?;
                    let mut fields = Vec::with_capacity(field_count);
                    for _ in 0..field_count {
                        fields.push(self.stack.pop());
                    }
                    fields.reverse();
                    let field_names: Box<[Box<str>]> = fields
                        .into_iter()
                        .map(|v| match v {
                            Value::Obj(r) if r.as_string().is_some() => {
                                r.as_string().unwrap().as_str().to_string().into_boxed_str()
                            }
                            _ => panic!("struct def field name constant is not a string"),
                        })
                        .collect();
                    let def = self.heap.alloc(Obj::StructDef(seq_core::StructDefObj {
                        name: name.into_boxed_str(),
                        fields: field_names,
                    }));
                    let (file, line) = self.err_loc();
                    self.stack.push(Value::Obj(def), &file, line)?;
                }

                Op::Print => {
                    let v = self.stack.pop();
                    print_value(&v);
                }
            }
        }
    }

    fn constant_name(&self, idx: u16) -> Result<String, RuntimeError> {
        let v = self.current_frame().chunk.constant(idx);
        match v {
            Value::Obj(r) if r.as_string().is_some() => Ok(r.as_string().unwrap().as_str().to_string()),
            _ => panic!("constant at index {idx} is not a string"),
        }
    }

    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let (file, line) = self.err_loc();
        let is_str = |v: &Value| matches!(v, Value::Obj(r) if r.as_string().is_some());
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            _ if is_str(&a) || is_str(&b) => {
                let mut combined = stringify_value(&a);
                combined.push_str(&stringify_value(&b));
                Value::Obj(self.heap.alloc_string(&combined))
            }
            (x, y) => match (x.as_float(), y.as_float()) {
                (Some(fx), Some(fy)) => Value::Float(fx + fy),
                _ => {
                    return Err(RuntimeError::TypeMismatch {
                        file,
                        line,
                        expected: "matching numeric or string operands".into(),
                        got: format!("{} and {}", x.type_name(), y.type_name()).into(),
                    })
                }
            },
        };
        self.stack.push(result, &file, line)
    }

    fn binary_numeric(
        &mut self,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<(), RuntimeError> {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let (file, line) = self.err_loc();
        let result = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(int_op(x, y)),
            (x, y) => match (x.as_float(), y.as_float()) {
                (Some(fx), Some(fy)) => Value::Float(float_op(fx, fy)),
                _ => {
                    return Err(RuntimeError::TypeMismatch {
                        file,
                        line,
                        expected: "numeric operands".into(),
                        got: format!("{} and {}", x.type_name(), y.type_name()).into(),
                    })
                }
            },
        };
        self.stack.push(result, &file, line)
    }

    fn binary_divide(&mut self) -> Result<(), RuntimeError> {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let (file, line) = self.err_loc();
        let result = match (a, b) {
            (Value::Int(_), Value::Int(0)) => {
                return Err(RuntimeError::DivisionByZero { file, line })
            }
            (Value::Int(x), Value::Int(y)) => Value::Int(x / y),
            (x, y) => match (x.as_float(), y.as_float()) {
                (Some(fx), Some(fy)) => Value::Float(fx / fy),
                _ => {
                    return Err(RuntimeError::TypeMismatch {
                        file,
                        line,
                        expected: "numeric operands".into(),
                        got: format!("{} and {}", x.type_name(), y.type_name()).into(),
                    })
                }
            },
        };
        self.stack.push(result, &file, line)
    }

    fn binary_mod(&mut self) -> Result<(), RuntimeError> {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let (file, line) = self.err_loc();
        let result = match (a, b) {
            (Value::Int(_), Value::Int(0)) => {
                return Err(RuntimeError::DivisionByZero { file, line })
            }
            (Value::Int(x), Value::Int(y)) => Value::Int(x % y),
            (x, y) => {
                return Err(RuntimeError::TypeMismatch {
                    file,
                    line,
                    expected: "int operands".into(),
                    got: format!("{} and {}", x.type_name(), y.type_name()).into(),
                })
            }
        };
        self.stack.push(result, &file, line)
    }

    fn compare(&mut self, accept: fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let b = self.stack.pop();
        let a = self.stack.pop();
        let (file, line) = self.err_loc();
        let (fx, fy) = match (a.as_float(), b.as_float()) {
            (Some(fx), Some(fy)) => (fx, fy),
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    file,
                    line,
                    expected: "numeric operands".into(),
                    got: format!("{} and {}", a.type_name(), b.type_name()).into(),
                })
            }
        };
        let ordering = fx.partial_cmp(&fy).unwrap_or(std::cmp::Ordering::Greater);
        self.stack.push(Value::Bool(accept(ordering)), &file, line)
    }

    fn index_get(&self, target: Value, index: Value, file: &str, line: u32) -> Result<Value, RuntimeError> {
        match target {
            Value::Obj(r) if r.as_array().is_some() => {
                let i = index.as_int().ok_or_else(|| RuntimeError::TypeMismatch {
                    file: file.into(),
                    line,
                    expected: "int index".into(),
                    got: index.type_name().into(),
                })?;
                let arr = r.as_array().unwrap().borrow();
                arr.get(i).ok_or_else(|| RuntimeError::IndexOutOfBounds {
                    file: file.into(),
                    line,
                    index: i,
                    len: arr.len(),
                })
            }
            Value::Obj(r) if r.as_map().is_some() => {
                let key = MapKey::from_value(&index).ok_or_else(|| RuntimeError::TypeMismatch {
                    file: file.into(),
                    line,
                    expected: "int or string key".into(),
                    got: index.type_name().into(),
                })?;
                Ok(r.as_map().unwrap().borrow().get(&key).unwrap_or(Value::Nil))
            }
            other => Err(RuntimeError::TypeMismatch {
                file: file.into(),
                line,
                expected: "array or map".into(),
                got: other.type_name().into(),
            }),
        }
    }

    fn index_set(
        &self,
        target: Value,
        index: Value,
        value: Value,
        file: &str,
        line: u32,
    ) -> Result<(), RuntimeError> {
        match target {
            Value::Obj(r) if r.as_array().is_some() => {
                let i = index.as_int().ok_or_else(|| RuntimeError::TypeMismatch {
                    file: file.into(),
                    line,
                    expected: "int index".into(),
                    got: index.type_name().into(),
                })?;
                let len = r.as_array().unwrap().borrow().len();
                if !r.as_array().unwrap().borrow_mut().set(i, value) {
                    return Err(RuntimeError::IndexOutOfBounds { file: file.into(), line, index: i, len });
                }
                self.heap.write_barrier(r, value);
                Ok(())
            }
            Value::Obj(r) if r.as_map().is_some() => {
                let key = MapKey::from_value(&index).ok_or_else(|| RuntimeError::TypeMismatch {
                    file: file.into(),
                    line,
                    expected: "int or string key".into(),
                    got: index.type_name().into(),
                })?;
                r.as_map().unwrap().borrow_mut().set(key, value);
                self.heap.write_barrier(r, value);
                Ok(())
            }
            other => Err(RuntimeError::TypeMismatch {
                file: file.into(),
                line,
                expected: "array or map".into(),
                got: other.type_name().into(),
            }),
        }
    }

    fn field_get(&self, target: Value, name: &str, file: &str, line: u32) -> Result<Value, RuntimeError> {
        match target {
            Value::Obj(r) if r.as_struct_instance().is_some() => {
                let inst = r.as_struct_instance().unwrap().borrow();
                let def = inst.def.as_struct_def().expect("struct instance def is always a StructDef");
                let idx = def.field_index(name).ok_or_else(|| RuntimeError::NoSuchField {
                    file: file.into(),
                    line,
                    name: name.into(),
                })?;
                Ok(inst.fields[idx])
            }
            Value::Obj(r) if r.as_module().is_some() => {
                let module = r.as_module().unwrap();
                module.environment.as_environment().unwrap().get(name).ok_or_else(|| {
                    RuntimeError::UndefinedVariable {
                        file: file.into(),
                        line,
                        name: format!("{}.{name}", module.name).into(),
                    }
                })
            }
            other => Err(RuntimeError::TypeMismatch {
                file: file.into(),
                line,
                expected: "struct or module".into(),
                got: other.type_name().into(),
            }),
        }
    }

    fn field_set(
        &self,
        target: Value,
        name: &str,
        value: Value,
        file: &str,
        line: u32,
    ) -> Result<(), RuntimeError> {
        match target {
            Value::Obj(r) if r.as_struct_instance().is_some() => {
                let mut inst = r.as_struct_instance().unwrap().borrow_mut();
                let def = inst.def.as_struct_def().expect("struct instance def is always a StructDef");
                let idx = def.field_index(name).ok_or_else(|| RuntimeError::NoSuchField {
                    file: file.into(),
                    line,
                    name: name.into(),
                })?;
                inst.fields[idx] = value;
                drop(inst);
                self.heap.write_barrier(r, value);
                Ok(())
            }
            other => Err(RuntimeError::TypeMismatch {
                file: file.into(),
                line,
                expected: "struct".into(),
                got: other.type_name().into(),
            }),
        }
    }

    fn call_value(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.stack.peek(argc);
        let (file, line) = self.err_loc();
        let func_ref = match callee {
            Value::Obj(r) if r.is_function() => r,
            other => {
                return Err(RuntimeError::NotCallable { file, line, type_name: other.type_name().into() })
            }
        };
        let func = func_ref.as_function().unwrap();
        if func.arity as usize != argc && !func.is_variadic {
            return Err(RuntimeError::ArityMismatch { file, line, expected: func.arity, got: argc as u8 });
        }
        match func.kind {
            FunctionKind::Native { native_id } => {
                let base = self.stack.len() - argc;
                let args: Vec<Value> = (base..self.stack.len()).map(|i| self.stack.get(i)).collect();
                let result = self.modules.registry.call(native_id, &args)?;
                self.stack.truncate(base - 1);
                self.stack.push(result, &file, line)?;
            }
            FunctionKind::Bytecode { chunk_id } => {
                if self.frames.len() >= MAX_CALL_DEPTH {
                    return Err(RuntimeError::StackOverflow { file, line });
                }
                let chunk = self.chunks[chunk_id as usize].clone();
                let fp = self.stack.len() - argc - 1;
                self.frames.push(CallFrame { chunk, ip: 0, fp, closure_env: func.closure_env });
            }
        }
        Ok(())
    }

    /// `ASYNC_CALL`: allocate a `Future`, spawn a `may` strand running a
    /// fresh `Interpreter` over the callee, and leave the (still-pending)
    /// `Future` on the stack (`spec.md` §4.9).
    fn async_call_value(&mut self, argc: usize) -> Result<Value, RuntimeError> {
        let callee = self.stack.peek(argc);
        let (file, line) = self.err_loc();
        let func_ref = match callee {
            Value::Obj(r) if r.is_function() => r,
            other => {
                return Err(RuntimeError::NotCallable { file, line, type_name: other.type_name().into() })
            }
        };
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.stack.pop());
        }
        args.reverse();
        self.stack.pop(); // the callee itself

        let future = self.heap.alloc(Obj::Future(seq_core::FutureObj::new()));
        let heap = self.heap.clone();
        let modules = self.modules.clone();
        let chunks = self.chunks.clone();
        let globals = self.globals;
        let registry = self.strands.clone();
        let worker_strands = self.strands.clone();

        crate::future::spawn_strand(registry, future, move || {
            let mut worker = Interpreter::with_strands(globals, heap, modules, chunks, worker_strands);
            let func = func_ref.as_function().expect("async callee is always a Function");
            match func.kind {
                FunctionKind::Bytecode { chunk_id } => {
                    let chunk = worker.chunks[chunk_id as usize].clone();
                    let fp = 0;
                    for a in &args {
                        let _ = worker.stack.push(*a, "<async>", 0);
                    }
                    worker.frames.push(CallFrame { chunk, ip: 0, fp, closure_env: func.closure_env });
                    worker.dispatch().unwrap_or(Value::Nil)
                }
                FunctionKind::Native { native_id } => {
                    worker.modules.registry.call(native_id, &args).unwrap_or(Value::Nil)
                }
            }
        });
        Ok(Value::Obj(future))
    }
}

/// Render a value the way `print` and `+`'s string-concatenation side
/// display it: strings verbatim, `Int`/`Float` in decimal, `Bool` as
/// `"true"`/`"false"`, `Nil` as `"nil"`, and any other heap object in its
/// `<typename>` form (`spec.md:142`).
fn stringify_value(v: &Value) -> String {
    match v {
        Value::Obj(r) if r.as_string().is_some() => r.as_string().unwrap().as_str().to_string(),
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Obj(r) => format!("<{}>", r.type_name()),
    }
}

fn print_value(v: &Value) {
    println!("{}", stringify_value(v));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkBuilder;
    use crate::registry::ModuleRegistry;
    use seq_core::EnvironmentObj;

    fn make_interpreter() -> Interpreter {
        let heap = Arc::new(Heap::new());
        let globals = heap.alloc_permanent(Obj::Environment(EnvironmentObj::new(None)));
        let alloc = |o: Obj| heap.alloc_permanent(o);
        let modules = Arc::new(ModuleRegistry::bootstrap(&alloc));
        modules.install_into_globals(globals);
        Interpreter::new(globals, heap, modules, Rc::new(Vec::new()))
    }

    #[test]
    fn arithmetic_and_halt() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let one = b.add_constant(Value::Int(1));
        let two = b.add_constant(Value::Int(2));
        b.emit_op(Op::Const, 1);
        b.emit_u16(one, 1);
        b.emit_op(Op::Const, 1);
        b.emit_u16(two, 1);
        b.emit_op(Op::Add, 1);
        b.emit_op(Op::Halt, 1);
        let chunk = Arc::new(b.finish());
        let result = interp.run(chunk).unwrap();
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn mul_int_and_div_int_compute_correctly() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let six = b.add_constant(Value::Int(6));
        let seven = b.add_constant(Value::Int(7));
        b.emit_op(Op::Const, 1);
        b.emit_u16(six, 1);
        b.emit_op(Op::Const, 1);
        b.emit_u16(seven, 1);
        b.emit_op(Op::MulInt, 1);
        let two = b.add_constant(Value::Int(2));
        b.emit_op(Op::Const, 2);
        b.emit_u16(two, 2);
        b.emit_op(Op::DivInt, 2);
        b.emit_op(Op::Halt, 2);
        let chunk = Arc::new(b.finish());
        let result = interp.run(chunk).unwrap();
        assert_eq!(result, Value::Int(21));
    }

    #[test]
    fn div_int_by_zero_is_a_runtime_error() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let one = b.add_constant(Value::Int(1));
        let zero = b.add_constant(Value::Int(0));
        b.emit_op(Op::Const, 1);
        b.emit_u16(one, 1);
        b.emit_op(Op::Const, 1);
        b.emit_u16(zero, 1);
        b.emit_op(Op::DivInt, 1);
        b.emit_op(Op::Halt, 1);
        let chunk = Arc::new(b.finish());
        let err = interp.run(chunk).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn add_stringifies_the_non_string_side() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let prefix = b.add_constant(Value::Obj(interp.heap.alloc_string("x=")));
        let one = b.add_constant(Value::Int(1));
        b.emit_op(Op::Const, 1);
        b.emit_u16(prefix, 1);
        b.emit_op(Op::Const, 1);
        b.emit_u16(one, 1);
        b.emit_op(Op::Add, 1);
        b.emit_op(Op::Halt, 1);
        let chunk = Arc::new(b.finish());
        let result = interp.run(chunk).unwrap();
        let Value::Obj(r) = result else {
            panic!("expected a String, got {result:?}")
        };
        assert_eq!(r.as_string().expect("Add result is a String").as_str(), "x=1");
    }

    #[test]
    fn add_stringifies_bool_and_nil_on_the_right_of_a_string() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let prefix = b.add_constant(Value::Obj(interp.heap.alloc_string("v:")));
        b.emit_op(Op::Const, 1);
        b.emit_u16(prefix, 1);
        b.emit_op(Op::True, 1);
        b.emit_op(Op::Add, 1);
        let prefix2 = b.add_constant(Value::Obj(interp.heap.alloc_string("n:")));
        b.emit_op(Op::Const, 2);
        b.emit_u16(prefix2, 2);
        b.emit_op(Op::Nil, 2);
        b.emit_op(Op::Add, 2);
        b.emit_op(Op::Halt, 2);
        let chunk = Arc::new(b.finish());
        let result = interp.run(chunk).unwrap();
        let Value::Obj(r) = result else {
            panic!("expected a String, got {result:?}")
        };
        assert_eq!(r.as_string().expect("Add result is a String").as_str(), "n:nil");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let one = b.add_constant(Value::Int(1));
        let zero = b.add_constant(Value::Int(0));
        b.emit_op(Op::Const, 1);
        b.emit_u16(one, 1);
        b.emit_op(Op::Const, 1);
        b.emit_u16(zero, 1);
        b.emit_op(Op::Div, 1);
        b.emit_op(Op::Halt, 1);
        let chunk = Arc::new(b.finish());
        let err = interp.run(chunk).unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn loop_with_inc_local_counts_to_ten() {
        let mut interp = make_interpreter();
        let mut b = ChunkBuilder::new("main", "test.seq");
        let zero = b.add_constant(Value::Int(0));
        let ten = b.add_constant(Value::Int(10));
        b.emit_op(Op::Const, 1); // local 0 = 0
        b.emit_u16(zero, 1);
        let loop_start = b.offset();
        b.emit_op(Op::GetLocal, 2);
        b.emit_u16(0, 2);
        b.emit_op(Op::Const, 2);
        b.emit_u16(ten, 2);
        b.emit_op(Op::Less, 2);
        let exit_jump = b.offset();
        b.emit_op(Op::JumpIfFalse, 2);
        b.emit_u16(0xffff, 2);
        b.emit_op(Op::Pop, 2);
        b.emit_op(Op::IncLocal, 3);
        b.emit_u16(0, 3);
        b.emit_loop(loop_start, 3);
        b.patch_jump(exit_jump + 1);
        b.emit_op(Op::Pop, 4);
        b.emit_op(Op::GetLocal, 5);
        b.emit_u16(0, 5);
        b.emit_op(Op::Halt, 5);
        let chunk = Arc::new(b.finish());
        let result = interp.run(chunk).unwrap();
        assert_eq!(result, Value::Int(10));
    }
}
