//! Bytecode code generation (`spec.md` §4.2/§4.6, C5).
//!
//! Walks the already-resolved, already-specialized AST (`resolver`,
//! `specialize`) and emits a `Chunk` per function plus one for the
//! top-level script, with jump-patch bookkeeping for `if`/`while` and a
//! string-intern hook that allocates identifier/literal strings straight
//! into the runtime's string pool as it walks — grounded on the teacher's
//! own codegen pass (`examples/navicore-cem3/crates/compiler/src/codegen.rs`),
//! generalized from word-at-a-time emission to expression/statement
//! emission.
//!
//! Compilation is not heap-independent: string constants are real interned
//! `GcRef`s, so codegen needs a live `Heap` to allocate into — the same one
//! the `Runtime` that will execute the result already owns.

use crate::ast::{AssignTarget, BinaryOp, Expr, FunctionDef, Program, Stmt, UnaryOp};
use seq_runtime::chunk::{Chunk, ChunkBuilder, Op, MAX_CONSTANTS};
use seq_runtime::error::CompileError;
use seq_runtime::gc::Heap;
use seq_core::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Compile a fully resolved and specialized `Program` into the chunk table
/// a `Runtime` loads. `chunks[0]` is always the top-level script
/// (`seq_runtime::Runtime::load_chunks`'s convention).
pub fn compile_program(program: &Program, file: &str, heap: Arc<Heap>) -> Result<Vec<Chunk>, CompileError> {
    let mut codegen = Codegen {
        heap,
        file: file.into(),
        chunks: Vec::new(),
        struct_defs: HashMap::new(),
        locals_stack: Vec::new(),
        string_cache_stack: Vec::new(),
    };
    codegen.collect_struct_defs(&program.statements);

    codegen.string_cache_stack.push(HashMap::new());
    let mut builder = ChunkBuilder::new("main", &*codegen.file);
    for stmt in &program.statements {
        codegen.compile_stmt(&mut builder, stmt)?;
    }
    builder.emit_op(Op::Halt, 0);
    codegen.string_cache_stack.pop();

    let mut all = Vec::with_capacity(codegen.chunks.len() + 1);
    all.push(builder.finish());
    all.extend(codegen.chunks);
    Ok(all)
}

struct Codegen {
    heap: Arc<Heap>,
    file: Box<str>,
    /// Completed function chunks, in allocation order. `chunks[k]` ends up
    /// at runtime index `k + 1` once the top-level chunk is prepended.
    chunks: Vec<Chunk>,
    /// Struct name -> declared field order, pre-scanned so a struct literal
    /// anywhere in the program can push its fields in the right order
    /// regardless of how the literal itself wrote them.
    struct_defs: HashMap<String, Vec<String>>,
    /// Count of locals currently live in the innermost enclosing function.
    /// Empty means "at global scope". A sibling block reuses slots by
    /// restoring this count at block exit, mirroring the resolver exactly.
    locals_stack: Vec<usize>,
    string_cache_stack: Vec<HashMap<String, u16>>,
}

impl Codegen {
    fn collect_struct_defs(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::StructDef { name, fields, .. } => {
                    self.struct_defs.insert(name.clone(), fields.clone());
                }
                Stmt::If { then_branch, else_branch, .. } => {
                    self.collect_struct_defs(then_branch);
                    if let Some(else_branch) = else_branch {
                        self.collect_struct_defs(else_branch);
                    }
                }
                Stmt::While { body, .. } => self.collect_struct_defs(body),
                Stmt::FunctionDef(def) => self.collect_struct_defs(&def.body),
                _ => {}
            }
        }
    }

    fn is_local(&self) -> bool {
        !self.locals_stack.is_empty()
    }

    fn declare_local(&mut self) {
        if let Some(top) = self.locals_stack.last_mut() {
            *top += 1;
        }
    }

    fn begin_block(&self) -> usize {
        *self.locals_stack.last().unwrap_or(&0)
    }

    /// Restore the local count to `mark`, emitting one `Pop` per slot that
    /// falls out of scope — required for correctness, not just cleanliness:
    /// the resolver reuses slot numbers across sibling blocks, so the next
    /// block's "slot 0" only lines up with the right stack cell if this
    /// block's own locals were actually popped off first.
    fn end_block(&mut self, b: &mut ChunkBuilder, mark: usize, line: u32) {
        if let Some(top) = self.locals_stack.last_mut() {
            let current = *top;
            if current > mark {
                for _ in 0..(current - mark) {
                    b.emit_op(Op::Pop, line);
                }
                *top = mark;
            }
        }
    }

    fn string_constant(&mut self, b: &mut ChunkBuilder, s: &str) -> Result<u16, CompileError> {
        if let Some(&idx) = self.string_cache_stack.last().expect("no active chunk").get(s) {
            return Ok(idx);
        }
        if b.constants_len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants { file: self.file.clone(), line: 0 });
        }
        let r = self.heap.alloc_string(s);
        let idx = b.add_constant(Value::Obj(r));
        self.string_cache_stack.last_mut().unwrap().insert(s.to_string(), idx);
        Ok(idx)
    }

    fn emit_const(&mut self, b: &mut ChunkBuilder, v: Value, line: u32) -> Result<(), CompileError> {
        if b.constants_len() >= MAX_CONSTANTS {
            return Err(CompileError::TooManyConstants { file: self.file.clone(), line });
        }
        let idx = b.add_constant(v);
        b.emit_op(Op::Const, line);
        b.emit_u16(idx, line);
        Ok(())
    }

    fn patch_jump(&self, b: &mut ChunkBuilder, patch_offset: usize, line: u32) -> Result<(), CompileError> {
        let distance = b.offset() - (patch_offset + 2);
        if distance > u16::MAX as usize {
            return Err(CompileError::JumpOutOfRange { file: self.file.clone(), line });
        }
        b.patch_jump(patch_offset);
        Ok(())
    }

    fn emit_loop(&self, b: &mut ChunkBuilder, loop_start: usize, line: u32) -> Result<(), CompileError> {
        let would_be_offset = (b.offset() + 1).saturating_sub(loop_start) + 2;
        if would_be_offset > u16::MAX as usize {
            return Err(CompileError::JumpOutOfRange { file: self.file.clone(), line });
        }
        b.emit_loop(loop_start, line);
        Ok(())
    }

    fn compile_function_def(&mut self, def: &FunctionDef) -> Result<u32, CompileError> {
        self.string_cache_stack.push(HashMap::new());
        let mut builder = ChunkBuilder::new(def.name.as_str(), &*self.file);
        self.locals_stack.push(def.params.len());
        for stmt in &def.body {
            self.compile_stmt(&mut builder, stmt)?;
        }
        let end_line = def.loc.end_line as u32;
        builder.emit_op(Op::Nil, end_line);
        builder.emit_op(Op::Return, end_line);
        self.locals_stack.pop();
        self.string_cache_stack.pop();

        let idx = (self.chunks.len() + 1) as u32;
        self.chunks.push(builder.finish());
        Ok(idx)
    }

    fn compile_stmt(&mut self, b: &mut ChunkBuilder, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Let { name, value, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, value, line)?;
                if self.is_local() {
                    self.declare_local();
                } else {
                    let idx = self.string_constant(b, name)?;
                    b.emit_op(Op::DefineGlobal, line);
                    b.emit_u16(idx, line);
                    b.emit_op(Op::Pop, line);
                }
            }
            Stmt::LetUpvalue { name, value, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, value, line)?;
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::DefineUpvalue, line);
                b.emit_u16(idx, line);
                b.emit_op(Op::Pop, line);
            }
            Stmt::Assign { target, value, loc } => {
                self.compile_assign(b, target, value, loc.start_line as u32)?;
            }
            Stmt::IncLocal(slot) => {
                b.emit_op(Op::IncLocal, 0);
                b.emit_u16(*slot, 0);
            }
            Stmt::DecLocal(slot) => {
                b.emit_op(Op::DecLocal, 0);
                b.emit_u16(*slot, 0);
            }
            Stmt::Expr(expr) => {
                self.compile_expr(b, expr, 0)?;
                b.emit_op(Op::Pop, 0);
            }
            Stmt::If { cond, then_branch, else_branch, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, cond, line)?;
                let else_jump = b.offset();
                b.emit_op(Op::JumpIfFalse, line);
                b.emit_u16(0xffff, line);
                b.emit_op(Op::Pop, line);

                let mark = self.begin_block();
                for s in then_branch {
                    self.compile_stmt(b, s)?;
                }
                self.end_block(b, mark, line);

                let end_jump = b.offset();
                b.emit_op(Op::Jump, line);
                b.emit_u16(0xffff, line);
                self.patch_jump(b, else_jump + 1, line)?;
                b.emit_op(Op::Pop, line);

                if let Some(else_branch) = else_branch {
                    let mark = self.begin_block();
                    for s in else_branch {
                        self.compile_stmt(b, s)?;
                    }
                    self.end_block(b, mark, line);
                }
                self.patch_jump(b, end_jump + 1, line)?;
            }
            Stmt::While { cond, body, loc } => {
                let line = loc.start_line as u32;
                let loop_start = b.offset();
                self.compile_expr(b, cond, line)?;
                let exit_jump = b.offset();
                b.emit_op(Op::JumpIfFalse, line);
                b.emit_u16(0xffff, line);
                b.emit_op(Op::Pop, line);

                let mark = self.begin_block();
                for s in body {
                    self.compile_stmt(b, s)?;
                }
                self.end_block(b, mark, line);

                self.emit_loop(b, loop_start, line)?;
                self.patch_jump(b, exit_jump + 1, line)?;
                b.emit_op(Op::Pop, line);
            }
            Stmt::Return { value, loc } => {
                let line = loc.start_line as u32;
                match value {
                    Some(expr) => self.compile_expr(b, expr, line)?,
                    None => b.emit_op(Op::Nil, line),
                }
                b.emit_op(Op::Return, line);
            }
            Stmt::FunctionDef(def) => {
                let line = def.loc.start_line as u32;
                let chunk_idx = self.compile_function_def(def)?;
                let name_idx = self.string_constant(b, &def.name)?;
                b.emit_op(Op::MakeClosure, line);
                b.emit_u16(chunk_idx as u16, line);
                b.emit_u16(name_idx, line);
                b.emit_byte(def.params.len() as u8, line);
                b.emit_byte(def.is_async as u8, line);
                if self.is_local() {
                    self.declare_local();
                } else {
                    b.emit_op(Op::DefineGlobal, line);
                    b.emit_u16(name_idx, line);
                    b.emit_op(Op::Pop, line);
                }
            }
            Stmt::StructDef { name, fields, loc } => {
                let line = loc.start_line as u32;
                self.emit_struct_def_fields(b, fields, line)?;
                let name_idx = self.string_constant(b, name)?;
                b.emit_op(Op::MakeStructDef, line);
                b.emit_u16(name_idx, line);
                b.emit_u16(fields.len() as u16, line);
                b.emit_op(Op::DefineGlobal, line);
                b.emit_u16(name_idx, line);
                b.emit_op(Op::Pop, line);
            }
            Stmt::Print { value, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, value, line)?;
                b.emit_op(Op::Print, line);
            }
        }
        Ok(())
    }

    fn emit_struct_def_fields(&mut self, b: &mut ChunkBuilder, fields: &[String], line: u32) -> Result<(), CompileError> {
        for f in fields {
            let idx = self.string_constant(b, f)?;
            b.emit_op(Op::Const, line);
            b.emit_u16(idx, line);
        }
        Ok(())
    }

    fn compile_assign(
        &mut self,
        b: &mut ChunkBuilder,
        target: &AssignTarget,
        value: &Expr,
        line: u32,
    ) -> Result<(), CompileError> {
        match target {
            AssignTarget::Name(Expr::LocalGet(slot)) => {
                self.compile_expr(b, value, line)?;
                b.emit_op(Op::SetLocal, line);
                b.emit_u16(*slot, line);
                b.emit_op(Op::Pop, line);
            }
            AssignTarget::Name(Expr::GlobalGet(name)) => {
                self.compile_expr(b, value, line)?;
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::SetGlobal, line);
                b.emit_u16(idx, line);
                b.emit_op(Op::Pop, line);
            }
            AssignTarget::Name(Expr::UpvalueGet(name)) => {
                self.compile_expr(b, value, line)?;
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::SetUpvalue, line);
                b.emit_u16(idx, line);
                b.emit_op(Op::Pop, line);
            }
            AssignTarget::Name(_) => {
                return Err(CompileError::InvalidAssignmentTarget { file: self.file.clone(), line });
            }
            AssignTarget::Index { target, index } => {
                self.compile_expr(b, target, line)?;
                self.compile_expr(b, index, line)?;
                self.compile_expr(b, value, line)?;
                b.emit_op(Op::SetIndex, line);
                b.emit_op(Op::Pop, line);
            }
            AssignTarget::Field { target, name } => {
                self.compile_expr(b, target, line)?;
                self.compile_expr(b, value, line)?;
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::SetField, line);
                b.emit_u16(idx, line);
                b.emit_op(Op::Pop, line);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, b: &mut ChunkBuilder, expr: &Expr, line: u32) -> Result<(), CompileError> {
        match expr {
            Expr::Nil => b.emit_op(Op::Nil, line),
            Expr::Bool(true) => b.emit_op(Op::True, line),
            Expr::Bool(false) => b.emit_op(Op::False, line),
            Expr::Int(n) => self.emit_const(b, Value::Int(*n), line)?,
            Expr::Float(f) => self.emit_const(b, Value::Float(*f), line)?,
            Expr::Str(s) => {
                let idx = self.string_constant(b, s)?;
                b.emit_op(Op::Const, line);
                b.emit_u16(idx, line);
            }
            Expr::Ident(name) => {
                return Err(CompileError::UnresolvedLocal {
                    file: self.file.clone(),
                    line,
                    name: name.as_str().into(),
                });
            }
            Expr::LocalGet(slot) => {
                b.emit_op(Op::GetLocal, line);
                b.emit_u16(*slot, line);
            }
            Expr::GlobalGet(name) => {
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::GetGlobal, line);
                b.emit_u16(idx, line);
            }
            Expr::UpvalueGet(name) => {
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::GetUpvalue, line);
                b.emit_u16(idx, line);
            }
            Expr::Unary { op, operand, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, operand, line)?;
                match op {
                    UnaryOp::Neg => b.emit_op(Op::Neg, line),
                    UnaryOp::Not => b.emit_op(Op::Not, line),
                }
            }
            Expr::Binary { op, left, right, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, left, line)?;
                self.compile_expr(b, right, line)?;
                b.emit_op(binary_op_code(*op), line);
            }
            Expr::AddInt(l, r) => {
                self.compile_expr(b, l, line)?;
                self.compile_expr(b, r, line)?;
                b.emit_op(Op::AddInt, line);
            }
            Expr::SubInt(l, r) => {
                self.compile_expr(b, l, line)?;
                self.compile_expr(b, r, line)?;
                b.emit_op(Op::SubInt, line);
            }
            Expr::MulInt(l, r) => {
                self.compile_expr(b, l, line)?;
                self.compile_expr(b, r, line)?;
                b.emit_op(Op::MulInt, line);
            }
            Expr::DivInt(l, r) => {
                self.compile_expr(b, l, line)?;
                self.compile_expr(b, r, line)?;
                b.emit_op(Op::DivInt, line);
            }
            Expr::Array(items) => {
                for item in items {
                    self.compile_expr(b, item, line)?;
                }
                b.emit_op(Op::NewArray, line);
                b.emit_u16(items.len() as u16, line);
            }
            Expr::Map(entries) => {
                for (k, v) in entries {
                    self.compile_expr(b, k, line)?;
                    self.compile_expr(b, v, line)?;
                }
                b.emit_op(Op::NewMap, line);
                b.emit_u16(entries.len() as u16, line);
            }
            Expr::Index { target, index, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, target, line)?;
                self.compile_expr(b, index, line)?;
                b.emit_op(Op::Index, line);
            }
            Expr::Field { target, name, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, target, line)?;
                let idx = self.string_constant(b, name)?;
                b.emit_op(Op::GetField, line);
                b.emit_u16(idx, line);
            }
            Expr::Call { callee, args, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, callee, line)?;
                for a in args {
                    self.compile_expr(b, a, line)?;
                }
                b.emit_op(Op::Call, line);
                b.emit_byte(args.len() as u8, line);
            }
            Expr::AsyncCall { callee, args, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, callee, line)?;
                for a in args {
                    self.compile_expr(b, a, line)?;
                }
                b.emit_op(Op::AsyncCall, line);
                b.emit_byte(args.len() as u8, line);
            }
            Expr::Await { value, loc } => {
                let line = loc.start_line as u32;
                self.compile_expr(b, value, line)?;
                b.emit_op(Op::Await, line);
            }
            Expr::StructLiteral { name, fields, loc } => {
                let line = loc.start_line as u32;
                let declared = self.struct_defs.get(name).cloned().ok_or_else(|| CompileError::Logic {
                    file: self.file.clone(),
                    line,
                    message: format!("unknown struct '{name}'").into(),
                })?;
                for field_name in &declared {
                    let value_expr = fields
                        .iter()
                        .find(|(n, _)| n == field_name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| CompileError::Logic {
                            file: self.file.clone(),
                            line,
                            message: format!("missing field '{field_name}' in struct literal for '{name}'")
                                .into(),
                        })?;
                    self.compile_expr(b, value_expr, line)?;
                }
                let name_idx = self.string_constant(b, name)?;
                b.emit_op(Op::MakeStruct, line);
                b.emit_u16(name_idx, line);
                b.emit_u16(declared.len() as u16, line);
            }
        }
        Ok(())
    }
}

fn binary_op_code(op: BinaryOp) -> Op {
    match op {
        BinaryOp::Add => Op::Add,
        BinaryOp::Sub => Op::Sub,
        BinaryOp::Mul => Op::Mul,
        BinaryOp::Div => Op::Div,
        BinaryOp::Mod => Op::Mod,
        BinaryOp::Eq => Op::Eq,
        BinaryOp::NotEq => Op::NotEq,
        BinaryOp::Less => Op::Less,
        BinaryOp::LessEq => Op::LessEq,
        BinaryOp::Greater => Op::Greater,
        BinaryOp::GreaterEq => Op::GreaterEq,
        BinaryOp::And => Op::And,
        BinaryOp::Or => Op::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use seq_runtime::interpreter::Interpreter;
    use seq_runtime::registry::ModuleRegistry;
    use seq_core::EnvironmentObj;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.seq"), 1)
    }

    fn run(program: &Program) -> Value {
        let heap = Arc::new(Heap::new());
        let chunks = compile_program(program, "t.seq", heap.clone()).unwrap();
        let globals = heap.alloc_permanent(seq_core::Obj::Environment(EnvironmentObj::new(None)));
        let alloc = |o: seq_core::Obj| heap.alloc_permanent(o);
        let modules = Arc::new(ModuleRegistry::bootstrap(&alloc));
        modules.install_into_globals(globals);
        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().map(Arc::new).collect();
        let entry = chunks[0].clone();
        let mut interp = Interpreter::new(globals, heap, modules, Rc::new(chunks));
        interp.run(entry).unwrap()
    }

    #[test]
    fn compiles_literal_addition() {
        let program = Program {
            statements: vec![Stmt::Return {
                value: Some(Expr::AddInt(Box::new(Expr::Int(1)), Box::new(Expr::Int(2)))),
                loc: loc(),
            }],
        };
        assert_eq!(run(&program), Value::Int(3));
    }

    #[test]
    fn compiles_global_let_and_get() {
        let program = Program {
            statements: vec![
                Stmt::Let { name: "x".into(), value: Expr::Int(41), loc: loc() },
                Stmt::Return { value: Some(Expr::GlobalGet("x".into())), loc: loc() },
            ],
        };
        assert_eq!(run(&program), Value::Int(41));
    }

    #[test]
    fn compiles_while_loop_with_inc_local() {
        // Mirrors seq_runtime::interpreter's hand-assembled counting test,
        // but compiled from the AST: local 0 counts from 0 to 10.
        let program = Program {
            statements: vec![
                Stmt::Let { name: "i".into(), value: Expr::Int(0), loc: loc() },
                Stmt::While {
                    cond: Expr::Binary {
                        op: BinaryOp::Less,
                        left: Box::new(Expr::LocalGet(0)),
                        right: Box::new(Expr::Int(10)),
                        loc: loc(),
                    },
                    body: vec![Stmt::IncLocal(0)],
                    loc: loc(),
                },
                Stmt::Return { value: Some(Expr::LocalGet(0)), loc: loc() },
            ],
        };
        assert_eq!(run(&program), Value::Int(10));
    }

    #[test]
    fn compiles_if_else() {
        let program = Program {
            statements: vec![Stmt::If {
                cond: Expr::Bool(false),
                then_branch: vec![Stmt::Return { value: Some(Expr::Int(1)), loc: loc() }],
                else_branch: Some(vec![Stmt::Return { value: Some(Expr::Int(2)), loc: loc() }]),
                loc: loc(),
            }],
        };
        assert_eq!(run(&program), Value::Int(2));
    }

    #[test]
    fn compiles_recursive_function_call() {
        // fn fact(n) { if n < 2 { return 1 } return n * fact(n - 1) }
        let fact_body = vec![
            Stmt::If {
                cond: Expr::Binary {
                    op: BinaryOp::Less,
                    left: Box::new(Expr::LocalGet(0)),
                    right: Box::new(Expr::Int(2)),
                    loc: loc(),
                },
                then_branch: vec![Stmt::Return { value: Some(Expr::Int(1)), loc: loc() }],
                else_branch: None,
                loc: loc(),
            },
            Stmt::Return {
                value: Some(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::LocalGet(0)),
                    right: Box::new(Expr::Call {
                        callee: Box::new(Expr::GlobalGet("fact".into())),
                        args: vec![Expr::Binary {
                            op: BinaryOp::Sub,
                            left: Box::new(Expr::LocalGet(0)),
                            right: Box::new(Expr::Int(1)),
                            loc: loc(),
                        }],
                        loc: loc(),
                    }),
                    loc: loc(),
                }),
                loc: loc(),
            },
        ];
        let program = Program {
            statements: vec![
                Stmt::FunctionDef(FunctionDef {
                    name: "fact".into(),
                    params: vec!["n".into()],
                    body: fact_body,
                    is_async: false,
                    loc: loc(),
                }),
                Stmt::Return {
                    value: Some(Expr::Call {
                        callee: Box::new(Expr::GlobalGet("fact".into())),
                        args: vec![Expr::Int(5)],
                        loc: loc(),
                    }),
                    loc: loc(),
                },
            ],
        };
        assert_eq!(run(&program), Value::Int(120));
    }

    #[test]
    fn reports_jump_out_of_range() {
        // A then-branch long enough to overflow a 16-bit forward jump.
        let mut then_branch = Vec::with_capacity(40_000);
        for _ in 0..40_000 {
            then_branch.push(Stmt::Expr(Expr::Int(1)));
        }
        let program = Program {
            statements: vec![Stmt::If {
                cond: Expr::Bool(true),
                then_branch,
                else_branch: None,
                loc: loc(),
            }],
        };
        let heap = Arc::new(Heap::new());
        let err = compile_program(&program, "t.seq", heap).unwrap_err();
        assert!(matches!(err, CompileError::JumpOutOfRange { .. }));
    }
}
