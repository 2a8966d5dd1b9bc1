//! `seqc`: the AST, resolver, opcode specializer, and bytecode code
//! generator for the Seq language (`spec.md` §4.2, C5).
//!
//! There is no lexer or parser here (`spec.md` §1) — a `Program` arrives
//! already built, either by hand (this crate's own tests) or by an
//! embedder's own front end. `compile` runs the three-stage pipeline the
//! teacher's own compiler runs in spirit, generalized from a stack-effect
//! type checker + LLVM backend to a resolver + specializer + bytecode
//! backend: resolve every name to a local slot, a global, or an upvalue;
//! specialize provably-`Int` arithmetic and the increment/decrement idiom;
//! then emit a `Chunk` per function plus one for the top level.

pub mod ast;
pub mod codegen;
pub mod resolver;
pub mod specialize;

pub use ast::Program;
pub use resolver::Resolver;
pub use specialize::specialize_program;

use seq_runtime::error::CompileError;
use seq_runtime::gc::Heap;
use seq_runtime::chunk::Chunk;
use std::sync::Arc;

/// Compile a `Program` to its chunk table: resolver, then specializer, then
/// codegen, in that order — specialization only has anything to fold once
/// names are resolved (`LocalGet`/`GlobalGet` carry no static type, so the
/// specializer can't reason about them, but `AddInt`/`SubInt` chains of
/// plain `Int` literals fold either way).
///
/// `chunks[0]` is always the top-level script, per
/// `seq_runtime::Runtime`'s loading convention.
pub fn compile(mut program: Program, file: &str, heap: Arc<Heap>) -> Result<Vec<Chunk>, CompileError> {
    let mut resolver = Resolver::new(file);
    resolver.resolve_program(&mut program)?;
    specialize::specialize_program(&mut program);
    codegen::compile_program(&program, file, heap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{BinaryOp, Expr, SourceLocation, Stmt};
    use seq_core::EnvironmentObj;
    use seq_runtime::interpreter::Interpreter;
    use seq_runtime::registry::ModuleRegistry;
    use std::path::PathBuf;
    use std::rc::Rc;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.seq"), 1)
    }

    #[test]
    fn full_pipeline_resolves_specializes_and_runs() {
        // let i = 0
        // while i < 5 { i = i + 1 }
        // return i
        let program = Program {
            statements: vec![
                Stmt::Let { name: "i".into(), value: Expr::Int(0), loc: loc() },
                Stmt::While {
                    cond: Expr::Binary {
                        op: BinaryOp::Less,
                        left: Box::new(Expr::Ident("i".into())),
                        right: Box::new(Expr::Int(5)),
                        loc: loc(),
                    },
                    body: vec![Stmt::Assign {
                        target: ast::AssignTarget::Name(Expr::Ident("i".into())),
                        value: Expr::Binary {
                            op: BinaryOp::Add,
                            left: Box::new(Expr::Ident("i".into())),
                            right: Box::new(Expr::Int(1)),
                            loc: loc(),
                        },
                        loc: loc(),
                    }],
                    loc: loc(),
                },
                Stmt::Return { value: Some(Expr::Ident("i".into())), loc: loc() },
            ],
        };

        let heap = Arc::new(Heap::new());
        let chunks = compile(program, "t.seq", heap.clone()).unwrap();
        let globals = heap.alloc_permanent(seq_core::Obj::Environment(EnvironmentObj::new(None)));
        let alloc = |o: seq_core::Obj| heap.alloc_permanent(o);
        let modules = Arc::new(ModuleRegistry::bootstrap(&alloc));
        modules.install_into_globals(globals);
        let chunks: Vec<Arc<Chunk>> = chunks.into_iter().map(Arc::new).collect();
        let entry = chunks[0].clone();
        let mut interp = Interpreter::new(globals, heap, modules, Rc::new(chunks));
        let result = interp.run(entry).unwrap();
        assert_eq!(result, seq_core::Value::Int(5));
    }
}
