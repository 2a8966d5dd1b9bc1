//! Opcode specialization pass (`spec.md` §4.2, C5).
//!
//! Runs after the resolver, before codegen. Two narrow, purely syntactic
//! rewrites, grounded on the teacher's own specialization pass
//! (`examples/navicore-cem3/crates/compiler/src/specialize.rs`), here
//! generalized from word-level to expression-level specialization:
//!
//! - constant-foldable `Int` arithmetic (`1 + 2`, not `x + 1` where `x`'s
//!   type isn't known until run time) becomes `AddInt`/`SubInt`
//! - the `i = i + 1` / `i = i - 1` idiom on an already-resolved local slot
//!   becomes `IncLocal`/`DecLocal`
//!
//! Neither rewrite needs a type checker: the first fires only when every
//! leaf is a literal, and the second only on the exact assign-to-self
//! shape. Both matter because `AddInt`/`SubInt`/`IncLocal`/`DecLocal`
//! assume `Int` operands at run time and panic otherwise
//! (`seq_runtime::interpreter`) — over-eager specialization here would turn
//! a recoverable `RuntimeError::TypeMismatch` into a hard panic.

use crate::ast::{AssignTarget, BinaryOp, Expr, FunctionDef, Program, Stmt};

pub fn specialize_program(program: &mut Program) {
    for stmt in program.statements.iter_mut() {
        specialize_stmt(stmt);
    }
}

fn specialize_stmt(stmt: &mut Stmt) {
    match stmt {
        Stmt::Let { value, .. } | Stmt::LetUpvalue { value, .. } => specialize_expr(value),
        Stmt::Assign { target, value, .. } => {
            specialize_expr(value);
            if let Some(slot) = matching_self_arith(target, value, BinaryOp::Add) {
                *stmt = Stmt::IncLocal(slot);
                return;
            }
            if let Some(slot) = matching_self_arith(target, value, BinaryOp::Sub) {
                *stmt = Stmt::DecLocal(slot);
            }
        }
        Stmt::IncLocal(_) | Stmt::DecLocal(_) => {}
        Stmt::Expr(expr) => specialize_expr(expr),
        Stmt::If { cond, then_branch, else_branch, .. } => {
            specialize_expr(cond);
            for s in then_branch.iter_mut() {
                specialize_stmt(s);
            }
            if let Some(else_branch) = else_branch {
                for s in else_branch.iter_mut() {
                    specialize_stmt(s);
                }
            }
        }
        Stmt::While { cond, body, .. } => {
            specialize_expr(cond);
            for s in body.iter_mut() {
                specialize_stmt(s);
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                specialize_expr(value);
            }
        }
        Stmt::FunctionDef(def) => specialize_function(def),
        Stmt::StructDef { .. } => {}
        Stmt::Print { value, .. } => specialize_expr(value),
    }
}

fn specialize_function(def: &mut FunctionDef) {
    for stmt in def.body.iter_mut() {
        specialize_stmt(stmt);
    }
}

fn specialize_expr(expr: &mut Expr) {
    match expr {
        Expr::Unary { operand, .. } => specialize_expr(operand),
        Expr::Binary { op, left, right, .. } => {
            specialize_expr(left);
            specialize_expr(right);
            let specializable = matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
                && is_static_int(left)
                && is_static_int(right);
            if specializable {
                let make: fn(Box<Expr>, Box<Expr>) -> Expr = match op {
                    BinaryOp::Add => Expr::AddInt,
                    BinaryOp::Sub => Expr::SubInt,
                    BinaryOp::Mul => Expr::MulInt,
                    BinaryOp::Div => Expr::DivInt,
                    _ => unreachable!(),
                };
                if let Expr::Binary { left, right, .. } = std::mem::replace(expr, Expr::Nil) {
                    *expr = make(left, right);
                }
            }
        }
        Expr::AddInt(l, r) | Expr::SubInt(l, r) | Expr::MulInt(l, r) | Expr::DivInt(l, r) => {
            specialize_expr(l);
            specialize_expr(r);
        }
        Expr::Array(items) => {
            for item in items.iter_mut() {
                specialize_expr(item);
            }
        }
        Expr::Map(entries) => {
            for (k, v) in entries.iter_mut() {
                specialize_expr(k);
                specialize_expr(v);
            }
        }
        Expr::Index { target, index, .. } => {
            specialize_expr(target);
            specialize_expr(index);
        }
        Expr::Field { target, .. } => specialize_expr(target),
        Expr::Call { callee, args, .. } | Expr::AsyncCall { callee, args, .. } => {
            specialize_expr(callee);
            for arg in args.iter_mut() {
                specialize_expr(arg);
            }
        }
        Expr::Await { value, .. } => specialize_expr(value),
        Expr::StructLiteral { fields, .. } => {
            for (_, v) in fields.iter_mut() {
                specialize_expr(v);
            }
        }
        Expr::Nil
        | Expr::Bool(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Ident(_)
        | Expr::LocalGet(_)
        | Expr::GlobalGet(_)
        | Expr::UpvalueGet(_) => {}
    }
}

fn is_static_int(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Int(_) | Expr::AddInt(_, _) | Expr::SubInt(_, _) | Expr::MulInt(_, _) | Expr::DivInt(_, _)
    )
}

/// `target = target <op> 1` where `target` is a resolved local slot and
/// both occurrences name the same slot.
fn matching_self_arith(target: &AssignTarget, value: &Expr, op: BinaryOp) -> Option<u16> {
    let AssignTarget::Name(Expr::LocalGet(target_slot)) = target else {
        return None;
    };
    let Expr::Binary { op: bin_op, left, right, .. } = value else {
        return None;
    };
    if *bin_op != op {
        return None;
    }
    let Expr::LocalGet(left_slot) = **left else {
        return None;
    };
    if left_slot != *target_slot {
        return None;
    }
    matches!(**right, Expr::Int(1)).then_some(*target_slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SourceLocation;
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.seq"), 1)
    }

    #[test]
    fn folds_literal_int_addition() {
        let mut expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Int(1)),
            right: Box::new(Expr::Int(2)),
            loc: loc(),
        };
        specialize_expr(&mut expr);
        assert!(matches!(expr, Expr::AddInt(_, _)));
    }

    #[test]
    fn folds_literal_int_multiplication() {
        let mut expr = Expr::Binary {
            op: BinaryOp::Mul,
            left: Box::new(Expr::Int(3)),
            right: Box::new(Expr::Int(4)),
            loc: loc(),
        };
        specialize_expr(&mut expr);
        assert!(matches!(expr, Expr::MulInt(_, _)));
    }

    #[test]
    fn folds_literal_int_division() {
        let mut expr = Expr::Binary {
            op: BinaryOp::Div,
            left: Box::new(Expr::Int(10)),
            right: Box::new(Expr::Int(2)),
            loc: loc(),
        };
        specialize_expr(&mut expr);
        assert!(matches!(expr, Expr::DivInt(_, _)));
    }

    #[test]
    fn leaves_local_plus_literal_unspecialized() {
        let mut expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::LocalGet(0)),
            right: Box::new(Expr::Int(1)),
            loc: loc(),
        };
        specialize_expr(&mut expr);
        assert!(matches!(expr, Expr::Binary { .. }));
    }

    #[test]
    fn recognizes_increment_idiom() {
        let mut stmt = Stmt::Assign {
            target: AssignTarget::Name(Expr::LocalGet(2)),
            value: Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::LocalGet(2)),
                right: Box::new(Expr::Int(1)),
                loc: loc(),
            },
            loc: loc(),
        };
        specialize_stmt(&mut stmt);
        assert!(matches!(stmt, Stmt::IncLocal(2)));
    }

    #[test]
    fn recognizes_decrement_idiom() {
        let mut stmt = Stmt::Assign {
            target: AssignTarget::Name(Expr::LocalGet(3)),
            value: Expr::Binary {
                op: BinaryOp::Sub,
                left: Box::new(Expr::LocalGet(3)),
                right: Box::new(Expr::Int(1)),
                loc: loc(),
            },
            loc: loc(),
        };
        specialize_stmt(&mut stmt);
        assert!(matches!(stmt, Stmt::DecLocal(3)));
    }

    #[test]
    fn does_not_specialize_different_slots() {
        let mut stmt = Stmt::Assign {
            target: AssignTarget::Name(Expr::LocalGet(0)),
            value: Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::LocalGet(1)),
                right: Box::new(Expr::Int(1)),
                loc: loc(),
            },
            loc: loc(),
        };
        specialize_stmt(&mut stmt);
        assert!(matches!(stmt, Stmt::Assign { .. }));
    }
}
