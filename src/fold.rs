//! Final-constant registration and constant folding.
//!
//! A module-scope Final binding whose single initializer is a literal (int,
//! float, bool, or string) becomes a FinalConstant. Every non-shadowed read
//! of that name inside the module is rewritten to the embedded literal; the
//! rewrites are a span-keyed side table the instruction selector consumes.
//! Call results never qualify, even when the binding is Final, and shadowed
//! reads keep resolving to the shadow.

use std::collections::HashMap;

use serde::{Serialize, Deserialize};

use crate::ast::{Expr, Literal, Module, Stmt, Target};
use crate::binder::{BindingKind, Qualifiers, ScopeId, ScopeTree};
use crate::span::{Span, Spanned};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalConstant {
    pub name: String,
    pub module: String,
    pub value: Literal,
    /// The single assignment that established the constant.
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct FoldResult {
    /// Registry in declaration order: exactly the names that were both
    /// Final-declared and literal-initialized.
    pub constants: Vec<FinalConstant>,
    /// Read sites to replace with an embedded literal, keyed by span.
    pub rewrites: HashMap<(usize, usize), Literal>,
}

impl FoldResult {
    pub fn constant_names(&self) -> Vec<&str> {
        self.constants.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rewrite_at(&self, span: Span) -> Option<&Literal> {
        self.rewrites.get(&span.key())
    }
}

pub fn fold_module(module: &Module, tree: &ScopeTree) -> FoldResult {
    let mut result = FoldResult::default();

    for stmt in &module.body {
        if let Stmt::AnnAssign { name, annotation, value: Some(value) } = &stmt.node {
            if !Qualifiers::from_annotation(&annotation.node).is_final {
                continue;
            }
            let Expr::Literal(lit) = &value.node else { continue };
            if matches!(lit, Literal::None) {
                continue;
            }
            if result.constants.iter().any(|c| c.name == name.node) {
                continue;
            }
            result.constants.push(FinalConstant {
                name: name.node.clone(),
                module: module.name.clone(),
                value: lit.clone(),
                span: value.span,
            });
        }
    }

    if !result.constants.is_empty() {
        let mut folder = Folder { tree, result: &mut result };
        folder.stmts(tree.root(), &module.body);
    }

    result
}

struct Folder<'a> {
    tree: &'a ScopeTree,
    result: &'a mut FoldResult,
}

impl Folder<'_> {
    /// A read of `name` in `scope` resolves to the module binding exactly
    /// when the binder classified it as a module-level access; any local,
    /// cell, or free classification means a shadow owns the name there.
    fn folds_to_module(&self, scope: ScopeId, name: &str) -> bool {
        match self.tree.binding_kind(scope, name) {
            Some(BindingKind::Global) => true,
            Some(BindingKind::Local) | Some(BindingKind::Cell) => scope == self.tree.root(),
            _ => false,
        }
    }

    fn constant_value(&self, name: &str) -> Option<Literal> {
        self.result
            .constants
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.clone())
    }

    fn stmts(&mut self, id: ScopeId, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            self.stmt(id, stmt);
        }
    }

    fn stmt(&mut self, id: ScopeId, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Expr(e) => self.expr(id, e),
            Stmt::Assign { target, value } => {
                self.expr(id, value);
                self.target(id, target);
            }
            Stmt::AnnAssign { value, .. } => {
                if let Some(v) = value {
                    self.expr(id, v);
                }
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(id, value);
                self.target(id, target);
            }
            Stmt::If { test, body, orelse } => {
                self.expr(id, test);
                self.stmts(id, body);
                self.stmts(id, orelse);
            }
            Stmt::While { test, body } => {
                self.expr(id, test);
                self.stmts(id, body);
            }
            Stmt::For { target, iter, body } => {
                self.expr(id, iter);
                self.target(id, target);
                self.stmts(id, body);
            }
            Stmt::With { context, binding, body } => {
                self.expr(id, context);
                if let Some(b) = binding {
                    self.target(id, b);
                }
                self.stmts(id, body);
            }
            Stmt::Try { body, handlers, orelse, finally } => {
                self.stmts(id, body);
                for handler in handlers {
                    if let Some(ty) = &handler.node.ty {
                        self.expr(id, ty);
                    }
                    self.stmts(id, &handler.node.body);
                }
                self.stmts(id, orelse);
                self.stmts(id, finally);
            }
            Stmt::FuncDef(f) => {
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    self.stmts(child, &f.body);
                }
            }
            Stmt::ClassDef(c) => {
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    self.stmts(child, &c.body);
                }
            }
            Stmt::Return(value) => {
                if let Some(v) = value {
                    self.expr(id, v);
                }
            }
            Stmt::Global { .. } | Stmt::Nonlocal { .. } | Stmt::Pass => {}
        }
    }

    fn target(&mut self, id: ScopeId, target: &Spanned<Target>) {
        match &target.node {
            Target::Name(_) => {}
            Target::Tuple(elems) => {
                for elem in elems {
                    self.target(id, elem);
                }
            }
            Target::Attribute { object, .. } => self.expr(id, object),
            Target::Subscript { object, index } => {
                self.expr(id, object);
                self.expr(id, index);
            }
        }
    }

    fn expr(&mut self, id: ScopeId, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Literal(_) => {}
            Expr::Name(n) => {
                if self.folds_to_module(id, n) {
                    if let Some(value) = self.constant_value(n) {
                        self.result.rewrites.insert(expr.span.key(), value);
                    }
                }
            }
            Expr::Tuple(elems) | Expr::List(elems) => {
                for e in elems {
                    self.expr(id, e);
                }
            }
            Expr::Attribute { object, .. } => self.expr(id, object),
            Expr::Subscript { object, index } => {
                self.expr(id, object);
                self.expr(id, index);
            }
            Expr::Call { func, args, kwargs, stars } => {
                self.expr(id, func);
                for a in args {
                    self.expr(id, a);
                }
                for (_, v) in kwargs {
                    self.expr(id, v);
                }
                for s in stars {
                    self.expr(id, s);
                }
            }
            Expr::BinOp { lhs, rhs, .. } => {
                self.expr(id, lhs);
                self.expr(id, rhs);
            }
            Expr::UnaryOp { operand, .. } => self.expr(id, operand),
            Expr::Comprehension { elt, target, iter, cond } => {
                self.expr(id, iter);
                if let Some(child) = self.tree.scope_at(expr.span) {
                    self.target(child, target);
                    self.expr(child, elt);
                    if let Some(c) = cond {
                        self.expr(child, c);
                    }
                }
            }
        }
    }
}
