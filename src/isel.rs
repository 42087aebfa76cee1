//! Instruction selection.
//!
//! For every operation site the selector records either a specialized form
//! or the generic fallback. Selection is purely additive: the generic form
//! is always correct, and a specialized form is chosen only when the
//! prerequisite fact is proven — a FinalConstant for name loads, a concrete
//! receiver class for field access, a statically known callee for direct
//! calls, a declared primitive local for unboxed arithmetic. `Unknown`
//! facts always yield the generic form.

use serde::{Serialize, Deserialize};

use crate::ast::{BinOp, Expr, Literal, Module, Stmt, Target};
use crate::binder::{BindingKind, Qualifiers, ScopeId, ScopeTree};
use crate::facts::{ClassFact, TypeFact, TypeFacts};
use crate::fold::FoldResult;
use crate::span::{Span, Spanned};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstForm {
    /// Embedded literal in place of a name lookup.
    LoadConst(Literal),
    /// Generic global lookup from a function scope.
    LoadGlobal(String),
    /// Generic name lookup at module scope.
    LoadName(String),
    /// Direct field access on a statically known class layout.
    LoadField { module: String, class: String, field: String },
    LoadAttr(String),
    StoreField { module: String, class: String, field: String },
    StoreAttr(String),
    /// Direct call of a statically known callee.
    InvokeFunction(String),
    CallFunction,
    /// Unboxed arithmetic on a declared primitive local.
    PrimitiveBinaryOp(BinOp),
    InplaceOp(BinOp),
}

impl InstForm {
    pub fn is_specialized(&self) -> bool {
        !matches!(
            self,
            InstForm::LoadGlobal(_)
                | InstForm::LoadName(_)
                | InstForm::LoadAttr(_)
                | InstForm::StoreAttr(_)
                | InstForm::CallFunction
                | InstForm::InplaceOp(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub span: Span,
    pub form: InstForm,
}

pub fn select(
    module: &Module,
    tree: &ScopeTree,
    fold: &FoldResult,
    facts: &TypeFacts,
) -> Vec<Selection> {
    let mut selector = Selector {
        tree,
        fold,
        facts,
        final_callables: final_callables(module, facts),
        out: Vec::new(),
    };
    selector.stmts(tree.root(), &module.body);
    selector.out
}

/// Module-level Final bindings initialized with a statically known
/// function: calls through the binding invoke the function directly.
fn final_callables(module: &Module, facts: &TypeFacts) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for stmt in &module.body {
        if let Stmt::AnnAssign { name, annotation, value: Some(value) } = &stmt.node {
            if !Qualifiers::from_annotation(&annotation.node).is_final {
                continue;
            }
            if let Expr::Name(init) = &value.node {
                if let TypeFact::Function(target) = facts.name_fact(init) {
                    out.insert(name.node.clone(), target.clone());
                }
            }
        }
    }
    out
}

struct Selector<'a> {
    tree: &'a ScopeTree,
    fold: &'a FoldResult,
    facts: &'a TypeFacts,
    final_callables: HashMap<String, String>,
    out: Vec<Selection>,
}

impl Selector<'_> {
    fn emit(&mut self, span: Span, form: InstForm) {
        self.out.push(Selection { span, form });
    }

    /// The concrete class of a receiver expression, when statically known:
    /// a name with a class-typed fact, or a direct constructor call.
    fn receiver_class<'a>(&'a self, expr: &'a Spanned<Expr>) -> Option<(&'a str, &'a ClassFact)> {
        let class_name = match &expr.node {
            Expr::Name(n) => match self.facts.name_fact(n) {
                TypeFact::Class(c) => Some(c.as_str()),
                _ => None,
            },
            Expr::Call { func, .. } => match &func.node {
                Expr::Name(c) if self.facts.class_fact(c).is_some() => Some(c.as_str()),
                _ => None,
            },
            _ => None,
        }?;
        self.facts.class_fact(class_name).map(|cf| (class_name, cf))
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
                self.store_target(id, target);
            }
            Stmt::AnnAssign { value, .. } => {
                if let Some(v) = value {
                    self.expr(id, v);
                }
            }
            Stmt::AugAssign { target, op, value } => {
                self.expr(id, value);
                match &target.node {
                    Target::Name(n) => {
                        let form = match self.facts.name_fact(n) {
                            TypeFact::Primitive(_) => InstForm::PrimitiveBinaryOp(*op),
                            _ => InstForm::InplaceOp(*op),
                        };
                        self.emit(target.span, form);
                    }
                    Target::Attribute { object, attr } => {
                        // An in-place field update both loads and stores.
                        self.expr(id, object);
                        self.field_access(object, attr.node.as_str(), attr.span, false);
                        self.field_access(object, attr.node.as_str(), target.span, true);
                        self.emit(stmt.span, InstForm::InplaceOp(*op));
                    }
                    _ => {
                        self.store_target(id, target);
                        self.emit(stmt.span, InstForm::InplaceOp(*op));
                    }
                }
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
                self.store_target(id, target);
                self.stmts(id, body);
            }
            Stmt::With { context, binding, body } => {
                self.expr(id, context);
                if let Some(b) = binding {
                    self.store_target(id, b);
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

    fn store_target(&mut self, id: ScopeId, target: &Spanned<Target>) {
        match &target.node {
            Target::Name(_) => {}
            Target::Tuple(elems) => {
                for elem in elems {
                    self.store_target(id, elem);
                }
            }
            Target::Attribute { object, attr } => {
                self.expr(id, object);
                self.field_access(object, attr.node.as_str(), target.span, true);
            }
            Target::Subscript { object, index } => {
                self.expr(id, object);
                self.expr(id, index);
            }
        }
    }

    fn field_access(&mut self, object: &Spanned<Expr>, attr: &str, span: Span, store: bool) {
        let specialized = self
            .receiver_class(object)
            .filter(|(_, cf)| cf.fields.iter().any(|f| f == attr));
        let form = match specialized {
            Some((class, cf)) => {
                let module = cf.module.clone();
                let class = class.to_string();
                let field = attr.to_string();
                if store {
                    InstForm::StoreField { module, class, field }
                } else {
                    InstForm::LoadField { module, class, field }
                }
            }
            None if store => InstForm::StoreAttr(attr.to_string()),
            None => InstForm::LoadAttr(attr.to_string()),
        };
        self.emit(span, form);
    }

    fn call_form(&self, func: &Spanned<Expr>) -> InstForm {
        match &func.node {
            Expr::Name(f) => {
                if let TypeFact::Function(target) = self.facts.name_fact(f) {
                    return InstForm::InvokeFunction(target.clone());
                }
                if let Some(target) = self.final_callables.get(f) {
                    return InstForm::InvokeFunction(target.clone());
                }
                InstForm::CallFunction
            }
            Expr::Attribute { object, attr } => {
                // A method on a Final class (or a final method) cannot be
                // overridden, so the callee is statically known.
                if let Some((class, cf)) = self.receiver_class(object) {
                    if cf.is_final || cf.final_members.iter().any(|m| m == &attr.node) {
                        return InstForm::InvokeFunction(format!("{class}.{}", attr.node));
                    }
                }
                InstForm::CallFunction
            }
            _ => InstForm::CallFunction,
        }
    }

    fn expr(&mut self, id: ScopeId, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Literal(_) => {}
            Expr::Name(n) => {
                let kind = self.tree.binding_kind(id, n);
                let module_read = match kind {
                    Some(BindingKind::Global) => true,
                    Some(BindingKind::Local) | Some(BindingKind::Cell) => id == self.tree.root(),
                    _ => false,
                };
                if !module_read {
                    return;
                }
                let form = match self.fold.rewrite_at(expr.span) {
                    Some(lit) => InstForm::LoadConst(lit.clone()),
                    None if id == self.tree.root() => InstForm::LoadName(n.clone()),
                    None => InstForm::LoadGlobal(n.clone()),
                };
                self.emit(expr.span, form);
            }
            Expr::Tuple(elems) | Expr::List(elems) => {
                for e in elems {
                    self.expr(id, e);
                }
            }
            Expr::Attribute { object, attr } => {
                self.expr(id, object);
                self.field_access(object, attr.node.as_str(), expr.span, false);
            }
            Expr::Subscript { object, index } => {
                self.expr(id, object);
                self.expr(id, index);
            }
            Expr::Call { func, args, kwargs, stars } => {
                let form = self.call_form(func);
                let direct = matches!(form, InstForm::InvokeFunction(_));
                self.emit(expr.span, form);
                // A direct call subsumes the callee lookup; a generic call
                // still evaluates the callee expression.
                match &func.node {
                    Expr::Attribute { object, attr } => {
                        self.expr(id, object);
                        if !direct {
                            self.field_access(object, attr.node.as_str(), func.span, false);
                        }
                    }
                    Expr::Name(_) if direct => {}
                    _ => self.expr(id, func),
                }
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
                    self.store_target(child, target);
                    self.expr(child, elt);
                    if let Some(c) = cond {
                        self.expr(child, c);
                    }
                }
            }
        }
    }
}
