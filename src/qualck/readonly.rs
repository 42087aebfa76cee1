//! Flow-sensitive readonly propagation.
//!
//! One top-to-bottom traversal per scope carrying a name → state mapping,
//! with explicit merge-at-join for branches and loops. Assigning a readonly
//! value narrows the target to readonly even without an annotation; the
//! implicit narrowing counts as the name's first declaration, so a later
//! annotation that disagrees is a redeclaration. States are discarded at
//! end of scope; nothing persists across functions.

use std::collections::HashMap;

use crate::ast::{Expr, Module, Param, Qualifier, Stmt, Target, target_names};
use crate::binder::{
    BindingKind, Qualifiers, ScopeId, ScopeKind, ScopeTree, qualifier_allowed,
};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::span::{Span, Spanned};

/// Per-binding state at one traversal point.
#[derive(Debug, Clone, Copy)]
struct RoState {
    /// Readonliness established by the first declaration (annotation or
    /// implicit narrowing). Sticky for redeclaration checks.
    declared_readonly: bool,
    /// Declaration came from an explicit annotation; such bindings stay
    /// readonly across plain reassignment.
    explicit: bool,
    /// Readonliness of the value currently held, flow-sensitive.
    current: bool,
}

type Flow = HashMap<String, RoState>;

fn merge(into: &mut Flow, other: Flow) {
    for (name, st) in other {
        into.entry(name)
            .and_modify(|cur| {
                cur.current |= st.current;
                cur.declared_readonly |= st.declared_readonly;
                cur.explicit |= st.explicit;
            })
            .or_insert(st);
    }
}

pub fn check(module: &Module, tree: &ScopeTree, sink: &mut DiagnosticSink) {
    let mut pass = ReadonlyPass { tree, sink };
    pass.check_scope(tree.root(), &[], &module.body);
}

struct ReadonlyPass<'a> {
    tree: &'a ScopeTree,
    sink: &'a mut DiagnosticSink,
}

impl ReadonlyPass<'_> {
    fn check_scope(&mut self, id: ScopeId, params: &[Param], body: &[Spanned<Stmt>]) {
        let scope = self.tree.scope(id);
        let mut flow = Flow::new();

        // Inside a readonly-function, every closure-captured binding is a
        // readonly reference.
        if scope.readonly_func {
            for (name, kind) in &scope.bindings {
                if matches!(kind, BindingKind::Free | BindingKind::Nonlocal) {
                    flow.insert(
                        name.clone(),
                        RoState { declared_readonly: true, explicit: true, current: true },
                    );
                }
            }
        }

        for param in params {
            let readonly = param
                .annotation
                .as_ref()
                .map(|a| Qualifiers::from_annotation(&a.node).readonly)
                .unwrap_or(false);
            flow.insert(
                param.name.node.clone(),
                RoState { declared_readonly: readonly, explicit: true, current: readonly },
            );
        }

        self.block(id, &mut flow, body);
    }

    fn block(&mut self, id: ScopeId, flow: &mut Flow, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            self.stmt(id, flow, stmt);
        }
    }

    fn stmt(&mut self, id: ScopeId, flow: &mut Flow, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Expr(e) => self.expr(id, flow, e),
            Stmt::Assign { target, value } => {
                self.expr(id, flow, value);
                self.target_exprs(id, flow, target);
                let names = target_names(target);
                let single = names.len() == 1 && !names[0].2;
                let value_ro = single && self.effective_readonly(flow, value);
                for (name, span, _) in names {
                    self.assign_name(id, flow, &name, span, value_ro);
                }
            }
            Stmt::AnnAssign { name, annotation, value } => {
                if let Some(v) = value {
                    self.expr(id, flow, v);
                }
                let quals = Qualifiers::from_annotation(&annotation.node);
                let scope_kind = self.tree.scope(id).kind;
                if !matches!(scope_kind, ScopeKind::Function | ScopeKind::Comprehension) {
                    if quals.readonly && !qualifier_allowed(scope_kind, Qualifier::Readonly) {
                        self.sink.emit(
                            DiagnosticKind::Redeclaration,
                            format!("cannot declare '{}' readonly in class/module", name.node),
                            name.span,
                        );
                    }
                    return;
                }
                match flow.get(&name.node).copied() {
                    Some(prev) if prev.declared_readonly != quals.readonly => {
                        self.sink.emit(
                            DiagnosticKind::Redeclaration,
                            format!("cannot re-declare the readonliness of '{}'", name.node),
                            name.span,
                        );
                    }
                    _ => {}
                }
                // Continue with the newest annotation either way.
                flow.insert(
                    name.node.clone(),
                    RoState {
                        declared_readonly: quals.readonly,
                        explicit: true,
                        current: quals.readonly,
                    },
                );
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(id, flow, value);
                match &target.node {
                    Target::Name(n) => {
                        let current = flow.get(n).map(|st| st.current).unwrap_or(false);
                        if current {
                            self.sink.emit(
                                DiagnosticKind::ReadonlyMutation,
                                format!("Cannot modify readonly reference '{n}' via aug assign"),
                                target.span,
                            );
                        }
                        self.closure_mutation(id, n, target.span);
                    }
                    _ => self.target_exprs(id, flow, target),
                }
            }
            Stmt::If { test, body, orelse } => {
                self.expr(id, flow, test);
                let mut then_flow = flow.clone();
                self.block(id, &mut then_flow, body);
                let mut else_flow = flow.clone();
                self.block(id, &mut else_flow, orelse);
                *flow = then_flow;
                merge(flow, else_flow);
            }
            Stmt::While { test, body } => {
                self.expr(id, flow, test);
                let mut body_flow = flow.clone();
                self.block(id, &mut body_flow, body);
                merge(flow, body_flow);
            }
            Stmt::For { target, iter, body } => {
                self.expr(id, flow, iter);
                for (name, span, _) in target_names(target) {
                    self.assign_name(id, flow, &name, span, false);
                }
                let mut body_flow = flow.clone();
                self.block(id, &mut body_flow, body);
                merge(flow, body_flow);
            }
            Stmt::With { context, binding, body } => {
                self.expr(id, flow, context);
                if let Some(b) = binding {
                    for (name, span, _) in target_names(b) {
                        self.assign_name(id, flow, &name, span, false);
                    }
                }
                self.block(id, flow, body);
            }
            Stmt::Try { body, handlers, orelse, finally } => {
                self.block(id, flow, body);
                for handler in handlers {
                    if let Some(ty) = &handler.node.ty {
                        self.expr(id, flow, ty);
                    }
                    if let Some(binding) = &handler.node.binding {
                        self.assign_name(id, flow, &binding.node, binding.span, false);
                    }
                    self.block(id, flow, &handler.node.body);
                }
                self.block(id, flow, orelse);
                self.block(id, flow, finally);
            }
            Stmt::FuncDef(f) => {
                self.assign_name(id, flow, &f.name.node, f.name.span, false);
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    self.check_scope(child, &f.params, &f.body);
                }
            }
            Stmt::ClassDef(c) => {
                for base in &c.bases {
                    if self.base_is_readonly(id, flow, &base.node) {
                        self.sink.emit(
                            DiagnosticKind::ReadonlyMutation,
                            format!("cannot inherit from a readonly base class '{}'", base.node),
                            base.span,
                        );
                    }
                }
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    let mut class_flow = Flow::new();
                    self.block(child, &mut class_flow, &c.body);
                }
            }
            Stmt::Return(value) => {
                if let Some(v) = value {
                    self.expr(id, flow, v);
                }
            }
            Stmt::Global { .. } | Stmt::Nonlocal { .. } | Stmt::Pass => {}
        }
    }

    fn expr(&mut self, id: ScopeId, flow: &mut Flow, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Literal(_) | Expr::Name(_) => {}
            Expr::Tuple(elems) | Expr::List(elems) => {
                for e in elems {
                    self.expr(id, flow, e);
                }
            }
            Expr::Attribute { object, .. } => self.expr(id, flow, object),
            Expr::Subscript { object, index } => {
                self.expr(id, flow, object);
                self.expr(id, flow, index);
            }
            Expr::Call { func, args, kwargs, stars } => {
                let any_readonly = args.iter().chain(stars.iter())
                    .any(|a| self.effective_readonly(flow, a));
                if any_readonly && (!kwargs.is_empty() || !stars.is_empty()) {
                    self.sink.emit(
                        DiagnosticKind::UnsupportedCallConvention,
                        "Unsupported: cannot use keyword args or star args \
                         when ANY argument is readonly",
                        expr.span,
                    );
                }
                self.expr(id, flow, func);
                for a in args {
                    self.expr(id, flow, a);
                }
                for (_, v) in kwargs {
                    self.expr(id, flow, v);
                }
                for s in stars {
                    self.expr(id, flow, s);
                }
            }
            Expr::BinOp { lhs, rhs, .. } => {
                self.expr(id, flow, lhs);
                self.expr(id, flow, rhs);
            }
            Expr::UnaryOp { operand, .. } => self.expr(id, flow, operand),
            Expr::Comprehension { elt, target, iter, cond } => {
                self.expr(id, flow, iter);
                if let Some(child) = self.tree.scope_at(expr.span) {
                    let mut comp_flow = Flow::new();
                    for (name, span, _) in target_names(target) {
                        self.assign_name(child, &mut comp_flow, &name, span, false);
                    }
                    self.expr(child, &mut comp_flow, elt);
                    if let Some(c) = cond {
                        self.expr(child, &mut comp_flow, c);
                    }
                }
            }
        }
    }

    /// Attribute and subscript targets evaluate their receivers as loads.
    fn target_exprs(&mut self, id: ScopeId, flow: &mut Flow, target: &Spanned<Target>) {
        match &target.node {
            Target::Name(_) => {}
            Target::Tuple(elems) => {
                for elem in elems {
                    self.target_exprs(id, flow, elem);
                }
            }
            Target::Attribute { object, .. } => self.expr(id, flow, object),
            Target::Subscript { object, index } => {
                self.expr(id, flow, object);
                self.expr(id, flow, index);
            }
        }
    }

    /// Narrow the state of `name` after an assignment of a value whose
    /// effective readonliness is `value_ro`, and flag closure mutation
    /// inside readonly functions.
    fn assign_name(&mut self, id: ScopeId, flow: &mut Flow, name: &str, span: Span, value_ro: bool) {
        self.closure_mutation(id, name, span);
        match flow.get_mut(name) {
            Some(st) => {
                st.current = if st.explicit && st.declared_readonly { true } else { value_ro };
            }
            None => {
                flow.insert(
                    name.to_string(),
                    RoState { declared_readonly: value_ro, explicit: false, current: value_ro },
                );
            }
        }
    }

    fn closure_mutation(&mut self, id: ScopeId, name: &str, span: Span) {
        let scope = self.tree.scope(id);
        if !scope.readonly_func {
            return;
        }
        if matches!(
            self.tree.binding_kind(id, name),
            Some(BindingKind::Free | BindingKind::Nonlocal)
        ) {
            self.sink.emit(
                DiagnosticKind::ReadonlyMutation,
                format!(
                    "cannot modify '{name}' from a closure, \
                     inside a readonly_func annotated function"
                ),
                span,
            );
        }
    }

    /// Effective qualifier of an expression: the `readonly(...)` builtin
    /// wrapper, or a name whose current state is readonly.
    fn effective_readonly(&self, flow: &Flow, expr: &Spanned<Expr>) -> bool {
        match &expr.node {
            Expr::Name(n) => flow.get(n).map(|st| st.current).unwrap_or(false),
            Expr::Call { func, .. } => matches!(&func.node, Expr::Name(n) if n == "readonly"),
            _ => false,
        }
    }

    /// Is a base-class name readonly at this point? Checks the live flow
    /// state first, then explicit declarations visible from this scope.
    fn base_is_readonly(&self, id: ScopeId, flow: &Flow, name: &str) -> bool {
        if let Some(st) = flow.get(name) {
            return st.current || st.declared_readonly;
        }
        self.tree
            .visible_decl(id, name)
            .map(|d| d.qualifiers.readonly)
            .unwrap_or(false)
    }
}
