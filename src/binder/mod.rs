//! Scope resolution: builds the lexical scope tree for one compilation
//! unit and classifies every name reference.
//!
//! The tree is an arena of [`Scope`] records indexed by [`ScopeId`]; parent
//! links are indices, so scopes never own their parents. Nested function
//! and comprehension scopes participate in closure capture; class bodies do
//! not (a name lookup from inside a class body never sees an enclosing
//! function's locals as free variables).
//!
//! Malformed input — a `nonlocal` that reaches no binding at all — is a
//! fatal error, not a diagnostic: it is an upstream bug, not a qualifier
//! violation.

pub mod decls;

use std::collections::{HashMap, HashSet};

use serde::{Serialize, Deserialize};

use crate::ast::{Expr, Module, Stmt, Target, target_names};
use crate::diagnostics::CompileError;
use crate::span::{Span, Spanned};

pub use decls::{Declaration, Qualifiers, RedeclarationKind, qualifier_allowed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Comprehension,
}

/// How a name used in a scope resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingKind {
    /// Bound in this scope.
    Local,
    /// Bound here and captured by a nested scope.
    Cell,
    /// Captured from an enclosing function scope.
    Free,
    /// Resolves to module scope (explicitly declared or simply unbound
    /// anywhere on the function chain).
    Global,
    /// Explicitly declared `nonlocal`.
    Nonlocal,
}

/// The syntactic form of one assignment to a name. Both qualifier passes
/// consume these; an event never outlives the analysis of its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignForm {
    Simple,
    Augmented,
    TupleElement,
    LoopTarget,
    ExceptBinding,
    WithBinding,
    GlobalRebind,
    NonlocalRebind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub name: String,
    pub span: Span,
    pub form: AssignForm,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Names bound in this scope (assignment targets of any form,
    /// annotated names, params, def/class names).
    pub bound: HashSet<String>,
    pub globals_decl: HashSet<String>,
    pub nonlocals_decl: HashSet<String>,
    referenced: HashSet<String>,
    /// Classification of every name bound or referenced in this scope.
    pub bindings: HashMap<String, BindingKind>,
    /// Explicit declarations (annotated names, params), first one wins.
    pub decls: HashMap<String, Declaration>,
    /// Assignments to names in this scope, in source order.
    pub events: Vec<AssignmentEvent>,
    /// Function scope carries the readonly-function qualifier.
    pub readonly_func: bool,
}

impl Scope {
    pub fn new(kind: ScopeKind, name: &str, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            bound: HashSet::new(),
            globals_decl: HashSet::new(),
            nonlocals_decl: HashSet::new(),
            referenced: HashSet::new(),
            bindings: HashMap::new(),
            decls: HashMap::new(),
            events: Vec::new(),
            readonly_func: false,
        }
    }
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Scope entered at a `def`/`class` statement span or a comprehension
    /// expression span.
    by_span: HashMap<(usize, usize), ScopeId>,
}

impl ScopeTree {
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The scope introduced by the statement or expression at `span`.
    pub fn scope_at(&self, span: Span) -> Option<ScopeId> {
        self.by_span.get(&span.key()).copied()
    }

    pub fn binding_kind(&self, id: ScopeId, name: &str) -> Option<BindingKind> {
        self.scopes[id.0].bindings.get(name).copied()
    }

    /// The scope an assignment to `name` inside `id` actually rebinds,
    /// following the binding classification: locals stay here, `global`
    /// reaches module scope, `nonlocal` reaches the nearest enclosing
    /// function binding (or module scope when no function binds it).
    pub fn assignment_scope(&self, id: ScopeId, name: &str) -> Option<ScopeId> {
        match self.binding_kind(id, name)? {
            BindingKind::Local | BindingKind::Cell => Some(id),
            BindingKind::Global => Some(self.root()),
            BindingKind::Nonlocal => Some(self.nonlocal_target(id, name)),
            BindingKind::Free => None,
        }
    }

    /// The declaration an assignment to `name` inside `id` resolves to.
    pub fn assignment_decl(&self, id: ScopeId, name: &str) -> Option<&Declaration> {
        let target = self.assignment_scope(id, name)?;
        self.scopes[target.0].decls.get(name)
    }

    /// Walk enclosing scopes (this one first) for an explicit declaration
    /// of `name`, skipping class scopes the same way name lookup does.
    pub fn visible_decl(&self, id: ScopeId, name: &str) -> Option<&Declaration> {
        let mut cur = Some(id);
        while let Some(sid) = cur {
            let scope = &self.scopes[sid.0];
            let skip = scope.kind == ScopeKind::Class && sid != id;
            if !skip {
                if let Some(decl) = scope.decls.get(name) {
                    return Some(decl);
                }
            }
            cur = scope.parent;
        }
        None
    }

    fn nonlocal_target(&self, id: ScopeId, name: &str) -> ScopeId {
        let mut cur = self.scopes[id.0].parent;
        while let Some(sid) = cur {
            let scope = &self.scopes[sid.0];
            match scope.kind {
                ScopeKind::Function | ScopeKind::Comprehension => {
                    if scope.bound.contains(name) && !scope.globals_decl.contains(name) {
                        return sid;
                    }
                }
                ScopeKind::Class => {}
                ScopeKind::Module => break,
            }
            cur = scope.parent;
        }
        self.root()
    }
}

/// Build the scope tree for a module and classify every name.
pub fn resolve(module: &Module) -> Result<ScopeTree, CompileError> {
    let mut builder = Builder {
        tree: ScopeTree { scopes: Vec::new(), by_span: HashMap::new() },
    };
    let root = builder.new_scope(ScopeKind::Module, "<module>", None);
    builder.walk_stmts(root, &module.body);
    builder.classify()?;
    Ok(builder.tree)
}

struct Builder {
    tree: ScopeTree,
}

impl Builder {
    fn new_scope(&mut self, kind: ScopeKind, name: &str, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.tree.scopes.len());
        self.tree.scopes.push(Scope::new(kind, name, parent));
        if let Some(p) = parent {
            self.tree.scopes[p.0].children.push(id);
        }
        id
    }

    fn at(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.tree.scopes[id.0]
    }

    fn bind(&mut self, id: ScopeId, name: &str) {
        self.at(id).bound.insert(name.to_string());
    }

    fn refer(&mut self, id: ScopeId, name: &str) {
        self.at(id).referenced.insert(name.to_string());
    }

    fn event(&mut self, id: ScopeId, name: &str, span: Span, form: AssignForm) {
        let scope = self.at(id);
        let form = match form {
            AssignForm::Simple if scope.globals_decl.contains(name) => AssignForm::GlobalRebind,
            AssignForm::Simple if scope.nonlocals_decl.contains(name) => AssignForm::NonlocalRebind,
            other => other,
        };
        scope.events.push(AssignmentEvent { name: name.to_string(), span, form });
        scope.bound.insert(name.to_string());
    }

    /// Bind every name leaf of a target and record one event per leaf.
    fn bind_target(&mut self, id: ScopeId, target: &Spanned<Target>, form: AssignForm) {
        for (name, span, in_tuple) in target_names(target) {
            let leaf_form = if in_tuple && form == AssignForm::Simple {
                AssignForm::TupleElement
            } else {
                form
            };
            self.event(id, &name, span, leaf_form);
        }
        self.walk_target_exprs(id, target);
    }

    /// Attribute/subscript targets evaluate their object and index as loads.
    fn walk_target_exprs(&mut self, id: ScopeId, target: &Spanned<Target>) {
        match &target.node {
            Target::Name(_) => {}
            Target::Tuple(elems) => {
                for elem in elems {
                    self.walk_target_exprs(id, elem);
                }
            }
            Target::Attribute { object, .. } => self.walk_expr(id, object),
            Target::Subscript { object, index } => {
                self.walk_expr(id, object);
                self.walk_expr(id, index);
            }
        }
    }

    fn walk_stmts(&mut self, id: ScopeId, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            self.walk_stmt(id, stmt);
        }
    }

    fn walk_stmt(&mut self, id: ScopeId, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::Expr(e) => self.walk_expr(id, e),
            Stmt::Assign { target, value } => {
                self.walk_expr(id, value);
                self.bind_target(id, target, AssignForm::Simple);
            }
            Stmt::AnnAssign { name, annotation, value } => {
                if let Some(v) = value {
                    self.walk_expr(id, v);
                }
                let quals = Qualifiers::from_annotation(&annotation.node);
                let _ = self.at(id).declare(&name.node, quals, name.span, value.is_some());
                self.bind(id, &name.node);
            }
            Stmt::AugAssign { target, value, .. } => {
                self.walk_expr(id, value);
                if let Target::Name(n) = &target.node {
                    self.refer(id, n);
                    self.event(id, n, target.span, AssignForm::Augmented);
                } else {
                    self.walk_target_exprs(id, target);
                }
            }
            Stmt::If { test, body, orelse } => {
                self.walk_expr(id, test);
                self.walk_stmts(id, body);
                self.walk_stmts(id, orelse);
            }
            Stmt::While { test, body } => {
                self.walk_expr(id, test);
                self.walk_stmts(id, body);
            }
            Stmt::For { target, iter, body } => {
                self.walk_expr(id, iter);
                self.bind_target(id, target, AssignForm::LoopTarget);
                self.walk_stmts(id, body);
            }
            Stmt::With { context, binding, body } => {
                self.walk_expr(id, context);
                if let Some(b) = binding {
                    self.bind_target(id, b, AssignForm::WithBinding);
                }
                self.walk_stmts(id, body);
            }
            Stmt::Try { body, handlers, orelse, finally } => {
                self.walk_stmts(id, body);
                for handler in handlers {
                    if let Some(ty) = &handler.node.ty {
                        self.walk_expr(id, ty);
                    }
                    if let Some(binding) = &handler.node.binding {
                        self.event(id, &binding.node, binding.span, AssignForm::ExceptBinding);
                    }
                    self.walk_stmts(id, &handler.node.body);
                }
                self.walk_stmts(id, orelse);
                self.walk_stmts(id, finally);
            }
            Stmt::FuncDef(f) => {
                self.bind(id, &f.name.node);
                let child = self.new_scope(ScopeKind::Function, &f.name.node, Some(id));
                self.tree.by_span.insert(stmt.span.key(), child);
                self.at(child).readonly_func = f.has_decorator("readonly_func");
                for param in &f.params {
                    self.bind(child, &param.name.node);
                    let quals = param
                        .annotation
                        .as_ref()
                        .map(|a| Qualifiers::from_annotation(&a.node))
                        .unwrap_or(Qualifiers::NONE);
                    let _ = self.at(child).declare(&param.name.node, quals, param.name.span, false);
                }
                self.walk_stmts(child, &f.body);
            }
            Stmt::ClassDef(c) => {
                self.bind(id, &c.name.node);
                for base in &c.bases {
                    self.refer(id, &base.node);
                }
                let child = self.new_scope(ScopeKind::Class, &c.name.node, Some(id));
                self.tree.by_span.insert(stmt.span.key(), child);
                self.walk_stmts(child, &c.body);
            }
            Stmt::Return(value) => {
                if let Some(v) = value {
                    self.walk_expr(id, v);
                }
            }
            Stmt::Global { names } => {
                for name in names {
                    self.at(id).globals_decl.insert(name.node.clone());
                }
            }
            Stmt::Nonlocal { names } => {
                for name in names {
                    self.at(id).nonlocals_decl.insert(name.node.clone());
                }
            }
            Stmt::Pass => {}
        }
    }

    fn walk_expr(&mut self, id: ScopeId, expr: &Spanned<Expr>) {
        match &expr.node {
            Expr::Literal(_) => {}
            Expr::Name(n) => self.refer(id, n),
            Expr::Tuple(elems) | Expr::List(elems) => {
                for e in elems {
                    self.walk_expr(id, e);
                }
            }
            Expr::Attribute { object, .. } => self.walk_expr(id, object),
            Expr::Subscript { object, index } => {
                self.walk_expr(id, object);
                self.walk_expr(id, index);
            }
            Expr::Call { func, args, kwargs, stars } => {
                self.walk_expr(id, func);
                for a in args {
                    self.walk_expr(id, a);
                }
                for (_, v) in kwargs {
                    self.walk_expr(id, v);
                }
                for s in stars {
                    self.walk_expr(id, s);
                }
            }
            Expr::BinOp { lhs, rhs, .. } => {
                self.walk_expr(id, lhs);
                self.walk_expr(id, rhs);
            }
            Expr::UnaryOp { operand, .. } => self.walk_expr(id, operand),
            Expr::Comprehension { elt, target, iter, cond } => {
                // The iterable evaluates in the enclosing scope; element and
                // condition evaluate in the comprehension's own scope.
                self.walk_expr(id, iter);
                let child = self.new_scope(ScopeKind::Comprehension, "<comp>", Some(id));
                self.tree.by_span.insert(expr.span.key(), child);
                self.bind_target(child, target, AssignForm::LoopTarget);
                self.walk_expr(child, elt);
                if let Some(c) = cond {
                    self.walk_expr(child, c);
                }
            }
        }
    }

    fn classify(&mut self) -> Result<(), CompileError> {
        for idx in 0..self.tree.scopes.len() {
            let id = ScopeId(idx);
            let mut names: Vec<String> = {
                let scope = &self.tree.scopes[idx];
                scope
                    .bound
                    .iter()
                    .chain(scope.referenced.iter())
                    .chain(scope.globals_decl.iter())
                    .chain(scope.nonlocals_decl.iter())
                    .cloned()
                    .collect()
            };
            names.sort();
            names.dedup();

            for name in names {
                let scope = &self.tree.scopes[idx];
                let kind = if scope.globals_decl.contains(&name) {
                    BindingKind::Global
                } else if scope.nonlocals_decl.contains(&name) {
                    self.resolve_nonlocal(id, &name)?;
                    BindingKind::Nonlocal
                } else if scope.bound.contains(&name) {
                    BindingKind::Local
                } else if scope.kind == ScopeKind::Class {
                    // Class-body lookups never see enclosing function
                    // locals as free variables.
                    BindingKind::Global
                } else {
                    self.resolve_free(id, &name)
                };
                let scope = &mut self.tree.scopes[idx];
                // A Cell promotion from an earlier nested scope must survive.
                match scope.bindings.get(&name) {
                    Some(BindingKind::Cell) if kind == BindingKind::Local => {}
                    _ => {
                        scope.bindings.insert(name.clone(), kind);
                    }
                }
                if let Some(decl) = scope.decls.get_mut(&name) {
                    decl.kind = kind;
                }
            }
        }
        Ok(())
    }

    /// A `nonlocal` must reach an enclosing function binding or, failing
    /// that, a module-level one (rebinds through the chain still resolve to
    /// the module binding for qualifier purposes). Reaching nothing at all
    /// is a contract violation by the frontend.
    fn resolve_nonlocal(&mut self, id: ScopeId, name: &str) -> Result<(), CompileError> {
        let mut cur = self.tree.scopes[id.0].parent;
        while let Some(sid) = cur {
            let scope = &self.tree.scopes[sid.0];
            match scope.kind {
                ScopeKind::Function | ScopeKind::Comprehension => {
                    if scope.bound.contains(name) && !scope.globals_decl.contains(name) {
                        self.promote_cell(sid, name);
                        return Ok(());
                    }
                }
                ScopeKind::Class => {}
                ScopeKind::Module => {
                    if scope.bound.contains(name) {
                        return Ok(());
                    }
                    break;
                }
            }
            cur = scope.parent;
        }
        Err(CompileError::malformed(
            format!("no binding for nonlocal '{name}' found"),
            Span::dummy(),
        ))
    }

    fn resolve_free(&mut self, id: ScopeId, name: &str) -> BindingKind {
        let mut cur = self.tree.scopes[id.0].parent;
        while let Some(sid) = cur {
            let scope = &self.tree.scopes[sid.0];
            match scope.kind {
                ScopeKind::Function | ScopeKind::Comprehension => {
                    if scope.bound.contains(name) && !scope.globals_decl.contains(name) {
                        self.promote_cell(sid, name);
                        return BindingKind::Free;
                    }
                }
                // Class bodies are not closures over enclosing locals.
                ScopeKind::Class => {}
                ScopeKind::Module => break,
            }
            cur = scope.parent;
        }
        BindingKind::Global
    }

    fn promote_cell(&mut self, id: ScopeId, name: &str) {
        let scope = &mut self.tree.scopes[id.0];
        match scope.bindings.get(name) {
            Some(BindingKind::Local) | None => {
                scope.bindings.insert(name.to_string(), BindingKind::Cell);
            }
            _ => {}
        }
    }
}
