//! Single-assignment (Final) enforcement.
//!
//! Three layers, all recoverable at the diagnostic level:
//!
//! 1. annotation placement — `Final` is legal only at the outermost
//!    position of an initial declaration, with exactly one type argument;
//! 2. binding finality — a Final declaration is assigned exactly once, at
//!    the declaration; every later assignment event of any form is flagged,
//!    including `global`/`nonlocal` rebinds that resolve back to the
//!    declaring scope (rebinds that resolve to an intervening shadow are
//!    legal);
//! 3. member/class finality — `final`-decorated methods and classes, checked
//!    by walking the arena of statically visible class records; dynamic or
//!    unresolvable bases are never treated as Final.

use std::collections::{HashMap, HashSet};

use crate::ast::{Annotation, ClassDef, Module, Qualifier, Stmt, Target};
use crate::binder::{
    Qualifiers, RedeclarationKind, ScopeId, ScopeTree, qualifier_allowed,
};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::facts::TypeFacts;
use crate::span::{Span, Spanned};

pub fn check(module: &Module, tree: &ScopeTree, facts: &TypeFacts, sink: &mut DiagnosticSink) {
    let mut pass = FinalPass { module_name: &module.name, tree, facts, sink, classes: Vec::new() };
    pass.walk_stmts(tree.root(), &module.body);
    pass.check_events();
    pass.check_class_finality();
}

/// One statically visible class, recorded while walking the unit.
struct ClassRec {
    name: String,
    span: Span,
    bases: Vec<Spanned<String>>,
    is_final: bool,
    /// Members declared `final` on this class.
    final_members: Vec<String>,
    /// Every member the class body defines, method or assignment.
    members: Vec<(String, Span)>,
}

struct FinalPass<'a> {
    module_name: &'a str,
    tree: &'a ScopeTree,
    facts: &'a TypeFacts,
    sink: &'a mut DiagnosticSink,
    classes: Vec<ClassRec>,
}

impl FinalPass<'_> {
    fn walk_stmts(&mut self, id: ScopeId, stmts: &[Spanned<Stmt>]) {
        for stmt in stmts {
            self.walk_stmt(id, stmt);
        }
    }

    fn walk_stmt(&mut self, id: ScopeId, stmt: &Spanned<Stmt>) {
        match &stmt.node {
            Stmt::AnnAssign { name, annotation, value } => {
                self.check_annotation(annotation, true);
                self.check_declaration(id, name, annotation, value.is_some());
            }
            Stmt::If { body, orelse, .. } => {
                self.walk_stmts(id, body);
                self.walk_stmts(id, orelse);
            }
            Stmt::While { body, .. } => self.walk_stmts(id, body),
            Stmt::For { body, .. } => self.walk_stmts(id, body),
            Stmt::With { body, .. } => self.walk_stmts(id, body),
            Stmt::Try { body, handlers, orelse, finally } => {
                self.walk_stmts(id, body);
                for handler in handlers {
                    self.walk_stmts(id, &handler.node.body);
                }
                self.walk_stmts(id, orelse);
                self.walk_stmts(id, finally);
            }
            Stmt::FuncDef(f) => {
                for param in &f.params {
                    if let Some(ann) = &param.annotation {
                        self.check_annotation(ann, false);
                    }
                }
                if let Some(ret) = &f.returns {
                    self.check_annotation(ret, false);
                }
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    self.walk_stmts(child, &f.body);
                }
            }
            Stmt::ClassDef(c) => {
                self.record_class(c, stmt.span);
                if let Some(child) = self.tree.scope_at(stmt.span) {
                    self.walk_stmts(child, &c.body);
                }
            }
            _ => {}
        }
    }

    /// Reject Final outside the outermost position of an initial
    /// declaration, and check subscript arity where it is legal.
    fn check_annotation(&mut self, ann: &Spanned<Annotation>, declaration_head: bool) {
        match ann.node.qualifier() {
            Some((Qualifier::Final, argc)) if declaration_head => {
                if let Some(n) = argc {
                    if n != 1 {
                        self.sink.emit(
                            DiagnosticKind::InvalidFinalUsage,
                            format!(
                                "incorrect number of generic arguments for Final[T], \
                                 expected 1, got {n}"
                            ),
                            ann.span,
                        );
                    }
                }
                self.check_annotation_children(ann);
            }
            Some((Qualifier::Final, _)) => {
                self.sink.emit(
                    DiagnosticKind::InvalidFinalUsage,
                    "Final annotation is only valid in initial declaration",
                    ann.span,
                );
                self.check_annotation_children(ann);
            }
            _ => self.check_annotation_children(ann),
        }
    }

    fn check_annotation_children(&mut self, ann: &Spanned<Annotation>) {
        match &ann.node {
            Annotation::Name(_) => {}
            Annotation::Subscript { args, .. } => {
                for arg in args {
                    self.check_annotation(arg, false);
                }
            }
            Annotation::Union(members) => {
                for member in members {
                    self.check_annotation(member, false);
                }
            }
        }
    }

    fn check_declaration(
        &mut self,
        id: ScopeId,
        name: &Spanned<String>,
        annotation: &Spanned<Annotation>,
        has_initializer: bool,
    ) {
        let quals = Qualifiers::from_annotation(&annotation.node);
        let scope = self.tree.scope(id);

        if quals.is_final {
            if !qualifier_allowed(scope.kind, Qualifier::Final) {
                self.sink.emit(
                    DiagnosticKind::InvalidFinalUsage,
                    format!("cannot declare '{}' final in class/module", name.node),
                    name.span,
                );
                return;
            }
            if !has_initializer {
                self.sink.emit(
                    DiagnosticKind::InvalidFinalUsage,
                    "Must assign a value when declaring a Final",
                    name.span,
                );
            }
        }

        // The table keeps the first declaration; a later annotation of the
        // same name is a redeclaration when Final is involved.
        if let Some(decl) = scope.decl(&name.node) {
            if decl.span != name.span {
                match decl.redeclaration_with(quals) {
                    Some(RedeclarationKind::FinalRedeclared) => {
                        self.sink.emit(
                            DiagnosticKind::Redeclaration,
                            format!("cannot re-declare Final variable '{}'", name.node),
                            name.span,
                        );
                    }
                    Some(RedeclarationKind::QualifierChanged) if quals.is_final => {
                        self.sink.emit(
                            DiagnosticKind::Redeclaration,
                            format!("cannot re-declare '{}' as Final", name.node),
                            name.span,
                        );
                    }
                    // Readonliness changes are the readonly pass's report.
                    _ => {}
                }
            }
        }
    }

    /// Every assignment event that resolves to a Final declaration is a
    /// reassignment: the declaring `x: Final[T] = v` produces no event, so
    /// no exemption is needed here.
    fn check_events(&mut self) {
        for idx in 0..self.tree.len() {
            let id = ScopeId(idx);
            for event in &self.tree.scope(id).events {
                if let Some(decl) = self.tree.assignment_decl(id, &event.name) {
                    if decl.qualifiers.is_final {
                        self.sink.emit(
                            DiagnosticKind::FinalReassignment,
                            "Cannot assign to a Final variable",
                            event.span,
                        );
                    }
                }
            }
        }
    }

    fn record_class(&mut self, c: &ClassDef, span: Span) {
        let mut rec = ClassRec {
            name: c.name.node.clone(),
            span,
            bases: c.bases.clone(),
            is_final: c.has_decorator("final"),
            final_members: Vec::new(),
            members: Vec::new(),
        };
        for stmt in &c.body {
            match &stmt.node {
                Stmt::FuncDef(f) => {
                    rec.members.push((f.name.node.clone(), f.name.span));
                    if f.has_decorator("final") {
                        rec.final_members.push(f.name.node.clone());
                    }
                }
                Stmt::Assign { target, value: _ } => {
                    if let Target::Name(n) = &target.node {
                        rec.members.push((n.clone(), target.span));
                    }
                }
                Stmt::AnnAssign { name, .. } => {
                    rec.members.push((name.node.clone(), name.span));
                }
                _ => {}
            }
        }
        self.classes.push(rec);
    }

    fn check_class_finality(&mut self) {
        let by_name: HashMap<&str, usize> = self
            .classes
            .iter()
            .enumerate()
            .map(|(i, rec)| (rec.name.as_str(), i))
            .collect();

        let mut findings: Vec<(DiagnosticKind, String, Span)> = Vec::new();

        for rec in &self.classes {
            // Final classes are not acceptable bases.
            for base in &rec.bases {
                let base_final = match by_name.get(base.node.as_str()) {
                    Some(&i) => self.classes[i]
                        .is_final
                        .then(|| self.module_name.to_string()),
                    None => self
                        .facts
                        .class_fact(&base.node)
                        .filter(|cf| cf.is_final)
                        .map(|cf| cf.module.clone()),
                };
                if let Some(base_module) = base_final {
                    findings.push((
                        DiagnosticKind::InvalidFinalUsage,
                        format!(
                            "Class `{}.{}` cannot subclass a Final class: `{}.{}`",
                            self.module_name, rec.name, base_module, base.node
                        ),
                        rec.span,
                    ));
                }
            }

            // Inherited final members may not be overridden, transitively;
            // the diagnostic names the violating subclass.
            let inherited = self.inherited_final_members(rec, &by_name);
            for (member, member_span) in &rec.members {
                if inherited.contains(member.as_str()) {
                    findings.push((
                        DiagnosticKind::FinalOverride,
                        format!(
                            "Cannot assign to a Final attribute of {}.{}:{}",
                            self.module_name, rec.name, member
                        ),
                        *member_span,
                    ));
                }
            }
        }

        for (kind, message, span) in findings {
            self.sink.emit(kind, message, span);
        }
    }

    /// Final members visible through the ancestor chain. Unresolvable bases
    /// contribute nothing; a cycle in the (malformed) hierarchy is cut by
    /// the visited set.
    fn inherited_final_members(
        &self,
        rec: &ClassRec,
        by_name: &HashMap<&str, usize>,
    ) -> HashSet<String> {
        let mut out = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack: Vec<&Spanned<String>> = rec.bases.iter().collect();
        while let Some(base) = stack.pop() {
            if !visited.insert(base.node.clone()) {
                continue;
            }
            match by_name.get(base.node.as_str()) {
                Some(&i) => {
                    let ancestor = &self.classes[i];
                    out.extend(ancestor.final_members.iter().cloned());
                    stack.extend(ancestor.bases.iter());
                }
                None => {
                    if let Some(cf) = self.facts.class_fact(&base.node) {
                        out.extend(cf.final_members.iter().cloned());
                    }
                }
            }
        }
        out
    }
}
