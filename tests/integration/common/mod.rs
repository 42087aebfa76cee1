//! Shared helpers for the conformance tests: a small AST builder that
//! assigns monotonically increasing spans in construction order, plus
//! diagnostic assertions.
#![allow(dead_code)]

use ceres::ast::*;
use ceres::facts::TypeFacts;
use ceres::span::{Span, Spanned};
use ceres::{Analysis, analyze_module};

/// Builds AST nodes with fresh, strictly increasing spans, so constructing
/// statements in source order yields source-ordered locations.
pub struct B {
    next: usize,
}

impl B {
    pub fn new() -> Self {
        B { next: 0 }
    }

    pub fn span(&mut self) -> Span {
        let start = self.next;
        self.next += 10;
        Span::new(start, start + 5)
    }

    pub fn sp<T>(&mut self, node: T) -> Spanned<T> {
        let span = self.span();
        Spanned::new(node, span)
    }

    // ----- expressions -----

    pub fn int(&mut self, v: i64) -> Spanned<Expr> {
        self.sp(Expr::Literal(Literal::Int(v)))
    }

    pub fn float(&mut self, v: f64) -> Spanned<Expr> {
        self.sp(Expr::Literal(Literal::Float(v)))
    }

    pub fn bool_lit(&mut self, v: bool) -> Spanned<Expr> {
        self.sp(Expr::Literal(Literal::Bool(v)))
    }

    pub fn str_lit(&mut self, v: &str) -> Spanned<Expr> {
        self.sp(Expr::Literal(Literal::Str(v.into())))
    }

    pub fn name(&mut self, n: &str) -> Spanned<Expr> {
        self.sp(Expr::Name(n.into()))
    }

    pub fn list(&mut self, elems: Vec<Spanned<Expr>>) -> Spanned<Expr> {
        self.sp(Expr::List(elems))
    }

    pub fn tuple(&mut self, elems: Vec<Spanned<Expr>>) -> Spanned<Expr> {
        self.sp(Expr::Tuple(elems))
    }

    pub fn bin(&mut self, lhs: Spanned<Expr>, op: BinOp, rhs: Spanned<Expr>) -> Spanned<Expr> {
        self.sp(Expr::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn attr(&mut self, object: Spanned<Expr>, name: &str) -> Spanned<Expr> {
        let attr = self.sp(name.to_string());
        self.sp(Expr::Attribute { object: Box::new(object), attr })
    }

    pub fn subscript(&mut self, object: Spanned<Expr>, index: Spanned<Expr>) -> Spanned<Expr> {
        self.sp(Expr::Subscript { object: Box::new(object), index: Box::new(index) })
    }

    pub fn call(&mut self, f: &str, args: Vec<Spanned<Expr>>) -> Spanned<Expr> {
        let func = self.name(f);
        self.sp(Expr::Call { func: Box::new(func), args, kwargs: Vec::new(), stars: Vec::new() })
    }

    pub fn call_kw(
        &mut self,
        f: &str,
        args: Vec<Spanned<Expr>>,
        kwargs: Vec<(&str, Spanned<Expr>)>,
    ) -> Spanned<Expr> {
        let func = self.name(f);
        let kwargs = kwargs
            .into_iter()
            .map(|(k, v)| {
                let key = self.sp(k.to_string());
                (key, v)
            })
            .collect();
        self.sp(Expr::Call { func: Box::new(func), args, kwargs, stars: Vec::new() })
    }

    pub fn call_star(
        &mut self,
        f: &str,
        args: Vec<Spanned<Expr>>,
        stars: Vec<Spanned<Expr>>,
    ) -> Spanned<Expr> {
        let func = self.name(f);
        self.sp(Expr::Call { func: Box::new(func), args, kwargs: Vec::new(), stars })
    }

    pub fn method_call(
        &mut self,
        object: Spanned<Expr>,
        method: &str,
        args: Vec<Spanned<Expr>>,
    ) -> Spanned<Expr> {
        let func = self.attr(object, method);
        self.sp(Expr::Call { func: Box::new(func), args, kwargs: Vec::new(), stars: Vec::new() })
    }

    /// The `readonly(...)` builtin wrapper.
    pub fn readonly(&mut self, value: Spanned<Expr>) -> Spanned<Expr> {
        self.call("readonly", vec![value])
    }

    // ----- annotations -----

    pub fn ty(&mut self, n: &str) -> Spanned<Annotation> {
        self.sp(Annotation::Name(n.into()))
    }

    pub fn sub_ann(&mut self, base: &str, args: Vec<Spanned<Annotation>>) -> Spanned<Annotation> {
        let base = self.ty(base);
        self.sp(Annotation::Subscript { base: Box::new(base), args })
    }

    pub fn union_ann(&mut self, members: Vec<Spanned<Annotation>>) -> Spanned<Annotation> {
        self.sp(Annotation::Union(members))
    }

    /// `Final[inner]`
    pub fn final_ann(&mut self, inner: &str) -> Spanned<Annotation> {
        let arg = self.ty(inner);
        self.sub_ann("Final", vec![arg])
    }

    /// `Readonly[inner]`
    pub fn readonly_ann(&mut self, inner: &str) -> Spanned<Annotation> {
        let arg = self.ty(inner);
        self.sub_ann("Readonly", vec![arg])
    }

    // ----- statements -----

    pub fn expr_stmt(&mut self, e: Spanned<Expr>) -> Spanned<Stmt> {
        self.sp(Stmt::Expr(e))
    }

    pub fn assign(&mut self, name: &str, value: Spanned<Expr>) -> Spanned<Stmt> {
        let target = self.sp(Target::Name(name.into()));
        self.sp(Stmt::Assign { target, value })
    }

    pub fn assign_tuple(&mut self, names: &[&str], value: Spanned<Expr>) -> Spanned<Stmt> {
        let elems = names
            .iter()
            .map(|n| self.sp(Target::Name((*n).into())))
            .collect();
        let target = self.sp(Target::Tuple(elems));
        self.sp(Stmt::Assign { target, value })
    }

    pub fn assign_attr(
        &mut self,
        object: Spanned<Expr>,
        field: &str,
        value: Spanned<Expr>,
    ) -> Spanned<Stmt> {
        let attr = self.sp(field.to_string());
        let target = self.sp(Target::Attribute { object: Box::new(object), attr });
        self.sp(Stmt::Assign { target, value })
    }

    pub fn ann_assign(
        &mut self,
        name: &str,
        annotation: Spanned<Annotation>,
        value: Option<Spanned<Expr>>,
    ) -> Spanned<Stmt> {
        let name = self.sp(name.to_string());
        self.sp(Stmt::AnnAssign { name, annotation, value })
    }

    pub fn aug_assign(&mut self, name: &str, value: Spanned<Expr>) -> Spanned<Stmt> {
        let target = self.sp(Target::Name(name.into()));
        self.sp(Stmt::AugAssign { target, op: BinOp::Add, value })
    }

    pub fn aug_assign_attr(
        &mut self,
        object: Spanned<Expr>,
        field: &str,
        value: Spanned<Expr>,
    ) -> Spanned<Stmt> {
        let attr = self.sp(field.to_string());
        let target = self.sp(Target::Attribute { object: Box::new(object), attr });
        self.sp(Stmt::AugAssign { target, op: BinOp::Add, value })
    }

    pub fn ret(&mut self, value: Option<Spanned<Expr>>) -> Spanned<Stmt> {
        self.sp(Stmt::Return(value))
    }

    pub fn pass(&mut self) -> Spanned<Stmt> {
        self.sp(Stmt::Pass)
    }

    pub fn for_loop(
        &mut self,
        target: &str,
        iter: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let target = self.sp(Target::Name(target.into()));
        self.sp(Stmt::For { target, iter, body })
    }

    pub fn for_tuple(
        &mut self,
        names: &[&str],
        iter: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let elems = names
            .iter()
            .map(|n| self.sp(Target::Name((*n).into())))
            .collect();
        let target = self.sp(Target::Tuple(elems));
        self.sp(Stmt::For { target, iter, body })
    }

    pub fn with_as(
        &mut self,
        context: Spanned<Expr>,
        binding: &str,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let target = self.sp(Target::Name(binding.into()));
        self.sp(Stmt::With { context, binding: Some(target), body })
    }

    pub fn try_except(
        &mut self,
        body: Vec<Spanned<Stmt>>,
        exc_type: Option<&str>,
        binding: Option<&str>,
        handler_body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let ty = exc_type.map(|t| self.name(t));
        let binding = binding.map(|b| self.sp(b.to_string()));
        let handler = self.sp(ExceptHandler { ty, binding, body: handler_body });
        self.sp(Stmt::Try {
            body,
            handlers: vec![handler],
            orelse: Vec::new(),
            finally: Vec::new(),
        })
    }

    pub fn global_stmt(&mut self, names: &[&str]) -> Spanned<Stmt> {
        let names = names.iter().map(|n| self.sp((*n).to_string())).collect();
        self.sp(Stmt::Global { names })
    }

    pub fn nonlocal_stmt(&mut self, names: &[&str]) -> Spanned<Stmt> {
        let names = names.iter().map(|n| self.sp((*n).to_string())).collect();
        self.sp(Stmt::Nonlocal { names })
    }

    pub fn param(&mut self, name: &str, annotation: Option<Spanned<Annotation>>) -> Param {
        Param { name: self.sp(name.to_string()), annotation }
    }

    pub fn func(
        &mut self,
        name: &str,
        params: Vec<Param>,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        self.func_dec(name, &[], params, body)
    }

    pub fn func_dec(
        &mut self,
        name: &str,
        decorators: &[&str],
        params: Vec<Param>,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let decorators = decorators.iter().map(|d| self.sp((*d).to_string())).collect();
        let name = self.sp(name.to_string());
        self.sp(Stmt::FuncDef(FuncDef { name, params, returns: None, body, decorators }))
    }

    pub fn func_ret(
        &mut self,
        name: &str,
        params: Vec<Param>,
        returns: Spanned<Annotation>,
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let name = self.sp(name.to_string());
        self.sp(Stmt::FuncDef(FuncDef {
            name,
            params,
            returns: Some(returns),
            body,
            decorators: Vec::new(),
        }))
    }

    pub fn class(
        &mut self,
        name: &str,
        bases: &[&str],
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        self.class_dec(name, &[], bases, body)
    }

    pub fn class_dec(
        &mut self,
        name: &str,
        decorators: &[&str],
        bases: &[&str],
        body: Vec<Spanned<Stmt>>,
    ) -> Spanned<Stmt> {
        let decorators = decorators.iter().map(|d| self.sp((*d).to_string())).collect();
        let bases = bases.iter().map(|b| self.sp((*b).to_string())).collect();
        let name = self.sp(name.to_string());
        self.sp(Stmt::ClassDef(ClassDef { name, bases, body, decorators }))
    }

    pub fn module(&mut self, name: &str, body: Vec<Spanned<Stmt>>) -> Module {
        Module { name: name.into(), body }
    }
}

// ----- analysis drivers and assertions -----

pub fn analyze(module: &Module) -> Analysis {
    analyze_module(module, &TypeFacts::new()).unwrap()
}

pub fn analyze_with(module: &Module, facts: &TypeFacts) -> Analysis {
    analyze_module(module, facts).unwrap()
}

/// Assert the exact diagnostic sequence: one pattern per diagnostic, in
/// order, matched by substring (the conformance corpus matches this way).
pub fn check_messages(analysis: &Analysis, expected: &[&str]) {
    let messages = analysis.diagnostics.messages();
    assert_eq!(
        messages.len(),
        expected.len(),
        "expected {} diagnostics, got: {messages:#?}",
        expected.len()
    );
    for (message, pattern) in messages.iter().zip(expected) {
        assert!(
            message.contains(pattern),
            "expected '{pattern}' in '{message}'"
        );
    }
}

pub fn assert_clean(analysis: &Analysis) {
    assert!(
        analysis.diagnostics.is_empty(),
        "expected no diagnostics, got: {:#?}",
        analysis.diagnostics.messages()
    );
}
