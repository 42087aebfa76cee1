//! AST for one compilation unit, as delivered by the frontend.
//!
//! The lexer/parser live upstream; they hand this crate a fully built
//! `Module`, either constructed in-process or deserialized from the JSON
//! interchange format (every node derives serde). Qualifiers appear in the
//! tree exactly as written in source: as `Readonly`/`Final` annotation heads
//! and as `readonly_func`/`final` decorator names. Nothing here is checked;
//! all validation happens in the analysis passes.

use serde::{Serialize, Deserialize};

use crate::span::{Span, Spanned};

/// One compilation unit. `name` is the dotted module name used in
/// diagnostics that qualify classes and attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub body: Vec<Spanned<Stmt>>,
}

/// Compile-time literal values. These are the only initializers the
/// constant folder will embed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

/// A type annotation as written, before any qualifier interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    /// A plain name: `int`, `Any`, `Final`, `Readonly`.
    Name(String),
    /// A subscripted head: `Final[int]`, `List[str]`.
    Subscript {
        base: Box<Spanned<Annotation>>,
        args: Vec<Spanned<Annotation>>,
    },
    /// A union: `int | str`.
    Union(Vec<Spanned<Annotation>>),
}

impl Annotation {
    /// The qualifier named at the outermost position, if any, together with
    /// the subscript argument count (`None` for a bare head).
    pub fn qualifier(&self) -> Option<(Qualifier, Option<usize>)> {
        match self {
            Annotation::Name(n) => Qualifier::from_name(n).map(|q| (q, None)),
            Annotation::Subscript { base, args } => match &base.node {
                Annotation::Name(n) => Qualifier::from_name(n).map(|q| (q, Some(args.len()))),
                _ => None,
            },
            Annotation::Union(_) => None,
        }
    }
}

/// The two binding qualifiers this backend verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qualifier {
    Readonly,
    Final,
}

impl Qualifier {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Readonly" => Some(Qualifier::Readonly),
            "Final" => Some(Qualifier::Final),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An assignment target. Attribute and subscript targets never bind names;
/// the binder only records name-binding events for `Name` and the `Name`
/// leaves of `Tuple`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    Name(String),
    Tuple(Vec<Spanned<Target>>),
    Attribute {
        object: Box<Spanned<Expr>>,
        attr: Spanned<String>,
    },
    Subscript {
        object: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Tuple(Vec<Spanned<Expr>>),
    List(Vec<Spanned<Expr>>),
    Attribute {
        object: Box<Spanned<Expr>>,
        attr: Spanned<String>,
    },
    Subscript {
        object: Box<Spanned<Expr>>,
        index: Box<Spanned<Expr>>,
    },
    Call {
        func: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
        kwargs: Vec<(Spanned<String>, Spanned<Expr>)>,
        stars: Vec<Spanned<Expr>>,
    },
    BinOp {
        op: BinOp,
        lhs: Box<Spanned<Expr>>,
        rhs: Box<Spanned<Expr>>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Spanned<Expr>>,
    },
    /// A comprehension. The element and condition evaluate in a dedicated
    /// comprehension scope; the iterable evaluates in the enclosing scope.
    Comprehension {
        elt: Box<Spanned<Expr>>,
        target: Box<Spanned<Target>>,
        iter: Box<Spanned<Expr>>,
        cond: Option<Box<Spanned<Expr>>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Spanned<String>,
    pub annotation: Option<Spanned<Annotation>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    pub name: Spanned<String>,
    pub params: Vec<Param>,
    pub returns: Option<Spanned<Annotation>>,
    pub body: Vec<Spanned<Stmt>>,
    /// Decorator names as written (`readonly_func`, `final`, ...).
    pub decorators: Vec<Spanned<String>>,
}

impl FuncDef {
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d.node == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: Spanned<String>,
    /// Base-class names. Bases that resolve to nothing statically are
    /// dynamic and exempt from finality checks.
    pub bases: Vec<Spanned<String>>,
    pub body: Vec<Spanned<Stmt>>,
    pub decorators: Vec<Spanned<String>>,
}

impl ClassDef {
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d.node == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub ty: Option<Spanned<Expr>>,
    pub binding: Option<Spanned<String>>,
    pub body: Vec<Spanned<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Spanned<Expr>),
    /// `x = e`, `x, y = e`, `a.f = e`, `l[i] = e`
    Assign {
        target: Spanned<Target>,
        value: Spanned<Expr>,
    },
    /// `x: T = e` or a bare `x: T`. The only statement form that carries
    /// qualifiers on a binding.
    AnnAssign {
        name: Spanned<String>,
        annotation: Spanned<Annotation>,
        value: Option<Spanned<Expr>>,
    },
    /// `x += e` and friends.
    AugAssign {
        target: Spanned<Target>,
        op: BinOp,
        value: Spanned<Expr>,
    },
    If {
        test: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
        orelse: Vec<Spanned<Stmt>>,
    },
    While {
        test: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    For {
        target: Spanned<Target>,
        iter: Spanned<Expr>,
        body: Vec<Spanned<Stmt>>,
    },
    With {
        context: Spanned<Expr>,
        binding: Option<Spanned<Target>>,
        body: Vec<Spanned<Stmt>>,
    },
    Try {
        body: Vec<Spanned<Stmt>>,
        handlers: Vec<Spanned<ExceptHandler>>,
        orelse: Vec<Spanned<Stmt>>,
        finally: Vec<Spanned<Stmt>>,
    },
    FuncDef(FuncDef),
    ClassDef(ClassDef),
    Return(Option<Spanned<Expr>>),
    Global {
        names: Vec<Spanned<String>>,
    },
    Nonlocal {
        names: Vec<Spanned<String>>,
    },
    Pass,
}

/// Collect the name leaves of an assignment target, with the span of each
/// leaf and whether it sits inside a tuple pattern.
pub fn target_names(target: &Spanned<Target>) -> Vec<(String, Span, bool)> {
    fn walk(target: &Spanned<Target>, in_tuple: bool, out: &mut Vec<(String, Span, bool)>) {
        match &target.node {
            Target::Name(n) => out.push((n.clone(), target.span, in_tuple)),
            Target::Tuple(elems) => {
                for elem in elems {
                    walk(elem, true, out);
                }
            }
            Target::Attribute { .. } | Target::Subscript { .. } => {}
        }
    }
    let mut out = Vec::new();
    walk(target, false, &mut out);
    out
}
