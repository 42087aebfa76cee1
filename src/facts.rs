//! Minimal type facts supplied by the external type-inference service.
//!
//! The analyses never infer general types themselves; they consume this side
//! channel for the few decisions that need one (concrete receiver types,
//! statically known callees, primitive locals, externally defined base
//! classes). `TypeFact::Unknown` always means "assume safe": it never
//! produces a qualifier diagnostic and never enables a specialized
//! instruction.

use std::collections::HashMap;

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimTy {
    Int,
    Float,
    Bool,
    Str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeFact {
    /// Dynamic or unresolvable. Assume safe, never flag, never specialize.
    Unknown,
    /// A declared primitive-typed local, eligible for unboxed arithmetic.
    Primitive(PrimTy),
    /// A statically known concrete class, by name.
    Class(String),
    /// A statically known function, by name.
    Function(String),
}

/// What the type service knows about a class that is not defined in the
/// unit under analysis (imported or otherwise external).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassFact {
    pub module: String,
    pub fields: Vec<String>,
    pub final_members: Vec<String>,
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeFacts {
    /// Declared types by name, as resolved by the type service.
    pub names: HashMap<String, TypeFact>,
    /// Concrete class layouts by class name.
    pub classes: HashMap<String, ClassFact>,
}

impl TypeFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_fact(&self, name: &str) -> &TypeFact {
        self.names.get(name).unwrap_or(&TypeFact::Unknown)
    }

    pub fn class_fact(&self, name: &str) -> Option<&ClassFact> {
        self.classes.get(name)
    }
}
