//! Declaration records and the per-scope declaration table operations.
//!
//! A Declaration's qualifier set is fixed by the first declaration of the
//! name in a scope. The table itself never emits diagnostics; the qualifier
//! passes interrogate it and report violations through their own sinks.

use serde::{Serialize, Deserialize};

use crate::ast::{Annotation, Qualifier};
use crate::span::Span;
use super::{BindingKind, Scope, ScopeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Qualifiers {
    pub readonly: bool,
    pub is_final: bool,
}

impl Qualifiers {
    pub const NONE: Qualifiers = Qualifiers { readonly: false, is_final: false };

    /// Qualifiers named at the outermost annotation position. Arity and
    /// nesting violations are the Final pass's concern, not ours.
    pub fn from_annotation(ann: &Annotation) -> Qualifiers {
        match ann.qualifier() {
            Some((Qualifier::Readonly, _)) => Qualifiers { readonly: true, is_final: false },
            Some((Qualifier::Final, _)) => Qualifiers { readonly: false, is_final: true },
            None => Qualifiers::NONE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub qualifiers: Qualifiers,
    /// Site of the declaration that established the qualifiers.
    pub span: Span,
    pub has_initializer: bool,
    /// Filled once binding classification has run.
    pub kind: BindingKind,
}

/// Why a second declaration of the same name is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeclarationKind {
    /// The qualifier set changed between declarations.
    QualifierChanged,
    /// The name was Final; Final forbids re-declaration even with
    /// identical syntax.
    FinalRedeclared,
}

impl Declaration {
    /// Would declaring this name again with `qualifiers` be a
    /// redeclaration error?
    pub fn redeclaration_with(&self, qualifiers: Qualifiers) -> Option<RedeclarationKind> {
        if self.qualifiers.is_final {
            Some(RedeclarationKind::FinalRedeclared)
        } else if self.qualifiers != qualifiers {
            Some(RedeclarationKind::QualifierChanged)
        } else {
            None
        }
    }
}

/// Whether a qualifier may be declared on a simple variable of the given
/// scope kind. Readonly is a function-local/parameter concept; Final on a
/// simple variable is only the module-level constant mechanism.
pub fn qualifier_allowed(kind: ScopeKind, qualifier: Qualifier) -> bool {
    match qualifier {
        Qualifier::Readonly => matches!(kind, ScopeKind::Function | ScopeKind::Comprehension),
        Qualifier::Final => !matches!(kind, ScopeKind::Class),
    }
}

impl Scope {
    /// Record a declaration. The first declaration of a name in a scope
    /// wins; callers detect conflicts via [`Declaration::redeclaration_with`].
    pub fn declare(
        &mut self,
        name: &str,
        qualifiers: Qualifiers,
        span: Span,
        has_initializer: bool,
    ) -> Result<(), RedeclarationKind> {
        if let Some(existing) = self.decls.get(name) {
            return match existing.redeclaration_with(qualifiers) {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }
        self.decls.insert(
            name.to_string(),
            Declaration {
                name: name.to_string(),
                qualifiers,
                span,
                has_initializer,
                kind: BindingKind::Local,
            },
        );
        Ok(())
    }

    pub fn decl(&self, name: &str) -> Option<&Declaration> {
        self.decls.get(name)
    }
}
