//! Static qualifier checking and instruction selection for a
//! gradually-typed, dynamically-rooted language.
//!
//! The frontend hands this crate an AST for one compilation unit plus a
//! side channel of minimal type facts. The pipeline resolves scopes, runs
//! the Readonly and Final qualifier analyses, folds module-level Final
//! literal constants, and selects specialized or generic instruction forms
//! per operation site. Qualifier violations are recoverable diagnostics;
//! only a malformed AST aborts the unit.

pub mod span;
pub mod ast;
pub mod facts;
pub mod diagnostics;
pub mod binder;
pub mod qualck;
pub mod fold;
pub mod isel;

use std::collections::HashMap;

use ast::{Literal, Module};
use binder::ScopeTree;
use diagnostics::{CompileError, Diagnostics};
use facts::TypeFacts;
use fold::FinalConstant;
use isel::Selection;

/// Everything the analysis produces for one unit. The scope tree persists
/// for cross-function final-constant lookups; the rewrite and selection
/// tables are keyed by the spans of the nodes they annotate.
#[derive(Debug)]
pub struct Analysis {
    pub scopes: ScopeTree,
    pub diagnostics: Diagnostics,
    pub constants: Vec<FinalConstant>,
    pub rewrites: HashMap<(usize, usize), Literal>,
    pub selections: Vec<Selection>,
}

impl Analysis {
    /// The module's ordered final-constant registry (the
    /// `__final_constants__` equivalent).
    pub fn final_constant_names(&self) -> Vec<&str> {
        self.constants.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Run the full pipeline: scope resolution → qualifier analyses →
/// constant folding → instruction selection. Diagnostics do not stop the
/// pipeline; inspect `Analysis::diagnostics` afterwards.
pub fn analyze_module(module: &Module, facts: &TypeFacts) -> Result<Analysis, CompileError> {
    let tree = binder::resolve(module)?;
    let diagnostics = qualck::check(module, &tree, facts);
    let fold = fold::fold_module(module, &tree);
    let selections = isel::select(module, &tree, &fold, facts);
    Ok(Analysis {
        scopes: tree,
        diagnostics,
        constants: fold.constants,
        rewrites: fold.rewrites,
        selections,
    })
}

/// Strict entry point for code generation: a unit with any qualifier
/// diagnostic fails compilation and its instruction stream is withheld.
pub fn compile_module(module: &Module, facts: &TypeFacts) -> Result<Analysis, CompileError> {
    let analysis = analyze_module(module, facts)?;
    if !analysis.diagnostics.is_empty() {
        let first = analysis
            .diagnostics
            .iter()
            .next()
            .map(|d| d.message.clone())
            .unwrap_or_default();
        return Err(CompileError::QualifierErrors {
            count: analysis.diagnostics.len(),
            first,
        });
    }
    Ok(analysis)
}
