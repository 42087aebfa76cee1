//! Qualifier checking: the Readonly propagator and the Final enforcer.
//!
//! Both passes read the frozen scope tree built by the binder and write
//! only to their own sinks; the collector reconciles the two streams
//! deterministically afterwards. A unit with any reconciled diagnostic is
//! rejected by `compile_module`.

pub mod readonly;
pub mod finals;

use crate::ast::Module;
use crate::binder::ScopeTree;
use crate::diagnostics::{AnalysisPass, DiagnosticSink, Diagnostics};
use crate::facts::TypeFacts;

pub fn check(module: &Module, tree: &ScopeTree, facts: &TypeFacts) -> Diagnostics {
    let mut ro_sink = DiagnosticSink::new(AnalysisPass::Readonly);
    readonly::check(module, tree, &mut ro_sink);

    let mut fin_sink = DiagnosticSink::new(AnalysisPass::Final);
    finals::check(module, tree, facts, &mut fin_sink);

    Diagnostics::reconcile(ro_sink, fin_sink)
}
