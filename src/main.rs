use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ceres::ast::Module;
use ceres::diagnostics::render_diagnostic;
use ceres::facts::TypeFacts;

#[derive(Parser)]
#[command(name = "ceresc", version, about = "Static qualifier checker and instruction selector")]
struct Cli {
    /// Path to a type-facts JSON file from the type-inference service
    #[arg(long, global = true)]
    facts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a serialized module AST and report qualifier diagnostics
    Check {
        /// Module AST path (.json)
        ast: PathBuf,
        /// Original source file, for rendered reports
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Print the module's final-constant registry, in declaration order
    Constants {
        /// Module AST path (.json)
        ast: PathBuf,
    },
    /// Print the per-site instruction selections as JSON
    Select {
        /// Module AST path (.json)
        ast: PathBuf,
    },
}

fn load_module(path: &Path) -> Result<Module, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid module AST: {e}"))
}

fn load_facts(path: Option<&Path>) -> Result<TypeFacts, String> {
    match path {
        None => Ok(TypeFacts::new()),
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .map_err(|e| format!("failed to read {}: {e}", p.display()))?;
            serde_json::from_str(&text).map_err(|e| format!("invalid type facts: {e}"))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let facts = load_facts(cli.facts.as_deref())?;

    match cli.command {
        Commands::Check { ast, source } => {
            let module = load_module(&ast)?;
            let analysis = ceres::analyze_module(&module, &facts)
                .map_err(|e| format!("fatal: {e}"))?;

            if analysis.diagnostics.is_empty() {
                println!(
                    "{}: ok ({} constants, {} selections)",
                    module.name,
                    analysis.constants.len(),
                    analysis.selections.len()
                );
                return Ok(ExitCode::SUCCESS);
            }

            let source_text = match &source {
                Some(p) => Some(
                    std::fs::read_to_string(p)
                        .map_err(|e| format!("failed to read {}: {e}", p.display()))?,
                ),
                None => None,
            };
            for diag in analysis.diagnostics.iter() {
                match &source_text {
                    Some(text) => render_diagnostic(text, diag),
                    None => eprintln!("error[{}..{}]: {}", diag.span.start, diag.span.end, diag.message),
                }
            }
            eprintln!(
                "{}: {} qualifier diagnostics",
                module.name,
                analysis.diagnostics.len()
            );
            Ok(ExitCode::FAILURE)
        }
        Commands::Constants { ast } => {
            let module = load_module(&ast)?;
            let analysis = ceres::analyze_module(&module, &facts)
                .map_err(|e| format!("fatal: {e}"))?;
            for constant in &analysis.constants {
                println!("{}", constant.name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Select { ast } => {
            let module = load_module(&ast)?;
            let analysis = ceres::analyze_module(&module, &facts)
                .map_err(|e| format!("fatal: {e}"))?;
            let json = serde_json::to_string_pretty(&analysis.selections)
                .map_err(|e| format!("failed to serialize selections: {e}"))?;
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}
