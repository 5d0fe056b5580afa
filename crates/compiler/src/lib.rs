//! Lode Compiler Library
//!
//! Semantic analysis and intermediate-language core for Lode, a
//! statically-typed systems language targeting the MOS 6502 family
//! (primary target: the Commodore 64). The front end (lexer and parser)
//! and the machine-code backend live in sibling projects; this crate
//! takes a parsed [`ast::Program`] - in memory, or serialized as JSON -
//! and produces:
//!
//! - a type-annotated program with resolved symbols and per-function
//!   control-flow graphs
//! - the dataflow facts the backend consumes (reaching definitions,
//!   liveness, purity, escape classes, zero-page scores)
//! - a typed register-based IL in SSA form
//!
//! # Pipeline
//!
//! ```text
//! AST -> symbols -> types -> checking -> control flow
//!     -> call graph (recursion is a hard error)
//!     -> dataflow -> IL generation -> SSA
//! ```
//!
//! Every pass is best-effort: it accumulates located diagnostics and
//! continues, so one mistake surfaces the others behind it. Recursion is
//! the exception - the 6502 backend allocates frames statically, so
//! recursive functions are rejected and never lowered.
//!
//! # Example
//!
//! ```rust,ignore
//! use lodec::{analyze, generate_module, AnalyzerOptions, GenOptions, TargetConfig};
//!
//! let program = lodec::load_program_json(&source_json)?;
//! let target = TargetConfig::c64();
//! let analysis = analyze(program, &target, &AnalyzerOptions::default());
//! if analysis.success {
//!     let il = generate_module(
//!         &analysis.program,
//!         &analysis.symbol_table,
//!         &analysis.metadata,
//!         &analysis.call_graph,
//!         &target,
//!         &GenOptions::default(),
//!     );
//!     println!("{}", il.module);
//! }
//! ```

pub mod analyzer;
pub mod ast;
pub mod builtins;
pub mod call_graph;
pub mod cfg;
pub mod config;
pub mod dataflow;
pub mod diagnostics;
pub mod il;
pub mod ilgen;
pub mod modules;
pub mod ssa;
pub mod symbols;
pub mod symtab;
pub mod type_resolver;
pub mod typechecker;
pub mod types;

pub use analyzer::{analyze, analyze_modules, AnalysisResult, MultiModuleResult};
pub use ast::Program;
pub use config::{AnalyzerOptions, GenOptions, TargetConfig};
pub use diagnostics::{Code, Diagnostic, Diagnostics, Severity};
pub use ilgen::{generate_module, GenerationResult};
pub use ssa::{construct_ssa, SsaStats};
pub use symtab::SymbolTable;
pub use typechecker::CheckOptions;
pub use types::{Type, TypeSystem};

/// Deserialize a program from the JSON the front end emits.
pub fn load_program_json(text: &str) -> Result<Program, String> {
    serde_json::from_str(text).map_err(|e| format!("Failed to parse AST JSON: {}", e))
}

/// Analysis followed by IL generation when analysis succeeded.
///
/// Errors disable code generation; warnings do not. Recursive functions
/// were already excluded from lowering by the generator itself.
pub fn analyze_and_generate(
    program: Program,
    target: &TargetConfig,
    analyzer_options: &AnalyzerOptions,
    gen_options: &GenOptions,
) -> (AnalysisResult, Option<GenerationResult>) {
    let analysis = analyze(program, target, analyzer_options);
    if !analysis.success {
        return (analysis, None);
    }
    let generation = generate_module(
        &analysis.program,
        &analysis.symbol_table,
        &analysis.metadata,
        &analysis.call_graph,
        target,
        gen_options,
    );
    (analysis, Some(generation))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD_PROGRAM: &str = r#"{
        "module": { "name": "demo", "implicit": false },
        "declarations": [
            { "decl": "function", "name": "add",
              "params": [
                  { "name": "a", "annotation": "byte" },
                  { "name": "b", "annotation": "byte" }
              ],
              "return_annotation": "byte",
              "body": [
                  { "stmt": "return",
                    "value": { "expr": "binary", "op": "add",
                               "lhs": { "expr": "identifier", "name": "a" },
                               "rhs": { "expr": "identifier", "name": "b" } } }
              ] }
        ]
    }"#;

    #[test]
    fn test_json_end_to_end() {
        let program = load_program_json(ADD_PROGRAM).expect("AST parses");
        let target = TargetConfig::c64();
        let (analysis, generation) = analyze_and_generate(
            program,
            &target,
            &AnalyzerOptions::default(),
            &GenOptions::default(),
        );

        assert!(analysis.success, "{:?}", analysis.diagnostics.items());
        let generation = generation.expect("IL generated");
        assert!(generation.success);

        let f = generation.module.function("add").expect("function exists");
        assert_eq!(f.params.len(), 2);
        // The printable dump mentions the ADD opcode
        let text = f.to_string();
        assert!(text.contains("ADD"), "{}", text);
    }

    #[test]
    fn test_errors_disable_generation() {
        let json = r#"{
            "module": { "name": "demo", "implicit": true },
            "declarations": [
                { "decl": "function", "name": "f",
                  "body": [
                      { "stmt": "expr",
                        "expr": { "expr": "identifier", "name": "ghost" } }
                  ] }
            ]
        }"#;
        let program = load_program_json(json).unwrap();
        let target = TargetConfig::c64();
        let (analysis, generation) = analyze_and_generate(
            program,
            &target,
            &AnalyzerOptions::default(),
            &GenOptions::default(),
        );
        assert!(!analysis.success);
        assert!(generation.is_none());
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(load_program_json("{ not json").is_err());
    }
}
