//! Lode Compiler CLI
//!
//! Command-line driver for the analysis and IL core. The front end
//! serializes parsed programs to JSON; `lodec` analyzes them, prints
//! diagnostics (human-readable or LSP-style JSON), and can dump the
//! generated IL.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use lodec::{
    analyze_and_generate, analyze_modules, load_program_json, AnalyzerOptions, Diagnostic,
    GenOptions, Severity, TargetConfig,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "lodec")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lode compiler core - analyze programs and emit IL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one or more AST files (JSON) and report diagnostics
    Analyze {
        /// Input AST files produced by the front end
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target description (TOML); defaults to the embedded C64 target
        #[arg(long)]
        target: Option<PathBuf>,

        /// Emit diagnostics as LSP-style JSON
        #[arg(long)]
        json: bool,

        /// Stop at the first error
        #[arg(long)]
        stop_on_first_error: bool,

        /// Suppress warnings
        #[arg(long)]
        errors_only: bool,

        /// Treat warnings as errors (exit with failure if any warnings)
        #[arg(long)]
        deny_warnings: bool,
    },

    /// Lower a single module to IL and print it
    EmitIl {
        /// Input AST file produced by the front end
        input: PathBuf,

        /// Target description (TOML); defaults to the embedded C64 target
        #[arg(long)]
        target: Option<PathBuf>,

        /// Skip SSA construction
        #[arg(long)]
        no_ssa: bool,

        /// Run the strict SSA verifier (loop back-edges may trip it)
        #[arg(long)]
        verify_ssa: bool,

        /// Print per-function SSA statistics
        #[arg(long)]
        stats: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            inputs,
            target,
            json,
            stop_on_first_error,
            errors_only,
            deny_warnings,
        } => run_analyze(
            &inputs,
            target.as_deref(),
            json,
            stop_on_first_error,
            errors_only,
            deny_warnings,
        ),
        Commands::EmitIl {
            input,
            target,
            no_ssa,
            verify_ssa,
            stats,
        } => run_emit_il(&input, target.as_deref(), no_ssa, verify_ssa, stats),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
        }
    }
}

fn load_target(path: Option<&Path>) -> TargetConfig {
    match path {
        None => TargetConfig::c64(),
        Some(path) => {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("error: cannot read {}: {}", path.display(), e);
                process::exit(2);
            });
            TargetConfig::from_toml(&text).unwrap_or_else(|e| {
                eprintln!("error: {}", e);
                process::exit(2);
            })
        }
    }
}

fn load_programs(inputs: &[PathBuf]) -> Vec<lodec::Program> {
    let mut programs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let text = std::fs::read_to_string(input).unwrap_or_else(|e| {
            eprintln!("error: cannot read {}: {}", input.display(), e);
            process::exit(2);
        });
        match load_program_json(&text) {
            Ok(program) => programs.push(program),
            Err(e) => {
                eprintln!("error: {}: {}", input.display(), e);
                process::exit(2);
            }
        }
    }
    programs
}

fn print_diagnostics(module: &str, diagnostics: &[Diagnostic], json: bool, errors_only: bool) {
    for d in diagnostics {
        if errors_only && d.severity != Severity::Error {
            continue;
        }
        if json {
            // LSP-style payload, one object per line
            match serde_json::to_string(d) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("error: cannot serialize diagnostic: {}", e),
            }
        } else {
            println!("{}: {}", module, d);
        }
    }
}

fn run_analyze(
    inputs: &[PathBuf],
    target: Option<&Path>,
    json: bool,
    stop_on_first_error: bool,
    errors_only: bool,
    deny_warnings: bool,
) {
    let target = load_target(target);
    let options = AnalyzerOptions::new()
        .with_stop_on_first_error(stop_on_first_error)
        .with_report_warnings(!errors_only);
    let programs = load_programs(inputs);

    let (had_errors, had_warnings) = if programs.len() == 1 {
        let program = programs.into_iter().next().unwrap();
        let result = lodec::analyze(program, &target, &options);
        print_diagnostics(&result.module_name, result.diagnostics.items(), json, errors_only);
        (!result.success, result.diagnostics.warning_count() > 0)
    } else {
        let result = analyze_modules(programs, &target, &options);
        print_diagnostics("<modules>", result.diagnostics.items(), json, errors_only);
        let mut warnings = false;
        for (name, module) in &result.modules {
            warnings |= module.diagnostics.warning_count() > 0;
            print_diagnostics(name, module.diagnostics.items(), json, errors_only);
        }
        (!result.success, warnings)
    };

    if had_errors || (deny_warnings && had_warnings) {
        process::exit(1);
    }
}

fn run_emit_il(input: &Path, target: Option<&Path>, no_ssa: bool, verify_ssa: bool, stats: bool) {
    let target = load_target(target);
    let inputs = vec![input.to_path_buf()];
    let mut programs = load_programs(&inputs);
    let program = programs.remove(0);

    let gen_options = GenOptions::new()
        .with_ssa(!no_ssa)
        .with_verify_ssa(verify_ssa)
        .with_ssa_stats(stats);

    let (analysis, generation) = analyze_and_generate(
        program,
        &target,
        &AnalyzerOptions::default(),
        &gen_options,
    );
    print_diagnostics(&analysis.module_name, analysis.diagnostics.items(), false, false);

    let Some(generation) = generation else {
        eprintln!("error: analysis failed, no IL generated");
        process::exit(1);
    };
    print_diagnostics(
        &analysis.module_name,
        generation.diagnostics.items(),
        false,
        false,
    );

    println!("{}", generation.module);

    if stats {
        for (name, ssa) in &generation.ssa_results {
            println!(
                "; {}: {} phi(s), {} version(s), dominator depth {}{}",
                name,
                ssa.phi_count,
                ssa.versions_created,
                ssa.dom_tree_depth,
                match ssa.elapsed {
                    Some(d) => format!(", {:?}", d),
                    None => String::new(),
                }
            );
        }
    }

    if !generation.success {
        process::exit(1);
    }
}
