//! lispc - command-line front end for the embeddable interpreter.
//!
//! This binary is a thin consumer of `lispc_vm::Vm`: it never touches the
//! heap or execution context directly, only `eval_string`/`pretty`/
//! `error_report`, the same surface any other embedder would use.

mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use config::CliConfig;
use lispc_vm::Vm;

#[derive(Parser)]
#[command(name = "lispc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run and inspect lispc programs", long_about = None)]
struct Args {
    /// Path to a `lispc.toml` config file; defaults are used if absent.
    #[arg(long, default_value = "lispc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every top-level expression in a source file, printing the
    /// last one's value.
    Run { file: PathBuf },
    /// Evaluate a single expression given on the command line.
    Eval { source: String },
    /// List every registered native function name.
    Builtins,
}

fn main() {
    let args = Args::parse();
    let config = match CliConfig::load(&args.config) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("lispc: {message}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    let mut vm = Vm::with_capacity(config.data_stack_capacity, config.frame_capacity);

    let outcome = match args.command {
        Command::Run { file } => run_file(&mut vm, &file),
        Command::Eval { source } => run_source(&mut vm, &source),
        Command::Builtins => {
            for name in vm.builtin_names() {
                println!("{name}");
            }
            Ok(())
        }
    };

    if let Err(message) = outcome {
        eprintln!("{message}");
        std::process::exit(1);
    }
}

fn run_file(vm: &mut Vm, file: &std::path::Path) -> Result<(), String> {
    let source = std::fs::read_to_string(file).map_err(|e| format!("reading {file:?}: {e}"))?;
    run_source(vm, &source)
}

fn run_source(vm: &mut Vm, source: &str) -> Result<(), String> {
    match vm.eval_string(source) {
        Ok(value) => {
            println!("{}", vm.pretty(value));
            Ok(())
        }
        Err(err) => {
            let report = vm.error_report();
            vm.reset_calls();
            Err(format!("{err}\n{report}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_source_prints_pretty_value_on_success() {
        let mut vm = Vm::new();
        assert!(run_source(&mut vm, "(+ 1 2)").is_ok());
    }

    #[test]
    fn run_source_reports_and_resets_on_error() {
        let mut vm = Vm::new();
        assert!(run_source(&mut vm, "(/ 1 0)").is_err());
        // The Vm is usable again without the caller calling reset_calls
        // itself, since run_source already does so on the error path.
        assert!(run_source(&mut vm, "(+ 1 1)").is_ok());
    }
}
