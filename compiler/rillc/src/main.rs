//! Rill CLI
//!
//! Runs an entry file as a script, prints its value, and renders any
//! diagnostics. Exit code is 0 on success, 1 when any diagnostic was
//! emitted.

mod loader;

use std::path::Path;
use std::rc::Rc;

use rill_diagnostic::emitter;
use rill_eval::Interpreter;
use tracing_subscriber::EnvFilter;

use loader::FileLoader;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => print_usage(),
        "version" | "--version" | "-V" => {
            println!("Rill {}", env!("CARGO_PKG_VERSION"));
        }
        "parse" => {
            if args.len() < 3 {
                eprintln!("Usage: rillc parse <file.rill>");
                std::process::exit(1);
            }
            parse_file(&args[2]);
        }
        "run" => {
            if args.len() < 3 {
                eprintln!("Usage: rillc run <file.rill>");
                std::process::exit(1);
            }
            run_file(&args[2]);
        }
        file => run_file(file),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("Rill - an effectful expression language");
    println!();
    println!("Usage:");
    println!("  rillc <file.rill>        Evaluate a file and print its value");
    println!("  rillc run <file.rill>    Same as above");
    println!("  rillc parse <file.rill>  Print the syntax tree");
    println!("  rillc version            Print the version");
    println!();
    println!("Set RILL_LOG (e.g. RILL_LOG=rill_eval=trace) for scheduler traces.");
}

fn run_file(path: &str) {
    let loader = FileLoader::new();
    let interp = Rc::new(Interpreter::builder().loader(loader.clone()).build());
    loader.attach(&interp);

    let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read {path}: {e}");
        std::process::exit(1);
    });

    match interp.evaluate_entry_file(Path::new(path)) {
        Ok(value) => {
            println!("{}", interp.render(&value));
        }
        Err(diagnostics) => {
            for diagnostic in &diagnostics {
                emitter::eprint(diagnostic, path, &source);
            }
            std::process::exit(1);
        }
    }
}

fn parse_file(path: &str) {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read {path}: {e}");
        std::process::exit(1);
    });

    let interner = rill_ir::SharedInterner::new();
    let parsed = rill_parse::parse_source(&source, &interner);
    for &stmt in &parsed.top {
        println!("{:?}", parsed.arena.get(stmt));
    }
    if parsed.has_errors() {
        for diagnostic in &parsed.diagnostics {
            emitter::eprint(diagnostic, path, &source);
        }
        std::process::exit(1);
    }
}
