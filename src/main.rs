use std::path::PathBuf;
use std::process;

use clap::Parser;

mod bytecode;
mod capability;
mod host;
mod lex;
mod parse;
mod value;
mod vm;

use host::{CompilationResult, Host};

#[derive(Parser)]
struct Cli {
    /// script
    script: PathBuf,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            println!("Usage: testlet /path/to/script");
            process::exit(1);
        }
    };

    let host = Host::new();
    match host.evaluate(&cli.script) {
        CompilationResult::Failure(reports) => {
            println!("Script evaluation failed:");
            for report in reports {
                println!(" - [{}] {}", report.severity, report.message);
            }
        }
        CompilationResult::Success(script) => host.dispatch(&script),
    }
}
