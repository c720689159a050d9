use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use hackvm::source::load_modules;
use hackvm::translate_program;

/// Translate stack-machine source into Hack assembly.
#[derive(Parser, Debug)]
#[command(about = "VM-to-Hack translator")]
struct Cli {
    /// A .vm file, or a directory of .vm files
    input: PathBuf,

    /// Path for the generated .asm file
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let modules = load_modules(&cli.input)?;
    let program = translate_program(&modules)?;
    fs::write(&cli.output, program)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    Ok(())
}
