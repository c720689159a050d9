use anyhow::{Context, Result};
use log::debug;

pub mod codegen;
pub mod command;
pub mod parser;
pub mod source;

use codegen::Translator;
use parser::Parser;
use source::SourceModule;

/// Translate a whole program: the bootstrap preamble once, then each
/// module's code in input order.
///
/// # Errors
///
/// The first malformed line in any module aborts the run with the module
/// name and line number attached.
pub fn translate_program(modules: &[SourceModule]) -> Result<String> {
    let mut translator = Translator::new();
    let mut program = String::new();

    for module in modules {
        debug!("translating module {}", module.name);
        let mut parser = Parser::new(&module.name);
        let mut commands = Vec::with_capacity(module.lines.len());
        for (line_no, line) in module.lines.iter().enumerate() {
            let command = parser
                .parse_line(line)
                .with_context(|| format!("{}, line {}", module.name, line_no + 1))?;
            commands.push(command);
        }

        let block = translator
            .translate(&commands)
            .with_context(|| format!("generating code for {}", module.name))?;
        program.push_str(&block);
    }

    Ok(program)
}
