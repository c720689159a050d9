use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// One source unit: the module name (the file stem) and its preprocessed
/// lines, ready for the parser. Comments, blank lines, and surrounding
/// whitespace are already gone.
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub name: String,
    pub lines: Vec<String>,
}

impl SourceModule {
    pub fn from_text(name: &str, text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                line.split("//").next().unwrap_or("").trim().to_owned()
            })
            .filter(|line| !line.is_empty())
            .collect();
        Self {
            name: name.to_owned(),
            lines,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(OsStr::to_str)
            .with_context(|| format!("no module name in path {}", path.display()))?;
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::from_text(name, &text))
    }
}

/// Collect the modules named by `path`: a single source file, or every
/// `.vm` file in a directory (in file-name order, so repeated runs see
/// the modules in the same order).
pub fn load_modules(path: &Path) -> Result<Vec<SourceModule>> {
    if !path.is_dir() {
        return Ok(vec![SourceModule::from_file(path)?]);
    }

    let mut paths: Vec<_> = fs::read_dir(path)
        .with_context(|| format!("reading directory {}", path.display()))?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.extension() == Some(OsStr::new("vm")))
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no .vm files in {}", path.display());
    }

    paths.iter().map(|p| SourceModule::from_file(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_comments_and_blanks() {
        let module = SourceModule::from_text(
            "Main",
            "// header comment\n\npush constant 7   // trailing\n   add\n\t\nreturn\n",
        );

        assert_eq!(module.name, "Main");
        assert_eq!(module.lines, vec!["push constant 7", "add", "return"]);
    }

    #[test]
    fn keeps_lines_without_comments_intact() {
        let module = SourceModule::from_text("Main", "push local 0");
        assert_eq!(module.lines, vec!["push local 0"]);
    }
}
