//! On-disk artifact emission. A multi-module program emits either one
//! file per module (when the output is a directory) or a single
//! `0x1C`-separated amalgamation — the file separator makes the archive
//! unambiguously re-splittable, since it can not appear in source text.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use onyx_compile::program::Compilation;

/// The ASCII file separator dividing modules in an amalgamation.
pub const SEPARATOR: char = '\u{1C}';

pub enum Output {
    Path(PathBuf),
    Stdout,
    Disabled,
}

/// Join module texts into a single re-splittable archive.
pub fn amalgamate(texts: &[String]) -> String {
    let mut out = String::new();
    for (i, text) in texts.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        out.push_str(text);
    }
    out
}

/// Split an amalgamation back into module texts.
pub fn split(archive: &str) -> Vec<&str> {
    archive.split(SEPARATOR).collect()
}

/// Write a compilation's MLIR per the output mode.
pub fn emit_mlir(compilation: &Compilation, output: Output) -> io::Result<()> {
    let texts: Vec<String> = compilation
        .modules
        .iter()
        .map(|module| module.mlir.write())
        .collect();

    match output {
        Output::Disabled => Ok(()),

        Output::Stdout => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(amalgamate(&texts).as_bytes())
        }

        Output::Path(path) => {
            if path.is_dir() {
                // One file per module, named after the source file.
                for (module, text) in compilation.modules.iter().zip(&texts) {
                    let stem = module
                        .path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "module".to_string());
                    fs::write(path.join(format!("{stem}.mlir")), text)?;
                }
                Ok(())
            } else {
                fs::write(path, amalgamate(&texts))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amalgamation_round_trips() {
        let texts = vec![
            "main {\n}\n".to_string(),
            "def @f() : void {\n}\nmain {\n}\n".to_string(),
        ];
        let archive = amalgamate(&texts);
        let parts = split(&archive);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], texts[0]);
        assert_eq!(parts[1], texts[1]);
    }

    #[test]
    fn single_module_has_no_separator() {
        let texts = vec!["main {\n}\n".to_string()];
        let archive = amalgamate(&texts);
        assert!(!archive.contains(SEPARATOR));
    }

    #[test]
    fn separator_never_occurs_in_source_text() {
        // The file separator is a control character no lexer token can
        // carry, which is what makes the archive re-splittable.
        assert!(SEPARATOR.is_control());
    }
}
