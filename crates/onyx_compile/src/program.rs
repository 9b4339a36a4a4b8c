//! The program driver: owns the file map, loads and parses units,
//! orchestrates CST → AST → MLIR per file, and keeps partial results
//! queryable when items panic.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use onyx_base::{Panic, SourceMap, UnitId};
use onyx_language::{cst, parser};

use crate::ast::Ast;
use crate::mlir;

/// A loaded source file. Parsing is cached; `unparse` invalidates it.
struct LoadedFile {
    path: PathBuf,
    unit: UnitId,
    parsed: bool,
    cst: Option<cst::Root>,
    /// Import path strings of this file, mapped to module indices.
    import_map: HashMap<String, usize>,
}

/// A compiled module: its MLIR plus where it came from.
#[derive(Debug)]
pub struct CompiledModule {
    pub path: PathBuf,
    pub mlir: mlir::Module,
}

/// The result of compiling a program: one MLIR module per file, plus
/// every panic recovered along the way. Panics do not empty the result;
/// the successfully built parts stay available.
#[derive(Debug)]
pub struct Compilation {
    pub modules: Vec<CompiledModule>,
    pub panics: Vec<Panic>,
}

impl Compilation {
    pub fn is_clean(&self) -> bool {
        self.panics.is_empty()
    }
}

/// A program, starting with an entry source file. Files are loaded
/// transitively through their imports, dependency-first.
#[derive(Default)]
pub struct Program {
    pub source_map: SourceMap,
    files: Vec<LoadedFile>,
    path_index: HashMap<PathBuf, usize>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the program rooted at *entry*: parse every reachable file,
    /// build ASTs dependency-first, then an MLIR module per file.
    pub fn compile(&mut self, entry: &Path) -> Result<Compilation, Panic> {
        let entry = normalize(entry);
        let mut visiting = Vec::new();
        self.load_recursive(entry, &mut visiting)?;

        // Dependency order holds by construction: imports landed in the
        // file list before their importers.
        let mut asts: Vec<Ast> = Vec::new();
        for file in &self.files {
            let cst = file.cst.as_ref().expect("file loaded but not parsed");
            log::info!(target: "program", "compiling {}", file.path.display());
            let ast = Ast::build(file.unit, cst, &file.import_map, &asts);
            asts.push(ast);
        }

        let mut modules = Vec::new();
        let mut panics = Vec::new();

        for (index, file) in self.files.iter().enumerate() {
            let module = mlir::Module::build(&asts, index);
            panics.extend(asts[index].panics.iter().cloned());
            panics.extend(module.panics.iter().cloned());
            modules.push(CompiledModule {
                path: file.path.clone(),
                mlir: module,
            });
        }

        Ok(Compilation { modules, panics })
    }

    /// Whether a file unit has a cached CST.
    pub fn parsed(&self, module: usize) -> bool {
        self.files[module].parsed
    }

    /// Invalidate a file's cached CST. Returns whether it was parsed.
    pub fn unparse(&mut self, module: usize) -> bool {
        let file = &mut self.files[module];
        let was_parsed = file.parsed;
        file.parsed = false;
        file.cst = None;
        was_parsed
    }

    /// (Re-)parse a file unit, refreshing the cached CST.
    pub fn parse_file(&mut self, module: usize) -> Result<(), Panic> {
        let unit = self.files[module].unit;
        let root = parser::parse(&mut self.source_map, unit)?;
        let file = &mut self.files[module];
        file.cst = Some(root);
        file.parsed = true;
        Ok(())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn file_path(&self, module: usize) -> &Path {
        &self.files[module].path
    }

    fn load_recursive(
        &mut self,
        path: PathBuf,
        visiting: &mut Vec<PathBuf>,
    ) -> Result<usize, Panic> {
        if let Some(index) = self.path_index.get(&path) {
            return Ok(*index);
        }

        if visiting.contains(&path) {
            return Err(Panic::new(
                format!("Cyclic import through {}", path.display()),
                None,
            ));
        }
        visiting.push(path.clone());

        let text = fs::read_to_string(&path).map_err(|error| {
            Panic::new(
                format!("Failed to open file at {}: {error}", path.display()),
                None,
            )
        })?;

        let unit = self.source_map.add_file(path.clone(), text);
        let root = parser::parse(&mut self.source_map, unit)?;

        // Imports load depth-first, so dependencies take lower indices.
        let parent_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut import_map = HashMap::new();

        for import_path in import_paths(&root) {
            let resolved = normalize(&parent_dir.join(&import_path));
            let child = self.load_recursive(resolved, visiting)?;
            import_map.insert(import_path, child);
        }

        visiting.pop();

        let index = self.files.len();
        self.files.push(LoadedFile {
            path: path.clone(),
            unit,
            parsed: true,
            cst: Some(root),
            import_map,
        });
        self.path_index.insert(path, index);
        Ok(index)
    }
}

fn import_paths(root: &cst::Root) -> Vec<String> {
    let mut paths = Vec::new();
    for node in &root.children {
        if let cst::Node::Import(import) = node {
            let path = import.path_value().to_string();
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Fold `.` and `..` components lexically, without touching the
/// filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn compiles_a_single_file_program() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(dir.path(), "main.nx", "let x = 42\n");

        let mut program = Program::new();
        let compilation = program.compile(&entry).unwrap();

        assert!(compilation.is_clean(), "{:?}", compilation.panics);
        assert_eq!(compilation.modules.len(), 1);
        let text = compilation.modules[0].mlir.write();
        assert!(text.contains("decl %x : Int8"), "{text}");
    }

    #[test]
    fn imports_load_dependency_first() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "m.nx", "export def A() { 1 }\n");
        let entry = write_file(
            dir.path(),
            "main.nx",
            "import { A as B } from \"./m.nx\"\nlet x = B()\n",
        );

        let mut program = Program::new();
        let compilation = program.compile(&entry).unwrap();

        assert!(compilation.is_clean(), "{:?}", compilation.panics);
        assert_eq!(compilation.modules.len(), 2);
        // The dependency compiled first.
        assert!(compilation.modules[0].path.ends_with("m.nx"));
    }

    #[test]
    fn cyclic_imports_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.nx", "import { b } from \"./b.nx\"\n");
        write_file(dir.path(), "b.nx", "import { a } from \"./a.nx\"\n");
        let entry = dir.path().join("a.nx");

        let mut program = Program::new();
        let error = program.compile(&entry).unwrap_err();
        assert!(error.message.contains("Cyclic import"), "{error}");
    }

    #[test]
    fn missing_file_reports_the_path() {
        let mut program = Program::new();
        let error = program.compile(Path::new("/definitely/not/here.nx")).unwrap_err();
        assert!(error.message.contains("here.nx"), "{error}");
    }

    #[test]
    fn unparse_invalidates_and_reports_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(dir.path(), "main.nx", "let x = 1\n");

        let mut program = Program::new();
        program.compile(&entry).unwrap();

        assert!(program.parsed(0));
        assert!(program.unparse(0));
        assert!(!program.parsed(0));
        // A second unparse reports there was nothing to invalidate.
        assert!(!program.unparse(0));

        program.parse_file(0).unwrap();
        assert!(program.parsed(0));
    }

    #[test]
    fn panics_are_collected_but_partial_results_remain() {
        let dir = tempfile::tempdir().unwrap();
        let entry = write_file(
            dir.path(),
            "main.nx",
            "struct Foo\nstruct Foo\nlet x = 1\n",
        );

        let mut program = Program::new();
        let compilation = program.compile(&entry).unwrap();

        assert_eq!(compilation.panics.len(), 1);
        // The module still carries the main block for the valid items.
        let text = compilation.modules[0].mlir.write();
        assert!(text.contains("decl %x"), "{text}");
    }
}
