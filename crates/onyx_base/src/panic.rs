use std::fmt;

use crate::placement::Placement;
use crate::source::SourceMap;
use crate::style::Style;

/// Stable, user-visible panic identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicId {
    DeclarationCategoryMismatch,
    UndeclaredReference,
    AlreadyDeclared,
    UnexpectedEof,
    AmbiguousImplementation,
}

impl PanicId {
    pub fn code(self) -> &'static str {
        match self {
            PanicId::DeclarationCategoryMismatch => "P0001",
            PanicId::UndeclaredReference => "P0002",
            PanicId::AlreadyDeclared => "P0003",
            PanicId::UnexpectedEof => "P0004",
            PanicId::AmbiguousImplementation => "P0005",
        }
    }
}

/// A note attached to a panic, pointing at related source code.
#[derive(Debug, Clone)]
pub struct Note {
    pub message: String,
    pub placement: Option<Placement>,
}

/// The compiler panics when a program is ill-formed. A panic is a
/// recoverable diagnostic: the offending top-level item is skipped and
/// compilation continues where sensible.
#[derive(Debug, Clone)]
pub struct Panic {
    pub id: Option<PanicId>,
    pub message: String,
    pub placement: Option<Placement>,
    pub notes: Vec<Note>,
}

impl Panic {
    pub fn new(message: impl Into<String>, placement: Option<Placement>) -> Self {
        Self {
            id: None,
            message: message.into(),
            placement,
            notes: Vec::new(),
        }
    }

    pub fn with_id(
        id: PanicId,
        message: impl Into<String>,
        placement: Option<Placement>,
    ) -> Self {
        Self {
            id: Some(id),
            message: message.into(),
            placement,
            notes: Vec::new(),
        }
    }

    pub fn note(mut self, message: impl Into<String>, placement: Option<Placement>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            placement,
        });
        self
    }

    /// Render the panic for the end user: one header line, a caret-annotated
    /// excerpt per placement, one bullet per note. No stack traces.
    pub fn render(&self, map: &SourceMap) -> String {
        let mut out = String::new();

        let label = match self.id {
            Some(id) => format!("error[{}]", id.code()),
            None => "error".to_string(),
        };
        out.push_str(&format!("{}: {}", Style::error_label(&label), self.message));

        if let Some(placement) = self.placement {
            out.push('\n');
            out.push_str(&render_excerpt(map, placement));
        }

        for note in &self.notes {
            out.push_str(&format!(
                "\n  {} {}",
                Style::note_label("note:"),
                note.message
            ));
            if let Some(placement) = note.placement {
                out.push('\n');
                out.push_str(&render_excerpt(map, placement));
            }
        }

        out
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "[{}] {}", id.code(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn render_excerpt(map: &SourceMap, placement: Placement) -> String {
    let start = map.absolute_position(placement.unit, placement.location.start);
    let end = placement
        .location
        .end
        .map(|end| map.absolute_position(placement.unit, end))
        .unwrap_or(start);

    let line = map.line(placement.unit, start.row);
    let caret_len = if end.row == start.row {
        (end.col.saturating_sub(start.col)).max(1) as usize
    } else {
        line.chars().count().saturating_sub(start.col as usize).max(1)
    };
    let underline = format!(
        "{}{}",
        " ".repeat(start.col as usize),
        "^".repeat(caret_len)
    );

    let gutter = Style::gutter(&format!("{:4}", start.row + 1));
    let pipe = Style::gutter("|");

    format!(
        "  --> {}\n{} {} {}\n     {} {}",
        placement.describe(map),
        gutter,
        pipe,
        line,
        pipe,
        Style::caret(&underline)
    )
}

/// Reports a compiler code path that remains unwritten. Unlike a panic it
/// does not mean the program is ill-formed; it names the Rust source
/// location of the missing branch and exits with a distinct code.
#[derive(Debug, Clone)]
pub struct Unimplemented {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl Unimplemented {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            message: message.into(),
            file: caller.file(),
            line: caller.line(),
            column: caller.column(),
        }
    }
}

impl fmt::Display for Unimplemented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unimplemented: {} (at {}:{}:{})",
            self.message, self.file, self.line, self.column
        )
    }
}

/// A failure reported by an external linker process.
#[derive(Debug, Clone)]
pub struct LinkerFailure {
    pub output: String,
}

impl fmt::Display for LinkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "linker failed:\n{}", self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;
    use crate::position::Position;

    fn sample_map() -> (SourceMap, crate::source::UnitId) {
        let mut map = SourceMap::new();
        let unit = map.add_file("m.nx", "decl struct Foo\ndef builtin Foo\n");
        (map, unit)
    }

    #[test]
    fn render_includes_code_and_carets() {
        let (map, unit) = sample_map();
        let panic = Panic::with_id(
            PanicId::DeclarationCategoryMismatch,
            "already declared `Foo` as struct",
            Some(Placement::new(
                unit,
                Location::new(Position::new(1, 4), Position::new(1, 11)),
            )),
        )
        .note(
            "previously declared here",
            Some(Placement::new(
                unit,
                Location::new(Position::new(0, 5), Position::new(0, 11)),
            )),
        );

        let rendered = panic.render(&map);
        assert!(rendered.contains("P0001"), "{rendered}");
        assert!(rendered.contains("^^^^^^^"), "{rendered}");
        assert!(rendered.contains("note:"), "{rendered}");
        assert!(rendered.contains("m.nx:2:5"), "{rendered}");
    }

    #[test]
    fn point_placement_gets_single_caret() {
        let (map, unit) = sample_map();
        let panic = Panic::new(
            "unexpected token",
            Some(Placement::point(unit, Position::new(0, 5))),
        );
        let rendered = panic.render(&map);
        assert!(rendered.contains("     ^"), "{rendered}");
    }

    #[test]
    fn unimplemented_records_rust_location() {
        let report = Unimplemented::new("native dispatch");
        assert!(report.file.ends_with("panic.rs"));
        assert!(report.line > 0);
        assert!(report.to_string().contains("native dispatch"));
    }

    #[test]
    fn panic_display_carries_code() {
        let panic = Panic::with_id(PanicId::UnexpectedEof, "unexpected EOF", None);
        assert_eq!(panic.to_string(), "[P0004] unexpected EOF");
    }
}
