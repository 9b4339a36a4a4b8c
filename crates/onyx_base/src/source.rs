use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::location::Location;
use crate::placement::Placement;
use crate::position::Position;

/// An index into the program-wide [`SourceMap`]. Placements carry unit ids
/// instead of references, so they stay `Copy` and never entangle lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(u32);

impl UnitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compilation unit containing source code to be lexed and parsed.
#[derive(Debug, Clone)]
pub enum Unit {
    /// A physical source file owning its text.
    File { path: PathBuf, text: Rc<str> },

    /// A virtual block of code contained in some other unit, e.g. the C
    /// body of an `extern` directive. It shares the parent's text; parsing
    /// it leaves the shared cursor immediately after the block.
    Block {
        parent: UnitId,
        /// Where the block sits within the parent unit. The end is filled
        /// in once the embedded parser has consumed the block.
        location: Location,
        /// Byte offset of the block start within the parent text.
        byte_start: usize,
        /// Byte offset one past the block end, once known.
        byte_end: Option<usize>,
    },
}

/// Owns every unit of a program. Units are appended, never removed.
#[derive(Debug, Default)]
pub struct SourceMap {
    units: Vec<Unit>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>, text: impl Into<Rc<str>>) -> UnitId {
        self.units.push(Unit::File {
            path: path.into(),
            text: text.into(),
        });
        UnitId(self.units.len() as u32 - 1)
    }

    /// Register a virtual block at a known start within *parent*. The end
    /// is reported later via [`SourceMap::close_block`].
    pub fn add_block(&mut self, parent: UnitId, start: Position, byte_start: usize) -> UnitId {
        self.units.push(Unit::Block {
            parent,
            location: Location::point(start),
            byte_start,
            byte_end: None,
        });
        UnitId(self.units.len() as u32 - 1)
    }

    /// Close a block at its block-relative end position and absolute byte
    /// end. The stored location end composes into the parent frame.
    pub fn close_block(&mut self, id: UnitId, relative_end: Position, byte_end: usize) {
        match &mut self.units[id.index()] {
            Unit::Block {
                location,
                byte_end: slot,
                ..
            } => {
                *location = Location::new(location.start, location.start.offset(relative_end));
                *slot = Some(byte_end);
            }
            Unit::File { .. } => unreachable!("close_block on a file unit"),
        }
    }

    pub fn unit(&self, id: UnitId) -> &Unit {
        &self.units[id.index()]
    }

    /// The full text of the unit's underlying stream. For a block unit this
    /// is the *parent's* text: block and parent share one stream, and block
    /// lexers start at the block's byte offset within it.
    pub fn stream_text(&self, id: UnitId) -> Rc<str> {
        match &self.units[id.index()] {
            Unit::File { text, .. } => Rc::clone(text),
            Unit::Block { parent, .. } => self.stream_text(*parent),
        }
    }

    /// Byte offset at which the unit's own content begins in its stream.
    pub fn stream_start(&self, id: UnitId) -> usize {
        match &self.units[id.index()] {
            Unit::File { .. } => 0,
            Unit::Block { byte_start, .. } => *byte_start,
        }
    }

    /// A human-readable unit name for diagnostics.
    pub fn name(&self, id: UnitId) -> String {
        match &self.units[id.index()] {
            Unit::File { path, .. } => path.display().to_string(),
            Unit::Block { parent, .. } => format!("{}:<extern>", self.name(*parent)),
        }
    }

    pub fn file_path(&self, id: UnitId) -> Option<&Path> {
        match &self.units[id.index()] {
            Unit::File { path, .. } => Some(path),
            Unit::Block { .. } => None,
        }
    }

    /// Resolve the chain of placements containing *placement*, outermost
    /// first. A placement in a virtual block resolves to
    /// `[file-level placement, block-level placement]`.
    pub fn path(&self, placement: Placement) -> Vec<Placement> {
        let mut chain = vec![placement];
        let mut unit = placement.unit;

        while let Unit::Block {
            parent, location, ..
        } = &self.units[unit.index()]
        {
            chain.push(Placement::new(*parent, *location));
            unit = *parent;
        }

        chain.reverse();
        chain
    }

    /// Resolve a unit-relative position to the absolute position within
    /// the unit's stream. Block positions are relative to the block start.
    pub fn absolute_position(&self, id: UnitId, position: Position) -> Position {
        match &self.units[id.index()] {
            Unit::File { .. } => position,
            Unit::Block {
                parent, location, ..
            } => self.absolute_position(*parent, location.start.offset(position)),
        }
    }

    /// Map a unit-relative position to a byte offset within the unit's
    /// stream text.
    pub fn byte_of(&self, id: UnitId, position: Position) -> usize {
        let text = self.stream_text(id);
        position_to_byte(&text, self.absolute_position(id, position))
    }

    /// Fetch a source line (without trailing newline) of the unit's stream.
    pub fn line(&self, id: UnitId, row: u32) -> &str {
        // Safe: the Rc text lives as long as self; reborrow through units.
        let text: &str = match &self.units[id.index()] {
            Unit::File { text, .. } => text,
            Unit::Block { parent, .. } => {
                return self.line(*parent, row);
            }
        };
        text.lines().nth(row as usize).unwrap_or("")
    }
}

fn position_to_byte(text: &str, position: Position) -> usize {
    let mut row = 0u32;
    let mut col = 0u32;

    for (byte, ch) in text.char_indices() {
        if row == position.row && col == position.col {
            return byte;
        }

        if ch == '\n' {
            row += 1;
            col = 0;
        } else {
            col += 1;
        }
    }

    text.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_unit_owns_its_text() {
        let mut map = SourceMap::new();
        let id = map.add_file("main.nx", "let x = 1\n");
        assert_eq!(&*map.stream_text(id), "let x = 1\n");
        assert_eq!(map.stream_start(id), 0);
        assert_eq!(map.name(id), "main.nx");
    }

    #[test]
    fn block_unit_shares_parent_stream() {
        let mut map = SourceMap::new();
        let text = "extern int puts(char *s);\nlet x = 1\n";
        let file = map.add_file("main.nx", text);
        let block = map.add_block(file, Position::new(0, 6), 6);
        assert_eq!(&*map.stream_text(block), text);
        assert_eq!(map.stream_start(block), 6);
    }

    #[test]
    fn placement_path_resolves_block_chain() {
        let mut map = SourceMap::new();
        let file = map.add_file("main.nx", "extern foo\n");
        let block = map.add_block(file, Position::new(0, 6), 6);
        map.close_block(block, Position::new(0, 10), 10);

        let inner = Placement::new(
            block,
            Location::new(Position::new(0, 0), Position::new(0, 3)),
        );
        let path = map.path(inner);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].unit, file);
        assert_eq!(path[0].location.start, Position::new(0, 6));
        assert_eq!(path[1].unit, block);
    }

    #[test]
    fn byte_of_counts_codepoints_not_bytes() {
        let mut map = SourceMap::new();
        let id = map.add_file("u.nx", "aβc\ndef\n");
        // 'c' is the third codepoint but sits at byte 3 (β is 2 bytes).
        assert_eq!(map.byte_of(id, Position::new(0, 2)), 3);
        assert_eq!(map.byte_of(id, Position::new(1, 0)), 5);
    }

    #[test]
    fn line_fetches_row() {
        let mut map = SourceMap::new();
        let id = map.add_file("l.nx", "first\nsecond\n");
        assert_eq!(map.line(id, 1), "second");
    }
}
