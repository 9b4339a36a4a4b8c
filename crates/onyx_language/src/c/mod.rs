//! The embedded-C sub-pipeline: a restricted prototype grammar lexed and
//! parsed out of `extern` blocks, over the same byte stream as the
//! containing Onyx unit.

pub mod cst;
pub mod lexer;
pub mod parser;
pub mod token;

use onyx_base::{Panic, Position, SourceMap, UnitId};

/// Parse a virtual C block starting at `(byte_start, start)` within
/// *parent*. Registers the block unit, runs the C parser and closes the
/// block at the exact stream state the parser stopped at, so the caller
/// can resync its own lexer without re-reading or skipping a byte.
///
/// In single-expression mode exactly one prototype is consumed; otherwise
/// parsing continues until the stream ends (EOF or a `}` at the top
/// level, which stays unconsumed).
pub fn parse_block(
    map: &mut SourceMap,
    parent: UnitId,
    start: Position,
    byte_start: usize,
    single_expression: bool,
) -> Result<(UnitId, cst::Root), Panic> {
    let unit = map.add_block(parent, start, byte_start);

    let lexer = lexer::Lexer::new(map, unit);
    let mut parser = parser::Parser::new(lexer);
    let root = parser.parse(single_expression)?;

    let (byte_end, relative_end) = parser.cursor_state();
    map.close_block(unit, relative_end, byte_end);

    Ok((unit, root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_parse_leaves_stream_after_the_prototype() {
        let mut map = SourceMap::new();
        let text = "extern int puts(char *s);\nlet x = 1\n";
        let parent = map.add_file("m.nx", text);

        // The block begins right after the `extern` keyword.
        let (unit, root) =
            parse_block(&mut map, parent, Position::new(0, 6), 6, true).unwrap();

        assert_eq!(root.protos.len(), 1);
        assert_eq!(root.protos[0].name_value(), "puts");

        // The block must end exactly after the semicolon.
        let semi = text.find(';').unwrap();
        match map.unit(unit) {
            onyx_base::Unit::Block { byte_end, .. } => {
                assert_eq!(*byte_end, Some(semi + 1));
            }
            _ => panic!("expected a block unit"),
        }
    }

    #[test]
    fn braced_block_stops_before_closing_brace() {
        let mut map = SourceMap::new();
        let text = "int puts(char *s);\nint getchar();\n} rest";
        let parent = map.add_file("m.nx", text);

        let (_, root) = parse_block(&mut map, parent, Position::default(), 0, false).unwrap();
        assert_eq!(root.protos.len(), 2);
    }
}
