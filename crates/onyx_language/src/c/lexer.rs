use onyx_base::{Location, Panic, Placement, Position, SourceMap, UnitId};

use crate::cursor::Cursor;

use super::token::{is_op_char, Token, TokenKind};

/// The C lexer: one token per pull, block-relative positions, shared
/// stream. A `}` at the top level ends the stream without being consumed,
/// which is how a braced `extern` body returns control to the Onyx side.
/// Like the Onyx lexer it stores its first panic and then yields
/// end-of-stream.
pub struct Lexer {
    unit: UnitId,
    cursor: Cursor,
    token_start: Position,
    panic: Option<Panic>,
    finished: bool,
}

impl Lexer {
    pub fn new(map: &SourceMap, unit: UnitId) -> Self {
        let text = map.stream_text(unit);
        let byte = map.stream_start(unit);
        Self {
            unit,
            cursor: Cursor::new(text, byte, Position::default()),
            token_start: Position::default(),
            panic: None,
            finished: false,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    pub fn panic(&self) -> Option<&Panic> {
        self.panic.as_ref()
    }

    /// The first unconsumed (byte, block-relative position) pair.
    pub fn cursor_state(&self) -> (usize, Position) {
        (self.cursor.byte(), self.cursor.pos())
    }

    /// The next unconsumed raw codepoint, unlexed.
    pub fn peek_char(&self) -> Option<char> {
        self.cursor.peek()
    }

    fn placement(&self) -> Placement {
        Placement::new(
            self.unit,
            Location::new(self.token_start, self.cursor.pos()),
        )
    }

    fn lex_token(&mut self) -> Result<Option<TokenKind>, Panic> {
        let Some(first) = self.cursor.peek() else {
            return Ok(None);
        };

        // The closing brace of a braced `extern` body belongs to the Onyx
        // side; stop in front of it.
        if first == '}' {
            return Ok(None);
        }

        if first == '\n' {
            while self.cursor.peek() == Some('\n') {
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Newline));
        }

        if first == ' ' || first == '\t' {
            while matches!(self.cursor.peek(), Some(' ') | Some('\t')) {
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Space));
        }

        if first.is_ascii_alphabetic() || first == '_' {
            return Ok(Some(TokenKind::Id(self.lex_id())));
        }

        if first == '.' {
            // The only dotted token is the `...` varg.
            for _ in 0..3 {
                if self.cursor.peek() != Some('.') {
                    return Err(Panic::new(
                        "Expected `...`",
                        Some(Placement::point(self.unit, self.cursor.pos())),
                    ));
                }
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Varg));
        }

        if is_op_char(first) {
            self.cursor.bump();
            return Ok(Some(TokenKind::Op(first)));
        }

        let kind = match first {
            ',' => Some(TokenKind::Comma),
            ';' => Some(TokenKind::Semi),
            '(' => Some(TokenKind::ParenOpen),
            ')' => Some(TokenKind::ParenClose),
            _ => None,
        };

        if let Some(kind) = kind {
            self.cursor.bump();
            return Ok(Some(kind));
        }

        Err(Panic::new(
            format!("Unexpected character `{first}` in C code"),
            Some(Placement::point(self.unit, self.cursor.pos())),
        ))
    }

    /// Lex an identifier. Type-qualifier words merge with the word that
    /// follows, so `unsigned int` and `const char` normalize into single
    /// identifiers with one interior space.
    fn lex_id(&mut self) -> String {
        let mut id = self.lex_word();

        while qualifier_tail(&id) {
            let mark = self.cursor.clone();

            let mut spaces = 0;
            while matches!(self.cursor.peek(), Some(' ') | Some('\t')) {
                self.cursor.bump();
                spaces += 1;
            }

            if spaces > 0 && self.cursor.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                let next = self.lex_word();
                id.push(' ');
                id.push_str(&next);
            } else {
                self.cursor = mark;
                break;
            }
        }

        id
    }

    fn lex_word(&mut self) -> String {
        let mut word = String::new();
        while self
            .cursor
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            word.push(self.cursor.bump().unwrap());
        }
        word
    }
}

fn is_qualifier(word: &str) -> bool {
    matches!(
        word,
        "unsigned" | "signed" | "const" | "struct" | "union" | "enum" | "short" | "long"
    )
}

/// `unsigned long`, `const unsigned` and friends keep absorbing words.
fn qualifier_tail(id: &str) -> bool {
    match id.rsplit(' ').next() {
        Some(last) => is_qualifier(last),
        None => false,
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, Panic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.token_start = self.cursor.pos();

        match self.lex_token() {
            Ok(Some(kind)) => {
                let token = Token {
                    kind,
                    placement: self.placement(),
                };
                log::trace!(target: "c/lexer", "yield {}", token.kind.name());
                Some(Ok(token))
            }
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(panic) => {
                self.finished = true;
                self.panic = Some(panic.clone());
                Some(Err(panic))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut map = SourceMap::new();
        let unit = map.add_file("c.h", source);
        Lexer::new(&map, unit)
            .collect::<Result<Vec<_>, _>>()
            .expect("lexing failed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_a_prototype() {
        assert_eq!(
            kinds("int puts(char *s);"),
            vec![
                TokenKind::Id("int".into()),
                TokenKind::Space,
                TokenKind::Id("puts".into()),
                TokenKind::ParenOpen,
                TokenKind::Id("char".into()),
                TokenKind::Space,
                TokenKind::Op('*'),
                TokenKind::Id("s".into()),
                TokenKind::ParenClose,
                TokenKind::Semi,
            ]
        );
    }

    #[test]
    fn multiword_ids_normalize() {
        assert_eq!(
            kinds("unsigned   int"),
            vec![TokenKind::Id("unsigned int".into())]
        );
        assert_eq!(
            kinds("const char c"),
            vec![
                TokenKind::Id("const char".into()),
                TokenKind::Space,
                TokenKind::Id("c".into()),
            ]
        );
    }

    #[test]
    fn varg_lexes_as_one_token() {
        assert_eq!(
            kinds(", ...)"),
            vec![
                TokenKind::Comma,
                TokenKind::Space,
                TokenKind::Varg,
                TokenKind::ParenClose,
            ]
        );
    }

    #[test]
    fn stops_in_front_of_closing_brace() {
        assert_eq!(kinds("int x; } ignored"), {
            vec![
                TokenKind::Id("int".into()),
                TokenKind::Space,
                TokenKind::Id("x".into()),
                TokenKind::Semi,
                TokenKind::Space,
            ]
        });
    }

    #[test]
    fn unknown_character_panics_once() {
        let mut map = SourceMap::new();
        let unit = map.add_file("c.h", "int @");
        let mut lexer = Lexer::new(&map, unit);
        let mut errs = 0;
        for item in lexer.by_ref() {
            if item.is_err() {
                errs += 1;
            }
        }
        assert_eq!(errs, 1);
        assert!(lexer.panic().is_some());
    }
}
