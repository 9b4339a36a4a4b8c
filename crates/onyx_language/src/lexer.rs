use onyx_base::{Location, Panic, PanicId, Placement, Position, SourceMap, UnitId};

use crate::cursor::Cursor;
use crate::token::{
    Id, IdKind, IdLiteral, Keyword, LiteralKind, PointerStorage, PointerSuffix, Punct, Token,
    TokenKind,
};

/// The Onyx lexer: a pull iterator yielding one token per step, in strict
/// source order.
///
/// Contracts:
///   * the cursor advances on every emitted token, so after yielding token
///     N the cursor sits on the first byte no token 0..=N covers;
///   * the first panic is stored on the lexer and the stream ends — a
///     panic is never thrown "into" the consumer beyond the one `Err`;
///   * [`Lexer::cursor_state`] and [`Lexer::resync`] let the parser hand
///     the underlying stream to the C lexer on `extern` and pick it back
///     up exactly where the C parser stopped.
pub struct Lexer {
    unit: UnitId,
    cursor: Cursor,
    token_start: Position,
    token_start_byte: usize,
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
            token_start_byte: byte,
            panic: None,
            finished: false,
        }
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// The stored panic, if lexing has failed.
    pub fn panic(&self) -> Option<&Panic> {
        self.panic.as_ref()
    }

    /// The first unconsumed (byte, position) pair of the stream.
    pub fn cursor_state(&self) -> (usize, Position) {
        (self.cursor.byte(), self.cursor.pos())
    }

    /// Jump the stream to an explicit state. The parser calls this after
    /// the C parser has consumed an `extern` block from the shared stream,
    /// so no byte is read twice or skipped.
    pub fn resync(&mut self, byte: usize, pos: Position) {
        self.cursor.jump(byte, pos);
        self.finished = false;
    }

    fn placement(&self) -> Placement {
        Placement::new(
            self.unit,
            Location::new(self.token_start, self.cursor.pos()),
        )
    }

    fn token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            placement: self.placement(),
        }
    }

    fn unexpected(&self, expected: &str) -> Panic {
        Panic::new(
            format!("Unexpected input, expected {expected}"),
            Some(Placement::point(self.unit, self.cursor.pos())),
        )
    }

    fn unexpected_eof(&self) -> Panic {
        Panic::with_id(
            PanicId::UnexpectedEof,
            "Unexpected EOF",
            Some(Placement::point(self.unit, self.cursor.pos())),
        )
    }

    fn lex_token(&mut self) -> Result<Option<TokenKind>, Panic> {
        let Some(first) = self.cursor.peek() else {
            return Ok(None);
        };

        // Newlines; a whole run lexes into a single token, whose placement
        // spanning more than one row marks a blank line for the CST.
        if first == '\n' {
            while self.cursor.peek() == Some('\n') {
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Punct(Punct::Newline)));
        }

        // Horizontal space.
        if is_space(first) {
            while self.cursor.peek().is_some_and(is_space) {
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Punct(Punct::Space)));
        }

        // A comment reaches the end of the line, newline excluded.
        if first == '#' {
            self.cursor.bump();
            let mut value = String::new();
            while let Some(c) = self.cursor.peek() {
                if c == '\n' {
                    break;
                }
                value.push(c);
                self.cursor.bump();
            }
            return Ok(Some(TokenKind::Comment(value)));
        }

        // Either a keyword or an unwrapped identifier.
        if is_id_start(first) {
            let word = self.lex_word();
            return Ok(Some(self.classify_word(word, false)));
        }

        // A wrapped identifier, e.g. `` `фу` ``.
        if first == '`' {
            let value = self.lex_wrapped(|_| true)?;
            return Ok(Some(self.classify_word(value, true)));
        }

        // A string literal.
        if first == '"' {
            self.cursor.bump();
            let value = self.lex_string('"')?;
            return Ok(Some(TokenKind::Str(value)));
        }

        // An integer literal; a sign would lex as an unop.
        if first.is_ascii_digit() {
            return Ok(Some(TokenKind::Int(self.lex_int()?)));
        }

        // A C entity: `$foo`, `` $`unsigned int` `` or `$"str"`.
        if first == '$' {
            self.cursor.bump();
            return Ok(Some(self.lex_c_entity()?));
        }

        // An intrinsic identifier, e.g. `@foo`.
        if first == '@' {
            self.cursor.bump();
            if !self.cursor.peek().is_some_and(is_id_start) {
                return Err(self.unexpected("an intrinsic identifier"));
            }
            let word = self.lex_word();
            return Ok(Some(TokenKind::Id(Id {
                kind: IdKind::Intrinsic,
                wrapped: false,
                value: word,
                pointer_suffixes: Vec::new(),
            })));
        }

        // A literal restriction, e.g. `\Bool`.
        if first == '\\' {
            self.cursor.bump();
            if !self.cursor.peek().is_some_and(is_id_start) {
                return Err(self.unexpected("a literal kind such as \\Bool"));
            }
            let word = self.lex_word();
            return match LiteralKind::parse(&word) {
                Some(kind) => Ok(Some(TokenKind::LiteralKind(kind))),
                None => Err(Panic::new(
                    format!("Unknown literal kind `\\{word}`"),
                    Some(self.placement()),
                )),
            };
        }

        // `::` is the only multi-codepoint punctuation; a `:` glued to an
        // identifier begins a symbol, a freestanding `:` is a plain colon.
        if first == ':' {
            self.cursor.bump();
            if self.cursor.peek() == Some(':') {
                self.cursor.bump();
                return Ok(Some(TokenKind::Punct(Punct::ScopeStatic)));
            }
            if self.cursor.peek().is_some_and(is_id_start) {
                let word = self.lex_word();
                return Ok(Some(TokenKind::Id(Id {
                    kind: IdKind::Symbol,
                    wrapped: false,
                    value: word,
                    pointer_suffixes: Vec::new(),
                })));
            }
            return Ok(Some(TokenKind::Punct(Punct::Colon)));
        }

        // Operators, including the Unicode Mathematical Operators block.
        // Single angles and arrows re-classify as punctuation.
        if is_op_char(first) {
            let mut op = String::new();
            while self.cursor.peek().is_some_and(is_op_char) {
                op.push(self.cursor.bump().unwrap());
            }

            let kind = match op.as_str() {
                "<" => TokenKind::Punct(Punct::AngleOpen),
                ">" => TokenKind::Punct(Punct::AngleClose),
                "->" => TokenKind::Punct(Punct::ArrowFunction),
                "=>" => TokenKind::Punct(Punct::ArrowGenerator),
                "~>" => TokenKind::Punct(Punct::ArrowLambda),
                _ => TokenKind::Op(op),
            };
            return Ok(Some(kind));
        }

        let punct = match first {
            ',' => Some(Punct::Comma),
            ';' => Some(Punct::Semi),
            '(' => Some(Punct::ParenOpen),
            ')' => Some(Punct::ParenClose),
            '{' => Some(Punct::BraceOpen),
            '}' => Some(Punct::BraceClose),
            '[' => Some(Punct::SquareOpen),
            ']' => Some(Punct::SquareClose),
            '.' => Some(Punct::ScopeInstance),
            _ => None,
        };

        if let Some(punct) = punct {
            self.cursor.bump();
            return Ok(Some(TokenKind::Punct(punct)));
        }

        Err(self.unexpected("a token"))
    }

    /// Lex an identifier-ish word. `!` and `?` may join a word, which is
    /// how `unsafe!` lexes as one keyword.
    fn lex_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.cursor.peek() {
            if is_id_continue(c) || c == '!' || c == '?' {
                word.push(c);
                self.cursor.bump();
            } else {
                break;
            }
        }
        word
    }

    /// Classify a lexed word into a keyword, bool, label or identifier.
    fn classify_word(&mut self, word: String, wrapped: bool) -> TokenKind {
        if !wrapped {
            if let Some(keyword) = Keyword::parse(&word) {
                return TokenKind::Keyword(keyword);
            }

            if word == "true" {
                return TokenKind::Bool(true);
            }
            if word == "false" {
                return TokenKind::Bool(false);
            }
        }

        // An adjacent single colon makes it a label, e.g. `foo:`.
        if self.cursor.peek() == Some(':') && self.cursor.peek_second() != Some(':') {
            self.cursor.bump();
            return TokenKind::Id(Id {
                kind: IdKind::Label,
                wrapped,
                value: word,
                pointer_suffixes: Vec::new(),
            });
        }

        // Wrapping turns a literal into a plain identifier.
        let kind = if wrapped {
            IdKind::Simple
        } else {
            match IdLiteral::parse(&word) {
                Some(literal) => IdKind::Literal(literal),
                None => IdKind::Simple,
            }
        };

        TokenKind::Id(Id {
            kind,
            wrapped,
            value: word,
            pointer_suffixes: Vec::new(),
        })
    }

    /// Lex the contents of a backtick-wrapped identifier.
    fn lex_wrapped(&mut self, accept: impl Fn(char) -> bool) -> Result<String, Panic> {
        self.cursor.bump(); // The opening backtick
        let mut value = String::new();

        loop {
            match self.cursor.peek() {
                Some('`') => {
                    self.cursor.bump();
                    return Ok(value);
                }
                Some(c) if accept(c) => {
                    value.push(c);
                    self.cursor.bump();
                }
                Some(_) => return Err(self.unexpected("a wrapped identifier codepoint")),
                None => return Err(self.unexpected_eof()),
            }
        }
    }

    fn lex_string(&mut self, terminator: char) -> Result<String, Panic> {
        let mut value = String::new();
        let mut escaped = false;

        loop {
            match self.cursor.peek() {
                Some(c) if c == terminator && !escaped => {
                    self.cursor.bump();
                    return Ok(value);
                }
                Some(c) => {
                    escaped = c == '\\' && !escaped;
                    value.push(c);
                    self.cursor.bump();
                }
                None => return Err(self.unexpected_eof()),
            }
        }
    }

    fn lex_int(&mut self) -> Result<u64, Panic> {
        let mut digits = String::new();
        while self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            digits.push(self.cursor.bump().unwrap());
        }

        digits
            .parse()
            .map_err(|_| Panic::new("Integer literal too large", Some(self.placement())))
    }

    /// Lex what follows a consumed `$` sigil.
    fn lex_c_entity(&mut self) -> Result<TokenKind, Panic> {
        match self.cursor.peek() {
            // A wrapped C id may contain spaces, e.g. `` $`unsigned int` ``;
            // interior space runs normalize to single spaces.
            Some('`') => {
                let raw = self.lex_wrapped(|c| is_c_id_char(c) || is_space(c))?;
                let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                Ok(TokenKind::Id(Id {
                    kind: IdKind::C,
                    wrapped: true,
                    value,
                    pointer_suffixes: self.lex_pointer_suffixes(),
                }))
            }

            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let mut value = String::new();
                while self.cursor.peek().is_some_and(is_c_id_char) {
                    value.push(self.cursor.bump().unwrap());
                }
                Ok(TokenKind::Id(Id {
                    kind: IdKind::C,
                    wrapped: false,
                    value,
                    pointer_suffixes: self.lex_pointer_suffixes(),
                }))
            }

            // A C string literal, e.g. `$"hi"`.
            Some('"') => {
                self.cursor.bump();
                Ok(TokenKind::CStr(self.lex_string('"')?))
            }

            _ => Err(self.unexpected("a C identifier or string literal")),
        }
    }

    /// Lex pointer suffixes directly following a C id, e.g. `$char*` or
    /// `$char**s`. A suffix letter only counts when nothing identifier-like
    /// follows it, so `$a* b` and `$a*s` both lex as intended.
    fn lex_pointer_suffixes(&mut self) -> Vec<PointerSuffix> {
        let mut depth: u16 = 0;
        while self.cursor.peek() == Some('*') {
            depth += 1;
            self.cursor.bump();
        }

        if depth == 0 {
            return Vec::new();
        }

        let mut suffix = PointerSuffix {
            depth,
            storage: None,
            writeable: None,
        };

        let followed_by_id = |second: Option<char>| second.is_some_and(is_id_continue);

        if let Some(c) = self.cursor.peek() {
            let storage = match c {
                'u' => Some(PointerStorage::Undefined),
                'l' => Some(PointerStorage::Local),
                'i' => Some(PointerStorage::Instance),
                's' => Some(PointerStorage::Static),
                _ => None,
            };
            if storage.is_some() && !followed_by_id(self.cursor.peek_second()) {
                suffix.storage = storage;
                self.cursor.bump();
            }
        }

        if let Some(c) = self.cursor.peek() {
            if (c == 'w' || c == 'W') && !followed_by_id(self.cursor.peek_second()) {
                suffix.writeable = Some(c == 'w');
                self.cursor.bump();
            }
        }

        vec![suffix]
    }
}

impl Iterator for Lexer {
    type Item = Result<Token, Panic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        self.token_start = self.cursor.pos();
        self.token_start_byte = self.cursor.byte();

        match self.lex_token() {
            Ok(Some(kind)) => {
                let token = self.token(kind);
                log::trace!(target: "onyx/lexer", "yield {}", token.kind.name());
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

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\u{b}'
}

fn is_greek(c: char) -> bool {
    ('\u{0391}'..='\u{03C9}').contains(&c)
}

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || is_greek(c)
}

fn is_id_continue(c: char) -> bool {
    is_id_start(c) || c.is_ascii_digit()
}

fn is_c_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_op_char(c: char) -> bool {
    matches!(
        c,
        '=' | '~' | '-' | '+' | '!' | '&' | '*' | '%' | '^' | '/' | '<' | '>' | '|'
    ) || ('\u{2200}'..='\u{22FF}').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> (SourceMap, Vec<Token>) {
        let mut map = SourceMap::new();
        let unit = map.add_file("test.nx", source);
        let tokens: Vec<_> = Lexer::new(&map, unit)
            .collect::<Result<_, _>>()
            .expect("lexing failed");
        (map, tokens)
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex_all(source).1.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_ids() {
        assert_eq!(
            kinds("let x"),
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Punct(Punct::Space),
                TokenKind::Id(Id::simple("x")),
            ]
        );
    }

    #[test]
    fn bang_keywords_lex_whole() {
        assert_eq!(
            kinds("unsafe!"),
            vec![TokenKind::Keyword(Keyword::UnsafeBang)]
        );
    }

    #[test]
    fn newline_run_is_one_token_spanning_rows() {
        let (_, tokens) = lex_all("a\n\n\nb");
        assert_eq!(tokens.len(), 3);
        let newline = &tokens[1];
        assert_eq!(newline.kind, TokenKind::Punct(Punct::Newline));
        assert_eq!(newline.placement.location.start.row, 0);
        assert_eq!(newline.placement.location.end.unwrap().row, 3);
    }

    #[test]
    fn scope_static_is_single_token() {
        assert_eq!(
            kinds("A::B"),
            vec![
                TokenKind::Id(Id::simple("A")),
                TokenKind::Punct(Punct::ScopeStatic),
                TokenKind::Id(Id::simple("B")),
            ]
        );
    }

    #[test]
    fn adjacent_colon_makes_a_label() {
        let kinds = kinds("Return: R");
        match &kinds[0] {
            TokenKind::Id(id) => {
                assert_eq!(id.kind, IdKind::Label);
                assert_eq!(id.value, "Return");
            }
            other => panic!("expected label, got {other:?}"),
        }
    }

    #[test]
    fn prefix_colon_makes_a_symbol() {
        let kinds = kinds(":foo");
        match &kinds[0] {
            TokenKind::Id(id) => assert_eq!(id.kind, IdKind::Symbol),
            other => panic!("expected symbol, got {other:?}"),
        }
    }

    #[test]
    fn id_literals_classify() {
        match &kinds("this")[0] {
            TokenKind::Id(id) => assert_eq!(id.kind, IdKind::Literal(IdLiteral::This)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrapping_defuses_a_literal() {
        match &kinds("`this`")[0] {
            TokenKind::Id(id) => {
                assert_eq!(id.kind, IdKind::Simple);
                assert!(id.wrapped);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn c_ids_and_pointer_suffixes() {
        match &kinds("$char*")[0] {
            TokenKind::Id(id) => {
                assert_eq!(id.kind, IdKind::C);
                assert_eq!(id.pointer_suffixes.len(), 1);
                assert_eq!(id.pointer_suffixes[0].depth, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        match &kinds("$char**s")[0] {
            TokenKind::Id(id) => {
                assert_eq!(id.pointer_suffixes[0].depth, 2);
                assert_eq!(id.pointer_suffixes[0].storage, Some(PointerStorage::Static));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wrapped_c_id_normalizes_spaces() {
        match &kinds("$`unsigned   int`")[0] {
            TokenKind::Id(id) => assert_eq!(id.value, "unsigned int"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn c_string_literal() {
        assert_eq!(kinds("$\"hi\""), vec![TokenKind::CStr("hi".into())]);
    }

    #[test]
    fn string_keeps_raw_escapes() {
        assert_eq!(
            kinds(r#""a\"b""#),
            vec![TokenKind::Str(r#"a\"b"#.into())]
        );
    }

    #[test]
    fn unicode_math_operator_lexes_as_op() {
        assert_eq!(kinds("∈"), vec![TokenKind::Op("∈".into())]);
    }

    #[test]
    fn single_angles_are_puncts_and_compound_ops_stay_ops() {
        assert_eq!(
            kinds("< <="),
            vec![
                TokenKind::Punct(Punct::AngleOpen),
                TokenKind::Punct(Punct::Space),
                TokenKind::Op("<=".into()),
            ]
        );
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        assert_eq!(
            kinds("# hi\n"),
            vec![
                TokenKind::Comment(" hi".into()),
                TokenKind::Punct(Punct::Newline),
            ]
        );
    }

    #[test]
    fn literal_kind_marker() {
        assert_eq!(
            kinds("\\Bool"),
            vec![TokenKind::LiteralKind(LiteralKind::Bool)]
        );
    }

    #[test]
    fn panic_is_stored_and_stream_ends() {
        let mut map = SourceMap::new();
        let unit = map.add_file("bad.nx", "let ????");
        let mut lexer = Lexer::new(&map, unit);

        let mut saw_err = false;
        for item in lexer.by_ref() {
            if item.is_err() {
                saw_err = true;
            }
        }
        assert!(saw_err);
        assert!(lexer.panic().is_some());
        assert!(lexer.next().is_none());
    }

    #[test]
    fn unterminated_string_is_unexpected_eof() {
        let mut map = SourceMap::new();
        let unit = map.add_file("bad.nx", "\"oops");
        let result: Result<Vec<_>, _> = Lexer::new(&map, unit).collect();
        let panic = result.unwrap_err();
        assert_eq!(panic.id, Some(PanicId::UnexpectedEof));
    }

    #[test]
    fn round_trip_concatenates_to_source() {
        let source = "def sum(a : Int32, b : Int32) : Int32\n  return a + b\nend\n";
        let (map, tokens) = lex_all(source);
        let unit = tokens[0].placement.unit;

        let mut rebuilt = String::new();
        for token in &tokens {
            let start = map.byte_of(unit, token.placement.location.start);
            let end = map.byte_of(unit, token.placement.location.end.unwrap());
            rebuilt.push_str(&source[start..end]);
        }
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn placement_spans_equal_slice_lengths() {
        let source = "let τ = 42 # greek\n";
        let (map, tokens) = lex_all(source);
        for token in &tokens {
            let unit = token.placement.unit;
            let start = map.byte_of(unit, token.placement.location.start);
            let end = map.byte_of(unit, token.placement.location.end.unwrap());
            assert!(end > start, "empty token slice for {:?}", token.kind);
        }
    }
}
