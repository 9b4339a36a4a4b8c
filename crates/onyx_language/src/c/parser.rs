use onyx_base::{Panic, PanicId, Placement, Position};

use super::cst::{Arg, FuncDecl, Root, TypeRef, VArg};
use super::lexer::Lexer;
use super::token::{Token, TokenKind};

/// The C parser: one-token lookahead over the C lexer. In
/// single-expression mode it consumes exactly one prototype and stops
/// with the stream positioned right after its semicolon, so the Onyx
/// parser can resync and carry on.
pub struct Parser {
    lexer: Lexer,
    current: Option<Token>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            current: None,
        }
    }

    /// The first unconsumed (byte, block-relative position) pair. Only
    /// meaningful once parsing stopped at a token boundary.
    pub fn cursor_state(&self) -> (usize, Position) {
        self.lexer.cursor_state()
    }

    pub fn parse(&mut self, single_expression: bool) -> Result<Root, Panic> {
        self.advance()?;
        let mut root = Root::default();

        loop {
            if self.current.is_none() {
                break;
            }

            if self.current_is_space_or_newline() {
                self.advance()?;
            } else if self.current_is_id() {
                let proto = self.parse_proto(single_expression)?;
                log::debug!(target: "c/parser", "parsed prototype `{}`", proto.name_value());
                root.protos.push(proto);

                if single_expression {
                    break;
                }
            } else {
                return Err(self.unexpected("a prototype"));
            }
        }

        if single_expression && root.protos.is_empty() {
            return Err(self.unexpected_eof());
        }

        Ok(root)
    }

    fn parse_proto(&mut self, single_expression: bool) -> Result<FuncDecl, Panic> {
        let return_type = self.parse_type()?;
        self.skip_space()?;

        let name = self.expect_id("a function name")?;
        self.skip_space()?;

        self.expect(&TokenKind::ParenOpen)?;
        self.advance()?;
        self.skip_space_and_newlines()?;

        let mut args = Vec::new();
        let mut varg = None;

        loop {
            if self.current.is_none() {
                return Err(self.unexpected_eof());
            }

            if matches!(self.current_kind(), Some(TokenKind::ParenClose)) {
                break;
            }

            if matches!(self.current_kind(), Some(TokenKind::Varg)) {
                let token = self.take()?;
                varg = Some(VArg { token });
                self.skip_space_and_newlines()?;
                // The varg must be last.
                self.expect(&TokenKind::ParenClose)?;
                break;
            }

            if self.current_is_id() {
                args.push(self.parse_arg()?);
                self.skip_space_and_newlines()?;

                if matches!(self.current_kind(), Some(TokenKind::Comma)) {
                    self.advance()?;
                    self.skip_space_and_newlines()?;
                }
            } else {
                return Err(self.unexpected("an argument declaration or `)`"));
            }
        }

        self.advance()?; // The closing paren
        self.skip_space()?;
        self.expect(&TokenKind::Semi)?;

        if single_expression {
            // Leave the stream exactly after the semicolon.
            self.current = None;
        } else {
            self.advance()?;
        }

        Ok(FuncDecl {
            return_type,
            name,
            args,
            varg,
        })
    }

    /// Parse a type reference: an id plus any `*` tokens, with spaces
    /// permitted on either side of each star (`char *s`, `char* s`).
    fn parse_type(&mut self) -> Result<TypeRef, Panic> {
        let id = self.expect_id("a type identifier")?;
        let mut pointer_tokens = Vec::new();

        loop {
            if matches!(self.current_kind(), Some(TokenKind::Op('*'))) {
                pointer_tokens.push(self.take()?);
            } else if matches!(self.current_kind(), Some(TokenKind::Space)) {
                // Only cross the space if a star follows it.
                if self.lexer_peek_is_star() {
                    self.advance()?;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(TypeRef { id, pointer_tokens })
    }

    fn parse_arg(&mut self) -> Result<Arg, Panic> {
        let type_ref = self.parse_type()?;
        self.skip_space()?;

        let name = if self.current_is_id() {
            Some(self.take()?)
        } else {
            None
        };

        Ok(Arg { type_ref, name })
    }

    fn current_kind(&self) -> Option<&TokenKind> {
        self.current.as_ref().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Result<(), Panic> {
        self.current = match self.lexer.next() {
            Some(Ok(token)) => Some(token),
            Some(Err(panic)) => return Err(panic),
            None => None,
        };
        Ok(())
    }

    /// Take the current token and advance.
    fn take(&mut self) -> Result<Token, Panic> {
        let token = self.current.take().ok_or_else(|| self.unexpected_eof())?;
        self.advance()?;
        Ok(token)
    }

    fn expect(&self, kind: &TokenKind) -> Result<(), Panic> {
        match &self.current {
            Some(token) if token.kind == *kind => Ok(()),
            Some(token) => Err(Panic::new(
                format!(
                    "Unexpected token {}, expected {}",
                    token.kind.name(),
                    kind.name()
                ),
                Some(token.placement),
            )),
            None => Err(self.unexpected_eof()),
        }
    }

    fn expect_id(&mut self, what: &str) -> Result<Token, Panic> {
        if self.current_is_id() {
            self.take()
        } else if self.current.is_some() {
            Err(self.unexpected(what))
        } else {
            Err(self.unexpected_eof())
        }
    }

    fn current_is_id(&self) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Id(_)))
    }

    fn current_is_space_or_newline(&self) -> bool {
        matches!(
            self.current_kind(),
            Some(TokenKind::Space) | Some(TokenKind::Newline)
        )
    }

    fn skip_space(&mut self) -> Result<(), Panic> {
        while matches!(self.current_kind(), Some(TokenKind::Space)) {
            self.advance()?;
        }
        Ok(())
    }

    fn skip_space_and_newlines(&mut self) -> Result<(), Panic> {
        while matches!(
            self.current_kind(),
            Some(TokenKind::Space) | Some(TokenKind::Newline)
        ) {
            self.advance()?;
        }
        Ok(())
    }

    /// Whether the next unconsumed codepoint is a `*`. Needed to decide if
    /// a space belongs to the type (`char *s`) or separates a name. The
    /// lexer is never ahead of the last yielded token, so its cursor
    /// points exactly past the current Space token.
    fn lexer_peek_is_star(&self) -> bool {
        self.lexer.peek_char() == Some('*')
    }

    fn unexpected(&self, expected: &str) -> Panic {
        match &self.current {
            Some(token) => Panic::new(
                format!(
                    "Unexpected token {}, expected {}",
                    token.kind.name(),
                    expected
                ),
                Some(token.placement),
            ),
            None => self.unexpected_eof(),
        }
    }

    fn unexpected_eof(&self) -> Panic {
        let (_, pos) = self.lexer.cursor_state();
        Panic::with_id(
            PanicId::UnexpectedEof,
            "Unexpected EOF",
            Some(Placement::point(self.lexer_unit(), pos)),
        )
    }

    fn lexer_unit(&self) -> onyx_base::UnitId {
        self.lexer.unit()
    }
}
