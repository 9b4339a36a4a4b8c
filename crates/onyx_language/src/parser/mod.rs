//! The Onyx parser: a one-token-lookahead driver over the pull lexer.
//!
//! The current token lives in a single slot refilled on advance, so the
//! lexer never runs ahead of the parser by more than one token. That is
//! what makes the `extern` handoff exact: the parser rewinds the lexer by
//! the one prefetched token, lets the C parser consume the shared stream,
//! then offsets the Onyx cursor to where the C parser stopped.

mod decl;
mod expr;
mod stmt;

#[cfg(test)]
mod tests;

pub use decl::DeclParsing;
pub use expr::ExprParsing;
pub use stmt::StmtParsing;

use onyx_base::{Panic, PanicId, Placement, SourceMap, UnitId};

use crate::cst;
use crate::lexer::Lexer;
use crate::token::{Keyword, Punct, Token, TokenKind};

/// Parse an Onyx unit into a CST root.
pub fn parse(map: &mut SourceMap, unit: UnitId) -> Result<cst::Root, Panic> {
    let lexer = Lexer::new(map, unit);
    let mut parser = Parser {
        map,
        unit,
        lexer,
        current: None,
        pending_docs: None,
        angle_depth: 0,
    };
    parser.parse_root()
}

pub struct Parser<'m> {
    pub(super) map: &'m mut SourceMap,
    pub(super) unit: UnitId,
    pub(super) lexer: Lexer,
    /// The one-slot lookahead buffer.
    pub(super) current: Option<Token>,
    /// Adjacent comment lines awaiting a documentable node.
    pub(super) pending_docs: Option<cst::Comment>,
    /// Non-zero inside a `<…>` argument list, where a bare angle closes
    /// the list instead of comparing.
    pub(super) angle_depth: u32,
}

impl<'m> Parser<'m> {
    fn parse_root(&mut self) -> Result<cst::Root, Panic> {
        self.advance()?;
        let mut root = cst::Root::default();

        while self.current.is_some() {
            if self.is_punct(Punct::Space) {
                self.advance()?;
            } else if self.is_punct(Punct::Newline) {
                if let Some(empty) = self.consume_newline_as_empty_line()? {
                    root.children.push(cst::Node::EmptyLine(empty));
                }
            } else if self.current_is_comment() {
                if let Some(comment) = self.collect_comment()? {
                    root.children.push(cst::Node::Comment(comment));
                }
            } else {
                let node = self.parse_top_level_node()?;
                log::debug!(target: "onyx/parser", "parsed a top-level node");
                root.children.push(node);
                self.expect_terminated()?;
            }
        }

        log::debug!(target: "onyx/parser", "done parsing unit");
        Ok(root)
    }

    fn parse_top_level_node(&mut self) -> Result<cst::Node, Panic> {
        let docs = self.pending_docs.take();

        match self.current_keyword() {
            Some(Keyword::Extern) => Ok(cst::Node::Extern(self.parse_extern()?)),
            Some(Keyword::Import) => Ok(cst::Node::Import(self.parse_import()?)),
            Some(Keyword::Alias) => Ok(cst::Node::Alias(self.parse_alias()?)),
            Some(Keyword::Export) => self.parse_exported(docs),
            Some(keyword) if starts_declaration(keyword) => self.parse_decl(docs, None, None),
            Some(Keyword::If) => Ok(cst::Node::If(Box::new(self.parse_if()?))),
            Some(Keyword::While) => Ok(cst::Node::While(Box::new(self.parse_while()?))),
            Some(Keyword::Switch) => Ok(cst::Node::Switch(Box::new(self.parse_switch()?))),
            Some(Keyword::Return) => Ok(cst::Node::Return(Box::new(self.parse_return()?))),
            _ => match self.try_parse_rval()? {
                Some(rval) => Ok(cst::Node::Expr(rval)),
                None => Err(self.expected("a directive, declaration or expression")),
            },
        }
    }

    /// Parse `export …`: either an export-modified declaration or a
    /// freestanding export directive.
    fn parse_exported(&mut self, docs: Option<cst::Comment>) -> Result<cst::Node, Panic> {
        let export_keyword = self.take()?;
        self.skip_space()?;

        let default_keyword = if self.current_keyword() == Some(Keyword::Default) {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        match self.current_keyword() {
            Some(keyword) if starts_declaration(keyword) => {
                self.parse_decl(docs, Some(export_keyword), default_keyword)
            }
            _ if default_keyword.is_some() => Err(self.expected("a declaration after `default`")),
            _ => {
                // A freestanding `export foo, Bar` directive.
                let mut ids = Vec::new();
                loop {
                    self.skip_space()?;
                    ids.push(self.parse_id_query(true)?);
                    self.skip_space()?;
                    if self.is_punct(Punct::Comma) {
                        self.advance()?;
                    } else {
                        break;
                    }
                }
                Ok(cst::Node::Export(cst::Export {
                    keyword: export_keyword,
                    ids,
                }))
            }
        }
    }

    /// Parse an `extern` directive, handing the shared stream over to the
    /// C parser and resyncing the Onyx lexer afterwards.
    fn parse_extern(&mut self) -> Result<cst::Extern, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;

        let abi = if self.current_is_str() {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        let brace_open = if self.is_punct(Punct::BraceOpen) {
            Some(self.take()?)
        } else {
            None
        };

        // The slot now holds one token lexed from what is really C code.
        // Roll the lexer back by exactly that token, so the C lexer sees
        // the first unconsumed byte.
        self.rewind_current();
        let (byte_start, start) = self.lexer.cursor_state();

        let (block_unit, block) = crate::c::parse_block(
            self.map,
            self.unit,
            start,
            byte_start,
            brace_open.is_none(),
        )?;

        // Skip exactly the bytes the C parser consumed.
        let (byte_end, end) = match self.map.unit(block_unit) {
            onyx_base::Unit::Block {
                byte_end, location, ..
            } => (
                byte_end.expect("unclosed block unit"),
                location.end.expect("unclosed block location"),
            ),
            _ => unreachable!("extern block is not a block unit"),
        };
        self.lexer.resync(byte_end, end);
        self.advance()?;

        let braces = match brace_open {
            Some(open) => {
                self.skip_space_and_newlines()?;
                let close = self.expect_punct(Punct::BraceClose)?;
                Some((open, close))
            }
            None => None,
        };

        Ok(cst::Extern {
            keyword,
            abi,
            braces,
            block_unit,
            block,
        })
    }

    fn parse_import(&mut self) -> Result<cst::Import, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;

        let mut elements = Vec::new();

        loop {
            if self.is_punct(Punct::BraceOpen) {
                // Extracted elements: `{ X }`, `{ X as Y, Z }`.
                self.advance()?;
                self.skip_space_and_newlines()?;

                loop {
                    let id = self.expect_id_token("an imported identifier")?;
                    let alias = self.try_parse_import_alias()?;
                    elements.push(cst::ImportElement {
                        extracted: true,
                        id: Some(id),
                        alias,
                    });

                    self.skip_space_and_newlines()?;
                    if self.is_punct(Punct::Comma) {
                        self.advance()?;
                        self.skip_space_and_newlines()?;
                    } else {
                        break;
                    }
                }

                self.expect_punct(Punct::BraceClose)?;
            } else if self.is_op("*") {
                // The wildcard must be aliased: `import * as X`.
                self.advance()?;
                self.skip_space()?;
                let alias = match self.try_parse_import_alias()? {
                    Some(alias) => Some(alias),
                    None => return Err(self.expected("`as` after `import *`")),
                };
                elements.push(cst::ImportElement {
                    extracted: false,
                    id: None,
                    alias,
                });
            } else {
                let id = self.expect_id_token("an imported identifier")?;
                let alias = self.try_parse_import_alias()?;
                elements.push(cst::ImportElement {
                    extracted: false,
                    id: Some(id),
                    alias,
                });
            }

            self.skip_space()?;
            if self.is_punct(Punct::Comma) {
                self.advance()?;
                self.skip_space()?;
            } else {
                break;
            }
        }

        let from_keyword = self.expect_keyword(Keyword::From)?;
        self.skip_space()?;

        if !self.current_is_str() {
            return Err(self.expected("an import path string"));
        }
        let path = self.take()?;

        Ok(cst::Import {
            keyword,
            elements,
            from_keyword,
            path,
        })
    }

    fn try_parse_import_alias(&mut self) -> Result<Option<cst::ImportAlias>, Panic> {
        self.skip_space()?;
        if self.current_keyword() != Some(Keyword::As) {
            return Ok(None);
        }

        let as_keyword = self.take()?;
        self.skip_space()?;
        let id = self.expect_id_token("an alias identifier")?;
        Ok(Some(cst::ImportAlias { as_keyword, id }))
    }

    fn parse_alias(&mut self) -> Result<cst::Alias, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;
        let source = self.parse_id_query(true)?;
        self.skip_space()?;
        let arrow = self.expect_punct(Punct::ArrowGenerator)?;
        self.skip_space()?;
        let target = self.parse_id_query(true)?;

        Ok(cst::Alias {
            keyword,
            source,
            arrow,
            target,
        })
    }

    // Lookahead plumbing
    //

    pub(super) fn advance(&mut self) -> Result<(), Panic> {
        self.current = match self.lexer.next() {
            Some(Ok(token)) => Some(token),
            Some(Err(panic)) => return Err(panic),
            None => None,
        };
        Ok(())
    }

    /// Take the current token, refilling the slot.
    pub(super) fn take(&mut self) -> Result<Token, Panic> {
        let token = self.current.take().ok_or_else(|| self.unexpected_eof())?;
        self.advance()?;
        Ok(token)
    }

    /// Roll the lexer back to the start of the token in the lookahead
    /// slot, dropping the token. The next reader of the stream sees the
    /// first byte the parser has not consumed.
    pub(super) fn rewind_current(&mut self) {
        if let Some(token) = self.current.take() {
            let pos = token.placement.location.start;
            let byte = self.map.byte_of(self.unit, pos);
            self.lexer.resync(byte, pos);
        }
    }

    pub(super) fn current_kind(&self) -> Option<&TokenKind> {
        self.current.as_ref().map(|t| &t.kind)
    }

    pub(super) fn current_keyword(&self) -> Option<Keyword> {
        match self.current_kind() {
            Some(TokenKind::Keyword(keyword)) => Some(*keyword),
            _ => None,
        }
    }

    pub(super) fn is_punct(&self, punct: Punct) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Punct(p)) if *p == punct)
    }

    pub(super) fn is_op(&self, op: &str) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Op(value)) if value == op)
    }

    pub(super) fn is_term(&self) -> bool {
        self.is_punct(Punct::Newline) || self.is_punct(Punct::Semi)
    }

    pub(super) fn is_id(&self) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Id(_)))
    }

    pub(super) fn current_is_comment(&self) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Comment(_)))
    }

    pub(super) fn current_is_label(&self) -> bool {
        matches!(
            self.current_kind(),
            Some(TokenKind::Id(id)) if id.kind == crate::token::IdKind::Label
        )
    }

    pub(super) fn current_is_str(&self) -> bool {
        matches!(self.current_kind(), Some(TokenKind::Str(_)))
    }

    /// The number of rows the current newline token spans, zero when the
    /// current token is not a newline.
    pub(super) fn current_newline_rows(&self) -> u32 {
        match &self.current {
            Some(token) if token.kind == TokenKind::Punct(Punct::Newline) => {
                match token.placement.location.end {
                    Some(end) => end.row - token.placement.location.start.row,
                    None => 1,
                }
            }
            _ => 0,
        }
    }

    pub(super) fn skip_space(&mut self) -> Result<(), Panic> {
        while self.is_punct(Punct::Space) {
            self.advance()?;
        }
        Ok(())
    }

    pub(super) fn skip_space_and_newlines(&mut self) -> Result<(), Panic> {
        while self.is_punct(Punct::Space) || self.is_punct(Punct::Newline) {
            self.advance()?;
        }
        Ok(())
    }

    /// Consume the current newline token; report it as an empty line when
    /// its span covers more than one row (i.e. a blank line was present).
    pub(super) fn consume_newline_as_empty_line(
        &mut self,
    ) -> Result<Option<cst::EmptyLine>, Panic> {
        let token = self.take()?;
        let rows = match (token.placement.location.start, token.placement.location.end) {
            (start, Some(end)) => end.row - start.row,
            _ => 1,
        };

        if rows >= 2 {
            Ok(Some(cst::EmptyLine { token }))
        } else {
            Ok(None)
        }
    }

    /// Collect a run of comment lines. Returns the comment when it stands
    /// alone; stores it in `pending_docs` when a documentable node
    /// directly follows.
    pub(super) fn collect_comment(&mut self) -> Result<Option<cst::Comment>, Panic> {
        let mut tokens = Vec::new();
        let mut blank_after = false;

        loop {
            if self.current_is_comment() {
                tokens.push(self.take()?);
            } else if self.is_punct(Punct::Newline) {
                let rows = self.current_newline_rows();
                self.advance()?;
                if rows >= 2 {
                    blank_after = true;
                    break;
                }
            } else if self.is_punct(Punct::Space) {
                self.advance()?;
            } else {
                break;
            }
        }

        let comment = cst::Comment { tokens };

        let documentable = matches!(
            self.current_keyword(),
            Some(keyword) if starts_declaration(keyword)
                || keyword == Keyword::Export
        );

        if documentable && !blank_after {
            self.pending_docs = Some(comment);
            Ok(None)
        } else {
            Ok(Some(comment))
        }
    }

    /// After a node, require a terminator: newline, semicolon or EOF. A
    /// trailing comment counts, since its line necessarily ends.
    pub(super) fn expect_terminated(&mut self) -> Result<(), Panic> {
        self.skip_space()?;
        if self.current.is_none() || self.is_punct(Punct::Newline) || self.current_is_comment() {
            Ok(())
        } else if self.is_punct(Punct::Semi) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.expected("a terminator"))
        }
    }

    // Expectation helpers
    //

    pub(super) fn expect_punct(&mut self, punct: Punct) -> Result<Token, Panic> {
        if self.is_punct(punct) {
            self.take()
        } else {
            Err(self.expected(punct.safe_str()))
        }
    }

    pub(super) fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, Panic> {
        if self.current_keyword() == Some(keyword) {
            self.take()
        } else {
            Err(self.expected(keyword.as_str()))
        }
    }

    pub(super) fn expect_id_token(&mut self, what: &str) -> Result<Token, Panic> {
        if self.is_id() {
            self.take()
        } else {
            Err(self.expected(what))
        }
    }

    pub(super) fn expected(&self, what: &str) -> Panic {
        match &self.current {
            Some(token) => Panic::new(
                format!("Unexpected token {}, expected {}", token.kind.name(), what),
                Some(token.placement),
            ),
            None => self.unexpected_eof(),
        }
    }

    pub(super) fn unexpected_eof(&self) -> Panic {
        let (_, pos) = self.lexer.cursor_state();
        Panic::with_id(
            PanicId::UnexpectedEof,
            "Unexpected EOF",
            Some(Placement::point(self.unit, pos)),
        )
    }
}

/// Keywords that may begin a (possibly modified) declaration.
pub(super) fn starts_declaration(keyword: Keyword) -> bool {
    matches!(
        keyword,
        Keyword::Let
            | Keyword::Final
            | Keyword::Decl
            | Keyword::Redecl
            | Keyword::Impl
            | Keyword::Def
            | Keyword::Reimpl
            | Keyword::Extend
            | Keyword::Forall
            | Keyword::Builtin
            | Keyword::Private
            | Keyword::Static
            | Keyword::Getter
            | Keyword::Trait
            | Keyword::Struct
            | Keyword::Class
            | Keyword::Enum
            | Keyword::Unit
            | Keyword::Annotation
    )
}
