//! Statement and block parsing. Blocks come in two styles, `{ … }` and
//! `do … end`, both usable inline or multi-line; branch statements may
//! carry inline `then`/`do` bodies instead of blocks.

use onyx_base::Panic;

use crate::cst;
use crate::token::{Keyword, Punct, Token};

use super::{starts_declaration, DeclParsing, ExprParsing, Parser};

pub trait StmtParsing {
    fn parse_if(&mut self) -> Result<cst::If, Panic>;
    fn parse_while(&mut self) -> Result<cst::While, Panic>;
    fn parse_switch(&mut self) -> Result<cst::Switch, Panic>;
    fn parse_return(&mut self) -> Result<cst::Return, Panic>;

    /// Parse a block. `explicit_do` is a `do` keyword the caller already
    /// consumed; `extra_terminators` are keywords that close the block
    /// without being consumed (`elif`, `else`, `case`).
    fn parse_block(
        &mut self,
        explicit_do: Option<Token>,
        extra_terminators: &[Keyword],
    ) -> Result<cst::Block, Panic>;
}

impl<'m> StmtParsing for Parser<'m> {
    fn parse_if(&mut self) -> Result<cst::If, Panic> {
        let main = self.parse_case(&[Keyword::Elif, Keyword::Else])?;

        let mut elifs = Vec::new();
        while self.current_keyword() == Some(Keyword::Elif) {
            elifs.push(self.parse_case(&[Keyword::Elif, Keyword::Else])?);
        }

        let else_ = if self.current_keyword() == Some(Keyword::Else) {
            Some(self.parse_else(&[])?)
        } else {
            None
        };

        Ok(cst::If { main, elifs, else_ })
    }

    fn parse_while(&mut self) -> Result<cst::While, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;
        let cond = self.parse_rval()?;
        self.skip_space()?;

        let do_keyword = if self.current_keyword() == Some(Keyword::Do) {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        let branch = if self.is_term() || self.is_punct(Punct::BraceOpen) {
            // The `do`, if any, belongs to the block.
            let block = self.parse_block(do_keyword, &[])?;
            cst::Branch {
                delimiter: None,
                body: cst::BranchBody::Block(block),
            }
        } else if let Some(do_keyword) = do_keyword {
            self.parse_inline_branch(Some(do_keyword))?
        } else {
            return Err(self.expected("`do <rvalue>` or a block"));
        };

        Ok(cst::While {
            keyword,
            cond,
            branch,
        })
    }

    fn parse_switch(&mut self) -> Result<cst::Switch, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;
        let subject = self.parse_rval()?;
        self.skip_space_and_newlines()?;

        let mut cases = Vec::new();
        while self.current_keyword() == Some(Keyword::Case) {
            cases.push(self.parse_case(&[Keyword::Case, Keyword::Else])?);
            self.skip_space_and_newlines()?;
        }

        let else_ = if self.current_keyword() == Some(Keyword::Else) {
            let else_ = self.parse_else(&[])?;
            self.skip_space_and_newlines()?;
            Some(else_)
        } else {
            None
        };

        self.expect_keyword(Keyword::End)?;

        Ok(cst::Switch {
            keyword,
            subject,
            cases,
            else_,
        })
    }

    fn parse_return(&mut self) -> Result<cst::Return, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;

        let terminates = self.current.is_none()
            || self.is_term()
            || self.is_punct(Punct::BraceClose)
            || self.is_punct(Punct::ParenClose)
            || matches!(
                self.current_keyword(),
                Some(Keyword::End | Keyword::Elif | Keyword::Else)
            );

        let value = if terminates {
            None
        } else {
            Some(self.parse_rval()?)
        };

        Ok(cst::Return { keyword, value })
    }

    fn parse_block(
        &mut self,
        explicit_do: Option<Token>,
        extra_terminators: &[Keyword],
    ) -> Result<cst::Block, Panic> {
        let mut open = explicit_do;
        let mut style = cst::BlockStyle::Ruby;
        let mut multiline = false;

        if open.is_none() && self.current_keyword() == Some(Keyword::Do) {
            open = Some(self.take()?);
            self.skip_space()?;
        }

        if self.is_punct(Punct::BraceOpen) {
            // `{ …` — also reached via `do {`, which prints back as a
            // plain C-style block.
            open = Some(self.take()?);
            style = cst::BlockStyle::C;
            self.skip_space()?;
            if self.is_punct(Punct::Newline) {
                multiline = true;
                self.advance()?;
                self.skip_space()?;
            }
        } else if open.is_some() {
            // `do` followed by a terminator makes the block multi-line;
            // an inline `do <expr>` body is the caller's business and
            // never reaches here.
            self.skip_space()?;
            if self.is_punct(Punct::Semi) {
                self.advance()?;
                self.skip_space()?;
            }
            if self.is_punct(Punct::Newline) {
                multiline = true;
                self.advance()?;
                self.skip_space()?;
            }
        } else if self.is_punct(Punct::Newline) {
            // A bare-newline Ruby body, e.g. a function definition's.
            multiline = true;
            self.advance()?;
            self.skip_space()?;
        } else {
            return Err(self.expected("a block"));
        }

        let mut nodes = Vec::new();
        let mut terminated = true;

        loop {
            self.skip_space()?;

            match style {
                cst::BlockStyle::C => {
                    if self.is_punct(Punct::BraceClose) {
                        break;
                    }
                }
                cst::BlockStyle::Ruby => match self.current_keyword() {
                    Some(Keyword::End) => break,
                    Some(keyword) if extra_terminators.contains(&keyword) => break,
                    _ => {}
                },
            }

            if self.current.is_none() {
                return Err(self.unexpected_eof());
            }

            if !terminated {
                if self.is_punct(Punct::Semi) {
                    self.advance()?;
                    terminated = true;
                    continue;
                } else if self.is_punct(Punct::Newline) {
                    multiline = true;
                    if let Some(empty) = self.consume_newline_as_empty_line()? {
                        nodes.push(cst::Node::EmptyLine(empty));
                    }
                    terminated = true;
                    continue;
                } else if self.current_is_comment() {
                    // A trailing comment ends its line, terminator included.
                    if let Some(comment) = self.collect_comment()? {
                        nodes.push(cst::Node::Comment(comment));
                    }
                    multiline = true;
                    terminated = true;
                    continue;
                } else {
                    return Err(self.expected("a terminator"));
                }
            }

            // A freestanding semicolon is legal, e.g. `do { ; }`.
            if self.is_punct(Punct::Semi) {
                self.advance()?;
                continue;
            }

            if self.is_punct(Punct::Newline) {
                multiline = true;
                if let Some(empty) = self.consume_newline_as_empty_line()? {
                    nodes.push(cst::Node::EmptyLine(empty));
                }
                continue;
            }

            if self.current_is_comment() {
                if let Some(comment) = self.collect_comment()? {
                    nodes.push(cst::Node::Comment(comment));
                }
                continue;
            }

            nodes.push(self.parse_block_node()?);

            self.skip_space()?;
            if self.is_punct(Punct::Newline) {
                multiline = true;
                terminated = true;
                if let Some(empty) = self.consume_newline_as_empty_line()? {
                    nodes.push(cst::Node::EmptyLine(empty));
                }
            } else if self.is_punct(Punct::Semi) {
                terminated = true;
                self.advance()?;
            } else {
                terminated = false;
            }
        }

        let close = match style {
            cst::BlockStyle::C => Some(self.expect_punct(Punct::BraceClose)?),
            cst::BlockStyle::Ruby => {
                if self.current_keyword() == Some(Keyword::End) {
                    Some(self.take()?)
                } else {
                    // Closed by an outer keyword, e.g. `elif`; leave it.
                    None
                }
            }
        };

        Ok(cst::Block {
            style,
            multiline,
            open,
            close,
            nodes,
        })
    }
}

impl<'m> Parser<'m> {
    /// Parse a conditioned branch: `if`, `elif` or `case` plus condition
    /// plus branch.
    pub(super) fn parse_case(&mut self, extra_terminators: &[Keyword]) -> Result<cst::Case, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;
        let cond = self.parse_rval()?;
        self.skip_space()?;

        let then = if self.current_keyword() == Some(Keyword::Then) {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        let branch = if self.current_keyword() == Some(Keyword::Do)
            || self.is_term()
            || self.is_punct(Punct::BraceOpen)
        {
            let block = self.parse_block(None, extra_terminators)?;
            cst::Branch {
                delimiter: then,
                body: cst::BranchBody::Block(block),
            }
        } else if then.is_some() {
            let mut branch = self.parse_inline_branch(then)?;
            // An inline branch may still be closed by its own `end`:
            // `if cond then return x end`.
            self.skip_space()?;
            if self.current_keyword() == Some(Keyword::End) {
                branch = self.wrap_inline_branch(branch)?;
            }
            branch
        } else {
            return Err(self.expected("`then <rvalue>` or a block"));
        };

        Ok(cst::Case {
            keyword,
            cond,
            branch,
        })
    }

    pub(super) fn parse_else(&mut self, extra_terminators: &[Keyword]) -> Result<cst::Else, Panic> {
        let keyword = self.take()?;
        self.skip_space()?;

        let then = if self.current_keyword() == Some(Keyword::Then) {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        let branch = if self.current_keyword() == Some(Keyword::Do)
            || self.is_term()
            || self.is_punct(Punct::BraceOpen)
        {
            let block = self.parse_block(None, extra_terminators)?;
            cst::Branch {
                delimiter: then,
                body: cst::BranchBody::Block(block),
            }
        } else {
            let mut branch = self.parse_inline_branch(then)?;
            self.skip_space()?;
            if self.current_keyword() == Some(Keyword::End) {
                branch = self.wrap_inline_branch(branch)?;
            }
            branch
        };

        Ok(cst::Else { keyword, branch })
    }

    /// An inline branch body: a statement or rvalue after `then`/`do`.
    fn parse_inline_branch(&mut self, delimiter: Option<Token>) -> Result<cst::Branch, Panic> {
        match self.current_keyword() {
            Some(Keyword::Return) => {
                let node = cst::Node::Return(Box::new(self.parse_return()?));
                Ok(cst::Branch {
                    delimiter,
                    body: cst::BranchBody::Block(cst::Block {
                        style: cst::BlockStyle::Ruby,
                        multiline: false,
                        open: None,
                        close: None,
                        nodes: vec![node],
                    }),
                })
            }
            _ => {
                let rval = self.parse_rval()?;
                Ok(cst::Branch {
                    delimiter,
                    body: cst::BranchBody::Expr(rval),
                })
            }
        }
    }

    /// Close an inline branch on its trailing `end`, turning an
    /// expression body into a one-node Ruby block.
    fn wrap_inline_branch(&mut self, branch: cst::Branch) -> Result<cst::Branch, Panic> {
        let end = self.take()?;

        let body = match branch.body {
            cst::BranchBody::Block(mut block) => {
                block.close = Some(end);
                cst::BranchBody::Block(block)
            }
            cst::BranchBody::Expr(rval) => cst::BranchBody::Block(cst::Block {
                style: cst::BlockStyle::Ruby,
                multiline: false,
                open: None,
                close: Some(end),
                nodes: vec![cst::Node::Expr(rval)],
            }),
        };

        Ok(cst::Branch {
            delimiter: branch.delimiter,
            body,
        })
    }

    /// A node legal inside a block: declarations, statements, nested
    /// blocks and expressions, but no directives.
    fn parse_block_node(&mut self) -> Result<cst::Node, Panic> {
        let docs = self.pending_docs.take();

        match self.current_keyword() {
            Some(Keyword::Export) => self.parse_exported_in_block(docs),
            Some(keyword) if starts_declaration(keyword) => self.parse_decl(docs, None, None),
            Some(Keyword::If) => Ok(cst::Node::If(Box::new(self.parse_if()?))),
            Some(Keyword::While) => Ok(cst::Node::While(Box::new(self.parse_while()?))),
            Some(Keyword::Switch) => Ok(cst::Node::Switch(Box::new(self.parse_switch()?))),
            Some(Keyword::Return) => Ok(cst::Node::Return(Box::new(self.parse_return()?))),
            Some(Keyword::Do) => Ok(cst::Node::Block(Box::new(self.parse_block(None, &[])?))),
            _ => match self.try_parse_rval()? {
                Some(rval) => Ok(cst::Node::Expr(rval)),
                None => Err(self.expected("a declaration, rvalue, statement or block")),
            },
        }
    }

    fn parse_exported_in_block(&mut self, docs: Option<cst::Comment>) -> Result<cst::Node, Panic> {
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
            _ => Err(self.expected("a declaration after `export`")),
        }
    }
}
