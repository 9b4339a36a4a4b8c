//! Expression parsing. Precedence is three-layered: a call binds tighter
//! than any operator, unary operators bind tighter than binary ones, and
//! binary operators chain left-associatively. Assignment re-associates to
//! the right and requires a query target.

use std::collections::HashMap;

use onyx_base::Panic;

use crate::cst;
use crate::token::{IdKind, Keyword, Punct, Token, TokenKind};

use super::{Parser, StmtParsing};

pub trait ExprParsing {
    fn parse_rval(&mut self) -> Result<cst::RVal, Panic>;
    fn try_parse_rval(&mut self) -> Result<Option<cst::RVal>, Panic>;
    fn parse_id_query(&mut self, with_targs: bool) -> Result<cst::IdQuery, Panic>;
    fn parse_type_expr(&mut self) -> Result<cst::TypeExpr, Panic>;
}

impl<'m> ExprParsing for Parser<'m> {
    fn parse_rval(&mut self) -> Result<cst::RVal, Panic> {
        match self.try_parse_rval()? {
            Some(rval) => Ok(rval),
            None => Err(self.expected("an rvalue")),
        }
    }

    fn try_parse_rval(&mut self) -> Result<Option<cst::RVal>, Panic> {
        let Some(mut left) = self.try_parse_unary()? else {
            return Ok(None);
        };

        loop {
            self.skip_space()?;

            if self.is_op("=") {
                // Assignment requires an assignable left side and
                // associates to the right.
                let target = match left {
                    cst::RVal::Query(query) => query,
                    other => {
                        return Err(Panic::new(
                            "Can not assign to this expression",
                            Some(other.placement()),
                        ))
                    }
                };
                let op = self.take()?;
                self.skip_space_and_newlines()?;
                let value = self.parse_rval()?;
                left = cst::RVal::Assign(Box::new(cst::Assign { target, op, value }));
                break;
            }

            if !self.at_binary_operator() {
                break;
            }

            let op = self.take()?;
            self.skip_space_and_newlines()?;
            let right = match self.try_parse_unary()? {
                Some(right) => right,
                None => return Err(self.expected("a right operand")),
            };
            left = cst::RVal::BinOp(Box::new(cst::BinOp { left, op, right }));
        }

        Ok(Some(left))
    }

    /// Parse a full-path identifier query. With `with_targs`, an angle
    /// list glued to an element is read as its template arguments
    /// (`foo<Int32>()`), while a spaced angle stays a comparison.
    fn parse_id_query(&mut self, with_targs: bool) -> Result<cst::IdQuery, Panic> {
        let mut elements = Vec::new();
        let mut access = cst::Access::Leading;
        let mut access_token = None;

        // A top-level query begins with `::`.
        if self.is_punct(Punct::ScopeStatic) {
            access = cst::Access::Static;
            access_token = Some(self.take()?);
        }

        loop {
            if !self.is_id() {
                return Err(self.expected("an identifier"));
            }
            let id = self.take()?;

            // A label is a UFCS source: `x:f(y)`. The colon lives inside
            // the label token, so the next element follows immediately.
            let is_label = matches!(&id.kind, TokenKind::Id(i) if i.kind == IdKind::Label);
            if is_label {
                elements.push(cst::QueryElement {
                    access,
                    access_token: access_token.take(),
                    id,
                    targs: Vec::new(),
                });
                access = cst::Access::Ufcs;
                continue;
            }

            let targs = if with_targs && self.angle_adjacent_to(&id) {
                self.parse_targs()?
            } else {
                Vec::new()
            };

            elements.push(cst::QueryElement {
                access,
                access_token: access_token.take(),
                id,
                targs,
            });

            if self.is_punct(Punct::ScopeStatic) {
                access = cst::Access::Static;
                access_token = Some(self.take()?);
            } else if self.is_punct(Punct::ScopeInstance) {
                access = cst::Access::Instance;
                access_token = Some(self.take()?);
            } else {
                break;
            }
        }

        Ok(cst::IdQuery { elements })
    }

    fn parse_type_expr(&mut self) -> Result<cst::TypeExpr, Panic> {
        if matches!(self.current_kind(), Some(TokenKind::LiteralKind(_))) {
            Ok(cst::TypeExpr::LiteralKind(self.take()?))
        } else if matches!(self.current_kind(), Some(TokenKind::Int(_))) {
            Ok(cst::TypeExpr::Literal(cst::Literal::Int(self.take()?)))
        } else if matches!(self.current_kind(), Some(TokenKind::Bool(_))) {
            Ok(cst::TypeExpr::Literal(cst::Literal::Bool(self.take()?)))
        } else if matches!(self.current_kind(), Some(TokenKind::Str(_))) {
            Ok(cst::TypeExpr::Literal(cst::Literal::Str(self.take()?)))
        } else if self.is_id() || self.is_punct(Punct::ScopeStatic) {
            Ok(cst::TypeExpr::Query(self.parse_id_query(true)?))
        } else {
            Err(self.expected("a type expression"))
        }
    }
}

impl<'m> Parser<'m> {
    fn try_parse_unary(&mut self) -> Result<Option<cst::RVal>, Panic> {
        if matches!(self.current_kind(), Some(TokenKind::Op(_))) {
            let op = self.take()?;
            let operand = match self.try_parse_unary()? {
                Some(operand) => operand,
                None => return Err(self.expected("an operand")),
            };
            return Ok(Some(cst::RVal::UnOp(Box::new(cst::UnOp { op, operand }))));
        }

        self.try_parse_primary()
    }

    fn try_parse_primary(&mut self) -> Result<Option<cst::RVal>, Panic> {
        let mut value = if matches!(self.current_kind(), Some(TokenKind::Int(_))) {
            cst::RVal::Literal(cst::Literal::Int(self.take()?))
        } else if matches!(self.current_kind(), Some(TokenKind::Bool(_))) {
            cst::RVal::Literal(cst::Literal::Bool(self.take()?))
        } else if matches!(self.current_kind(), Some(TokenKind::Str(_))) {
            cst::RVal::Literal(cst::Literal::Str(self.take()?))
        } else if matches!(self.current_kind(), Some(TokenKind::CStr(_))) {
            cst::RVal::Literal(cst::Literal::CStr(self.take()?))
        } else if self.is_id() || self.is_punct(Punct::ScopeStatic) {
            cst::RVal::Query(self.parse_id_query(true)?)
        } else if self.is_punct(Punct::ParenOpen) {
            let open = self.take()?;
            // Angle brackets regain their comparison meaning inside
            // parentheses.
            let saved_depth = std::mem::take(&mut self.angle_depth);
            self.skip_space_and_newlines()?;
            let inner = self.parse_rval()?;
            self.skip_space_and_newlines()?;
            let close = self.expect_punct(Punct::ParenClose)?;
            self.angle_depth = saved_depth;
            cst::RVal::Paren(Box::new(cst::Paren { open, inner, close }))
        } else if self.is_punct(Punct::BraceOpen) || self.current_keyword() == Some(Keyword::Do) {
            cst::RVal::Block(Box::new(self.parse_block(None, &[])?))
        } else if matches!(
            self.current_keyword(),
            Some(Keyword::UnsafeBang | Keyword::FragileBang | Keyword::ThreadsafeBang)
        ) {
            let keyword = self.take()?;
            self.skip_space()?;
            let value = if self.is_punct(Punct::BraceOpen)
                || self.current_keyword() == Some(Keyword::Do)
            {
                cst::RVal::Block(Box::new(self.parse_block(None, &[])?))
            } else {
                self.parse_rval()?
            };
            cst::RVal::SafetyExpr(Box::new(cst::SafetyExpr { keyword, value }))
        } else {
            return Ok(None);
        };

        // A call binds tighter than any operator; the paren must be glued
        // to the callee (`foo(x)`, not `foo (x)`).
        while self.is_punct(Punct::ParenOpen) {
            value = cst::RVal::Call(Box::new(self.parse_call(value)?));
        }

        Ok(Some(value))
    }

    fn parse_call(&mut self, callee: cst::RVal) -> Result<cst::Call, Panic> {
        let paren_open = self.take()?;
        let saved_depth = std::mem::take(&mut self.angle_depth);
        self.skip_space_and_newlines()?;

        let mut args = Vec::new();
        let mut seen_labels: HashMap<String, Token> = HashMap::new();

        while !self.is_punct(Punct::ParenClose) {
            let label = if self.current_is_label() {
                let token = self.take()?;
                self.check_duplicate_label(&token, &mut seen_labels)?;
                self.skip_space()?;
                Some(token)
            } else {
                None
            };

            let value = self.parse_rval()?;
            args.push(cst::CallArg { label, value });

            self.skip_space_and_newlines()?;
            if self.is_punct(Punct::Comma) {
                self.advance()?;
                self.skip_space_and_newlines()?;
            } else {
                break;
            }
        }

        let paren_close = self.expect_punct(Punct::ParenClose)?;
        self.angle_depth = saved_depth;

        Ok(cst::Call {
            callee,
            paren_open,
            args,
            paren_close,
        })
    }

    /// Template arguments passed in a query element, e.g. `<Int32, N: 4>`.
    fn parse_targs(&mut self) -> Result<Vec<cst::TArg>, Panic> {
        self.expect_punct(Punct::AngleOpen)?;
        self.angle_depth += 1;
        self.skip_space_and_newlines()?;

        let mut targs = Vec::new();
        let mut seen_labels: HashMap<String, Token> = HashMap::new();

        while !self.is_punct(Punct::AngleClose) {
            let label = if self.current_is_label() {
                let token = self.take()?;
                self.check_duplicate_label(&token, &mut seen_labels)?;
                self.skip_space()?;
                Some(token)
            } else {
                None
            };

            let value = self.parse_type_expr()?;
            targs.push(cst::TArg { label, value });

            self.skip_space_and_newlines()?;
            if self.is_punct(Punct::Comma) {
                self.advance()?;
                self.skip_space_and_newlines()?;
            } else {
                break;
            }
        }

        self.expect_punct(Punct::AngleClose)?;
        self.angle_depth -= 1;
        Ok(targs)
    }

    fn check_duplicate_label(
        &self,
        token: &Token,
        seen: &mut HashMap<String, Token>,
    ) -> Result<(), Panic> {
        let value = match &token.kind {
            TokenKind::Id(id) => id.value.clone(),
            _ => return Ok(()),
        };

        if let Some(previous) = seen.get(&value) {
            return Err(Panic::new(
                format!("Duplicate label `{value}`"),
                Some(token.placement),
            )
            .note("Previously used here", Some(previous.placement)));
        }

        seen.insert(value, token.clone());
        Ok(())
    }

    /// Is the lookahead a binary operator in this context?
    fn at_binary_operator(&self) -> bool {
        match self.current_kind() {
            Some(TokenKind::Op(op)) => op != "=",
            Some(TokenKind::Punct(Punct::AngleOpen | Punct::AngleClose)) => self.angle_depth == 0,
            Some(TokenKind::Keyword(Keyword::And | Keyword::Or)) => true,
            _ => false,
        }
    }

    /// Is an angle-open token glued right onto *id* (template arguments)
    /// rather than spaced (comparison)?
    fn angle_adjacent_to(&self, id: &Token) -> bool {
        if !self.is_punct(Punct::AngleOpen) {
            return false;
        }

        let id_end = id.placement.location.end;
        let angle_start = self
            .current
            .as_ref()
            .map(|t| t.placement.location.start);

        match (id_end, angle_start) {
            (Some(end), Some(start)) => end == start,
            _ => false,
        }
    }
}
