//! Declaration parsing: variables, functions and types, with their
//! modifier headings, template argument lists and `forall` quantifiers.

use onyx_base::Panic;

use crate::cst;
use crate::token::{Keyword, Punct, Token, TokenKind};

use super::{ExprParsing, Parser, StmtParsing};

pub trait DeclParsing {
    fn parse_decl(
        &mut self,
        docs: Option<cst::Comment>,
        export_keyword: Option<Token>,
        default_keyword: Option<Token>,
    ) -> Result<cst::Node, Panic>;

    fn parse_var_def(&mut self, require_keyword: bool) -> Result<cst::VarDef, Panic>;

    fn parse_args_decl(&mut self, open: Punct, close: Punct) -> Result<cst::ArgsDecl, Panic>;
}

impl<'m> DeclParsing for Parser<'m> {
    fn parse_decl(
        &mut self,
        docs: Option<cst::Comment>,
        export_keyword: Option<Token>,
        default_keyword: Option<Token>,
    ) -> Result<cst::Node, Panic> {
        let mut modifiers = Vec::new();
        let mut forall = None;

        loop {
            match self.current_keyword() {
                Some(
                    Keyword::Builtin
                    | Keyword::Private
                    | Keyword::Static
                    | Keyword::Getter
                    | Keyword::Unsafe
                    | Keyword::Fragile
                    | Keyword::Threadsafe,
                ) => {
                    modifiers.push(self.take()?);
                    self.skip_space()?;
                }

                Some(Keyword::Forall) => {
                    let keyword = self.take()?;
                    self.skip_space()?;
                    let args = self.parse_args_decl(Punct::AngleOpen, Punct::AngleClose)?;
                    forall = Some(cst::Forall { keyword, args });
                    self.skip_space()?;
                }

                Some(Keyword::Let | Keyword::Final) => {
                    let mut var = self.parse_var_def(true)?;
                    var.docs = docs;
                    var.export_keyword = export_keyword;
                    var.default_keyword = default_keyword;
                    var.modifiers = modifiers;
                    return Ok(cst::Node::VarDef(Box::new(var)));
                }

                Some(
                    Keyword::Decl
                    | Keyword::Redecl
                    | Keyword::Impl
                    | Keyword::Def
                    | Keyword::Reimpl
                    | Keyword::Extend,
                ) => {
                    let action = self.take()?;
                    self.skip_space()?;

                    if let Some(category) = self.try_take_type_category(&mut modifiers)? {
                        return self
                            .parse_type_def_rest(
                                docs,
                                export_keyword,
                                default_keyword,
                                modifiers,
                                forall,
                                Some(action),
                                Some(category),
                            )
                            .map(|def| cst::Node::TypeDef(Box::new(def)));
                    }

                    return self
                        .parse_func_decl_rest(
                            docs,
                            export_keyword,
                            default_keyword,
                            modifiers,
                            forall,
                            action,
                        )
                        .map(|decl| cst::Node::FuncDecl(Box::new(decl)));
                }

                // A bare category keyword is an implicit type definition,
                // e.g. `struct Foo`.
                Some(
                    Keyword::Trait
                    | Keyword::Struct
                    | Keyword::Class
                    | Keyword::Enum
                    | Keyword::Unit
                    | Keyword::Annotation,
                ) => {
                    let category = self.take()?;
                    self.skip_space()?;
                    return self
                        .parse_type_def_rest(
                            docs,
                            export_keyword,
                            default_keyword,
                            modifiers,
                            forall,
                            None,
                            Some(category),
                        )
                        .map(|def| cst::Node::TypeDef(Box::new(def)));
                }

                _ => return Err(self.expected("a declaration")),
            }
        }
    }

    /// Parse a variable definition: `[let|final] [alias:] id [: Type]
    /// [= value]`. The keyword is optional for argument declarations.
    fn parse_var_def(&mut self, require_keyword: bool) -> Result<cst::VarDef, Panic> {
        let keyword = match self.current_keyword() {
            Some(Keyword::Let | Keyword::Final) => {
                let token = self.take()?;
                self.skip_space()?;
                Some(token)
            }
            _ if require_keyword => return Err(self.expected("`let` or `final`")),
            _ => None,
        };

        // An adjacent-colon label aliases the declaration, e.g. the
        // `Return` of `Return: R : T`.
        let alias = if self.current_is_label() {
            let token = self.take()?;
            self.skip_space()?;
            Some(token)
        } else {
            None
        };

        let id = self.expect_id_token("a variable identifier")?;
        self.skip_space()?;

        let restriction = if self.is_punct(Punct::Colon) {
            let colon = self.take()?;
            self.skip_space()?;
            let value = self.parse_type_expr()?;
            self.skip_space()?;
            Some(cst::Restriction { colon, value })
        } else {
            None
        };

        let value = if self.is_op("=") {
            let op = self.take()?;
            self.skip_space_and_newlines()?;
            let value = self.parse_rval()?;
            Some(cst::DefaultValue { op, value })
        } else {
            None
        };

        Ok(cst::VarDef {
            docs: None,
            export_keyword: None,
            default_keyword: None,
            modifiers: Vec::new(),
            keyword,
            alias,
            id,
            restriction,
            value,
        })
    }

    /// Parse an argument list declaration, `(a, b)` or `<T, U>`, allowing
    /// the greedy `*`.
    fn parse_args_decl(&mut self, open: Punct, close: Punct) -> Result<cst::ArgsDecl, Panic> {
        let open_token = self.expect_punct(open)?;
        if close == Punct::AngleClose {
            self.angle_depth += 1;
        }
        self.skip_space_and_newlines()?;

        let mut args = Vec::new();
        while !self.is_punct(close) {
            if self.is_op("*") {
                args.push(cst::ArgDecl::Greedy(self.take()?));
            } else {
                args.push(cst::ArgDecl::Var(self.parse_var_def(false)?));
            }

            self.skip_space_and_newlines()?;
            if self.is_punct(Punct::Comma) {
                self.advance()?;
                self.skip_space_and_newlines()?;
            } else {
                break;
            }
        }

        let close_token = self.expect_punct(close);
        if close == Punct::AngleClose {
            self.angle_depth -= 1;
        }

        Ok(cst::ArgsDecl {
            open: open_token,
            args,
            close: close_token?,
        })
    }
}

impl<'m> Parser<'m> {
    /// A type category keyword right after the action: `trait`, `struct`,
    /// `builtin` and friends. A `builtin` collected into the modifiers
    /// earlier also counts (`builtin def Foo`).
    fn try_take_type_category(
        &mut self,
        modifiers: &mut Vec<Token>,
    ) -> Result<Option<Token>, Panic> {
        match self.current_keyword() {
            Some(
                Keyword::Trait
                | Keyword::Struct
                | Keyword::Class
                | Keyword::Enum
                | Keyword::Unit
                | Keyword::Annotation
                | Keyword::Builtin,
            ) => {
                let token = self.take()?;
                self.skip_space()?;
                Ok(Some(token))
            }
            // `builtin struct Foo` keeps `builtin` a modifier; a bare
            // capitalized id after a lone `builtin` modifier makes it the
            // category instead.
            Some(_) | None => {
                if self.is_id() {
                    if let Some(at) = modifiers
                        .iter()
                        .position(|m| m.kind == TokenKind::Keyword(Keyword::Builtin))
                    {
                        if modifiers.len() == 1 && self.current_capitalized() {
                            return Ok(Some(modifiers.remove(at)));
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    fn current_capitalized(&self) -> bool {
        match self.current_kind() {
            Some(TokenKind::Id(id)) => id.capitalized(),
            _ => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn parse_type_def_rest(
        &mut self,
        docs: Option<cst::Comment>,
        export_keyword: Option<Token>,
        default_keyword: Option<Token>,
        modifiers: Vec<Token>,
        forall: Option<cst::Forall>,
        action: Option<Token>,
        category: Option<Token>,
    ) -> Result<cst::TypeDef, Panic> {
        let id = self.parse_id_query(false)?;
        self.skip_space()?;

        let targs = if self.is_punct(Punct::AngleOpen) {
            Some(self.parse_args_decl(Punct::AngleOpen, Punct::AngleClose)?)
        } else {
            None
        };
        self.skip_space()?;

        let mut ancestors = Vec::new();
        if self.is_punct(Punct::Colon) {
            self.advance()?;
            loop {
                self.skip_space()?;
                ancestors.push(self.parse_type_expr()?);
                self.skip_space()?;
                if self.is_punct(Punct::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }

        let body = if self.is_punct(Punct::BraceOpen) || self.current_keyword() == Some(Keyword::Do)
        {
            Some(self.parse_block(None, &[])?)
        } else {
            None
        };

        Ok(cst::TypeDef {
            docs,
            export_keyword,
            default_keyword,
            modifiers,
            forall,
            action,
            category,
            id,
            targs,
            ancestors,
            body,
        })
    }

    fn parse_func_decl_rest(
        &mut self,
        docs: Option<cst::Comment>,
        export_keyword: Option<Token>,
        default_keyword: Option<Token>,
        modifiers: Vec<Token>,
        forall: Option<cst::Forall>,
        action: Token,
    ) -> Result<cst::FuncDecl, Panic> {
        let id = self.parse_id_query(false)?;

        let targs = if self.is_punct(Punct::AngleOpen) {
            Some(self.parse_args_decl(Punct::AngleOpen, Punct::AngleClose)?)
        } else {
            None
        };

        self.skip_space()?;
        let args = if self.is_punct(Punct::ParenOpen) {
            Some(self.parse_args_decl(Punct::ParenOpen, Punct::ParenClose)?)
        } else {
            None
        };

        self.skip_space()?;
        let return_type = if self.is_punct(Punct::Colon) {
            let colon = self.take()?;
            self.skip_space()?;
            let value = self.parse_type_expr()?;
            Some(cst::Restriction { colon, value })
        } else {
            None
        };

        let decl = cst::FuncDecl {
            docs,
            export_keyword,
            default_keyword,
            modifiers,
            forall,
            action,
            id,
            targs,
            args,
            return_type,
            body: None,
        };

        // Declarations have no body; every other action requires one.
        match decl.action() {
            cst::Action::Decl => Ok(decl),
            _ => {
                let body = self.parse_func_body()?;
                Ok(cst::FuncDecl {
                    body: Some(body),
                    ..decl
                })
            }
        }
    }

    /// A function body: a C block, a `do` block, or a bare-newline Ruby
    /// body running to `end`.
    fn parse_func_body(&mut self) -> Result<cst::Block, Panic> {
        self.skip_space()?;

        if self.is_punct(Punct::BraceOpen)
            || self.current_keyword() == Some(Keyword::Do)
            || self.is_punct(Punct::Newline)
        {
            self.parse_block(None, &[])
        } else {
            Err(self.expected("a function body"))
        }
    }
}
