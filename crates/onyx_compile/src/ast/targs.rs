//! Template-argument declaration profiles. Every contributor to a
//! superdeclaration carries one (possibly empty) profile; contributors
//! must agree with each other per the compatibility rule below.

use onyx_base::{Panic, PanicId, Placement};
use onyx_language::cst;

/// A single template argument declaration, e.g. `T : Number = Int32`.
#[derive(Debug, Clone)]
pub struct TargDecl {
    /// The public alias, e.g. `Return` in `Return: R`.
    pub alias: Option<String>,
    pub name: String,
    /// The restriction in printed form; real-type compatibility is
    /// deferred until specialization.
    pub restriction: Option<String>,
    pub default_value: Option<String>,
    pub placement: Placement,
}

/// An ordered template-argument profile.
#[derive(Debug, Clone, Default)]
pub struct TargProfile {
    pub args: Vec<TargDecl>,
}

/// Why two profiles disagree; carries the offending pair's placements.
#[derive(Debug, Clone)]
pub struct TargConflict {
    pub index: usize,
    pub reason: &'static str,
    pub ours: Option<Placement>,
    pub theirs: Option<Placement>,
}

impl TargProfile {
    pub fn from_args_decl(decl: &cst::ArgsDecl) -> Self {
        let args = decl
            .args
            .iter()
            .filter_map(|arg| match arg {
                cst::ArgDecl::Var(var) => Some(TargDecl {
                    alias: var.alias_value().map(str::to_string),
                    name: var.name().to_string(),
                    restriction: var.restriction.as_ref().map(|r| print_type(&r.value)),
                    default_value: var.value.as_ref().map(|v| print_rval(&v.value)),
                    placement: var.id.placement,
                }),
                cst::ArgDecl::Greedy(_) => None,
            })
            .collect();

        Self { args }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Two profiles are compatible iff they have equal aliases in
    /// corresponding positions, equal restrictions, and no conflicting
    /// default values. The first conflicting pair is reported, making
    /// the check symmetric up to order swap.
    ///
    /// A contributor that declares no template arguments at all is
    /// exempt: an implementation carries its arguments in the id query
    /// or a `forall`, not in a re-declared profile, so there is nothing
    /// to compare (see the profile-exemption decision in DESIGN.md).
    pub fn compatible(&self, other: &TargProfile) -> Result<(), TargConflict> {
        if self.is_empty() || other.is_empty() {
            return Ok(());
        }

        let len = self.args.len().max(other.args.len());
        for index in 0..len {
            let (ours, theirs) = match (self.args.get(index), other.args.get(index)) {
                (Some(a), Some(b)) => (a, b),
                (Some(a), None) => {
                    return Err(TargConflict {
                        index,
                        reason: "differing template argument count",
                        ours: Some(a.placement),
                        theirs: None,
                    })
                }
                (None, Some(b)) => {
                    return Err(TargConflict {
                        index,
                        reason: "differing template argument count",
                        ours: None,
                        theirs: Some(b.placement),
                    })
                }
                (None, None) => unreachable!(),
            };

            if ours.alias != theirs.alias {
                return Err(conflict(index, "differing template argument alias", ours, theirs));
            }

            if ours.restriction != theirs.restriction {
                return Err(conflict(
                    index,
                    "differing template argument restriction",
                    ours,
                    theirs,
                ));
            }

            if let (Some(a), Some(b)) = (&ours.default_value, &theirs.default_value) {
                if a != b {
                    return Err(conflict(
                        index,
                        "conflicting template argument default",
                        ours,
                        theirs,
                    ));
                }
            }
        }

        Ok(())
    }
}

fn conflict(index: usize, reason: &'static str, ours: &TargDecl, theirs: &TargDecl) -> TargConflict {
    TargConflict {
        index,
        reason,
        ours: Some(ours.placement),
        theirs: Some(theirs.placement),
    }
}

impl TargConflict {
    pub fn into_panic(self, name: &str) -> Panic {
        Panic::with_id(
            PanicId::AlreadyDeclared,
            format!("Incompatible declaration of `{name}`: {}", self.reason),
            self.ours,
        )
        .note("Conflicts with this declaration", self.theirs)
    }
}

/// Print a type expression for structural comparison.
pub(super) fn print_type(expr: &cst::TypeExpr) -> String {
    let mut out = String::new();

    match expr {
        cst::TypeExpr::Query(query) => {
            for element in &query.elements {
                out.push_str(match element.access {
                    cst::Access::Leading => "",
                    cst::Access::Static => "::",
                    cst::Access::Instance => ".",
                    cst::Access::Ufcs => ":",
                });
                out.push_str(element.id_value());

                if !element.targs.is_empty() {
                    out.push('<');
                    for (i, targ) in element.targs.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(&print_type(&targ.value));
                    }
                    out.push('>');
                }
            }
        }
        cst::TypeExpr::LiteralKind(token) => out.push_str(&token.kind.print()),
        cst::TypeExpr::Literal(literal) => out.push_str(&print_literal(literal)),
    }

    out
}

fn print_literal(literal: &cst::Literal) -> String {
    match literal {
        cst::Literal::Int(t) | cst::Literal::Bool(t) | cst::Literal::Str(t)
        | cst::Literal::CStr(t) => t.kind.print(),
    }
}

/// Print an rvalue for default-value comparison. Only literals and plain
/// queries compare structurally; anything else never compares equal.
pub(super) fn print_rval(rval: &cst::RVal) -> String {
    match rval {
        cst::RVal::Literal(literal) => print_literal(literal),
        cst::RVal::Query(query) => {
            let mut out = String::new();
            for (i, element) in query.elements.iter().enumerate() {
                if i > 0 {
                    out.push_str("::");
                }
                out.push_str(element.id_value());
            }
            out
        }
        other => format!("<expr at {:?}>", other.placement().location.start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_base::SourceMap;
    use onyx_language::parser;

    fn profile_of(source: &str) -> TargProfile {
        let mut map = SourceMap::new();
        let unit = map.add_file("t.nx", source);
        let root = parser::parse(&mut map, unit).expect("parse failed");
        match &root.children[0] {
            cst::Node::FuncDecl(func) => {
                let targs = func
                    .targs
                    .as_ref()
                    .or(func.forall.as_ref().map(|f| &f.args))
                    .expect("no template args");
                TargProfile::from_args_decl(targs)
            }
            other => panic!("expected a function, got {other:?}"),
        }
    }

    #[test]
    fn equal_profiles_are_compatible() {
        let a = profile_of("decl f<T : Number>(x : T)\n");
        let b = profile_of("decl f<T : Number>(x : T)\n");
        assert!(a.compatible(&b).is_ok());
        assert!(b.compatible(&a).is_ok());
    }

    #[test]
    fn differing_restrictions_conflict_symmetrically() {
        let a = profile_of("decl f<T : Number>(x : T)\n");
        let b = profile_of("decl f<T : Real>(x : T)\n");

        let ab = a.compatible(&b).unwrap_err();
        let ba = b.compatible(&a).unwrap_err();
        assert_eq!(ab.index, ba.index);
        // The same token pair, up to order swap.
        assert_eq!(ab.ours, ba.theirs);
        assert_eq!(ab.theirs, ba.ours);
    }

    #[test]
    fn differing_aliases_conflict() {
        let a = profile_of("decl f<Return: R>(x : R)\n");
        let b = profile_of("decl f<Result: R>(x : R)\n");
        assert!(a.compatible(&b).is_err());
    }

    #[test]
    fn arity_mismatch_conflicts() {
        let a = profile_of("decl f<T>(x : T)\n");
        let b = profile_of("decl f<T, U>(x : T)\n");
        let conflict = a.compatible(&b).unwrap_err();
        assert_eq!(conflict.index, 1);
    }

    #[test]
    fn undeclared_profile_merges_against_any() {
        // An implementation carries its template arguments in the id
        // query, not in a re-declared profile.
        let a = profile_of("decl f<T : Number>(x : T)\n");
        let undeclared = TargProfile::default();
        assert!(a.compatible(&undeclared).is_ok());
        assert!(undeclared.compatible(&a).is_ok());
    }

    #[test]
    fn agreeing_defaults_are_compatible() {
        let a = profile_of("decl f<T = Int32>(x : T)\n");
        let b = profile_of("decl f<T = Int32>(x : T)\n");
        assert!(a.compatible(&b).is_ok());

        let c = profile_of("decl f<T = Int64>(x : T)\n");
        assert!(a.compatible(&c).is_err());
    }
}
