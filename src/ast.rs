//! Syntax tree for recipe files.
//!
//! Recipe files are S-expressions. The tree only distinguishes atoms from
//! lists; meaning is assigned later in [`crate::recipe`].

/// An S-expression: an atom or a list of expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A bare symbol or a quoted string, e.g. `install` or `"tools/clang"`.
    Atom(String),

    /// A parenthesized list, e.g. `(make install)`.
    List(Vec<Expr>),
}

impl Expr {
    pub fn atom(value: impl Into<String>) -> Self {
        Expr::Atom(value.into())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Expr::Atom(s) => Some(s),
            Expr::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::Atom(_) => None,
            Expr::List(items) => Some(items),
        }
    }

    /// The leading symbol of a list form: `unpack` in `(unpack "url" ...)`.
    pub fn head(&self) -> Option<&str> {
        self.as_list()?.first()?.as_atom()
    }

    /// Everything after the head. Empty for `()` and for atoms.
    pub fn args(&self) -> &[Expr] {
        match self.as_list() {
            Some([_, rest @ ..]) => rest,
            _ => &[],
        }
    }

    /// Arguments of a form, requiring every one of them to be an atom.
    ///
    /// Returns the first offending argument on failure.
    pub fn atom_args(&self) -> Result<Vec<&str>, &Expr> {
        self.args()
            .iter()
            .map(|arg| arg.as_atom().ok_or(arg))
            .collect()
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Atom(s) => {
                let bare = !s.is_empty()
                    && !s
                        .chars()
                        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';'));
                if bare {
                    write!(f, "{}", s)
                } else {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                }
            }
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}
