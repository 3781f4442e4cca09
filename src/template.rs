//! `${var}` substitution for URLs and configure flags.
//!
//! Substitution is purely textual. `$$` produces a literal `$`; a `$` that is
//! not followed by `{` or `$` is copied through unchanged.

use std::collections::BTreeMap;
use thiserror::Error;

/// Variables every recipe run provides.
pub const KNOWN_VARS: &[&str] = &[
    "name",
    "version",
    "root",
    "pwd",
    "prefix",
    "build_dir",
    "nproc",
    "arch",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },
    #[error("unterminated `${{` at byte {offset}")]
    Unterminated { offset: usize },
    #[error("empty variable reference at byte {offset}")]
    EmptyName { offset: usize },
}

/// A set of named substitution values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vars {
    values: BTreeMap<String, String>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

enum Piece<'a> {
    Text(&'a str),
    Var(&'a str),
}

fn pieces(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut out = Vec::new();
    let mut rest = template;
    let mut offset = 0;

    while let Some(pos) = rest.find('$') {
        out.push(Piece::Text(&rest[..pos]));
        let after = &rest[pos + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            out.push(Piece::Text("$"));
            offset += pos + 2;
            rest = tail;
        } else if let Some(tail) = after.strip_prefix('{') {
            let close = tail
                .find('}')
                .ok_or(TemplateError::Unterminated { offset: offset + pos })?;
            let name = tail[..close].trim();
            if name.is_empty() {
                return Err(TemplateError::EmptyName { offset: offset + pos });
            }
            out.push(Piece::Var(name));
            offset += pos + 2 + close + 1;
            rest = &tail[close + 1..];
        } else {
            out.push(Piece::Text("$"));
            offset += pos + 1;
            rest = after;
        }
    }
    out.push(Piece::Text(rest));
    Ok(out)
}

/// Substitute every `${name}` in `template`.
pub fn render(template: &str, vars: &Vars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for piece in pieces(template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Var(name) => {
                let value = vars.get(name).ok_or_else(|| TemplateError::UnknownVariable {
                    name: name.to_string(),
                })?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Names referenced by a template, in order of appearance.
pub fn references(template: &str) -> Result<Vec<&str>, TemplateError> {
    Ok(pieces(template)?
        .into_iter()
        .filter_map(|piece| match piece {
            Piece::Var(name) => Some(name),
            Piece::Text(_) => None,
        })
        .collect())
}

/// Check a template against [`KNOWN_VARS`] without rendering it.
pub fn check(template: &str) -> Result<(), TemplateError> {
    for name in references(template)? {
        if !KNOWN_VARS.contains(&name) {
            return Err(TemplateError::UnknownVariable {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars {
        Vars::new().with("version", "2.8").with("name", "llvm")
    }

    #[test]
    fn test_render_substitutes_version() {
        assert_eq!(
            render("http://llvm.org/releases/${version}/llvm-${version}.tgz", &vars()).unwrap(),
            "http://llvm.org/releases/2.8/llvm-2.8.tgz"
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let t = "${name}-${version}.tar.gz";
        assert_eq!(render(t, &vars()).unwrap(), render(t, &vars()).unwrap());
    }

    #[test]
    fn test_render_unknown_variable() {
        assert_eq!(
            render("${nope}", &vars()),
            Err(TemplateError::UnknownVariable {
                name: "nope".into()
            })
        );
    }

    #[test]
    fn test_render_escapes_and_bare_dollar() {
        assert_eq!(render("cost $$5 and $HOME", &vars()).unwrap(), "cost $5 and $HOME");
        assert_eq!(render("$", &vars()).unwrap(), "$");
        assert_eq!(render("$${version}", &vars()).unwrap(), "${version}");
    }

    #[test]
    fn test_render_trims_names() {
        assert_eq!(render("${ version }", &vars()).unwrap(), "2.8");
    }

    #[test]
    fn test_unterminated_reference() {
        assert_eq!(
            render("abc${version", &vars()),
            Err(TemplateError::Unterminated { offset: 3 })
        );
    }

    #[test]
    fn test_empty_reference() {
        assert_eq!(
            render("x${}", &vars()),
            Err(TemplateError::EmptyName { offset: 1 })
        );
    }

    #[test]
    fn test_references_and_check() {
        assert_eq!(
            references("${pwd}/../${name}-${version}").unwrap(),
            vec!["pwd", "name", "version"]
        );
        assert!(check("${pwd}/__ext__").is_ok());
        assert!(matches!(
            check("${vrsion}"),
            Err(TemplateError::UnknownVariable { name }) if name == "vrsion"
        ));
    }
}
