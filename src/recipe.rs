//! Recipe interpretation - turns parsed S-expressions into a step tree.

use crate::ast::Expr;
use crate::parser::{self, ParseError};
use crate::template::{self, TemplateError};
use std::fmt;
use std::path::{Component, Path};
use thiserror::Error;

/// Target used by `(make)` when none is given.
pub const DEFAULT_MAKE_TARGET: &str = "install";

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected (recipe ...), got: {found}")]
    NotARecipe { line: usize, found: String },
    #[error("line {line}: missing recipe name")]
    MissingName { line: usize },
    #[error("recipe {name}: missing version")]
    MissingVersion { name: String },
    #[error("recipe {name}: unknown form: {form}")]
    UnknownForm { name: String, form: String },
    #[error("recipe {name}: invalid form: {form}")]
    InvalidForm { name: String, form: String },
    #[error("recipe {name}: unpack alias must be a relative path without '..': {alias}")]
    InvalidAlias { name: String, alias: String },
    #[error("recipe {name} {version} is defined more than once")]
    Duplicate { name: String, version: String },
}

/// A named, versioned build description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub steps: Vec<Step>,
}

/// One unit of recipe work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Fetch and extract an archive, then run `steps` inside it.
    Unpack {
        url: String,
        /// Destination relative to the enclosing directory, replacing the
        /// archive's own top-level name.
        alias: Option<String>,
        sha256: Option<String>,
        steps: Vec<Step>,
    },
    /// `./configure` with the given flags.
    Configure { flags: Vec<String> },
    /// `make <target>`.
    Make { target: String },
}

impl Step {
    pub fn unpack(url: impl Into<String>) -> Self {
        Step::Unpack {
            url: url.into(),
            alias: None,
            sha256: None,
            steps: Vec::new(),
        }
    }

    pub fn configure<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Step::Configure {
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn make(target: impl Into<String>) -> Self {
        Step::Make {
            target: target.into(),
        }
    }

    /// Every template string this step (not its children) renders.
    fn templates(&self) -> Vec<&str> {
        match self {
            Step::Unpack { url, .. } => vec![url.as_str()],
            Step::Configure { flags } => flags.iter().map(String::as_str).collect(),
            Step::Make { .. } => Vec::new(),
        }
    }
}

/// A template problem found by [`Recipe::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateProblem {
    pub template: String,
    pub error: TemplateError,
}

impl fmt::Display for TemplateProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.template, self.error)
    }
}

impl Recipe {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            homepage: None,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    /// `name-version`, also the name of the recipe's root directory.
    pub fn id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Parse a file expected to hold exactly one recipe.
    pub fn parse(input: &str) -> Result<Self, RecipeError> {
        let mut book = RecipeBook::parse(input)?;
        match book.recipes.len() {
            1 => Ok(book.recipes.remove(0)),
            _ => Err(RecipeError::NotARecipe {
                line: 1,
                found: format!("{} recipe forms", book.recipes.len()),
            }),
        }
    }

    /// Interpret a `(recipe "name" "version" ...)` form.
    pub fn from_expr(expr: &Expr, line: usize) -> Result<Self, RecipeError> {
        if expr.head() != Some("recipe") {
            return Err(RecipeError::NotARecipe {
                line,
                found: expr.to_string(),
            });
        }

        let args = expr.args();
        let name = args
            .first()
            .and_then(Expr::as_atom)
            .filter(|s| !s.is_empty())
            .ok_or(RecipeError::MissingName { line })?;
        let version = args
            .get(1)
            .and_then(Expr::as_atom)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RecipeError::MissingVersion {
                name: name.to_string(),
            })?;

        let mut recipe = Recipe::new(name, version);
        for form in &args[2..] {
            match form.head() {
                Some("description") => recipe.description = Some(recipe.single_atom(form)?),
                Some("homepage") => recipe.homepage = Some(recipe.single_atom(form)?),
                _ => {
                    let step = recipe.parse_step(form)?;
                    recipe.steps.push(step);
                }
            }
        }
        Ok(recipe)
    }

    fn invalid(&self, form: &Expr) -> RecipeError {
        RecipeError::InvalidForm {
            name: self.name.clone(),
            form: form.to_string(),
        }
    }

    fn single_atom(&self, form: &Expr) -> Result<String, RecipeError> {
        match form.atom_args() {
            Ok(atoms) if atoms.len() == 1 => Ok(atoms[0].to_string()),
            _ => Err(self.invalid(form)),
        }
    }

    fn parse_step(&self, form: &Expr) -> Result<Step, RecipeError> {
        match form.head() {
            Some("unpack") => self.parse_unpack(form),
            Some("configure") => {
                let flags = form.atom_args().map_err(|_| self.invalid(form))?;
                Ok(Step::configure(flags))
            }
            Some("make") => match form.atom_args() {
                Ok(atoms) if atoms.is_empty() => Ok(Step::make(DEFAULT_MAKE_TARGET)),
                Ok(atoms) if atoms.len() == 1 && !atoms[0].is_empty() => Ok(Step::make(atoms[0])),
                _ => Err(self.invalid(form)),
            },
            _ => Err(RecipeError::UnknownForm {
                name: self.name.clone(),
                form: form.to_string(),
            }),
        }
    }

    fn parse_unpack(&self, form: &Expr) -> Result<Step, RecipeError> {
        let args = form.args();
        let url = args
            .first()
            .and_then(Expr::as_atom)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.invalid(form))?;

        let mut alias = None;
        let mut sha256 = None;
        let mut steps = Vec::new();

        for child in &args[1..] {
            match child.head() {
                Some("as") => {
                    if alias.is_some() {
                        return Err(self.invalid(child));
                    }
                    let path = self.single_atom(child)?;
                    if !is_relative_alias(&path) {
                        return Err(RecipeError::InvalidAlias {
                            name: self.name.clone(),
                            alias: path,
                        });
                    }
                    alias = Some(path);
                }
                Some("sha256") => {
                    if sha256.is_some() {
                        return Err(self.invalid(child));
                    }
                    let hash = self.single_atom(child)?;
                    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(self.invalid(child));
                    }
                    sha256 = Some(hash.to_ascii_lowercase());
                }
                _ => steps.push(self.parse_step(child)?),
            }
        }

        Ok(Step::Unpack {
            url: url.to_string(),
            alias,
            sha256,
            steps,
        })
    }

    /// Statically check every template against the known variable names.
    pub fn check(&self) -> Vec<TemplateProblem> {
        fn walk(steps: &[Step], problems: &mut Vec<TemplateProblem>) {
            for step in steps {
                for t in step.templates() {
                    if let Err(error) = template::check(t) {
                        problems.push(TemplateProblem {
                            template: t.to_string(),
                            error,
                        });
                    }
                }
                if let Step::Unpack { steps, .. } = step {
                    walk(steps, problems);
                }
            }
        }

        let mut problems = Vec::new();
        walk(&self.steps, &mut problems);
        problems
    }

    /// Total number of steps, nested ones included.
    pub fn step_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps
                .iter()
                .map(|s| match s {
                    Step::Unpack { steps, .. } => 1 + count(steps),
                    _ => 1,
                })
                .sum()
        }
        count(&self.steps)
    }

    /// Render the step tree as indented text, one step per line.
    pub fn outline(&self) -> String {
        fn walk(steps: &[Step], depth: usize, out: &mut String) {
            for step in steps {
                let indent = "  ".repeat(depth);
                match step {
                    Step::Unpack {
                        url,
                        alias,
                        sha256,
                        steps,
                    } => {
                        out.push_str(&format!("{}unpack {}", indent, url));
                        if let Some(alias) = alias {
                            out.push_str(&format!(" -> {}", alias));
                        }
                        if sha256.is_some() {
                            out.push_str(" [sha256]");
                        }
                        out.push('\n');
                        walk(steps, depth + 1, out);
                    }
                    Step::Configure { flags } => {
                        out.push_str(&format!("{}configure", indent));
                        for flag in flags {
                            out.push(' ');
                            out.push_str(flag);
                        }
                        out.push('\n');
                    }
                    Step::Make { target } => {
                        out.push_str(&format!("{}make {}\n", indent, target));
                    }
                }
            }
        }

        let mut out = String::new();
        walk(&self.steps, 0, &mut out);
        out
    }
}

fn is_relative_alias(alias: &str) -> bool {
    let path = Path::new(alias);
    !alias.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)))
}

/// All recipes defined in one file, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
}

impl RecipeBook {
    pub fn parse(input: &str) -> Result<Self, RecipeError> {
        let mut book = RecipeBook::default();
        for form in parser::parse_all(input)? {
            book.add(Recipe::from_expr(&form.expr, form.line)?)?;
        }
        Ok(book)
    }

    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let input = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&input)
    }

    /// Add a recipe; `name`+`version` must be unique within the book.
    pub fn add(&mut self, recipe: Recipe) -> Result<(), RecipeError> {
        if self
            .recipes
            .iter()
            .any(|r| r.name == recipe.name && r.version == recipe.version)
        {
            return Err(RecipeError::Duplicate {
                name: recipe.name,
                version: recipe.version,
            });
        }
        self.recipes.push(recipe);
        Ok(())
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&Recipe> {
        self.recipes
            .iter()
            .find(|r| r.name == name && r.version == version)
    }

    /// Every version of `name`, in declaration order.
    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Recipe> + 'a {
        self.recipes.iter().filter(move |r| r.name == name)
    }

    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LLVM: &str = r#"
(recipe "llvm" "2.8"
  (description "LLVM with clang")
  (unpack "http://llvm.org/releases/${version}/llvm-${version}.tgz"
    (unpack "http://llvm.org/releases/${version}/clang-${version}.tgz"
      (as "tools/clang"))
    (configure)
    (make install)))
"#;

    #[test]
    fn test_parse_llvm() {
        let recipe = Recipe::parse(LLVM).unwrap();
        assert_eq!(recipe.name, "llvm");
        assert_eq!(recipe.version, "2.8");
        assert_eq!(recipe.description.as_deref(), Some("LLVM with clang"));
        assert_eq!(
            recipe.steps,
            vec![Step::Unpack {
                url: "http://llvm.org/releases/${version}/llvm-${version}.tgz".into(),
                alias: None,
                sha256: None,
                steps: vec![
                    Step::Unpack {
                        url: "http://llvm.org/releases/${version}/clang-${version}.tgz".into(),
                        alias: Some("tools/clang".into()),
                        sha256: None,
                        steps: vec![],
                    },
                    Step::configure(Vec::<String>::new()),
                    Step::make("install"),
                ],
            }]
        );
        assert_eq!(recipe.step_count(), 4);
        assert_eq!(recipe.id(), "llvm-2.8");
    }

    #[test]
    fn test_builder_matches_parsed() {
        let parsed = Recipe::parse(
            r#"(recipe "zlib" "1.2.5"
                 (unpack "http://zlib.net/zlib-${version}.tar.gz")
                 (configure "--static")
                 (make))"#,
        )
        .unwrap();
        let built = Recipe::new("zlib", "1.2.5").with_steps(vec![
            Step::unpack("http://zlib.net/zlib-${version}.tar.gz"),
            Step::configure(["--static"]),
            Step::make(DEFAULT_MAKE_TARGET),
        ]);
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_make_defaults_to_install() {
        let recipe = Recipe::parse(r#"(recipe "x" "1" (make))"#).unwrap();
        assert_eq!(recipe.steps, vec![Step::make(DEFAULT_MAKE_TARGET)]);
    }

    #[test]
    fn test_make_rejects_two_targets() {
        let err = Recipe::parse(r#"(recipe "x" "1" (make all install))"#).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidForm { .. }));
    }

    #[test]
    fn test_configure_flags_keep_order() {
        let recipe =
            Recipe::parse(r#"(recipe "x" "1" (configure "--b" --a "--c=${pwd}"))"#).unwrap();
        assert_eq!(recipe.steps, vec![Step::configure(["--b", "--a", "--c=${pwd}"])]);
    }

    #[test]
    fn test_sha256_is_validated_and_lowercased() {
        let hash = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";
        let recipe = Recipe::parse(&format!(
            r#"(recipe "x" "1" (unpack "file:///a.tar" (sha256 "{hash}")))"#
        ))
        .unwrap();
        match &recipe.steps[0] {
            Step::Unpack { sha256, .. } => {
                assert_eq!(sha256.as_deref(), Some(hash.to_ascii_lowercase().as_str()))
            }
            other => panic!("unexpected step {:?}", other),
        }

        let err = Recipe::parse(r#"(recipe "x" "1" (unpack "u" (sha256 "abc")))"#).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidForm { .. }));
    }

    #[test]
    fn test_alias_must_be_relative() {
        for alias in ["/abs/path", "../escape", "tools/../../x", ""] {
            let input = format!(r#"(recipe "x" "1" (unpack "u" (as "{alias}")))"#);
            let err = Recipe::parse(&input).unwrap_err();
            assert!(
                matches!(err, RecipeError::InvalidAlias { .. }),
                "alias {:?} gave {:?}",
                alias,
                err
            );
        }
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err =
            Recipe::parse(r#"(recipe "x" "1" (unpack "u" (as "a") (as "b")))"#).unwrap_err();
        assert!(matches!(err, RecipeError::InvalidForm { .. }));
    }

    #[test]
    fn test_unknown_form() {
        let err = Recipe::parse(r#"(recipe "x" "1" (cmake ".."))"#).unwrap_err();
        assert!(matches!(err, RecipeError::UnknownForm { ref form, .. } if form == "(cmake ..)"));
    }

    #[test]
    fn test_not_a_recipe_reports_line() {
        let err = RecipeBook::parse("\n\n(package \"x\" \"1\")").unwrap_err();
        assert!(matches!(err, RecipeError::NotARecipe { line: 3, .. }));
    }

    #[test]
    fn test_missing_version() {
        let err = Recipe::parse(r#"(recipe "x")"#).unwrap_err();
        assert!(matches!(err, RecipeError::MissingVersion { ref name } if name == "x"));
    }

    #[test]
    fn test_book_rejects_duplicates() {
        let input = r#"(recipe "a" "1") (recipe "a" "2") (recipe "a" "1")"#;
        let err = RecipeBook::parse(input).unwrap_err();
        assert!(matches!(
            err,
            RecipeError::Duplicate { ref name, ref version } if name == "a" && version == "1"
        ));
    }

    #[test]
    fn test_book_keeps_order() {
        let book = RecipeBook::parse(r#"(recipe "b" "1") (recipe "a" "1")"#).unwrap();
        let names: Vec<_> = book.recipes().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        assert!(book.get("a", "1").is_some());
        assert!(book.get("a", "2").is_none());
        assert!(book.get("c", "1").is_none());
    }

    #[test]
    fn test_book_lookup_by_version() {
        let book = RecipeBook::parse(
            r#"(recipe "libevent" "1.4.14b" (make))
               (recipe "zlib" "1.2.5" (make))
               (recipe "libevent" "2.0.10" (make check))"#,
        )
        .unwrap();

        let newer = book.get("libevent", "2.0.10").unwrap();
        assert_eq!(newer.steps, vec![Step::make("check")]);

        let versions: Vec<_> = book.named("libevent").map(|r| r.version.as_str()).collect();
        assert_eq!(versions, ["1.4.14b", "2.0.10"]);
        assert_eq!(book.named("redis").count(), 0);
    }

    #[test]
    fn test_check_reports_unknown_variables() {
        let recipe = Recipe::parse(
            r#"(recipe "x" "1"
                 (unpack "http://e/${vresion}.tgz"
                   (configure "--prefix=${prefix}" "--x=${nope}")))"#,
        )
        .unwrap();
        let problems = recipe.check();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].template, "http://e/${vresion}.tgz");
        assert_eq!(problems[1].template, "--x=${nope}");
    }

    #[test]
    fn test_outline() {
        let recipe = Recipe::parse(LLVM).unwrap();
        assert_eq!(
            recipe.outline(),
            "unpack http://llvm.org/releases/${version}/llvm-${version}.tgz\n\
             \x20 unpack http://llvm.org/releases/${version}/clang-${version}.tgz -> tools/clang\n\
             \x20 configure\n\
             \x20 make install\n"
        );
    }
}
