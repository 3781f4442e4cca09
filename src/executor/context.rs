//! Run configuration and the per-recipe execution context.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::helpers::fetch::{DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS};
use crate::template::Vars;
use crate::Recipe;

/// Configuration shared by every recipe run.
#[derive(Debug, Clone)]
pub struct Context {
    /// Installation prefix, exposed to recipes as `${prefix}`
    pub prefix: PathBuf,
    /// Parent of every recipe root
    pub build_dir: PathBuf,
    /// Download cache
    pub cache_dir: PathBuf,
    /// Parallel make jobs; `None` leaves make's default
    pub jobs: Option<usize>,
    pub http_timeout: Duration,
    pub fetch_retries: u32,
    /// Target architecture (e.g., "x86_64", "aarch64")
    pub arch: String,
    pub nproc: usize,
    /// If true, log actions without performing them
    pub dry_run: bool,
    /// If true, print commands and their output
    pub verbose: bool,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("/usr/local"),
            build_dir: std::env::temp_dir().join("nest-build"),
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("nest/downloads"),
            jobs: None,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            fetch_retries: DEFAULT_RETRIES,
            arch: std::env::consts::ARCH.to_string(),
            nproc: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            dry_run: false,
            verbose: false,
        }
    }
}

impl Context {
    /// Create a context building under `build_dir`.
    pub fn with_build_dir(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            ..Default::default()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Root directory of a recipe: `<build_dir>/<name>-<version>`.
    pub fn root_for(&self, recipe: &Recipe) -> PathBuf {
        self.build_dir.join(recipe.id())
    }
}

/// Mutable state of one recipe run: the working-directory stack.
///
/// The bottom of the stack is the recipe root and is never popped.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    name: String,
    version: String,
    stack: Vec<PathBuf>,
}

impl ExecutionContext {
    pub fn new(recipe: &Recipe, root: impl Into<PathBuf>) -> Self {
        Self {
            name: recipe.name.clone(),
            version: recipe.version.clone(),
            stack: vec![root.into()],
        }
    }

    pub fn root(&self) -> &Path {
        &self.stack[0]
    }

    pub fn current_dir(&self) -> &Path {
        self.stack.last().map(PathBuf::as_path).unwrap_or_else(|| self.root())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of directories on the stack, root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Run `f` with `dir` as the current directory.
    ///
    /// `dir` is popped again whatever `f` returns.
    pub fn scoped<T, E>(
        &mut self,
        dir: PathBuf,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let depth = self.stack.len();
        self.stack.push(dir);
        let result = f(self);
        self.stack.truncate(depth);
        result
    }

    /// Template variables for the current position in the run.
    pub fn vars(&self, ctx: &Context) -> Vars {
        Vars::new()
            .with("name", self.name.as_str())
            .with("version", self.version.as_str())
            .with("root", self.root().display().to_string())
            .with("pwd", self.current_dir().display().to_string())
            .with("prefix", ctx.prefix.display().to_string())
            .with("build_dir", ctx.build_dir.display().to_string())
            .with("nproc", ctx.nproc.to_string())
            .with("arch", ctx.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec() -> ExecutionContext {
        ExecutionContext::new(&Recipe::new("llvm", "2.8"), "/build/llvm-2.8")
    }

    #[test]
    fn test_context_default() {
        let ctx = Context::default();
        assert_eq!(ctx.prefix, PathBuf::from("/usr/local"));
        assert!(ctx.jobs.is_none());
        assert!(!ctx.dry_run);
        assert!(ctx.nproc >= 1);
    }

    #[test]
    fn test_context_builder() {
        let ctx = Context::with_build_dir("/b")
            .prefix("/opt/app")
            .cache_dir("/c")
            .jobs(Some(4))
            .arch("aarch64")
            .dry_run(true)
            .verbose(true);
        assert_eq!(ctx.build_dir, PathBuf::from("/b"));
        assert_eq!(ctx.prefix, PathBuf::from("/opt/app"));
        assert_eq!(ctx.cache_dir, PathBuf::from("/c"));
        assert_eq!(ctx.jobs, Some(4));
        assert_eq!(ctx.arch, "aarch64");
        assert!(ctx.dry_run && ctx.verbose);
    }

    #[test]
    fn test_root_for() {
        let ctx = Context::with_build_dir("/b");
        assert_eq!(
            ctx.root_for(&Recipe::new("memcached", "1.4.5")),
            PathBuf::from("/b/memcached-1.4.5")
        );
    }

    #[test]
    fn test_new_context_starts_at_root() {
        let exec = exec();
        assert_eq!(exec.depth(), 1);
        assert_eq!(exec.version(), "2.8");
        assert_eq!(exec.current_dir(), Path::new("/build/llvm-2.8"));
        assert_eq!(exec.root(), exec.current_dir());
    }

    #[test]
    fn test_scoped_pops_on_success() {
        let mut exec = exec();
        let seen = exec
            .scoped::<_, ()>(PathBuf::from("/build/llvm-2.8/llvm-2.8"), |e| {
                Ok((e.depth(), e.current_dir().to_path_buf()))
            })
            .unwrap();
        assert_eq!(seen, (2, PathBuf::from("/build/llvm-2.8/llvm-2.8")));
        assert_eq!(exec.depth(), 1);
    }

    #[test]
    fn test_scoped_pops_on_nested_failure() {
        let mut exec = exec();
        let result: Result<(), &str> = exec.scoped(PathBuf::from("/a"), |e| {
            e.scoped(PathBuf::from("/a/b"), |inner| {
                assert_eq!(inner.depth(), 3);
                Err("boom")
            })
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(exec.depth(), 1);
        assert_eq!(exec.current_dir(), Path::new("/build/llvm-2.8"));
    }

    #[test]
    fn test_vars_follow_current_dir() {
        let ctx = Context::with_build_dir("/build").prefix("/opt");
        let mut exec = exec();
        assert_eq!(exec.vars(&ctx).get("pwd"), Some("/build/llvm-2.8"));
        exec.scoped::<_, ()>(PathBuf::from("/build/llvm-2.8/src"), |e| {
            let vars = e.vars(&ctx);
            assert_eq!(vars.get("pwd"), Some("/build/llvm-2.8/src"));
            assert_eq!(vars.get("root"), Some("/build/llvm-2.8"));
            assert_eq!(vars.get("version"), Some("2.8"));
            assert_eq!(vars.get("name"), Some("llvm"));
            assert_eq!(vars.get("prefix"), Some("/opt"));
            Ok(())
        })
        .unwrap();
    }
}
