//! Recipe executor - walks a recipe's step tree.
//!
//! Steps run strictly in order. Each `unpack` pushes the directory it
//! produced onto the [`ExecutionContext`] stack for the duration of its
//! nested steps; `configure` and `make` run in whatever directory is on top.
//! Templates are checked before the first step, and the first failing step
//! aborts the rest of the recipe.

mod context;
mod error;
pub mod lock;

pub use context::{Context, ExecutionContext};
pub use error::{BuildError, ErrorKind};

use std::path::PathBuf;

use crate::helpers::extract::{ArchiveExtractor, ExtractTarget, Extractor};
use crate::helpers::fetch::{self, Fetcher, HttpFetcher};
use crate::helpers::process::{CommandLine, ProcessRunner, SystemRunner};
use crate::output;
use crate::template::{self, Vars};
use crate::{Recipe, Step};

/// Recipe executor, generic over its fetch/extract/process collaborators.
pub struct Executor {
    ctx: Context,
    fetcher: Box<dyn Fetcher>,
    extractor: Box<dyn Extractor>,
    runner: Box<dyn ProcessRunner>,
}

impl Executor {
    /// Create an executor using the host collaborators configured by `ctx`.
    pub fn new(ctx: Context) -> Self {
        let fetcher = HttpFetcher::new(&ctx.cache_dir)
            .timeout(ctx.http_timeout)
            .retries(ctx.fetch_retries)
            .dry_run(ctx.dry_run);
        let extractor = ArchiveExtractor::new().dry_run(ctx.dry_run);
        let runner = SystemRunner::new()
            .dry_run(ctx.dry_run)
            .verbose(ctx.verbose);

        Self {
            ctx,
            fetcher: Box::new(fetcher),
            extractor: Box::new(extractor),
            runner: Box::new(runner),
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_runner(mut self, runner: impl ProcessRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Root directory a recipe builds in.
    pub fn root_for(&self, recipe: &Recipe) -> PathBuf {
        self.ctx.root_for(recipe)
    }

    /// Execute a complete recipe in its own root directory.
    pub fn execute(&self, recipe: &Recipe) -> Result<(), BuildError> {
        preflight(recipe)?;
        let root = self.root_for(recipe);

        let _lock = if self.ctx.dry_run {
            None
        } else {
            let lock = lock::acquire(recipe, &root)?;
            std::fs::create_dir_all(&root).map_err(|source| BuildError::Io {
                path: root.clone(),
                source,
            })?;
            Some(lock)
        };

        let mut exec = ExecutionContext::new(recipe, root);
        self.run_recipe(recipe, &mut exec)
    }

    /// Execute a recipe against a caller-owned context.
    pub fn execute_in(
        &self,
        recipe: &Recipe,
        exec: &mut ExecutionContext,
    ) -> Result<(), BuildError> {
        preflight(recipe)?;
        self.run_recipe(recipe, exec)
    }

    fn run_recipe(&self, recipe: &Recipe, exec: &mut ExecutionContext) -> Result<(), BuildError> {
        output::action(&format!("Building {} {}", recipe.name, recipe.version));
        if self.ctx.verbose {
            output::detail(&format!("root: {}", exec.root().display()));
        }

        self.run_steps(&recipe.steps, exec)?;

        output::success(&format!("{} {} built", recipe.name, recipe.version));
        Ok(())
    }

    /// Execute recipes one at a time, stopping at the first failure.
    pub fn execute_all<'a>(
        &self,
        recipes: impl IntoIterator<Item = &'a Recipe>,
    ) -> Result<(), BuildError> {
        let recipes: Vec<&Recipe> = recipes.into_iter().collect();
        let total = recipes.len();
        for (i, recipe) in recipes.into_iter().enumerate() {
            if total > 1 {
                output::action_numbered(i + 1, total, &recipe.id());
            }
            self.execute(recipe)?;
        }
        Ok(())
    }

    fn run_steps(&self, steps: &[Step], exec: &mut ExecutionContext) -> Result<(), BuildError> {
        for step in steps {
            self.run_step(step, exec)?;
        }
        Ok(())
    }

    fn run_step(&self, step: &Step, exec: &mut ExecutionContext) -> Result<(), BuildError> {
        let depth = exec.depth() - 1;
        match step {
            Step::Unpack {
                url,
                alias,
                sha256,
                steps,
            } => {
                let dir = self.unpack(url, alias.as_deref(), sha256.as_deref(), exec)?;
                exec.scoped(dir, |inner| self.run_steps(steps, inner))
            }
            Step::Configure { flags } => {
                let vars = exec.vars(&self.ctx);
                let flags = flags
                    .iter()
                    .map(|flag| render(flag, &vars))
                    .collect::<Result<Vec<_>, _>>()?;
                let cmd = CommandLine::new("./configure").args(flags);
                output::step(depth, format!("configure {}", cmd.args.join(" ")).trim_end());
                self.run(&cmd, exec)
            }
            Step::Make { target } => {
                let mut cmd = CommandLine::new("make");
                if let Some(jobs) = self.ctx.jobs {
                    cmd = cmd.arg(format!("-j{}", jobs));
                }
                let cmd = cmd.arg(target.as_str());
                output::step(depth, &format!("make {}", target));
                self.run(&cmd, exec)
            }
        }
    }

    /// Fetch, verify and extract one archive; returns the extracted directory.
    fn unpack(
        &self,
        url: &str,
        alias: Option<&str>,
        sha256: Option<&str>,
        exec: &ExecutionContext,
    ) -> Result<PathBuf, BuildError> {
        let url = render(url, &exec.vars(&self.ctx))?;
        output::step(exec.depth() - 1, &format!("unpack {}", fetch::url_filename(&url)));

        let archive = self.fetcher.fetch(&url).map_err(|source| BuildError::Fetch {
            url: url.clone(),
            source,
        })?;

        if let Some(expected) = sha256
            && !self.ctx.dry_run
            && let Err(source) = fetch::verify_sha256(&archive, expected)
        {
            self.fetcher.evict(&url);
            return Err(BuildError::Fetch { url, source });
        }

        let target = match alias {
            Some(alias) => ExtractTarget::At(exec.current_dir().join(alias)),
            None => ExtractTarget::Under(exec.root().to_path_buf()),
        };

        self.extractor
            .extract(&archive, &target)
            .map_err(|source| BuildError::Extract { archive, source })
    }

    fn run(&self, cmd: &CommandLine, exec: &ExecutionContext) -> Result<(), BuildError> {
        let cwd = exec.current_dir();
        let out = self.runner.run(cmd, cwd)?;
        if out.is_success() {
            Ok(())
        } else {
            Err(BuildError::Process {
                command: cmd.to_string(),
                cwd: cwd.to_path_buf(),
                status: out.status,
                output: out.combined(),
            })
        }
    }
}

/// Reject a recipe with a bad template before any step runs.
fn preflight(recipe: &Recipe) -> Result<(), BuildError> {
    match recipe.check().into_iter().next() {
        Some(problem) => Err(BuildError::Substitution {
            template: problem.template,
            source: problem.error,
        }),
        None => Ok(()),
    }
}

fn render(template: &str, vars: &Vars) -> Result<String, BuildError> {
    template::render(template, vars).map_err(|source| BuildError::Substitution {
        template: template.to_string(),
        source,
    })
}
