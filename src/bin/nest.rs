//! nest - build source packages from declarative recipes
//!
//! Usage:
//!   nest build <file> [--only <name>]...   Build the recipes in a file
//!   nest check <file>                      Parse and check templates
//!   nest show <file>                       Print the step tree

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use recipe_nest::{output, BuildError, Config, Context, Executor, Recipe, RecipeBook};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nest")]
#[command(about = "Build source packages from nested fetch/unpack/configure/make recipes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $XDG_CONFIG_HOME/nest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory recipe roots are created in
    #[arg(short, long, global = true, env = "NEST_BUILD_DIR")]
    build_dir: Option<PathBuf>,

    /// Download cache directory
    #[arg(long, global = true, env = "NEST_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Installation prefix, available to recipes as ${prefix}
    #[arg(short, long, global = true, env = "NEST_PREFIX")]
    prefix: Option<PathBuf>,

    /// Parallel make jobs
    #[arg(short, long, global = true)]
    jobs: Option<NonZeroUsize>,

    /// Print what would happen without downloading or running anything
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Show commands and their output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every recipe in a file, in order
    Build {
        /// Recipe file
        file: PathBuf,

        /// Only build the named recipe (repeatable)
        #[arg(long = "only", value_name = "NAME")]
        only: Vec<String>,
    },

    /// Parse a recipe file and check its templates
    Check {
        /// Recipe file
        file: PathBuf,
    },

    /// Show the recipes in a file
    Show {
        /// Recipe file
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Build { file, only } => {
            let book = load_book(file)?;
            let recipes = select_recipes(&book, only)?;
            let executor = Executor::new(build_context(&cli)?);
            if executor.context().dry_run {
                output::info("Dry run: nothing will be downloaded, extracted or run");
            }
            executor.execute_all(recipes)?;
        }

        Commands::Check { file } => {
            let book = load_book(file)?;
            let mut failed = 0;
            for recipe in book.recipes() {
                let problems = recipe.check();
                if problems.is_empty() {
                    output::success(&format!(
                        "{} ({} steps)",
                        recipe.id(),
                        recipe.step_count()
                    ));
                } else {
                    failed += 1;
                    output::error(&recipe.id());
                    for problem in problems {
                        output::detail(&problem.to_string());
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} recipe(s) have template errors", failed, book.len());
            }
        }

        Commands::Show { file } => {
            let book = load_book(file)?;
            let ctx = build_context(&cli)?;
            for recipe in book.recipes() {
                show_recipe(recipe, &ctx);
            }
        }
    }

    Ok(())
}

fn load_book(file: &Path) -> Result<RecipeBook> {
    let book = RecipeBook::load(file)
        .with_context(|| format!("Failed to load recipes from {}", file.display()))?;
    if book.is_empty() {
        anyhow::bail!("No recipes found in {}", file.display());
    }
    Ok(book)
}

/// Pick the recipes named by `--only`, in file order; all of them if none.
/// A name selects every version of it the file defines.
fn select_recipes<'a>(book: &'a RecipeBook, only: &[String]) -> Result<Vec<&'a Recipe>> {
    if only.is_empty() {
        return Ok(book.recipes().iter().collect());
    }

    if let Some(missing) = only.iter().find(|name| book.named(name).next().is_none()) {
        let known: Vec<_> = book.recipes().iter().map(|r| r.name.as_str()).collect();
        anyhow::bail!(
            "No recipe named '{}' (available: {})",
            missing,
            known.join(", ")
        );
    }

    Ok(book
        .recipes()
        .iter()
        .filter(|r| only.contains(&r.name))
        .collect())
}

/// Defaults, then the config file, then command-line flags.
fn build_context(cli: &Cli) -> Result<Context> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    config.merge(Config {
        build_dir: cli.build_dir.clone(),
        cache_dir: cli.cache_dir.clone(),
        prefix: cli.prefix.clone(),
        jobs: cli.jobs.map(NonZeroUsize::get),
        ..Default::default()
    });

    Ok(config
        .into_context()
        .dry_run(cli.dry_run)
        .verbose(cli.verbose))
}

fn show_recipe(recipe: &Recipe, ctx: &Context) {
    use owo_colors::OwoColorize;

    println!("{:<12} {}", "Name:".bold(), recipe.name.bold().cyan());
    println!("{:<12} {}", "Version:".bold(), recipe.version.green());
    if let Some(desc) = &recipe.description {
        println!("{:<12} {}", "Description:".bold(), desc);
    }
    if let Some(homepage) = &recipe.homepage {
        println!("{:<12} {}", "Homepage:".bold(), homepage);
    }
    println!(
        "{:<12} {}",
        "Root:".bold(),
        ctx.root_for(recipe).display().to_string().dimmed()
    );
    println!("{}", "Steps:".bold());
    for line in recipe.outline().lines() {
        println!("  {}", line);
    }
    println!();
}

fn report(err: &anyhow::Error) {
    match err.chain().find_map(|e| e.downcast_ref::<BuildError>()) {
        Some(build) => output::error(&format!("{} error: {:#}", build.kind(), err)),
        None => output::error(&format!("{:#}", err)),
    }
}
