//! Declarative build recipes for source packages.
//!
//! A recipe names a package and version and describes how to build it as a
//! tree of steps: `unpack` an archive (optionally nested), `configure`, and
//! `make`. Recipes are S-expressions, so they are data and never run code of
//! their own.
//!
//! # Example Recipe
//!
//! ```lisp
//! (recipe "llvm" "2.8"
//!   (description "LLVM compiler infrastructure")
//!   (unpack "http://llvm.org/releases/${version}/llvm-${version}.tgz"
//!     (unpack "http://llvm.org/releases/${version}/clang-${version}.tgz"
//!       (as "tools/clang"))
//!     (configure "--prefix=${prefix}")
//!     (make install)))
//! ```
//!
//! # Steps
//!
//! - `(unpack URL [(as PATH)] [(sha256 HEX)] STEPS...)` - Download and
//!   extract an archive, then run the nested steps inside it. Without `as`
//!   the archive lands in the recipe root; with `as` it lands at `PATH`
//!   relative to the enclosing directory.
//! - `(configure FLAGS...)` - Run `./configure FLAGS...`
//! - `(make [TARGET])` - Run `make TARGET` (default `install`)
//!
//! # Variables Available in Templates
//!
//! URLs and configure flags may reference `${name}`, `${version}`,
//! `${root}`, `${pwd}`, `${prefix}`, `${build_dir}`, `${nproc}` and
//! `${arch}`. `$$` is a literal dollar sign.

pub mod ast;
pub mod config;
pub mod executor;
pub mod helpers;
pub mod output;
pub mod parser;
pub mod recipe;
pub mod template;

pub use config::{Config, ConfigError};
pub use executor::{BuildError, Context, ErrorKind, ExecutionContext, Executor};
pub use recipe::{Recipe, RecipeBook, RecipeError, Step};
