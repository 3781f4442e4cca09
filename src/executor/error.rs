//! Executor error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::helpers::extract::ExtractError;
use crate::helpers::fetch::FetchError;
use crate::helpers::process::ProcessError;
use crate::output::tail_lines;
use crate::template::TemplateError;

/// Lines of captured output kept in a process failure message.
const OUTPUT_TAIL_LINES: usize = 40;

/// Errors that abort a recipe run.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("cannot extract {archive}: {source}")]
    Extract {
        archive: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("cannot substitute `{template}`: {source}")]
    Substitution {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error(
        "command failed in {cwd}: {command} ({})\n{}",
        describe_status(.status),
        tail_lines(.output, OUTPUT_TAIL_LINES)
    )]
    Process {
        command: String,
        cwd: PathBuf,
        status: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} {version} is already being built by another process (lock: {lock})")]
    Locked {
        name: String,
        version: String,
        lock: PathBuf,
    },
}

/// Category of a [`BuildError`], for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Extract,
    VersionSubstitution,
    Process,
    Io,
    Lock,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Extract => "extract",
            ErrorKind::VersionSubstitution => "version-substitution",
            ErrorKind::Process => "process",
            ErrorKind::Io => "io",
            ErrorKind::Lock => "lock",
        })
    }
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Fetch { .. } => ErrorKind::Fetch,
            BuildError::Extract { .. } => ErrorKind::Extract,
            BuildError::Substitution { .. } => ErrorKind::VersionSubstitution,
            BuildError::Process { .. } | BuildError::Spawn(_) => ErrorKind::Process,
            BuildError::Io { .. } => ErrorKind::Io,
            BuildError::Locked { .. } => ErrorKind::Lock,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}
