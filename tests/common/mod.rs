//! Common test utilities: recording stand-ins for the executor's collaborators.
//!
//! Every collaborator appends to a shared [`Journal`], so a test can assert on
//! the exact order of fetches, extractions and commands.

#![allow(dead_code)]

mod fixtures;

pub use fixtures::*;

use recipe_nest::helpers::extract::{archive_stem, ExtractError, ExtractTarget, Extractor};
use recipe_nest::helpers::fetch::{url_filename, FetchError, Fetcher};
use recipe_nest::helpers::process::{CommandLine, ProcessError, ProcessOutput, ProcessRunner};
use recipe_nest::{Context, Executor};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Fetch(String),
    Evict(String),
    Extract { archive: PathBuf, dest: PathBuf },
    Run { command: CommandLine, cwd: PathBuf },
}

pub type Journal = Rc<RefCell<Vec<Event>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// Commands run so far, with the directory each ran in.
pub fn runs(journal: &Journal) -> Vec<(CommandLine, PathBuf)> {
    journal
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Run { command, cwd } => Some((command.clone(), cwd.clone())),
            _ => None,
        })
        .collect()
}

/// Directories produced by extraction, in order.
pub fn extracted(journal: &Journal) -> Vec<PathBuf> {
    journal
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Extract { dest, .. } => Some(dest.clone()),
            _ => None,
        })
        .collect()
}

/// Resolves every URL to `<archive_dir>/<file name>` without touching the network.
pub struct MockFetcher {
    journal: Journal,
    archive_dir: PathBuf,
    fail_on: Option<String>,
}

impl MockFetcher {
    pub fn new(journal: &Journal, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal: journal.clone(),
            archive_dir: archive_dir.into(),
            fail_on: None,
        }
    }

    /// Fail any URL containing `needle` with HTTP 404.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        self.journal.borrow_mut().push(Event::Fetch(url.to_string()));
        if self.fail_on.as_deref().is_some_and(|n| url.contains(n)) {
            return Err(FetchError::Status { status: 404 });
        }
        Ok(self.archive_dir.join(url_filename(url)))
    }

    fn evict(&self, url: &str) {
        self.journal.borrow_mut().push(Event::Evict(url.to_string()));
    }
}

/// Reports the directory a real extraction would produce, without unpacking.
pub struct MockExtractor {
    journal: Journal,
    fail_on: Option<String>,
}

impl MockExtractor {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_on: None,
        }
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

impl Extractor for MockExtractor {
    fn extract(&self, archive: &Path, target: &ExtractTarget) -> Result<PathBuf, ExtractError> {
        let file_name = archive
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_on.as_deref().is_some_and(|n| file_name.contains(n)) {
            return Err(ExtractError::Empty(archive.to_path_buf()));
        }

        let dest = match target {
            ExtractTarget::Under(dir) => dir.join(archive_stem(&file_name)),
            ExtractTarget::At(path) => path.clone(),
        };
        self.journal.borrow_mut().push(Event::Extract {
            archive: archive.to_path_buf(),
            dest: dest.clone(),
        });
        Ok(dest)
    }
}

/// Records commands instead of running them.
pub struct RecordingRunner {
    journal: Journal,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
            fail_on: None,
        }
    }

    /// Exit with status 2 for any command line containing `needle`.
    pub fn fail_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(&self, command: &CommandLine, cwd: &Path) -> Result<ProcessOutput, ProcessError> {
        let line = command.to_string();
        self.journal.borrow_mut().push(Event::Run {
            command: command.clone(),
            cwd: cwd.to_path_buf(),
        });
        if self.fail_on.as_deref().is_some_and(|n| line.contains(n)) {
            return Ok(ProcessOutput::failed(2, "error: boom"));
        }
        Ok(ProcessOutput::success())
    }
}

/// Build a command line from a program and string arguments.
pub fn cmd(program: &str, args: &[&str]) -> CommandLine {
    CommandLine::new(program).args(args.iter().copied())
}

/// Executor wired entirely to recording stand-ins.
pub fn mock_executor(ctx: Context, journal: &Journal) -> Executor {
    Executor::new(ctx)
        .with_fetcher(MockFetcher::new(journal, "/archives"))
        .with_extractor(MockExtractor::new(journal))
        .with_runner(RecordingRunner::new(journal))
}
