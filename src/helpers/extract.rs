//! Native archive extraction (no external tools needed).
//!
//! Archives are unpacked into a staging directory next to their final
//! location and then moved into place, so a failed extraction never leaves a
//! half-populated source tree behind.

use crate::output;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot detect archive format: {0}")]
    UnknownFormat(PathBuf),
    #[error("{archive}: {message}")]
    Corrupt { archive: PathBuf, message: String },
    #[error("{archive}: refusing unsafe entry: {message}")]
    Unsafe { archive: PathBuf, message: String },
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where an extracted archive should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractTarget {
    /// Inside this directory, under the archive's own top-level name.
    Under(PathBuf),
    /// Exactly at this path, replacing the archive's top-level name.
    At(PathBuf),
}

/// Unpacks an archive and reports the directory it produced.
pub trait Extractor {
    fn extract(&self, archive: &Path, target: &ExtractTarget) -> Result<PathBuf, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    TarBz2,
    TarZst,
    Tar,
    Zip,
}

const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tgz", ArchiveFormat::TarGz),
    (".tar.xz", ArchiveFormat::TarXz),
    (".txz", ArchiveFormat::TarXz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tar.zst", ArchiveFormat::TarZst),
    (".tzst", ArchiveFormat::TarZst),
    (".tar", ArchiveFormat::Tar),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Detect the format from a file name extension.
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, format)| *format)
    }
}

/// File name without its archive extension: `llvm-2.8.tgz` -> `llvm-2.8`.
pub fn archive_stem(file_name: &str) -> &str {
    let lower = file_name.to_lowercase();
    SUFFIXES
        .iter()
        .find(|(suffix, _)| lower.ends_with(suffix) && lower.len() > suffix.len())
        .map(|(suffix, _)| &file_name[..file_name.len() - suffix.len()])
        .unwrap_or(file_name)
}

/// Extracts tar (plain, gz, xz, bz2, zst) and zip archives.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    dry_run: bool,
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predict the resulting directory without touching the filesystem.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Extractor for ArchiveExtractor {
    fn extract(&self, archive: &Path, target: &ExtractTarget) -> Result<PathBuf, ExtractError> {
        let file_name = archive
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = ArchiveFormat::detect(&file_name)
            .ok_or_else(|| ExtractError::UnknownFormat(archive.to_path_buf()))?;
        let stem = archive_stem(&file_name).to_string();

        if self.dry_run {
            let dest = match target {
                ExtractTarget::Under(dir) => dir.join(&stem),
                ExtractTarget::At(path) => path.clone(),
            };
            output::command("dry-run", &format!("extract {} -> {}", file_name, dest.display()));
            return Ok(dest);
        }

        let parent = match target {
            ExtractTarget::Under(dir) => dir.clone(),
            ExtractTarget::At(path) => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        std::fs::create_dir_all(&parent).map_err(|e| ExtractError::io(&parent, e))?;

        let staging = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(&parent)
            .map_err(|e| ExtractError::io(&parent, e))?;

        let pb = output::spinner(&format!("extracting {}", file_name));
        let unpacked = unpack(format, archive, staging.path());
        pb.finish_and_clear();
        unpacked?;

        let entries: Vec<PathBuf> = std::fs::read_dir(staging.path())
            .map_err(|e| ExtractError::io(staging.path(), e))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()
            .map_err(|e| ExtractError::io(staging.path(), e))?;

        let (source, top_name) = match entries.as_slice() {
            [] => return Err(ExtractError::Empty(archive.to_path_buf())),
            [single] if single.is_dir() && !is_symlink(single) => {
                let name = single
                    .file_name()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| stem.clone());
                (Some(single.clone()), name)
            }
            _ => (None, stem.clone()),
        };

        let dest = match target {
            ExtractTarget::Under(dir) => dir.join(&top_name),
            ExtractTarget::At(path) => path.clone(),
        };

        if dest.exists() {
            output::detail(&format!("replacing existing {}", dest.display()));
            std::fs::remove_dir_all(&dest).map_err(|e| ExtractError::io(&dest, e))?;
        }

        match source {
            Some(dir) => std::fs::rename(&dir, &dest).map_err(|e| ExtractError::io(&dest, e))?,
            None => {
                std::fs::create_dir_all(&dest).map_err(|e| ExtractError::io(&dest, e))?;
                for entry in &entries {
                    let name = entry.file_name().unwrap_or_default();
                    std::fs::rename(entry, dest.join(name))
                        .map_err(|e| ExtractError::io(entry, e))?;
                }
            }
        }

        output::detail(&format!("extracted {} to {}", file_name, dest.display()));
        Ok(dest)
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

fn unpack(format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(|e| ExtractError::io(archive, e))?;
    let reader = BufReader::new(file);

    match format {
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarXz => extract_tar(xz2::read::XzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarBz2 => extract_tar(bzip2::read::BzDecoder::new(reader), archive, dest),
        ArchiveFormat::TarZst => {
            let decoder = zstd::stream::read::Decoder::new(reader)
                .map_err(|e| corrupt(archive, format!("zstd init error: {}", e)))?;
            extract_tar(decoder, archive, dest)
        }
        ArchiveFormat::Tar => extract_tar(reader, archive, dest),
        ArchiveFormat::Zip => extract_zip(archive, dest),
    }
}

fn corrupt(archive: &Path, message: impl Into<String>) -> ExtractError {
    ExtractError::Corrupt {
        archive: archive.to_path_buf(),
        message: message.into(),
    }
}

fn unsafe_entry(archive: &Path, message: impl Into<String>) -> ExtractError {
    ExtractError::Unsafe {
        archive: archive.to_path_buf(),
        message: message.into(),
    }
}

/// Lexically normalize a path without touching the filesystem.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut has_root = false;

    for c in path.components() {
        match c {
            Component::Prefix(p) => {
                out.clear();
                out.push(p.as_os_str());
                has_root = true;
            }
            Component::RootDir => {
                out.push(Component::RootDir.as_os_str());
                has_root = true;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = out
                    .components()
                    .next_back()
                    .is_some_and(|last| matches!(last, Component::Normal(_)));
                if popped {
                    out.pop();
                } else if !has_root {
                    out.push("..");
                }
            }
            Component::Normal(seg) => out.push(seg),
        }
    }

    out
}

/// Reject writes through an existing symlink inside `dest`.
fn ensure_no_symlink_components(
    archive: &Path,
    dest: &Path,
    full_path: &Path,
) -> Result<(), ExtractError> {
    let rel = full_path
        .strip_prefix(dest)
        .map_err(|_| unsafe_entry(archive, format!("outside destination: {}", full_path.display())))?;

    let mut cur = dest.to_path_buf();
    for comp in rel.components() {
        cur.push(comp);
        if is_symlink(&cur) {
            return Err(unsafe_entry(
                archive,
                format!("symlink in path component: {}", cur.display()),
            ));
        }
    }
    Ok(())
}

fn ensure_link_target_within_dest(
    archive: &Path,
    dest: &Path,
    link_parent: &Path,
    link_name: &Path,
) -> Result<(), ExtractError> {
    if link_name.is_absolute()
        || link_name
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(unsafe_entry(
            archive,
            format!("absolute link target: {}", link_name.display()),
        ));
    }

    let candidate = normalize_lexical(&link_parent.join(link_name));
    if candidate.strip_prefix(normalize_lexical(dest)).is_err() {
        return Err(unsafe_entry(
            archive,
            format!(
                "link escapes destination: {} -> {}",
                link_parent.display(),
                link_name.display()
            ),
        ));
    }
    Ok(())
}

fn extract_tar<R: Read>(reader: R, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let mut tar = tar::Archive::new(reader);
    let entries = tar
        .entries()
        .map_err(|e| corrupt(archive, format!("tar read error: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| corrupt(archive, format!("tar entry error: {}", e)))?;
        let path = entry
            .path()
            .map_err(|e| corrupt(archive, format!("tar path error: {}", e)))?
            .into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(unsafe_entry(archive, format!("path {}", path.display())));
        }

        // Some archives contain a "." entry.
        if path.as_os_str().is_empty() || path == Path::new(".") {
            continue;
        }

        // pax_global_header and friends carry metadata only.
        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            continue;
        }

        let full_path = dest.join(&path);
        ensure_no_symlink_components(archive, dest, &full_path)?;

        if entry_type == tar::EntryType::Symlink || entry_type == tar::EntryType::Link {
            let link_name = entry
                .link_name()
                .map_err(|e| corrupt(archive, format!("tar link_name error: {}", e)))?
                .ok_or_else(|| unsafe_entry(archive, format!("link without target: {}", path.display())))?;
            let link_parent = full_path.parent().unwrap_or(dest);
            if entry_type == tar::EntryType::Link {
                // Hard link targets are relative to the archive root.
                ensure_link_target_within_dest(archive, dest, dest, &link_name)?;
            } else {
                ensure_link_target_within_dest(archive, dest, link_parent, &link_name)?;
            }
        }

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        }

        entry
            .unpack(&full_path)
            .map_err(|e| corrupt(archive, format!("unpack error for {}: {}", path.display(), e)))?;
    }

    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive).map_err(|e| ExtractError::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| corrupt(archive, format!("zip read error: {}", e)))?;

    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|e| corrupt(archive, format!("zip entry error: {}", e)))?;

        let outpath = match file.enclosed_name() {
            Some(path) => dest.join(path),
            None => return Err(unsafe_entry(archive, format!("path {}", file.name()))),
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| ExtractError::io(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ExtractError::io(parent, e))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| ExtractError::io(&outpath, e))?;
        std::io::copy(&mut file, &mut outfile).map_err(|e| ExtractError::io(&outpath, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| ExtractError::io(&outpath, e))?;
            }
        }
    }

    Ok(())
}
