use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, SynthError};

/// A local directory copied into the assembly output ahead of packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Location relative to the assembly root, as referenced by templates.
    pub relative_path: String,
    /// SHA-256 over the relative paths and contents of every staged file.
    pub hash: String,
    pub file_count: usize,
}

/// Copy `source` to `<assembly_root>/<relative_dest>/<source dir name>`.
///
/// The destination is recreated on every call so that files removed from
/// `source` do not linger in the staged copy.
pub fn stage_directory(
    source: &Path,
    assembly_root: &Path,
    relative_dest: &str,
) -> Result<StagedAsset> {
    let dir_name = source
        .file_name()
        .ok_or_else(|| SynthError::Asset {
            path: source.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "asset source must name a directory",
            ),
        })?
        .to_owned();

    let stage_root = assembly_root.join(relative_dest);
    if stage_root.exists() {
        fs::remove_dir_all(&stage_root).map_err(|error| asset_error(&stage_root, error))?;
    }
    let target = stage_root.join(&dir_name);

    let mut files = Vec::new();
    copy_tree(source, &target, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relative in &files {
        hasher.update(relative.to_string_lossy().as_bytes());
        let body =
            fs::read(target.join(relative)).map_err(|error| asset_error(&target, error))?;
        hasher.update(&body);
    }

    let staged = StagedAsset {
        relative_path: relative_dest.trim_matches('/').to_string(),
        hash: format!("{:x}", hasher.finalize()),
        file_count: files.len(),
    };
    info!(
        source = %source.display(),
        staged = %stage_root.display(),
        files = staged.file_count,
        "staged asset directory"
    );
    Ok(staged)
}

fn copy_tree(source: &Path, target: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    copy_tree_inner(source, target, Path::new(""), files)
}

fn copy_tree_inner(
    source: &Path,
    target: &Path,
    relative: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    fs::create_dir_all(target).map_err(|error| asset_error(target, error))?;
    let entries = fs::read_dir(source).map_err(|error| asset_error(source, error))?;
    for entry in entries {
        let entry = entry.map_err(|error| asset_error(source, error))?;
        let path = entry.path();
        let name = entry.file_name();
        let destination = target.join(&name);
        let relative_child = relative.join(&name);
        if path.is_dir() {
            copy_tree_inner(&path, &destination, &relative_child, files)?;
        } else {
            fs::copy(&path, &destination).map_err(|error| asset_error(&path, error))?;
            files.push(relative_child);
        }
    }
    Ok(())
}

fn asset_error(path: &Path, source: std::io::Error) -> SynthError {
    SynthError::Asset {
        path: path.display().to_string(),
        source,
    }
}
