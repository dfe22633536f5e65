use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::SeekerError;

const SEQUENCE_EXTENSIONS: &[&str] = &["fna", "fa", "fasta", "fas"];

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<(), SeekerError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        SeekerError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| SeekerError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(SeekerError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn validate_zip(zip_path: &Path) -> Result<(), SeekerError> {
    let file = fs::File::open(zip_path).map_err(|err| {
        SeekerError::Filesystem(format!("open zip {}: {err}", zip_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| SeekerError::Filesystem(err.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        io::copy(&mut entry, &mut io::sink())
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

pub fn clear_dir(dir: &Path) -> Result<(), SeekerError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    }
    fs::create_dir_all(dir).map_err(|err| SeekerError::Filesystem(err.to_string()))
}

/// Refuse a non-empty `dir` that holds no previous genome package
/// (`ncbi_dataset/`), so clearing it only discards our own output.
pub fn ensure_replaceable_dir(dir: &Path) -> Result<(), SeekerError> {
    let mut entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(SeekerError::Filesystem(err.to_string())),
    };
    if entries.next().is_none() || dir.join("ncbi_dataset").is_dir() {
        return Ok(());
    }
    Err(SeekerError::OutputDirNotEmpty(dir.to_path_buf()))
}

pub fn find_sequence_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        if let Ok(entries) = fs::read_dir(&path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if is_sequence_file(&path) {
                    out.push(path);
                }
            }
        }
    }
    out.sort();
    out
}

fn is_sequence_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|value| value.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    SEQUENCE_EXTENSIONS
        .iter()
        .any(|ext| name.rsplit_once('.').is_some_and(|(_, found)| found == *ext))
}
