//! Post-hoc archiving of a thread's quarantine folder
//!
//! Password protection needs an external archiver (`7z` by default). When it
//! is missing or fails, the folder is still archived without a password and
//! the caller is told so through [`ArchiveOutcome::UnprotectedFallback`].

use crate::DarkwatchError;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// How a folder ended up archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// No password was requested
    Plain(PathBuf),
    /// Password-protected by the external archiver
    Protected(PathBuf),
    /// A password was requested but could not be applied
    UnprotectedFallback { path: PathBuf, reason: String },
}

impl ArchiveOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Plain(path) | Self::Protected(path) => path,
            Self::UnprotectedFallback { path, .. } => path,
        }
    }
}

/// Archive path for a thread folder: `<folder>.zip`
pub fn archive_path(folder: &Path) -> PathBuf {
    folder.with_extension("zip")
}

/// Archives `folder` into `<folder>.zip`
///
/// # Arguments
///
/// * `folder` - Thread quarantine folder
/// * `password` - Optional archive password
/// * `archiver` - External archiver command used for password protection
///
/// # Returns
///
/// * `Ok(ArchiveOutcome)` - Archive written (check for the fallback variant)
/// * `Err(DarkwatchError)` - Not even the unprotected archive could be written
pub async fn archive_folder(
    folder: &Path,
    password: Option<&str>,
    archiver: &str,
) -> Result<ArchiveOutcome, DarkwatchError> {
    let zip_path = archive_path(folder);

    let reason = match password {
        None => {
            write_zip(folder.to_path_buf(), zip_path.clone()).await?;
            return Ok(ArchiveOutcome::Plain(zip_path));
        }
        Some(password) => match run_archiver(archiver, folder, &zip_path, password).await {
            Ok(()) => return Ok(ArchiveOutcome::Protected(zip_path)),
            Err(reason) => reason,
        },
    };

    tracing::warn!(
        "Password-protected archive unavailable ({}); writing UNPROTECTED archive {}",
        reason,
        zip_path.display()
    );
    let _ = std::fs::remove_file(&zip_path);
    write_zip(folder.to_path_buf(), zip_path.clone()).await?;
    Ok(ArchiveOutcome::UnprotectedFallback {
        path: zip_path,
        reason,
    })
}

/// Runs `<archiver> a -tzip -y -p<password> <zip> .` inside the folder
async fn run_archiver(
    archiver: &str,
    folder: &Path,
    zip_path: &Path,
    password: &str,
) -> Result<(), String> {
    let target = absolute(zip_path).map_err(|e| e.to_string())?;

    let output = Command::new(archiver)
        .arg("a")
        .arg("-tzip")
        .arg("-y")
        .arg(format!("-p{}", password))
        .arg(&target)
        .arg(".")
        .current_dir(folder)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to spawn {}: {}", archiver, e))?
        .wait_with_output()
        .await
        .map_err(|e| format!("failed to wait for {}: {}", archiver, e))?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{} exited with {}: {}", archiver, output.status, stderr.trim()))
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn write_zip(folder: PathBuf, zip_path: PathBuf) -> Result<(), DarkwatchError> {
    tokio::task::spawn_blocking(move || zip_folder(&folder, &zip_path))
        .await
        .map_err(|e| DarkwatchError::Persistence(format!("archive task failed: {}", e)))?
}

/// Writes every file under `folder` into a deflated zip, paths relative to the folder
pub fn zip_folder(folder: &Path, zip_path: &Path) -> Result<(), DarkwatchError> {
    if let Some(parent) = zip_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut files = Vec::new();
    collect_files(folder, &mut files)?;
    files.sort();

    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut buffer = Vec::new();
    for file in files {
        let name = file
            .strip_prefix(folder)
            .unwrap_or(&file)
            .to_string_lossy()
            .replace('\\', "/");
        zip.start_file(name, options)?;
        buffer.clear();
        File::open(&file)?.read_to_end(&mut buffer)?;
        zip.write_all(&buffer)?;
    }

    zip.finish()?;
    Ok(())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
