//! Input resolution: turn a path or an in-memory upload into a local file
//! the parsers can open.
//!
//! Uploads are written to a managed temp file whose suffix matches the
//! original extension. The file is removed when [`ResolvedInput`] is
//! dropped, even on panic.

use crate::error::DigestError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// Extensions the page parser understands, lower-case with the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".pptx", ".txt", ".md"];

enum Source {
    Local(PathBuf),
    Upload(TempPath),
}

/// A document ready for parsing.
pub struct ResolvedInput {
    source: Source,
    extension: String,
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match &self.source {
            Source::Local(p) => p,
            Source::Upload(tmp) => tmp,
        }
    }

    /// Lower-case extension including the dot, e.g. `.pptx`.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// Check a file name and return its normalized extension.
pub fn validate_filename(name: &str) -> Result<String, DigestError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DigestError::EmptyFilename);
    }
    let extension = Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(DigestError::UnsupportedFileType { extension })
    }
}

/// Validate a local file: supported type, present, readable.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<ResolvedInput, DigestError> {
    let path = path.as_ref().to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = validate_filename(&name)?;

    if !path.is_file() {
        return Err(DigestError::FileNotFound { path });
    }
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DigestError::PermissionDenied { path });
        }
        Err(_) => return Err(DigestError::FileNotFound { path }),
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput {
        source: Source::Local(path),
        extension,
    })
}

/// Persist an upload to a temp file after checking its name and size.
pub fn write_upload(
    bytes: &[u8],
    filename: &str,
    max_bytes: u64,
) -> Result<ResolvedInput, DigestError> {
    let extension = validate_filename(filename)?;
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(DigestError::UploadTooLarge {
            size,
            limit: max_bytes,
        });
    }

    let mut tmp = tempfile::Builder::new()
        .prefix("docsum-")
        .suffix(&extension)
        .tempfile()
        .map_err(|e| DigestError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| DigestError::Internal(format!("tempfile write: {e}")))?;

    let path = tmp.into_temp_path();
    debug!("Upload of {} bytes staged at {}", size, path.display());
    Ok(ResolvedInput {
        source: Source::Upload(path),
        extension,
    })
}
