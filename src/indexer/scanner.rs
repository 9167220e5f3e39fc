//! Filesystem enumeration and content fingerprints.
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::loader::FileReadError;

/// Extensions (lower-case, without the dot) that are read and indexed.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "pdf", "csv", "json", "mmd"];

const BLOCK_SIZE: usize = 8192;

/// Every regular file found under one scan root.
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    pub root: PathBuf,
    pub root_missing: bool,
    /// Sorted.
    pub discovered: Vec<PathBuf>,
}

impl Enumeration {
    /// Discovered files whose extension is on the allow-list.
    pub fn supported(&self) -> impl Iterator<Item = &PathBuf> {
        self.discovered.iter().filter(|p| is_supported(p))
    }

    /// Keys of every discovered file, supported or not.
    #[must_use]
    pub fn discovered_keys(&self) -> HashSet<String> {
        self.discovered.iter().map(|p| path_key(p)).collect()
    }
}

/// Recursively list every regular file under `root`.
///
/// Hidden files are included and ignore files are not honoured. A missing
/// root produces an empty enumeration flagged `root_missing`.
#[must_use]
pub fn enumerate(root: &Path) -> Enumeration {
    let root = resolve_root(root);

    if !root.is_dir() {
        warn!("Scan root {} does not exist", root.display());
        return Enumeration {
            root,
            root_missing: true,
            discovered: Vec::new(),
        };
    }

    let walker = WalkBuilder::new(&root)
        .standard_filters(false)
        .follow_links(false)
        .build();

    let mut discovered = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_some_and(|t| t.is_file()) {
                    discovered.push(entry.into_path());
                }
            }
            Err(e) => warn!("Skipping unreadable entry under {}: {e}", root.display()),
        }
    }
    discovered.sort();

    debug!("Discovered {} files under {}", discovered.len(), root.display());

    Enumeration {
        root,
        root_missing: false,
        discovered,
    }
}

/// Absolute form of a scan root; symlinks are resolved when the root exists.
#[must_use]
pub fn resolve_root(root: &Path) -> PathBuf {
    std::fs::canonicalize(root)
        .or_else(|_| std::path::absolute(root))
        .unwrap_or_else(|_| root.to_path_buf())
}

#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// String key of a path as stored in chunk metadata, `/`-separated.
#[must_use]
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// SHA-256 of the file's bytes as lowercase hex, read in 8 KiB blocks.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BLOCK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// A file as seen by one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub key: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub extension: String,
}

impl FileRecord {
    pub fn capture(path: &Path) -> Result<Self, FileReadError> {
        let io_err = |source| FileReadError::Io {
            path: path.to_path_buf(),
            source,
        };

        let meta = std::fs::metadata(path).map_err(io_err)?;
        let modified_at: DateTime<Utc> = meta.modified().map_err(io_err)?.into();
        let created_at = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified_at);

        Ok(Self {
            path: path.to_path_buf(),
            key: path_key(path),
            fingerprint: fingerprint(path).map_err(io_err)?,
            created_at,
            modified_at,
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.clone())
    }
}
