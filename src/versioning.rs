//! Versioned document naming.
//!
//! A logical document lives on disk as a family of siblings that share a
//! base name and extension: `report.md`, `report__v1.md`, `report__v2.md`.
//! The unsuffixed file is version 0. Saving never rewrites an existing
//! version; it writes the next one.
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Separator between the base name and the version number.
pub const VERSION_MARKER: &str = "__v";

/// How many times a save re-resolves the next version after losing a race.
const SAVE_ATTEMPTS: usize = 8;

/// Split a path's stem into `(base, version)`.
///
/// Anything after the last marker that is not a plain run of digits is
/// treated as part of the name, so `notes__vdraft.md` is `("notes__vdraft", 0)`.
#[must_use]
pub fn parse_version(path: &Path) -> (String, u64) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some((base, vpart)) = stem.rsplit_once(VERSION_MARKER) {
        if !vpart.is_empty() && vpart.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(version) = vpart.parse::<u64>() {
                return (base.to_string(), version);
            }
        }
    }

    (stem, 0)
}

/// Find the highest-version sibling of `path`.
///
/// Falls back to `path` itself when the directory cannot be read or holds no
/// sibling with the same base and extension. Equal versions (`a__v1`,
/// `a__v01`) resolve to the lexicographically smallest file name.
#[must_use]
pub fn resolve_latest(path: &Path) -> PathBuf {
    let (base, _) = parse_version(path);
    let extension = path.extension();

    let entries = match fs::read_dir(parent_dir(path)) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No siblings for {}: {e}", path.display());
            return path.to_path_buf();
        }
    };

    let mut best: Option<(u64, PathBuf)> = None;

    for entry in entries.flatten() {
        let candidate = entry.path();
        if !candidate.is_file() || candidate.extension() != extension {
            continue;
        }

        let (candidate_base, version) = parse_version(&candidate);
        if candidate_base != base {
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_version, best_path)) => {
                version > *best_version
                    || (version == *best_version && candidate.file_name() < best_path.file_name())
            }
        };
        if better {
            best = Some((version, candidate));
        }
    }

    best.map(|(_, p)| p).unwrap_or_else(|| path.to_path_buf())
}

/// Path for the version after the latest existing sibling of `path`.
///
/// Does not touch the filesystem beyond listing the directory. Returns
/// `None` when the latest version is already `u64::MAX`.
#[must_use]
pub fn next_version_path(path: &Path) -> Option<PathBuf> {
    let latest = resolve_latest(path);
    let (base, version) = parse_version(&latest);
    let next = version.checked_add(1)?;
    Some(versioned_path(&latest, &base, next))
}

/// Write `content` as the next version of `path` and return the new path.
///
/// The content is written to a temporary file in the same directory, synced,
/// and only then linked into place without overwriting, so readers never see
/// a partial version. If a concurrent writer takes the computed version first,
/// the next free version is used instead.
pub fn save_new_version(path: &Path, content: &str) -> io::Result<PathBuf> {
    let dir = parent_dir(path);

    for _ in 0..SAVE_ATTEMPTS {
        let target = next_version_path(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no version left after the latest of {}", path.display()),
            )
        })?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&target) {
            Ok(_) => {
                info!("Saved new version {}", target.display());
                return Ok(target);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} was taken concurrently, retrying", target.display());
            }
            Err(e) => return Err(e.error),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("could not claim a new version for {}", path.display()),
    ))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn versioned_path(like: &Path, base: &str, version: u64) -> PathBuf {
    let file_name = match like.extension().and_then(OsStr::to_str) {
        Some(ext) => format!("{base}{VERSION_MARKER}{version}.{ext}"),
        None => format!("{base}{VERSION_MARKER}{version}"),
    };
    like.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version(Path::new("report.md")), ("report".into(), 0));
        assert_eq!(parse_version(Path::new("report__v3.md")), ("report".into(), 3));
        assert_eq!(
            parse_version(Path::new("/a/b/my__doc__v12.txt")),
            ("my__doc".into(), 12)
        );
    }

    #[test]
    fn test_parse_version_permissive() {
        assert_eq!(
            parse_version(Path::new("notes__vdraft.md")),
            ("notes__vdraft".into(), 0)
        );
        assert_eq!(parse_version(Path::new("notes__v.md")), ("notes__v".into(), 0));
        assert_eq!(
            parse_version(Path::new("notes__v-1.md")),
            ("notes__v-1".into(), 0)
        );
        // Too large for u64
        let huge = "n__v99999999999999999999999.md";
        assert_eq!(parse_version(Path::new(huge)).1, 0);
    }

    #[test]
    fn test_resolve_latest_missing_dir() {
        let p = Path::new("/definitely/not/here/report.md");
        assert_eq!(resolve_latest(p), p);
    }

    #[test]
    fn test_resolve_latest_picks_highest() {
        let dir = tempdir().unwrap();
        for name in ["report.md", "report__v1.md", "report__v4.md", "report__v2.md"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        // Different extension and different base are ignored
        fs::write(dir.path().join("report__v9.txt"), "x").unwrap();
        fs::write(dir.path().join("reports__v9.md"), "x").unwrap();

        let latest = resolve_latest(&dir.path().join("report.md"));
        assert_eq!(latest, dir.path().join("report__v4.md"));

        let from_old = resolve_latest(&dir.path().join("report__v1.md"));
        assert_eq!(from_old, dir.path().join("report__v4.md"));
    }

    #[test]
    fn test_resolve_latest_tie_is_deterministic() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a__v01.md"), "x").unwrap();
        fs::write(dir.path().join("a__v1.md"), "y").unwrap();

        let latest = resolve_latest(&dir.path().join("a.md"));
        assert_eq!(latest, dir.path().join("a__v01.md"));
    }

    #[test]
    fn test_next_version_path() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("plan.md"), "v0").unwrap();
        assert_eq!(
            next_version_path(&dir.path().join("plan.md")),
            Some(dir.path().join("plan__v1.md"))
        );

        fs::write(dir.path().join("plan__v1.md"), "v1").unwrap();
        assert_eq!(
            next_version_path(&dir.path().join("plan.md")),
            Some(dir.path().join("plan__v2.md"))
        );
    }

    #[test]
    fn test_next_version_without_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README"), "x").unwrap();
        assert_eq!(
            next_version_path(&dir.path().join("README")),
            Some(dir.path().join("README__v1"))
        );
    }

    #[test]
    fn test_next_of_latest_is_one_more() {
        let dir = tempdir().unwrap();
        for name in ["notes.md", "notes__v2.md", "notes__v7.md"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        let p = dir.path().join("notes.md");
        let latest = resolve_latest(&p);
        let (_, latest_version) = parse_version(&latest);
        let (_, next_version) = parse_version(&next_version_path(&latest).unwrap());
        assert_eq!(next_version, latest_version + 1);
    }

    #[test]
    fn test_next_version_at_u64_max() {
        let dir = tempdir().unwrap();
        let max = format!("a__v{}.md", u64::MAX);
        fs::write(dir.path().join("a.md"), "base").unwrap();
        fs::write(dir.path().join(&max), "last").unwrap();

        assert_eq!(next_version_path(&dir.path().join(&max)), None);
        assert_eq!(next_version_path(&dir.path().join("a.md")), None);

        let err = save_new_version(&dir.path().join("a.md"), "more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        // Nothing wrapped around to a low version
        assert!(!dir.path().join("a__v0.md").exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_save_new_version_sequence() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("report.md");
        fs::write(&original, "first draft").unwrap();

        let v1 = save_new_version(&original, "second draft").unwrap();
        assert_eq!(v1, dir.path().join("report__v1.md"));
        assert_eq!(fs::read_to_string(&v1).unwrap(), "second draft");

        let v2 = save_new_version(&original, "third draft").unwrap();
        assert_eq!(v2, dir.path().join("report__v2.md"));

        assert_eq!(resolve_latest(&original), v2);
        // Earlier versions are untouched
        assert_eq!(fs::read_to_string(&original).unwrap(), "first draft");
        assert_eq!(fs::read_to_string(&v1).unwrap(), "second draft");

        // No temp files left behind
        let count = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 3);
    }
}
