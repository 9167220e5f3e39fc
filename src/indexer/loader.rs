//! Text extraction for supported document formats.
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum FileReadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from {}: {source}", .path.display())]
    Pdf {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },
}

/// Read `path` as text.
///
/// PDFs are text-extracted page by page. Everything else is decoded as UTF-8,
/// replacing invalid sequences rather than failing.
pub fn load_text(path: &Path) -> Result<String, FileReadError> {
    let is_pdf = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        return load_pdf(path);
    }

    let bytes = std::fs::read(path).map_err(|source| FileReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn load_pdf(path: &Path) -> Result<String, FileReadError> {
    let pdf_err = |source| FileReadError::Pdf {
        path: path.to_path_buf(),
        source,
    };

    let doc = lopdf::Document::load(path).map_err(pdf_err)?;

    let mut pages = Vec::new();
    for page_num in doc.get_pages().into_keys() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => debug!("No text on page {page_num} of {}: {e}", path.display()),
        }
    }

    Ok(pages.join("\n"))
}
