//! Delta-scan indexing: enumerate, fingerprint, diff, chunk, and reconcile.
pub mod chunker;
pub mod core;
pub mod diff;
pub mod loader;
pub mod scanner;

pub use self::core::{DeltaIndexer, DeltaSummary, ScanError};
