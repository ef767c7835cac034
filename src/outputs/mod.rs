//! Output generation for corpus files and the run report.
//!
//! # Submodules
//!
//! - [`corpus`]: one plain-text corpus file per month
//! - [`json`]: the machine-readable run report
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── 1_2020.txt
//! ├── 2_2020.txt
//! ├── ...
//! └── run_report.json
//! ```
//!
//! Every file is written to a temporary sibling first and renamed into place,
//! so a crash never leaves a truncated file behind.

pub mod corpus;
pub mod json;

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `path` with `contents`.
///
/// The temporary file lives in the destination directory so the final rename
/// never crosses a file system boundary.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
