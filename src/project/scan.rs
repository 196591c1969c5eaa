//! Directory scanning: which files under a project root are source units.
//!
//! Walks source files respecting .gitignore and hidden-file rules, skips the
//! engine's own state directory, and reads the survivors in parallel.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::STATE_DIR;
use crate::graph::types::{unit_key, SourceUnit};
use crate::parser::SupportedLanguage;

/// A source file found under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Root-relative unit key.
    pub key: String,
    pub language: SupportedLanguage,
    pub size: u64,
}

/// Every supported source file under `root`, in key order.
pub fn scan(root: &Path) -> Vec<ScannedFile> {
    let mut files: Vec<ScannedFile> = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .filter_entry(|entry| entry.file_name() != STATE_DIR)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            let language = SupportedLanguage::from_path(entry.path())?;
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            Some(ScannedFile {
                key: unit_key(relative),
                path: entry.into_path(),
                language,
                size,
            })
        })
        .collect();
    files.sort_by(|a, b| a.key.cmp(&b.key));
    debug!(root = %root.display(), files = files.len(), "scanned");
    files
}

/// Read scanned files into source units keyed by their root-relative path.
/// Oversized and unreadable files are skipped with a warning.
pub fn read_units(files: &[ScannedFile], max_file_size: u64) -> Vec<SourceUnit> {
    let mut units: Vec<SourceUnit> = files
        .par_iter()
        .filter_map(|file| {
            if file.size > max_file_size {
                warn!(file = %file.key, size = file.size, limit = max_file_size, "skipping oversized file");
                return None;
            }
            match fs::read_to_string(&file.path) {
                Ok(text) => Some(SourceUnit::new(&file.key, file.language.tag(), text)),
                Err(e) => {
                    warn!(file = %file.key, error = %e, "unreadable source file");
                    None
                }
            }
        })
        .collect();
    units.sort_by(|a, b| a.path.cmp(&b.path));
    units
}

/// Counts of what a scan would feed the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub total_files: usize,
    pub too_large: usize,
    pub by_language: Vec<(&'static str, usize)>,
}

impl ScanStats {
    pub fn collect(files: &[ScannedFile], max_file_size: u64) -> Self {
        let mut stats = ScanStats {
            total_files: files.len(),
            ..ScanStats::default()
        };
        for file in files {
            if file.size > max_file_size {
                stats.too_large += 1;
            }
            let name = file.language.name();
            match stats.by_language.iter_mut().find(|(n, _)| *n == name) {
                Some((_, count)) => *count += 1,
                None => stats.by_language.push((name, 1)),
            }
        }
        stats.by_language.sort();
        stats
    }
}

impl fmt::Display for ScanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Found {} source files", self.total_files)?;
        if !self.by_language.is_empty() {
            let parts: Vec<String> = self
                .by_language
                .iter()
                .map(|(name, count)| format!("{}: {}", name, count))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        if self.too_large > 0 {
            write!(f, ", {} too large to parse", self.too_large)?;
        }
        Ok(())
    }
}
