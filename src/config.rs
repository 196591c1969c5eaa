//! Engine configuration, read from `.codescope/config.toml`.
//!
//! Every section is optional. A missing or malformed file falls back to
//! defaults so a broken config never prevents the engine from starting.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::index::AmbiguityPolicy;

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".codescope";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodescopeConfig {
    pub index: IndexConfig,
    pub layout: LayoutConfig,
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// How to pick a preferred target among equally-proximate candidates.
    pub ambiguity_policy: AmbiguityPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Gap between nodes of the same layer.
    pub horizontal_spacing: f32,
    /// Gap between layers.
    pub vertical_spacing: f32,
    pub node_height: f32,
    pub min_node_width: f32,
    /// Approximate label glyph width used to size nodes.
    pub char_width: f32,
    /// Padding inside an expanded container.
    pub container_padding: f32,
    /// Height of the label band at the top of an expanded container.
    pub header_height: f32,
    /// Distance kept between a routed edge and the group it travels around.
    pub perimeter_margin: f32,
    /// Containment depth expanded by default (0 = everything collapsed).
    pub initial_expand_depth: usize,
    /// Time budget for one relayout; 0 disables the budget.
    pub budget_ms: u64,
    /// Share of dirty groups above which the whole layout is recomputed.
    pub full_relayout_ratio: f32,
    /// Barycenter passes per group.
    pub ordering_sweeps: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            horizontal_spacing: 40.0,
            vertical_spacing: 60.0,
            node_height: 36.0,
            min_node_width: 80.0,
            char_width: 8.0,
            container_padding: 16.0,
            header_height: 28.0,
            perimeter_margin: 8.0,
            initial_expand_depth: 0,
            budget_ms: 250,
            full_relayout_ratio: 0.5,
            ordering_sweeps: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Files larger than this are not parsed.
    pub max_file_size: u64,
    /// Worker threads for batch parsing (0 = rayon default).
    pub worker_threads: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_size: 2 * 1024 * 1024,
            worker_threads: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot location; relative paths resolve against the state directory.
    pub cache_path: Option<PathBuf>,
}

impl CodescopeConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Self::default();
            }
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Load `<root>/.codescope/config.toml`.
    pub fn load_for_root(root: &Path) -> Self {
        Self::load(&root.join(STATE_DIR).join("config.toml"))
    }

    /// Where the project snapshot lives.
    pub fn resolve_cache_path(&self, state_dir: &Path) -> PathBuf {
        match &self.storage.cache_path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => state_dir.join(p),
            None => state_dir.join("graph.bin"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = CodescopeConfig::load(Path::new("/definitely/not/here.toml"));
        assert_eq!(config, CodescopeConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[index]
ambiguity_policy = "same_file"

[layout]
vertical_spacing = 90.0
initial_expand_depth = 1
"#,
        )
        .unwrap();

        let config = CodescopeConfig::load(&path);
        assert_eq!(config.index.ambiguity_policy, AmbiguityPolicy::SameFile);
        assert_eq!(config.layout.vertical_spacing, 90.0);
        assert_eq!(config.layout.initial_expand_depth, 1);
        // untouched fields keep their defaults
        assert_eq!(config.layout.horizontal_spacing, 40.0);
        assert_eq!(config.ingest, IngestConfig::default());
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[layout\nvertical_spacing = ").unwrap();
        assert_eq!(CodescopeConfig::load(&path), CodescopeConfig::default());
    }

    #[test]
    fn test_cache_path_resolution() {
        let state = Path::new("/proj/.codescope");
        let mut config = CodescopeConfig::default();
        assert_eq!(config.resolve_cache_path(state), state.join("graph.bin"));

        config.storage.cache_path = Some(PathBuf::from("snap.bin"));
        assert_eq!(config.resolve_cache_path(state), state.join("snap.bin"));

        config.storage.cache_path = Some(PathBuf::from("/tmp/x.bin"));
        assert_eq!(config.resolve_cache_path(state), PathBuf::from("/tmp/x.bin"));
    }
}
