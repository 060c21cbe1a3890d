use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::MAX_ENCODE_WORKERS;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ArchitectSettings {
    /// Where exported and checkpointed templates are written.
    pub template_dir: PathBuf,
    /// Background encode workers. 0 means "pick from the CPU count".
    #[serde(default)]
    pub encode_workers: usize,
}

impl Default for ArchitectSettings {
    fn default() -> Self {
        let template_dir = directories::ProjectDirs::from("", "", "island-architect")
            .map(|dirs| dirs.data_dir().join("templates"))
            .unwrap_or_else(|| PathBuf::from("templates"));
        Self {
            template_dir,
            encode_workers: 0,
        }
    }
}

impl ArchitectSettings {
    pub fn worker_count(&self) -> usize {
        if self.encode_workers == 0 {
            num_cpus::get().min(MAX_ENCODE_WORKERS)
        } else {
            self.encode_workers
        }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(std::io::Error::other)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Failed to read settings from {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let contents = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip() {
        let path = std::env::temp_dir().join("island-architect-settings-test.json");
        let settings = ArchitectSettings {
            template_dir: PathBuf::from("/tmp/templates"),
            encode_workers: 3,
        };
        settings.save(&path).unwrap();
        let loaded = ArchitectSettings::load(&path).unwrap();
        assert_eq!(loaded.template_dir, settings.template_dir);
        assert_eq!(loaded.worker_count(), 3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_settings_fall_back_to_defaults() {
        let loaded = ArchitectSettings::load_or_default(Path::new("/nonexistent/settings.json"));
        assert!(loaded.worker_count() >= 1);
    }
}
