// config.rs - startup defaults

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::compression::OutputFormat;
use crate::estimate::QualityPreset;

/// Startup defaults, read once from the user config directory. Every field
/// falls back independently when the file is absent or partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Slider value used while the preset is `custom`.
    pub quality: u8,
    pub preset: QualityPreset,
    pub format: OutputFormat,
    /// In-flight compression limit; 1 keeps batches strictly sequential.
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            preset: QualityPreset::Medium,
            format: OutputFormat::Original,
            workers: 1,
        }
    }
}

impl AppConfig {
    pub fn load() -> Self {
        match Self::config_path().and_then(|path| fs::read_to_string(path).ok()) {
            Some(text) => Self::parse(&text),
            None => Self::default(),
        }
    }

    fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("config unreadable, using defaults: {}", error);
                Self::default()
            }
        }
    }

    fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("batch-image-compressor");
        path.push("config.json");
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_batches_sequential() {
        let config = AppConfig::default();
        assert_eq!(config.quality, 80);
        assert_eq!(config.preset, QualityPreset::Medium);
        assert_eq!(config.format, OutputFormat::Original);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn partial_files_fall_back_per_field() {
        let config = AppConfig::parse(r#"{"quality": 55, "preset": "custom"}"#);
        assert_eq!(config.quality, 55);
        assert_eq!(config.preset, QualityPreset::Custom);
        assert_eq!(config.format, OutputFormat::Original);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = AppConfig::parse("{ not json");
        assert_eq!(config.quality, 80);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn round_trips_through_a_config_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        let written = AppConfig {
            quality: 42,
            preset: QualityPreset::Low,
            format: OutputFormat::WebP,
            workers: 2,
        };
        fs::write(&path, serde_json::to_string(&written).expect("serialize")).expect("write");

        let text = fs::read_to_string(&path).expect("read back");
        let loaded = AppConfig::parse(&text);
        assert_eq!(loaded.quality, 42);
        assert_eq!(loaded.preset, QualityPreset::Low);
        assert_eq!(loaded.format, OutputFormat::WebP);
        assert_eq!(loaded.workers, 2);
    }
}
