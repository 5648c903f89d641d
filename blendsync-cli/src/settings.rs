//! Persistent CLI settings (JSON file in the user data directory).

use std::fs;
use std::path::{Path, PathBuf};

use blendsync_core::{DecoderConfig, EngineConfig, ResampleQuality};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct Settings {
    pub target_sample_rate: u32,
    pub resample_quality: String,
    pub frame_size: usize,
    pub overlap: usize,
    pub ort_ep: String,
    pub models_dir: Option<String>,
    pub pretty_output: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_sample_rate: 88_200,
            resample_quality: "linear".into(),
            frame_size: 128,
            overlap: 32,
            ort_ep: "auto".into(),
            models_dir: None,
            pretty_output: false,
        }
    }
}

impl Settings {
    /// Canonicalize string aliases and blank paths. Numeric geometry is left
    /// as given; `EngineConfig::validate` rejects values that cannot run.
    pub fn normalize(&mut self) {
        self.resample_quality = normalize_resample_quality(&self.resample_quality);
        self.ort_ep = normalize_ort_ep(&self.ort_ep);
        self.models_dir = self
            .models_dir
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }

    pub fn resample_quality(&self) -> ResampleQuality {
        match self.resample_quality.as_str() {
            "cubic" => ResampleQuality::Cubic,
            _ => ResampleQuality::Linear,
        }
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_sample_rate: self.target_sample_rate,
            resample_quality: self.resample_quality(),
            decoder: DecoderConfig {
                frame_size: self.frame_size,
                overlap: self.overlap,
            },
            ..Default::default()
        }
    }
}

pub fn normalize_resample_quality(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cubic" | "sinc" | "hq" | "high" => "cubic".into(),
        _ => "linear".into(),
    }
}

pub fn normalize_ort_ep(raw: &str) -> String {
    match raw.trim().to_ascii_lowercase().as_str() {
        "cpu" => "cpu".into(),
        "dml" | "directml" => "directml".into(),
        _ => "auto".into(),
    }
}

/// Export settings the ONNX backend reads from the environment, without
/// overriding variables the user already set.
pub fn apply_runtime_env_from_settings(settings: &Settings) {
    if std::env::var("BLENDSYNC_ORT_EP").is_err() {
        std::env::set_var("BLENDSYNC_ORT_EP", &settings.ort_ep);
    }
    if std::env::var("BLENDSYNC_MODEL_DIR").is_err() {
        if let Some(dir) = settings.models_dir.as_ref() {
            std::env::set_var("BLENDSYNC_MODEL_DIR", dir);
        }
    }
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Blendsync")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("blendsync")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> Settings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Settings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &Settings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blendsync_core::BlendsyncError;

    #[test]
    fn defaults_match_engine_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.to_engine_config(), EngineConfig::default());
    }

    #[test]
    fn normalize_canonicalizes_aliases() {
        let mut settings = Settings {
            resample_quality: " HQ ".into(),
            ort_ep: "DML".into(),
            models_dir: Some("   ".into()),
            ..Default::default()
        };
        settings.normalize();
        assert_eq!(settings.resample_quality, "cubic");
        assert_eq!(settings.ort_ep, "directml");
        assert_eq!(settings.models_dir, None);
        assert!(settings.to_engine_config().validate().is_ok());
    }

    #[test]
    fn normalize_keeps_invalid_geometry_for_validation() {
        let mut settings = Settings {
            target_sample_rate: 0,
            frame_size: 16,
            overlap: 40,
            ..Default::default()
        };
        settings.normalize();
        assert_eq!(settings.target_sample_rate, 0);
        assert_eq!(settings.overlap, 40);
        assert!(matches!(
            settings.to_engine_config().validate(),
            Err(BlendsyncError::InvalidConfig(_))
        ));

        settings.target_sample_rate = 88_200;
        assert!(matches!(
            settings.to_engine_config().validate(),
            Err(BlendsyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_or_corrupt_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("blendsync-settings-{}", std::process::id()));
        let path = dir.join("settings.json");
        assert_eq!(load_settings(&path), Settings::default());

        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), Settings::default());

        let saved = Settings {
            frame_size: 64,
            overlap: 16,
            ..Default::default()
        };
        save_settings(&path, &saved).unwrap();
        assert_eq!(load_settings(&path), saved);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "overlap": 8 }"#).unwrap();
        assert_eq!(settings.overlap, 8);
        assert_eq!(settings.frame_size, 128);
        assert_eq!(settings.ort_ep, "auto");
    }
}
