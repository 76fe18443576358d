use crate::catalog::ClothingCategory;
use crate::composition::{ClothingMarkers, MatchPolicy};
use crate::utils::math::Transform;
use directories::ProjectDirs;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use toml;

const CONFIG_FILE: &str = "settings.toml";

const DEFAULT_AVATAR_URI: &str = "https://models.readyplayer.me/6819bb571be966322d89faaa.glb";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub uri: String,
    pub position: [f32; 3],
    pub scale: f32,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_AVATAR_URI.to_string(),
            position: [0.0, -1.0, 0.0],
            scale: 1.5,
        }
    }
}

impl AvatarSettings {
    pub fn placement(&self) -> Transform {
        Transform::from_translation(Vec3::from_array(self.position)).with_uniform_scale(self.scale)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Built-in catalog when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub timeout_ms: u64,
    /// Root for model paths that are not URLs
    pub asset_root: Option<PathBuf>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            asset_root: None,
        }
    }
}

impl LoaderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionSettings {
    pub match_policy: MatchPolicy,
    pub top_marker: String,
    pub bottom_marker: String,
}

impl Default for CompositionSettings {
    fn default() -> Self {
        let markers = ClothingMarkers::default();
        Self {
            match_policy: MatchPolicy::default(),
            top_marker: markers.top,
            bottom_marker: markers.bottom,
        }
    }
}

impl CompositionSettings {
    pub fn markers(&self) -> ClothingMarkers {
        ClothingMarkers {
            top: self.top_marker.clone(),
            bottom: self.bottom_marker.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub avatar: AvatarSettings,
    pub catalog: CatalogSettings,
    pub loader: LoaderSettings,
    pub composition: CompositionSettings,
    pub logging: LoggingSettings,
    /// Item ids selected right after startup, per category
    pub startup: BTreeMap<ClothingCategory, String>,
}

impl ViewerSettings {
    pub fn from_toml_str(data: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(data)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let data = fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }
}

fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "outfitter", "avatar-outfitter")
        .map(|proj| proj.config_dir().join(CONFIG_FILE))
}

pub fn save_settings(settings: &ViewerSettings) -> Result<(), SettingsError> {
    match config_path() {
        Some(path) => settings.to_file(path),
        None => Ok(()),
    }
}

/// Settings from the per-user config directory, if present and valid
pub fn load_settings() -> Option<ViewerSettings> {
    let path = config_path()?;
    if !path.exists() {
        return None;
    }
    match ViewerSettings::from_file(&path) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_viewer() {
        let settings = ViewerSettings::default();
        assert_eq!(settings.avatar.uri, DEFAULT_AVATAR_URI);
        assert_eq!(settings.avatar.placement().translation, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(settings.composition.match_policy, MatchPolicy::Exact);
        assert_eq!(settings.composition.markers(), ClothingMarkers::default());
        assert_eq!(settings.loader.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings = ViewerSettings::from_toml_str(
            r#"
            [composition]
            match_policy = "substring"

            [startup]
            top = "shirt2"
            "#,
        )
        .unwrap();

        assert_eq!(settings.composition.match_policy, MatchPolicy::Substring);
        assert_eq!(settings.composition.top_marker, "Outfit_Top");
        assert_eq!(settings.startup.get(&ClothingCategory::Top).map(String::as_str), Some("shirt2"));
        assert_eq!(settings.avatar, AvatarSettings::default());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut settings = ViewerSettings::default();
        settings.loader.asset_root = Some(PathBuf::from("/srv/public"));
        settings.logging.level = "debug".to_string();
        settings.to_file(&path).unwrap();

        assert_eq!(ViewerSettings::from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let err = ViewerSettings::from_toml_str("[avatar]\nscale = \"huge\"").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
