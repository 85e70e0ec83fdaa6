use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Slowest and fastest frame cadence a headless run accepts.
pub const MIN_FPS: f64 = 0.01;
pub const MAX_FPS: f64 = 1000.0;

/// Built-in shader selected by `panel.variant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantSetting {
    #[default]
    Fancy,
    Bouncy,
    Plasma,
    Noise,
    Grain,
}

/// Texture requested by a custom shader pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureSetting {
    #[default]
    None,
    Clamp,
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverErrorSetting {
    #[default]
    Rebuild,
    Log,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PanelConfig {
    pub version: u32,
    #[serde(default)]
    pub panel: PanelSection,
    #[serde(default)]
    pub headless: HeadlessSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PanelSection {
    #[serde(default)]
    pub variant: VariantSetting,
    #[serde(default = "default_render_scale")]
    pub render_scale: f64,
    #[serde(default)]
    pub texture_seed: u64,
    #[serde(default)]
    pub on_driver_error: DriverErrorSetting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_shader: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_shader: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<TextureSetting>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeadlessSection {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(
        default = "default_run_duration",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub duration: Duration,
    /// Frames between simulated context migrations; zero disables them.
    #[serde(default)]
    pub migrate_every: u64,
    #[serde(default)]
    pub scale_changes: Vec<ScaleChange>,
}

/// Device scale posted by the control thread once `at` has elapsed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScaleChange {
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub at: Duration,
    pub scale: f64,
}

fn default_render_scale() -> f64 {
    1.0
}

fn default_width() -> i32 {
    800
}

fn default_height() -> i32 {
    600
}

fn default_fps() -> f64 {
    60.0
}

fn default_run_duration() -> Duration {
    Duration::from_secs(2)
}

impl Default for PanelSection {
    fn default() -> Self {
        Self {
            variant: VariantSetting::default(),
            render_scale: default_render_scale(),
            texture_seed: 0,
            on_driver_error: DriverErrorSetting::default(),
            vertex_shader: None,
            fragment_shader: None,
            texture: None,
        }
    }
}

impl Default for HeadlessSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            duration: default_run_duration(),
            migrate_every: 0,
            scale_changes: Vec::new(),
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            version: 1,
            panel: PanelSection::default(),
            headless: HeadlessSection::default(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

impl PanelConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PanelConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }

    /// Vertex and fragment paths when the panel runs custom shaders.
    pub fn custom_shaders(&self) -> Option<(&Path, &Path)> {
        match (&self.panel.vertex_shader, &self.panel.fragment_shader) {
            (Some(vertex), Some(fragment)) => Some((vertex.as_path(), fragment.as_path())),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let panel = &self.panel;
        if !(panel.render_scale.is_finite() && panel.render_scale > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "panel.render_scale must be > 0 (got {})",
                panel.render_scale
            )));
        }

        match (&panel.vertex_shader, &panel.fragment_shader) {
            (Some(_), None) => {
                return Err(ConfigError::Invalid(
                    "panel.vertex_shader requires panel.fragment_shader".into(),
                ))
            }
            (None, Some(_)) => {
                return Err(ConfigError::Invalid(
                    "panel.fragment_shader requires panel.vertex_shader".into(),
                ))
            }
            (None, None) if panel.texture.is_some() => {
                return Err(ConfigError::Invalid(
                    "panel.texture only applies to custom shaders".into(),
                ))
            }
            _ => {}
        }

        let headless = &self.headless;
        if headless.width < 0 || headless.height < 0 {
            return Err(ConfigError::Invalid(format!(
                "headless size must be non-negative (got {}x{})",
                headless.width, headless.height
            )));
        }

        if !(MIN_FPS..=MAX_FPS).contains(&headless.fps) {
            return Err(ConfigError::Invalid(format!(
                "headless.fps must be between {MIN_FPS} and {MAX_FPS} (got {})",
                headless.fps
            )));
        }

        if headless.duration.is_zero() {
            return Err(ConfigError::Invalid(
                "headless.duration must be greater than zero".into(),
            ));
        }

        for change in &headless.scale_changes {
            if !(change.scale.is_finite() && change.scale > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "scale change at {} must have scale > 0 (got {})",
                    humantime::format_duration(change.at),
                    change.scale
                )));
            }
        }

        Ok(())
    }
}
