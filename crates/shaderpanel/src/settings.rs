use std::time::Duration;

use anyhow::{Context, Result};
use panelconfig::{
    DriverErrorSetting, PanelConfig, TextureSetting, VariantSetting, MAX_FPS, MIN_FPS,
};
use renderer::{
    DriverErrorPolicy, PanelOptions, PixelSize, ShaderAsset, ShaderVariant, TextureWrap,
};

use crate::cli::{RunArgs, ShaderArgs};

/// When the control thread detaches the panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunLength {
    Duration(Duration),
    Frames(u64),
}

/// Device scale posted once `at` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleStep {
    pub at: Duration,
    pub scale: f64,
}

/// Everything a headless run needs, after merging config file and flags.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub asset: ShaderAsset,
    pub options: PanelOptions,
    pub size: PixelSize,
    pub initial_scale: f64,
    pub fps: f64,
    pub length: RunLength,
    pub migrate_every: u64,
    pub scale_steps: Vec<ScaleStep>,
}

impl RunSettings {
    /// Time between render turns. Cadences outside the accepted fps range
    /// are clamped to it.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_nan() {
            MIN_FPS
        } else {
            self.fps.clamp(MIN_FPS, MAX_FPS)
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

pub fn load_config(args: &ShaderArgs) -> Result<PanelConfig> {
    match &args.config {
        Some(path) => PanelConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PanelConfig::default()),
    }
}

/// Builds the shader asset from flags, falling back to the config file.
pub fn resolve_asset(config: &PanelConfig, args: &ShaderArgs) -> Result<ShaderAsset> {
    let texture = args
        .texture
        .or(config.panel.texture)
        .unwrap_or_default();

    if let (Some(vertex), Some(fragment)) = (&args.vertex, &args.fragment) {
        return load_custom(vertex, fragment, texture);
    }
    if args.variant.is_none() {
        if let Some((vertex, fragment)) = config.custom_shaders() {
            return load_custom(vertex, fragment, texture);
        }
    }

    let variant = args
        .variant
        .unwrap_or_else(|| variant_from_setting(config.panel.variant));
    Ok(ShaderAsset::builtin(variant))
}

fn load_custom(
    vertex: &std::path::Path,
    fragment: &std::path::Path,
    texture: TextureSetting,
) -> Result<ShaderAsset> {
    ShaderAsset::from_files(vertex, fragment, texture_from_setting(texture)).with_context(|| {
        format!(
            "failed to read shader sources {} / {}",
            vertex.display(),
            fragment.display()
        )
    })
}

pub fn resolve_options(config: &PanelConfig, args: &ShaderArgs) -> PanelOptions {
    PanelOptions {
        texture_seed: args.texture_seed.unwrap_or(config.panel.texture_seed),
        on_driver_error: policy_from_setting(config.panel.on_driver_error),
    }
}

pub fn resolve_run(args: &RunArgs) -> Result<RunSettings> {
    let config = load_config(&args.shader)?;
    let asset = resolve_asset(&config, &args.shader)?;

    let mut options = resolve_options(&config, &args.shader);
    if let Some(policy) = args.on_driver_error {
        options.on_driver_error = policy;
    }

    let headless = &config.headless;
    let length = match (args.frames, args.duration) {
        (Some(frames), _) => RunLength::Frames(frames),
        (None, Some(duration)) => RunLength::Duration(duration),
        (None, None) => RunLength::Duration(headless.duration),
    };

    let mut scale_steps: Vec<ScaleStep> = headless
        .scale_changes
        .iter()
        .map(|change| ScaleStep {
            at: change.at,
            scale: change.scale,
        })
        .collect();
    scale_steps.sort_by_key(|step| step.at);

    Ok(RunSettings {
        asset,
        options,
        size: args
            .size
            .unwrap_or_else(|| PixelSize::new(headless.width, headless.height)),
        initial_scale: args.scale.unwrap_or(config.panel.render_scale),
        fps: args.fps.unwrap_or(headless.fps),
        length,
        migrate_every: args.migrate_every.unwrap_or(headless.migrate_every),
        scale_steps,
    })
}

pub fn variant_from_setting(setting: VariantSetting) -> ShaderVariant {
    match setting {
        VariantSetting::Fancy => ShaderVariant::Fancy,
        VariantSetting::Bouncy => ShaderVariant::Bouncy,
        VariantSetting::Plasma => ShaderVariant::Plasma,
        VariantSetting::Noise => ShaderVariant::Noise,
        VariantSetting::Grain => ShaderVariant::Grain,
    }
}

pub fn texture_from_setting(setting: TextureSetting) -> Option<TextureWrap> {
    match setting {
        TextureSetting::None => None,
        TextureSetting::Clamp => Some(TextureWrap::ClampToEdge),
        TextureSetting::Repeat => Some(TextureWrap::Repeat),
    }
}

pub fn policy_from_setting(setting: DriverErrorSetting) -> DriverErrorPolicy {
    match setting {
        DriverErrorSetting::Rebuild => DriverErrorPolicy::Rebuild,
        DriverErrorSetting::Log => DriverErrorPolicy::LogOnly,
    }
}
