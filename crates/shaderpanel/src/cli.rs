use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use panelconfig::{TextureSetting, MAX_FPS, MIN_FPS};
use renderer::{DriverErrorPolicy, PixelSize, ShaderVariant};

#[derive(Parser, Debug)]
#[command(
    name = "shaderpanel",
    author,
    version,
    about = "Drive the shader panel render loop against headless GL contexts",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the panel (the default when no subcommand is given).
    Run(RunArgs),
    /// List the built-in shader variants.
    Variants,
    /// Build the resource set once and report compile or link errors.
    Check(CheckArgs),
}

/// Shader selection shared by `run` and `check`.
#[derive(Args, Debug, Default, Clone)]
pub struct ShaderArgs {
    /// TOML configuration file; flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Built-in shader variant (`fancy`, `bouncy`, `plasma`, `noise`, `grain`).
    #[arg(long, value_name = "NAME", value_parser = parse_variant)]
    pub variant: Option<ShaderVariant>,

    /// Custom vertex shader; requires `--fragment`.
    #[arg(long, value_name = "PATH", requires = "fragment")]
    pub vertex: Option<PathBuf>,

    /// Custom fragment shader; requires `--vertex`.
    #[arg(long, value_name = "PATH", requires = "vertex")]
    pub fragment: Option<PathBuf>,

    /// Texture for custom shaders: `none`, `clamp` or `repeat`.
    #[arg(long, value_name = "MODE", value_parser = parse_texture, requires = "fragment")]
    pub texture: Option<TextureSetting>,

    /// Seed for the procedural texture.
    #[arg(long, value_name = "SEED")]
    pub texture_seed: Option<u64>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub shader: ShaderArgs,

    /// Panel size in logical pixels (e.g. `800x600`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<PixelSize>,

    /// Initial device scale factor.
    #[arg(long, value_name = "SCALE", value_parser = parse_scale)]
    pub scale: Option<f64>,

    /// Frame cadence of the render thread.
    #[arg(long, value_name = "FPS", value_parser = parse_fps)]
    pub fps: Option<f64>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N", conflicts_with = "duration")]
    pub frames: Option<u64>,

    /// Stop after this much wall-clock time (e.g. `2s`, `500ms`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Swap to a fresh context every N frames (0 disables).
    #[arg(long, value_name = "N")]
    pub migrate_every: Option<u64>,

    /// What to do when a draw trips the GL error flag: `rebuild` or `log`.
    #[arg(long, value_name = "POLICY", value_parser = parse_policy)]
    pub on_driver_error: Option<DriverErrorPolicy>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct CheckArgs {
    #[command(flatten)]
    pub shader: ShaderArgs,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_variant(value: &str) -> Result<ShaderVariant, String> {
    value.parse()
}

pub fn parse_texture(value: &str) -> Result<TextureSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => Ok(TextureSetting::None),
        "clamp" | "clamp-to-edge" => Ok(TextureSetting::Clamp),
        "repeat" => Ok(TextureSetting::Repeat),
        other => Err(format!(
            "unknown texture mode '{other}'; expected none, clamp, or repeat"
        )),
    }
}

pub fn parse_size(value: &str) -> Result<PixelSize, String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<i32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width < 0 || height < 0 {
        return Err("size must be non-negative".into());
    }
    Ok(PixelSize::new(width, height))
}

fn parse_positive(value: &str, what: &str) -> Result<f64, String> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid {what} '{value}'"))?;
    if !(parsed.is_finite() && parsed > 0.0) {
        return Err(format!("{what} must be greater than zero"));
    }
    Ok(parsed)
}

pub fn parse_scale(value: &str) -> Result<f64, String> {
    parse_positive(value, "scale")
}

pub fn parse_fps(value: &str) -> Result<f64, String> {
    let fps = parse_positive(value, "fps")?;
    if !(MIN_FPS..=MAX_FPS).contains(&fps) {
        return Err(format!("fps must be between {MIN_FPS} and {MAX_FPS}"));
    }
    Ok(fps)
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds > 0.0 {
            return Ok(Duration::from_secs_f64(seconds));
        }
        return Err("duration must be greater than zero".into());
    }
    match humantime::parse_duration(trimmed) {
        Ok(duration) if duration.is_zero() => Err("duration must be greater than zero".into()),
        Ok(duration) => Ok(duration),
        Err(err) => Err(format!("invalid duration '{trimmed}': {err}")),
    }
}

pub fn parse_policy(value: &str) -> Result<DriverErrorPolicy, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "rebuild" => Ok(DriverErrorPolicy::Rebuild),
        "log" | "log-only" => Ok(DriverErrorPolicy::LogOnly),
        other => Err(format!(
            "unknown driver error policy '{other}'; expected rebuild or log"
        )),
    }
}
