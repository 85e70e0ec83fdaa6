use std::fmt;
use std::str::FromStr;

/// Pipeline stage of a shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn gl_enum(self) -> u32 {
        match self {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Addressing mode of the procedural texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureWrap {
    ClampToEdge,
    Repeat,
}

impl TextureWrap {
    pub(crate) fn gl_enum(self) -> u32 {
        match self {
            TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
            TextureWrap::Repeat => glow::REPEAT,
        }
    }
}

impl fmt::Display for TextureWrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureWrap::ClampToEdge => f.write_str("clamp"),
            TextureWrap::Repeat => f.write_str("repeat"),
        }
    }
}

impl FromStr for TextureWrap {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clamp" | "clamp-to-edge" | "clamp_to_edge" => Ok(TextureWrap::ClampToEdge),
            "repeat" => Ok(TextureWrap::Repeat),
            other => Err(format!(
                "unknown texture wrap '{other}' (expected `clamp` or `repeat`)"
            )),
        }
    }
}

/// Built-in shader programs shipped with the crate.
///
/// All variants share the quad vertex stage and differ in fragment stage and
/// whether a procedural texture is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShaderVariant {
    /// Ray-marched Platonic solid with mirrored inner faces, slowly rotating.
    #[default]
    Fancy,
    /// A ball bouncing once per second.
    Bouncy,
    /// Layered sine plasma.
    Plasma,
    /// Scrolling value noise read from a repeat-wrapped texture.
    Noise,
    /// Vignette with film grain read from a clamp-wrapped texture.
    Grain,
}

impl ShaderVariant {
    pub const ALL: [ShaderVariant; 5] = [
        ShaderVariant::Fancy,
        ShaderVariant::Bouncy,
        ShaderVariant::Plasma,
        ShaderVariant::Noise,
        ShaderVariant::Grain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaderVariant::Fancy => "fancy",
            ShaderVariant::Bouncy => "bouncy",
            ShaderVariant::Plasma => "plasma",
            ShaderVariant::Noise => "noise",
            ShaderVariant::Grain => "grain",
        }
    }

    /// Wrap mode of the variant's texture, `None` when it samples nothing.
    pub fn texture(self) -> Option<TextureWrap> {
        match self {
            ShaderVariant::Fancy | ShaderVariant::Bouncy | ShaderVariant::Plasma => None,
            ShaderVariant::Noise => Some(TextureWrap::Repeat),
            ShaderVariant::Grain => Some(TextureWrap::ClampToEdge),
        }
    }
}

impl fmt::Display for ShaderVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderVariant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        ShaderVariant::ALL
            .into_iter()
            .find(|variant| variant.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = ShaderVariant::ALL.iter().map(|v| v.name()).collect();
                format!(
                    "unknown shader variant '{wanted}' (expected one of: {})",
                    known.join(", ")
                )
            })
    }
}

/// What the loop does when a steady-state draw trips the GL error flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverErrorPolicy {
    /// Dispose the resource set so the next frame rebuilds it.
    #[default]
    Rebuild,
    /// Report the error and keep drawing with the same resources.
    LogOnly,
}

/// Size of the panel in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelSize {
    pub width: i32,
    pub height: i32,
}

impl PixelSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// False when either edge is below one pixel; such frames draw nothing.
    pub fn is_drawable(self) -> bool {
        self.width >= 1 && self.height >= 1
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Per-draw input: panel size, device scale factor and elapsed seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub size: PixelSize,
    pub device_scale: f64,
    pub elapsed_seconds: f64,
}

impl FrameInput {
    pub fn new(size: PixelSize, device_scale: f64, elapsed_seconds: f64) -> Self {
        Self {
            size,
            device_scale,
            elapsed_seconds,
        }
    }

    /// Viewport extent in device pixels; fractional pixels are truncated.
    pub fn viewport(&self) -> (i32, i32) {
        (
            (f64::from(self.size.width) * self.device_scale) as i32,
            (f64::from(self.size.height) * self.device_scale) as i32,
        )
    }

    /// Width over height of the logical size.
    pub fn aspect_ratio(&self) -> f32 {
        self.size.width as f32 / self.size.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_names_round_trip_through_from_str() {
        for variant in ShaderVariant::ALL {
            assert_eq!(variant.name().parse::<ShaderVariant>(), Ok(variant));
        }
        assert_eq!(" NOISE ".parse::<ShaderVariant>(), Ok(ShaderVariant::Noise));
        assert_eq!("Fancy".parse::<ShaderVariant>(), Ok(ShaderVariant::Fancy));
        assert!("mirror".parse::<ShaderVariant>().is_err());
    }

    #[test]
    fn only_texture_variants_report_wrap_modes() {
        assert_eq!(ShaderVariant::default(), ShaderVariant::Fancy);
        assert_eq!(ShaderVariant::Fancy.texture(), None);
        assert_eq!(ShaderVariant::Bouncy.texture(), None);
        assert_eq!(ShaderVariant::Noise.texture(), Some(TextureWrap::Repeat));
        assert_eq!(
            ShaderVariant::Grain.texture(),
            Some(TextureWrap::ClampToEdge)
        );
    }

    #[test]
    fn viewport_scales_and_truncates() {
        let frame = FrameInput::new(PixelSize::new(801, 600), 1.25, 0.0);
        assert_eq!(frame.viewport(), (1001, 750));
        assert!((frame.aspect_ratio() - 1.335).abs() < 1e-6);
    }

    #[test]
    fn sub_pixel_sizes_are_not_drawable() {
        assert!(!PixelSize::new(0, 600).is_drawable());
        assert!(!PixelSize::new(800, -1).is_drawable());
        assert!(PixelSize::new(1, 1).is_drawable());
    }
}
