//! Shader sources and the fixed interface every program must honour.
//!
//! The panel binds `a_position` to attribute slot 0 and `a_texcoord` to slot 1
//! before linking, and feeds the `time` and `ratio` uniforms every frame.
//! Programs that sample the procedural texture read it through `tex` on
//! texture unit 0.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use crate::types::{ShaderVariant, TextureWrap};

pub const POSITION_SLOT: u32 = 0;
pub const TEXCOORD_SLOT: u32 = 1;
pub const POSITION_ATTRIBUTE: &str = "a_position";
pub const TEXCOORD_ATTRIBUTE: &str = "a_texcoord";
pub const TIME_UNIFORM: &str = "time";
pub const RATIO_UNIFORM: &str = "ratio";
pub const SAMPLER_UNIFORM: &str = "tex";

const QUAD_VERTEX: &str = include_str!("../shaders/quad.vert");
const FANCY_FRAGMENT: &str = include_str!("../shaders/fancy.frag");
const BOUNCY_FRAGMENT: &str = include_str!("../shaders/bouncy.frag");
const PLASMA_FRAGMENT: &str = include_str!("../shaders/plasma.frag");
const NOISE_FRAGMENT: &str = include_str!("../shaders/noise.frag");
const GRAIN_FRAGMENT: &str = include_str!("../shaders/grain.frag");

/// Vertex and fragment source plus the texture the program expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAsset {
    label: Cow<'static, str>,
    vertex: Cow<'static, str>,
    fragment: Cow<'static, str>,
    texture: Option<TextureWrap>,
}

impl ShaderAsset {
    /// Sources compiled into the crate for `variant`.
    pub fn builtin(variant: ShaderVariant) -> Self {
        let fragment = match variant {
            ShaderVariant::Fancy => FANCY_FRAGMENT,
            ShaderVariant::Bouncy => BOUNCY_FRAGMENT,
            ShaderVariant::Plasma => PLASMA_FRAGMENT,
            ShaderVariant::Noise => NOISE_FRAGMENT,
            ShaderVariant::Grain => GRAIN_FRAGMENT,
        };
        Self {
            label: Cow::Borrowed(variant.name()),
            vertex: Cow::Borrowed(QUAD_VERTEX),
            fragment: Cow::Borrowed(fragment),
            texture: variant.texture(),
        }
    }

    pub fn custom(
        label: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
        texture: Option<TextureWrap>,
    ) -> Self {
        Self {
            label: Cow::Owned(label.into()),
            vertex: Cow::Owned(vertex.into()),
            fragment: Cow::Owned(fragment.into()),
            texture,
        }
    }

    /// Reads both stages from disk. The label is the fragment file stem.
    pub fn from_files(
        vertex_path: &Path,
        fragment_path: &Path,
        texture: Option<TextureWrap>,
    ) -> io::Result<Self> {
        let vertex = fs::read_to_string(vertex_path)?;
        let fragment = fs::read_to_string(fragment_path)?;
        let label = fragment_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        Ok(Self::custom(label, vertex, fragment, texture))
    }

    /// Same asset with the fragment stage replaced.
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Cow::Owned(fragment.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment
    }

    pub fn texture(&self) -> Option<TextureWrap> {
        self.texture
    }
}

impl From<ShaderVariant> for ShaderAsset {
    fn from(variant: ShaderVariant) -> Self {
        ShaderAsset::builtin(variant)
    }
}
