use rand::RngCore;

use crate::gl::GlApi;
use crate::types::TextureWrap;

/// Edge length of the procedural texture in texels.
pub(crate) const NOISE_TEXTURE_SIZE: i32 = 64;
pub(crate) const NOISE_BYTES_PER_PIXEL: usize = 4;

/// RGBA8 payload for the procedural texture, filled from `rng`.
pub(crate) fn noise_pixels<R: RngCore + ?Sized>(rng: &mut R) -> Vec<u8> {
    let texels = (NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE) as usize;
    let mut pixels = vec![0u8; texels * NOISE_BYTES_PER_PIXEL];
    rng.fill_bytes(&mut pixels);
    pixels
}

/// Uploads `pixels` into the texture bound on the active unit and sets
/// linear filtering with `wrap` addressing on both axes.
pub(crate) fn upload_noise<G: GlApi + ?Sized>(gl: &G, pixels: &[u8], wrap: TextureWrap) {
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA8 as i32,
        NOISE_TEXTURE_SIZE,
        NOISE_TEXTURE_SIZE,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        Some(pixels),
    );
    let wrap = wrap.gl_enum() as i32;
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap);
}
