use rand::RngCore;
use tracing::{debug, warn};

use crate::context::{ContextId, RenderContext};
use crate::error::RenderError;
use crate::gl::{check_error, drain_errors, GlApi, ResourceKind};
use crate::shaders::{
    ShaderAsset, POSITION_ATTRIBUTE, POSITION_SLOT, RATIO_UNIFORM, SAMPLER_UNIFORM,
    TEXCOORD_ATTRIBUTE, TEXCOORD_SLOT, TIME_UNIFORM,
};
use crate::types::{FrameInput, ShaderStage};

use super::geometry::{
    index_bytes, vertex_bytes, POSITION_COMPONENTS, POSITION_OFFSET, QUAD_INDICES,
    TEXCOORD_COMPONENTS, TEXCOORD_OFFSET, VERTEX_STRIDE,
};
use super::texture::{noise_pixels, upload_noise};

/// Object created during construction, kept so a failed build can be rolled
/// back.
enum Created<G: GlApi> {
    Shader(G::Shader),
    Program(G::Program),
    Buffer(G::Buffer),
    VertexArray(G::VertexArray),
    Texture(G::Texture),
}

impl<G: GlApi> Created<G> {
    fn delete(self, gl: &G) {
        match self {
            Created::Shader(shader) => gl.delete_shader(shader),
            Created::Program(program) => gl.delete_program(program),
            Created::Buffer(buffer) => gl.delete_buffer(buffer),
            Created::VertexArray(vertex_array) => gl.delete_vertex_array(vertex_array),
            Created::Texture(texture) => gl.delete_texture(texture),
        }
    }
}

/// Objects created so far by an in-progress construction.
struct Rollback<G: GlApi> {
    created: Vec<Created<G>>,
}

impl<G: GlApi> Rollback<G> {
    fn new() -> Self {
        Self {
            created: Vec::with_capacity(7),
        }
    }

    fn push(&mut self, object: Created<G>) {
        self.created.push(object);
    }

    /// Unbinds everything and deletes in reverse creation order.
    fn release(self, gl: &G) {
        unbind_all(gl, true);
        for object in self.created.into_iter().rev() {
            object.delete(gl);
        }
        drain_errors(gl);
    }
}

fn unbind_all<G: GlApi + ?Sized>(gl: &G, texture: bool) {
    gl.bind_buffer(glow::ARRAY_BUFFER, None);
    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
    gl.bind_vertex_array(None);
    gl.use_program(None);
    if texture {
        gl.active_texture(glow::TEXTURE0);
        gl.bind_texture(glow::TEXTURE_2D, None);
    }
}

fn created<T>(kind: ResourceKind, result: Result<T, String>) -> Result<T, RenderError> {
    result.map_err(|reason| RenderError::ObjectCreation { kind, reason })
}

/// One generation of GPU objects for the panel, valid only on the context it
/// was built against.
///
/// Built by [`ContextBoundResources::construct`] and released by
/// [`ContextBoundResources::dispose`], both on the render thread. Dropping a
/// set without disposing it leaks its objects rather than touching a context
/// that may no longer be current.
pub struct ContextBoundResources<G: GlApi> {
    context: RenderContext<G>,
    label: String,
    vertex_shader: G::Shader,
    fragment_shader: G::Shader,
    program: G::Program,
    vertex_buffer: G::Buffer,
    index_buffer: G::Buffer,
    vertex_array: G::VertexArray,
    texture: Option<G::Texture>,
    time_location: Option<G::UniformLocation>,
    ratio_location: Option<G::UniformLocation>,
    sampler_location: Option<G::UniformLocation>,
    released: bool,
}

impl<G: GlApi> ContextBoundResources<G> {
    /// Compiles, links and uploads everything `asset` needs on `context`.
    ///
    /// Any error rolls back the objects created so far; nothing partially
    /// built escapes.
    pub fn construct<R: RngCore + ?Sized>(
        context: &RenderContext<G>,
        asset: &ShaderAsset,
        noise: &mut R,
    ) -> Result<Self, RenderError> {
        let gl = context.gl();
        let stale = drain_errors(gl);
        if stale > 0 {
            debug!(context = ?context.id(), stale, "cleared GL errors left by the host");
        }

        let mut rollback = Rollback::new();
        match Self::build(context, asset, noise, &mut rollback) {
            Ok(resources) => {
                debug!(
                    context = ?context.id(),
                    asset = asset.label(),
                    textured = resources.texture.is_some(),
                    "built panel resources"
                );
                Ok(resources)
            }
            Err(err) => {
                rollback.release(gl);
                Err(err)
            }
        }
    }

    fn build<R: RngCore + ?Sized>(
        context: &RenderContext<G>,
        asset: &ShaderAsset,
        noise: &mut R,
        rollback: &mut Rollback<G>,
    ) -> Result<Self, RenderError> {
        let gl = context.gl();

        let vertex_shader =
            compile_stage(gl, ShaderStage::Vertex, asset.vertex_source(), rollback)?;
        let fragment_shader =
            compile_stage(gl, ShaderStage::Fragment, asset.fragment_source(), rollback)?;

        let program = created(ResourceKind::Program, gl.create_program())?;
        rollback.push(Created::Program(program));
        gl.attach_shader(program, vertex_shader);
        gl.attach_shader(program, fragment_shader);
        gl.bind_attrib_location(program, POSITION_SLOT, POSITION_ATTRIBUTE);
        gl.bind_attrib_location(program, TEXCOORD_SLOT, TEXCOORD_ATTRIBUTE);
        gl.link_program(program);
        if !gl.get_program_link_status(program) {
            return Err(RenderError::ProgramLink {
                log: diagnostic(gl.get_program_info_log(program)),
            });
        }
        check_error(gl, "link program")?;

        let time_location = uniform(gl, program, TIME_UNIFORM, asset);
        let ratio_location = uniform(gl, program, RATIO_UNIFORM, asset);
        let sampler_location = asset
            .texture()
            .and_then(|_| uniform(gl, program, SAMPLER_UNIFORM, asset));
        check_error(gl, "query uniform locations")?;

        // The vertex array records the element buffer binding, so it is bound
        // before the buffers are.
        let vertex_array =
            created(ResourceKind::VertexArray, gl.create_vertex_array())?;
        rollback.push(Created::VertexArray(vertex_array));
        gl.bind_vertex_array(Some(vertex_array));
        check_error(gl, "bind vertex array")?;

        let vertex_buffer = upload_buffer(gl, glow::ARRAY_BUFFER, vertex_bytes(), rollback)?;
        let index_buffer =
            upload_buffer(gl, glow::ELEMENT_ARRAY_BUFFER, index_bytes(), rollback)?;

        gl.vertex_attrib_pointer_f32(
            POSITION_SLOT,
            POSITION_COMPONENTS,
            glow::FLOAT,
            false,
            VERTEX_STRIDE,
            POSITION_OFFSET,
        );
        gl.vertex_attrib_pointer_f32(
            TEXCOORD_SLOT,
            TEXCOORD_COMPONENTS,
            glow::FLOAT,
            false,
            VERTEX_STRIDE,
            TEXCOORD_OFFSET,
        );
        check_error(gl, "describe vertex attributes")?;
        gl.enable_vertex_attrib_array(POSITION_SLOT);
        gl.enable_vertex_attrib_array(TEXCOORD_SLOT);
        check_error(gl, "enable vertex attributes")?;

        let texture = match asset.texture() {
            Some(wrap) => {
                let texture = created(ResourceKind::Texture, gl.create_texture())?;
                rollback.push(Created::Texture(texture));
                gl.active_texture(glow::TEXTURE0);
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                check_error(gl, "bind texture")?;
                upload_noise(gl, &noise_pixels(noise), wrap);
                check_error(gl, "upload texture")?;
                Some(texture)
            }
            None => None,
        };

        Ok(Self {
            context: context.clone(),
            label: asset.label().to_string(),
            vertex_shader,
            fragment_shader,
            program,
            vertex_buffer,
            index_buffer,
            vertex_array,
            texture,
            time_location,
            ratio_location,
            sampler_location,
            released: false,
        })
    }

    /// Draws the quad for one frame.
    ///
    /// Frames smaller than one pixel on either edge return before any GL
    /// call is made.
    pub fn draw(&self, frame: &FrameInput) -> Result<(), RenderError> {
        if !frame.size.is_drawable() {
            return Ok(());
        }
        let gl = self.context.gl();

        let (width, height) = frame.viewport();
        gl.viewport(0, 0, width, height);

        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vertex_buffer));
        gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.index_buffer));
        gl.bind_vertex_array(Some(self.vertex_array));
        gl.use_program(Some(self.program));
        if let Some(texture) = self.texture {
            gl.active_texture(glow::TEXTURE0);
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.uniform_1_i32(self.sampler_location.as_ref(), 0);
        }

        gl.uniform_1_f32(self.time_location.as_ref(), frame.elapsed_seconds as f32);
        gl.uniform_1_f32(self.ratio_location.as_ref(), frame.aspect_ratio());
        check_error(gl, "bind frame state")?;

        gl.draw_elements(
            glow::TRIANGLES,
            QUAD_INDICES.len() as i32,
            glow::UNSIGNED_SHORT,
            0,
        );
        check_error(gl, "draw quad")
    }

    /// Releases every object, unbinding each class before deleting it.
    ///
    /// Never fails: errors raised along the way are drained, so a set built
    /// on a lost or replaced context is still released.
    pub fn dispose(mut self) {
        self.release();
        debug!(context = ?self.context.id(), asset = %self.label, "disposed panel resources");
    }

    fn release(&mut self) {
        let gl = self.context.gl();
        unbind_all(gl, self.texture.is_some());

        gl.delete_vertex_array(self.vertex_array);
        gl.delete_buffer(self.index_buffer);
        gl.delete_buffer(self.vertex_buffer);
        if let Some(texture) = self.texture.take() {
            gl.delete_texture(texture);
        }
        gl.delete_program(self.program);
        gl.delete_shader(self.fragment_shader);
        gl.delete_shader(self.vertex_shader);

        let drained = drain_errors(gl);
        if drained > 0 {
            debug!(context = ?self.context.id(), drained, "ignored GL errors during disposal");
        }
        self.released = true;
    }

    /// Whether `candidate` is the very context these objects belong to.
    pub fn matches_context(&self, candidate: &RenderContext<G>) -> bool {
        self.context.is_same(candidate)
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }
}

impl<G: GlApi> Drop for ContextBoundResources<G> {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                context = ?self.context.id(),
                asset = %self.label,
                "panel resources dropped without dispose; GL objects leaked"
            );
        }
    }
}

fn compile_stage<G: GlApi>(
    gl: &G,
    stage: ShaderStage,
    source: &str,
    rollback: &mut Rollback<G>,
) -> Result<G::Shader, RenderError> {
    let shader = created(ResourceKind::Shader, gl.create_shader(stage.gl_enum()))?;
    rollback.push(Created::Shader(shader));
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        return Err(RenderError::ShaderCompile {
            stage,
            log: diagnostic(gl.get_shader_info_log(shader)),
        });
    }
    check_error(gl, "compile shader")?;
    Ok(shader)
}

fn upload_buffer<G: GlApi>(
    gl: &G,
    target: u32,
    data: &[u8],
    rollback: &mut Rollback<G>,
) -> Result<G::Buffer, RenderError> {
    let buffer = created(ResourceKind::Buffer, gl.create_buffer())?;
    rollback.push(Created::Buffer(buffer));
    gl.bind_buffer(target, Some(buffer));
    check_error(gl, "bind buffer")?;
    gl.buffer_data_u8_slice(target, data, glow::STATIC_DRAW);
    check_error(gl, "upload buffer")?;
    Ok(buffer)
}

fn uniform<G: GlApi>(
    gl: &G,
    program: G::Program,
    name: &str,
    asset: &ShaderAsset,
) -> Option<G::UniformLocation> {
    let location = gl.get_uniform_location(program, name);
    if location.is_none() {
        warn!(
            uniform = name,
            asset = asset.label(),
            "uniform is not active in the linked program; writes to it are ignored"
        );
    }
    location
}

fn diagnostic(log: String) -> String {
    let trimmed = log.trim();
    if trimmed.is_empty() {
        "(driver returned no diagnostic)".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::gl::{HeadlessGl, UniformValue, CONTEXT_LOST};
    use crate::types::{PixelSize, ShaderVariant, TextureWrap};

    fn context() -> RenderContext<HeadlessGl> {
        RenderContext::new(HeadlessGl::new())
    }

    fn build(
        context: &RenderContext<HeadlessGl>,
        variant: ShaderVariant,
    ) -> Result<ContextBoundResources<HeadlessGl>, RenderError> {
        let mut rng = StdRng::seed_from_u64(1);
        ContextBoundResources::construct(context, &ShaderAsset::builtin(variant), &mut rng)
    }

    fn frame(width: i32, height: i32, scale: f64, time: f64) -> FrameInput {
        FrameInput::new(PixelSize::new(width, height), scale, time)
    }

    #[test]
    fn draws_800x600_without_driver_errors() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Bouncy).unwrap();
        resources.draw(&frame(800, 600, 1.0, 0.0)).unwrap();

        let gl = ctx.gl();
        assert_eq!(gl.viewport(), Some([0, 0, 800, 600]));
        assert_eq!(gl.stats().draw_calls, 1);
        assert_eq!(gl.get_error(), glow::NO_ERROR);
        assert_eq!(gl.uniform_value("time"), Some(UniformValue::Float(0.0)));
        assert_eq!(
            gl.uniform_value("ratio"),
            Some(UniformValue::Float(800.0 / 600.0))
        );
        resources.dispose();
    }

    #[test]
    fn viewport_applies_device_scale() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Plasma).unwrap();
        resources.draw(&frame(640, 360, 1.5, 2.25)).unwrap();
        assert_eq!(ctx.gl().viewport(), Some([0, 0, 960, 540]));
        assert_eq!(
            ctx.gl().uniform_value("time"),
            Some(UniformValue::Float(2.25))
        );
        resources.dispose();
    }

    #[test]
    fn degenerate_frame_issues_no_gl_calls() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Noise).unwrap();
        let before = ctx.gl().call_count();
        resources.draw(&frame(0, 600, 1.0, 1.0)).unwrap();
        resources.draw(&frame(800, 0, 1.0, 1.0)).unwrap();
        assert_eq!(ctx.gl().call_count(), before);
        resources.dispose();
    }

    #[test]
    fn texture_variants_upload_square_noise_with_variant_wrap() {
        for (variant, wrap) in [
            (ShaderVariant::Noise, TextureWrap::Repeat),
            (ShaderVariant::Grain, TextureWrap::ClampToEdge),
        ] {
            let ctx = context();
            let resources = build(&ctx, variant).unwrap();
            let texture = resources.texture.expect("texture variant");
            let gl = ctx.gl();
            assert_eq!(gl.texture_size(texture), Some((64, 64)));
            for parameter in [glow::TEXTURE_MIN_FILTER, glow::TEXTURE_MAG_FILTER] {
                assert_eq!(
                    gl.texture_parameter(texture, parameter),
                    Some(glow::LINEAR as i32)
                );
            }
            for parameter in [glow::TEXTURE_WRAP_S, glow::TEXTURE_WRAP_T] {
                assert_eq!(
                    gl.texture_parameter(texture, parameter),
                    Some(wrap.gl_enum() as i32)
                );
            }

            resources.draw(&frame(100, 100, 1.0, 0.5)).unwrap();
            assert_eq!(gl.uniform_value("tex"), Some(UniformValue::Int(0)));
            resources.dispose();
        }
    }

    #[test]
    fn plain_variants_allocate_no_texture() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Bouncy).unwrap();
        assert!(resources.texture.is_none());
        assert!(ctx
            .gl()
            .live_objects()
            .iter()
            .all(|(kind, _)| *kind != ResourceKind::Texture));
        resources.dispose();
    }

    #[test]
    fn dispose_releases_exactly_what_construction_allocated() {
        for variant in ShaderVariant::ALL {
            let ctx = context();
            let resources = build(&ctx, variant).unwrap();
            resources.draw(&frame(320, 200, 2.0, 3.0)).unwrap();
            resources.dispose();

            let stats = ctx.gl().stats();
            let allocated: BTreeSet<_> = stats.allocated.iter().copied().collect();
            let released: BTreeSet<_> = stats.released.iter().copied().collect();
            assert_eq!(allocated, released, "{variant}");
            assert_eq!(stats.allocated.len(), stats.released.len(), "{variant}");
            assert_eq!(stats.double_releases, 0, "{variant}");
            assert_eq!(stats.deleted_while_bound, 0, "{variant}");
            assert!(ctx.gl().bindings_clear(), "{variant}");
        }
    }

    #[test]
    fn draw_binds_buffers_then_vertex_array_then_program() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Noise).unwrap();
        let start = ctx.gl().calls().len();
        resources.draw(&frame(32, 32, 1.0, 0.0)).unwrap();

        let calls = ctx.gl().calls();
        assert_eq!(
            &calls[start..start + 7],
            &[
                "viewport",
                "bind_buffer",
                "bind_buffer",
                "bind_vertex_array",
                "use_program",
                "active_texture",
                "bind_texture",
            ]
        );
        resources.dispose();
    }

    #[test]
    fn dispose_unbinds_each_class_before_deleting() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Grain).unwrap();
        resources.draw(&frame(10, 10, 1.0, 0.0)).unwrap();
        let start = ctx.gl().calls().len();
        resources.dispose();

        let calls = ctx.gl().calls();
        let tail = &calls[start..];
        let first_delete = tail
            .iter()
            .position(|call| call.starts_with("delete_"))
            .unwrap();
        assert_eq!(
            &tail[..first_delete],
            &[
                "bind_buffer",
                "bind_buffer",
                "bind_vertex_array",
                "use_program",
                "active_texture",
                "bind_texture",
            ]
        );
    }

    #[test]
    fn fragment_syntax_error_reports_compile_failure_and_leaks_nothing() {
        let ctx = context();
        let asset = ShaderAsset::builtin(ShaderVariant::Bouncy)
            .with_fragment("#version 300 es\nvoid main() {\n  broken);\n}\n");
        let err = ContextBoundResources::construct(&ctx, &asset, &mut StdRng::seed_from_u64(0))
            .err()
            .expect("compile failure");

        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("0:3"), "{log}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let gl = ctx.gl();
        assert!(gl.live_objects().is_empty());
        assert!(gl
            .stats()
            .allocated
            .iter()
            .all(|(kind, _)| *kind == ResourceKind::Shader));
    }

    #[test]
    fn link_failure_rolls_back_shaders_and_program() {
        let ctx = context();
        ctx.gl().fail_next_link("error: varying v_texcoord not written");
        let err = build(&ctx, ShaderVariant::Plasma).err().expect("link failure");
        assert_eq!(
            err,
            RenderError::ProgramLink {
                log: "error: varying v_texcoord not written".into()
            }
        );
        let stats = ctx.gl().stats();
        assert_eq!(stats.allocated.len(), 3);
        assert!(ctx.gl().live_objects().is_empty());
    }

    #[test]
    fn driver_error_mid_construction_rolls_back_every_object() {
        for (call, operation) in [
            ("bind_vertex_array", "bind vertex array"),
            ("buffer_data", "upload buffer"),
            ("enable_vertex_attrib_array", "enable vertex attributes"),
            ("tex_image_2d", "upload texture"),
        ] {
            let ctx = context();
            ctx.gl().fail_after(call, glow::OUT_OF_MEMORY);
            let err = build(&ctx, ShaderVariant::Noise).err().expect(operation);
            assert_eq!(
                err,
                RenderError::UnexpectedDriver {
                    code: glow::OUT_OF_MEMORY,
                    operation
                }
            );

            let gl = ctx.gl();
            let stats = gl.stats();
            assert!(gl.live_objects().is_empty(), "{operation}");
            assert_eq!(stats.allocated.len(), stats.released.len(), "{operation}");
            assert_eq!(stats.deleted_while_bound, 0, "{operation}");
            assert_eq!(stats.double_releases, 0, "{operation}");
            assert!(gl.bindings_clear(), "{operation}");
            assert_eq!(gl.get_error(), glow::NO_ERROR, "{operation}");
        }
    }

    #[test]
    fn texture_upload_failure_releases_the_texture_too() {
        let ctx = context();
        ctx.gl().fail_after("tex_image_2d", glow::OUT_OF_MEMORY);
        assert!(build(&ctx, ShaderVariant::Noise).is_err());
        let released = ctx.gl().stats().released;
        assert_eq!(
            released
                .iter()
                .filter(|(kind, _)| *kind == ResourceKind::Texture)
                .count(),
            1
        );
        assert_eq!(released.len(), 7);
    }

    #[test]
    fn stale_host_errors_do_not_fail_construction() {
        let ctx = context();
        ctx.gl().inject_error(glow::INVALID_ENUM);
        ctx.gl().inject_error(glow::INVALID_VALUE);
        let resources = build(&ctx, ShaderVariant::Bouncy).unwrap();
        resources.dispose();
    }

    #[test]
    fn driver_error_during_draw_is_reported() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Bouncy).unwrap();
        ctx.gl().inject_error(glow::OUT_OF_MEMORY);
        let err = resources.draw(&frame(64, 64, 1.0, 0.0)).unwrap_err();
        assert_eq!(
            err,
            RenderError::UnexpectedDriver {
                code: glow::OUT_OF_MEMORY,
                operation: "bind frame state"
            }
        );
        resources.dispose();
    }

    #[test]
    fn dispose_completes_on_lost_context() {
        let ctx = context();
        let resources = build(&ctx, ShaderVariant::Noise).unwrap();
        ctx.gl().lose_context();
        resources.dispose();
        assert!(ctx.gl().live_objects().is_empty());
        assert_eq!(ctx.gl().get_error(), CONTEXT_LOST);
    }

    #[test]
    fn construction_on_lost_context_fails_cleanly() {
        let ctx = context();
        ctx.gl().lose_context();
        let err = build(&ctx, ShaderVariant::Bouncy).err().expect("lost context");
        assert!(matches!(
            err,
            RenderError::ObjectCreation {
                kind: ResourceKind::Shader,
                ..
            }
        ));
    }

    #[test]
    fn matches_only_its_own_context() {
        let first = context();
        let second = context();
        let resources = build(&first, ShaderVariant::Bouncy).unwrap();
        assert!(resources.matches_context(&first));
        assert!(resources.matches_context(&first.clone()));
        assert!(!resources.matches_context(&second));
        resources.dispose();
    }
}
