//! In-memory driver that behaves like a strict GL implementation without
//! touching a GPU.
//!
//! Object names come from one counter shared by every kind, bindings are
//! tracked per target, and misuse (binding a deleted name, drawing without a
//! program, uploading to an unbound target, ...) queues the same error flag a
//! conforming driver would. Shader compilation runs a small lexical check:
//! unbalanced brackets, `#error` directives and a missing `main` fail with a
//! GLSL-style diagnostic. Uniforms are discovered from `uniform` declarations
//! of the attached sources.
//!
//! Every entry point is recorded, and allocations/releases are accounted per
//! kind, which makes the driver suitable both for tests and for soak runs.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::num::NonZeroU32;

use super::{GlApi, ResourceKind, CONTEXT_LOST};

macro_rules! headless_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Raw object name.
            pub fn name(self) -> u32 {
                self.0.get()
            }
        }
    };
}

headless_handle!(HeadlessShader);
headless_handle!(HeadlessProgram);
headless_handle!(HeadlessBuffer);
headless_handle!(HeadlessVertexArray);
headless_handle!(HeadlessTexture);

/// Uniform location: owning program plus declaration index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessUniform {
    program: u32,
    index: usize,
}

/// Last value written to a uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
}

/// Allocation accounting for one headless context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    /// Objects created, in creation order.
    pub allocated: Vec<(ResourceKind, u32)>,
    /// Objects deleted, in deletion order.
    pub released: Vec<(ResourceKind, u32)>,
    /// Deletes of names that had already been deleted.
    pub double_releases: u32,
    /// Deletes of objects that were still bound at the time.
    pub deleted_while_bound: u32,
    pub draw_calls: u64,
    pub calls: u64,
}

impl HeadlessStats {
    /// Objects allocated and not yet released.
    pub fn live(&self) -> usize {
        self.allocated.len().saturating_sub(self.released.len())
    }
}

#[derive(Debug)]
enum CompileStatus {
    Pending,
    Compiled,
    Failed(String),
}

#[derive(Debug)]
struct ShaderObject {
    source: String,
    status: CompileStatus,
}

#[derive(Debug, Default)]
struct ProgramObject {
    attached: Vec<u32>,
    attributes: BTreeMap<u32, String>,
    linked: bool,
    log: String,
    uniforms: Vec<String>,
    values: HashMap<usize, UniformValue>,
}

#[derive(Debug, Default)]
struct TextureObject {
    parameters: HashMap<u32, i32>,
    size: Option<(i32, i32)>,
}

#[derive(Debug, Default)]
struct Bindings {
    array_buffer: Option<u32>,
    element_buffer: Option<u32>,
    vertex_array: Option<u32>,
    program: Option<u32>,
    active_unit: u32,
    textures: HashMap<u32, u32>,
}

impl Bindings {
    fn buffer_slot(&mut self, target: u32) -> Option<&mut Option<u32>> {
        match target {
            glow::ARRAY_BUFFER => Some(&mut self.array_buffer),
            glow::ELEMENT_ARRAY_BUFFER => Some(&mut self.element_buffer),
            _ => None,
        }
    }

    fn holds(&self, name: u32) -> bool {
        self.array_buffer == Some(name)
            || self.element_buffer == Some(name)
            || self.vertex_array == Some(name)
            || self.program == Some(name)
            || self.textures.values().any(|bound| *bound == name)
    }

    fn forget(&mut self, name: u32) {
        for slot in [
            &mut self.array_buffer,
            &mut self.element_buffer,
            &mut self.vertex_array,
            &mut self.program,
        ] {
            if *slot == Some(name) {
                *slot = None;
            }
        }
        self.textures.retain(|_, bound| *bound != name);
    }
}

#[derive(Debug)]
struct HeadlessState {
    next_name: u32,
    live: HashMap<u32, ResourceKind>,
    released_names: HashSet<u32>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    buffers: HashMap<u32, usize>,
    vertex_arrays: HashSet<u32>,
    textures: HashMap<u32, TextureObject>,
    enabled_attributes: HashSet<u32>,
    bindings: Bindings,
    viewport: Option<[i32; 4]>,
    errors: VecDeque<u32>,
    lost: bool,
    link_failure: Option<String>,
    fail_after: Option<(&'static str, u32)>,
    call_log: Vec<&'static str>,
    stats: HeadlessStats,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            next_name: 1,
            live: HashMap::new(),
            released_names: HashSet::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashSet::new(),
            textures: HashMap::new(),
            enabled_attributes: HashSet::new(),
            bindings: Bindings::default(),
            viewport: None,
            errors: VecDeque::new(),
            lost: false,
            link_failure: None,
            fail_after: None,
            call_log: Vec::new(),
            stats: HeadlessStats::default(),
        }
    }
}

impl HeadlessState {
    fn record(&mut self, call: &'static str) {
        self.call_log.push(call);
        self.stats.calls += 1;
        if let Some((_, code)) = self.fail_after.filter(|(armed, _)| *armed == call) {
            self.fail_after = None;
            self.raise(code);
        }
    }

    fn raise(&mut self, code: u32) {
        if !self.errors.contains(&code) {
            self.errors.push_back(code);
        }
    }

    fn allocate(&mut self, kind: ResourceKind) -> Result<NonZeroU32, String> {
        if self.lost {
            return Err(format!("cannot create {kind}: context lost"));
        }
        let raw = self.next_name;
        self.next_name = self.next_name.wrapping_add(1).max(1);
        let name = NonZeroU32::new(raw).ok_or_else(|| "object names exhausted".to_string())?;
        self.live.insert(raw, kind);
        self.stats.allocated.push((kind, raw));
        Ok(name)
    }

    /// Returns true when the object existed and is now gone.
    fn release(&mut self, kind: ResourceKind, name: u32) -> bool {
        match self.live.get(&name) {
            Some(live_kind) if *live_kind == kind => {
                self.live.remove(&name);
                self.released_names.insert(name);
                self.stats.released.push((kind, name));
                if self.bindings.holds(name) {
                    self.stats.deleted_while_bound += 1;
                    self.bindings.forget(name);
                }
                true
            }
            Some(_) => {
                self.raise(glow::INVALID_OPERATION);
                false
            }
            None => {
                if self.released_names.contains(&name) {
                    self.stats.double_releases += 1;
                }
                false
            }
        }
    }

    fn is_live(&self, kind: ResourceKind, name: u32) -> bool {
        self.live.get(&name) == Some(&kind)
    }

    fn bound_texture(&self) -> Option<u32> {
        self.bindings.textures.get(&self.bindings.active_unit).copied()
    }
}

/// Headless GL driver. See the module docs.
#[derive(Debug, Default)]
pub struct HeadlessGl {
    state: RefCell<HeadlessState>,
}

impl HeadlessGl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error flag as if the previous call had failed.
    pub fn inject_error(&self, code: u32) {
        self.state.borrow_mut().raise(code);
    }

    /// Makes the next `link_program` fail with the given log.
    pub fn fail_next_link(&self, log: impl Into<String>) {
        self.state.borrow_mut().link_failure = Some(log.into());
    }

    /// Queues `code` when the entry point named `call` (as reported by
    /// [`calls`](Self::calls)) is next invoked.
    pub fn fail_after(&self, call: &'static str, code: u32) {
        self.state.borrow_mut().fail_after = Some((call, code));
    }

    /// Simulates a lost context: creation fails, every error query reports
    /// `CONTEXT_LOST`, deletes still succeed.
    pub fn lose_context(&self) {
        self.state.borrow_mut().lost = true;
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats.clone()
    }

    pub fn call_count(&self) -> u64 {
        self.state.borrow().stats.calls
    }

    /// Names of every entry point invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().call_log.clone()
    }

    /// Objects allocated and not yet released, sorted by name.
    pub fn live_objects(&self) -> Vec<(ResourceKind, u32)> {
        let state = self.state.borrow();
        let mut live: Vec<_> = state.live.iter().map(|(name, kind)| (*kind, *name)).collect();
        live.sort_by_key(|(_, name)| *name);
        live
    }

    pub fn viewport(&self) -> Option<[i32; 4]> {
        self.state.borrow().viewport
    }

    /// True when no buffer, vertex array, program or texture is bound.
    pub fn bindings_clear(&self) -> bool {
        let state = self.state.borrow();
        let bindings = &state.bindings;
        bindings.array_buffer.is_none()
            && bindings.element_buffer.is_none()
            && bindings.vertex_array.is_none()
            && bindings.program.is_none()
            && bindings.textures.is_empty()
    }

    /// Value last written to `name` in the bound program.
    pub fn uniform_value(&self, name: &str) -> Option<UniformValue> {
        let state = self.state.borrow();
        let program = state.programs.get(&state.bindings.program?)?;
        let index = program.uniforms.iter().position(|uniform| uniform == name)?;
        program.values.get(&index).copied()
    }

    pub fn texture_parameter(&self, texture: HeadlessTexture, parameter: u32) -> Option<i32> {
        let state = self.state.borrow();
        state
            .textures
            .get(&texture.name())?
            .parameters
            .get(&parameter)
            .copied()
    }

    pub fn texture_size(&self, texture: HeadlessTexture) -> Option<(i32, i32)> {
        self.state.borrow().textures.get(&texture.name())?.size
    }
}

impl GlApi for HeadlessGl {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Buffer = HeadlessBuffer;
    type VertexArray = HeadlessVertexArray;
    type Texture = HeadlessTexture;
    type UniformLocation = HeadlessUniform;

    fn get_error(&self) -> u32 {
        let mut state = self.state.borrow_mut();
        state.record("get_error");
        if state.lost {
            return CONTEXT_LOST;
        }
        state.errors.pop_front().unwrap_or(glow::NO_ERROR)
    }

    fn create_shader(&self, shader_type: u32) -> Result<Self::Shader, String> {
        let mut state = self.state.borrow_mut();
        state.record("create_shader");
        if !matches!(shader_type, glow::VERTEX_SHADER | glow::FRAGMENT_SHADER) {
            state.raise(glow::INVALID_ENUM);
            return Err(format!("unsupported shader type 0x{shader_type:04x}"));
        }
        let name = state.allocate(ResourceKind::Shader)?;
        state.shaders.insert(
            name.get(),
            ShaderObject {
                source: String::new(),
                status: CompileStatus::Pending,
            },
        );
        Ok(HeadlessShader(name))
    }

    fn shader_source(&self, shader: Self::Shader, source: &str) {
        let mut state = self.state.borrow_mut();
        state.record("shader_source");
        let lost = state.lost;
        match state.shaders.get_mut(&shader.name()) {
            Some(object) => object.source = source.to_string(),
            None if !lost => state.raise(glow::INVALID_VALUE),
            None => {}
        }
    }

    fn compile_shader(&self, shader: Self::Shader) {
        let mut state = self.state.borrow_mut();
        state.record("compile_shader");
        let lost = state.lost;
        match state.shaders.get_mut(&shader.name()) {
            Some(object) => {
                object.status = match check_glsl(&object.source) {
                    Ok(()) => CompileStatus::Compiled,
                    Err(log) => CompileStatus::Failed(log),
                };
            }
            None if !lost => state.raise(glow::INVALID_VALUE),
            None => {}
        }
    }

    fn get_shader_compile_status(&self, shader: Self::Shader) -> bool {
        let mut state = self.state.borrow_mut();
        state.record("get_shader_compile_status");
        matches!(
            state.shaders.get(&shader.name()).map(|object| &object.status),
            Some(CompileStatus::Compiled)
        )
    }

    fn get_shader_info_log(&self, shader: Self::Shader) -> String {
        let mut state = self.state.borrow_mut();
        state.record("get_shader_info_log");
        match state.shaders.get(&shader.name()).map(|object| &object.status) {
            Some(CompileStatus::Failed(log)) => log.clone(),
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: Self::Shader) {
        let mut state = self.state.borrow_mut();
        state.record("delete_shader");
        if state.release(ResourceKind::Shader, shader.name()) {
            state.shaders.remove(&shader.name());
        }
    }

    fn create_program(&self) -> Result<Self::Program, String> {
        let mut state = self.state.borrow_mut();
        state.record("create_program");
        let name = state.allocate(ResourceKind::Program)?;
        state.programs.insert(name.get(), ProgramObject::default());
        Ok(HeadlessProgram(name))
    }

    fn attach_shader(&self, program: Self::Program, shader: Self::Shader) {
        let mut state = self.state.borrow_mut();
        state.record("attach_shader");
        if state.lost {
            return;
        }
        if !state.is_live(ResourceKind::Shader, shader.name()) {
            state.raise(glow::INVALID_VALUE);
            return;
        }
        match state.programs.get_mut(&program.name()) {
            Some(object) if object.attached.contains(&shader.name()) => {
                state.raise(glow::INVALID_OPERATION)
            }
            Some(object) => object.attached.push(shader.name()),
            None => state.raise(glow::INVALID_VALUE),
        }
    }

    fn bind_attrib_location(&self, program: Self::Program, index: u32, name: &str) {
        let mut state = self.state.borrow_mut();
        state.record("bind_attrib_location");
        if state.lost {
            return;
        }
        if name.starts_with("gl_") {
            state.raise(glow::INVALID_OPERATION);
            return;
        }
        match state.programs.get_mut(&program.name()) {
            Some(object) => {
                object.attributes.insert(index, name.to_string());
            }
            None => state.raise(glow::INVALID_VALUE),
        }
    }

    fn link_program(&self, program: Self::Program) {
        let mut state = self.state.borrow_mut();
        state.record("link_program");
        if state.lost {
            return;
        }
        let Some(object) = state.programs.get(&program.name()) else {
            state.raise(glow::INVALID_VALUE);
            return;
        };

        let mut uniforms = Vec::new();
        let mut stages_ok = !object.attached.is_empty();
        for shader in &object.attached {
            match state.shaders.get(shader) {
                Some(ShaderObject {
                    source,
                    status: CompileStatus::Compiled,
                }) => {
                    for uniform in declared_uniforms(source) {
                        if !uniforms.contains(&uniform) {
                            uniforms.push(uniform);
                        }
                    }
                }
                _ => stages_ok = false,
            }
        }
        let attached_count = object.attached.len();

        let outcome = match state.link_failure.take() {
            Some(log) => Err(log),
            None if !stages_ok => {
                Err("error: linking with uncompiled or missing shader stages".to_string())
            }
            None if attached_count < 2 => {
                Err("error: program requires a vertex and a fragment stage".to_string())
            }
            None => Ok(uniforms),
        };

        if let Some(object) = state.programs.get_mut(&program.name()) {
            object.values.clear();
            match outcome {
                Ok(uniforms) => {
                    object.linked = true;
                    object.log.clear();
                    object.uniforms = uniforms;
                }
                Err(log) => {
                    object.linked = false;
                    object.log = log;
                    object.uniforms.clear();
                }
            }
        }
    }

    fn get_program_link_status(&self, program: Self::Program) -> bool {
        let mut state = self.state.borrow_mut();
        state.record("get_program_link_status");
        state
            .programs
            .get(&program.name())
            .is_some_and(|object| object.linked)
    }

    fn get_program_info_log(&self, program: Self::Program) -> String {
        let mut state = self.state.borrow_mut();
        state.record("get_program_info_log");
        state
            .programs
            .get(&program.name())
            .map(|object| object.log.clone())
            .unwrap_or_default()
    }

    fn get_uniform_location(
        &self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation> {
        let mut state = self.state.borrow_mut();
        state.record("get_uniform_location");
        if state.lost {
            return None;
        }
        let lookup = state.programs.get(&program.name()).map(|object| {
            (
                object.linked,
                object.uniforms.iter().position(|uniform| uniform == name),
            )
        });
        match lookup {
            None => {
                state.raise(glow::INVALID_VALUE);
                None
            }
            Some((false, _)) => {
                state.raise(glow::INVALID_OPERATION);
                None
            }
            Some((true, index)) => index.map(|index| HeadlessUniform {
                program: program.name(),
                index,
            }),
        }
    }

    fn use_program(&self, program: Option<Self::Program>) {
        let mut state = self.state.borrow_mut();
        state.record("use_program");
        if state.lost {
            return;
        }
        match program {
            None => state.bindings.program = None,
            Some(program) => match state.programs.get(&program.name()) {
                Some(object) if object.linked => state.bindings.program = Some(program.name()),
                Some(_) => state.raise(glow::INVALID_OPERATION),
                None => state.raise(glow::INVALID_VALUE),
            },
        }
    }

    fn delete_program(&self, program: Self::Program) {
        let mut state = self.state.borrow_mut();
        state.record("delete_program");
        if state.release(ResourceKind::Program, program.name()) {
            state.programs.remove(&program.name());
        }
    }

    fn create_buffer(&self) -> Result<Self::Buffer, String> {
        let mut state = self.state.borrow_mut();
        state.record("create_buffer");
        let name = state.allocate(ResourceKind::Buffer)?;
        state.buffers.insert(name.get(), 0);
        Ok(HeadlessBuffer(name))
    }

    fn bind_buffer(&self, target: u32, buffer: Option<Self::Buffer>) {
        let mut state = self.state.borrow_mut();
        state.record("bind_buffer");
        if state.lost {
            return;
        }
        let live = buffer.map_or(true, |buffer| {
            state.is_live(ResourceKind::Buffer, buffer.name())
        });
        if !live {
            state.raise(glow::INVALID_OPERATION);
            return;
        }
        match state.bindings.buffer_slot(target) {
            Some(slot) => *slot = buffer.map(HeadlessBuffer::name),
            None => state.raise(glow::INVALID_ENUM),
        }
    }

    fn buffer_data_u8_slice(&self, target: u32, data: &[u8], usage: u32) {
        let mut state = self.state.borrow_mut();
        state.record("buffer_data");
        if state.lost {
            return;
        }
        if !matches!(
            usage,
            glow::STATIC_DRAW | glow::DYNAMIC_DRAW | glow::STREAM_DRAW
        ) {
            state.raise(glow::INVALID_ENUM);
            return;
        }
        let bound = match state.bindings.buffer_slot(target) {
            Some(slot) => *slot,
            None => {
                state.raise(glow::INVALID_ENUM);
                return;
            }
        };
        match bound {
            Some(name) => {
                state.buffers.insert(name, data.len());
            }
            None => state.raise(glow::INVALID_OPERATION),
        }
    }

    fn delete_buffer(&self, buffer: Self::Buffer) {
        let mut state = self.state.borrow_mut();
        state.record("delete_buffer");
        if state.release(ResourceKind::Buffer, buffer.name()) {
            state.buffers.remove(&buffer.name());
        }
    }

    fn create_vertex_array(&self) -> Result<Self::VertexArray, String> {
        let mut state = self.state.borrow_mut();
        state.record("create_vertex_array");
        let name = state.allocate(ResourceKind::VertexArray)?;
        state.vertex_arrays.insert(name.get());
        Ok(HeadlessVertexArray(name))
    }

    fn bind_vertex_array(&self, vertex_array: Option<Self::VertexArray>) {
        let mut state = self.state.borrow_mut();
        state.record("bind_vertex_array");
        if state.lost {
            return;
        }
        match vertex_array {
            None => state.bindings.vertex_array = None,
            Some(vao) if state.vertex_arrays.contains(&vao.name()) => {
                state.bindings.vertex_array = Some(vao.name())
            }
            Some(_) => state.raise(glow::INVALID_OPERATION),
        }
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: i32,
        data_type: u32,
        _normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        let mut state = self.state.borrow_mut();
        state.record("vertex_attrib_pointer");
        if state.lost {
            return;
        }
        if data_type != glow::FLOAT {
            state.raise(glow::INVALID_ENUM);
        } else if !(1..=4).contains(&size) || stride < 0 || offset < 0 {
            state.raise(glow::INVALID_VALUE);
        } else if state.bindings.vertex_array.is_none() || state.bindings.array_buffer.is_none()
        {
            state.raise(glow::INVALID_OPERATION);
        } else if index >= 16 {
            state.raise(glow::INVALID_VALUE);
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        let mut state = self.state.borrow_mut();
        state.record("enable_vertex_attrib_array");
        if state.lost {
            return;
        }
        if state.bindings.vertex_array.is_none() {
            state.raise(glow::INVALID_OPERATION);
        } else if index >= 16 {
            state.raise(glow::INVALID_VALUE);
        } else {
            state.enabled_attributes.insert(index);
        }
    }

    fn delete_vertex_array(&self, vertex_array: Self::VertexArray) {
        let mut state = self.state.borrow_mut();
        state.record("delete_vertex_array");
        if state.release(ResourceKind::VertexArray, vertex_array.name()) {
            state.vertex_arrays.remove(&vertex_array.name());
        }
    }

    fn create_texture(&self) -> Result<Self::Texture, String> {
        let mut state = self.state.borrow_mut();
        state.record("create_texture");
        let name = state.allocate(ResourceKind::Texture)?;
        state.textures.insert(name.get(), TextureObject::default());
        Ok(HeadlessTexture(name))
    }

    fn active_texture(&self, unit: u32) {
        let mut state = self.state.borrow_mut();
        state.record("active_texture");
        if state.lost {
            return;
        }
        if (glow::TEXTURE0..glow::TEXTURE0 + 32).contains(&unit) {
            state.bindings.active_unit = unit - glow::TEXTURE0;
        } else {
            state.raise(glow::INVALID_ENUM);
        }
    }

    fn bind_texture(&self, target: u32, texture: Option<Self::Texture>) {
        let mut state = self.state.borrow_mut();
        state.record("bind_texture");
        if state.lost {
            return;
        }
        if target != glow::TEXTURE_2D {
            state.raise(glow::INVALID_ENUM);
            return;
        }
        let unit = state.bindings.active_unit;
        match texture {
            None => {
                state.bindings.textures.remove(&unit);
            }
            Some(texture) if state.textures.contains_key(&texture.name()) => {
                state.bindings.textures.insert(unit, texture.name());
            }
            Some(_) => state.raise(glow::INVALID_OPERATION),
        }
    }

    fn tex_parameter_i32(&self, target: u32, parameter: u32, value: i32) {
        let mut state = self.state.borrow_mut();
        state.record("tex_parameter");
        if state.lost {
            return;
        }
        if target != glow::TEXTURE_2D {
            state.raise(glow::INVALID_ENUM);
            return;
        }
        let Some(name) = state.bound_texture() else {
            state.raise(glow::INVALID_OPERATION);
            return;
        };
        if let Some(texture) = state.textures.get_mut(&name) {
            texture.parameters.insert(parameter, value);
        }
    }

    fn tex_image_2d(
        &self,
        target: u32,
        _level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        let mut state = self.state.borrow_mut();
        state.record("tex_image_2d");
        if state.lost {
            return;
        }
        if target != glow::TEXTURE_2D {
            state.raise(glow::INVALID_ENUM);
            return;
        }
        if width < 0 || height < 0 || border != 0 {
            state.raise(glow::INVALID_VALUE);
            return;
        }
        let Some(name) = state.bound_texture() else {
            state.raise(glow::INVALID_OPERATION);
            return;
        };
        if let Some(pixels) = pixels {
            let texel = match (format, ty) {
                (glow::RGBA, glow::UNSIGNED_BYTE) => 4,
                (glow::RGB, glow::UNSIGNED_BYTE) => 3,
                _ => {
                    state.raise(glow::INVALID_ENUM);
                    return;
                }
            };
            if pixels.len() < width as usize * height as usize * texel {
                state.raise(glow::INVALID_OPERATION);
                return;
            }
        }
        if let Some(texture) = state.textures.get_mut(&name) {
            texture.size = Some((width, height));
        }
    }

    fn delete_texture(&self, texture: Self::Texture) {
        let mut state = self.state.borrow_mut();
        state.record("delete_texture");
        if state.release(ResourceKind::Texture, texture.name()) {
            state.textures.remove(&texture.name());
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        let mut state = self.state.borrow_mut();
        state.record("viewport");
        if state.lost {
            return;
        }
        if width < 0 || height < 0 {
            state.raise(glow::INVALID_VALUE);
        } else {
            state.viewport = Some([x, y, width, height]);
        }
    }

    fn uniform_1_f32(&self, location: Option<&Self::UniformLocation>, x: f32) {
        self.write_uniform("uniform_1_f32", location, UniformValue::Float(x));
    }

    fn uniform_1_i32(&self, location: Option<&Self::UniformLocation>, x: i32) {
        self.write_uniform("uniform_1_i32", location, UniformValue::Int(x));
    }

    fn draw_elements(&self, mode: u32, count: i32, element_type: u32, offset: i32) {
        let mut state = self.state.borrow_mut();
        state.record("draw_elements");
        if state.lost {
            return;
        }
        let index_size = match element_type {
            glow::UNSIGNED_BYTE => 1,
            glow::UNSIGNED_SHORT => 2,
            glow::UNSIGNED_INT => 4,
            _ => {
                state.raise(glow::INVALID_ENUM);
                return;
            }
        };
        if !matches!(
            mode,
            glow::TRIANGLES | glow::TRIANGLE_STRIP | glow::TRIANGLE_FAN | glow::LINES | glow::POINTS
        ) {
            state.raise(glow::INVALID_ENUM);
            return;
        }
        if count < 0 || offset < 0 {
            state.raise(glow::INVALID_VALUE);
            return;
        }
        let ready = state.bindings.program.is_some() && state.bindings.vertex_array.is_some();
        let index_bytes = state
            .bindings
            .element_buffer
            .and_then(|name| state.buffers.get(&name).copied());
        match index_bytes {
            Some(bytes) if ready && offset as usize + count as usize * index_size <= bytes => {
                state.stats.draw_calls += 1;
            }
            _ => state.raise(glow::INVALID_OPERATION),
        }
    }
}

impl HeadlessGl {
    fn write_uniform(
        &self,
        call: &'static str,
        location: Option<&HeadlessUniform>,
        value: UniformValue,
    ) {
        let mut state = self.state.borrow_mut();
        state.record(call);
        let Some(location) = location else {
            return;
        };
        if state.lost {
            return;
        }
        if state.bindings.program != Some(location.program) {
            state.raise(glow::INVALID_OPERATION);
            return;
        }
        if let Some(program) = state.programs.get_mut(&location.program) {
            program.values.insert(location.index, value);
        }
    }
}

/// Lexical compile check producing GLSL-compiler-style diagnostics.
fn check_glsl(source: &str) -> Result<(), String> {
    let stripped = strip_comments(source)?;
    let mut open: Vec<(char, usize)> = Vec::new();
    for (index, code) in stripped.lines().enumerate() {
        let line_no = index + 1;
        if let Some(message) = code.trim_start().strip_prefix("#error") {
            return Err(format!(
                "ERROR: 0:{line_no}: '#error' : {}",
                message.trim()
            ));
        }
        for ch in code.chars() {
            match ch {
                '{' | '(' | '[' => open.push((ch, line_no)),
                '}' | ')' | ']' => {
                    let expected = match ch {
                        '}' => '{',
                        ')' => '(',
                        _ => '[',
                    };
                    match open.pop() {
                        Some((opened, _)) if opened == expected => {}
                        _ => return Err(format!("ERROR: 0:{line_no}: '{ch}' : syntax error")),
                    }
                }
                _ => {}
            }
        }
    }
    if let Some((ch, line_no)) = open.pop() {
        return Err(format!(
            "ERROR: 0:{line_no}: '{ch}' : unexpected end of file"
        ));
    }
    if !stripped.contains("void main") {
        return Err("ERROR: 0:0: '' : missing function main".to_string());
    }
    Ok(())
}

/// Replaces `//` and `/* */` comments with whitespace, keeping line breaks so
/// diagnostics still point at the original lines.
fn strip_comments(source: &str) -> Result<String, String> {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut block_start = None;
    let mut line = 1;
    while let Some(ch) = chars.next() {
        if ch == '\n' {
            line += 1;
            out.push(ch);
            continue;
        }
        if block_start.is_some() {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                block_start = None;
                out.push(' ');
            }
            continue;
        }
        let next = chars.peek().copied();
        match (ch, next) {
            ('/', Some('*')) => {
                chars.next();
                block_start = Some(line);
            }
            ('/', Some('/')) => {
                while chars.next_if(|next| *next != '\n').is_some() {}
            }
            _ => out.push(ch),
        }
    }
    match block_start {
        Some(line) => Err(format!("ERROR: 0:{line}: '/*' : unterminated comment")),
        None => Ok(out),
    }
}

fn declared_uniforms(source: &str) -> Vec<String> {
    strip_comments(source)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| {
            let code = line.trim();
            let declaration = code.strip_prefix("uniform ")?.split(';').next()?;
            let name = declaration.split_whitespace().last()?;
            Some(name.split('[').next().unwrap_or(name).to_string())
        })
        .collect()
}
