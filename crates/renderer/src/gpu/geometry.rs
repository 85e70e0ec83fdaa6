use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};

/// Quad vertex: clip-space position followed by texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct Vertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
}

impl Vertex {
    const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            position: [x, y, 0.0],
            texcoord: [u, v],
        }
    }
}

/// Full-viewport quad; texture V grows downwards.
pub(crate) const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new(-1.0, -1.0, 0.0, 1.0),
    Vertex::new(1.0, -1.0, 1.0, 1.0),
    Vertex::new(-1.0, 1.0, 0.0, 0.0),
    Vertex::new(1.0, 1.0, 1.0, 0.0),
];

/// Two counter-clockwise triangles over `QUAD_VERTICES`.
pub(crate) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 3, 2];

pub(crate) const VERTEX_STRIDE: i32 = size_of::<Vertex>() as i32;
pub(crate) const POSITION_OFFSET: i32 = offset_of!(Vertex, position) as i32;
pub(crate) const TEXCOORD_OFFSET: i32 = offset_of!(Vertex, texcoord) as i32;
pub(crate) const POSITION_COMPONENTS: i32 = 3;
pub(crate) const TEXCOORD_COMPONENTS: i32 = 2;

pub(crate) fn vertex_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_VERTICES)
}

pub(crate) fn index_bytes() -> &'static [u8] {
    bytemuck::cast_slice(&QUAD_INDICES)
}
