// Static cube geometry
//
// 24 vertices (4 per face, so each face gets a flat colour) and 36 indices.
// Faces wind clockwise when seen from outside the cube.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// Interleaved position + colour, matching the vertex shader inputs
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self { pos, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            // Position (location 0)
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, pos) as u32)
                .build(),
            // Colour (location 1)
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(offset_of!(Vertex, color) as u32)
                .build(),
        ]
    }
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const YELLOW: [f32; 3] = [1.0, 1.0, 0.0];
const MAGENTA: [f32; 3] = [1.0, 0.0, 1.0];
const CYAN: [f32; 3] = [0.0, 1.0, 1.0];

pub const CUBE_VERTICES: [Vertex; 24] = [
    // Front (-Z)
    Vertex::new([-0.5, -0.5, -0.5], RED),
    Vertex::new([0.5, -0.5, -0.5], RED),
    Vertex::new([0.5, 0.5, -0.5], RED),
    Vertex::new([-0.5, 0.5, -0.5], RED),
    // Back (+Z)
    Vertex::new([-0.5, -0.5, 0.5], GREEN),
    Vertex::new([0.5, -0.5, 0.5], GREEN),
    Vertex::new([0.5, 0.5, 0.5], GREEN),
    Vertex::new([-0.5, 0.5, 0.5], GREEN),
    // Left (-X)
    Vertex::new([-0.5, -0.5, -0.5], BLUE),
    Vertex::new([-0.5, 0.5, -0.5], BLUE),
    Vertex::new([-0.5, 0.5, 0.5], BLUE),
    Vertex::new([-0.5, -0.5, 0.5], BLUE),
    // Right (+X)
    Vertex::new([0.5, -0.5, -0.5], YELLOW),
    Vertex::new([0.5, -0.5, 0.5], YELLOW),
    Vertex::new([0.5, 0.5, 0.5], YELLOW),
    Vertex::new([0.5, 0.5, -0.5], YELLOW),
    // Top (+Y)
    Vertex::new([-0.5, 0.5, -0.5], MAGENTA),
    Vertex::new([0.5, 0.5, -0.5], MAGENTA),
    Vertex::new([0.5, 0.5, 0.5], MAGENTA),
    Vertex::new([-0.5, 0.5, 0.5], MAGENTA),
    // Bottom (-Y)
    Vertex::new([-0.5, -0.5, -0.5], CYAN),
    Vertex::new([-0.5, -0.5, 0.5], CYAN),
    Vertex::new([0.5, -0.5, 0.5], CYAN),
    Vertex::new([0.5, -0.5, -0.5], CYAN),
];

pub const CUBE_INDICES: [u16; 36] = [
    0, 1, 2, 2, 3, 0, // front
    4, 7, 6, 6, 5, 4, // back
    8, 9, 10, 10, 11, 8, // left
    12, 13, 14, 14, 15, 12, // right
    16, 17, 18, 18, 19, 16, // top
    20, 21, 22, 22, 23, 20, // bottom
];

pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn vertex_layout_is_tightly_interleaved() {
        assert_eq!(size_of::<Vertex>(), 24);
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 24);

        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert!(attributes.iter().all(|a| a.format == vk::Format::R32G32B32_SFLOAT));
    }

    #[test]
    fn indices_stay_in_range() {
        assert!(CUBE_INDICES.iter().all(|&i| (i as usize) < CUBE_VERTICES.len()));
    }

    #[test]
    fn faces_wind_clockwise_from_outside() {
        // For a clockwise triangle seen from outside, (b - a) x (c - a)
        // points into the cube, i.e. against the vertex position.
        for triangle in CUBE_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vec3::from_array(CUBE_VERTICES[triangle[k] as usize].pos));
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) < 0.0, "triangle {:?} winds the wrong way", triangle);
        }
    }
}
