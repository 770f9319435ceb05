use crate::vertex::{ColoredVertex, PositionVertex, Vertex, VertexLayout};

/// Host-side geometry: interleaved floats, optional 16-bit indices and the layout
/// that describes the floats.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    pub layout: VertexLayout,
}

impl MeshData {
    pub fn from_vertices<V: Vertex>(vertices: &[V], indices: Vec<u16>) -> Self {
        Self {
            vertices: bytemuck::cast_slice(vertices).to_vec(),
            indices,
            layout: V::layout(),
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.layout.vertex_count(self.vertices.len())
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// A single clip-space triangle, position only.
pub fn triangle() -> MeshData {
    let vertices = [
        PositionVertex {
            position: [-0.5, 0.5, 0.0],
        },
        PositionVertex {
            position: [0.5, 0.5, 0.0],
        },
        PositionVertex {
            position: [0.0, -0.5, 0.0],
        },
    ];
    MeshData::from_vertices(&vertices, Vec::new())
}

/// Unit cube with eight shared corners and 36 indices, position only.
pub fn indexed_cube() -> MeshData {
    #[rustfmt::skip]
    let positions: [[f32; 3]; 8] = [
        // front
        [-0.5, -0.5, -0.5],
        [ 0.5, -0.5, -0.5],
        [ 0.5,  0.5, -0.5],
        [-0.5,  0.5, -0.5],
        // back
        [-0.5, -0.5,  0.5],
        [-0.5,  0.5,  0.5],
        [ 0.5,  0.5,  0.5],
        [ 0.5, -0.5,  0.5],
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2,  0, 2, 3,
        4, 5, 6,  4, 6, 7,
        5, 3, 2,  5, 2, 6,
        4, 7, 0,  7, 1, 0,
        7, 6, 2,  7, 2, 1,
        0, 5, 4,  0, 3, 5,
    ];
    let vertices: Vec<PositionVertex> = positions
        .iter()
        .map(|&position| PositionVertex { position })
        .collect();
    MeshData::from_vertices(&vertices, indices)
}

/// Cube with four vertices per face so every face gets its own normal and UVs.
///
/// Faces wind counter-clockwise when seen from outside.
pub fn textured_cube() -> MeshData {
    // (normal, tangent u axis, tangent v axis, face color)
    let faces: [([f32; 3], [f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 1.0]),
    ];
    let corners: [(f32, f32, [f32; 2]); 4] = [
        (-1.0, -1.0, [0.0, 1.0]),
        (1.0, -1.0, [1.0, 1.0]),
        (1.0, 1.0, [1.0, 0.0]),
        (-1.0, 1.0, [0.0, 0.0]),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u_axis, v_axis, color) in faces {
        let base = vertices.len() as u16;
        for (su, sv, uv) in corners {
            let position = [
                0.5 * (normal[0] + su * u_axis[0] + sv * v_axis[0]),
                0.5 * (normal[1] + su * u_axis[1] + sv * v_axis[1]),
                0.5 * (normal[2] + su * u_axis[2] + sv * v_axis[2]),
            ];
            vertices.push(ColoredVertex {
                position,
                color,
                normal,
                uv,
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData::from_vertices(&vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn indexed_cube_counts() {
        let cube = indexed_cube();
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| i < 8));
    }

    #[test]
    fn triangle_is_not_indexed() {
        let tri = triangle();
        assert_eq!(tri.vertex_count(), 3);
        assert!(!tri.is_indexed());
    }

    #[test]
    fn textured_cube_faces_point_outward() {
        let cube = textured_cube();
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);

        let vertices: &[ColoredVertex] = bytemuck::cast_slice(&cube.vertices);
        for tri in cube.indices.chunks_exact(3) {
            let a = Vec3::from(vertices[tri[0] as usize].position);
            let b = Vec3::from(vertices[tri[1] as usize].position);
            let c = Vec3::from(vertices[tri[2] as usize].position);
            let face_normal = (b - a).cross(c - a);
            let expected = Vec3::from(vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(expected) > 0.0);
        }
    }
}
