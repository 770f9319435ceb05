use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem::size_of;

/// One interleaved attribute inside a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Describes how raw vertex data is interleaved.
///
/// Travels together with the vertex bytes it describes, so the pipeline's vertex
/// input state is derived from the data rather than picked from a fixed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    stride: u32,
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new(stride: u32, attributes: Vec<VertexAttribute>) -> Self {
        Self { stride, attributes }
    }

    /// Tightly packs `formats` in order, assigning locations 0, 1, 2, ...
    ///
    /// Returns `None` if any format has no known size.
    pub fn packed(formats: &[vk::Format]) -> Option<Self> {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    format,
                    offset,
                };
                offset += format_size(format)?;
                Some(attribute)
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            stride: offset,
            attributes,
        })
    }

    /// Position only (`vec3`).
    pub fn position_only() -> Self {
        PositionVertex::layout()
    }

    /// Position, color, normal and UV.
    pub fn position_color_normal_uv() -> Self {
        ColoredVertex::layout()
    }

    /// Position, normal, tangent and UV, the layout glTF meshes are converted to.
    pub fn position_normal_tangent_uv() -> Self {
        MeshVertex::layout()
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Number of `f32` values making up one vertex ("item size").
    pub fn floats_per_vertex(&self) -> usize {
        self.stride as usize / size_of::<f32>()
    }

    /// How many whole vertices `float_count` floats hold.
    pub fn vertex_count(&self, float_count: usize) -> u32 {
        match self.floats_per_vertex() {
            0 => 0,
            per_vertex => (float_count / per_vertex) as u32,
        }
    }

    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(self.stride)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .location(attribute.location)
                    .binding(0)
                    .format(attribute.format)
                    .offset(attribute.offset)
            })
            .collect()
    }
}

/// Byte size of the float formats used by vertex attributes, `None` for anything else.
pub fn format_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R32_SFLOAT => Some(4),
        vk::Format::R32G32_SFLOAT => Some(8),
        vk::Format::R32G32B32_SFLOAT => Some(12),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// A vertex type with a known interleaved layout.
pub trait Vertex: Pod {
    fn layout() -> VertexLayout;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PositionVertex {
    pub position: [f32; 3],
}

impl Vertex for PositionVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(
            size_of::<Self>() as u32,
            vec![VertexAttribute {
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: memoffset::offset_of!(PositionVertex, position) as u32,
            }],
        )
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex for ColoredVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(
            size_of::<Self>() as u32,
            vec![
                VertexAttribute {
                    location: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: memoffset::offset_of!(ColoredVertex, position) as u32,
                },
                VertexAttribute {
                    location: 1,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: memoffset::offset_of!(ColoredVertex, color) as u32,
                },
                VertexAttribute {
                    location: 2,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: memoffset::offset_of!(ColoredVertex, normal) as u32,
                },
                VertexAttribute {
                    location: 3,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: memoffset::offset_of!(ColoredVertex, uv) as u32,
                },
            ],
        )
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex for MeshVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(
            size_of::<Self>() as u32,
            vec![
                VertexAttribute {
                    location: 0,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: memoffset::offset_of!(MeshVertex, position) as u32,
                },
                VertexAttribute {
                    location: 1,
                    format: vk::Format::R32G32B32_SFLOAT,
                    offset: memoffset::offset_of!(MeshVertex, normal) as u32,
                },
                VertexAttribute {
                    location: 2,
                    format: vk::Format::R32G32B32A32_SFLOAT,
                    offset: memoffset::offset_of!(MeshVertex, tangent) as u32,
                },
                VertexAttribute {
                    location: 3,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: memoffset::offset_of!(MeshVertex, uv) as u32,
                },
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_layout_strides() {
        assert_eq!(VertexLayout::position_only().stride(), 12);
        assert_eq!(VertexLayout::position_color_normal_uv().stride(), 44);
        assert_eq!(VertexLayout::position_normal_tangent_uv().stride(), 48);
        assert_eq!(VertexLayout::position_normal_tangent_uv().floats_per_vertex(), 12);
    }

    #[test]
    fn packed_matches_struct_layout() {
        let packed = VertexLayout::packed(&[
            vk::Format::R32G32B32_SFLOAT,
            vk::Format::R32G32B32_SFLOAT,
            vk::Format::R32G32B32A32_SFLOAT,
            vk::Format::R32G32_SFLOAT,
        ]);
        assert_eq!(packed, Some(MeshVertex::layout()));
    }

    #[test]
    fn packed_rejects_formats_without_a_size() {
        assert_eq!(format_size(vk::Format::R8G8B8A8_UNORM), None);
        assert_eq!(
            VertexLayout::packed(&[vk::Format::R32G32B32_SFLOAT, vk::Format::R8G8B8A8_UNORM]),
            None
        );
    }

    #[test]
    fn attribute_descriptions_use_binding_zero() {
        let layout = VertexLayout::position_color_normal_uv();
        let descriptions = layout.attribute_descriptions();
        assert_eq!(descriptions.len(), 4);
        assert!(descriptions.iter().all(|d| d.binding == 0));
        assert_eq!(
            descriptions.iter().map(|d| d.offset).collect::<Vec<_>>(),
            vec![0, 12, 24, 36]
        );
        assert_eq!(layout.binding_description().stride, 44);
    }

    #[test]
    fn vertex_count_ignores_trailing_floats() {
        let layout = VertexLayout::position_only();
        assert_eq!(layout.vertex_count(24), 8);
        assert_eq!(layout.vertex_count(25), 8);
        assert_eq!(VertexLayout::packed(&[]).map(|l| l.vertex_count(10)), Some(0));
    }
}
