mod error;

use std::path::Path;

use ash::vk;
use gltf::{accessor::DataType, mesh::util::ReadIndices, Semantic};
use glam::Mat4;

pub use error::{Result, SceneError};
use resource_manager::{SamplerDesc, TextureData};
use shared::{MeshData, MeshVertex};

/// One primitive of a glTF mesh, flattened into the renderer's vertex layout.
#[derive(Debug, Clone)]
pub struct ModelMesh {
    pub name: String,
    pub mesh: MeshData,
    pub transform: Mat4,
}

impl ModelMesh {
    /// Number of triangles described by the index stream.
    pub fn triangle_count(&self) -> u32 {
        (self.mesh.indices.len() / 3) as u32
    }
}

/// Everything the renderer needs from a glTF file.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<ModelMesh>,
    /// First image of the file, converted to RGBA8.
    pub image: Option<TextureData>,
    pub sampler: SamplerDesc,
}

fn sampler_desc_from_gltf(g_sampler: &gltf::texture::Sampler) -> SamplerDesc {
    use gltf::texture::{MagFilter, MinFilter};

    SamplerDesc {
        mag_filter: g_sampler
            .mag_filter()
            .map_or(vk::Filter::LINEAR, |mf| match mf {
                MagFilter::Nearest => vk::Filter::NEAREST,
                MagFilter::Linear => vk::Filter::LINEAR,
            }),
        min_filter: g_sampler
            .min_filter()
            .map_or(vk::Filter::LINEAR, |mf| match mf {
                MinFilter::Nearest
                | MinFilter::NearestMipmapNearest
                | MinFilter::NearestMipmapLinear => vk::Filter::NEAREST,
                MinFilter::Linear
                | MinFilter::LinearMipmapNearest
                | MinFilter::LinearMipmapLinear => vk::Filter::LINEAR,
            }),
        mipmap_mode: g_sampler
            .min_filter()
            .map_or(vk::SamplerMipmapMode::LINEAR, |mf| match mf {
                MinFilter::NearestMipmapNearest | MinFilter::LinearMipmapNearest => {
                    vk::SamplerMipmapMode::NEAREST
                }
                _ => vk::SamplerMipmapMode::LINEAR,
            }),
        address_mode: vk_address_mode(g_sampler.wrap_s()),
    }
}

fn vk_address_mode(g_mode: gltf::texture::WrappingMode) -> vk::SamplerAddressMode {
    match g_mode {
        gltf::texture::WrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        gltf::texture::WrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        gltf::texture::WrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
    }
}

/// Vertex attributes must be 32-bit floats.
pub fn check_attribute_type(semantic: &Semantic, data_type: DataType) -> Result<()> {
    if data_type != DataType::F32 {
        return Err(SceneError::UnsupportedComponentType {
            semantic: format!("{:?}", semantic),
            found: data_type,
            expected: DataType::F32,
        });
    }
    Ok(())
}

/// Index streams must be 16-bit unsigned shorts.
pub fn check_index_type(data_type: DataType) -> Result<()> {
    if data_type != DataType::U16 {
        return Err(SceneError::UnsupportedComponentType {
            semantic: "indices".to_string(),
            found: data_type,
            expected: DataType::U16,
        });
    }
    Ok(())
}

/// Interleaves per-attribute streams into [`MeshVertex`] values.
///
/// Missing normals default to +Y, missing tangents to +X and missing UVs to zero.
/// Streams that are present must match the position count.
pub fn interleave(
    positions: &[[f32; 3]],
    normals: Option<&[[f32; 3]]>,
    tangents: Option<&[[f32; 4]]>,
    uvs: Option<&[[f32; 2]]>,
) -> Result<Vec<MeshVertex>> {
    let count = positions.len();
    let mismatch = [
        ("normals", normals.map(<[_]>::len)),
        ("tangents", tangents.map(<[_]>::len)),
        ("uvs", uvs.map(<[_]>::len)),
    ]
    .into_iter()
    .find(|(_, len)| len.is_some_and(|len| len != count));
    if let Some((name, Some(len))) = mismatch {
        return Err(SceneError::InconsistentData(format!(
            "{} positions but {} {}",
            count, len, name
        )));
    }

    Ok(positions
        .iter()
        .enumerate()
        .map(|(i, &position)| MeshVertex {
            position,
            normal: normals.map_or([0.0, 1.0, 0.0], |n| n[i]),
            tangent: tangents.map_or([1.0, 0.0, 0.0, 1.0], |t| t[i]),
            uv: uvs.map_or([0.0, 0.0], |uv| uv[i]),
        })
        .collect())
}

/// Converts a decoded glTF image to tightly packed RGBA8.
pub fn rgba8_image(
    format: gltf::image::Format,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<TextureData> {
    use gltf::image::Format;

    let rgba = match format {
        Format::R8G8B8A8 => pixels.to_vec(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
            .collect(),
        Format::R8 => pixels.iter().flat_map(|&l| [l, l, l, u8::MAX]).collect(),
        other => return Err(SceneError::UnsupportedImageFormat(other)),
    };
    Ok(TextureData::from_rgba8(width, height, rgba)?)
}

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gltf") || ext.eq_ignore_ascii_case("glb"))
}

/// Loads a `.gltf` or `.glb` file, picking the text or binary loader from the extension.
pub fn load_model<T>(path: T) -> Result<Model>
where
    T: AsRef<Path>,
{
    let path_ref = path.as_ref();
    if !is_model_file(path_ref) {
        return Err(SceneError::UnsupportedModelFormat(path_ref.to_path_buf()));
    }
    tracing::info!("Loading glTF from: {:?}", path_ref);

    let (doc, buffers, images) = gltf::import(path_ref)?;
    tracing::info!(
        "glTF Stats: {} scenes, {} nodes, {} meshes, {} textures, {} images",
        doc.scenes().len(),
        doc.nodes().len(),
        doc.meshes().len(),
        doc.textures().len(),
        doc.images().len()
    );

    let mut meshes = Vec::new();
    let scene_name = match doc.default_scene().or_else(|| doc.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                process_node(&node, Mat4::IDENTITY, &buffers, &mut meshes)?;
            }
            scene.name().unwrap_or("<Default Scene>").to_string()
        }
        // No scene graph: take every mesh untransformed.
        None => {
            for mesh in doc.meshes() {
                process_mesh(&mesh, Mat4::IDENTITY, &buffers, &mut meshes)?;
            }
            "<No Scene>".to_string()
        }
    };

    if meshes.is_empty() {
        return Err(SceneError::NoGeometry(path_ref.to_path_buf()));
    }

    let image = images
        .first()
        .map(|img| rgba8_image(img.format, img.width, img.height, &img.pixels))
        .transpose()?;
    let sampler = doc
        .textures()
        .next()
        .map(|texture| sampler_desc_from_gltf(&texture.sampler()))
        .unwrap_or_default();

    tracing::info!(
        "Loaded {} mesh primitive(s) from scene '{}' (texture: {}).",
        meshes.len(),
        scene_name,
        image.is_some()
    );

    Ok(Model {
        name: scene_name,
        meshes,
        image,
        sampler,
    })
}

fn process_node(
    node: &gltf::Node,
    parent_transform: Mat4,
    buffers: &[gltf::buffer::Data],
    meshes: &mut Vec<ModelMesh>,
) -> Result<()> {
    let local_transform = Mat4::from_cols_array_2d(&node.transform().matrix());
    let world_transform = parent_transform * local_transform;

    if let Some(mesh) = node.mesh() {
        process_mesh(&mesh, world_transform, buffers, meshes)?;
    } else {
        tracing::trace!("Node {} has no mesh.", node.index());
    }

    for child_node in node.children() {
        process_node(&child_node, world_transform, buffers, meshes)?;
    }
    Ok(())
}

fn process_mesh(
    mesh: &gltf::Mesh,
    transform: Mat4,
    buffers: &[gltf::buffer::Data],
    meshes: &mut Vec<ModelMesh>,
) -> Result<()> {
    let mesh_name = mesh.name().unwrap_or("<Unnamed Mesh>");

    for (primitive_index, primitive) in mesh.primitives().enumerate() {
        let name = format!("{}_prim{}", mesh_name, primitive_index);
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            tracing::warn!("Primitive '{}' is not a triangle list. Skipping.", name);
            continue;
        }

        for (semantic, accessor) in primitive.attributes() {
            check_attribute_type(&semantic, accessor.data_type())?;
        }
        if let Some(indices) = primitive.indices() {
            check_index_type(indices.data_type())?;
        }

        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
        let Some(positions) = reader.read_positions() else {
            tracing::warn!("Primitive '{}' missing positions. Skipping.", name);
            continue;
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);
        let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(Iterator::collect);
        let uvs: Option<Vec<[f32; 2]>> = reader
            .read_tex_coords(0)
            .map(|coords| coords.into_f32().collect());

        let vertices = interleave(
            &positions,
            normals.as_deref(),
            tangents.as_deref(),
            uvs.as_deref(),
        )?;

        let indices: Vec<u16> = match reader.read_indices() {
            Some(ReadIndices::U16(iter)) => iter.collect(),
            Some(_) => {
                return Err(SceneError::InconsistentData(format!(
                    "Primitive '{}' index stream is not u16",
                    name
                )))
            }
            None => {
                let count = u16::try_from(vertices.len()).map_err(|_| {
                    SceneError::InconsistentData(format!(
                        "Primitive '{}' has {} vertices, too many for u16 indices",
                        name,
                        vertices.len()
                    ))
                })?;
                (0..count).collect()
            }
        };

        tracing::debug!(
            "Primitive '{}': {} vertices, {} indices.",
            name,
            vertices.len(),
            indices.len()
        );
        meshes.push(ModelMesh {
            name,
            mesh: MeshData::from_vertices(&vertices, indices),
            transform,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn attribute_types_must_be_f32() {
        assert!(check_attribute_type(&Semantic::Positions, DataType::F32).is_ok());
        let err = check_attribute_type(&Semantic::TexCoords(0), DataType::U16).unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnsupportedComponentType {
                found: DataType::U16,
                expected: DataType::F32,
                ..
            }
        ));
    }

    #[test]
    fn index_types_must_be_u16() {
        assert!(check_index_type(DataType::U16).is_ok());
        assert!(check_index_type(DataType::U32).is_err());
        assert!(check_index_type(DataType::U8).is_err());
    }

    #[test]
    fn interleave_fills_defaults() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let vertices = interleave(&positions, None, None, Some(&uvs)).unwrap();

        assert_eq!(vertices.len(), 3);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[1].normal, [0.0, 1.0, 0.0]);
        assert_eq!(vertices[1].tangent, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(vertices[2].uv, [0.0, 1.0]);

        let mesh = MeshData::from_vertices(&vertices, vec![0, 1, 2]);
        assert_eq!(mesh.layout.floats_per_vertex(), 12);
        assert_eq!(mesh.vertices.len(), 36);
        assert_eq!(&mesh.vertices[12..15], &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn interleave_rejects_short_streams() {
        let positions = [[0.0; 3]; 3];
        let normals = [[0.0, 0.0, 1.0]; 2];
        assert!(matches!(
            interleave(&positions, Some(&normals), None, None),
            Err(SceneError::InconsistentData(_))
        ));
    }

    #[test]
    fn rgb_images_are_expanded() {
        let texture = rgba8_image(gltf::image::Format::R8G8B8, 2, 1, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(texture.data, vec![1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(texture.format, vk::Format::R8G8B8A8_UNORM);

        assert!(matches!(
            rgba8_image(gltf::image::Format::R16G16B16A16, 1, 1, &[0; 8]),
            Err(SceneError::UnsupportedImageFormat(_))
        ));
    }

    #[test]
    fn triangle_count_from_indices() {
        let model_mesh = ModelMesh {
            name: "cube".to_string(),
            mesh: shared::mesh::indexed_cube(),
            transform: Mat4::IDENTITY,
        };
        assert_eq!(model_mesh.triangle_count(), 12);
    }

    #[test]
    fn model_extension_is_checked() {
        assert!(matches!(
            load_model(PathBuf::from("models/cube.obj")),
            Err(SceneError::UnsupportedModelFormat(_))
        ));
        assert!(is_model_file(Path::new("Cube.GLB")));
        assert!(is_model_file(Path::new("models/Cube.gltf")));
    }
}
