//! Reader for KTX 1.1 containers holding a single 2D image with optional mip chain.

use std::path::Path;

use ash::vk;

use crate::{
    error::{ResourceManagerError, Result},
    texture::{MipLevel, TextureData},
};

const IDENTIFIER: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const ENDIANNESS_NATIVE: u32 = 0x0403_0201;
const ENDIANNESS_SWAPPED: u32 = 0x0102_0304;
const HEADER_LEN: usize = IDENTIFIER.len() + 13 * 4;

const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_RGBA: u32 = 0x1908;
const GL_RGB8: u32 = 0x8051;
const GL_RGBA8: u32 = 0x8058;
const GL_SRGB8_ALPHA8: u32 = 0x8C43;
const GL_COMPRESSED_RGB_S3TC_DXT1: u32 = 0x83F0;
const GL_COMPRESSED_RGBA_S3TC_DXT5: u32 = 0x83F3;
const GL_COMPRESSED_RGB8_ETC2: u32 = 0x9274;
const GL_COMPRESSED_RGBA8_ETC2_EAC: u32 = 0x9278;
const GL_COMPRESSED_RGBA_ASTC_4X4: u32 = 0x93B0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    gl_type: u32,
    gl_internal_format: u32,
    pixel_width: u32,
    pixel_height: u32,
    pixel_depth: u32,
    array_elements: u32,
    faces: u32,
    mip_levels: u32,
    key_value_bytes: u32,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    swap: bool,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                ResourceManagerError::InvalidKtx(format!(
                    "unexpected end of data at byte {} (wanted {} more)",
                    self.pos, len
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Ok(if self.swap { value.swap_bytes() } else { value })
    }
}

/// Maps the GL format pair stored in the header to the Vulkan format of the uploaded data.
///
/// `GL_RGB8` maps to RGBA8 because three-channel images are widened on load.
pub fn vk_format(gl_internal_format: u32, gl_type: u32) -> Result<vk::Format> {
    let format = match (gl_internal_format, gl_type) {
        (GL_RGBA8, _) | (GL_RGBA, GL_UNSIGNED_BYTE) => vk::Format::R8G8B8A8_UNORM,
        (GL_SRGB8_ALPHA8, _) => vk::Format::R8G8B8A8_SRGB,
        (GL_RGB8, _) => vk::Format::R8G8B8A8_UNORM,
        (GL_COMPRESSED_RGB8_ETC2, 0) => vk::Format::ETC2_R8G8B8_UNORM_BLOCK,
        (GL_COMPRESSED_RGBA8_ETC2_EAC, 0) => vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK,
        (GL_COMPRESSED_RGBA_ASTC_4X4, 0) => vk::Format::ASTC_4X4_UNORM_BLOCK,
        (GL_COMPRESSED_RGB_S3TC_DXT1, 0) => vk::Format::BC1_RGB_UNORM_BLOCK,
        (GL_COMPRESSED_RGBA_S3TC_DXT5, 0) => vk::Format::BC3_UNORM_BLOCK,
        (internal, ty) => return Err(ResourceManagerError::UnsupportedPixelFormat { internal, ty }),
    };
    Ok(format)
}

/// Widens one level of KTX RGB8 rows (padded to 4 bytes) to tightly packed RGBA8.
fn expand_rgb8(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let row_len = width as usize * 3;
    let row_pitch = (row_len + 3) & !3;
    let needed = row_pitch * (height as usize - 1) + row_len;
    if pixels.len() < needed {
        return Err(ResourceManagerError::InvalidKtx(format!(
            "RGB8 level of {}x{} needs {} bytes, found {}",
            width,
            height,
            needed,
            pixels.len()
        )));
    }

    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for row in pixels.chunks(row_pitch).take(height as usize) {
        for rgb in row[..row_len].chunks_exact(3) {
            out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], u8::MAX]);
        }
    }
    Ok(out)
}

/// Parses an in-memory KTX file into tightly packed mip levels.
pub fn parse(bytes: &[u8]) -> Result<TextureData> {
    if bytes.len() < HEADER_LEN || bytes[..IDENTIFIER.len()] != IDENTIFIER {
        return Err(ResourceManagerError::InvalidKtx(
            "missing KTX 1.1 identifier".to_string(),
        ));
    }

    let mut reader = Reader {
        bytes,
        pos: IDENTIFIER.len(),
        swap: false,
    };
    match reader.u32()? {
        ENDIANNESS_NATIVE => {}
        ENDIANNESS_SWAPPED => reader.swap = true,
        other => {
            return Err(ResourceManagerError::InvalidKtx(format!(
                "bad endianness marker {:#010x}",
                other
            )))
        }
    }

    let gl_type = reader.u32()?;
    let _gl_type_size = reader.u32()?;
    let _gl_format = reader.u32()?;
    let gl_internal_format = reader.u32()?;
    let _gl_base_internal_format = reader.u32()?;
    let header = Header {
        gl_type,
        gl_internal_format,
        pixel_width: reader.u32()?,
        pixel_height: reader.u32()?,
        pixel_depth: reader.u32()?,
        array_elements: reader.u32()?,
        faces: reader.u32()?,
        mip_levels: reader.u32()?,
        key_value_bytes: reader.u32()?,
    };

    if header.pixel_width == 0 || header.pixel_height == 0 {
        return Err(ResourceManagerError::InvalidKtx(
            "only 2D textures are supported".to_string(),
        ));
    }
    if header.pixel_depth > 1 || header.array_elements > 0 || header.faces > 1 {
        return Err(ResourceManagerError::InvalidKtx(format!(
            "only single 2D images are supported (depth {}, array elements {}, faces {})",
            header.pixel_depth, header.array_elements, header.faces
        )));
    }

    let format = vk_format(header.gl_internal_format, header.gl_type)?;
    let widen_rgb = header.gl_internal_format == GL_RGB8;
    reader.take(header.key_value_bytes as usize)?;

    let level_count = header.mip_levels.max(1);
    let mut mip_levels = Vec::with_capacity(level_count as usize);
    let mut data = Vec::new();
    for level in 0..level_count {
        let image_size = reader.u32()? as usize;
        let pixels = reader.take(image_size)?;
        let width = (header.pixel_width >> level).max(1);
        let height = (header.pixel_height >> level).max(1);
        let offset = data.len();
        if widen_rgb {
            data.extend(expand_rgb8(pixels, width, height)?);
        } else {
            data.extend_from_slice(pixels);
        }
        mip_levels.push(MipLevel {
            offset,
            size: data.len() - offset,
            width,
            height,
        });

        let padding = (4 - image_size % 4) % 4;
        if level + 1 < level_count {
            reader.take(padding)?;
        }
    }

    tracing::debug!(
        "Parsed KTX {}x{} {:?} with {} mip level(s), {} bytes",
        header.pixel_width,
        header.pixel_height,
        format,
        level_count,
        data.len()
    );

    Ok(TextureData {
        width: header.pixel_width,
        height: header.pixel_height,
        format,
        mip_levels,
        data,
    })
}

/// Reads and parses a `.ktx` file. Any other extension is rejected before touching the disk.
pub fn load_texture_file(path: &Path) -> Result<TextureData> {
    let is_ktx = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("ktx"));
    if !is_ktx {
        return Err(ResourceManagerError::UnsupportedTextureFormat(
            path.to_path_buf(),
        ));
    }

    let bytes = std::fs::read(path).map_err(|source| ResourceManagerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ktx_bytes(
        internal_format: u32,
        gl_type: u32,
        width: u32,
        height: u32,
        levels: &[Vec<u8>],
        key_values: &[u8],
    ) -> Vec<u8> {
        let mut out = IDENTIFIER.to_vec();
        let header = [
            ENDIANNESS_NATIVE,
            gl_type,
            1,
            GL_RGBA,
            internal_format,
            GL_RGBA,
            width,
            height,
            0,
            0,
            1,
            levels.len() as u32,
            key_values.len() as u32,
        ];
        for value in header {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(key_values);
        for level in levels {
            out.extend_from_slice(&(level.len() as u32).to_le_bytes());
            out.extend_from_slice(level);
            let padding = (4 - level.len() % 4) % 4;
            out.extend(std::iter::repeat(0).take(padding));
        }
        out
    }

    #[test]
    fn parses_mip_chain() {
        let levels = vec![vec![1u8; 4 * 4 * 4], vec![2u8; 2 * 2 * 4], vec![3u8; 4]];
        let bytes = ktx_bytes(GL_RGBA8, GL_UNSIGNED_BYTE, 4, 4, &levels, &[0; 8]);

        let texture = parse(&bytes).unwrap();
        assert_eq!((texture.width, texture.height), (4, 4));
        assert_eq!(texture.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(texture.mip_level_count(), 3);
        assert_eq!(texture.mip_levels[1].offset, 64);
        assert_eq!(texture.mip_levels[1].width, 2);
        assert_eq!(texture.mip_levels[2].offset, 80);
        assert_eq!(texture.data.len(), 84);
        assert_eq!(texture.data[70], 2);
    }

    #[test]
    fn zero_mip_levels_means_one() {
        let mut bytes = ktx_bytes(GL_RGBA8, GL_UNSIGNED_BYTE, 1, 1, &[vec![9; 4]], &[]);
        // mip level field is the 12th u32 after the identifier
        let field = IDENTIFIER.len() + 11 * 4;
        bytes[field..field + 4].copy_from_slice(&0u32.to_le_bytes());

        let texture = parse(&bytes).unwrap();
        assert_eq!(texture.mip_level_count(), 1);
        assert_eq!(texture.data, vec![9; 4]);
    }

    #[test]
    fn compressed_formats_map() {
        assert_eq!(
            vk_format(GL_COMPRESSED_RGB8_ETC2, 0).unwrap(),
            vk::Format::ETC2_R8G8B8_UNORM_BLOCK
        );
        assert_eq!(
            vk_format(GL_COMPRESSED_RGBA_S3TC_DXT5, 0).unwrap(),
            vk::Format::BC3_UNORM_BLOCK
        );
        assert!(matches!(
            vk_format(0x1234, GL_UNSIGNED_BYTE),
            Err(ResourceManagerError::UnsupportedPixelFormat { internal: 0x1234, .. })
        ));
    }

    #[test]
    fn rgb8_is_widened_to_rgba8() {
        // 3x1 pixels take 9 bytes, padded to 12 on disk
        let level = vec![10, 11, 12, 20, 21, 22, 30, 31, 32, 0, 0, 0];
        let bytes = ktx_bytes(GL_RGB8, GL_UNSIGNED_BYTE, 3, 1, &[level, vec![7, 8, 9]], &[]);

        let texture = parse(&bytes).unwrap();
        assert_eq!(texture.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(
            texture.data,
            vec![10, 11, 12, 255, 20, 21, 22, 255, 30, 31, 32, 255, 7, 8, 9, 255]
        );
        assert_eq!(texture.mip_levels[0].size, 12);
        assert_eq!(texture.mip_levels[1].offset, 12);
        assert_eq!(texture.mip_levels[1].size, 4);
    }

    #[test]
    fn short_rgb8_level_is_rejected() {
        let bytes = ktx_bytes(GL_RGB8, GL_UNSIGNED_BYTE, 2, 2, &[vec![0; 9]], &[]);
        assert!(matches!(parse(&bytes), Err(ResourceManagerError::InvalidKtx(_))));
    }

    #[test]
    fn rejects_bad_identifier_and_truncation() {
        assert!(matches!(
            parse(b"not a ktx file at all, clearly not one at all......................"),
            Err(ResourceManagerError::InvalidKtx(_))
        ));

        let mut bytes = ktx_bytes(GL_RGBA8, GL_UNSIGNED_BYTE, 2, 2, &[vec![0; 16]], &[]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(parse(&bytes), Err(ResourceManagerError::InvalidKtx(_))));
    }

    #[test]
    fn rejects_cube_maps() {
        let mut bytes = ktx_bytes(GL_RGBA8, GL_UNSIGNED_BYTE, 1, 1, &[vec![0; 4]], &[]);
        let faces = IDENTIFIER.len() + 10 * 4;
        bytes[faces..faces + 4].copy_from_slice(&6u32.to_le_bytes());
        assert!(matches!(parse(&bytes), Err(ResourceManagerError::InvalidKtx(_))));
    }

    #[test]
    fn non_ktx_extension_is_rejected() {
        let err = load_texture_file(&PathBuf::from("textures/crate.png")).unwrap_err();
        assert!(matches!(err, ResourceManagerError::UnsupportedTextureFormat(_)));
    }
}
