//! Pixel formats and their per-texel layout.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16Uint,
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R32Uint,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    R10G10B10A2Unorm,
    R11G11B10Float,
    S8Uint,
    D16Unorm,
    D32Float,
    D16UnormS8Uint,
    D24UnormS8Uint,
    D32FloatS8Uint,
    Bc1RgbaUnorm,
    Bc3Unorm,
    Bc7Unorm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatAspect {
    Color,
    Depth,
    Stencil,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDesc {
    /// Bytes per texel, or bytes per block for compressed formats.
    pub bytes_per_texel: u32,
    pub aspect: FormatAspect,
    pub compressed: bool,
    /// Edge length in texels of one compression block (1 when uncompressed).
    pub block_width: u32,
}

const fn color(bytes_per_texel: u32) -> FormatDesc {
    FormatDesc { bytes_per_texel, aspect: FormatAspect::Color, compressed: false, block_width: 1 }
}

const fn block(bytes_per_block: u32) -> FormatDesc {
    FormatDesc { bytes_per_texel: bytes_per_block, aspect: FormatAspect::Color, compressed: true, block_width: 4 }
}

const fn ds(bytes_per_texel: u32, aspect: FormatAspect) -> FormatDesc {
    FormatDesc { bytes_per_texel, aspect, compressed: false, block_width: 1 }
}

pub fn format_description(format: Format) -> FormatDesc {
    match format {
        Format::Undefined => color(0),
        Format::R8Unorm => color(1),
        Format::S8Uint => ds(1, FormatAspect::Stencil),
        Format::R8G8Unorm | Format::R16Uint | Format::R16Float => color(2),
        Format::R8G8B8A8Unorm
        | Format::R8G8B8A8Srgb
        | Format::B8G8R8A8Unorm
        | Format::B8G8R8A8Srgb
        | Format::R16G16Float
        | Format::R32Uint
        | Format::R32Float
        | Format::R10G10B10A2Unorm
        | Format::R11G11B10Float => color(4),
        Format::R16G16B16A16Float | Format::R32G32Float => color(8),
        Format::R32G32B32Float => color(12),
        Format::R32G32B32A32Float => color(16),
        Format::D16Unorm => ds(2, FormatAspect::Depth),
        Format::D32Float => ds(4, FormatAspect::Depth),
        Format::D16UnormS8Uint => ds(3, FormatAspect::DepthStencil),
        Format::D24UnormS8Uint => ds(4, FormatAspect::DepthStencil),
        Format::D32FloatS8Uint => ds(5, FormatAspect::DepthStencil),
        Format::Bc1RgbaUnorm => block(8),
        Format::Bc3Unorm | Format::Bc7Unorm => block(16),
    }
}

impl Format {
    pub fn desc(self) -> FormatDesc {
        format_description(self)
    }

    pub fn bytes_per_texel(self) -> u32 {
        self.desc().bytes_per_texel
    }

    pub fn aspect(self) -> FormatAspect {
        self.desc().aspect
    }

    pub fn is_depth_stencil(self) -> bool {
        self.aspect() == FormatAspect::DepthStencil
    }

    pub fn has_depth(self) -> bool {
        matches!(self.aspect(), FormatAspect::Depth | FormatAspect::DepthStencil)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self.aspect(), FormatAspect::Stencil | FormatAspect::DepthStencil)
    }

    /// Number of native planes: depth-stencil formats store depth and stencil separately.
    pub fn plane_count(self) -> u32 {
        if self.is_depth_stencil() {
            2
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_sizes() {
        assert_eq!(Format::R8G8B8A8Unorm.bytes_per_texel(), 4);
        assert_eq!(Format::R32G32B32Float.bytes_per_texel(), 12);
        assert_eq!(Format::R16G16B16A16Float.bytes_per_texel(), 8);
        assert_eq!(Format::S8Uint.bytes_per_texel(), 1);
    }

    #[test]
    fn depth_stencil_has_two_planes() {
        assert_eq!(Format::D24UnormS8Uint.plane_count(), 2);
        assert_eq!(Format::D32Float.plane_count(), 1);
        assert!(Format::D32Float.has_depth());
        assert!(!Format::D32Float.has_stencil());
        assert_eq!(Format::S8Uint.aspect(), FormatAspect::Stencil);
    }

    #[test]
    fn compressed_blocks() {
        let bc1 = format_description(Format::Bc1RgbaUnorm);
        assert!(bc1.compressed);
        assert_eq!(bc1.block_width, 4);
        assert_eq!(bc1.bytes_per_texel, 8);
    }
}
