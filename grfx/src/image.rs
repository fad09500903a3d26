//! Images, samplers and the four image-view kinds.

use crate::backend::{ImageApi, ImageViewApi, SamplerApi};
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, BorderColor, CompareOp, DepthStencilClearValue, Filter,
    ImageType, ImageUsageFlags, ImageViewType, MemoryUsage, RenderTargetClearValue, ResourceState,
    SampleCount, SamplerAddressMode, SamplerMipmapMode,
};
use crate::ImageHandle;

#[derive(Debug, Clone)]
pub struct ImageCreateInfo {
    pub image_type: ImageType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub format: Format,
    pub sample_count: SampleCount,
    pub mip_level_count: u32,
    pub array_layer_count: u32,
    pub usage_flags: ImageUsageFlags,
    pub memory_usage: MemoryUsage,
    pub initial_state: ResourceState,
    /// Optimized clear value for render targets.
    pub rtv_clear_value: RenderTargetClearValue,
    /// Optimized clear value for depth-stencil targets.
    pub dsv_clear_value: DepthStencilClearValue,
    /// Shared between queue families instead of exclusively owned.
    pub concurrent_multi_queue_usage: bool,
}

impl Default for ImageCreateInfo {
    fn default() -> Self {
        Self {
            image_type: ImageType::D2,
            width: 0,
            height: 0,
            depth: 1,
            format: Format::Undefined,
            sample_count: SampleCount::X1,
            mip_level_count: 1,
            array_layer_count: 1,
            usage_flags: ImageUsageFlags::SAMPLED,
            memory_usage: MemoryUsage::GpuOnly,
            initial_state: ResourceState::General,
            rtv_clear_value: RenderTargetClearValue::default(),
            dsv_clear_value: DepthStencilClearValue::default(),
            concurrent_multi_queue_usage: false,
        }
    }
}

impl ImageCreateInfo {
    pub fn sampled_image_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage_flags: ImageUsageFlags::SAMPLED,
            initial_state: ResourceState::ShaderResource,
            ..Default::default()
        }
    }

    pub fn depth_stencil_target(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage_flags: ImageUsageFlags::SAMPLED | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            initial_state: ResourceState::DepthStencilWrite,
            ..Default::default()
        }
    }

    pub fn render_target_2d(width: u32, height: u32, format: Format) -> Self {
        Self {
            width,
            height,
            format,
            usage_flags: ImageUsageFlags::SAMPLED | ImageUsageFlags::COLOR_ATTACHMENT,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.image_type == ImageType::Cube && self.array_layer_count != 6 {
            log::error!("cube images need 6 array layers, got {}", self.array_layer_count);
            return Err(GrfxError::InvalidCreateArgument);
        }
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.format == Format::Undefined {
            return Err(GrfxError::InvalidCreateArgument);
        }
        if self.mip_level_count == 0 || self.array_layer_count == 0 {
            return Err(GrfxError::InvalidCreateArgument);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Image {
    create_info: ImageCreateInfo,
    api: Box<dyn ImageApi>,
}

impl Image {
    pub(crate) fn new(create_info: ImageCreateInfo, api: Box<dyn ImageApi>) -> Self {
        Self { create_info, api }
    }

    pub fn create_info(&self) -> &ImageCreateInfo {
        &self.create_info
    }

    pub fn image_type(&self) -> ImageType {
        self.create_info.image_type
    }

    pub fn width(&self) -> u32 {
        self.create_info.width
    }

    pub fn height(&self) -> u32 {
        self.create_info.height
    }

    pub fn depth(&self) -> u32 {
        self.create_info.depth
    }

    pub fn format(&self) -> Format {
        self.create_info.format
    }

    pub fn sample_count(&self) -> SampleCount {
        self.create_info.sample_count
    }

    pub fn mip_level_count(&self) -> u32 {
        self.create_info.mip_level_count
    }

    pub fn array_layer_count(&self) -> u32 {
        self.create_info.array_layer_count
    }

    pub fn usage_flags(&self) -> ImageUsageFlags {
        self.create_info.usage_flags
    }

    pub fn initial_state(&self) -> ResourceState {
        self.create_info.initial_state
    }

    pub fn api(&self) -> &dyn ImageApi {
        self.api.as_ref()
    }

    pub fn guess_image_view_type(&self) -> ImageViewType {
        guess_image_view_type(self.create_info.image_type, self.create_info.array_layer_count)
    }
}

pub fn guess_image_view_type(image_type: ImageType, array_layer_count: u32) -> ImageViewType {
    match image_type {
        ImageType::D1 if array_layer_count > 1 => ImageViewType::D1Array,
        ImageType::D1 => ImageViewType::D1,
        ImageType::D2 if array_layer_count > 1 => ImageViewType::D2Array,
        ImageType::D2 => ImageViewType::D2,
        ImageType::D3 => ImageViewType::D3,
        ImageType::Cube if array_layer_count > 6 => ImageViewType::CubeArray,
        ImageType::Cube => ImageViewType::Cube,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerCreateInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: CompareOp,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 0.0,
            compare_enable: false,
            compare_op: CompareOp::Never,
            min_lod: 0.0,
            max_lod: 1.0,
            border_color: BorderColor::FloatTransparentBlack,
        }
    }
}

impl SamplerCreateInfo {
    pub fn linear() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    create_info: SamplerCreateInfo,
    api: Box<dyn SamplerApi>,
}

impl Sampler {
    pub(crate) fn new(create_info: SamplerCreateInfo, api: Box<dyn SamplerApi>) -> Self {
        Self { create_info, api }
    }

    pub fn create_info(&self) -> &SamplerCreateInfo {
        &self.create_info
    }

    pub fn api(&self) -> &dyn SamplerApi {
        self.api.as_ref()
    }
}

/// Subresource range shared by every view kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRange {
    pub view_type: ImageViewType,
    pub format: Format,
    pub mip_level: u32,
    pub mip_level_count: u32,
    pub array_layer: u32,
    pub array_layer_count: u32,
}

impl ViewRange {
    fn single(image: &Image) -> Self {
        Self {
            view_type: image.guess_image_view_type(),
            format: image.format(),
            mip_level: 0,
            mip_level_count: 1,
            array_layer: 0,
            array_layer_count: 1,
        }
    }

    fn all(image: &Image) -> Self {
        Self {
            mip_level_count: image.mip_level_count(),
            array_layer_count: image.array_layer_count(),
            ..Self::single(image)
        }
    }

    pub(crate) fn validate(&self, image: &Image) -> Result<()> {
        let mips_fit = self.mip_level_count > 0
            && self.mip_level.saturating_add(self.mip_level_count) <= image.mip_level_count();
        let layers_fit = self.array_layer_count > 0
            && self.array_layer.saturating_add(self.array_layer_count) <= image.array_layer_count();
        if !mips_fit || !layers_fit {
            return Err(GrfxError::OutOfRange);
        }
        if self.format == Format::Undefined {
            return Err(GrfxError::InvalidCreateArgument);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SampledImageViewCreateInfo {
    pub image: ImageHandle,
    pub range: ViewRange,
}

impl SampledImageViewCreateInfo {
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self { image: handle, range: ViewRange::all(image) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StorageImageViewCreateInfo {
    pub image: ImageHandle,
    pub range: ViewRange,
}

impl StorageImageViewCreateInfo {
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self { image: handle, range: ViewRange::all(image) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTargetViewCreateInfo {
    pub image: ImageHandle,
    pub range: ViewRange,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
}

impl RenderTargetViewCreateInfo {
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            range: ViewRange::single(image),
            load_op: AttachmentLoadOp::Load,
            store_op: AttachmentStoreOp::Store,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DepthStencilViewCreateInfo {
    pub image: ImageHandle,
    pub range: ViewRange,
    pub depth_load_op: AttachmentLoadOp,
    pub depth_store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
}

impl DepthStencilViewCreateInfo {
    pub fn guess_from_image(handle: ImageHandle, image: &Image) -> Self {
        Self {
            image: handle,
            range: ViewRange::single(image),
            depth_load_op: AttachmentLoadOp::Load,
            depth_store_op: AttachmentStoreOp::Store,
            stencil_load_op: AttachmentLoadOp::Load,
            stencil_store_op: AttachmentStoreOp::Store,
        }
    }
}

macro_rules! image_view {
    ($(#[$meta:meta])* $name:ident, $info:ty) => {
        $(#[$meta])*
        #[derive(Debug)]
        pub struct $name {
            create_info: $info,
            api: Box<dyn ImageViewApi>,
        }

        impl $name {
            pub(crate) fn new(create_info: $info, api: Box<dyn ImageViewApi>) -> Self {
                Self { create_info, api }
            }

            pub fn create_info(&self) -> &$info {
                &self.create_info
            }

            pub fn image(&self) -> ImageHandle {
                self.create_info.image
            }

            pub fn format(&self) -> Format {
                self.create_info.range.format
            }

            pub fn api(&self) -> &dyn ImageViewApi {
                self.api.as_ref()
            }
        }
    };
}

image_view!(SampledImageView, SampledImageViewCreateInfo);
image_view!(StorageImageView, StorageImageViewCreateInfo);
image_view!(
    /// Color attachment view; carries the load/store ops a render pass built from it uses.
    RenderTargetView,
    RenderTargetViewCreateInfo
);
image_view!(DepthStencilView, DepthStencilViewCreateInfo);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_images_need_six_layers() {
        let mut info = ImageCreateInfo::sampled_image_2d(64, 64, Format::R8G8B8A8Unorm);
        info.image_type = ImageType::Cube;
        assert_eq!(info.validate(), Err(GrfxError::InvalidCreateArgument));
        info.array_layer_count = 6;
        assert!(info.validate().is_ok());
    }

    #[test]
    fn view_type_follows_layer_count() {
        assert_eq!(guess_image_view_type(ImageType::D2, 1), ImageViewType::D2);
        assert_eq!(guess_image_view_type(ImageType::D2, 4), ImageViewType::D2Array);
        assert_eq!(guess_image_view_type(ImageType::D1, 2), ImageViewType::D1Array);
        assert_eq!(guess_image_view_type(ImageType::Cube, 6), ImageViewType::Cube);
        assert_eq!(guess_image_view_type(ImageType::Cube, 12), ImageViewType::CubeArray);
    }

    #[test]
    fn helper_initial_states() {
        let ds = ImageCreateInfo::depth_stencil_target(8, 8, Format::D32Float);
        assert_eq!(ds.initial_state, ResourceState::DepthStencilWrite);
        assert!(ds.usage_flags.contains(ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        let sampled = ImageCreateInfo::sampled_image_2d(8, 8, Format::R8G8B8A8Unorm);
        assert_eq!(sampled.initial_state, ResourceState::ShaderResource);
    }

    #[test]
    fn sampler_defaults() {
        let info = SamplerCreateInfo::default();
        assert_eq!(info.min_filter, Filter::Nearest);
        assert_eq!(info.address_mode_u, SamplerAddressMode::Repeat);
        assert_eq!(info.max_lod, 1.0);
    }
}
