//! Render passes: a fixed set of color and depth-stencil views plus their clear values.

use crate::backend::RenderPassApi;
use crate::error::{GrfxError, Result};
use crate::image::{DepthStencilView, Image, RenderTargetView};
use crate::types::{
    AttachmentLoadOp, AttachmentStoreOp, DepthStencilClearValue, Rect, RenderTargetClearValue, ResourceState,
};
use crate::{DepthStencilViewHandle, ImageHandle, RenderTargetViewHandle, MAX_RENDER_TARGETS};

#[derive(Debug, Clone, Default)]
pub struct RenderPassCreateInfo {
    pub width: u32,
    pub height: u32,
    pub render_target_views: Vec<RenderTargetViewHandle>,
    pub depth_stencil_view: Option<DepthStencilViewHandle>,
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    pub depth_stencil_clear_value: DepthStencilClearValue,
    /// State the depth-stencil attachment is in while the pass runs.
    pub depth_stencil_state: Option<ResourceState>,
}

impl RenderPassCreateInfo {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.render_target_views.len() > MAX_RENDER_TARGETS {
            return Err(GrfxError::LimitExceeded);
        }
        if self.render_target_views.is_empty() && self.depth_stencil_view.is_none() {
            return Err(GrfxError::InvalidCreateArgument);
        }
        Ok(())
    }

    pub fn render_target_clear_value(&self, index: usize) -> RenderTargetClearValue {
        self.render_target_clear_values.get(index).copied().unwrap_or_default()
    }
}

/// Builds a render pass straight from images; the views it creates belong to the pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassImagesCreateInfo {
    pub width: u32,
    pub height: u32,
    pub render_target_images: Vec<ImageHandle>,
    pub depth_stencil_image: Option<ImageHandle>,
    pub render_target_clear_values: Vec<RenderTargetClearValue>,
    pub depth_stencil_clear_value: DepthStencilClearValue,
    pub render_target_load_ops: Vec<AttachmentLoadOp>,
    pub render_target_store_ops: Vec<AttachmentStoreOp>,
    pub depth_load_op: AttachmentLoadOp,
    pub depth_store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub depth_stencil_state: Option<ResourceState>,
}

/// Render pass with its views looked up, as handed to a backend.
#[derive(Debug)]
pub struct RenderPassDesc<'a> {
    pub info: &'a RenderPassCreateInfo,
    pub render_targets: Vec<(&'a RenderTargetView, &'a Image)>,
    pub depth_stencil: Option<(&'a DepthStencilView, &'a Image)>,
}

#[derive(Debug)]
pub struct RenderPass {
    create_info: RenderPassCreateInfo,
    render_target_images: Vec<ImageHandle>,
    depth_stencil_image: Option<ImageHandle>,
    owns_views: bool,
    api: Box<dyn RenderPassApi>,
}

impl RenderPass {
    pub(crate) fn new(
        create_info: RenderPassCreateInfo,
        render_target_images: Vec<ImageHandle>,
        depth_stencil_image: Option<ImageHandle>,
        owns_views: bool,
        api: Box<dyn RenderPassApi>,
    ) -> Self {
        Self { create_info, render_target_images, depth_stencil_image, owns_views, api }
    }

    pub fn create_info(&self) -> &RenderPassCreateInfo {
        &self.create_info
    }

    pub fn render_area(&self) -> Rect {
        Rect::new(0, 0, self.create_info.width, self.create_info.height)
    }

    pub fn render_target_count(&self) -> usize {
        self.create_info.render_target_views.len()
    }

    pub fn render_target_view(&self, index: usize) -> Option<RenderTargetViewHandle> {
        self.create_info.render_target_views.get(index).copied()
    }

    pub fn depth_stencil_view(&self) -> Option<DepthStencilViewHandle> {
        self.create_info.depth_stencil_view
    }

    pub fn render_target_images(&self) -> &[ImageHandle] {
        &self.render_target_images
    }

    pub fn render_target_image(&self, index: usize) -> Option<ImageHandle> {
        self.render_target_images.get(index).copied()
    }

    pub fn depth_stencil_image(&self) -> Option<ImageHandle> {
        self.depth_stencil_image
    }

    /// Whether destroying the pass also destroys its views.
    pub fn owns_views(&self) -> bool {
        self.owns_views
    }

    pub fn api(&self) -> &dyn RenderPassApi {
        self.api.as_ref()
    }
}
