//! VkRenderPass and VkFramebuffer built from render-target and depth-stencil views.

use std::any::Any;
use std::sync::Arc;

use ash::vk;

use super::resource::native_view;
use super::util::{self, vk_error};
use super::DeviceShared;
use crate::backend::RenderPassApi;
use crate::error::{GrfxError, Result};
use crate::render_pass::RenderPassDesc;
use crate::types::{AttachmentLoadOp, AttachmentStoreOp, CommandType, ResourceState};

/// One color attachment of a single-subpass render pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ColorAttachment {
    pub format: vk::Format,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DepthStencilAttachment {
    pub format: vk::Format,
    pub depth_load_op: AttachmentLoadOp,
    pub depth_store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub layout: vk::ImageLayout,
}

/// Attachments and references of a single subpass.
#[derive(Debug, Clone, Default)]
pub(crate) struct SubpassLayout {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_attachments: Vec<vk::AttachmentReference>,
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

/// Color attachments come first, then the depth-stencil attachment. Layouts do not change across
/// the pass; callers transition attachments before beginning it.
pub(crate) fn render_pass_desc(colors: &[ColorAttachment], depth_stencil: Option<DepthStencilAttachment>) -> SubpassLayout {
    let mut desc = SubpassLayout::default();
    for color in colors {
        desc.color_attachments.push(vk::AttachmentReference {
            attachment: desc.attachments.len() as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        desc.attachments.push(
            vk::AttachmentDescription::default()
                .format(color.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(util::load_op_to_vk(color.load_op))
                .store_op(util::store_op_to_vk(color.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
    }
    if let Some(ds) = depth_stencil {
        desc.depth_stencil_attachment =
            Some(vk::AttachmentReference { attachment: desc.attachments.len() as u32, layout: ds.layout });
        desc.attachments.push(
            vk::AttachmentDescription::default()
                .format(ds.format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(util::load_op_to_vk(ds.depth_load_op))
                .store_op(util::store_op_to_vk(ds.depth_store_op))
                .stencil_load_op(util::load_op_to_vk(ds.stencil_load_op))
                .stencil_store_op(util::store_op_to_vk(ds.stencil_store_op))
                .initial_layout(ds.layout)
                .final_layout(ds.layout),
        );
    }
    desc
}

pub(crate) fn create_render_pass(shared: &DeviceShared, layout: &SubpassLayout) -> Result<vk::RenderPass> {
    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&layout.color_attachments);
    if let Some(depth) = &layout.depth_stencil_attachment {
        subpass = subpass.depth_stencil_attachment(depth);
    }
    let subpasses = [subpass];
    let create_info = vk::RenderPassCreateInfo::default().attachments(&layout.attachments).subpasses(&subpasses);
    unsafe { shared.raw.create_render_pass(&create_info, None) }.map_err(|r| vk_error(r, "vkCreateRenderPass"))
}

#[derive(Debug)]
pub struct VulkanRenderPass {
    shared: Arc<DeviceShared>,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    color_count: usize,
    has_depth_stencil: bool,
}

impl VulkanRenderPass {
    pub fn new(shared: &Arc<DeviceShared>, desc: &RenderPassDesc<'_>) -> Result<Self> {
        let info = desc.info;
        if info.width == 0 || info.height == 0 {
            log::error!("render pass extent {}x{} is empty", info.width, info.height);
            return Err(GrfxError::InvalidCreateArgument);
        }
        let mut views = Vec::with_capacity(desc.render_targets.len() + 1);
        let mut colors = Vec::with_capacity(desc.render_targets.len());
        for (view, _) in &desc.render_targets {
            let view_info = view.create_info();
            colors.push(ColorAttachment {
                format: util::format_to_vk(view_info.range.format),
                load_op: view_info.load_op,
                store_op: view_info.store_op,
            });
            views.push(native_view(view.api())?);
        }

        let depth_stencil = match desc.depth_stencil {
            Some((view, _)) => {
                let state = info.depth_stencil_state.unwrap_or(ResourceState::DepthStencilWrite);
                let layout = util::image_layout(state, CommandType::Graphics, &shared.features)?;
                views.push(native_view(view.api())?);
                let view_info = view.create_info();
                Some(DepthStencilAttachment {
                    format: util::format_to_vk(view_info.range.format),
                    depth_load_op: view_info.depth_load_op,
                    depth_store_op: view_info.depth_store_op,
                    stencil_load_op: view_info.stencil_load_op,
                    stencil_store_op: view_info.stencil_store_op,
                    layout,
                })
            }
            None => None,
        };

        let render_pass = create_render_pass(shared, &render_pass_desc(&colors, depth_stencil))?;
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(&views)
            .width(info.width)
            .height(info.height)
            .layers(1);
        let framebuffer = match unsafe { shared.raw.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffer,
            Err(r) => {
                unsafe { shared.raw.destroy_render_pass(render_pass, None) };
                return Err(vk_error(r, "vkCreateFramebuffer"));
            }
        };
        log::trace!("VkRenderPass with {} attachments, {}x{}", views.len(), info.width, info.height);
        Ok(Self {
            shared: Arc::clone(shared),
            render_pass,
            framebuffer,
            color_count: colors.len(),
            has_depth_stencil: depth_stencil.is_some(),
        })
    }

    pub fn native(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    pub fn color_count(&self) -> usize {
        self.color_count
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.has_depth_stencil
    }
}

impl RenderPassApi for VulkanRenderPass {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.shared.raw.destroy_framebuffer(self.framebuffer, None);
            self.shared.raw.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub(crate) fn render_pass_of(render_pass: &crate::render_pass::RenderPass) -> Result<&VulkanRenderPass> {
    render_pass.api().as_any().downcast_ref::<VulkanRenderPass>().ok_or(GrfxError::UnsupportedApi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_follows_color_attachments() {
        let color = ColorAttachment {
            format: vk::Format::B8G8R8A8_UNORM,
            load_op: AttachmentLoadOp::Clear,
            store_op: AttachmentStoreOp::Store,
        };
        let depth = DepthStencilAttachment {
            format: vk::Format::D32_SFLOAT,
            depth_load_op: AttachmentLoadOp::Load,
            depth_store_op: AttachmentStoreOp::DontCare,
            stencil_load_op: AttachmentLoadOp::DontCare,
            stencil_store_op: AttachmentStoreOp::DontCare,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let desc = render_pass_desc(&[color, color], Some(depth));
        assert_eq!(desc.attachments.len(), 3);
        assert_eq!(desc.color_attachments.iter().map(|r| r.attachment).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(desc.depth_stencil_attachment.map(|r| r.attachment), Some(2));
        assert_eq!(desc.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(desc.attachments[2].load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(desc.attachments[2].store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(desc.attachments[2].final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn color_only_passes_have_no_depth_reference() {
        let color = ColorAttachment {
            format: vk::Format::R8G8B8A8_UNORM,
            load_op: AttachmentLoadOp::Load,
            store_op: AttachmentStoreOp::Store,
        };
        let desc = render_pass_desc(&[color], None);
        assert!(desc.depth_stencil_attachment.is_none());
        assert_eq!(desc.attachments[0].initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
}
