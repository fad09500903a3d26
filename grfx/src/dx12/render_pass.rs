use std::any::Any;

use windows::Win32::Graphics::Direct3D12::{
    D3D12_CLEAR_FLAGS, D3D12_CLEAR_FLAG_DEPTH, D3D12_CLEAR_FLAG_STENCIL, D3D12_CPU_DESCRIPTOR_HANDLE,
};

use super::resource::Dx12AttachmentView;
use crate::backend::RenderPassApi;
use crate::error::{GrfxError, Result};
use crate::format::Format;
use crate::render_pass::RenderPassDesc;
use crate::types::AttachmentLoadOp;

/// RTV and DSV handles captured at creation, plus which of them clear on begin.
#[derive(Debug)]
pub struct Dx12RenderPass {
    render_targets: Vec<(D3D12_CPU_DESCRIPTOR_HANDLE, bool)>,
    depth_stencil: Option<(D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_CLEAR_FLAGS)>,
}

fn attachment(api: &dyn crate::backend::ImageViewApi) -> Result<&Dx12AttachmentView> {
    api.as_any().downcast_ref::<Dx12AttachmentView>().ok_or(GrfxError::UnsupportedApi)
}

fn depth_stencil_clear_flags(format: Format, depth_load: AttachmentLoadOp, stencil_load: AttachmentLoadOp) -> D3D12_CLEAR_FLAGS {
    let mut flags = D3D12_CLEAR_FLAGS(0);
    if format.has_depth() && depth_load == AttachmentLoadOp::Clear {
        flags |= D3D12_CLEAR_FLAG_DEPTH;
    }
    if format.has_stencil() && stencil_load == AttachmentLoadOp::Clear {
        flags |= D3D12_CLEAR_FLAG_STENCIL;
    }
    flags
}

impl Dx12RenderPass {
    pub fn new(desc: &RenderPassDesc<'_>) -> Result<Self> {
        let render_targets = desc
            .render_targets
            .iter()
            .map(|(view, _)| {
                let clear = view.create_info().load_op == AttachmentLoadOp::Clear;
                attachment(view.api()).map(|a| (a.cpu_handle(), clear))
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_stencil = match desc.depth_stencil {
            Some((view, image)) => {
                let info = view.create_info();
                let flags = depth_stencil_clear_flags(image.format(), info.depth_load_op, info.stencil_load_op);
                Some((attachment(view.api())?.cpu_handle(), flags))
            }
            None => None,
        };
        Ok(Self { render_targets, depth_stencil })
    }

    pub fn render_targets(&self) -> &[(D3D12_CPU_DESCRIPTOR_HANDLE, bool)] {
        &self.render_targets
    }

    pub fn depth_stencil(&self) -> Option<(D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_CLEAR_FLAGS)> {
        self.depth_stencil
    }
}

impl RenderPassApi for Dx12RenderPass {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clears_only_the_planes_the_format_has() {
        use AttachmentLoadOp::{Clear, Load};
        assert_eq!(depth_stencil_clear_flags(Format::D32Float, Clear, Clear), D3D12_CLEAR_FLAG_DEPTH);
        assert_eq!(
            depth_stencil_clear_flags(Format::D24UnormS8Uint, Clear, Clear),
            D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL
        );
        assert_eq!(depth_stencil_clear_flags(Format::D24UnormS8Uint, Load, Clear), D3D12_CLEAR_FLAG_STENCIL);
        assert_eq!(depth_stencil_clear_flags(Format::D16Unorm, Load, Load), D3D12_CLEAR_FLAGS(0));
    }
}
