//! Headless frame loop: acquire, clear the swapchain image in a render pass, submit, present.
//!
//! Usage: headless_frames [dx12|dx12_1|vk|vk1_1] [frame count]

use grfx::config::parse_api;
use grfx::{
    AttachmentLoadOp, CommandBufferCreateInfo, DeviceCreateInfo, FenceCreateInfo, Format, Instance, InstanceCreateInfo,
    PresentMode, Profiler, Rect, RenderPassBeginInfo, RenderTargetClearValue, ResourceState, ScopedEventSample,
    SemaphoreCreateInfo, SubmitInfo, SwapchainCreateInfo, Viewport,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;
const IMAGE_COUNT: u32 = 3;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let mut info = InstanceCreateInfo::from_env();
    if let Some(name) = args.next() {
        info.api = parse_api(&name).ok_or_else(|| anyhow::anyhow!("unknown backend {:?}", name))?;
    }
    let frame_count: u32 = match args.next() {
        Some(n) => n.parse()?,
        None => 8,
    };

    let mut instance = Instance::new(info)?;
    let handle = instance.create_device(&DeviceCreateInfo::default())?;
    let device = instance.device_mut(handle)?;
    let queue = device.graphics_queue(0)?;

    let swapchain = device.create_swapchain(&SwapchainCreateInfo {
        queue,
        surface: None,
        width: WIDTH,
        height: HEIGHT,
        color_format: Format::B8G8R8A8Unorm,
        depth_format: Format::Undefined,
        image_count: IMAGE_COUNT,
        present_mode: PresentMode::Fifo,
    })?;

    let pool = device.create_command_pool(queue)?;
    let cmd = device.create_command_buffer(pool, &CommandBufferCreateInfo::default())?;
    let image_acquired = device.create_semaphore(&SemaphoreCreateInfo::default())?;
    let render_complete = device.create_semaphore(&SemaphoreCreateInfo::default())?;
    let frame_fence = device.create_fence(&FenceCreateInfo::default())?;

    let frame_event = Profiler::register_grfx_api_fn_event("headless_frame")?;
    let render_area = Rect { x: 0, y: 0, width: WIDTH, height: HEIGHT };

    for frame in 0..frame_count {
        let _sample = ScopedEventSample::new(frame_event);
        let image_index = device.acquire_next_image(swapchain, u64::MAX, Some(image_acquired), None)?;
        let (color_image, render_pass) = {
            let chain = device.swapchain(swapchain)?;
            (chain.color_image(image_index)?, chain.render_pass(image_index, AttachmentLoadOp::Clear)?)
        };

        let t = frame as f32 / frame_count as f32;
        {
            let mut rec = device.record(cmd)?;
            rec.begin()?;
            rec.transition_image(color_image, ResourceState::Present, ResourceState::RenderTarget)?;
            rec.begin_render_pass(&RenderPassBeginInfo {
                render_pass,
                render_area,
                rtv_clear_values: vec![RenderTargetClearValue::new(t, 0.2, 1.0 - t, 1.0)],
                dsv_clear_value: Default::default(),
            })?;
            rec.set_viewports(&[Viewport::new(0.0, 0.0, WIDTH as f32, HEIGHT as f32)]);
            rec.set_scissors(&[render_area]);
            rec.end_render_pass();
            rec.transition_image(color_image, ResourceState::RenderTarget, ResourceState::Present)?;
            rec.end()?;
        }

        device.submit(
            queue,
            &SubmitInfo {
                command_buffers: vec![cmd],
                wait_semaphores: vec![image_acquired],
                signal_semaphores: vec![render_complete],
                fence: Some(frame_fence),
                ..Default::default()
            },
        )?;
        device.present(swapchain, image_index, &[render_complete])?;
        device.fence(frame_fence)?.wait_and_reset(u64::MAX)?;
        log::debug!("frame {} presented image {}", frame, image_index);
    }
    device.wait_idle()?;

    let profiler = Profiler::for_current_thread();
    let profiler = profiler.lock();
    if let Some(event) = profiler.event(frame_event) {
        let average_us = event.sample_total() / event.sample_count().max(1) / 1000;
        println!(
            "{:?}: {} frames, {} us average (min {} us, max {} us)",
            instance.api(),
            event.sample_count(),
            average_us,
            event.sample_min() / 1000,
            event.sample_max() / 1000
        );
    }
    Ok(())
}
