//! Minimal runnable example: instance, device, buffer, fence, an empty submit, wait idle.
//! The backend comes from GRFX_API (default Vulkan 1.2).

use grfx::{BufferCreateInfo, CommandBufferCreateInfo, DeviceCreateInfo, FenceCreateInfo, Instance, InstanceCreateInfo, SubmitInfo};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut instance = Instance::new(InstanceCreateInfo::from_env())?;
    let gpu = instance.gpu(0)?;
    log::info!("{:?} on {} (software: {})", instance.api(), gpu.name(), gpu.is_software());

    let handle = instance.create_device(&DeviceCreateInfo::default())?;
    let device = instance.device_mut(handle)?;
    let queue = device.graphics_queue(0)?;

    let buffer = device.create_buffer(&BufferCreateInfo::staging(256))?;
    let values: [u32; 4] = [1, 2, 3, 4];
    device.buffer(buffer)?.copy_from_source(bytemuck::bytes_of(&values))?;

    let fence = device.create_fence(&FenceCreateInfo::default())?;
    let pool = device.create_command_pool(queue)?;
    let cmd = device.create_command_buffer(pool, &CommandBufferCreateInfo::default())?;
    {
        let mut rec = device.record(cmd)?;
        rec.begin()?;
        rec.end()?;
    }
    device.submit(queue, &SubmitInfo { command_buffers: vec![cmd], fence: Some(fence), ..Default::default() })?;
    device.fence(fence)?.wait(u64::MAX)?;
    device.wait_idle()?;

    println!("grfx {:?} OK", instance.api());
    Ok(())
}
