//! Descriptor heaps and CPU handle allocation for RTV and DSV heaps.

use std::sync::Arc;

use parking_lot::Mutex;
use windows::Win32::Graphics::Direct3D12::*;

use super::layout::SlotAllocator;
use super::util::{hresult_error, Sendable};
use crate::error::{GrfxError, Result};
use crate::MAX_DESCRIPTOR_HANDLE_HEAP_SIZE;

/// A descriptor heap with its start handles and increment cached.
#[derive(Debug)]
pub struct DescriptorHeap {
    heap: Sendable<ID3D12DescriptorHeap>,
    heap_type: D3D12_DESCRIPTOR_HEAP_TYPE,
    count: u32,
    increment: u32,
    cpu_start: D3D12_CPU_DESCRIPTOR_HANDLE,
    gpu_start: Option<D3D12_GPU_DESCRIPTOR_HANDLE>,
}

impl DescriptorHeap {
    pub fn new(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, count: u32, shader_visible: bool) -> Result<Self> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type,
            NumDescriptors: count,
            Flags: if shader_visible { D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE } else { D3D12_DESCRIPTOR_HEAP_FLAG_NONE },
            NodeMask: 0,
        };
        let heap: ID3D12DescriptorHeap = unsafe { device.CreateDescriptorHeap(&desc) }
            .map_err(|e| hresult_error(e, "ID3D12Device::CreateDescriptorHeap"))?;
        let increment = unsafe { device.GetDescriptorHandleIncrementSize(heap_type) };
        let cpu_start = unsafe { heap.GetCPUDescriptorHandleForHeapStart() };
        let gpu_start = shader_visible.then(|| unsafe { heap.GetGPUDescriptorHandleForHeapStart() });
        Ok(Self { heap: Sendable(heap), heap_type, count, increment, cpu_start, gpu_start })
    }

    pub fn native(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    pub fn heap_type(&self) -> D3D12_DESCRIPTOR_HEAP_TYPE {
        self.heap_type
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE { ptr: self.cpu_start.ptr + (index * self.increment) as usize }
    }

    /// Only shader-visible heaps have GPU handles.
    pub fn gpu_handle(&self, index: u32) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        self.gpu_start.map(|start| D3D12_GPU_DESCRIPTOR_HANDLE { ptr: start.ptr + u64::from(index * self.increment) })
    }
}

/// One handle taken from a [`DescriptorHandleManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    pub heap_offset: u32,
    pub handle_increment_size: u32,
    pub cpu_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
}

/// Fixed-size non-visible heap with a linear free list.
#[derive(Debug)]
pub struct DescriptorHandleAllocator {
    heap: DescriptorHeap,
    slots: SlotAllocator,
}

impl DescriptorHandleAllocator {
    pub fn new(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, count: u32) -> Result<Self> {
        Ok(Self { heap: DescriptorHeap::new(device, heap_type, count, false)?, slots: SlotAllocator::new(count) })
    }

    pub fn has_available_handle(&self) -> bool {
        self.slots.has_available()
    }

    pub fn has_handle(&self, handle: &DescriptorHandle) -> bool {
        handle.heap_offset < self.slots.len()
            && handle.handle_increment_size == self.heap.increment()
            && self.heap.cpu_handle(handle.heap_offset) == handle.cpu_handle
    }

    pub fn allocate(&mut self) -> Result<DescriptorHandle> {
        let heap_offset = self.slots.allocate().ok_or(GrfxError::AllocationFailed)?;
        Ok(DescriptorHandle {
            heap_offset,
            handle_increment_size: self.heap.increment(),
            cpu_handle: self.heap.cpu_handle(heap_offset),
        })
    }

    /// Only frees `handle` if it was allocated from this heap.
    pub fn free(&mut self, handle: &DescriptorHandle) {
        if self.has_handle(handle) {
            self.slots.free(handle.heap_offset);
        }
    }
}

/// Grows by one heap whenever every existing heap is full.
#[derive(Debug)]
pub struct DescriptorHandleManager {
    device: Sendable<ID3D12Device>,
    heap_type: D3D12_DESCRIPTOR_HEAP_TYPE,
    heap_size: u32,
    allocators: Vec<DescriptorHandleAllocator>,
}

impl DescriptorHandleManager {
    pub fn new(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE) -> Self {
        Self::with_heap_size(device, heap_type, MAX_DESCRIPTOR_HANDLE_HEAP_SIZE)
    }

    pub fn with_heap_size(device: &ID3D12Device, heap_type: D3D12_DESCRIPTOR_HEAP_TYPE, heap_size: u32) -> Self {
        Self { device: Sendable(device.clone()), heap_type, heap_size, allocators: Vec::new() }
    }

    pub fn heap_count(&self) -> usize {
        self.allocators.len()
    }

    pub fn allocate(&mut self) -> Result<DescriptorHandle> {
        if let Some(allocator) = self.allocators.iter_mut().find(|a| a.has_available_handle()) {
            return allocator.allocate();
        }
        let mut allocator = DescriptorHandleAllocator::new(&self.device, self.heap_type, self.heap_size)?;
        let handle = allocator.allocate();
        log::debug!("{:?} handle heap #{} created", self.heap_type, self.allocators.len());
        self.allocators.push(allocator);
        handle
    }

    pub fn free(&mut self, handle: &DescriptorHandle) {
        if let Some(allocator) = self.allocators.iter_mut().find(|a| a.has_handle(handle)) {
            allocator.free(handle);
        }
    }
}

/// Shared handle manager. Views hold one and give their handle back on drop.
pub type SharedHandleManager = Arc<Mutex<DescriptorHandleManager>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dx12::testing;

    #[test]
    fn full_heap_fails_until_freed() {
        let Some(device) = testing::native_device() else { return };
        let mut allocator = DescriptorHandleAllocator::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, 2).unwrap();
        let a = allocator.allocate().unwrap();
        let b = allocator.allocate().unwrap();
        assert_ne!(a.cpu_handle, b.cpu_handle);
        assert_eq!(allocator.allocate(), Err(GrfxError::AllocationFailed));
        allocator.free(&a);
        assert_eq!(allocator.allocate().unwrap().heap_offset, a.heap_offset);
    }

    #[test]
    fn foreign_handles_are_ignored() {
        let Some(device) = testing::native_device() else { return };
        let mut first = DescriptorHandleAllocator::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1).unwrap();
        let mut second = DescriptorHandleAllocator::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1).unwrap();
        let handle = first.allocate().unwrap();
        second.free(&handle);
        assert!(!first.has_available_handle());
        first.free(&handle);
        assert!(first.has_available_handle());
    }

    #[test]
    fn manager_adds_heaps_on_demand() {
        let Some(device) = testing::native_device() else { return };
        let mut manager = DescriptorHandleManager::with_heap_size(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, 2);
        let handles: Vec<_> = (0..5).map(|_| manager.allocate().unwrap()).collect();
        assert_eq!(manager.heap_count(), 3);
        manager.free(&handles[1]);
        manager.allocate().unwrap();
        assert_eq!(manager.heap_count(), 3);
    }
}
